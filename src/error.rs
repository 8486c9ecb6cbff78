use std::time::Duration;

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Target URL could not be parsed.
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// Query parameter value has no string form.
    #[error("query parameter '{key}' is not string-representable ({kind})")]
    InvalidQueryParam {
        /// Name of the offending parameter.
        key: String,
        /// Kind of value that was supplied.
        kind: &'static str,
    },
    /// Header name or value rejected before sending.
    #[error("invalid header '{name}': {message}")]
    InvalidHeader { name: String, message: String },
    /// Network or request execution error from `reqwest`.
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    /// A single attempt ran past the configured per-attempt timeout.
    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),
    /// Failure raised by a middleware or an injected sender.
    #[error("middleware error: {0}")]
    Middleware(Box<dyn std::error::Error + Send + Sync>),
    /// The caller cancelled the request context.
    #[error("request canceled")]
    Cancelled,
    /// The request context deadline passed.
    #[error("request context deadline exceeded")]
    DeadlineExceeded,
}

impl DispatchError {
    /// Wraps an arbitrary error raised inside a [`Sender`](crate::Sender) chain.
    pub fn middleware<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Middleware(err.into())
    }

    /// Input was rejected before any attempt was made.
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            Self::InvalidUrl(_) | Self::InvalidQueryParam { .. } | Self::InvalidHeader { .. }
        )
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }

    /// Whether the attempt loop may try again after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Timeout(_) | Self::Middleware(_)
        )
    }
}
