use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Body;
use serde::Deserialize;

use crate::{DiagnosticWriter, Middleware, QueryValue, Sender};

/// Amount of detail the logging decorator writes per exchange.
///
/// Each level logs everything the previous one does.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// No output.
    #[default]
    None,
    /// Method, URL, headers, status and elapsed time.
    Basic,
    /// Everything in `Basic` plus request and response payloads.
    Body,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Basic => "basic",
            Self::Body => "body",
        })
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" | "off" | "" => Ok(Self::None),
            "basic" => Ok(Self::Basic),
            "body" => Ok(Self::Body),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

/// Per-call options for [`execute`](crate::execute) and the verb helpers.
pub struct RequestOptions {
    /// Headers set on the request; later writes win on duplicate names.
    pub headers: BTreeMap<String, String>,
    /// Request body. Streams are read once and not replayed on retry.
    pub body: Option<Body>,
    /// Retries after the initial attempt.
    pub max_retries: usize,
    /// Wait between attempts.
    pub retry_wait: Duration,
    /// Decorators in request order; the first one sees the request first.
    pub middlewares: Vec<Arc<dyn Middleware>>,
    /// Bound on a single attempt. `None` leaves attempts unbounded.
    pub timeout: Option<Duration>,
    /// Query parameters replacing same-named ones in the URL.
    pub query_params: BTreeMap<String, QueryValue>,
    pub log_level: LogLevel,
    /// Enables the logging decorator around the whole chain.
    pub log_transport: bool,
    /// Base sender; a fresh [`HttpSender`](crate::HttpSender) when unset.
    pub transport: Option<Arc<dyn Sender>>,
    /// Destination for transport dumps; standard error when unset.
    pub log_writer: Option<DiagnosticWriter>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            headers: BTreeMap::new(),
            body: None,
            max_retries: 0,
            retry_wait: Duration::ZERO,
            middlewares: Vec::new(),
            timeout: None,
            query_params: BTreeMap::new(),
            log_level: LogLevel::None,
            log_transport: false,
            transport: None,
            log_writer: None,
        }
    }
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("headers", &self.headers)
            .field("body", &self.body.as_ref().map(|_| "<body>"))
            .field("max_retries", &self.max_retries)
            .field("retry_wait", &self.retry_wait)
            .field("middlewares", &self.middlewares.len())
            .field("timeout", &self.timeout)
            .field("query_params", &self.query_params)
            .field("log_level", &self.log_level)
            .field("log_transport", &self.log_transport)
            .field("transport", &self.transport.as_ref().map(|_| "<custom>"))
            .finish_non_exhaustive()
    }
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds options from environment variables.
    ///
    /// Reads:
    /// - `HTTP_DISPATCH_MAX_RETRIES`: retries after the first attempt
    /// - `HTTP_DISPATCH_RETRY_WAIT_MS`: wait between attempts
    /// - `HTTP_DISPATCH_TIMEOUT_MS`: per-attempt timeout, `0` disables it
    /// - `HTTP_DISPATCH_LOG_LEVEL`: `none`, `basic` or `body`
    ///
    /// Unset variables keep their defaults. A log level above `none` also
    /// turns on transport logging.
    pub fn from_env() -> std::result::Result<Self, String> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> std::result::Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut options = Self::default();
        if let Some(value) = lookup("HTTP_DISPATCH_MAX_RETRIES") {
            options.max_retries = parse_number("HTTP_DISPATCH_MAX_RETRIES", &value)? as usize;
        }
        if let Some(value) = lookup("HTTP_DISPATCH_RETRY_WAIT_MS") {
            options.retry_wait =
                Duration::from_millis(parse_number("HTTP_DISPATCH_RETRY_WAIT_MS", &value)?);
        }
        if let Some(value) = lookup("HTTP_DISPATCH_TIMEOUT_MS") {
            let ms = parse_number("HTTP_DISPATCH_TIMEOUT_MS", &value)?;
            options.timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(value) = lookup("HTTP_DISPATCH_LOG_LEVEL") {
            let level = value
                .parse::<LogLevel>()
                .map_err(|err| format!("HTTP_DISPATCH_LOG_LEVEL: {err}"))?;
            options.log_level = level;
            options.log_transport = level > LogLevel::None;
        }
        Ok(options)
    }

    /// Sets a header, replacing any earlier value for the same name.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Sets a query parameter, replacing any earlier value for the same name.
    pub fn query(mut self, name: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        self.query_params.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Sets the retry budget and the wait between attempts.
    pub fn with_retries(mut self, max_retries: usize, retry_wait: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_wait = retry_wait;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Appends a middleware; it runs inside every middleware added before it.
    pub fn with_middleware<M>(mut self, middleware: M) -> Self
    where
        M: Middleware + 'static,
    {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    /// Turns on transport logging at `level`.
    pub fn with_logging(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self.log_transport = true;
        self
    }

    pub fn with_log_writer(mut self, writer: DiagnosticWriter) -> Self {
        self.log_writer = Some(writer);
        self
    }

    pub fn with_transport<S>(mut self, transport: S) -> Self
    where
        S: Sender + 'static,
    {
        self.transport = Some(Arc::new(transport));
        self
    }
}

fn parse_number(name: &str, value: &str) -> std::result::Result<u64, String> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|err| format!("{name} must be a non-negative integer: {err}"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::{LogLevel, RequestOptions};
    use crate::QueryValue;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn log_levels_are_ordered() {
        assert!(LogLevel::None < LogLevel::Basic);
        assert!(LogLevel::Basic < LogLevel::Body);
    }

    #[test]
    fn log_level_parses_case_insensitively() {
        assert_eq!("BODY".parse::<LogLevel>(), Ok(LogLevel::Body));
        assert_eq!(" basic ".parse::<LogLevel>(), Ok(LogLevel::Basic));
        assert_eq!("none".parse::<LogLevel>(), Ok(LogLevel::None));
        assert!("verbose".parse::<LogLevel>().is_err());
        assert_eq!(LogLevel::Basic.to_string(), "basic");
    }

    #[test]
    fn log_level_deserializes_lowercase() {
        let level: LogLevel = serde_json::from_str("\"body\"").unwrap();
        assert_eq!(level, LogLevel::Body);
    }

    #[test]
    fn defaults_make_a_single_unlogged_attempt() {
        let options = RequestOptions::default();
        assert_eq!(options.max_retries, 0);
        assert_eq!(options.retry_wait, Duration::ZERO);
        assert_eq!(options.timeout, None);
        assert!(!options.log_transport);
        assert!(options.transport.is_none());
    }

    #[test]
    fn reads_environment_overrides() {
        let options = RequestOptions::from_lookup(lookup(&[
            ("HTTP_DISPATCH_MAX_RETRIES", "3"),
            ("HTTP_DISPATCH_RETRY_WAIT_MS", "25"),
            ("HTTP_DISPATCH_TIMEOUT_MS", "0"),
            ("HTTP_DISPATCH_LOG_LEVEL", "basic"),
        ]))
        .unwrap();

        assert_eq!(options.max_retries, 3);
        assert_eq!(options.retry_wait, Duration::from_millis(25));
        assert_eq!(options.timeout, None);
        assert_eq!(options.log_level, LogLevel::Basic);
        assert!(options.log_transport);
    }

    #[test]
    fn rejects_malformed_environment_values() {
        let err = RequestOptions::from_lookup(lookup(&[("HTTP_DISPATCH_MAX_RETRIES", "-1")]))
            .unwrap_err();
        assert!(err.contains("HTTP_DISPATCH_MAX_RETRIES"));
    }

    #[test]
    fn builder_overwrites_duplicate_keys() {
        let options = RequestOptions::new()
            .header("x-id", "1")
            .header("x-id", "2")
            .query("page", 1)
            .query("page", "last");

        assert_eq!(options.headers["x-id"], "2");
        assert_eq!(options.query_params["page"], QueryValue::text("last"));
    }
}
