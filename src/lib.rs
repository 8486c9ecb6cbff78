//! `http-dispatch` sends HTTP requests with retries, per-attempt timeouts,
//! cancellation and composable transport middleware.
//!
//! Each call goes through [`execute`] (or one of the verb helpers such as
//! [`get`] and [`post`]):
//! - the URL is parsed and [`RequestOptions::query_params`] are merged in
//! - the request is built once and sent through the middleware chain
//! - failed attempts are retried up to [`RequestOptions::max_retries`] times,
//!   waiting [`RequestOptions::retry_wait`] in between unless the
//!   [`Context`] is cancelled first
//!
//! Request bodies that are streams are not replayed: a retry after the
//! stream was sent goes out without a body. Use a buffered body when
//! retrying requests that carry one.

mod context;
mod error;
mod executor;
mod logging;
mod method;
mod options;
mod sender;
mod value;

pub use context::Context;
pub use error::DispatchError;
pub use executor::execute;
pub use logging::{
    logging_middleware, stderr_writer, DiagnosticWriter, LoggingMiddleware, LoggingSender,
};
pub use method::{delete, get, head, options, patch, post, put};
pub use options::{LogLevel, RequestOptions};
pub use reqwest::{Body, Method, Request, Response};
pub use sender::{BoxSender, HttpSender, Middleware, Sender};
pub use tokio_util::sync::CancellationToken;
pub use value::QueryValue;

pub type Result<T> = std::result::Result<T, DispatchError>;
