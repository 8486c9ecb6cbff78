use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Request, Response};

use crate::{DispatchError, Result};

/// Sends one prepared request and returns the response or a transport error.
///
/// Implement this trait to provide a custom base transport, or to write a
/// decorator that wraps an inner sender. HTTP status codes are not errors at
/// this layer.
#[async_trait]
pub trait Sender: Send + Sync {
    async fn send(&self, request: Request) -> Result<Response>;
}

/// Owned, type-erased sender. Each decorator owns exactly one of these.
pub type BoxSender = Box<dyn Sender>;

#[async_trait]
impl<S: Sender + ?Sized> Sender for Box<S> {
    async fn send(&self, request: Request) -> Result<Response> {
        (**self).send(request).await
    }
}

#[async_trait]
impl<S: Sender + ?Sized> Sender for Arc<S> {
    async fn send(&self, request: Request) -> Result<Response> {
        (**self).send(request).await
    }
}

/// Base sender backed by a `reqwest` client.
#[derive(Clone, Debug, Default)]
pub struct HttpSender {
    http: reqwest::Client,
}

impl HttpSender {
    /// Creates a sender with its own freshly built client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reuses an existing client, keeping its pool and TLS configuration.
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Sender for HttpSender {
    async fn send(&self, request: Request) -> Result<Response> {
        self.http
            .execute(request)
            .await
            .map_err(DispatchError::Transport)
    }
}

/// Transformation from an inner sender to a decorated sender.
///
/// Closures of the shape `Fn(BoxSender) -> BoxSender` are middlewares.
pub trait Middleware: Send + Sync {
    fn wrap(&self, inner: BoxSender) -> BoxSender;
}

impl<F> Middleware for F
where
    F: Fn(BoxSender) -> BoxSender + Send + Sync,
{
    fn wrap(&self, inner: BoxSender) -> BoxSender {
        self(inner)
    }
}

/// Builds the effective sender for one call.
///
/// The first middleware in the list is the outermost decorator, so requests
/// pass through the list in order and responses come back in reverse.
/// `outermost`, when given, wraps the whole chain.
pub(crate) fn compose(
    base: BoxSender,
    middlewares: &[Arc<dyn Middleware>],
    outermost: Option<&dyn Middleware>,
) -> BoxSender {
    let chained = middlewares
        .iter()
        .rev()
        .fold(base, |inner, middleware| middleware.wrap(inner));
    match outermost {
        Some(middleware) => middleware.wrap(chained),
        None => chained,
    }
}
