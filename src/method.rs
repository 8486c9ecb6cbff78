use reqwest::{Method, Response};

use crate::{execute, Context, RequestOptions, Result};

/// Sends a `GET` request.
pub async fn get(ctx: &Context, url: &str, options: RequestOptions) -> Result<Response> {
    execute(ctx, Method::GET, url, options).await
}

/// Sends a `POST` request.
pub async fn post(ctx: &Context, url: &str, options: RequestOptions) -> Result<Response> {
    execute(ctx, Method::POST, url, options).await
}

/// Sends a `PUT` request.
pub async fn put(ctx: &Context, url: &str, options: RequestOptions) -> Result<Response> {
    execute(ctx, Method::PUT, url, options).await
}

/// Sends a `DELETE` request.
pub async fn delete(ctx: &Context, url: &str, options: RequestOptions) -> Result<Response> {
    execute(ctx, Method::DELETE, url, options).await
}

/// Sends a `HEAD` request.
pub async fn head(ctx: &Context, url: &str, options: RequestOptions) -> Result<Response> {
    execute(ctx, Method::HEAD, url, options).await
}

/// Sends a `PATCH` request.
pub async fn patch(ctx: &Context, url: &str, options: RequestOptions) -> Result<Response> {
    execute(ctx, Method::PATCH, url, options).await
}

/// Sends an `OPTIONS` request.
pub async fn options(ctx: &Context, url: &str, options: RequestOptions) -> Result<Response> {
    execute(ctx, Method::OPTIONS, url, options).await
}
