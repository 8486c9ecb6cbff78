use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::{
    header::{HeaderName, HeaderValue},
    Body, Method, Request, Response, Url,
};

use crate::{
    logging::logging_middleware,
    sender::compose,
    BoxSender, Context, DispatchError, HttpSender, Middleware, QueryValue, RequestOptions, Result,
    Sender,
};

/// Performs one logical call: builds the request once, then sends it up to
/// `max_retries + 1` times through the composed sender.
///
/// Only errors from an attempt are retried; any response, whatever its
/// status, ends the call. The context is observed during each attempt and
/// during the wait between attempts, and cancellation ends the call
/// regardless of the remaining retry budget.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
///
/// use http_dispatch::{execute, Context, Method, RequestOptions};
///
/// # async fn run() -> http_dispatch::Result<()> {
/// let options = RequestOptions::new()
///     .query("page", 2)
///     .with_retries(3, Duration::from_millis(200));
/// let response = execute(&Context::new(), Method::GET, "https://example.com/items", options).await?;
/// println!("{}", response.status());
/// # Ok(())
/// # }
/// ```
pub async fn execute(
    ctx: &Context,
    method: Method,
    url: &str,
    options: RequestOptions,
) -> Result<Response> {
    let RequestOptions {
        headers,
        body,
        max_retries,
        retry_wait,
        middlewares,
        timeout,
        query_params,
        log_level,
        log_transport,
        transport,
        log_writer,
    } = options;

    let url = build_url(url, &query_params)?;
    let mut prepared = PreparedRequest::new(method, url, &headers, body)?;

    let base: BoxSender = match transport {
        Some(transport) => Box::new(transport),
        None => Box::new(HttpSender::new()),
    };
    let logging = log_transport.then(|| match log_writer {
        Some(writer) => logging_middleware(log_level).with_writer(writer),
        None => logging_middleware(log_level),
    });
    let sender = compose(
        base,
        &middlewares,
        logging.as_ref().map(|layer| layer as &dyn Middleware),
    );
    let timeout = timeout.filter(|limit| !limit.is_zero());

    let mut attempt = 0usize;
    loop {
        let request = prepared.next_attempt();
        match send_attempt(ctx, &*sender, request, timeout).await {
            Ok(response) => return Ok(response),
            Err(err) if !err.is_retryable() || attempt >= max_retries => {
                #[cfg(feature = "tracing")]
                tracing::debug!(attempt, error = %err, "request failed");
                return Err(err);
            }
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    attempt,
                    error = %_err,
                    "retrying request after {} ms",
                    retry_wait.as_millis()
                );
                wait_before_retry(ctx, retry_wait).await?;
                attempt += 1;
            }
        }
    }
}

/// Runs one attempt, bounded by the per-attempt timeout and the context.
async fn send_attempt(
    ctx: &Context,
    sender: &dyn Sender,
    request: Request,
    timeout: Option<Duration>,
) -> Result<Response> {
    let call = async {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, sender.send(request))
                .await
                .unwrap_or_else(|_| Err(DispatchError::Timeout(limit))),
            None => sender.send(request).await,
        }
    };

    tokio::select! {
        biased;
        _ = ctx.done() => Err(ctx.err()),
        result = call => result,
    }
}

/// Waits `wait` unless the context finishes first.
async fn wait_before_retry(ctx: &Context, wait: Duration) -> Result<()> {
    tokio::select! {
        biased;
        _ = ctx.done() => {
            #[cfg(feature = "tracing")]
            tracing::warn!("request context finished while waiting to retry");
            Err(ctx.err())
        }
        _ = tokio::time::sleep(wait) => Ok(()),
    }
}

/// Parses `raw` and sets every entry of `query_params` on its query string.
///
/// Options replace all existing values for their key. The resulting query is
/// re-encoded with keys in sorted order.
fn build_url(raw: &str, query_params: &BTreeMap<String, QueryValue>) -> Result<Url> {
    let mut url = Url::parse(raw)?;
    if query_params.is_empty() {
        return Ok(url);
    }

    let mut merged: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (key, value) in url.query_pairs() {
        merged
            .entry(key.into_owned())
            .or_default()
            .push(value.into_owned());
    }
    for (key, value) in query_params {
        let text = value
            .to_query_string()
            .ok_or_else(|| DispatchError::InvalidQueryParam {
                key: key.clone(),
                kind: value.kind(),
            })?;
        merged.insert(key.clone(), vec![text]);
    }

    url.query_pairs_mut().clear().extend_pairs(
        merged
            .iter()
            .flat_map(|(key, values)| values.iter().map(move |value| (key, value))),
    );
    Ok(url)
}

/// Request built once per call and replayed for each attempt.
struct PreparedRequest {
    request: Request,
    body_consumed: bool,
}

impl PreparedRequest {
    fn new(
        method: Method,
        url: Url,
        headers: &BTreeMap<String, String>,
        body: Option<Body>,
    ) -> Result<Self> {
        let mut request = Request::new(method, url);
        for (name, value) in headers {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|err| {
                DispatchError::InvalidHeader {
                    name: name.clone(),
                    message: err.to_string(),
                }
            })?;
            let header_value =
                HeaderValue::from_str(value).map_err(|err| DispatchError::InvalidHeader {
                    name: name.clone(),
                    message: err.to_string(),
                })?;
            request.headers_mut().insert(header_name, header_value);
        }
        *request.body_mut() = body;

        Ok(Self {
            request,
            body_consumed: false,
        })
    }

    /// Returns the request for the next attempt.
    ///
    /// Buffered bodies are copied. A streaming body cannot be copied: it goes
    /// out with the first attempt and later attempts carry no body.
    fn next_attempt(&mut self) -> Request {
        if self.body_consumed {
            #[cfg(feature = "tracing")]
            tracing::warn!("streaming request body was consumed; retrying without a body");
        }
        if let Some(copy) = self.request.try_clone() {
            return copy;
        }

        let mut copy = Request::new(self.request.method().clone(), self.request.url().clone());
        *copy.headers_mut() = self.request.headers().clone();
        *copy.timeout_mut() = self.request.timeout().copied();
        *copy.version_mut() = self.request.version();
        *copy.body_mut() = self.request.body_mut().take();
        self.body_consumed = true;
        copy
    }
}
