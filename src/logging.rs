//! Transport decorator that dumps requests and responses to a diagnostic
//! stream.
//!
//! Dumping never changes the outcome of a call: serialization problems are
//! written to the stream as warnings and the request or response is passed
//! through untouched.

use std::fmt::Write as _;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use async_trait::async_trait;
use http::{HeaderMap, StatusCode, Version};
use http_body_util::BodyExt;
use reqwest::{Body, Request, Response};

use crate::{BoxSender, LogLevel, Middleware, Result, Sender};

/// Shared destination for transport dumps.
pub type DiagnosticWriter = Arc<Mutex<dyn Write + Send>>;

/// Diagnostic writer bound to the process standard error stream.
pub fn stderr_writer() -> DiagnosticWriter {
    Arc::new(Mutex::new(std::io::stderr()))
}

/// Sender that logs each exchange of the sender it wraps.
pub struct LoggingSender {
    inner: BoxSender,
    level: LogLevel,
    writer: DiagnosticWriter,
}

impl LoggingSender {
    pub fn new(inner: BoxSender, level: LogLevel) -> Self {
        Self {
            inner,
            level,
            writer: stderr_writer(),
        }
    }

    pub fn with_writer(mut self, writer: DiagnosticWriter) -> Self {
        self.writer = writer;
        self
    }

    fn emit(&self, text: &str) {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        // Diagnostics are best effort.
        let _ = writer.write_all(text.as_bytes());
        let _ = writer.flush();
    }
}

#[async_trait]
impl Sender for LoggingSender {
    async fn send(&self, request: Request) -> Result<Response> {
        if self.level == LogLevel::None {
            return self.inner.send(request).await;
        }

        let start = Instant::now();
        let with_body = self.level >= LogLevel::Body;
        let streaming_body = with_body && request.body().is_some_and(|b| b.as_bytes().is_none());
        if streaming_body {
            self.emit("Error dumping request: body is a stream and cannot be read without consuming it\n");
        }
        self.emit(&format!(
            "Request:\n{}\n",
            dump_request(&request, with_body && !streaming_body)
        ));

        match self.inner.send(request).await {
            Ok(response) => {
                let (response, dump) = if with_body {
                    let buffered = buffer_response(response).await;
                    if let Some(err) = &buffered.read_error {
                        self.emit(&format!("Error dumping response: {err}\n"));
                    }
                    (buffered.response, buffered.dump)
                } else {
                    let dump = dump_response_head(
                        response.version(),
                        response.status(),
                        response.headers(),
                        &body_indicator(response.content_length()),
                    );
                    (response, dump)
                };
                self.emit(&format!(
                    "Response (in {:?}):\n{dump}\n",
                    start.elapsed()
                ));
                Ok(response)
            }
            Err(err) => {
                self.emit(&format!("Error (in {:?}): {err}\n", start.elapsed()));
                Err(err)
            }
        }
    }
}

/// Middleware form of [`LoggingSender`].
#[derive(Clone)]
pub struct LoggingMiddleware {
    level: LogLevel,
    writer: DiagnosticWriter,
}

impl LoggingMiddleware {
    pub fn with_writer(mut self, writer: DiagnosticWriter) -> Self {
        self.writer = writer;
        self
    }
}

impl Middleware for LoggingMiddleware {
    fn wrap(&self, inner: BoxSender) -> BoxSender {
        Box::new(LoggingSender::new(inner, self.level).with_writer(self.writer.clone()))
    }
}

/// Builds a logging middleware writing to standard error.
pub fn logging_middleware(level: LogLevel) -> LoggingMiddleware {
    LoggingMiddleware {
        level,
        writer: stderr_writer(),
    }
}

fn dump_request(request: &Request, with_body: bool) -> String {
    let mut out = format!(
        "{} {} {:?}\r\n",
        request.method(),
        request.url(),
        request.version()
    );
    write_headers(&mut out, request.headers());
    out.push_str("\r\n");
    match request.body() {
        Some(body) if with_body => {
            if let Some(bytes) = body.as_bytes() {
                out.push_str(&String::from_utf8_lossy(bytes));
            }
        }
        Some(body) => out.push_str(&match body.as_bytes() {
            Some(bytes) => body_indicator(Some(bytes.len() as u64)),
            None => "<streaming body>".to_owned(),
        }),
        None => {}
    }
    out
}

fn dump_response_head(
    version: Version,
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
) -> String {
    let mut out = format!("{version:?} {status}\r\n");
    write_headers(&mut out, headers);
    out.push_str("\r\n");
    out.push_str(body);
    out
}

fn write_headers(out: &mut String, headers: &HeaderMap) {
    for (name, value) in headers {
        let _ = write!(out, "{name}: {}\r\n", String::from_utf8_lossy(value.as_bytes()));
    }
}

fn body_indicator(len: Option<u64>) -> String {
    match len {
        Some(0) => String::new(),
        Some(len) => format!("<body: {len} bytes>"),
        None => "<body omitted>".to_owned(),
    }
}

struct BufferedResponse {
    response: Response,
    dump: String,
    read_error: Option<String>,
}

/// Reads the whole response body and rebuilds a response that replays it.
///
/// A read error ends buffering; the rebuilt body yields the bytes read so far
/// followed by that error, so the caller observes the same failure.
async fn buffer_response(response: Response) -> BufferedResponse {
    let (parts, mut body) = http::Response::<Body>::from(response).into_parts();

    let mut buffered = Vec::new();
    let mut failure = None;
    while let Some(frame) = body.frame().await {
        match frame {
            Ok(frame) => {
                if let Ok(data) = frame.into_data() {
                    buffered.extend_from_slice(&data);
                }
            }
            Err(err) => {
                failure = Some(err);
                break;
            }
        }
    }

    let dump = dump_response_head(
        parts.version,
        parts.status,
        &parts.headers,
        &String::from_utf8_lossy(&buffered),
    );
    let read_error = failure.as_ref().map(ToString::to_string);
    let body = match failure {
        None => Body::from(buffered),
        Some(err) => Body::wrap_stream(futures_util::stream::iter([Ok(buffered), Err(err)])),
    };

    BufferedResponse {
        response: Response::from(http::Response::from_parts(parts, body)),
        dump,
        read_error,
    }
}
