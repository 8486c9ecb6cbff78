use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use axum::{
    extract::{RawQuery, State},
    http::HeaderMap,
    routing::{any, get as get_route},
    Router,
};
use http_dispatch::{
    get, post, Context, DiagnosticWriter, DispatchError, HttpSender, LogLevel, RequestOptions,
};

#[derive(Clone, Default)]
struct ServerState {
    hits: Arc<AtomicUsize>,
}

async fn echo_query(State(state): State<ServerState>, RawQuery(query): RawQuery) -> String {
    state.hits.fetch_add(1, Ordering::SeqCst);
    query.unwrap_or_default()
}

async fn echo_header(State(state): State<ServerState>, headers: HeaderMap) -> String {
    state.hits.fetch_add(1, Ordering::SeqCst);
    headers
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("missing")
        .to_owned()
}

async fn echo_body(State(state): State<ServerState>, body: String) -> String {
    state.hits.fetch_add(1, Ordering::SeqCst);
    format!("echo:{body}")
}

async fn slow(State(state): State<ServerState>) -> &'static str {
    state.hits.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(300)).await;
    "too late"
}

struct TestServer {
    base_url: String,
    hits: Arc<AtomicUsize>,
    task: tokio::task::JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

async fn spawn_server() -> TestServer {
    let state = ServerState::default();

    let app = Router::new()
        .route("/query", get_route(echo_query))
        .route("/header", get_route(echo_header))
        .route("/echo", any(echo_body))
        .route("/slow", get_route(slow))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("must bind test listener");
    let address = listener.local_addr().expect("must have local addr");
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .await
            .expect("mock server must run");
    });

    TestServer {
        base_url: format!("http://{address}"),
        hits: state.hits,
        task,
    }
}

#[tokio::test]
async fn query_params_reach_the_server_encoded() {
    let server = spawn_server().await;
    let options = RequestOptions::new()
        .query("b", "2")
        .query("name", "Kit Smith");

    let response = get(&Context::new(), &server.url("/query?a=1&b=old"), options)
        .await
        .expect("request must succeed");

    assert_eq!(response.status(), 200);
    assert_eq!(
        response.text().await.expect("body"),
        "a=1&b=2&name=Kit+Smith"
    );
}

#[tokio::test]
async fn headers_reach_the_server() {
    let server = spawn_server().await;
    let options = RequestOptions::new().header("X-Request-Id", "req-42");

    let response = get(&Context::new(), &server.url("/header"), options)
        .await
        .expect("request must succeed");

    assert_eq!(response.text().await.expect("body"), "req-42");
}

#[tokio::test]
async fn body_logging_leaves_response_readable() {
    let server = spawn_server().await;
    let buffer = Arc::new(Mutex::new(Vec::new()));
    let writer: DiagnosticWriter = buffer.clone();
    let options = RequestOptions::new()
        .with_body("ping")
        .with_logging(LogLevel::Body)
        .with_log_writer(writer);

    let response = post(&Context::new(), &server.url("/echo"), options)
        .await
        .expect("request must succeed");

    let expected_url = server.url("/echo");
    assert_eq!(response.url().as_str(), expected_url);
    assert_eq!(response.text().await.expect("body"), "echo:ping");

    let log = String::from_utf8(buffer.lock().expect("log").clone()).expect("utf-8 log");
    assert!(log.contains(&format!("POST {expected_url}")));
    assert!(log.contains("ping"));
    assert!(log.contains("echo:ping"));
    assert!(log.contains("200 OK"));
}

#[tokio::test]
async fn per_attempt_timeout_bounds_each_attempt() {
    let server = spawn_server().await;
    let options = RequestOptions::new()
        .with_timeout(Duration::from_millis(50))
        .with_retries(1, Duration::from_millis(5));

    let err = get(&Context::new(), &server.url("/slow"), options)
        .await
        .expect_err("every attempt must time out");

    assert!(matches!(err, DispatchError::Timeout(_)));
    // The slow handler may still be counting the second hit when we return.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(server.hits(), 2);
}

#[tokio::test]
async fn connection_refused_is_retried_then_surfaced() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("must bind probe listener");
    let address = listener.local_addr().expect("must have local addr");
    drop(listener);

    let options = RequestOptions::new()
        .with_transport(HttpSender::new())
        .with_retries(2, Duration::from_millis(10));

    let err = get(&Context::new(), &format!("http://{address}/gone"), options)
        .await
        .expect_err("nothing listens on the port");

    match err {
        DispatchError::Transport(inner) => assert!(inner.is_connect()),
        other => panic!("expected transport error, got {other:?}"),
    }
}
