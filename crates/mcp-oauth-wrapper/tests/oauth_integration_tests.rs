//! Full end-to-end tests: registration through token exchange to the proxied stream.
//!
//! The backend MCP server is a wiremock instance; time is driven by a manual clock so
//! the code and token lifetimes can be crossed without sleeping.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::{DateTime, TimeDelta, Utc};
use futures::StreamExt;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tower::ServiceExt;
use wiremock::matchers::{header as header_eq, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mcp_oauth_wrapper::config::Config;
use mcp_oauth_wrapper::server::oauth::{OAuthStore, TimeProvider};
use mcp_oauth_wrapper::server::transport::{HttpState, create_router};

const BACKEND_KEY: &str = "backend-sse-key";
const REDIRECT_URI: &str = "https://a/cb";
const SSE_BODY: &str = "event: endpoint\ndata: /message?sessionId=abc\n\n";

struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    fn new() -> Arc<Self> {
        Arc::new(Self(Mutex::new(Utc::now())))
    }

    fn advance(&self, delta: TimeDelta) {
        *self.0.lock().unwrap() += delta;
    }
}

impl TimeProvider for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

fn build_router(config: Config, clock: Arc<ManualClock>) -> axum::Router {
    let store = OAuthStore::with_time_provider(clock);
    create_router(Arc::new(HttpState::new(config, store).unwrap()))
}

async fn mount_backend(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/sse"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("mcp-session-id", "abc")
                .set_body_raw(SSE_BODY, "text/event-stream"),
        )
        .mount(server)
        .await;
}

/// Backend that sends one event on `/sse` and then holds the stream open.
async fn spawn_held_stream_backend() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    let Ok(n) = socket.read(&mut buf).await else { return };
                    if n == 0 {
                        return;
                    }
                    request.extend_from_slice(&buf[..n]);
                }

                if request.starts_with(b"GET /health") {
                    let _ = socket
                        .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                        .await;
                    return;
                }

                let _ = socket
                    .write_all(
                        b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ntransfer-encoding: chunked\r\n\r\n",
                    )
                    .await;
                let _ = socket.write_all(b"b\r\ndata: one\n\n\r\n").await;
                let _ = socket.flush().await;

                // Never send the terminating chunk.
                tokio::time::sleep(Duration::from_secs(60)).await;
                drop(socket);
            });
        }
    });

    format!("http://{addr}")
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Register, authorize and return `(client_id, client_secret, code)`.
async fn register_and_authorize(app: &axum::Router) -> (String, String, String) {
    let response = app
        .clone()
        .oneshot(
            Request::post("/register")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    json!({"client_name": "x", "redirect_uris": [REDIRECT_URI]}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let client = body_json(response).await;
    let client_id = client["client_id"].as_str().unwrap().to_string();
    let client_secret = client["client_secret"].as_str().unwrap().to_string();

    let uri = format!(
        "/authorize?client_id={client_id}&redirect_uri=https%3A%2F%2Fa%2Fcb&response_type=code&state=s1"
    );
    let response = app.clone().oneshot(Request::get(&uri).body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);

    let location = response.headers().get(header::LOCATION).unwrap().to_str().unwrap();
    let url = url::Url::parse(location).unwrap();
    let code = url.query_pairs().find(|(k, _)| k == "code").unwrap().1.into_owned();
    assert_eq!(location, format!("https://a/cb?code={code}&state=s1"));

    (client_id, client_secret, code)
}

async fn exchange(
    app: &axum::Router,
    client_id: &str,
    client_secret: &str,
    code: &str,
) -> axum::response::Response {
    let params = [
        ("grant_type", "authorization_code"),
        ("code", code),
        ("client_id", client_id),
        ("client_secret", client_secret),
        ("redirect_uri", REDIRECT_URI),
    ];
    app.clone()
        .oneshot(
            Request::post("/token")
                .header("Content-Type", "application/x-www-form-urlencoded")
                .body(Body::from(serde_urlencoded::to_string(params).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn get_sse(app: &axum::Router, bearer: &str) -> axum::response::Response {
    app.clone()
        .oneshot(
            Request::get("/sse")
                .header("Authorization", format!("Bearer {bearer}"))
                .header("Accept", "text/event-stream")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn obtain_token(app: &axum::Router) -> String {
    let (client_id, client_secret, code) = register_and_authorize(app).await;
    let response = exchange(app, &client_id, &client_secret, &code).await;
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await["access_token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_full_oauth_http_flow() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sse"))
        .and(header_eq("authorization", format!("Bearer {BACKEND_KEY}").as_str()))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(SSE_BODY, "text/event-stream"),
        )
        .expect(1)
        .mount(&backend)
        .await;

    let config = Config::for_testing(&backend.uri()).with_backend_api_key(BACKEND_KEY);
    let app = build_router(config, ManualClock::new());

    // 1. Register + authorize
    let (client_id, client_secret, code) = register_and_authorize(&app).await;

    // 2. Exchange code for token
    let response = exchange(&app, &client_id, &client_secret, &code).await;
    assert_eq!(response.status(), StatusCode::OK);
    let token_info = body_json(response).await;
    assert_eq!(token_info["token_type"], "Bearer");
    assert_eq!(token_info["expires_in"], 86400);
    let access_token = token_info["access_token"].as_str().unwrap().to_string();
    assert!(!access_token.is_empty());

    // 3. Reusing the code fails
    let response = exchange(&app, &client_id, &client_secret, &code).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_grant");

    // 4. Stream through the proxy with the backend credential substituted
    let response = get_sse(&app, &access_token).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get(header::CONTENT_TYPE).unwrap(), "text/event-stream");
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(body, SSE_BODY.as_bytes());

    // The shim-issued token never reaches the backend
    let requests = backend.received_requests().await.unwrap();
    let sse = requests.iter().find(|r| r.url.path() == "/sse").unwrap();
    let auth = sse.headers.get("authorization").unwrap().to_str().unwrap();
    assert_eq!(auth, format!("Bearer {BACKEND_KEY}"));
    assert!(!auth.contains(&access_token));
}

#[tokio::test]
async fn test_expired_code_rejected_on_first_use() {
    let clock = ManualClock::new();
    let app = build_router(Config::for_testing("http://unused.localhost"), Arc::clone(&clock));

    let (client_id, client_secret, code) = register_and_authorize(&app).await;
    clock.advance(TimeDelta::minutes(10) + TimeDelta::seconds(1));

    let response = exchange(&app, &client_id, &client_secret, &code).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "invalid_grant");
    assert_eq!(json["error_description"], "authorization code expired");
}

#[tokio::test]
async fn test_code_valid_just_before_expiry() {
    let clock = ManualClock::new();
    let app = build_router(Config::for_testing("http://unused.localhost"), Arc::clone(&clock));

    let (client_id, client_secret, code) = register_and_authorize(&app).await;
    clock.advance(TimeDelta::minutes(9) + TimeDelta::seconds(59));

    let response = exchange(&app, &client_id, &client_secret, &code).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_token_lifetime_boundary() {
    let backend = MockServer::start().await;
    mount_backend(&backend).await;

    let clock = ManualClock::new();
    let app = build_router(Config::for_testing(&backend.uri()), Arc::clone(&clock));
    let access_token = obtain_token(&app).await;

    clock.advance(TimeDelta::hours(23) + TimeDelta::minutes(59));
    assert_eq!(get_sse(&app, &access_token).await.status(), StatusCode::OK);

    clock.advance(TimeDelta::minutes(2));
    let response = get_sse(&app, &access_token).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get(header::WWW_AUTHENTICATE).is_some());
}

#[tokio::test]
async fn test_proxy_rejects_missing_or_unknown_token() {
    let backend = MockServer::start().await;
    mount_backend(&backend).await;
    let app = build_router(Config::for_testing(&backend.uri()), ManualClock::new());

    let response =
        app.clone().oneshot(Request::get("/sse").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = get_sse(&app, "not-a-token").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "invalid_token");

    // Nothing was forwarded
    let requests = backend.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| r.url.path() != "/sse"));
}

#[tokio::test]
async fn test_proxy_without_backend_credential_sends_no_authorization() {
    let backend = MockServer::start().await;
    mount_backend(&backend).await;
    let app = build_router(Config::for_testing(&backend.uri()), ManualClock::new());
    let access_token = obtain_token(&app).await;

    let response = get_sse(&app, &access_token).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("mcp-session-id").unwrap(), "abc");

    let requests = backend.received_requests().await.unwrap();
    let sse = requests.iter().find(|r| r.url.path() == "/sse").unwrap();
    assert!(sse.headers.get("authorization").is_none());
    assert_eq!(sse.headers.get("accept").unwrap(), "text/event-stream");
}

#[tokio::test]
async fn test_proxy_forwards_body_and_query() {
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sse"))
        .respond_with(ResponseTemplate::new(202).set_body_string("accepted"))
        .mount(&backend)
        .await;

    let app = build_router(Config::for_testing(&backend.uri()), ManualClock::new());
    let access_token = obtain_token(&app).await;

    let payload = json!({"jsonrpc": "2.0", "method": "ping", "id": 1}).to_string();
    let response = app
        .clone()
        .oneshot(
            Request::post("/sse?sessionId=abc")
                .header("Authorization", format!("Bearer {access_token}"))
                .header("Content-Type", "application/json")
                .body(Body::from(payload.clone()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(body, "accepted".as_bytes());

    let requests = backend.received_requests().await.unwrap();
    let forwarded = requests.iter().find(|r| r.url.path() == "/sse").unwrap();
    assert_eq!(forwarded.url.query(), Some("sessionId=abc"));
    assert_eq!(forwarded.body, payload.as_bytes());
    assert_eq!(forwarded.headers.get("content-type").unwrap(), "application/json");
}

#[tokio::test]
async fn test_backend_down_surfaces_as_bad_gateway() {
    // Nothing listens on port 1.
    let app = build_router(Config::for_testing("http://127.0.0.1:1"), ManualClock::new());
    let access_token = obtain_token(&app).await;

    let response = get_sse(&app, &access_token).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_readiness_reports_store_counts() {
    let app = build_router(Config::for_testing("http://unused.localhost"), ManualClock::new());
    let _ = obtain_token(&app).await;

    let response = app.oneshot(Request::get("/ready").body(Body::empty()).unwrap()).await.unwrap();
    let json = body_json(response).await;
    assert_eq!(json["clients"], 1);
    assert_eq!(json["authorization_codes"], 0);
    assert_eq!(json["access_tokens"], 1);
}

#[tokio::test]
async fn test_proxy_relays_events_before_stream_ends() {
    let backend = spawn_held_stream_backend().await;
    let app = build_router(Config::for_testing(&backend), ManualClock::new());
    let access_token = obtain_token(&app).await;

    let response = get_sse(&app, &access_token).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get(header::CONTENT_TYPE).unwrap(), "text/event-stream");

    let mut stream = response.into_body().into_data_stream();
    let first = tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .expect("first event should arrive while the backend keeps the stream open")
        .unwrap()
        .unwrap();
    assert_eq!(first, "data: one\n\n".as_bytes());
}
