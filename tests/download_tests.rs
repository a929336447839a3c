//! Integration tests for out-of-band downloads
//!
//! Spins up a local axum server with known payloads and drives the
//! download client against it: buffered and streamed fetches, cookie
//! forwarding from a session jar, and scheme/status error handling.

use std::net::SocketAddr;

use axum::http::{header, HeaderMap};
use axum::routing::get;
use axum::Router;
use url::Url;

use webpilot::browser::{Browser, Cookie, Downloader, EngineConfig, MockRenderEngine};
use webpilot::error::BrowserError;
use webpilot::RenderEngine;

/// Deterministic binary payload large enough to arrive in several
/// chunks.
fn payload() -> Vec<u8> {
    (0u32..65_536).map(|i| (i % 251) as u8).collect()
}

async fn serve_payload() -> Vec<u8> {
    payload()
}

async fn serve_greeting() -> &'static str {
    "Hello from the fixture server\n"
}

async fn echo_cookie_header(headers: HeaderMap) -> String {
    headers
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("none")
        .to_string()
}

/// Binds the fixture server on an ephemeral port and returns its
/// address.
async fn start_server() -> SocketAddr {
    let app = Router::new()
        .route("/payload.bin", get(serve_payload))
        .route("/greeting.txt", get(serve_greeting))
        .route("/whoami", get(echo_cookie_header));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn server_url(addr: SocketAddr, path: &str) -> Url {
    Url::parse(&format!("http://{addr}{path}")).unwrap()
}

// ============================================================================
// Download client
// ============================================================================

#[tokio::test]
async fn test_fetch_buffers_entire_payload() {
    let addr = start_server().await;
    let downloader = Downloader::new(&EngineConfig::default()).unwrap();

    let bytes = downloader
        .fetch(&server_url(addr, "/payload.bin"), None)
        .await
        .unwrap();
    assert_eq!(bytes, payload());
}

#[tokio::test]
async fn test_fetch_to_streams_into_file() {
    let addr = start_server().await;
    let downloader = Downloader::new(&EngineConfig::default()).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("payload.bin");
    let mut file = tokio::fs::File::create(&path).await.unwrap();

    let written = downloader
        .fetch_to(&server_url(addr, "/payload.bin"), None, &mut file)
        .await
        .unwrap();
    drop(file);

    assert_eq!(written, payload().len() as u64);
    assert_eq!(tokio::fs::read(&path).await.unwrap(), payload());
}

#[tokio::test]
async fn test_fetch_sends_provided_cookie_header() {
    let addr = start_server().await;
    let downloader = Downloader::new(&EngineConfig::default()).unwrap();

    let body = downloader
        .fetch(&server_url(addr, "/whoami"), Some("sid=s3cret"))
        .await
        .unwrap();
    assert_eq!(body, b"sid=s3cret");

    let body = downloader
        .fetch(&server_url(addr, "/whoami"), None)
        .await
        .unwrap();
    assert_eq!(body, b"none");
}

#[tokio::test]
async fn test_fetch_rejects_unsupported_scheme() {
    let downloader = Downloader::new(&EngineConfig::default()).unwrap();
    let url = Url::parse("ftp://fixture.test/archive.tar").unwrap();

    let err = downloader.fetch(&url, None).await.unwrap_err();
    assert!(matches!(err, BrowserError::Operation(_)));
    assert!(err.to_string().contains("ftp"));
}

#[tokio::test]
async fn test_fetch_propagates_http_errors() {
    let addr = start_server().await;
    let downloader = Downloader::new(&EngineConfig::default()).unwrap();

    let err = downloader
        .fetch(&server_url(addr, "/does-not-exist"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, BrowserError::Http(_)));
}

// ============================================================================
// Session-level downloads
// ============================================================================

async fn session_browser() -> Browser<MockRenderEngine> {
    let engine = MockRenderEngine::new(EngineConfig::default())
        .await
        .unwrap();
    Browser::from_engine(engine).unwrap()
}

#[tokio::test]
async fn test_session_download_returns_payload() {
    let addr = start_server().await;
    let browser = session_browser().await;

    let bytes = browser
        .download(server_url(addr, "/greeting.txt").as_str())
        .await
        .unwrap();
    assert_eq!(bytes, b"Hello from the fixture server\n");
}

#[tokio::test]
async fn test_session_download_sends_matching_cookies_only() {
    let addr = start_server().await;
    let browser = session_browser().await;

    // Only the host cookie for the server address applies; the
    // other-domain and secure-only cookies must stay home.
    browser
        .engine()
        .simulate_cookie(Cookie::new("sid", "s3cret").with_domain("127.0.0.1"))
        .await;
    browser
        .engine()
        .simulate_cookie(Cookie::new("other", "x").with_domain("elsewhere.test"))
        .await;
    browser
        .engine()
        .simulate_cookie(
            Cookie::new("tls_only", "y")
                .with_domain("127.0.0.1")
                .with_secure(true),
        )
        .await;

    let body = browser
        .download(server_url(addr, "/whoami").as_str())
        .await
        .unwrap();
    assert_eq!(body, b"sid=s3cret");
}

#[tokio::test]
async fn test_session_download_to_counts_bytes() {
    let addr = start_server().await;
    let browser = session_browser().await;

    let mut sink: Vec<u8> = Vec::new();
    let written = browser
        .download_to(server_url(addr, "/payload.bin").as_str(), &mut sink)
        .await
        .unwrap();

    assert_eq!(written, payload().len() as u64);
    assert_eq!(sink, payload());
}

#[tokio::test]
async fn test_session_download_rejects_unsupported_scheme() {
    let browser = session_browser().await;

    let err = browser
        .download("ftp://fixture.test/archive.tar")
        .await
        .unwrap_err();
    assert!(matches!(err, BrowserError::Operation(_)));
}
