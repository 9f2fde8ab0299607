#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Method, Request, StatusCode, header},
    response::Response,
};
use dbprobe::server::{AppState, router};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::{net::SocketAddr, time::Duration};
use tower::ServiceExt;

fn test_router() -> axum::Router {
    router(AppState {
        connect_timeout: Duration::from_secs(5),
    })
}

/// `axum::serve` injects `ConnectInfo` for real connections; oneshot
/// requests carry it as an extension instead.
fn with_caller(mut request: Request<Body>) -> Request<Body> {
    let addr: SocketAddr = "127.0.0.1:54321".parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(addr));
    request
}

async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Bind and drop a loopback listener so the freed port refuses connections
async fn refused_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

#[tokio::test]
async fn test_unknown_path_returns_404() {
    let request = Request::builder()
        .method(Method::GET)
        .uri("/nonexistent")
        .body(Body::empty())
        .unwrap();

    let response = test_router().oneshot(with_caller(request)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await, json!({"error": "Not found"}));
}

#[tokio::test]
async fn test_wrong_method_on_known_path_returns_404() {
    let request = Request::builder()
        .method(Method::GET)
        .uri("/api/test-connection")
        .body(Body::empty())
        .unwrap();

    let response = test_router().oneshot(with_caller(request)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await, json!({"error": "Not found"}));
}

#[tokio::test]
async fn test_options_returns_204() {
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/anything")
        .body(Body::empty())
        .unwrap();

    let response = test_router().oneshot(with_caller(request)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert!(bytes.is_empty());
}

#[tokio::test]
async fn test_check_ssl_without_domain_returns_400() {
    let request = Request::builder()
        .method(Method::GET)
        .uri("/check-ssl")
        .body(Body::empty())
        .unwrap();

    let response = test_router().oneshot(with_caller(request)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await,
        json!({"error": "Please provide ?domain=example.com"})
    );
}

#[tokio::test]
async fn test_check_ssl_with_blank_domain_returns_400() {
    let request = Request::builder()
        .method(Method::GET)
        .uri("/check-ssl?domain=%20%20")
        .body(Body::empty())
        .unwrap();

    let response = test_router().oneshot(with_caller(request)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

fn connection_request(body: &Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/test-connection")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_connection_missing_fields() {
    let request = connection_request(&json!({
        "db_host": "localhost",
        "db_pass": "secret",
    }));

    let response = test_router().oneshot(with_caller(request)).await.unwrap();
    // Validation failures stay HTTP 200; the success flag carries the outcome
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Missing required fields");
    assert_eq!(
        body["error"],
        "Host, database name, and username are required"
    );
}

#[tokio::test]
async fn test_connection_whitespace_fields_are_missing() {
    let request = connection_request(&json!({
        "db_host": "   ",
        "db_name": "inventory",
        "db_user": "app",
        "db_pass": "",
    }));

    let response = test_router().oneshot(with_caller(request)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Missing required fields");
}

#[tokio::test]
async fn test_connection_refused_is_normalized() {
    let port = refused_port().await;
    let request = connection_request(&json!({
        "db_host": "127.0.0.1",
        "db_name": "inventory",
        "db_user": "app",
        "db_pass": "secret",
        "db_port": port,
    }));

    let response = test_router().oneshot(with_caller(request)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Database connection failed");
    assert_eq!(
        body["error"],
        "Could not connect to database server. Please check if the server is running and the host is correct."
    );
    // Raw driver text stays available for debugging
    assert!(body["details"]["raw"].as_str().is_some());
}

#[tokio::test]
async fn test_tls_inspect_refused_port() {
    let port = refused_port().await;

    let result = dbprobe::probe::tls::inspect("127.0.0.1", port, Duration::from_secs(5)).await;
    assert!(result.is_err());

    let text = format!("{:#}", result.unwrap_err());
    assert!(text.contains(&format!("failed to connect to 127.0.0.1:{port}")));
}

#[tokio::test]
async fn test_tls_inspect_non_tls_server() {
    // A listener that accepts and immediately closes makes the handshake
    // fail; the probe must surface an error, not hang or panic
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        if let Ok((stream, _)) = listener.accept().await {
            drop(stream);
        }
    });

    let result = dbprobe::probe::tls::inspect("127.0.0.1", port, Duration::from_secs(5)).await;
    assert!(result.is_err());

    let text = format!("{:#}", result.unwrap_err());
    assert!(text.contains("TLS handshake with 127.0.0.1"));
}
