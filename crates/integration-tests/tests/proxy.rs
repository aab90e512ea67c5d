//! Integration tests for the storefront app proxy.

#![allow(clippy::unwrap_used)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use shopgate_integration_tests::{TestApp, signed_proxy_uri};

const PARAMS: [(&str, &str); 4] = [
    ("shop", "foo.myshopify.com"),
    ("path_prefix", "/apps/x"),
    ("timestamp", "1700000000"),
    ("logged_in_customer_id", ""),
];

#[tokio::test]
async fn test_signed_proxy_request_is_relayed() {
    let app = TestApp::spawn().await;

    let response = app
        .send(
            Request::get(signed_proxy_uri("/proxy/wishlist", &PARAMS))
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["accepted"], true);

    let jobs = app.engine.jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].job, "proxy");
    assert_eq!(jobs[0].shop.as_deref(), Some("foo.myshopify.com"));

    let envelope: serde_json::Value = serde_json::from_slice(&jobs[0].body).unwrap();
    assert_eq!(envelope["method"], "GET");
    assert_eq!(envelope["path"], "/proxy/wishlist");
    assert_eq!(envelope["shop"], "foo.myshopify.com");
    let query = envelope["query"].as_array().unwrap();
    assert_eq!(query.len(), 4);
    assert!(!query.iter().any(|pair| pair[0] == "signature"));
}

#[tokio::test]
async fn test_tampered_parameter_is_rejected() {
    let app = TestApp::spawn().await;
    let uri = signed_proxy_uri("/proxy", &PARAMS).replace("1700000000", "1700000001");

    let response = app
        .send(Request::get(uri).body(Body::empty()).unwrap())
        .await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.json()["error"], "unauthorized");
    assert_eq!(response.json()["message"], "Unauthorized");
    assert!(app.engine.jobs().is_empty());

    let entries = app.error_entries(1).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, 401);
    assert_eq!(
        entries[0].shop.as_ref().map(|s| s.as_str()),
        Some("foo.myshopify.com")
    );
}

#[tokio::test]
async fn test_uppercase_hex_signature_is_accepted() {
    let app = TestApp::spawn().await;
    let uri = signed_proxy_uri("/proxy", &PARAMS);
    let (path, signature) = uri.rsplit_once("signature=").unwrap();
    let uri = format!("{path}signature={}", signature.to_uppercase());

    let response = app
        .send(Request::get(uri).body(Body::empty()).unwrap())
        .await;

    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_missing_signature_is_rejected() {
    let app = TestApp::spawn().await;

    let response = app
        .send(
            Request::get("/proxy?shop=foo.myshopify.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert!(app.engine.jobs().is_empty());
}

#[tokio::test]
async fn test_post_body_is_embedded_in_envelope() {
    let app = TestApp::spawn().await;

    let response = app
        .send(
            Request::post(signed_proxy_uri("/proxy/reviews", &PARAMS))
                .header("content-type", "application/json")
                .body(Body::from(r#"{"rating":5}"#))
                .unwrap(),
        )
        .await;

    assert_eq!(response.status, StatusCode::OK);
    let jobs = app.engine.jobs();
    let envelope: serde_json::Value = serde_json::from_slice(&jobs[0].body).unwrap();
    assert_eq!(envelope["method"], "POST");
    assert_eq!(envelope["body"]["rating"], 5);
}
