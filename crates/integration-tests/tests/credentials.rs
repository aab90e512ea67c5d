//! Integration tests for credential registration and the vault at rest.

#![allow(clippy::unwrap_used)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use secrecy::ExposeSecret;
use shopgate_core::ShopDomain;
use shopgate_integration_tests::{BACKEND_SECRET, TestApp};
use shopgate_server::auth::SigningSecrets;
use shopgate_server::vault::{CredentialLookup, VaultError};

const TOKEN: &str = "shpat_abc123";

fn register(secret: &str, body: &serde_json::Value) -> Request<Body> {
    Request::post("/api/credentials")
        .header("x-shopgate-secret", secret)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn foo() -> ShopDomain {
    ShopDomain::parse("foo.myshopify.com").unwrap()
}

#[tokio::test]
async fn test_register_then_decrypt() {
    let app = TestApp::spawn().await;

    let response = app
        .send(register(
            BACKEND_SECRET,
            &serde_json::json!({"shop": "https://FOO.myshopify.com/", "access_token": TOKEN}),
        ))
        .await;

    assert_eq!(response.status, StatusCode::CREATED);
    let json = response.json();
    assert_eq!(json["shop"], "foo.myshopify.com");
    assert!(json.get("access_token").is_none());

    let row = app.store.row(&foo()).unwrap();
    assert!(!row.token_ciphertext_b64.contains(TOKEN));
    assert_ne!(row.token_ciphertext_b64, TOKEN);

    let token = app
        .state
        .vault()
        .decrypt(&CredentialLookup::shop(foo()))
        .await
        .unwrap();
    assert_eq!(token.expose_secret(), TOKEN);
}

#[tokio::test]
async fn test_reinstall_replaces_row() {
    let app = TestApp::spawn().await;

    for token in ["shpat_first", "shpat_second"] {
        let response = app
            .send(register(
                BACKEND_SECRET,
                &serde_json::json!({"shop": "foo", "client_id": "cid-1", "access_token": token}),
            ))
            .await;
        assert_eq!(response.status, StatusCode::CREATED);
    }

    assert_eq!(app.store.len(), 1);
    let token = app
        .state
        .vault()
        .decrypt(&CredentialLookup::client_id("cid-1"))
        .await
        .unwrap();
    assert_eq!(token.expose_secret(), "shpat_second");
}

#[tokio::test]
async fn test_tampered_row_never_yields_plaintext() {
    let app = TestApp::spawn().await;
    app.send(register(
        BACKEND_SECRET,
        &serde_json::json!({"shop": "foo", "access_token": TOKEN}),
    ))
    .await;

    let mut row = app.store.row(&foo()).unwrap();
    let mut chars: Vec<char> = row.token_ciphertext_b64.chars().collect();
    chars[0] = if chars[0] == 'A' { 'B' } else { 'A' };
    row.token_ciphertext_b64 = chars.into_iter().collect();
    app.store.put_row(row);

    let err = app
        .state
        .vault()
        .decrypt(&CredentialLookup::shop(foo()))
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::Integrity));
}

#[tokio::test]
async fn test_wrong_secret_is_unauthorized() {
    let app = TestApp::spawn().await;

    let response = app
        .send(register(
            "not-the-secret",
            &serde_json::json!({"shop": "foo", "access_token": TOKEN}),
        ))
        .await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert!(app.store.is_empty());
}

#[tokio::test]
async fn test_shop_mismatch_is_bad_request() {
    let app = TestApp::spawn().await;

    let request = Request::post("/api/credentials")
        .header("x-shopgate-secret", BACKEND_SECRET)
        .header("x-shop-domain", "bar.myshopify.com")
        .body(Body::from(
            serde_json::json!({"shop": "foo", "access_token": TOKEN}).to_string(),
        ))
        .unwrap();
    let response = app.send(request).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(app.store.is_empty());
}

#[tokio::test]
async fn test_invalid_body_is_bad_request() {
    let app = TestApp::spawn().await;

    for body in [
        serde_json::json!({"shop": "example.com", "access_token": TOKEN}),
        serde_json::json!({"shop": "foo", "access_token": ""}),
        serde_json::json!({"shop": "foo"}),
    ] {
        let response = app.send(register(BACKEND_SECRET, &body)).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "{body}");
    }
    assert!(app.store.is_empty());
}

#[tokio::test]
async fn test_purge_is_idempotent() {
    let app = TestApp::spawn().await;
    app.send(register(
        BACKEND_SECRET,
        &serde_json::json!({"shop": "foo", "access_token": TOKEN}),
    ))
    .await;

    for _ in 0..2 {
        let response = app
            .send(
                Request::delete("/api/credentials/foo.myshopify.com")
                    .header("x-shopgate-secret", BACKEND_SECRET)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status, StatusCode::NO_CONTENT);
    }
    assert!(app.store.is_empty());
}

#[tokio::test]
async fn test_unsigned_dev_mode_accepts_backend_calls() {
    let app = TestApp::builder()
        .secrets(SigningSecrets {
            allow_unsigned: true,
            ..SigningSecrets::default()
        })
        .spawn()
        .await;

    let response = app
        .send(
            Request::post("/api/credentials")
                .body(Body::from(
                    serde_json::json!({"shop": "foo", "access_token": TOKEN}).to_string(),
                ))
                .unwrap(),
        )
        .await;

    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(app.store.len(), 1);
}

#[tokio::test]
async fn test_missing_backend_secret_is_configuration_error() {
    let app = TestApp::builder()
        .secrets(SigningSecrets::default())
        .spawn()
        .await;

    let response = app
        .send(register(
            BACKEND_SECRET,
            &serde_json::json!({"shop": "foo", "access_token": TOKEN}),
        ))
        .await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.json()["error"], "configuration");
    assert!(app.store.is_empty());
}
