mod common;

use axum::http::{header, Method, StatusCode};
use common::{response_json, TestApp};
use invoicing_api::auth::{AuthConfig, AuthService};
use std::time::Duration;
use uuid::Uuid;

#[tokio::test]
async fn health_endpoints_do_not_need_a_token() {
    let app = TestApp::new().await;

    let live = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(live.status(), StatusCode::OK);
    assert_eq!(response_json(live).await["status"], "up");

    let ready = app
        .request(Method::GET, "/health/readiness", None, None)
        .await;
    assert_eq!(ready.status(), StatusCode::OK);
    let ready = response_json(ready).await;
    assert_eq!(ready["ready"], true);
    assert_eq!(ready["details"]["database"]["status"], "up");

    let version = app.request(Method::GET, "/health/version", None, None).await;
    assert_eq!(
        response_json(version).await["name"],
        env!("CARGO_PKG_NAME")
    );
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = TestApp::new().await;
    let response = app
        .request(Method::GET, "/api-docs/openapi.json", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let doc = response_json(response).await;
    assert!(doc["paths"]["/api/invoices"].is_object());
}

#[tokio::test]
async fn api_routes_require_a_bearer_token() {
    let app = TestApp::new().await;

    for (method, uri) in [
        (Method::GET, "/api/auth/profile"),
        (Method::GET, "/api/clients"),
        (Method::GET, "/api/invoices"),
        (Method::POST, "/api/invoices/00000000-0000-0000-0000-000000000000/send"),
    ] {
        let response = app.request(method, uri, None, None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", uri);
        assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
    }
}

#[tokio::test]
async fn foreign_and_malformed_tokens_are_rejected() {
    let app = TestApp::new().await;

    let foreign = AuthService::new(AuthConfig {
        jwt_secret: "another_identity_provider_secret_0123456789abcdef".into(),
        jwt_issuer: None,
        jwt_audience: None,
    })
    .issue_token(Uuid::new_v4(), None, None, Duration::from_secs(600))
    .unwrap();
    let response = app
        .request(Method::GET, "/api/clients", None, Some(&foreign))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .request(Method::GET, "/api/clients", None, Some("garbage"))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn responses_echo_request_id() {
    let app = TestApp::new().await;
    let response = app.request(Method::GET, "/health", None, None).await;
    assert!(response.headers().contains_key("x-request-id"));
}
