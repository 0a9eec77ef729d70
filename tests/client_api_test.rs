mod common;

use axum::http::{Method, StatusCode};
use common::{response_json, TestApp};
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn client_crud_round_trip() {
    let app = TestApp::new().await;
    app.create_profile().await;

    let created = app
        .request_authenticated(
            Method::POST,
            "/api/clients",
            Some(json!({
                "name": "Acme Corp",
                "email": "billing@acme.test",
                "address": "42 Industrial Way",
                "tax_id": "DE123456789"
            })),
        )
        .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let created = response_json(created).await;
    assert_eq!(created["data"]["status"], "active");
    let id = created["data"]["id"].as_str().unwrap().to_string();
    let uri = format!("/api/clients/{}", id);

    let updated = app
        .request_authenticated(
            Method::PUT,
            &uri,
            Some(json!({ "phone": "+49 30 1234567", "tax_id": "" })),
        )
        .await;
    assert_eq!(updated.status(), StatusCode::OK);
    let updated = response_json(updated).await;
    assert_eq!(updated["data"]["phone"], "+49 30 1234567");
    assert!(updated["data"]["tax_id"].is_null());
    assert_eq!(updated["data"]["name"], "Acme Corp");

    let fetched = response_json(app.request_authenticated(Method::GET, &uri, None).await).await;
    assert_eq!(fetched["data"]["email"], "billing@acme.test");

    let deleted = app.request_authenticated(Method::DELETE, &uri, None).await;
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);

    // still readable by id, gone from the list, immutable
    let fetched = response_json(app.request_authenticated(Method::GET, &uri, None).await).await;
    assert!(fetched["data"]["deleted_at"].is_string());

    let listed = response_json(
        app.request_authenticated(Method::GET, "/api/clients", None)
            .await,
    )
    .await;
    assert_eq!(listed["data"]["total"], 0);

    let update_deleted = app
        .request_authenticated(Method::PUT, &uri, Some(json!({ "name": "Zombie" })))
        .await;
    assert_eq!(update_deleted.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn client_validation_and_profile_requirement() {
    let app = TestApp::new().await;

    let without_profile = app
        .request_authenticated(Method::POST, "/api/clients", Some(json!({ "name": "Acme" })))
        .await;
    assert_eq!(without_profile.status(), StatusCode::NOT_FOUND);

    app.create_profile().await;

    let blank_name = app
        .request_authenticated(Method::POST, "/api/clients", Some(json!({ "name": "" })))
        .await;
    assert_eq!(blank_name.status(), StatusCode::BAD_REQUEST);

    let bad_email = app
        .request_authenticated(
            Method::POST,
            "/api/clients",
            Some(json!({ "name": "Acme", "email": "nope" })),
        )
        .await;
    assert_eq!(bad_email.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn list_searches_names_and_paginates() {
    let app = TestApp::new().await;
    app.create_profile().await;
    for name in ["Acme Corp", "Globex", "Initech", "Acme Labs"] {
        app.create_client(name, None).await;
    }

    let search = response_json(
        app.request_authenticated(Method::GET, "/api/clients?search=acme", None)
            .await,
    )
    .await;
    assert_eq!(search["data"]["total"], 2);
    let names: Vec<&str> = search["data"]["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Acme Corp", "Acme Labs"]);

    let page = response_json(
        app.request_authenticated(Method::GET, "/api/clients?page=2&limit=3", None)
            .await,
    )
    .await;
    assert_eq!(page["data"]["total"], 4);
    assert_eq!(page["data"]["total_pages"], 2);
    assert_eq!(page["data"]["items"].as_array().unwrap().len(), 1);
    assert_eq!(page["data"]["items"][0]["name"], "Initech");
}

#[tokio::test]
async fn archived_clients_cannot_be_invoiced() {
    let app = TestApp::new().await;
    app.create_profile().await;
    let client_id = app.create_client("Old Customer", None).await;

    app.request_authenticated(
        Method::PUT,
        &format!("/api/clients/{}", client_id),
        Some(json!({ "status": "archived" })),
    )
    .await;

    let response = app
        .request_authenticated(
            Method::POST,
            "/api/invoices",
            Some(json!({ "client_id": client_id, "line_items": [] })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn clients_of_other_users_are_invisible() {
    let app = TestApp::new().await;
    app.create_profile().await;
    let client_id = app.create_client("Acme Corp", None).await;
    let stranger = app.token_for(Uuid::new_v4());

    let response = app
        .request(
            Method::GET,
            &format!("/api/clients/{}", client_id),
            None,
            Some(&stranger),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let delete = app
        .request(
            Method::DELETE,
            &format!("/api/clients/{}", client_id),
            None,
            Some(&stranger),
        )
        .await;
    assert_eq!(delete.status(), StatusCode::NOT_FOUND);
}
