#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{header, Method, Request},
    response::Response,
    Router,
};
use invoicing_api::{
    app_router,
    auth::{AuthConfig, AuthService},
    config::AppConfig,
    db,
    events::{self},
    handlers::AppServices,
    services::{
        mailer::{parse_mailbox, MailError, Mailer, OutgoingEmail},
        pdf::PrintPdfRenderer,
    },
    AppState,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

pub const JWT_SECRET: &str = "test_secret_key_for_invoicing_tests_only_0123456789";

/// Mailer that keeps every message in memory
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
    fail: AtomicBool,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().unwrap().clone()
    }

    /// Makes every following send fail with a transport error
    pub fn fail_deliveries(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        parse_mailbox(&email.to)?;
        if self.fail.load(Ordering::SeqCst) {
            return Err(MailError::Transport("connection refused".into()));
        }
        self.sent.lock().unwrap().push(email);
        Ok(())
    }
}

/// Application backed by an in-memory SQLite database
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub auth: Arc<AuthService>,
    pub mailer: Arc<RecordingMailer>,
    pub user_id: Uuid,
    token: String,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            JWT_SECRET.to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.cors_allow_any_origin = true;
        // A single connection keeps every query on the same in-memory database
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_sender, event_rx) = events::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let auth = Arc::new(AuthService::new(AuthConfig::from(&cfg)));
        let mailer = Arc::new(RecordingMailer::default());

        let services = AppServices::new(
            db_arc.clone(),
            Arc::new(event_sender.clone()),
            Arc::new(PrintPdfRenderer::new()),
            mailer.clone(),
            &cfg,
        );

        let state = AppState {
            db: db_arc,
            config: cfg,
            auth: auth.clone(),
            event_sender,
            services,
        };

        let user_id = Uuid::new_v4();
        let token = auth
            .issue_token(
                user_id,
                Some("owner@example.com".into()),
                Some("Test Owner".into()),
                Duration::from_secs(3600),
            )
            .expect("issue test token");

        Self {
            router: app_router(state.clone()),
            state,
            auth,
            mailer,
            user_id,
            token,
            _event_task: event_task,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Token for a different user of the same deployment
    pub fn token_for(&self, user_id: Uuid) -> String {
        self.auth
            .issue_token(user_id, None, None, Duration::from_secs(3600))
            .expect("issue token")
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn request_authenticated(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Response {
        self.request(method, uri, body, Some(&self.token)).await
    }

    /// Creates the profile for the default test user
    pub async fn create_profile(&self) -> Value {
        let response = self
            .request_authenticated(
                Method::POST,
                "/api/auth/profile",
                Some(json!({
                    "email": "owner@example.com",
                    "name": "Test Owner",
                    "company_name": "Owner Studio",
                    "company_address": "1 Main Street\nSpringfield",
                    "bank_name": "First Bank",
                    "bank_iban": "DE89370400440532013000",
                    "invoice_prefix": "INV"
                })),
            )
            .await;
        assert_eq!(response.status(), 201, "profile creation failed");
        response_json(response).await["data"].clone()
    }

    pub async fn create_client(&self, name: &str, email: Option<&str>) -> Uuid {
        let response = self
            .request_authenticated(
                Method::POST,
                "/api/clients",
                Some(json!({ "name": name, "email": email })),
            )
            .await;
        assert_eq!(response.status(), 201, "client creation failed");
        let body = response_json(response).await;
        body["data"]["id"].as_str().unwrap().parse().unwrap()
    }

    /// Creates a draft invoice and returns the full detail payload
    pub async fn create_invoice(&self, client_id: Uuid, line_items: Value) -> Value {
        let response = self
            .request_authenticated(
                Method::POST,
                "/api/invoices",
                Some(json!({
                    "client_id": client_id,
                    "issue_date": "2024-03-01",
                    "line_items": line_items,
                })),
            )
            .await;
        assert_eq!(response.status(), 201, "invoice creation failed");
        response_json(response).await["data"].clone()
    }

    /// Profile, one client with an email address and one single-line invoice
    pub async fn seeded_invoice(&self) -> (Uuid, Uuid) {
        self.create_profile().await;
        let client_id = self
            .create_client("Acme Corp", Some("billing@acme.test"))
            .await;
        let detail = self
            .create_invoice(
                client_id,
                json!([{ "description": "Consulting", "quantity": "10", "unit_price": "100.00", "tax_rate": "20" }]),
            )
            .await;
        let invoice_id = detail["invoice"]["id"].as_str().unwrap().parse().unwrap();
        (client_id, invoice_id)
    }

    pub async fn change_status(&self, invoice_id: Uuid, status: &str) -> Response {
        self.request_authenticated(
            Method::POST,
            &format!("/api/invoices/{}/status", invoice_id),
            Some(json!({ "status": status })),
        )
        .await
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

pub async fn response_bytes(response: Response) -> Vec<u8> {
    body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes")
        .to_vec()
}

/// Decimal fields serialize as strings; compare them numerically
pub fn decimal(value: &Value) -> rust_decimal::Decimal {
    match value {
        Value::String(s) => s.parse().expect("decimal string"),
        Value::Number(n) => n.to_string().parse().expect("decimal number"),
        other => panic!("not a decimal: {other}"),
    }
}
