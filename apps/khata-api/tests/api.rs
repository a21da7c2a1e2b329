//! End-to-end tests through the HTTP router on an in-memory database.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use khata_api::{app, ApiConfig, AppState};
use khata_db::{Database, DbConfig};
use serde_json::{json, Value};
use tower::ServiceExt;

const PASSWORD: &str = "chai-and-biscuits";

async fn test_app() -> (Router, Arc<AppState>) {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let state = AppState::new(db, ApiConfig::default());
    (app(state.clone()), state)
}

async fn send(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

/// Registers "Sharma Traders" and returns (company id, admin token).
async fn signup(app: &Router) -> (String, String) {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/v1/companies",
        None,
        Some(json!({
            "name": "Sharma Traders",
            "gstin": "27AAPFU0939F1ZV",
            "admin_username": "owner",
            "admin_full_name": "Rakesh Sharma",
            "admin_password": PASSWORD,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    (
        body["company"]["id"].as_str().unwrap().to_string(),
        body["token"].as_str().unwrap().to_string(),
    )
}

async fn create_rice(app: &Router, token: &str) -> Value {
    let (status, item) = send(
        app,
        Method::POST,
        "/api/v1/items",
        Some(token),
        Some(json!({
            "sku": "RICE-5KG",
            "name": "Basmati Rice 5kg",
            "hsn_code": "1006",
            "sale_price": 65_000,
            "purchase_price": 50_000,
            "tax_rate": 500,
            "opening_stock": 10,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", item);
    item
}

async fn add_cashier(app: &Router, token: &str) {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/v1/users",
        Some(token),
        Some(json!({
            "username": "counter1",
            "full_name": "Imran Shaikh",
            "roles": ["cashier"],
            "password": PASSWORD,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
}

async fn login(app: &Router, company_id: &str, username: &str, password: &str) -> (StatusCode, Value) {
    send(
        app,
        Method::POST,
        "/api/v1/auth/login",
        None,
        Some(json!({ "company_id": company_id, "username": username, "password": password })),
    )
    .await
}

#[tokio::test]
async fn test_health_reports_serving() {
    let (app, _) = test_app().await;
    let (status, body) = send(&app, Method::GET, "/api/v1/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "serving");
    assert_eq!(body["migrations_applied"], body["migrations_total"]);
}

#[tokio::test]
async fn test_signup_then_login() {
    let (app, _) = test_app().await;
    let (company_id, _) = signup(&app).await;

    let (status, body) = login(&app, &company_id, "owner", PASSWORD).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["user"]["username"], "owner");
    assert!(body["permissions"].as_array().unwrap().iter().any(|p| p == "*"));

    let token = body["token"].as_str().unwrap();
    let (status, me) = send(&app, Method::GET, "/api/v1/auth/me", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["roles"], json!(["admin"]));
}

#[tokio::test]
async fn test_login_failures_look_the_same() {
    let (app, _) = test_app().await;
    let (company_id, _) = signup(&app).await;

    let (wrong_password, a) = login(&app, &company_id, "owner", "not-the-password").await;
    let (unknown_user, b) = login(&app, &company_id, "ghost", PASSWORD).await;

    assert_eq!(wrong_password, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_user, StatusCode::UNAUTHORIZED);
    assert_eq!(a, b);
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let (app, _) = test_app().await;
    let (status, body) = send(&app, Method::GET, "/api/v1/items", None, None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_cashier_cannot_manage_items() {
    let (app, _) = test_app().await;
    let (company_id, admin_token) = signup(&app).await;
    add_cashier(&app, &admin_token).await;

    let (_, body) = login(&app, &company_id, "counter1", PASSWORD).await;
    let cashier_token = body["token"].as_str().unwrap();

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/items",
        Some(cashier_token),
        Some(json!({ "sku": "X1", "name": "Anything", "sale_price": 100, "tax_rate": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");

    let (status, _) = send(&app, Method::GET, "/api/v1/items", Some(cashier_token), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_duplicate_sku_conflicts() {
    let (app, _) = test_app().await;
    let (_, token) = signup(&app).await;
    create_rice(&app, &token).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/items",
        Some(&token),
        Some(json!({ "sku": "RICE-5KG", "name": "Again", "sale_price": 100, "tax_rate": 500 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");
}

#[tokio::test]
async fn test_other_company_is_not_found() {
    let (app, _) = test_app().await;
    let (_, token) = signup(&app).await;
    let item = create_rice(&app, &token).await;

    let (status, second) = send(
        &app,
        Method::POST,
        "/api/v1/companies",
        None,
        Some(json!({
            "name": "Gupta Stores",
            "state_code": 9,
            "admin_username": "owner",
            "admin_full_name": "Meena Gupta",
            "admin_password": PASSWORD,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", second);
    let other_token = second["token"].as_str().unwrap();

    let uri = format!("/api/v1/items/{}", item["id"].as_str().unwrap());
    let (status, _) = send(&app, Method::GET, &uri, Some(other_token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_pos_sale_flow() {
    let (app, state) = test_app().await;
    let (_, token) = signup(&app).await;
    let item = create_rice(&app, &token).await;
    let item_id = item["id"].as_str().unwrap();
    let mut feed = state.live.subscribe();

    let (status, session) = send(
        &app,
        Method::POST,
        "/api/v1/pos/sessions",
        Some(&token),
        Some(json!({ "terminal_id": "COUNTER-1", "opening_float": 50_000 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", session);
    let session_id = session["id"].as_str().unwrap();

    let (status, receipt) = send(
        &app,
        Method::POST,
        "/api/v1/pos/transactions",
        Some(&token),
        Some(json!({
            "session_id": session_id,
            "lines": [{ "item_id": item_id, "quantity": 2 }],
            "tenders": [{ "method": "cash", "amount": 150_000 }],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", receipt);
    assert_eq!(receipt["grand_total"], 130_000);
    assert_eq!(receipt["change"], 20_000);
    assert_eq!(receipt["lines"].as_array().unwrap().len(), 1);

    let uri = format!("/api/v1/items/{}", item_id);
    let (_, item) = send(&app, Method::GET, &uri, Some(&token), None).await;
    assert_eq!(item["current_stock"], 8);

    let opened = feed.recv().await.unwrap();
    assert_eq!(serde_json::to_value(&opened).unwrap()["type"], "session_opened");
    let sold = feed.recv().await.unwrap();
    assert_eq!(serde_json::to_value(&sold).unwrap()["type"], "sale_completed");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/pos/transactions",
        Some(&token),
        Some(json!({
            "session_id": session_id,
            "lines": [{ "item_id": item_id, "quantity": 1 }],
            "tenders": [{ "method": "cash", "amount": 100 }],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "PAYMENT_ERROR");
}

#[tokio::test]
async fn test_unbalanced_journal_is_rejected() {
    let (app, _) = test_app().await;
    let (_, token) = signup(&app).await;

    let (_, accounts) = send(&app, Method::GET, "/api/v1/accounts", Some(&token), None).await;
    let ids: Vec<&str> = accounts
        .as_array()
        .unwrap()
        .iter()
        .take(2)
        .map(|a| a["id"].as_str().unwrap())
        .collect();

    let today = khata_api::today_ist().to_string();
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/journals",
        Some(&token),
        Some(json!({
            "entry_date": today,
            "voucher_type": "journal",
            "narration": "Typo",
            "lines": [
                { "account_id": ids[0], "debit": 10_000, "credit": 0 },
                { "account_id": ids[1], "debit": 0, "credit": 9_000 },
            ],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
    assert_eq!(body["code"], "UNBALANCED_ENTRY");
}
