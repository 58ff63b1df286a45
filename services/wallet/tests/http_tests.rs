//! HTTP surface over the in-memory ledger.

#![allow(clippy::unwrap_used)] // Tests can unwrap

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use ledger_core::EventDispatcher;
use ledger_testing::{InMemoryLedger, ledger_clock};
use rust_decimal_macros::dec;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;
use wallet_service::{AppState, build_router};

fn app(ledger: &InMemoryLedger) -> Router {
    let state = AppState::new(
        Arc::new(ledger.unit_of_work()),
        Arc::new(EventDispatcher::new()),
        ledger_clock(),
    );
    build_router(state)
}

async fn call(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.map_or_else(Body::empty, |json| Body::from(json.to_string())))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_health() {
    let (status, body) = call(app(&InMemoryLedger::new()), "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_create_client_and_account() {
    let ledger = InMemoryLedger::new();

    let (status, client) = call(
        app(&ledger),
        "POST",
        "/clients",
        Some(json!({ "name": "Dana", "email": "dana@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(client["name"], "Dana");
    assert_eq!(client["email"], "dana@example.com");

    let (status, account) = call(
        app(&ledger),
        "POST",
        "/accounts",
        Some(json!({ "client_id": client["id"] })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(account["id"].is_string());
}

#[tokio::test]
async fn test_invalid_client_is_unprocessable() {
    let (status, body) = call(
        app(&InMemoryLedger::new()),
        "POST",
        "/clients",
        Some(json!({ "name": "Dana", "email": "" })),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert_eq!(body["message"], "email is required");
}

#[tokio::test]
async fn test_account_for_unknown_client_is_not_found() {
    let (status, body) = call(
        app(&InMemoryLedger::new()),
        "POST",
        "/accounts",
        Some(json!({ "client_id": "7f1b7a52-2b6c-4d0e-9a57-3f3a1c0c9d11" })),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_transfer_endpoint() {
    let ledger = InMemoryLedger::new();
    let (alice, bob) = ledger.seed_pair(dec!(100), dec!(0));

    let (status, body) = call(
        app(&ledger),
        "POST",
        "/transactions",
        Some(json!({
            "account_id_from": alice.to_string(),
            "account_id_to": bob.to_string(),
            "amount": "40",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["account_id_from"], alice.to_string());
    assert_eq!(body["amount"], "40");
    assert_eq!(ledger.account(bob).unwrap().balance(), dec!(40));
}

#[tokio::test]
async fn test_overdraft_is_unprocessable() {
    let ledger = InMemoryLedger::new();
    let (alice, bob) = ledger.seed_pair(dec!(100), dec!(0));

    let (status, body) = call(
        app(&ledger),
        "POST",
        "/transactions",
        Some(json!({
            "account_id_from": alice.to_string(),
            "account_id_to": bob.to_string(),
            "amount": "150",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["message"], "insufficient funds in source account");
}

#[tokio::test]
async fn test_storage_failure_is_internal_error() {
    let ledger = InMemoryLedger::new();
    let (alice, bob) = ledger.seed_pair(dec!(100), dec!(0));
    ledger.faults().fail_account_update(true);

    let (status, body) = call(
        app(&ledger),
        "POST",
        "/transactions",
        Some(json!({
            "account_id_from": alice.to_string(),
            "account_id_to": bob.to_string(),
            "amount": "10",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "INTERNAL_SERVER_ERROR");
    assert_eq!(ledger.account(alice).unwrap().balance(), dec!(100));
}
