//! Query API over the in-memory replica.

#![allow(clippy::unwrap_used)] // Tests can unwrap

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use balance_service::{AppState, GetAccountBalance, build_router};
use ledger_core::AccountId;
use ledger_core::projection::AccountBalance;
use ledger_testing::InMemoryBalanceStore;
use rust_decimal_macros::dec;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

fn app(store: &InMemoryBalanceStore) -> Router {
    build_router(AppState {
        get_balance: Arc::new(GetAccountBalance::new(Arc::new(store.clone()))),
    })
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn test_get_balance() {
    let store = InMemoryBalanceStore::new();
    let alice = AccountId::new();
    store.seed(AccountBalance::new(alice, dec!(60), 2).unwrap());

    let (status, body) = get(app(&store), &format!("/balances/{alice}")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["account_id"], alice.to_string());
    assert_eq!(body["balance"], "60");
}

#[tokio::test]
async fn test_unknown_account_is_not_found() {
    let (status, body) = get(app(&InMemoryBalanceStore::new()), &format!("/balances/{}", AccountId::new())).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_malformed_id_is_rejected() {
    let (status, _) = get(app(&InMemoryBalanceStore::new()), "/balances/not-a-uuid").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health() {
    let (status, body) = get(app(&InMemoryBalanceStore::new()), "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}
