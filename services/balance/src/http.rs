//! HTTP surface of the balance service.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use ledger_core::AccountId;
use ledger_core::projection::BalanceStore;
use ledger_web::{AppError, WebResult, health_check};
use std::sync::Arc;

use crate::query::{BalanceOutput, GetAccountBalance, QueryError};

/// Shared handler state.
pub struct AppState<S: BalanceStore> {
    /// `GET /balances/{account_id}`
    pub get_balance: Arc<GetAccountBalance<S>>,
}

impl<S: BalanceStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            get_balance: Arc::clone(&self.get_balance),
        }
    }
}

impl From<QueryError> for AppError {
    fn from(error: QueryError) -> Self {
        match error {
            QueryError::BalanceNotFound(id) => Self::not_found("Balance for account", id),
            error @ QueryError::Storage(_) => {
                Self::internal("An internal error occurred").with_source(error)
            },
        }
    }
}

/// Build the router.
pub fn build_router<S: BalanceStore + 'static>(state: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/balances/:account_id", get(get_balance::<S>))
        .with_state(state)
}

async fn get_balance<S: BalanceStore + 'static>(
    State(state): State<AppState<S>>,
    Path(account_id): Path<AccountId>,
) -> WebResult<Json<BalanceOutput>> {
    Ok(Json(state.get_balance.execute(account_id).await?))
}
