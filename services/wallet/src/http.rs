//! HTTP surface of the ledger service.
//!
//! | Method | Path            | Use case         |
//! |--------|-----------------|------------------|
//! | POST   | `/clients`      | [`CreateClient`]   |
//! | POST   | `/accounts`     | [`CreateAccount`]  |
//! | POST   | `/transactions` | [`CreateTransfer`] |
//! | GET    | `/health`       | liveness         |

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use ledger_core::environment::Clock;
use ledger_core::{EventDispatcher, TransactionBackend, UnitOfWork, UnitOfWorkError};
use ledger_web::{AppError, WebResult, health_check};
use std::sync::Arc;

use crate::error::TransferError;
use crate::use_cases::{
    AccountOutput, ClientOutput, CreateAccount, CreateAccountInput, CreateClient,
    CreateClientInput, CreateTransfer, CreateTransferInput, TransferOutput,
};

/// Use cases shared with the handlers.
pub struct AppState<B: TransactionBackend> {
    /// `POST /clients`
    pub create_client: Arc<CreateClient<B>>,
    /// `POST /accounts`
    pub create_account: Arc<CreateAccount<B>>,
    /// `POST /transactions`
    pub create_transfer: Arc<CreateTransfer<B>>,
}

impl<B: TransactionBackend> AppState<B> {
    /// Build every use case over one unit of work.
    #[must_use]
    pub fn new(
        uow: Arc<UnitOfWork<B>>,
        dispatcher: Arc<EventDispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            create_client: Arc::new(CreateClient::new(Arc::clone(&uow), Arc::clone(&clock))),
            create_account: Arc::new(CreateAccount::new(Arc::clone(&uow), Arc::clone(&clock))),
            create_transfer: Arc::new(CreateTransfer::new(uow, dispatcher, clock)),
        }
    }
}

impl<B: TransactionBackend> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            create_client: Arc::clone(&self.create_client),
            create_account: Arc::clone(&self.create_account),
            create_transfer: Arc::clone(&self.create_transfer),
        }
    }
}

impl From<TransferError> for AppError {
    fn from(error: TransferError) -> Self {
        match error {
            TransferError::Validation(domain) => Self::validation(domain.to_string()),
            TransferError::AccountNotFound(id) => Self::not_found("Account", id),
            TransferError::ClientNotFound(id) => Self::not_found("Client", id),
            TransferError::UnitOfWork(UnitOfWorkError::TimedOut(limit)) => {
                Self::unavailable(format!("request timed out after {limit:?}"))
            },
            error @ (TransferError::Persistence(_) | TransferError::UnitOfWork(_)) => {
                Self::internal("An internal error occurred").with_source(error)
            },
        }
    }
}

/// Build the router.
pub fn build_router<B: TransactionBackend>(state: AppState<B>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/clients", post(create_client::<B>))
        .route("/accounts", post(create_account::<B>))
        .route("/transactions", post(create_transfer::<B>))
        .with_state(state)
}

async fn create_client<B: TransactionBackend>(
    State(state): State<AppState<B>>,
    Json(input): Json<CreateClientInput>,
) -> WebResult<(StatusCode, Json<ClientOutput>)> {
    let output = state.create_client.execute(input).await?;
    Ok((StatusCode::CREATED, Json(output)))
}

async fn create_account<B: TransactionBackend>(
    State(state): State<AppState<B>>,
    Json(input): Json<CreateAccountInput>,
) -> WebResult<(StatusCode, Json<AccountOutput>)> {
    let output = state.create_account.execute(input).await?;
    Ok((StatusCode::CREATED, Json(output)))
}

async fn create_transfer<B: TransactionBackend>(
    State(state): State<AppState<B>>,
    Json(input): Json<CreateTransferInput>,
) -> WebResult<(StatusCode, Json<TransferOutput>)> {
    let output = state.create_transfer.execute(input).await?;
    Ok((StatusCode::CREATED, Json(output)))
}
