//! Account opening.

use ledger_core::environment::Clock;
use ledger_core::{Account, AccountId, ClientId, TransactionBackend, UnitOfWork};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::TransferError;

/// Request body for `POST /accounts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAccountInput {
    /// Owning client
    pub client_id: ClientId,
}

/// A freshly opened account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountOutput {
    /// Account id
    pub id: AccountId,
}

/// Opens an empty account for an existing client.
///
/// There is no deposit operation; new accounts always start at zero.
pub struct CreateAccount<B: TransactionBackend> {
    uow: Arc<UnitOfWork<B>>,
    clock: Arc<dyn Clock>,
}

impl<B: TransactionBackend> CreateAccount<B> {
    /// Create the use case.
    #[must_use]
    pub fn new(uow: Arc<UnitOfWork<B>>, clock: Arc<dyn Clock>) -> Self {
        Self { uow, clock }
    }

    /// Open and persist an account.
    ///
    /// # Errors
    ///
    /// - [`TransferError::ClientNotFound`] when the client does not exist
    /// - [`TransferError::Persistence`] or [`TransferError::UnitOfWork`] when
    ///   storage fails
    pub async fn execute(&self, input: CreateAccountInput) -> Result<AccountOutput, TransferError> {
        let clock = Arc::clone(&self.clock);
        let client_id = input.client_id;

        let id = self
            .uow
            .run(move |scope| {
                Box::pin(async move {
                    let client = scope
                        .clients()?
                        .get(client_id)
                        .await?
                        .ok_or(TransferError::ClientNotFound(client_id))?;
                    let account = Account::open(Some(&client), clock.as_ref())?;
                    scope.accounts()?.save(&account).await?;
                    Ok::<_, TransferError>(account.id())
                })
            })
            .await?;

        tracing::info!(account_id = %id, client_id = %client_id, "Account opened");
        Ok(AccountOutput { id })
    }
}
