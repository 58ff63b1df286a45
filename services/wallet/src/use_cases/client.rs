//! Client registration.

use chrono::{DateTime, Utc};
use ledger_core::environment::Clock;
use ledger_core::{Client, ClientId, TransactionBackend, UnitOfWork};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::TransferError;

/// Request body for `POST /clients`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateClientInput {
    /// Display name
    pub name: String,
    /// Contact email
    pub email: String,
}

/// A persisted client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientOutput {
    /// Client id
    pub id: ClientId,
    /// Display name
    pub name: String,
    /// Contact email
    pub email: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last change
    pub updated_at: DateTime<Utc>,
}

impl From<&Client> for ClientOutput {
    fn from(client: &Client) -> Self {
        Self {
            id: client.id(),
            name: client.name().to_string(),
            email: client.email().to_string(),
            created_at: client.created_at(),
            updated_at: client.updated_at(),
        }
    }
}

/// Registers a new client.
pub struct CreateClient<B: TransactionBackend> {
    uow: Arc<UnitOfWork<B>>,
    clock: Arc<dyn Clock>,
}

impl<B: TransactionBackend> CreateClient<B> {
    /// Create the use case.
    #[must_use]
    pub fn new(uow: Arc<UnitOfWork<B>>, clock: Arc<dyn Clock>) -> Self {
        Self { uow, clock }
    }

    /// Validate and persist a client.
    ///
    /// # Errors
    ///
    /// - [`TransferError::Validation`] for an empty name or email
    /// - [`TransferError::Persistence`] or [`TransferError::UnitOfWork`] when
    ///   storage fails
    pub async fn execute(&self, input: CreateClientInput) -> Result<ClientOutput, TransferError> {
        let client = Client::new(input.name, input.email, self.clock.as_ref())?;
        let output = ClientOutput::from(&client);

        self.uow
            .run(move |scope| {
                Box::pin(async move {
                    scope.clients()?.save(&client).await?;
                    Ok::<_, TransferError>(())
                })
            })
            .await?;

        tracing::info!(client_id = %output.id, "Client created");
        Ok(output)
    }
}
