//! Repositories bound to one open [`PgTransaction`].

use chrono::{DateTime, Utc};
use ledger_core::repository::RepositoryFuture;
use ledger_core::{
    Account, AccountId, AccountRepository, Client, ClientId, ClientRepository, RepositoryError,
    Transfer, TransferRepository,
};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{PgTransaction, map_sqlx_error};

type AccountRow = (Uuid, Uuid, Decimal, i64, DateTime<Utc>, DateTime<Utc>);

fn account_from_row(row: AccountRow) -> Account {
    let (id, client_id, balance, version, created_at, updated_at) = row;
    Account::restore(
        AccountId::from_uuid(id),
        ClientId::from_uuid(client_id),
        balance,
        version,
        created_at,
        updated_at,
    )
}

/// Client storage.
#[derive(Debug, Clone)]
pub struct PgClientRepository {
    tx: PgTransaction,
}

impl PgClientRepository {
    /// Bind to `tx`.
    #[must_use]
    pub const fn new(tx: PgTransaction) -> Self {
        Self { tx }
    }
}

impl ClientRepository for PgClientRepository {
    fn get(&self, id: ClientId) -> RepositoryFuture<'_, Option<Client>> {
        Box::pin(async move {
            let mut guard = self.tx.lock().await;
            let tx = guard.as_mut().ok_or(RepositoryError::TransactionClosed)?;

            let row: Option<(Uuid, String, String, DateTime<Utc>, DateTime<Utc>)> = sqlx::query_as(
                "SELECT id, name, email, created_at, updated_at FROM clients WHERE id = $1",
            )
            .bind(*id.as_uuid())
            .fetch_optional(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;

            let Some((id, name, email, created_at, updated_at)) = row else {
                return Ok(None);
            };

            let accounts: Vec<(Uuid,)> =
                sqlx::query_as("SELECT id FROM accounts WHERE client_id = $1 ORDER BY created_at")
                    .bind(id)
                    .fetch_all(&mut **tx)
                    .await
                    .map_err(map_sqlx_error)?;

            Ok(Some(Client::restore(
                ClientId::from_uuid(id),
                name,
                email,
                accounts.into_iter().map(|(id,)| AccountId::from_uuid(id)).collect(),
                created_at,
                updated_at,
            )))
        })
    }

    fn save(&self, client: &Client) -> RepositoryFuture<'_, ()> {
        let client = client.clone();
        Box::pin(async move {
            let mut guard = self.tx.lock().await;
            let tx = guard.as_mut().ok_or(RepositoryError::TransactionClosed)?;

            sqlx::query(
                "INSERT INTO clients (id, name, email, created_at, updated_at) VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(*client.id().as_uuid())
            .bind(client.name())
            .bind(client.email())
            .bind(client.created_at())
            .bind(client.updated_at())
            .execute(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;

            tracing::debug!(client_id = %client.id(), "Inserted client");
            Ok(())
        })
    }
}

/// Account storage.
#[derive(Debug, Clone)]
pub struct PgAccountRepository {
    tx: PgTransaction,
}

impl PgAccountRepository {
    /// Bind to `tx`.
    #[must_use]
    pub const fn new(tx: PgTransaction) -> Self {
        Self { tx }
    }
}

impl AccountRepository for PgAccountRepository {
    fn find_by_id(&self, id: AccountId) -> RepositoryFuture<'_, Option<Account>> {
        Box::pin(async move {
            let mut guard = self.tx.lock().await;
            let tx = guard.as_mut().ok_or(RepositoryError::TransactionClosed)?;

            // Row lock held until the unit of work ends.
            let row: Option<AccountRow> = sqlx::query_as(
                r"
                SELECT id, client_id, balance, version, created_at, updated_at
                FROM accounts
                WHERE id = $1
                FOR UPDATE
                ",
            )
            .bind(*id.as_uuid())
            .fetch_optional(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;

            Ok(row.map(account_from_row))
        })
    }

    fn save(&self, account: &Account) -> RepositoryFuture<'_, ()> {
        let account = account.clone();
        Box::pin(async move {
            let mut guard = self.tx.lock().await;
            let tx = guard.as_mut().ok_or(RepositoryError::TransactionClosed)?;

            sqlx::query(
                r"
                INSERT INTO accounts (id, client_id, balance, version, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                ",
            )
            .bind(*account.id().as_uuid())
            .bind(*account.client_id().as_uuid())
            .bind(account.balance())
            .bind(account.version())
            .bind(account.created_at())
            .bind(account.updated_at())
            .execute(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;

            tracing::debug!(account_id = %account.id(), client_id = %account.client_id(), "Inserted account");
            Ok(())
        })
    }

    fn update_balance(&self, account: &Account) -> RepositoryFuture<'_, ()> {
        let account = account.clone();
        Box::pin(async move {
            let mut guard = self.tx.lock().await;
            let tx = guard.as_mut().ok_or(RepositoryError::TransactionClosed)?;

            let result = sqlx::query(
                "UPDATE accounts SET balance = $1, version = $2, updated_at = $3 WHERE id = $4",
            )
            .bind(account.balance())
            .bind(account.version())
            .bind(account.updated_at())
            .bind(*account.id().as_uuid())
            .execute(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;

            if result.rows_affected() == 0 {
                return Err(RepositoryError::NotFound {
                    entity: "account",
                    id: account.id().to_string(),
                });
            }
            Ok(())
        })
    }
}

/// Transfer storage.
#[derive(Debug, Clone)]
pub struct PgTransferRepository {
    tx: PgTransaction,
}

impl PgTransferRepository {
    /// Bind to `tx`.
    #[must_use]
    pub const fn new(tx: PgTransaction) -> Self {
        Self { tx }
    }
}

impl TransferRepository for PgTransferRepository {
    fn create(&self, transfer: &Transfer) -> RepositoryFuture<'_, ()> {
        let transfer = transfer.clone();
        Box::pin(async move {
            let mut guard = self.tx.lock().await;
            let tx = guard.as_mut().ok_or(RepositoryError::TransactionClosed)?;

            sqlx::query(
                r"
                INSERT INTO transfers (id, account_from, account_to, amount, created_at)
                VALUES ($1, $2, $3, $4, $5)
                ",
            )
            .bind(*transfer.id().as_uuid())
            .bind(*transfer.account_from().as_uuid())
            .bind(*transfer.account_to().as_uuid())
            .bind(transfer.amount().value())
            .bind(transfer.created_at())
            .execute(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;

            tracing::debug!(transfer_id = %transfer.id(), "Inserted transfer");
            Ok(())
        })
    }
}
