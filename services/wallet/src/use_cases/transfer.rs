//! Moving funds between two accounts.
//!
//! ```text
//! execute()
//!   │
//!   ├─ unit of work ──────────────────────────────────────┐
//!   │    load both accounts (id order, rows locked)        │
//!   │    Transfer::create  (validate, debit, credit)       │ rollback on
//!   │    update_balance × 2                                │ any error
//!   │    transfers.create                                  │
//!   ├─ commit ─────────────────────────────────────────────┘
//!   │
//!   ├─ dispatch TransactionCreated
//!   └─ dispatch BalanceUpdated
//! ```
//!
//! Dispatch happens strictly after commit. A handler failure is logged and
//! counted but the transfer is already durable, so the caller still gets
//! `Ok`.

use chrono::{DateTime, Utc};
use ledger_core::environment::Clock;
use ledger_core::{
    AccountId, BalanceUpdated, Decimal, EventDispatcher, EventEnvelope, LedgerEvent,
    TransactionBackend, TransactionCreated, Transfer, TransferId, UnitOfWork,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::TransferError;

/// Request body for `POST /transactions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTransferInput {
    /// Account to debit
    pub account_id_from: AccountId,
    /// Account to credit
    pub account_id_to: AccountId,
    /// Amount to move; must be positive
    pub amount: Decimal,
}

/// A committed transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOutput {
    /// Transfer id
    pub id: TransferId,
    /// Debited account
    pub account_id_from: AccountId,
    /// Credited account
    pub account_id_to: AccountId,
    /// Amount moved
    pub amount: Decimal,
}

impl From<&Transfer> for TransferOutput {
    fn from(transfer: &Transfer) -> Self {
        Self {
            id: transfer.id(),
            account_id_from: transfer.account_from(),
            account_id_to: transfer.account_to(),
            amount: transfer.amount().value(),
        }
    }
}

/// What the transaction hands back for publication.
struct Committed {
    transfer: Transfer,
    balances: BalanceUpdated,
}

/// Executes a transfer and publishes its events.
pub struct CreateTransfer<B: TransactionBackend> {
    uow: Arc<UnitOfWork<B>>,
    dispatcher: Arc<EventDispatcher>,
    clock: Arc<dyn Clock>,
}

impl<B: TransactionBackend> CreateTransfer<B> {
    /// Create the use case.
    #[must_use]
    pub fn new(
        uow: Arc<UnitOfWork<B>>,
        dispatcher: Arc<EventDispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            uow,
            dispatcher,
            clock,
        }
    }

    /// Move `amount` from one account to another.
    ///
    /// # Errors
    ///
    /// - [`TransferError::AccountNotFound`] when either account is missing
    /// - [`TransferError::Validation`] for a non-positive amount, identical
    ///   accounts or insufficient funds
    /// - [`TransferError::Persistence`] or [`TransferError::UnitOfWork`] when
    ///   storage fails
    ///
    /// In every error case nothing was persisted and nothing was dispatched.
    pub async fn execute(&self, input: CreateTransferInput) -> Result<TransferOutput, TransferError> {
        let committed = match self.commit(input).await {
            Ok(committed) => committed,
            Err(error) => {
                metrics::counter!("ledger.transfers.rejected", "reason" => error.kind()).increment(1);
                tracing::info!(
                    account_id_from = %input.account_id_from,
                    account_id_to = %input.account_id_to,
                    amount = %input.amount,
                    error = %error,
                    "Transfer rejected"
                );
                return Err(error);
            },
        };

        let output = TransferOutput::from(&committed.transfer);
        metrics::counter!("ledger.transfers.committed").increment(1);
        tracing::info!(
            transfer_id = %output.id,
            account_id_from = %output.account_id_from,
            account_id_to = %output.account_id_to,
            amount = %output.amount,
            "Transfer committed"
        );

        let occurred_at = committed.transfer.created_at();
        self.publish(
            LedgerEvent::TransactionCreated(TransactionCreated::from(&committed.transfer)),
            occurred_at,
        )
        .await;
        self.publish(LedgerEvent::BalanceUpdated(committed.balances), occurred_at)
            .await;

        Ok(output)
    }

    async fn commit(&self, input: CreateTransferInput) -> Result<Committed, TransferError> {
        let clock = Arc::clone(&self.clock);
        let CreateTransferInput {
            account_id_from,
            account_id_to,
            amount,
        } = input;

        self.uow
            .run(move |scope| {
                Box::pin(async move {
                    let accounts = scope.accounts()?;

                    // Rows are locked in id order so opposite transfers cannot deadlock.
                    let from_first = account_id_from <= account_id_to;
                    let (first, second) = if from_first {
                        (account_id_from, account_id_to)
                    } else {
                        (account_id_to, account_id_from)
                    };
                    let first = accounts.find_by_id(first).await?;
                    let second = accounts.find_by_id(second).await?;
                    let (from, to) = if from_first { (first, second) } else { (second, first) };

                    let mut from = from.ok_or(TransferError::AccountNotFound(account_id_from))?;
                    let mut to = to.ok_or(TransferError::AccountNotFound(account_id_to))?;

                    let transfer =
                        Transfer::create(Some(&mut from), Some(&mut to), amount, clock.as_ref())?;

                    accounts.update_balance(&from).await?;
                    accounts.update_balance(&to).await?;
                    scope.transfers()?.create(&transfer).await?;

                    Ok::<_, TransferError>(Committed {
                        balances: BalanceUpdated::from_accounts(&from, &to),
                        transfer,
                    })
                })
            })
            .await
    }

    async fn publish(&self, event: LedgerEvent, occurred_at: DateTime<Utc>) {
        let envelope = EventEnvelope::new(event, occurred_at);
        let report = self.dispatcher.dispatch(&envelope).await;

        if report.is_success() {
            tracing::debug!(event = %report.event, handlers = report.invoked, "Event dispatched");
            return;
        }
        for failure in &report.failures {
            tracing::warn!(
                event = %report.event,
                handler = %failure.handler,
                error = %failure.error,
                "Post-commit handler failed"
            );
        }
    }
}

impl<B: TransactionBackend> std::fmt::Debug for CreateTransfer<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreateTransfer")
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}
