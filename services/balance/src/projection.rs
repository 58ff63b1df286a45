//! `BalanceUpdated` projection.
//!
//! Every message carries the absolute balances of both accounts it touched.
//! Each account is written on its own; a failure on one side does not undo
//! the other.
//!
//! # Modes
//!
//! - [`ProjectionMode::Overwrite`]: every snapshot replaces the stored
//!   balance. Duplicates are harmless, but two snapshots for the same account
//!   arriving out of order leave the older balance in place.
//! - [`ProjectionMode::Versioned`]: a snapshot is written only when its
//!   account version is newer than the stored one. Duplicates and late
//!   arrivals are dropped. Snapshots without versions fall back to
//!   overwriting.

use ledger_core::projection::{ApplyOutcome, BalanceStore, Projection, Result};
use ledger_core::{AccountId, EventEnvelope, LedgerEvent};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// How snapshots are written to the replica.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectionMode {
    /// Blind overwrite with the carried balance.
    Overwrite,
    /// Compare-and-set on the account version.
    #[default]
    Versioned,
}

/// Unrecognised `PROJECTION_MODE` value.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown projection mode '{0}', expected 'versioned' or 'overwrite'")]
pub struct UnknownProjectionMode(String);

impl FromStr for ProjectionMode {
    type Err = UnknownProjectionMode;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "overwrite" => Ok(Self::Overwrite),
            "versioned" => Ok(Self::Versioned),
            _ => Err(UnknownProjectionMode(s.to_string())),
        }
    }
}

/// Keeps the replica in step with `BalanceUpdated` messages.
pub struct BalanceProjection<S: BalanceStore> {
    store: Arc<S>,
    mode: ProjectionMode,
}

impl<S: BalanceStore> BalanceProjection<S> {
    /// Create a projection writing to `store`.
    #[must_use]
    pub const fn new(store: Arc<S>, mode: ProjectionMode) -> Self {
        Self { store, mode }
    }

    /// The replica store.
    #[must_use]
    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Active write mode.
    #[must_use]
    pub const fn mode(&self) -> ProjectionMode {
        self.mode
    }

    async fn apply_side(&self, account_id: AccountId, balance: Decimal, version: Option<i64>) -> Result<()> {
        let version = match (self.mode, version) {
            (ProjectionMode::Versioned, Some(version)) => version,
            (ProjectionMode::Versioned, None) => {
                tracing::warn!(
                    account_id = %account_id,
                    "Snapshot carries no version, overwriting"
                );
                return self.store.set_balance(account_id, balance).await;
            },
            (ProjectionMode::Overwrite, _) => {
                return self.store.set_balance(account_id, balance).await;
            },
        };

        match self.store.apply_versioned(account_id, balance, version).await? {
            ApplyOutcome::Applied => {
                tracing::debug!(account_id = %account_id, version, "Balance applied");
            },
            ApplyOutcome::Stale { stored_version } => {
                metrics::counter!("projection.updates.stale").increment(1);
                tracing::debug!(
                    account_id = %account_id,
                    version,
                    stored_version,
                    "Stale snapshot ignored"
                );
            },
        }
        Ok(())
    }
}

impl<S: BalanceStore> Projection for BalanceProjection<S> {
    fn name(&self) -> &str {
        "account_balances"
    }

    async fn apply_event(&self, event: &EventEnvelope) -> Result<()> {
        let LedgerEvent::BalanceUpdated(payload) = &event.event else {
            tracing::debug!(event = %event.name(), "Ignoring event");
            return Ok(());
        };

        let from = self
            .apply_side(
                payload.account_id_from,
                payload.balance_account_id_from,
                payload.version_account_id_from,
            )
            .await;
        let to = self
            .apply_side(
                payload.account_id_to,
                payload.balance_account_id_to,
                payload.version_account_id_to,
            )
            .await;

        from.and(to)
    }

    async fn rebuild(&self) -> Result<()> {
        self.store.clear().await
    }
}

impl<S: BalanceStore> std::fmt::Debug for BalanceProjection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BalanceProjection")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("overwrite".parse(), Ok(ProjectionMode::Overwrite));
        assert_eq!(" Versioned ".parse(), Ok(ProjectionMode::Versioned));
        assert!("delta".parse::<ProjectionMode>().is_err());
        assert_eq!(ProjectionMode::default(), ProjectionMode::Versioned);
    }
}
