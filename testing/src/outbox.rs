//! In-memory failed-publication outbox.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on poisoned locks

use chrono::Utc;
use ledger_core::outbox::OutboxFuture;
use ledger_core::{FailedPublication, NewFailedPublication, OutboxError, OutboxStatus, OutboxStore};
use std::sync::{Arc, RwLock};

/// Vec-backed [`OutboxStore`].
#[derive(Clone, Debug, Default)]
pub struct InMemoryOutbox {
    entries: Arc<RwLock<Vec<FailedPublication>>>,
}

impl InMemoryOutbox {
    /// Creates an empty outbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every entry regardless of status.
    #[must_use]
    pub fn entries(&self) -> Vec<FailedPublication> {
        self.entries.read().unwrap().clone()
    }

    fn update(
        &self,
        id: i64,
        f: impl FnOnce(&mut FailedPublication),
    ) -> Result<(), OutboxError> {
        let mut entries = self.entries.write().unwrap();
        let entry = entries
            .iter_mut()
            .find(|entry| entry.id == id)
            .ok_or(OutboxError::NotFound(id))?;
        f(entry);
        Ok(())
    }
}

impl OutboxStore for InMemoryOutbox {
    fn record(&self, entry: NewFailedPublication) -> OutboxFuture<'_, i64> {
        Box::pin(async move {
            let mut entries = self.entries.write().unwrap();
            let id = i64::try_from(entries.len()).unwrap_or(i64::MAX) + 1;
            let now = Utc::now();
            entries.push(FailedPublication {
                id,
                topic: entry.topic,
                key: entry.key,
                event_name: entry.event_name.as_str().to_string(),
                payload: entry.payload,
                error_message: entry.error_message,
                retry_count: 0,
                first_failed_at: now,
                last_failed_at: now,
                status: OutboxStatus::Pending,
                resolved_at: None,
            });
            Ok(id)
        })
    }

    fn list_pending(&self, limit: usize) -> OutboxFuture<'_, Vec<FailedPublication>> {
        Box::pin(async move {
            Ok(self
                .entries
                .read()
                .unwrap()
                .iter()
                .filter(|entry| entry.status == OutboxStatus::Pending)
                .take(limit)
                .cloned()
                .collect())
        })
    }

    fn mark_resolved(&self, id: i64) -> OutboxFuture<'_, ()> {
        Box::pin(async move {
            self.update(id, |entry| {
                entry.status = OutboxStatus::Resolved;
                entry.resolved_at = Some(Utc::now());
            })
        })
    }

    fn mark_discarded(&self, id: i64, reason: &str) -> OutboxFuture<'_, ()> {
        let reason = reason.to_string();
        Box::pin(async move {
            self.update(id, |entry| {
                entry.status = OutboxStatus::Discarded;
                entry.resolved_at = Some(Utc::now());
                entry.error_message = reason;
            })
        })
    }

    fn record_retry_failure(&self, id: i64, error_message: &str) -> OutboxFuture<'_, ()> {
        let error_message = error_message.to_string();
        Box::pin(async move {
            self.update(id, |entry| {
                entry.retry_count += 1;
                entry.last_failed_at = Utc::now();
                entry.error_message = error_message;
            })
        })
    }

    fn count_pending(&self) -> OutboxFuture<'_, i64> {
        Box::pin(async move {
            let count = self
                .entries
                .read()
                .unwrap()
                .iter()
                .filter(|entry| entry.status == OutboxStatus::Pending)
                .count();
            Ok(i64::try_from(count).unwrap_or(i64::MAX))
        })
    }
}
