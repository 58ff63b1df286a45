//! `PostgreSQL` outbox for messages that failed to publish.
//!
//! Entries are written after the ledger transaction has committed, so they
//! go straight to the pool rather than through a unit of work.

use ledger_core::outbox::OutboxFuture;
use ledger_core::{FailedPublication, NewFailedPublication, OutboxError, OutboxStatus, OutboxStore};
use sqlx::{PgPool, Row};

/// `PostgreSQL`-backed [`OutboxStore`].
///
/// # Example
///
/// ```no_run
/// use ledger_core::OutboxStore;
/// use ledger_postgres::PostgresOutbox;
///
/// # async fn example(pool: sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// let outbox = PostgresOutbox::new(pool);
/// let pending = outbox.list_pending(100).await?;
/// println!("Pending publications: {}", pending.len());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct PostgresOutbox {
    pool: PgPool,
}

impl PostgresOutbox {
    /// Create an outbox over the given connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_entry(row: &sqlx::postgres::PgRow) -> Result<FailedPublication, OutboxError> {
        let status: String = row.get("status");
        Ok(FailedPublication {
            id: row.get("id"),
            topic: row.get("topic"),
            key: row.get("partition_key"),
            event_name: row.get("event_name"),
            payload: row.get("payload"),
            error_message: row.get("error_message"),
            retry_count: row.get("retry_count"),
            first_failed_at: row.get("first_failed_at"),
            last_failed_at: row.get("last_failed_at"),
            status: OutboxStatus::parse(&status)?,
            resolved_at: row.get("resolved_at"),
        })
    }

    fn ensure_found(id: i64, rows_affected: u64) -> Result<(), OutboxError> {
        if rows_affected == 0 {
            return Err(OutboxError::NotFound(id));
        }
        Ok(())
    }
}

fn storage_error(error: sqlx::Error) -> OutboxError {
    OutboxError::Storage(error.to_string())
}

impl OutboxStore for PostgresOutbox {
    fn record(&self, entry: NewFailedPublication) -> OutboxFuture<'_, i64> {
        Box::pin(async move {
            let (id,): (i64,) = sqlx::query_as(
                r"
                INSERT INTO failed_publications (
                    topic, partition_key, event_name, payload, error_message
                ) VALUES ($1, $2, $3, $4, $5)
                RETURNING id
                ",
            )
            .bind(&entry.topic)
            .bind(&entry.key)
            .bind(entry.event_name.as_str())
            .bind(&entry.payload)
            .bind(&entry.error_message)
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error)?;

            tracing::warn!(
                outbox_id = id,
                topic = %entry.topic,
                event = %entry.event_name,
                error = %entry.error_message,
                "Publication parked in outbox"
            );
            metrics::counter!("ledger.outbox.recorded", "event" => entry.event_name.as_str())
                .increment(1);

            Ok(id)
        })
    }

    fn list_pending(&self, limit: usize) -> OutboxFuture<'_, Vec<FailedPublication>> {
        Box::pin(async move {
            #[allow(clippy::cast_possible_wrap)] // Limit is reasonable size, i64 is safe
            let rows = sqlx::query(
                r"
                SELECT
                    id, topic, partition_key, event_name, payload, error_message,
                    retry_count, first_failed_at, last_failed_at, status, resolved_at
                FROM failed_publications
                WHERE status = 'pending'
                ORDER BY first_failed_at ASC, id ASC
                LIMIT $1
                ",
            )
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;

            rows.iter().map(Self::row_to_entry).collect()
        })
    }

    fn mark_resolved(&self, id: i64) -> OutboxFuture<'_, ()> {
        Box::pin(async move {
            let result = sqlx::query(
                r"
                UPDATE failed_publications
                SET status = 'resolved', resolved_at = NOW()
                WHERE id = $1
                ",
            )
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
            Self::ensure_found(id, result.rows_affected())?;

            tracing::info!(outbox_id = id, "Outbox entry re-published");
            metrics::counter!("ledger.outbox.resolved").increment(1);
            Ok(())
        })
    }

    fn mark_discarded(&self, id: i64, reason: &str) -> OutboxFuture<'_, ()> {
        let reason = reason.to_string();
        Box::pin(async move {
            let result = sqlx::query(
                r"
                UPDATE failed_publications
                SET status = 'discarded', resolved_at = NOW(), resolution_notes = $1
                WHERE id = $2
                ",
            )
            .bind(&reason)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
            Self::ensure_found(id, result.rows_affected())?;

            tracing::warn!(outbox_id = id, reason = %reason, "Outbox entry discarded");
            metrics::counter!("ledger.outbox.discarded").increment(1);
            Ok(())
        })
    }

    fn record_retry_failure(&self, id: i64, error_message: &str) -> OutboxFuture<'_, ()> {
        let error_message = error_message.to_string();
        Box::pin(async move {
            let result = sqlx::query(
                r"
                UPDATE failed_publications
                SET retry_count = retry_count + 1,
                    last_failed_at = NOW(),
                    error_message = $1
                WHERE id = $2
                ",
            )
            .bind(&error_message)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
            Self::ensure_found(id, result.rows_affected())
        })
    }

    fn count_pending(&self) -> OutboxFuture<'_, i64> {
        Box::pin(async move {
            let (count,): (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM failed_publications WHERE status = 'pending'")
                    .fetch_one(&self.pool)
                    .await
                    .map_err(storage_error)?;
            Ok(count)
        })
    }
}
