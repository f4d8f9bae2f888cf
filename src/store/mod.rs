//! Durable status record store.
//!
//! Maps each transfer identity to its last externally visible status, plus
//! the single-row resumption schedule state. Survives process restarts; the
//! resumable set and the schedule decision are always recomputed from here,
//! never from volatile memory.
//!
//! Mutation policy: the Notification Dispatcher owns all record writes and
//! the Resumption Scheduler owns the schedule-state writes. Everything else
//! only reads.

use tracing::{instrument, warn};

use crate::db::Database;
use crate::model::TransferId;

mod error;
mod record;

pub use error::{StoreDbErrorKind, StoreError};
pub use record::{ScheduleState, StatusRecord};

use record::RecordRow;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// SQLite-backed store for status records and schedule state.
#[derive(Debug, Clone)]
pub struct RecordStore {
    db: Database,
}

impl RecordStore {
    /// Creates a store over an open database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Verifies a write touched the expected row.
    fn check_affected(notification_id: i64, rows_affected: u64) -> Result<()> {
        if rows_affected == 0 {
            return Err(StoreError::RecordNotFound(notification_id));
        }
        Ok(())
    }

    /// Inserts or replaces the record for its transfer identity.
    ///
    /// Returns the notification id (the rowid), stable across updates of the
    /// same identity.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if the write fails.
    #[instrument(skip(self, record), fields(transfer_id = %record.transfer_id, status = record.status.as_str()))]
    pub async fn upsert(&self, record: &StatusRecord) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            r"
            INSERT INTO transfer_records (
                transfer_id, status, fail_reason, pending_reason,
                auto_resumable, can_use_metered, received_bytes, total_bytes,
                time_remaining_ms, start_time_ms, generation, display_name,
                transient, referrer, icon
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(transfer_id) DO UPDATE SET
                status = excluded.status,
                fail_reason = excluded.fail_reason,
                pending_reason = excluded.pending_reason,
                auto_resumable = excluded.auto_resumable,
                can_use_metered = excluded.can_use_metered,
                received_bytes = excluded.received_bytes,
                total_bytes = excluded.total_bytes,
                time_remaining_ms = excluded.time_remaining_ms,
                start_time_ms = excluded.start_time_ms,
                generation = excluded.generation,
                display_name = excluded.display_name,
                transient = excluded.transient,
                referrer = excluded.referrer,
                icon = excluded.icon,
                updated_at = datetime('now')
            RETURNING id
            ",
        )
        .bind(record.transfer_id.as_str())
        .bind(record.status.as_str())
        .bind(record.status.fail_reason_column())
        .bind(record.status.pending_reason_column())
        .bind(record.auto_resumable)
        .bind(record.can_use_metered)
        .bind(i64::try_from(record.received_bytes).unwrap_or(i64::MAX))
        .bind(
            record
                .total_bytes
                .map(|b| i64::try_from(b).unwrap_or(i64::MAX)),
        )
        .bind(
            record
                .time_remaining
                .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX)),
        )
        .bind(record.start_time_ms)
        .bind(record.generation)
        .bind(&record.display_name)
        .bind(record.transient)
        .bind(record.referrer.as_deref())
        .bind(record.icon.map(|i| i.0))
        .fetch_one(self.db.pool())
        .await?;

        Ok(row.0)
    }

    /// Fetches the record for one transfer identity.
    ///
    /// A stored row whose status no longer parses is treated as absent (and
    /// logged), per the corrupt-entry policy.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if the read fails.
    #[instrument(skip(self), fields(transfer_id = %transfer_id))]
    pub async fn get(&self, transfer_id: &TransferId) -> Result<Option<StatusRecord>> {
        let row: Option<RecordRow> =
            sqlx::query_as(r"SELECT * FROM transfer_records WHERE transfer_id = ?")
                .bind(transfer_id.as_str())
                .fetch_optional(self.db.pool())
                .await?;

        Ok(row.and_then(Self::accept_row))
    }

    /// Fetches the record carrying the given notification id.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if the read fails.
    #[instrument(skip(self))]
    pub async fn get_by_notification(&self, notification_id: i64) -> Result<Option<StatusRecord>> {
        let row: Option<RecordRow> = sqlx::query_as(r"SELECT * FROM transfer_records WHERE id = ?")
            .bind(notification_id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(row.and_then(Self::accept_row))
    }

    /// Lists every stored record, oldest first. Corrupt rows are skipped.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if the read fails.
    #[instrument(skip(self))]
    pub async fn list_all(&self) -> Result<Vec<StatusRecord>> {
        let rows: Vec<RecordRow> = sqlx::query_as(r"SELECT * FROM transfer_records ORDER BY id")
            .fetch_all(self.db.pool())
            .await?;

        Ok(rows.into_iter().filter_map(Self::accept_row).collect())
    }

    /// The resumable set: suspended records whose auto-resumable flag is set.
    ///
    /// This is the exact set the scheduler's decisions are derived from.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if the read fails.
    #[instrument(skip(self))]
    pub async fn list_resumable(&self) -> Result<Vec<StatusRecord>> {
        let rows: Vec<RecordRow> = sqlx::query_as(
            r"
            SELECT * FROM transfer_records
            WHERE status IN ('paused', 'interrupted') AND auto_resumable = 1
            ORDER BY id
            ",
        )
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.into_iter().filter_map(Self::accept_row).collect())
    }

    /// Deletes the record carrying the given notification id.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::RecordNotFound` if no such row exists, or
    /// `StoreError::Database` if the delete fails.
    #[instrument(skip(self))]
    pub async fn remove_by_notification(&self, notification_id: i64) -> Result<()> {
        let result = sqlx::query(r"DELETE FROM transfer_records WHERE id = ?")
            .bind(notification_id)
            .execute(self.db.pool())
            .await?;

        Self::check_affected(notification_id, result.rows_affected())
    }

    /// Re-marks rows left `pending`/`in_progress` by a previous process life
    /// as interrupted and auto-resumable, so the schedule invariant can be
    /// recomputed over them.
    ///
    /// Returns the number of rows re-marked.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if the write fails.
    #[instrument(skip(self))]
    pub async fn reset_in_flight(&self) -> Result<u64> {
        let result = sqlx::query(
            r"
            UPDATE transfer_records
            SET status = 'interrupted',
                pending_reason = 'unknown',
                fail_reason = NULL,
                auto_resumable = 1,
                updated_at = datetime('now')
            WHERE status IN ('pending', 'in_progress')
            ",
        )
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected())
    }

    /// Deletes every terminal record. Returns the number deleted.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if the delete fails.
    #[instrument(skip(self))]
    pub async fn prune_terminal(&self) -> Result<u64> {
        let result = sqlx::query(
            r"DELETE FROM transfer_records WHERE status IN ('succeeded', 'failed', 'canceled')",
        )
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected())
    }

    /// Per-status record counts, for the maintenance CLI.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if the read fails.
    #[instrument(skip(self))]
    pub async fn counts(&self) -> Result<Vec<(String, i64)>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r"SELECT status, COUNT(*) FROM transfer_records GROUP BY status ORDER BY status",
        )
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows)
    }

    /// Reads the persisted schedule state. A missing row (which the
    /// migration seeds, so this means a damaged database) degrades to
    /// unscheduled.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if the read fails.
    #[instrument(skip(self))]
    pub async fn schedule_state(&self) -> Result<ScheduleState> {
        let state: Option<ScheduleState> =
            sqlx::query_as(r"SELECT scheduled, generation FROM schedule_state WHERE id = 1")
                .fetch_optional(self.db.pool())
                .await?;

        Ok(state.unwrap_or_else(|| {
            warn!("schedule_state row missing, assuming unscheduled");
            ScheduleState::unscheduled()
        }))
    }

    /// Persists the schedule flag, bumping the generation stamp.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if the write fails.
    #[instrument(skip(self))]
    pub async fn set_scheduled(&self, scheduled: bool) -> Result<ScheduleState> {
        let state: ScheduleState = sqlx::query_as(
            r"
            UPDATE schedule_state
            SET scheduled = ?, generation = generation + 1, updated_at = datetime('now')
            WHERE id = 1
            RETURNING scheduled, generation
            ",
        )
        .bind(scheduled)
        .fetch_one(self.db.pool())
        .await?;

        Ok(state)
    }

    fn accept_row(row: RecordRow) -> Option<StatusRecord> {
        let notification_id = row.id;
        match StatusRecord::try_from(row) {
            Ok(record) => Some(record),
            Err(error) => {
                warn!(notification_id, %error, "dropping corrupt status record");
                None
            }
        }
    }
}
