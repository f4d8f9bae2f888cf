//! Status record types: the raw database row and the typed view.

use std::time::Duration;

use serde::Serialize;
use sqlx::FromRow;

use crate::model::{IconHandle, NotificationStatus, TransferId, TransferInfo};

/// Raw `transfer_records` row as stored.
///
/// Status and reasons stay as text here; [`StatusRecord::try_from`] turns a
/// row into the typed view and is where corrupt rows get caught.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct RecordRow {
    pub id: i64,
    pub transfer_id: String,
    pub status: String,
    pub fail_reason: Option<String>,
    pub pending_reason: Option<String>,
    pub auto_resumable: bool,
    pub can_use_metered: bool,
    pub received_bytes: i64,
    pub total_bytes: Option<i64>,
    pub time_remaining_ms: Option<i64>,
    pub start_time_ms: i64,
    pub generation: i64,
    pub display_name: String,
    pub transient: bool,
    pub referrer: Option<String>,
    pub icon: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

/// One live status record: the externally visible snapshot for one transfer.
///
/// Loaded from the store for persisted transfers; built directly in memory
/// for off-the-record ones (which never hit the store and carry a negative
/// notification id).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusRecord {
    /// Identifier handed to the presentation facility. Store rowid for
    /// persisted records, negative counter value for off-the-record ones.
    pub notification_id: i64,
    pub transfer_id: TransferId,
    pub status: NotificationStatus,
    /// Whether the scheduler may auto-resume this transfer while suspended.
    pub auto_resumable: bool,
    /// Whether resumption may run on a metered connection.
    pub can_use_metered: bool,
    pub received_bytes: u64,
    pub total_bytes: Option<u64>,
    pub time_remaining: Option<Duration>,
    /// Logical start time of the last applied progress event, used for the
    /// out-of-order tie-break.
    pub start_time_ms: i64,
    /// Resumption generation; byte monotonicity is scoped to one generation.
    pub generation: i64,
    pub display_name: String,
    pub transient: bool,
    /// Never true for records loaded from the store.
    pub off_record: bool,
    pub referrer: Option<String>,
    pub icon: Option<IconHandle>,
    pub created_at: String,
    pub updated_at: String,
}

impl StatusRecord {
    /// Builds a fresh record for an identity seen for the first time.
    ///
    /// The notification id starts at zero (unassigned) until the first
    /// successful store write or, for off-the-record transfers, until the
    /// dispatcher hands out an ephemeral id.
    #[must_use]
    pub fn new_from_info(info: &TransferInfo, status: NotificationStatus) -> Self {
        Self {
            notification_id: 0,
            transfer_id: info.id.clone(),
            status,
            auto_resumable: false,
            can_use_metered: true,
            received_bytes: info.received_bytes,
            total_bytes: info.total_bytes,
            time_remaining: info.time_remaining,
            start_time_ms: 0,
            generation: 0,
            display_name: info.display_name.clone(),
            transient: info.transient,
            off_record: info.off_record,
            referrer: info.referrer.clone(),
            icon: info.icon,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    /// Refreshes the display fields a caller re-sends with every event.
    ///
    /// Byte counts are deliberately excluded; those go through the
    /// monotonicity rules in the dispatcher.
    pub(crate) fn absorb_info(&mut self, info: &TransferInfo) {
        self.display_name.clone_from(&info.display_name);
        self.total_bytes = info.total_bytes;
        self.time_remaining = info.time_remaining;
        self.transient = info.transient;
        self.referrer.clone_from(&info.referrer);
        self.icon = info.icon;
    }

    /// Whether this record belongs to the resumable set the scheduler reads.
    #[must_use]
    pub fn is_resumable(&self) -> bool {
        self.status.is_suspended() && self.auto_resumable && !self.off_record
    }
}

impl TryFrom<RecordRow> for StatusRecord {
    type Error = String;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let status = NotificationStatus::from_columns(
            &row.status,
            row.fail_reason.as_deref(),
            row.pending_reason.as_deref(),
        )?;

        Ok(Self {
            notification_id: row.id,
            transfer_id: TransferId::new(row.transfer_id),
            status,
            auto_resumable: row.auto_resumable,
            can_use_metered: row.can_use_metered,
            received_bytes: u64::try_from(row.received_bytes).unwrap_or(0),
            total_bytes: row.total_bytes.and_then(|b| u64::try_from(b).ok()),
            time_remaining: row
                .time_remaining_ms
                .and_then(|ms| u64::try_from(ms).ok())
                .map(Duration::from_millis),
            start_time_ms: row.start_time_ms,
            generation: row.generation,
            display_name: row.display_name,
            transient: row.transient,
            off_record: false,
            referrer: row.referrer,
            icon: row.icon.map(IconHandle),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Persisted resumption schedule state: the flag plus a generation stamp
/// bumped on every change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow, Serialize)]
pub struct ScheduleState {
    pub scheduled: bool,
    pub generation: i64,
}

impl ScheduleState {
    /// The state assumed when the store cannot be read: unscheduled.
    #[must_use]
    pub fn unscheduled() -> Self {
        Self {
            scheduled: false,
            generation: 0,
        }
    }
}
