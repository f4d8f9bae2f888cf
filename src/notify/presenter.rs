//! Presentation seam: what the dispatcher hands to the host's notification
//! facility.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{IconHandle, NotificationStatus, TransferId};
use crate::store::StatusRecord;

/// Errors surfaced by a presentation facility.
///
/// Presentation is best-effort. The dispatcher logs these and keeps going;
/// the worst case is a stale or missing notification.
#[derive(Debug, Error)]
pub enum PresentError {
    /// The facility cannot be reached at all.
    #[error("presentation facility unavailable: {0}")]
    Unavailable(String),
    /// The facility refused this particular notification.
    #[error("presentation request rejected: {0}")]
    Rejected(String),
}

/// Snapshot of one status record shaped for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedStatus {
    pub id: TransferId,
    pub status: NotificationStatus,
    pub display_name: String,
    pub received_bytes: u64,
    pub total_bytes: Option<u64>,
    pub time_remaining: Option<Duration>,
    pub transient: bool,
    pub off_record: bool,
    pub referrer: Option<String>,
    pub icon: Option<IconHandle>,
}

impl RenderedStatus {
    pub(crate) fn from_record(record: &StatusRecord) -> Self {
        Self {
            id: record.transfer_id.clone(),
            status: record.status,
            display_name: record.display_name.clone(),
            received_bytes: record.received_bytes,
            total_bytes: record.total_bytes,
            time_remaining: record.time_remaining,
            transient: record.transient,
            off_record: record.off_record,
            referrer: record.referrer.clone(),
            icon: record.icon,
        }
    }

    /// Completion percentage, when the total size is known and non-zero.
    #[must_use]
    pub fn percent(&self) -> Option<u8> {
        let total = self.total_bytes.filter(|total| *total > 0)?;
        let capped = self.received_bytes.min(total);
        u8::try_from(u128::from(capped) * 100 / u128::from(total)).ok()
    }
}

/// Host presentation facility: shows, updates, and withdraws notifications.
///
/// The facility is rate-limited and may coalesce rapid updates; callers may
/// only rely on the latest call's content being the one eventually rendered.
///
/// # Object Safety
///
/// This trait uses `async_trait` to support dynamic dispatch via
/// `Arc<dyn Presenter>`. Rust 2024 native async traits are not object-safe,
/// so `async_trait` is required for injection.
#[async_trait]
pub trait Presenter: Send + Sync {
    /// Shows a new notification or updates the existing one for this id.
    async fn show_or_update(
        &self,
        notification_id: i64,
        rendered: &RenderedStatus,
    ) -> Result<(), PresentError>;

    /// Withdraws the notification for this id, if any.
    async fn cancel(&self, notification_id: i64) -> Result<(), PresentError>;
}
