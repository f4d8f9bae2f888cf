//! The externally visible status of one transfer.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::reason::{FailReason, PendingReason};

/// Externally visible state for one transfer identity.
///
/// Persisted as a lowercase tag in the `status` column, with the variant
/// payloads living in the `fail_reason`/`pending_reason` columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    /// Known but no bytes received yet.
    Pending,
    /// Actively receiving bytes.
    InProgress,
    /// Suspended by the user or the engine; resumable.
    Paused,
    /// Stalled by an external condition, carrying why.
    Interrupted(PendingReason),
    /// Terminal: all bytes received.
    Succeeded,
    /// Terminal: gave up, carrying why.
    Failed(FailReason),
    /// Terminal: canceled before completion.
    Canceled,
}

impl NotificationStatus {
    /// Returns the lowercase status tag stored in the database.
    ///
    /// Variant payloads are not encoded here; they live in their own columns.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Paused => "paused",
            Self::Interrupted(_) => "interrupted",
            Self::Succeeded => "succeeded",
            Self::Failed(_) => "failed",
            Self::Canceled => "canceled",
        }
    }

    /// Terminal statuses accept no further transitions.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed(_) | Self::Canceled)
    }

    /// Paused or interrupted: the shapes the resumable-set query matches.
    #[must_use]
    pub fn is_suspended(&self) -> bool {
        matches!(self, Self::Paused | Self::Interrupted(_))
    }

    /// Rebuilds a status from its persisted columns.
    ///
    /// An unrecognized status tag is an error (the row is corrupt and callers
    /// drop it). A missing or unrecognized reason for `interrupted`/`failed`
    /// degrades to `Unknown` since the status itself is still meaningful.
    pub fn from_columns(
        status: &str,
        fail_reason: Option<&str>,
        pending_reason: Option<&str>,
    ) -> Result<Self, String> {
        match status {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "paused" => Ok(Self::Paused),
            "interrupted" => {
                let reason = pending_reason
                    .and_then(|r| r.parse().ok())
                    .unwrap_or(PendingReason::Unknown);
                Ok(Self::Interrupted(reason))
            }
            "succeeded" => Ok(Self::Succeeded),
            "failed" => {
                let reason = fail_reason
                    .and_then(|r| r.parse().ok())
                    .unwrap_or(FailReason::Unknown);
                Ok(Self::Failed(reason))
            }
            "canceled" => Ok(Self::Canceled),
            other => Err(format!("invalid status: {other}")),
        }
    }

    /// The `fail_reason` column value for this status.
    #[must_use]
    pub fn fail_reason_column(&self) -> Option<&'static str> {
        match self {
            Self::Failed(reason) => Some(reason.as_str()),
            _ => None,
        }
    }

    /// The `pending_reason` column value for this status.
    #[must_use]
    pub fn pending_reason_column(&self) -> Option<&'static str> {
        match self {
            Self::Interrupted(reason) => Some(reason.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
