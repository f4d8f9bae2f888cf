//! Domain types shared across the dispatcher, store, and scheduler.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

mod reason;
mod status;

pub use reason::{FailReason, PendingReason};
pub use status::NotificationStatus;

/// Opaque, globally unique identifier for one transfer.
///
/// Stable across resumption and process restarts; never reused while a
/// status record referencing it exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferId(String);

impl TransferId {
    /// Wraps an identifier supplied by the transfer engine.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mints a fresh random identifier (32 hex chars).
    #[must_use]
    pub fn random() -> Self {
        use std::fmt::Write as _;

        let mut bytes = [0u8; 16];
        rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
        let mut out = String::with_capacity(32);
        for byte in bytes {
            let _ = write!(out, "{byte:02x}");
        }
        Self(out)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle to an icon resource owned by the presentation facility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IconHandle(pub i64);

/// Immutable-per-event snapshot of one transfer, as reported by the engine.
///
/// Each dispatcher call carries a fresh snapshot; the dispatcher never
/// mutates one in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferInfo {
    /// Identity this snapshot belongs to.
    pub id: TransferId,
    /// Human-readable name shown by the presentation facility.
    pub display_name: String,
    /// Bytes received so far.
    pub received_bytes: u64,
    /// Total size, when known. `None` renders as indeterminate.
    pub total_bytes: Option<u64>,
    /// Engine's completion estimate, when it has one.
    pub time_remaining: Option<Duration>,
    /// Transient transfers are not independently cancelable by the user.
    pub transient: bool,
    /// Off-the-record transfers never touch durable storage.
    pub off_record: bool,
    /// Whether the engine can resume this transfer after a suspension.
    pub resumable: bool,
    /// Source/referrer metadata, when known.
    pub referrer: Option<String>,
    /// Icon to render, when the host provides one.
    pub icon: Option<IconHandle>,
}

impl TransferInfo {
    /// A minimal snapshot; callers set the remaining fields as needed.
    pub fn new(id: TransferId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            received_bytes: 0,
            total_bytes: None,
            time_remaining: None,
            transient: false,
            off_record: false,
            resumable: false,
            referrer: None,
            icon: None,
        }
    }
}

/// Type tag for a candidate storage location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectoryKind {
    /// The host's default storage location.
    Default,
    /// A secondary location (removable volume, secondary partition).
    Additional,
    /// A location that could not be probed; shown but not selectable.
    Error,
}

impl DirectoryKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Additional => "additional",
            Self::Error => "error",
        }
    }
}

/// One candidate storage location offered by the selection surface.
///
/// No lifecycle beyond being enumerated at selection time; choosing one is a
/// one-shot telemetry event and nothing more as far as this core is
/// concerned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryOption {
    pub display_name: String,
    pub path: PathBuf,
    pub available_bytes: u64,
    pub total_bytes: u64,
    pub kind: DirectoryKind,
}

impl DirectoryOption {
    /// Emits the one-shot selection telemetry event.
    pub fn log_selection(&self) {
        info!(
            target: "transfer_notify::telemetry",
            kind = self.kind.as_str(),
            available_bytes = self.available_bytes,
            total_bytes = self.total_bytes,
            "directory option selected"
        );
    }
}
