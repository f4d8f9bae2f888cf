//! Closed reason enumerations for terminal failures and resumable pauses.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Why a transfer ended in `Failed`.
///
/// Terminal: a transfer with a fail reason is not resumed by this core.
/// If the engine decides to retry, it does so under a fresh identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailReason {
    /// Network-level failure with no recovery path.
    Network,
    /// Local storage failure (write error, volume gone).
    Storage,
    /// The remote side rejected or corrupted the transfer.
    Server,
    /// OS-level permission was denied.
    Permission,
    /// Anything unclassified.
    Unknown,
}

impl FailReason {
    /// Returns the lowercase string stored in the database.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Storage => "storage",
            Self::Server => "server",
            Self::Permission => "permission",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FailReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "network" => Ok(Self::Network),
            "storage" => Ok(Self::Storage),
            "server" => Ok(Self::Server),
            "permission" => Ok(Self::Permission),
            "unknown" => Ok(Self::Unknown),
            _ => Err(format!("invalid fail reason: {s}")),
        }
    }
}

/// Why a transfer is interrupted-but-resumable.
///
/// Distinct from [`FailReason`]: a pending reason implies future
/// auto-resumption is possible once the blocking condition clears.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingReason {
    /// Waiting for an unmetered network connection.
    UnmeteredNetworkRequired,
    /// Target storage is temporarily unavailable.
    StorageUnavailable,
    /// Queued behind other transfers.
    Queued,
    /// Anything unclassified, including crash recovery.
    Unknown,
}

impl PendingReason {
    /// Returns the lowercase string stored in the database.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnmeteredNetworkRequired => "unmetered_network_required",
            Self::StorageUnavailable => "storage_unavailable",
            Self::Queued => "queued",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for PendingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PendingReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unmetered_network_required" => Ok(Self::UnmeteredNetworkRequired),
            "storage_unavailable" => Ok(Self::StorageUnavailable),
            "queued" => Ok(Self::Queued),
            "unknown" => Ok(Self::Unknown),
            _ => Err(format!("invalid pending reason: {s}")),
        }
    }
}
