//! Error types for status-record store operations.

use std::fmt;

use thiserror::Error;

/// Typed classification of a database failure.
///
/// Every absorbed store error is logged with its kind; the non-functional
/// gates additionally count `BusyOrLocked` incidence under concurrent load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreDbErrorKind {
    /// Another connection held the lock past the busy timeout.
    BusyOrLocked,
    /// The write violated a schema constraint.
    ConstraintViolation,
    /// No pool connection became free in time.
    PoolTimeout,
    /// The pool was already shut down.
    PoolClosed,
    /// A query expected a row that is not there.
    RowNotFound,
    /// Filesystem or transport IO failure.
    Io,
    /// Driver/protocol-level failure.
    Protocol,
    /// Everything else.
    Other,
}

impl StoreDbErrorKind {
    #[must_use]
    pub fn from_sqlx(error: &sqlx::Error) -> Self {
        match error {
            sqlx::Error::Database(database_error) => Self::of_database(database_error.as_ref()),
            sqlx::Error::PoolTimedOut => Self::PoolTimeout,
            sqlx::Error::PoolClosed => Self::PoolClosed,
            sqlx::Error::RowNotFound => Self::RowNotFound,
            sqlx::Error::Io(_) => Self::Io,
            sqlx::Error::Protocol(_) => Self::Protocol,
            _ => Self::Other,
        }
    }

    fn of_database(error: &(dyn sqlx::error::DatabaseError + 'static)) -> Self {
        if error.is_unique_violation()
            || error.is_check_violation()
            || error.is_foreign_key_violation()
        {
            return Self::ConstraintViolation;
        }

        if let Some(code) = error.code().as_deref() {
            if matches!(code, "SQLITE_BUSY" | "SQLITE_LOCKED" | "5" | "6") {
                return Self::BusyOrLocked;
            }
            if code.starts_with("SQLITE_CONSTRAINT") {
                return Self::ConstraintViolation;
            }
        }

        // Some drivers report lock contention only in the message text
        let message = error.message().to_ascii_lowercase();
        let lock_markers = [
            "database is locked",
            "database table is locked",
            "database is busy",
        ];
        if lock_markers.iter().any(|marker| message.contains(marker)) {
            return Self::BusyOrLocked;
        }

        Self::Other
    }

    /// Returns the label used in log fields and error text.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BusyOrLocked => "busy_or_locked",
            Self::ConstraintViolation => "constraint_violation",
            Self::PoolTimeout => "pool_timeout",
            Self::PoolClosed => "pool_closed",
            Self::RowNotFound => "row_not_found",
            Self::Io => "io",
            Self::Protocol => "protocol",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for StoreDbErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors that can occur during store operations.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error ({kind}): {message}")]
    Database {
        /// Typed classification of the failure.
        kind: StoreDbErrorKind,
        /// Human-readable database error text.
        message: String,
    },

    /// No status record with the given notification id.
    #[error("status record not found: notification id {0}")]
    RecordNotFound(i64),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database {
            kind: StoreDbErrorKind::from_sqlx(&err),
            message: err.to_string(),
        }
    }
}

impl StoreError {
    /// Returns the typed database error kind, when this is a database error.
    #[must_use]
    pub fn database_kind(&self) -> Option<StoreDbErrorKind> {
        match self {
            Self::Database { kind, .. } => Some(*kind),
            Self::RecordNotFound(_) => None,
        }
    }
}
