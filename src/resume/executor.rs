//! Deferred-execution seam: the host facility that runs a registered
//! trigger later, once its constraints are met.

use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by the deferred-execution facility.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The facility refused to accept the registration.
    #[error("deferred-execution registration refused: {0}")]
    RegistrationRefused(String),
    /// The facility could not withdraw an existing registration.
    #[error("deferred-execution cancellation failed: {0}")]
    CancellationFailed(String),
}

/// Constraints attached to a deferred-execution request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerConstraints {
    /// Whether the trigger may fire while only a metered network is
    /// available. False as soon as any transfer in the resumable set
    /// forbids metered use.
    pub allow_metered: bool,
}

/// Host deferred-execution facility.
///
/// The facility guarantees at-least-once invocation of the registered
/// trigger once constraints are met, with no guarantee on exact timing.
/// Registering while a registration is already active replaces it.
#[async_trait]
pub trait DeferredExecutor: Send + Sync {
    /// Registers the resumption trigger under the given constraints.
    async fn register(&self, constraints: TriggerConstraints) -> Result<(), ExecutorError>;

    /// Withdraws the current registration, if any.
    async fn cancel(&self) -> Result<(), ExecutorError>;
}
