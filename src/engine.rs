//! Outward seams to the transfer engine and its owning manager.
//!
//! The core only ever calls back into the engine to resume a suspended
//! transfer; everything else arrives as events through the dispatcher.

use async_trait::async_trait;

use crate::model::TransferId;

/// The underlying transfer engine, as far as this core is concerned.
///
/// `resume` is fire-and-forget: the engine re-engages the transfer and
/// reports the outcome back through the usual event stream. Engine-side
/// failures are the engine's to surface as events, not return values.
#[async_trait]
pub trait TransferEngine: Send + Sync {
    /// Re-engages a suspended transfer without restarting from byte zero.
    async fn resume(&self, id: &TransferId);
}

/// The component that owns transfers and decides post-success behavior.
///
/// Notified once per successful transfer so it can resolve or open the
/// result. Display of the success notification is not gated on this call;
/// the two are independent effects of the same event.
#[async_trait]
pub trait TransferManager: Send + Sync {
    /// Reports a completed transfer along with what the caller already
    /// knows about it: the host-side system id, whether the payload
    /// resolves to an external viewer, and whether its media type is
    /// directly viewable.
    async fn on_succeeded(
        &self,
        id: &TransferId,
        system_id: i64,
        can_resolve: bool,
        viewable_mime: bool,
    );
}
