//! Entry point the host's deferred-execution facility calls into when a
//! registered resumption trigger fires.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, instrument};

use super::ResumptionScheduler;

/// Parameters the facility hands to a firing trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerParams {
    /// Generation stamp of the schedule registration this invocation
    /// belongs to. Logged so stale firings are visible.
    pub schedule_generation: i64,
}

/// Cooperative stop flag shared between the host's stop callback and an
/// in-flight resumption pass.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn lower(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Adapts the facility's start/stop callback contract onto the scheduler.
pub struct TriggerHandler {
    scheduler: ResumptionScheduler,
    stop: StopSignal,
}

impl TriggerHandler {
    #[must_use]
    pub fn new(scheduler: ResumptionScheduler) -> Self {
        Self {
            scheduler,
            stop: StopSignal::new(),
        }
    }

    /// The stop flag this handler watches, for hosts that deliver stop out
    /// of band.
    #[must_use]
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Called by the facility when the trigger fires.
    ///
    /// Never blocks the caller: resumption dispatch runs on a spawned task,
    /// and `on_finished(false)` fires once dispatch (not completion) of the
    /// whole resumable set is done. Each firing starts with the stop signal
    /// lowered.
    #[instrument(skip(self, on_finished))]
    pub fn on_trigger(
        &self,
        params: TriggerParams,
        on_finished: impl FnOnce(bool) + Send + 'static,
    ) {
        self.stop.lower();
        let scheduler = self.scheduler.clone();
        let stop = self.stop.clone();
        tokio::spawn(async move {
            debug!(
                schedule_generation = params.schedule_generation,
                "resumption trigger received"
            );
            scheduler.resume(&stop).await;
            on_finished(false);
        });
    }

    /// Called by the facility when it withdraws its time budget.
    ///
    /// Declines further dispatch and reports that no native reschedule is
    /// needed: a still-incomplete resumption re-registers itself when next
    /// observed.
    #[instrument(skip(self))]
    pub fn on_stop(&self) -> bool {
        self.stop.raise();
        false
    }
}

impl std::fmt::Debug for TriggerHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerHandler")
            .field("stop", &self.stop)
            .finish_non_exhaustive()
    }
}
