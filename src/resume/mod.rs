//! Resumption scheduling: keeps one deferred-execution registration alive
//! exactly while the persisted resumable set is non-empty, and dispatches
//! engine resumes when the trigger fires.
//!
//! The scheduler owns all writes to the persisted schedule state. It is
//! purely reactive: no internal timers, no backoff. A refused registration
//! is retried on the next state transition into a resumable status.

mod executor;
mod trigger;

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::engine::TransferEngine;
use crate::store::{RecordStore, ScheduleState, StatusRecord};

pub use executor::{DeferredExecutor, ExecutorError, TriggerConstraints};
pub use trigger::{StopSignal, TriggerHandler, TriggerParams};

/// What `schedule_if_necessary` decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// A new registration was placed with the facility.
    Registered,
    /// A registration is already active; nothing to do.
    AlreadyScheduled,
    /// The resumable set is empty; nothing to schedule.
    NothingResumable,
    /// The facility refused the registration; left unscheduled for a
    /// reactive retry.
    RegistrationRefused,
}

/// What `cancel_if_unnecessary` decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The active registration was withdrawn.
    Canceled,
    /// Transfers are still resumable; the registration stays.
    StillResumable,
    /// No registration was active.
    NotScheduled,
    /// The facility could not withdraw the registration; the flag stays set
    /// so a later pass retries.
    CancellationFailed,
}

/// Decides, from persisted state only, whether a resumption trigger should
/// be registered with the host's deferred-execution facility.
///
/// Cheap to clone; clones share the serialization gate, so concurrent calls
/// from different contexts cannot double-register.
#[derive(Clone)]
pub struct ResumptionScheduler {
    store: RecordStore,
    engine: Arc<dyn TransferEngine>,
    executor: Arc<dyn DeferredExecutor>,
    gate: Arc<tokio::sync::Mutex<()>>,
}

impl ResumptionScheduler {
    #[must_use]
    pub fn new(
        store: RecordStore,
        engine: Arc<dyn TransferEngine>,
        executor: Arc<dyn DeferredExecutor>,
    ) -> Self {
        Self {
            store,
            engine,
            executor,
            gate: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Registers a deferred-execution request if the persisted resumable
    /// set is non-empty and no registration is currently active.
    ///
    /// Idempotent: repeated calls with an unchanged resumable set keep
    /// exactly one host-level registration.
    #[instrument(skip(self))]
    pub async fn schedule_if_necessary(&self) -> ScheduleOutcome {
        let _guard = self.gate.lock().await;

        let resumable = self.resumable_snapshot().await;
        if resumable.is_empty() {
            return ScheduleOutcome::NothingResumable;
        }

        let state = self.schedule_state_snapshot().await;
        if state.scheduled {
            debug!(generation = state.generation, "resumption already scheduled");
            return ScheduleOutcome::AlreadyScheduled;
        }

        let constraints = TriggerConstraints {
            allow_metered: resumable.iter().all(|record| record.can_use_metered),
        };
        if let Err(error) = self.executor.register(constraints).await {
            warn!(%error, "resumption registration refused; leaving unscheduled for retry");
            return ScheduleOutcome::RegistrationRefused;
        }

        match self.store.set_scheduled(true).await {
            Ok(state) => info!(
                transfers = resumable.len(),
                allow_metered = constraints.allow_metered,
                generation = state.generation,
                "resumption trigger registered"
            ),
            // Registration replaces on re-register, so a failed flag write
            // heals on the next successful pass.
            Err(error) => warn!(%error, "registered but could not persist scheduled flag"),
        }
        ScheduleOutcome::Registered
    }

    /// Withdraws the registration once the persisted resumable set is empty.
    #[instrument(skip(self))]
    pub async fn cancel_if_unnecessary(&self) -> CancelOutcome {
        let _guard = self.gate.lock().await;

        let resumable = self.resumable_snapshot().await;
        if !resumable.is_empty() {
            return CancelOutcome::StillResumable;
        }

        let state = self.schedule_state_snapshot().await;
        if !state.scheduled {
            return CancelOutcome::NotScheduled;
        }

        if let Err(error) = self.executor.cancel().await {
            // The trigger may still fire; it will find nothing to resume
            // and land here again.
            warn!(%error, "could not withdraw resumption registration");
            return CancelOutcome::CancellationFailed;
        }

        match self.store.set_scheduled(false).await {
            Ok(state) => info!(generation = state.generation, "resumption trigger withdrawn"),
            Err(error) => warn!(%error, "withdrawn but could not persist scheduled flag"),
        }
        CancelOutcome::Canceled
    }

    /// Dispatches an engine resume for every transfer in the persisted
    /// resumable set, then reconsiders the registration.
    ///
    /// Dispatch is fire-and-forget; completion flows back through the
    /// dispatcher's event stream. A raised stop signal declines further
    /// dispatch and leaves the reschedule decision to the next trigger.
    #[instrument(skip_all)]
    pub async fn resume(&self, stop: &StopSignal) {
        let resumable = self.resumable_snapshot().await;
        info!(transfers = resumable.len(), "resumption trigger fired");

        for (index, record) in resumable.iter().enumerate() {
            if stop.is_raised() {
                debug!(
                    remaining = resumable.len() - index,
                    "stop raised; leaving remaining transfers to the next trigger"
                );
                return;
            }
            debug!(id = %record.transfer_id, generation = record.generation, "resuming transfer");
            self.engine.resume(&record.transfer_id).await;
        }

        self.cancel_if_unnecessary().await;
    }

    async fn resumable_snapshot(&self) -> Vec<StatusRecord> {
        match self.store.list_resumable().await {
            Ok(records) => records,
            Err(error) => {
                warn!(%error, "resumable set unreadable; assuming empty");
                Vec::new()
            }
        }
    }

    async fn schedule_state_snapshot(&self) -> ScheduleState {
        match self.store.schedule_state().await {
            Ok(state) => state,
            Err(error) => {
                warn!(%error, "schedule state unreadable; assuming unscheduled");
                ScheduleState::unscheduled()
            }
        }
    }
}

impl std::fmt::Debug for ResumptionScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResumptionScheduler").finish_non_exhaustive()
    }
}
