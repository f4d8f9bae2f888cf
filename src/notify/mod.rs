//! Notification dispatcher: serializes every status event through one
//! worker task, applies the state machine, persists records, and drives
//! presentation.
//!
//! The worker owns the in-memory record cache and every store write.
//! Reports from any context funnel through one bounded queue, so the
//! legality check always observes a consistent prior state, for concurrent
//! reports against different identities as much as against the same one.

mod machine;
mod presenter;

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::engine::TransferManager;
use crate::model::{FailReason, NotificationStatus, PendingReason, TransferId, TransferInfo};
use crate::resume::ResumptionScheduler;
use crate::store::{RecordStore, StatusRecord, StoreError};

use machine::{ProgressReject, decide_progress, initial_status, permits};

pub use presenter::{PresentError, Presenter, RenderedStatus};

/// A specialized `Result` for dispatcher operations.
pub type Result<T> = std::result::Result<T, DispatchError>;

const COMMAND_BUFFER: usize = 64;

/// Errors returned by dispatcher handles.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The worker task has stopped; no more events can be applied.
    #[error("notification dispatcher is not running")]
    NotRunning,
}

/// What the dispatcher decided for one reported event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The event was applied; carries the resulting status.
    Applied(NotificationStatus),
    /// The state machine forbids this transition; nothing changed. Signals
    /// a logic error upstream.
    RejectedIllegal {
        from: NotificationStatus,
        to: NotificationStatus,
    },
    /// The progress event carried an older logical start time than the
    /// record; the later logical time has already won.
    RejectedStale,
    /// The event referenced an identity this dispatcher has never seen and
    /// could not synthesize a record for.
    UnknownIdentity,
    /// The record is gone from cache, store, and presentation.
    Removed,
}

enum DispatchCommand {
    Progress {
        info: TransferInfo,
        start_time_ms: i64,
        metered_allowed: bool,
        reply: oneshot::Sender<DispatchOutcome>,
    },
    Success {
        info: TransferInfo,
        system_id: i64,
        can_resolve: bool,
        viewable_mime: bool,
        reply: oneshot::Sender<DispatchOutcome>,
    },
    Failure {
        info: TransferInfo,
        reason: FailReason,
        reply: oneshot::Sender<DispatchOutcome>,
    },
    Paused {
        info: TransferInfo,
        reply: oneshot::Sender<DispatchOutcome>,
    },
    Interrupted {
        info: TransferInfo,
        auto_resumable: bool,
        reason: PendingReason,
        reply: oneshot::Sender<DispatchOutcome>,
    },
    Canceled {
        id: TransferId,
        reply: oneshot::Sender<DispatchOutcome>,
    },
    Remove {
        notification_id: i64,
        id: TransferId,
        reply: oneshot::Sender<DispatchOutcome>,
    },
    Reconcile {
        pinned: Option<i64>,
        reply: oneshot::Sender<()>,
    },
    TaskRemoved {
        reply: oneshot::Sender<()>,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<StatusRecord>>,
    },
    Shutdown,
}

/// Cloneable handle to the dispatcher worker.
#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    tx: mpsc::Sender<DispatchCommand>,
}

impl NotificationDispatcher {
    /// Spawns the worker task and returns the handle plus the worker's join
    /// handle.
    ///
    /// `preload` seeds the in-memory record cache, normally with the store
    /// contents as of process start.
    #[must_use]
    pub fn spawn(
        store: RecordStore,
        presenter: Arc<dyn Presenter>,
        manager: Arc<dyn TransferManager>,
        scheduler: ResumptionScheduler,
        preload: Vec<StatusRecord>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let worker = DispatchWorker {
            store,
            presenter,
            manager,
            scheduler,
            cache: preload
                .into_iter()
                .map(|record| (record.transfer_id.clone(), record))
                .collect(),
            next_ephemeral_id: 0,
        };
        let handle = tokio::spawn(worker.run(rx));
        (Self { tx }, handle)
    }

    /// Reports received-byte progress for a transfer.
    ///
    /// `start_time_ms` is the logical start time of the transfer attempt;
    /// it drives the out-of-order tie-break. `metered_allowed` records
    /// whether a later resumption may run on a metered connection.
    pub async fn report_progress(
        &self,
        info: TransferInfo,
        start_time_ms: i64,
        metered_allowed: bool,
    ) -> Result<DispatchOutcome> {
        self.request(|reply| DispatchCommand::Progress {
            info,
            start_time_ms,
            metered_allowed,
            reply,
        })
        .await
    }

    /// Reports a completed transfer.
    ///
    /// On top of the terminal notification, the owning transfer manager is
    /// told about the completion; the two effects are independent.
    pub async fn report_success(
        &self,
        info: TransferInfo,
        system_id: i64,
        can_resolve: bool,
        viewable_mime: bool,
    ) -> Result<DispatchOutcome> {
        self.request(|reply| DispatchCommand::Success {
            info,
            system_id,
            can_resolve,
            viewable_mime,
            reply,
        })
        .await
    }

    /// Reports a terminally failed transfer.
    pub async fn report_failure(
        &self,
        info: TransferInfo,
        reason: FailReason,
    ) -> Result<DispatchOutcome> {
        self.request(|reply| DispatchCommand::Failure { info, reason, reply })
            .await
    }

    /// Reports a user-paused transfer. Whether it joins the resumable set
    /// follows the info's `resumable` flag.
    pub async fn report_paused(&self, info: TransferInfo) -> Result<DispatchOutcome> {
        self.request(|reply| DispatchCommand::Paused { info, reply })
            .await
    }

    /// Reports an externally interrupted transfer.
    pub async fn report_interrupted(
        &self,
        info: TransferInfo,
        auto_resumable: bool,
        reason: PendingReason,
    ) -> Result<DispatchOutcome> {
        self.request(|reply| DispatchCommand::Interrupted {
            info,
            auto_resumable,
            reason,
            reply,
        })
        .await
    }

    /// Reports a canceled transfer. The notification is withdrawn but the
    /// record stays until the identity is purged.
    pub async fn report_canceled(&self, id: TransferId) -> Result<DispatchOutcome> {
        self.request(|reply| DispatchCommand::Canceled { id, reply })
            .await
    }

    /// Purges a record: user dismissed a terminal notification, or the
    /// engine reports the identity as gone.
    pub async fn remove_record(
        &self,
        notification_id: i64,
        id: TransferId,
    ) -> Result<DispatchOutcome> {
        self.request(|reply| DispatchCommand::Remove {
            notification_id,
            id,
            reply,
        })
        .await
    }

    /// Rebuilds the record cache from the store after a host restart and
    /// re-presents the pinned notification, if any.
    pub async fn reconcile_restarted(&self, pinned: Option<i64>) -> Result<()> {
        self.request(|reply| DispatchCommand::Reconcile { pinned, reply })
            .await
    }

    /// Withdraws transient and off-the-record notifications after the host
    /// task was removed.
    pub async fn handle_task_removed(&self) -> Result<()> {
        self.request(|reply| DispatchCommand::TaskRemoved { reply })
            .await
    }

    /// A consistent snapshot of every cached record, ordered by
    /// notification id.
    pub async fn snapshot(&self) -> Result<Vec<StatusRecord>> {
        self.request(|reply| DispatchCommand::Snapshot { reply })
            .await
    }

    /// Asks the worker to stop once already-queued commands have drained.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(DispatchCommand::Shutdown).await;
    }

    async fn request<R>(
        &self,
        build: impl FnOnce(oneshot::Sender<R>) -> DispatchCommand,
    ) -> Result<R> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| DispatchError::NotRunning)?;
        rx.await.map_err(|_| DispatchError::NotRunning)
    }
}

struct DispatchWorker {
    store: RecordStore,
    presenter: Arc<dyn Presenter>,
    manager: Arc<dyn TransferManager>,
    scheduler: ResumptionScheduler,
    cache: HashMap<TransferId, StatusRecord>,
    /// Counter for ids handed to off-the-record notifications; always
    /// negative, so they can never collide with store rowids.
    next_ephemeral_id: i64,
}

impl DispatchWorker {
    async fn run(mut self, mut rx: mpsc::Receiver<DispatchCommand>) {
        debug!(cached = self.cache.len(), "notification dispatcher started");
        while let Some(command) = rx.recv().await {
            match command {
                DispatchCommand::Progress {
                    info,
                    start_time_ms,
                    metered_allowed,
                    reply,
                } => {
                    let outcome = self.apply_progress(info, start_time_ms, metered_allowed).await;
                    let _ = reply.send(outcome);
                }
                DispatchCommand::Success {
                    info,
                    system_id,
                    can_resolve,
                    viewable_mime,
                    reply,
                } => {
                    let outcome = self
                        .apply_success(info, system_id, can_resolve, viewable_mime)
                        .await;
                    let _ = reply.send(outcome);
                }
                DispatchCommand::Failure { info, reason, reply } => {
                    let outcome = self.apply_failure(info, reason).await;
                    let _ = reply.send(outcome);
                }
                DispatchCommand::Paused { info, reply } => {
                    let outcome = self.apply_paused(info).await;
                    let _ = reply.send(outcome);
                }
                DispatchCommand::Interrupted {
                    info,
                    auto_resumable,
                    reason,
                    reply,
                } => {
                    let outcome = self.apply_interrupted(info, auto_resumable, reason).await;
                    let _ = reply.send(outcome);
                }
                DispatchCommand::Canceled { id, reply } => {
                    let outcome = self.apply_canceled(id).await;
                    let _ = reply.send(outcome);
                }
                DispatchCommand::Remove {
                    notification_id,
                    id,
                    reply,
                } => {
                    let outcome = self.apply_remove(notification_id, id).await;
                    let _ = reply.send(outcome);
                }
                DispatchCommand::Reconcile { pinned, reply } => {
                    self.reconcile(pinned).await;
                    let _ = reply.send(());
                }
                DispatchCommand::TaskRemoved { reply } => {
                    self.sweep_task_removed().await;
                    let _ = reply.send(());
                }
                DispatchCommand::Snapshot { reply } => {
                    let _ = reply.send(self.snapshot());
                }
                DispatchCommand::Shutdown => break,
            }
        }
        debug!("notification dispatcher stopped");
    }

    #[instrument(skip(self, info), fields(id = %info.id))]
    async fn apply_progress(
        &mut self,
        info: TransferInfo,
        start_time_ms: i64,
        metered_allowed: bool,
    ) -> DispatchOutcome {
        let (mut record, known) = self.lookup_or_synthesize(&info);
        let was_resumable = known && record.is_resumable();

        let decision = decide_progress(
            &record.status,
            record.start_time_ms,
            record.received_bytes,
            info.received_bytes,
            start_time_ms,
        );
        match decision {
            Ok(outcome) => {
                record.absorb_info(&info);
                record.status = outcome.target;
                record.received_bytes = outcome.effective_bytes;
                record.start_time_ms = start_time_ms;
                record.can_use_metered = metered_allowed;
                if outcome.bump_generation {
                    record.generation += 1;
                    info!(generation = record.generation, "transfer resumed");
                }
                if outcome.clamped {
                    debug!(
                        floor = record.received_bytes,
                        incoming = info.received_bytes,
                        "regressed byte count clamped"
                    );
                }
                let record = self.commit(record, was_resumable).await;
                DispatchOutcome::Applied(record.status)
            }
            Err(ProgressReject::Illegal) => {
                Self::reject_illegal(&info.id, record.status, NotificationStatus::InProgress)
            }
            Err(ProgressReject::Stale) => {
                debug!(
                    recorded = record.start_time_ms,
                    incoming = start_time_ms,
                    "stale progress event dropped"
                );
                DispatchOutcome::RejectedStale
            }
        }
    }

    #[instrument(skip(self, info), fields(id = %info.id))]
    async fn apply_success(
        &mut self,
        info: TransferInfo,
        system_id: i64,
        can_resolve: bool,
        viewable_mime: bool,
    ) -> DispatchOutcome {
        let (mut record, known) = self.lookup_or_synthesize(&info);
        let was_resumable = known && record.is_resumable();
        let target = NotificationStatus::Succeeded;
        if !permits(&record.status, &target) {
            return Self::reject_illegal(&info.id, record.status, target);
        }

        record.absorb_info(&info);
        record.status = target;
        record.received_bytes = record.received_bytes.max(info.received_bytes);
        record.time_remaining = None;
        let record = self.commit(record, was_resumable).await;
        info!(bytes = record.received_bytes, "transfer succeeded");

        self.manager
            .on_succeeded(&record.transfer_id, system_id, can_resolve, viewable_mime)
            .await;
        DispatchOutcome::Applied(record.status)
    }

    #[instrument(skip(self, info), fields(id = %info.id))]
    async fn apply_failure(&mut self, info: TransferInfo, reason: FailReason) -> DispatchOutcome {
        let (mut record, known) = self.lookup_or_synthesize(&info);
        let was_resumable = known && record.is_resumable();
        let target = NotificationStatus::Failed(reason);
        if !permits(&record.status, &target) {
            return Self::reject_illegal(&info.id, record.status, target);
        }

        record.absorb_info(&info);
        record.status = target;
        record.received_bytes = record.received_bytes.max(info.received_bytes);
        record.time_remaining = None;
        let record = self.commit(record, was_resumable).await;
        info!(%reason, "transfer failed");
        DispatchOutcome::Applied(record.status)
    }

    #[instrument(skip(self, info), fields(id = %info.id))]
    async fn apply_paused(&mut self, info: TransferInfo) -> DispatchOutcome {
        let (mut record, known) = self.lookup_or_synthesize(&info);
        let was_resumable = known && record.is_resumable();
        let target = NotificationStatus::Paused;
        if !permits(&record.status, &target) {
            return Self::reject_illegal(&info.id, record.status, target);
        }

        record.absorb_info(&info);
        record.status = target;
        record.auto_resumable = info.resumable;
        record.received_bytes = record.received_bytes.max(info.received_bytes);
        let record = self.commit(record, was_resumable).await;
        info!(auto_resumable = record.auto_resumable, "transfer paused");
        DispatchOutcome::Applied(record.status)
    }

    #[instrument(skip(self, info), fields(id = %info.id))]
    async fn apply_interrupted(
        &mut self,
        info: TransferInfo,
        auto_resumable: bool,
        reason: PendingReason,
    ) -> DispatchOutcome {
        let (mut record, known) = self.lookup_or_synthesize(&info);
        let was_resumable = known && record.is_resumable();
        let target = NotificationStatus::Interrupted(reason);
        if !permits(&record.status, &target) {
            return Self::reject_illegal(&info.id, record.status, target);
        }

        record.absorb_info(&info);
        record.status = target;
        record.auto_resumable = auto_resumable;
        record.received_bytes = record.received_bytes.max(info.received_bytes);
        let record = self.commit(record, was_resumable).await;
        info!(%reason, auto_resumable, "transfer interrupted");
        DispatchOutcome::Applied(record.status)
    }

    #[instrument(skip(self, id), fields(id = %id))]
    async fn apply_canceled(&mut self, id: TransferId) -> DispatchOutcome {
        let Some(existing) = self.cache.get(&id) else {
            warn!("cancel reported for unknown transfer");
            return DispatchOutcome::UnknownIdentity;
        };
        let was_resumable = existing.is_resumable();
        let mut record = existing.clone();
        let target = NotificationStatus::Canceled;
        if !permits(&record.status, &target) {
            return Self::reject_illegal(&id, record.status, target);
        }

        record.status = target;
        record.time_remaining = None;
        // The record keeps its terminal row until the identity is purged;
        // only the notification is withdrawn.
        self.assign_or_persist(&mut record).await;
        if record.notification_id != 0 {
            if let Err(error) = self.presenter.cancel(record.notification_id).await {
                warn!(%error, "could not withdraw notification");
            }
        }
        let now_resumable = record.is_resumable();
        self.cache.insert(record.transfer_id.clone(), record);
        self.react_to_resumability(was_resumable, now_resumable).await;
        info!("transfer canceled");
        DispatchOutcome::Applied(NotificationStatus::Canceled)
    }

    #[instrument(skip(self, id), fields(id = %id))]
    async fn apply_remove(&mut self, notification_id: i64, id: TransferId) -> DispatchOutcome {
        let removed = self.cache.remove(&id);
        let was_resumable = removed.as_ref().is_some_and(StatusRecord::is_resumable);
        let mut found = removed.is_some();

        let store_id = if notification_id > 0 {
            Some(notification_id)
        } else {
            removed
                .as_ref()
                .map(|record| record.notification_id)
                .filter(|stored| *stored > 0)
        };
        if let Some(store_id) = store_id {
            match self.store.remove_by_notification(store_id).await {
                Ok(()) => found = true,
                Err(StoreError::RecordNotFound(_)) => {}
                Err(error) => warn!(%error, "could not remove status record"),
            }
        }

        let present_id = if notification_id != 0 {
            notification_id
        } else {
            removed.as_ref().map_or(0, |record| record.notification_id)
        };
        if present_id != 0 {
            if let Err(error) = self.presenter.cancel(present_id).await {
                warn!(%error, "could not withdraw notification");
            }
        }

        self.react_to_resumability(was_resumable, false).await;
        if found {
            info!(notification_id, "status record removed");
            DispatchOutcome::Removed
        } else {
            debug!(notification_id, "remove requested for unknown record");
            DispatchOutcome::UnknownIdentity
        }
    }

    #[instrument(skip(self))]
    async fn reconcile(&mut self, pinned: Option<i64>) {
        match self.store.list_all().await {
            Ok(stored) => {
                let off_record: Vec<StatusRecord> = self
                    .cache
                    .values()
                    .filter(|record| record.off_record)
                    .cloned()
                    .collect();
                self.cache = stored
                    .into_iter()
                    .map(|record| (record.transfer_id.clone(), record))
                    .collect();
                for record in off_record {
                    self.cache.insert(record.transfer_id.clone(), record);
                }
            }
            Err(error) => {
                warn!(%error, "store unreadable during reconcile; keeping cached records");
            }
        }

        if let Some(pinned_id) = pinned {
            match self
                .cache
                .values()
                .find(|record| record.notification_id == pinned_id)
            {
                Some(record) => self.present(record).await,
                None => debug!(pinned_id, "pinned notification has no record"),
            }
        }

        let outcome = self.scheduler.schedule_if_necessary().await;
        info!(records = self.cache.len(), ?outcome, "reconciled after host restart");
    }

    /// The host task is gone: anything transient or off-the-record must not
    /// outlive it.
    #[instrument(skip(self))]
    async fn sweep_task_removed(&mut self) {
        let doomed: Vec<StatusRecord> = self
            .cache
            .values()
            .filter(|record| record.off_record || record.transient)
            .cloned()
            .collect();
        for record in &doomed {
            if record.notification_id != 0 {
                if let Err(error) = self.presenter.cancel(record.notification_id).await {
                    warn!(id = %record.transfer_id, %error, "could not withdraw notification");
                }
            }
            if !record.off_record && record.notification_id > 0 {
                if let Err(error) = self.store.remove_by_notification(record.notification_id).await
                {
                    warn!(id = %record.transfer_id, %error, "could not remove transient record");
                }
            }
            self.cache.remove(&record.transfer_id);
        }
        if !doomed.is_empty() {
            info!(
                removed = doomed.len(),
                "swept transient and off-the-record notifications"
            );
        }
        self.scheduler.cancel_if_unnecessary().await;
    }

    fn snapshot(&self) -> Vec<StatusRecord> {
        let mut records: Vec<StatusRecord> = self.cache.values().cloned().collect();
        records.sort_by_key(|record| record.notification_id);
        records
    }

    fn lookup_or_synthesize(&self, info: &TransferInfo) -> (StatusRecord, bool) {
        match self.cache.get(&info.id) {
            Some(existing) => (existing.clone(), true),
            None => {
                let status = initial_status(info.received_bytes);
                debug!(id = %info.id, %status, "first event for identity; synthesizing record");
                (StatusRecord::new_from_info(info, status), false)
            }
        }
    }

    /// Persists the record (or hands an off-the-record one its ephemeral
    /// id), refreshes presentation, updates the cache, and pokes the
    /// scheduler when the record's resumability flipped.
    async fn commit(&mut self, mut record: StatusRecord, was_resumable: bool) -> StatusRecord {
        self.assign_or_persist(&mut record).await;
        self.present(&record).await;
        let now_resumable = record.is_resumable();
        self.cache.insert(record.transfer_id.clone(), record.clone());
        self.react_to_resumability(was_resumable, now_resumable).await;
        record
    }

    async fn assign_or_persist(&mut self, record: &mut StatusRecord) {
        if record.off_record {
            if record.notification_id == 0 {
                self.next_ephemeral_id -= 1;
                record.notification_id = self.next_ephemeral_id;
            }
            return;
        }
        match self.store.upsert(record).await {
            Ok(id) => record.notification_id = id,
            Err(error) => {
                // Cached state stays authoritative; the next successful
                // write self-heals.
                warn!(id = %record.transfer_id, %error, "status record write failed");
            }
        }
    }

    async fn present(&self, record: &StatusRecord) {
        if record.notification_id == 0 {
            // No id to address a notification with until a write succeeds
            return;
        }
        let rendered = RenderedStatus::from_record(record);
        if let Err(error) = self
            .presenter
            .show_or_update(record.notification_id, &rendered)
            .await
        {
            warn!(id = %record.transfer_id, %error, "presentation update failed");
        }
    }

    async fn react_to_resumability(&self, was: bool, now: bool) {
        if !was && now {
            let outcome = self.scheduler.schedule_if_necessary().await;
            debug!(?outcome, "transfer became resumable");
        } else if was && !now {
            let outcome = self.scheduler.cancel_if_unnecessary().await;
            debug!(?outcome, "transfer left the resumable set");
        }
    }

    fn reject_illegal(
        id: &TransferId,
        from: NotificationStatus,
        to: NotificationStatus,
    ) -> DispatchOutcome {
        warn!(%id, %from, %to, "illegal status transition rejected");
        DispatchOutcome::RejectedIllegal { from, to }
    }
}
