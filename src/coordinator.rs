//! Process-wide wiring: exactly one logical coordination core per process,
//! built once at start and handed by reference to everything that needs it.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::db::Database;
use crate::engine::{TransferEngine, TransferManager};
use crate::lifecycle::LifecycleRegistry;
use crate::notify::{NotificationDispatcher, Presenter};
use crate::resume::{DeferredExecutor, ResumptionScheduler, ScheduleOutcome, TriggerHandler};
use crate::store::RecordStore;

/// The assembled coordination core.
///
/// Owns the dispatcher worker, the scheduler, the lifecycle registry, and
/// the trigger handler, all sharing one record store. Host adapters get at
/// the pieces through the accessors; nothing here is a global.
pub struct Coordinator {
    store: RecordStore,
    dispatcher: NotificationDispatcher,
    scheduler: ResumptionScheduler,
    lifecycle: Arc<LifecycleRegistry>,
    trigger: TriggerHandler,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Coordinator {
    /// Brings the core up against an opened database.
    ///
    /// Transfers left `pending` or `in_progress` by a dead process are
    /// marked interrupted and auto-resumable before anything else runs, so
    /// the first scheduling pass already sees them. Store trouble during
    /// startup degrades to an empty view; it never prevents the core from
    /// coming up.
    #[instrument(skip_all)]
    pub async fn start(
        db: Database,
        presenter: Arc<dyn Presenter>,
        manager: Arc<dyn TransferManager>,
        engine: Arc<dyn TransferEngine>,
        executor: Arc<dyn DeferredExecutor>,
    ) -> Self {
        let store = RecordStore::new(db);

        match store.reset_in_flight().await {
            Ok(0) => {}
            Ok(reset) => info!(reset, "marked in-flight transfers interrupted after cold start"),
            Err(error) => warn!(%error, "could not reset in-flight transfers"),
        }

        let preload = match store.list_all().await {
            Ok(records) => records,
            Err(error) => {
                warn!(%error, "store unreadable at start; beginning with an empty cache");
                Vec::new()
            }
        };

        let scheduler = ResumptionScheduler::new(store.clone(), engine, executor);
        let (dispatcher, worker) = NotificationDispatcher::spawn(
            store.clone(),
            presenter,
            manager,
            scheduler.clone(),
            preload,
        );
        let trigger = TriggerHandler::new(scheduler.clone());
        let lifecycle = Arc::new(LifecycleRegistry::new());

        // Recompute the schedule decision from persisted state in both
        // directions: a kill between a set change and the matching
        // scheduler call must not leave a stale registration behind.
        let outcome = scheduler.schedule_if_necessary().await;
        if outcome == ScheduleOutcome::NothingResumable {
            scheduler.cancel_if_unnecessary().await;
        }
        info!(?outcome, "transfer coordination core started");

        Self {
            store,
            dispatcher,
            scheduler,
            lifecycle,
            trigger,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Host signal: the hosting service was torn down and recreated.
    ///
    /// The dispatcher reconciles its cache against the store and re-presents
    /// the pinned notification; then the signal fans out to subscribers.
    #[instrument(skip(self))]
    pub async fn restarted(&self, pinned: Option<i64>) {
        if let Err(error) = self.dispatcher.reconcile_restarted(pinned).await {
            warn!(%error, "dispatcher unavailable during restart reconciliation");
        }
        self.lifecycle.publish_restarted(pinned);
    }

    /// Host signal: the user removed the host task.
    ///
    /// Transient and off-the-record notifications must not outlive the
    /// task; persisted non-transient records stay.
    #[instrument(skip(self))]
    pub async fn task_removed(&self) {
        if let Err(error) = self.dispatcher.handle_task_removed().await {
            warn!(%error, "dispatcher unavailable during task-removed sweep");
        }
        self.lifecycle.publish_task_removed();
    }

    /// Host signal: the hosting service is going away for good.
    ///
    /// Nothing to tear down here; persisted state is already durable and
    /// recovery happens on the next start.
    #[instrument(skip(self))]
    pub fn destroyed(&self) {
        info!("hosting service destroyed");
        self.lifecycle.publish_destroyed();
    }

    /// Stops the dispatcher worker after it drains queued events.
    pub async fn shutdown(&self) {
        self.dispatcher.shutdown().await;
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            if let Err(error) = worker.await {
                warn!(%error, "dispatcher worker ended abnormally");
            }
        }
    }

    #[must_use]
    pub fn dispatcher(&self) -> &NotificationDispatcher {
        &self.dispatcher
    }

    #[must_use]
    pub fn scheduler(&self) -> &ResumptionScheduler {
        &self.scheduler
    }

    #[must_use]
    pub fn lifecycle(&self) -> &Arc<LifecycleRegistry> {
        &self.lifecycle
    }

    #[must_use]
    pub fn trigger_handler(&self) -> &TriggerHandler {
        &self.trigger
    }

    #[must_use]
    pub fn store(&self) -> &RecordStore {
        &self.store
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator").finish_non_exhaustive()
    }
}
