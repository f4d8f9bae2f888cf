//! Shared fixtures for core tests (recording seam fakes, database setup,
//! coordinator assembly).
//!
//! Used by tests under `tests/core/` to stand in for the presentation
//! facility, the transfer engine, the transfer manager, and the
//! deferred-execution facility, recording every call so scenarios can
//! assert on cross-component effects.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tempfile::TempDir;
use transfer_notify_core::{
    Coordinator, Database, DeferredExecutor, ExecutorError, PresentError, Presenter,
    RenderedStatus, TransferEngine, TransferId, TransferInfo, TransferManager, TriggerConstraints,
    TriggerParams,
};

// ==================== Seam Fakes ====================

/// Presentation facility fake that records every show and cancel call.
///
/// `fail_shows` makes every subsequent `show_or_update` return
/// `PresentError::Unavailable`, simulating the facility being down.
#[derive(Default)]
pub struct RecordingPresenter {
    shown: Mutex<Vec<(i64, RenderedStatus)>>,
    canceled: Mutex<Vec<i64>>,
    fail_shows: AtomicBool,
}

impl RecordingPresenter {
    pub fn shown(&self) -> Vec<(i64, RenderedStatus)> {
        self.shown.lock().expect("presenter log lock").clone()
    }

    pub fn shown_count(&self) -> usize {
        self.shown.lock().expect("presenter log lock").len()
    }

    #[allow(dead_code)]
    pub fn last_shown(&self) -> Option<(i64, RenderedStatus)> {
        self.shown.lock().expect("presenter log lock").last().cloned()
    }

    pub fn canceled_ids(&self) -> Vec<i64> {
        self.canceled.lock().expect("presenter log lock").clone()
    }

    #[allow(dead_code)]
    pub fn fail_shows(&self) {
        self.fail_shows.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Presenter for RecordingPresenter {
    async fn show_or_update(
        &self,
        notification_id: i64,
        rendered: &RenderedStatus,
    ) -> Result<(), PresentError> {
        if self.fail_shows.load(Ordering::SeqCst) {
            return Err(PresentError::Unavailable(
                "presentation facility down".into(),
            ));
        }
        self.shown
            .lock()
            .expect("presenter log lock")
            .push((notification_id, rendered.clone()));
        Ok(())
    }

    async fn cancel(&self, notification_id: i64) -> Result<(), PresentError> {
        self.canceled
            .lock()
            .expect("presenter log lock")
            .push(notification_id);
        Ok(())
    }
}

/// Transfer manager fake that records every completion hand-off.
#[derive(Default)]
pub struct RecordingManager {
    successes: Mutex<Vec<(TransferId, i64, bool, bool)>>,
}

impl RecordingManager {
    pub fn successes(&self) -> Vec<(TransferId, i64, bool, bool)> {
        self.successes.lock().expect("manager log lock").clone()
    }
}

#[async_trait]
impl TransferManager for RecordingManager {
    async fn on_succeeded(
        &self,
        id: &TransferId,
        system_id: i64,
        can_resolve: bool,
        viewable_mime: bool,
    ) {
        self.successes
            .lock()
            .expect("manager log lock")
            .push((id.clone(), system_id, can_resolve, viewable_mime));
    }
}

/// Transfer engine fake that records which identities were asked to resume.
#[derive(Default)]
pub struct RecordingEngine {
    resumed: Mutex<Vec<TransferId>>,
}

impl RecordingEngine {
    pub fn resumed_ids(&self) -> Vec<TransferId> {
        self.resumed.lock().expect("engine log lock").clone()
    }
}

#[async_trait]
impl TransferEngine for RecordingEngine {
    async fn resume(&self, id: &TransferId) {
        self.resumed.lock().expect("engine log lock").push(id.clone());
    }
}

/// Deferred-execution facility fake counting registrations and cancellations.
///
/// `refuse_registrations` makes `register` fail the way a facility refuses
/// a request, without counting it as placed.
#[derive(Default)]
pub struct RecordingExecutor {
    registers: AtomicUsize,
    cancels: AtomicUsize,
    refuse: AtomicBool,
    last_constraints: Mutex<Option<TriggerConstraints>>,
}

impl RecordingExecutor {
    pub fn registers(&self) -> usize {
        self.registers.load(Ordering::SeqCst)
    }

    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    #[allow(dead_code)]
    pub fn last_constraints(&self) -> Option<TriggerConstraints> {
        *self.last_constraints.lock().expect("executor log lock")
    }

    #[allow(dead_code)]
    pub fn refuse_registrations(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

#[async_trait]
impl DeferredExecutor for RecordingExecutor {
    async fn register(&self, constraints: TriggerConstraints) -> Result<(), ExecutorError> {
        *self.last_constraints.lock().expect("executor log lock") = Some(constraints);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(ExecutorError::RegistrationRefused(
                "facility rejected the request".into(),
            ));
        }
        self.registers.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn cancel(&self) -> Result<(), ExecutorError> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ==================== Core Assembly ====================

/// Everything a scenario needs: the assembled core plus handles to every
/// fake it was wired with.
pub struct TestCore {
    pub coordinator: Coordinator,
    pub presenter: Arc<RecordingPresenter>,
    pub manager: Arc<RecordingManager>,
    pub engine: Arc<RecordingEngine>,
    pub executor: Arc<RecordingExecutor>,
}

/// Creates a temp directory holding a database path for a core under test.
///
/// The `TempDir` must be kept alive for the path to remain valid.
pub fn temp_db_path() -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("core-test.db");
    (dir, path)
}

/// Assembles a full coordination core against `db_path` with recording
/// fakes at every seam.
///
/// Calling this twice with the same path (after shutting the first core
/// down) simulates a process restart over the same database.
pub async fn start_core(db_path: &Path) -> TestCore {
    let db = Database::new(db_path).await.expect("open test database");
    let presenter = Arc::new(RecordingPresenter::default());
    let manager = Arc::new(RecordingManager::default());
    let engine = Arc::new(RecordingEngine::default());
    let executor = Arc::new(RecordingExecutor::default());
    let coordinator = Coordinator::start(
        db,
        presenter.clone(),
        manager.clone(),
        engine.clone(),
        executor.clone(),
    )
    .await;
    TestCore {
        coordinator,
        presenter,
        manager,
        engine,
        executor,
    }
}

// ==================== Scenario Helpers ====================

/// A transfer snapshot with the given received bytes and a 1000-byte total.
pub fn transfer(id: &str, received: u64) -> TransferInfo {
    let mut info = TransferInfo::new(TransferId::new(id), format!("{id}.bin"));
    info.received_bytes = received;
    info.total_bytes = Some(1_000);
    info
}

/// Like [`transfer`], but flagged resumable by the engine.
#[allow(dead_code)]
pub fn resumable_transfer(id: &str, received: u64) -> TransferInfo {
    let mut info = transfer(id, received);
    info.resumable = true;
    info
}

/// Fires the resumption trigger and waits until dispatch of the whole
/// resumable set has finished.
#[allow(dead_code)]
pub async fn fire_trigger(core: &TestCore) {
    let (tx, rx) = tokio::sync::oneshot::channel();
    core.coordinator.trigger_handler().on_trigger(
        TriggerParams {
            schedule_generation: 0,
        },
        move |needs_reschedule| {
            let _ = tx.send(needs_reschedule);
        },
    );
    let needs_reschedule = rx.await.expect("trigger dispatch finished");
    assert!(
        !needs_reschedule,
        "trigger dispatch never asks the facility for a native reschedule"
    );
}
