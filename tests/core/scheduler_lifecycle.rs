//! Resumption scheduling behavior driven through the assembled core, plus
//! lifecycle signal fan-out to registered observers.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use transfer_notify_core::{LifecycleObserver, PendingReason, TransferId};

use crate::support::{fire_trigger, resumable_transfer, start_core, temp_db_path, transfer};

#[tokio::test]
async fn test_scheduling_is_idempotent_across_repeated_calls() {
    let (_dir, path) = temp_db_path();
    let core = start_core(&path).await;

    core.coordinator
        .dispatcher()
        .report_interrupted(resumable_transfer("only", 40), true, PendingReason::Unknown)
        .await
        .expect("dispatch interruption");
    assert_eq!(core.executor.registers(), 1);

    for _ in 0..5 {
        core.coordinator.scheduler().schedule_if_necessary().await;
    }
    assert_eq!(
        core.executor.registers(),
        1,
        "repeated scheduling never stacks registrations"
    );
}

#[tokio::test]
async fn test_refused_registration_retries_on_the_next_resumable_transition() {
    let (_dir, path) = temp_db_path();
    let core = start_core(&path).await;
    let dispatcher = core.coordinator.dispatcher();

    core.executor.refuse_registrations(true);
    dispatcher
        .report_interrupted(resumable_transfer("first", 10), true, PendingReason::Unknown)
        .await
        .expect("dispatch interruption");
    assert_eq!(core.executor.registers(), 0, "refused request not counted");
    let state = core
        .coordinator
        .store()
        .schedule_state()
        .await
        .expect("schedule state");
    assert!(!state.scheduled, "refusal leaves the flag down for retry");

    // The facility recovers; the next transfer entering the resumable set
    // retries the registration for the whole set.
    core.executor.refuse_registrations(false);
    dispatcher
        .report_paused(resumable_transfer("second", 20))
        .await
        .expect("dispatch pause");
    assert_eq!(core.executor.registers(), 1);
    let state = core
        .coordinator
        .store()
        .schedule_state()
        .await
        .expect("schedule state");
    assert!(state.scheduled);
}

#[tokio::test]
async fn test_trigger_resumes_every_transfer_then_unschedules_when_set_drains() {
    let (_dir, path) = temp_db_path();
    let core = start_core(&path).await;
    let dispatcher = core.coordinator.dispatcher();

    dispatcher
        .report_interrupted(resumable_transfer("a", 10), true, PendingReason::Unknown)
        .await
        .expect("dispatch interruption");
    dispatcher
        .report_interrupted(resumable_transfer("b", 20), true, PendingReason::Queued)
        .await
        .expect("dispatch interruption");

    fire_trigger(&core).await;
    assert_eq!(
        core.engine.resumed_ids(),
        vec![TransferId::new("a"), TransferId::new("b")]
    );
    assert_eq!(
        core.executor.cancels(),
        0,
        "set still resumable right after dispatch"
    );

    // Both attempts come back to life; the second departure empties the
    // set and withdraws the registration.
    dispatcher
        .report_progress(transfer("a", 15), 50, true)
        .await
        .expect("dispatch progress");
    assert_eq!(core.executor.cancels(), 0);
    dispatcher
        .report_progress(transfer("b", 25), 50, true)
        .await
        .expect("dispatch progress");
    assert_eq!(core.executor.cancels(), 1);

    let state = core
        .coordinator
        .store()
        .schedule_state()
        .await
        .expect("schedule state");
    assert!(!state.scheduled);
}

#[tokio::test]
async fn test_stop_callback_declines_native_reschedule_and_next_trigger_recovers() {
    let (_dir, path) = temp_db_path();
    let core = start_core(&path).await;
    let handler = core.coordinator.trigger_handler();

    assert!(!handler.on_stop(), "no native reschedule requested");
    assert!(handler.stop_signal().is_raised());

    // The next firing starts fresh; a stale stop never poisons it.
    fire_trigger(&core).await;
    assert!(!handler.stop_signal().is_raised());
    assert!(core.engine.resumed_ids().is_empty());
}

#[tokio::test]
async fn test_metered_constraint_follows_the_resumable_set() {
    let (_dir, path) = temp_db_path();
    let core = start_core(&path).await;
    let dispatcher = core.coordinator.dispatcher();

    dispatcher
        .report_progress(transfer("frugal", 30), 10, false)
        .await
        .expect("dispatch progress");
    dispatcher
        .report_interrupted(
            resumable_transfer("frugal", 30),
            true,
            PendingReason::UnmeteredNetworkRequired,
        )
        .await
        .expect("dispatch interruption");

    let constraints = core
        .executor
        .last_constraints()
        .expect("registration carried constraints");
    assert!(
        !constraints.allow_metered,
        "one metered-forbidden transfer pins the whole trigger to unmetered"
    );
}

/// Observer that counts every signal it receives.
#[derive(Default)]
struct CountingObserver {
    restarts: AtomicUsize,
    removals: AtomicUsize,
    destroys: AtomicUsize,
    last_pinned: Mutex<Option<i64>>,
}

impl LifecycleObserver for CountingObserver {
    fn on_restarted(&self, pinned: Option<i64>) {
        self.restarts.fetch_add(1, Ordering::SeqCst);
        *self.last_pinned.lock().expect("pinned lock") = pinned;
    }

    fn on_task_removed(&self) {
        self.removals.fetch_add(1, Ordering::SeqCst);
    }

    fn on_destroyed(&self) {
        self.destroys.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_lifecycle_signals_fan_out_to_registered_observers() {
    let (_dir, path) = temp_db_path();
    let core = start_core(&path).await;

    let observer = Arc::new(CountingObserver::default());
    let token = core.coordinator.lifecycle().register(observer.clone());

    core.coordinator.restarted(Some(9)).await;
    core.coordinator.task_removed().await;
    core.coordinator.destroyed();

    assert_eq!(observer.restarts.load(Ordering::SeqCst), 1);
    assert_eq!(*observer.last_pinned.lock().expect("pinned lock"), Some(9));
    assert_eq!(observer.removals.load(Ordering::SeqCst), 1);
    assert_eq!(observer.destroys.load(Ordering::SeqCst), 1);

    assert!(core.coordinator.lifecycle().unregister(token));
    core.coordinator.destroyed();
    assert_eq!(
        observer.destroys.load(Ordering::SeqCst),
        1,
        "nothing delivered after unregistration"
    );
}
