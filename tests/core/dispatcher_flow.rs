//! Dispatcher event flows end to end: the interruption/resume/completion
//! round trip, out-of-order delivery, illegal transitions, byte
//! monotonicity, off-the-record handling, and presentation fallout.

use transfer_notify_core::{
    DispatchOutcome, FailReason, NotificationStatus, PendingReason, TransferId,
};

use crate::support::{fire_trigger, resumable_transfer, start_core, temp_db_path, transfer};

/// The central round trip: a transfer starts, is interrupted by the
/// network, gets scheduled, resumed by the trigger, and completes. Exactly
/// one record survives and nothing stays scheduled.
#[tokio::test]
async fn test_interruption_resume_completion_round_trip() {
    let (_dir, path) = temp_db_path();
    let core = start_core(&path).await;
    let dispatcher = core.coordinator.dispatcher();

    // First sighting at zero bytes surfaces as pending.
    let outcome = dispatcher
        .report_progress(transfer("doc", 0), 100, true)
        .await
        .expect("dispatch progress");
    assert_eq!(outcome, DispatchOutcome::Applied(NotificationStatus::Pending));

    // Bytes arriving moves it to in-progress.
    let outcome = dispatcher
        .report_progress(transfer("doc", 500), 100, true)
        .await
        .expect("dispatch progress");
    assert_eq!(
        outcome,
        DispatchOutcome::Applied(NotificationStatus::InProgress)
    );

    // The connection drops; the engine says it can pick the transfer back up.
    let outcome = dispatcher
        .report_interrupted(resumable_transfer("doc", 500), true, PendingReason::Unknown)
        .await
        .expect("dispatch interruption");
    assert_eq!(
        outcome,
        DispatchOutcome::Applied(NotificationStatus::Interrupted(PendingReason::Unknown))
    );
    assert_eq!(core.executor.registers(), 1, "one deferred wake-up placed");

    // The facility fires; the engine is asked to resume the transfer.
    fire_trigger(&core).await;
    assert_eq!(core.engine.resumed_ids(), vec![TransferId::new("doc")]);

    // The resumed attempt reports at the same byte count under a later
    // logical start time; this opens a new generation.
    let outcome = dispatcher
        .report_progress(transfer("doc", 500), 150, true)
        .await
        .expect("dispatch progress");
    assert_eq!(
        outcome,
        DispatchOutcome::Applied(NotificationStatus::InProgress)
    );
    let records = dispatcher.snapshot().await.expect("snapshot");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].generation, 1);
    assert_eq!(
        core.executor.cancels(),
        1,
        "leaving the resumable set withdraws the wake-up"
    );

    // The transfer finishes.
    dispatcher
        .report_progress(transfer("doc", 1000), 150, true)
        .await
        .expect("dispatch progress");
    let outcome = dispatcher
        .report_success(transfer("doc", 1000), 7, true, true)
        .await
        .expect("dispatch success");
    assert_eq!(
        outcome,
        DispatchOutcome::Applied(NotificationStatus::Succeeded)
    );

    let records = core.coordinator.store().list_all().await.expect("list all");
    assert_eq!(records.len(), 1, "exactly one record for the identity");
    assert_eq!(records[0].status, NotificationStatus::Succeeded);

    let state = core
        .coordinator
        .store()
        .schedule_state()
        .await
        .expect("schedule state");
    assert!(!state.scheduled, "nothing left to schedule");
}

#[tokio::test]
async fn test_later_logical_time_wins_over_delivery_order() {
    let (_dir, path) = temp_db_path();
    let core = start_core(&path).await;
    let dispatcher = core.coordinator.dispatcher();

    let outcome = dispatcher
        .report_progress(transfer("late", 700), 200, true)
        .await
        .expect("dispatch progress");
    assert_eq!(
        outcome,
        DispatchOutcome::Applied(NotificationStatus::InProgress)
    );

    // An event from the earlier attempt arrives afterwards.
    let outcome = dispatcher
        .report_progress(transfer("late", 900), 150, true)
        .await
        .expect("dispatch progress");
    assert_eq!(outcome, DispatchOutcome::RejectedStale);

    let records = dispatcher.snapshot().await.expect("snapshot");
    assert_eq!(records[0].received_bytes, 700, "stale bytes never applied");
    assert_eq!(records[0].start_time_ms, 200);
}

#[tokio::test]
async fn test_failure_after_cancel_is_rejected_and_cancel_retained() {
    let (_dir, path) = temp_db_path();
    let core = start_core(&path).await;
    let dispatcher = core.coordinator.dispatcher();
    let id = TransferId::new("doomed");

    dispatcher
        .report_progress(transfer("doomed", 10), 50, true)
        .await
        .expect("dispatch progress");
    let outcome = dispatcher
        .report_canceled(id.clone())
        .await
        .expect("dispatch cancel");
    assert_eq!(
        outcome,
        DispatchOutcome::Applied(NotificationStatus::Canceled)
    );

    let outcome = dispatcher
        .report_failure(transfer("doomed", 10), FailReason::Network)
        .await
        .expect("dispatch failure");
    assert_eq!(
        outcome,
        DispatchOutcome::RejectedIllegal {
            from: NotificationStatus::Canceled,
            to: NotificationStatus::Failed(FailReason::Network),
        }
    );

    let record = core
        .coordinator
        .store()
        .get(&id)
        .await
        .expect("store get")
        .expect("record retained");
    assert_eq!(record.status, NotificationStatus::Canceled);
}

#[tokio::test]
async fn test_byte_counts_never_regress_within_a_generation() {
    let (_dir, path) = temp_db_path();
    let core = start_core(&path).await;
    let dispatcher = core.coordinator.dispatcher();

    dispatcher
        .report_progress(transfer("clamp", 500), 100, true)
        .await
        .expect("dispatch progress");
    let outcome = dispatcher
        .report_progress(transfer("clamp", 400), 120, true)
        .await
        .expect("dispatch progress");
    assert_eq!(
        outcome,
        DispatchOutcome::Applied(NotificationStatus::InProgress)
    );

    let records = dispatcher.snapshot().await.expect("snapshot");
    assert_eq!(records[0].received_bytes, 500, "clamped to the floor");
    assert_eq!(records[0].generation, 0, "no suspension, no new generation");

    let (_, rendered) = core.presenter.last_shown().expect("something shown");
    assert_eq!(rendered.received_bytes, 500, "presentation shows the floor");
}

#[tokio::test]
async fn test_resume_after_pause_opens_a_generation_accepting_lower_bytes() {
    let (_dir, path) = temp_db_path();
    let core = start_core(&path).await;
    let dispatcher = core.coordinator.dispatcher();

    dispatcher
        .report_progress(transfer("gen", 600), 100, true)
        .await
        .expect("dispatch progress");
    let outcome = dispatcher
        .report_paused(resumable_transfer("gen", 600))
        .await
        .expect("dispatch pause");
    assert_eq!(outcome, DispatchOutcome::Applied(NotificationStatus::Paused));
    assert_eq!(core.executor.registers(), 1, "paused resumable gets scheduled");

    // The restarted attempt begins from an earlier offset.
    dispatcher
        .report_progress(transfer("gen", 100), 130, true)
        .await
        .expect("dispatch progress");

    let records = dispatcher.snapshot().await.expect("snapshot");
    assert_eq!(records[0].generation, 1);
    assert_eq!(
        records[0].received_bytes, 100,
        "new generation resets the byte floor"
    );
}

#[tokio::test]
async fn test_success_hands_off_to_the_manager_once() {
    let (_dir, path) = temp_db_path();
    let core = start_core(&path).await;
    let dispatcher = core.coordinator.dispatcher();

    dispatcher
        .report_progress(transfer("done", 900), 10, true)
        .await
        .expect("dispatch progress");
    dispatcher
        .report_success(transfer("done", 1000), 42, false, true)
        .await
        .expect("dispatch success");

    assert_eq!(
        core.manager.successes(),
        vec![(TransferId::new("done"), 42, false, true)]
    );
}

#[tokio::test]
async fn test_cancel_withdraws_notification_but_keeps_the_record() {
    let (_dir, path) = temp_db_path();
    let core = start_core(&path).await;
    let dispatcher = core.coordinator.dispatcher();
    let id = TransferId::new("cx");

    dispatcher
        .report_progress(transfer("cx", 300), 5, true)
        .await
        .expect("dispatch progress");
    let notification_id = dispatcher.snapshot().await.expect("snapshot")[0].notification_id;
    assert!(notification_id > 0, "persisted records use the store rowid");

    dispatcher
        .report_canceled(id.clone())
        .await
        .expect("dispatch cancel");

    assert_eq!(core.presenter.canceled_ids(), vec![notification_id]);
    let record = core
        .coordinator
        .store()
        .get(&id)
        .await
        .expect("store get")
        .expect("record retained until purged");
    assert_eq!(record.status, NotificationStatus::Canceled);
}

#[tokio::test]
async fn test_remove_record_purges_store_and_presentation() {
    let (_dir, path) = temp_db_path();
    let core = start_core(&path).await;
    let dispatcher = core.coordinator.dispatcher();
    let id = TransferId::new("gone");

    dispatcher
        .report_progress(transfer("gone", 100), 5, true)
        .await
        .expect("dispatch progress");
    let notification_id = dispatcher.snapshot().await.expect("snapshot")[0].notification_id;

    let outcome = dispatcher
        .remove_record(notification_id, id.clone())
        .await
        .expect("dispatch remove");
    assert_eq!(outcome, DispatchOutcome::Removed);

    assert!(
        core.coordinator
            .store()
            .get(&id)
            .await
            .expect("store get")
            .is_none()
    );
    assert!(dispatcher.snapshot().await.expect("snapshot").is_empty());
    assert!(core.presenter.canceled_ids().contains(&notification_id));
}

#[tokio::test]
async fn test_cancel_for_unknown_identity_reports_unknown() {
    let (_dir, path) = temp_db_path();
    let core = start_core(&path).await;

    let outcome = core
        .coordinator
        .dispatcher()
        .report_canceled(TransferId::new("never-seen"))
        .await
        .expect("dispatch cancel");
    assert_eq!(outcome, DispatchOutcome::UnknownIdentity);
}

#[tokio::test]
async fn test_off_record_transfer_never_touches_the_store() {
    let (_dir, path) = temp_db_path();
    let core = start_core(&path).await;
    let dispatcher = core.coordinator.dispatcher();

    let mut info = transfer("ghost", 200);
    info.off_record = true;
    dispatcher
        .report_progress(info, 60, true)
        .await
        .expect("dispatch progress");

    let records = dispatcher.snapshot().await.expect("snapshot");
    assert_eq!(records.len(), 1);
    assert!(records[0].off_record);
    assert_eq!(
        records[0].notification_id, -1,
        "off-record identities get ephemeral negative ids"
    );
    assert!(
        core.coordinator
            .store()
            .list_all()
            .await
            .expect("list all")
            .is_empty(),
        "nothing durable for off-record transfers"
    );

    dispatcher
        .report_canceled(TransferId::new("ghost"))
        .await
        .expect("dispatch cancel");
    assert_eq!(core.presenter.canceled_ids(), vec![-1]);
    assert!(
        core.coordinator
            .store()
            .list_all()
            .await
            .expect("list all")
            .is_empty()
    );
}

#[tokio::test]
async fn test_task_removed_sweeps_transient_and_off_record_only() {
    let (_dir, path) = temp_db_path();
    let core = start_core(&path).await;
    let dispatcher = core.coordinator.dispatcher();

    dispatcher
        .report_progress(transfer("keeper", 10), 1, true)
        .await
        .expect("dispatch progress");
    let mut fleeting = transfer("fleeting", 10);
    fleeting.transient = true;
    dispatcher
        .report_progress(fleeting, 1, true)
        .await
        .expect("dispatch progress");
    let mut ghost = transfer("ghost", 10);
    ghost.off_record = true;
    dispatcher
        .report_progress(ghost, 1, true)
        .await
        .expect("dispatch progress");

    core.coordinator.task_removed().await;

    let records = dispatcher.snapshot().await.expect("snapshot");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].transfer_id, TransferId::new("keeper"));

    let stored = core.coordinator.store().list_all().await.expect("list all");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].transfer_id, TransferId::new("keeper"));

    let canceled = core.presenter.canceled_ids();
    assert_eq!(canceled.len(), 2, "both doomed notifications withdrawn");
    assert!(canceled.contains(&-1));
}

#[tokio::test]
async fn test_restart_reconciliation_re_presents_the_pinned_notification() {
    let (_dir, path) = temp_db_path();
    let core = start_core(&path).await;
    let dispatcher = core.coordinator.dispatcher();

    dispatcher
        .report_progress(transfer("a", 10), 1, true)
        .await
        .expect("dispatch progress");
    dispatcher
        .report_progress(transfer("b", 20), 1, true)
        .await
        .expect("dispatch progress");
    let pinned = core
        .coordinator
        .store()
        .get(&TransferId::new("a"))
        .await
        .expect("store get")
        .expect("record exists")
        .notification_id;

    let before = core.presenter.shown_count();
    core.coordinator.restarted(Some(pinned)).await;

    assert_eq!(core.presenter.shown_count(), before + 1);
    let (shown_id, _) = core.presenter.last_shown().expect("pinned re-presented");
    assert_eq!(shown_id, pinned);
    assert_eq!(dispatcher.snapshot().await.expect("snapshot").len(), 2);
}

#[tokio::test]
async fn test_presenter_failure_does_not_block_state_updates() {
    let (_dir, path) = temp_db_path();
    let core = start_core(&path).await;
    core.presenter.fail_shows();

    let outcome = core
        .coordinator
        .dispatcher()
        .report_progress(transfer("sturdy", 50), 9, true)
        .await
        .expect("dispatch progress");
    assert_eq!(
        outcome,
        DispatchOutcome::Applied(NotificationStatus::InProgress)
    );

    let record = core
        .coordinator
        .store()
        .get(&TransferId::new("sturdy"))
        .await
        .expect("store get")
        .expect("state persisted despite presentation failure");
    assert_eq!(record.received_bytes, 50);
}
