//! Notification state machine: transition legality, event ordering, and
//! byte-count monotonicity.
//!
//! Pure decision logic. The dispatcher worker applies the decisions; nothing
//! here touches storage or the presentation facility.

use crate::model::NotificationStatus;

/// Whether the state machine allows moving `from` → `to`.
///
/// Terminal statuses absorb: nothing leaves them. The terminal events
/// `Failed` and `Canceled` are accepted from every non-terminal status (a
/// terminal event wins over a non-terminal state); `Succeeded` requires
/// `InProgress`. Non-terminal self-loops are legal so repeated progress,
/// pause refreshes, and interruption reason changes can land.
pub(crate) fn permits(from: &NotificationStatus, to: &NotificationStatus) -> bool {
    use NotificationStatus::{Canceled, Failed, InProgress, Interrupted, Paused, Pending, Succeeded};

    if from.is_terminal() {
        return false;
    }

    match to {
        Canceled | Failed(_) => true,
        Succeeded => matches!(from, InProgress),
        InProgress => true,
        Paused => matches!(from, InProgress | Paused),
        Interrupted(_) => matches!(from, InProgress | Paused | Interrupted(_)),
        Pending => matches!(from, Pending),
    }
}

/// Initial status synthesized for an identity seen for the first time.
pub(crate) fn initial_status(received_bytes: u64) -> NotificationStatus {
    if received_bytes > 0 {
        NotificationStatus::InProgress
    } else {
        NotificationStatus::Pending
    }
}

/// Why a progress event was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProgressReject {
    /// The current status does not admit a progress transition.
    Illegal,
    /// The event carries an older logical start time than the record.
    Stale,
}

/// How to apply an admitted progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ProgressOutcome {
    pub target: NotificationStatus,
    /// True when this progress resumes a suspended transfer, which starts a
    /// new generation and resets the byte floor.
    pub bump_generation: bool,
    /// Byte count to record, after the monotonic clamp.
    pub effective_bytes: u64,
    /// True when the incoming count regressed and was clamped to the floor.
    pub clamped: bool,
}

/// Decides what an incoming progress event does to a known record.
///
/// Legality is checked first, then ordering: a progress event older than the
/// record's logical start time is stale and dropped (the later logical time
/// wins regardless of delivery order). Within one generation the byte count
/// never decreases; resuming from `Paused`/`Interrupted` starts a new
/// generation and takes the incoming count as the new floor.
pub(crate) fn decide_progress(
    current: &NotificationStatus,
    current_start_ms: i64,
    current_bytes: u64,
    incoming_bytes: u64,
    incoming_start_ms: i64,
) -> Result<ProgressOutcome, ProgressReject> {
    let target = match current {
        NotificationStatus::Pending if incoming_bytes == 0 => NotificationStatus::Pending,
        _ => NotificationStatus::InProgress,
    };

    if !permits(current, &target) {
        return Err(ProgressReject::Illegal);
    }

    if incoming_start_ms < current_start_ms {
        return Err(ProgressReject::Stale);
    }

    let bump_generation =
        current.is_suspended() && matches!(target, NotificationStatus::InProgress);

    let (effective_bytes, clamped) = if bump_generation {
        (incoming_bytes, false)
    } else if incoming_bytes < current_bytes {
        (current_bytes, true)
    } else {
        (incoming_bytes, false)
    };

    Ok(ProgressOutcome {
        target,
        bump_generation,
        effective_bytes,
        clamped,
    })
}
