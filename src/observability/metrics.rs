//! Metrics for the phase tracker.
//!
//! Recorded through the `metrics` facade. Every call is a no-op until the
//! embedding application installs a recorder. Labels come from closed
//! enums, so cardinality is bounded by construction.

use metrics::{counter, describe_counter, describe_gauge, gauge};

use crate::phase::{CaptureKind, PhaseState};

/// Registers metric descriptions with the global recorder.
pub fn describe_metrics() {
    describe_counter!("phasetrack_frames_pushed_total", "Phase frames pushed");
    describe_counter!("phasetrack_frames_popped_total", "Phase frames popped");
    describe_counter!(
        "phasetrack_runaways_total",
        "Entries degraded to the neutral phase"
    );
    describe_counter!(
        "phasetrack_capture_failures_total",
        "Captures skipped during unwind"
    );
    describe_counter!(
        "phasetrack_captures_rejected_total",
        "Captures no frame on the stack accepted"
    );
    describe_counter!(
        "phasetrack_protocol_violations_total",
        "Enter/exit protocol violations"
    );
    describe_counter!(
        "phasetrack_notifications_total",
        "Notifications produced by unwinding"
    );
    describe_gauge!("phasetrack_stack_depth", "Current phase stack depth");
}

/// Records a push.
pub fn record_frame_pushed(phase: PhaseState) {
    counter!("phasetrack_frames_pushed_total", "phase" => phase.key()).increment(1);
}

/// Records a pop.
pub fn record_frame_popped(phase: PhaseState) {
    counter!("phasetrack_frames_popped_total", "phase" => phase.key()).increment(1);
}

/// Records an entry degraded to the neutral phase.
///
/// `reason` is `"runaway"` or `"depth"`.
pub fn record_degraded(origin: PhaseState, reason: &'static str) {
    counter!(
        "phasetrack_runaways_total",
        "phase" => origin.key(),
        "reason" => reason
    )
    .increment(1);
}

/// Records a capture skipped during unwind.
pub fn record_capture_failure(kind: CaptureKind) {
    counter!("phasetrack_capture_failures_total", "kind" => capture_label(kind)).increment(1);
}

/// Records a capture that found no accepting frame.
pub fn record_capture_rejected(kind: CaptureKind) {
    counter!("phasetrack_captures_rejected_total", "kind" => capture_label(kind)).increment(1);
}

/// Records a protocol violation.
pub fn record_protocol_violation() {
    counter!("phasetrack_protocol_violations_total").increment(1);
}

/// Records one emitted notification.
pub fn record_notification(kind: &'static str) {
    counter!("phasetrack_notifications_total", "kind" => kind).increment(1);
}

/// Sets the stack depth gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_stack_depth(depth: usize) {
    gauge!("phasetrack_stack_depth").set(depth as f64);
}

const fn capture_label(kind: CaptureKind) -> &'static str {
    match kind {
        CaptureKind::BlockChange => "block_change",
        CaptureKind::EntitySpawn => "entity_spawn",
        CaptureKind::SlotTransaction => "slot_transaction",
    }
}
