//! Replays a hook trace through a [`PhaseTracker`].
//!
//! Each hook is run inside a tracker scope. A hook marked `fail` returns an
//! error after its captures; the error propagates up the hook tree like an
//! exception would in an engine, and every scope it passes through still
//! exits. The failure ends that top-level hook only; the tick goes on.

use std::collections::HashSet;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::TrackerConfig;
use crate::error::{TraceError, TrackerError};
use crate::observability::{Event, EventEmitter, TickSummary};
use crate::phase::{BlockPos, ChunkPos, EntityId, Notification, PhaseState, WorldView};
use crate::tracker::{Diagnostic, PhaseTracker};

use super::trace::{HookSpec, HookTrace, WorldSpec};

/// World view backed by a trace's `world` section.
#[derive(Debug, Clone, Default)]
pub struct ScriptedWorld {
    despawned: HashSet<EntityId>,
    unloaded: HashSet<ChunkPos>,
}

impl From<&WorldSpec> for ScriptedWorld {
    fn from(spec: &WorldSpec) -> Self {
        Self {
            despawned: spec.despawned.iter().copied().collect(),
            unloaded: spec.unloaded_chunks.iter().copied().collect(),
        }
    }
}

impl WorldView for ScriptedWorld {
    fn entity_exists(&self, entity: EntityId) -> bool {
        !self.despawned.contains(&entity)
    }

    fn is_block_loaded(&self, pos: BlockPos) -> bool {
        !self.unloaded.contains(&pos.chunk())
    }
}

/// Outcome of one replayed tick.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TickReport {
    /// Zero-based tick index
    pub tick: u64,
    /// Notifications, in unwind order
    pub notifications: Vec<Notification>,
    /// Diagnostics raised during the tick
    pub diagnostics: Vec<Diagnostic>,
    /// Top-level hooks that failed
    pub failed_hooks: usize,
    /// Deepest stack reached
    pub max_depth: usize,
}

impl TickReport {
    /// Totals for the tick-finished event.
    #[must_use]
    pub fn summary(&self) -> TickSummary {
        TickSummary {
            notifications: self.notifications.len(),
            diagnostics: self.diagnostics.len(),
            max_depth: self.max_depth,
        }
    }
}

/// Outcome of a full replay.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReplayReport {
    /// Trace name, if it had one
    pub name: Option<String>,
    /// Per-tick results
    pub ticks: Vec<TickReport>,
}

impl ReplayReport {
    /// Notifications across all ticks.
    #[must_use]
    pub fn notification_count(&self) -> usize {
        self.ticks.iter().map(|t| t.notifications.len()).sum()
    }

    /// Diagnostics across all ticks.
    #[must_use]
    pub fn diagnostic_count(&self) -> usize {
        self.ticks.iter().map(|t| t.diagnostics.len()).sum()
    }
}

/// Why a hook tree stopped early.
enum Abort {
    /// The hook body failed; recoverable at the top level
    HookFailed(PhaseState),
    /// The tracker rejected a call; ends the replay
    Fatal(TrackerError),
}

impl From<TrackerError> for Abort {
    fn from(err: TrackerError) -> Self {
        Self::Fatal(err)
    }
}

/// Drives a tracker through a trace.
#[derive(Debug)]
pub struct Replayer<'a> {
    tracker: PhaseTracker,
    events: &'a EventEmitter,
}

impl<'a> Replayer<'a> {
    /// Creates a replayer whose world follows the trace's `world` section.
    #[must_use]
    pub fn new(trace: &HookTrace, config: TrackerConfig, events: &'a EventEmitter) -> Self {
        let world = ScriptedWorld::from(&trace.world);
        Self {
            tracker: PhaseTracker::with_world(config, world),
            events,
        }
    }

    /// The underlying tracker.
    #[must_use]
    pub const fn tracker(&self) -> &PhaseTracker {
        &self.tracker
    }

    /// Replays every tick of `trace`.
    ///
    /// # Errors
    ///
    /// Stops at the first protocol or integrity violation.
    pub fn run(&mut self, trace: &HookTrace) -> Result<ReplayReport, TrackerError> {
        info!(
            name = trace.name.as_deref().unwrap_or("<unnamed>"),
            ticks = trace.ticks.len(),
            "replay started"
        );
        let mut report = ReplayReport {
            name: trace.name.clone(),
            ticks: Vec::with_capacity(trace.ticks.len()),
        };
        for (index, tick) in (0_u64..).zip(&trace.ticks) {
            report.ticks.push(self.run_tick(index, &tick.hooks)?);
        }
        info!(
            notifications = report.notification_count(),
            diagnostics = report.diagnostic_count(),
            "replay finished"
        );
        Ok(report)
    }

    fn run_tick(&mut self, tick: u64, hooks: &[HookSpec]) -> Result<TickReport, TrackerError> {
        self.events.emit(Event::TickStarted {
            timestamp: Utc::now(),
            tick,
            hooks: hooks.len(),
        });

        let mut report = TickReport {
            tick,
            ..TickReport::default()
        };
        for hook in hooks {
            let mut notifications = Vec::new();
            let result = run_hook(
                &mut self.tracker,
                hook,
                &mut notifications,
                &mut report.max_depth,
            );
            match result {
                Ok(()) => {}
                Err(Abort::HookFailed(phase)) => {
                    warn!(tick, %phase, "hook failed; enclosing phases exited");
                    report.failed_hooks += 1;
                }
                Err(Abort::Fatal(err)) => {
                    self.flush_diagnostics(tick, &mut report);
                    return Err(err);
                }
            }
            notifications.extend(self.tracker.drain_notifications());
            for notification in notifications {
                self.events.emit(Event::NotificationEmitted {
                    timestamp: Utc::now(),
                    tick,
                    notification: notification.clone(),
                });
                report.notifications.push(notification);
            }
        }

        let end = self.tracker.end_tick();
        self.flush_diagnostics(tick, &mut report);
        end?;

        self.events.emit(Event::TickFinished {
            timestamp: Utc::now(),
            tick,
            summary: report.summary(),
        });
        Ok(report)
    }

    fn flush_diagnostics(&mut self, tick: u64, report: &mut TickReport) {
        for diagnostic in self.tracker.drain_diagnostics() {
            self.events.emit(Event::diagnostic(tick, &diagnostic));
            report.diagnostics.push(diagnostic);
        }
    }
}

fn run_hook(
    tracker: &mut PhaseTracker,
    hook: &HookSpec,
    out: &mut Vec<Notification>,
    max_depth: &mut usize,
) -> Result<(), Abort> {
    let Some(state) = hook.state() else {
        return Err(Abort::Fatal(TraceError::UnknownPhase(hook.phase.clone()).into()));
    };
    let builder = hook.apply(tracker.builder(state));
    let mut guard = tracker.scope(builder)?;
    *max_depth = (*max_depth).max(guard.depth());

    for capture in &hook.captures {
        let outcome = guard.capture(capture.clone());
        if !outcome.is_kept() {
            debug!(phase = %state, kind = %capture.kind(), ?outcome, "capture not kept");
        }
    }
    if hook.fail {
        return Err(Abort::HookFailed(state));
    }
    for child in &hook.children {
        run_hook(&mut guard, child, out, max_depth)?;
    }
    out.extend(guard.finish()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::replay::trace::parse_trace;
    use crate::tracker::DiagnosticKind;

    fn replay(raw: &str) -> Result<ReplayReport, TrackerError> {
        let trace = parse_trace(raw, Path::new("test.yaml")).unwrap();
        let events = EventEmitter::noop();
        Replayer::new(&trace, TrackerConfig::default(), &events).run(&trace)
    }

    #[test]
    fn test_command_with_nested_tick_aggregates() {
        let report = replay(
            r#"
ticks:
  - hooks:
      - phase: command
        command: "/give @p diamond"
        actor: Steve
        children:
          - phase: block_tick
            block: { pos: { x: 0, y: 64, z: 0 }, block_type: "minecraft:hopper" }
            captures:
              - kind: slot_transaction
                inventory: Steve
                slot: 0
                original: "minecraft:air"
                replacement: "minecraft:diamond"
"#,
        )
        .unwrap();
        let tick = &report.ticks[0];
        assert_eq!(tick.notifications.len(), 1);
        assert_eq!(tick.notifications[0].kind(), "command_transaction");
        assert_eq!(tick.max_depth, 2);
        assert!(tick.diagnostics.is_empty());
    }

    #[test]
    fn test_failing_hook_still_unwinds_every_frame() {
        let report = replay(
            r#"
ticks:
  - hooks:
      - phase: packet_processing
        player: Alex
        packet: use_item
        children:
          - phase: entity_tick
            entity: 4
            captures:
              - kind: entity_spawn
                entity: 40
                entity_type: "minecraft:arrow"
            fail: true
          - phase: entity_tick
            entity: 5
      - phase: command
        command: "/time set day"
        actor: Alex
"#,
        )
        .unwrap();
        let tick = &report.ticks[0];
        assert_eq!(tick.failed_hooks, 1);
        assert_eq!(tick.notifications.len(), 1);
        assert_eq!(tick.notifications[0].phase(), PhaseState::EntityTick);
        assert_eq!(tick.max_depth, 2);
    }

    #[test]
    fn test_despawned_entity_becomes_capture_failure() {
        let report = replay(
            r#"
world:
  despawned: [40]
ticks:
  - hooks:
      - phase: entity_tick
        entity: 4
        captures:
          - kind: entity_spawn
            entity: 40
            entity_type: "minecraft:arrow"
"#,
        )
        .unwrap();
        let tick = &report.ticks[0];
        assert!(tick.notifications.is_empty());
        assert_eq!(tick.diagnostics.len(), 1);
        assert_eq!(tick.diagnostics[0].kind, DiagnosticKind::CaptureFailure);
    }

    #[test]
    fn test_unloaded_chunk_drops_block_change() {
        let world = ScriptedWorld::from(&WorldSpec {
            despawned: Vec::new(),
            unloaded_chunks: vec![ChunkPos { x: 1, z: 0 }],
        });
        assert!(!world.is_block_loaded(BlockPos::new(16, 64, 0)));
        assert!(world.is_block_loaded(BlockPos::new(15, 64, 0)));
        assert!(world.entity_exists(EntityId(1)));
    }

    #[test]
    fn test_invalid_hook_is_fatal() {
        let err = replay("ticks:\n  - hooks:\n      - phase: command\n        command: /x\n")
            .unwrap_err();
        assert!(matches!(err, TrackerError::Protocol(_)));
    }

    #[test]
    fn test_unknown_phase_is_fatal() {
        let err = replay("ticks:\n  - hooks:\n      - phase: redstone\n").unwrap_err();
        assert!(matches!(err, TrackerError::Trace(TraceError::UnknownPhase(_))));
    }

    #[test]
    fn test_runaway_recursion_is_degraded() {
        let report = replay(
            r#"
ticks:
  - hooks:
      - phase: block_tick
        block: { pos: { x: 0, y: 0, z: 0 }, block_type: "minecraft:observer" }
        children:
          - phase: block_tick
            block: { pos: { x: 0, y: 0, z: 0 }, block_type: "minecraft:observer" }
            children:
              - phase: block_tick
                block: { pos: { x: 0, y: 0, z: 0 }, block_type: "minecraft:observer" }
                captures:
                  - kind: block_change
                    pos: { x: 0, y: 0, z: 0 }
                    original: "minecraft:observer"
                    replacement: "minecraft:air"
"#,
        )
        .unwrap();
        let tick = &report.ticks[0];
        assert_eq!(tick.diagnostics.len(), 1);
        assert_eq!(tick.diagnostics[0].kind, DiagnosticKind::Runaway);
        assert_eq!(tick.notifications.len(), 1);
        assert_eq!(tick.notifications[0].phase(), PhaseState::UnknownCause);
    }
}
