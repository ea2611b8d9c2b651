//! The phase stack and its runaway detector.
//!
//! A strictly LIFO sequence of sealed [`PhaseContext`]s. The top frame is the
//! active phase. Empty-stack reads never return an absence: they report the
//! idle sentinel and the shared empty context instead.

use indexmap::IndexMap;
use serde::Serialize;
use tracing::trace;

use crate::error::ProtocolViolation;

use super::capture::{CaptureCounts, CaptureKind};
use super::context::PhaseContext;
use super::state::PhaseState;

/// Initial frame capacity of a new stack.
pub const DEFAULT_STACK_CAPACITY: usize = 16;

/// LIFO stack of phase frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseStack {
    /// Bottom at index 0, top at the end.
    frames: Vec<PhaseContext>,
}

impl Default for PhaseStack {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseStack {
    /// Creates an empty stack with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_STACK_CAPACITY)
    }

    /// Creates an empty stack with room for `capacity` frames.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            frames: Vec::with_capacity(capacity),
        }
    }

    /// Number of frames on the stack.
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Returns `true` if no phase is active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// The top frame, or the empty context.
    #[must_use]
    pub fn peek(&self) -> &PhaseContext {
        self.peek_context()
    }

    /// The top frame's state, or [`PhaseState::Idle`].
    #[must_use]
    pub fn peek_state(&self) -> PhaseState {
        self.frames
            .last()
            .map_or(PhaseState::Idle, PhaseContext::state)
    }

    /// The top frame, or the empty context.
    #[must_use]
    pub fn peek_context(&self) -> &PhaseContext {
        match self.frames.last() {
            Some(context) => context,
            None => PhaseContext::empty(),
        }
    }

    /// Frames from top to bottom.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &PhaseContext> + ExactSizeIterator {
        self.frames.iter().rev()
    }

    /// Pushes a sealed context for `state`.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolViolation`] and leaves the stack untouched if
    /// `state` is the idle sentinel, the context is bound to a different
    /// state, or the context is not complete.
    pub fn push(&mut self, state: PhaseState, context: PhaseContext) -> Result<(), ProtocolViolation> {
        if state.is_sentinel() {
            return Err(ProtocolViolation::SentinelPush(state));
        }
        if context.state() != state {
            return Err(ProtocolViolation::StateMismatch {
                requested: state,
                bound: context.state(),
            });
        }
        if !context.is_complete() {
            return Err(ProtocolViolation::IncompleteContext {
                state,
                missing: context.data().missing_fields().join(", "),
            });
        }
        self.frames.push(context);
        trace!(phase = %state, depth = self.frames.len(), "frame pushed");
        Ok(())
    }

    /// Removes and returns the top frame.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolViolation::PopOnEmpty`] if the stack is empty.
    pub fn pop(&mut self) -> Result<PhaseContext, ProtocolViolation> {
        let context = self.frames.pop().ok_or(ProtocolViolation::PopOnEmpty)?;
        trace!(phase = %context.state(), depth = self.frames.len(), "frame popped");
        Ok(context)
    }

    /// Returns `true` if entering `state` would extend a runaway.
    ///
    /// Always `false` for reentrant states. Otherwise the stack is scanned
    /// from the top for the first pair of adjacent frames that are both
    /// `state` and, when a candidate is given, whose upper frame reports the
    /// candidate as a non-progressing repeat. Frames of the same state that
    /// are separated by another phase are legitimate nesting.
    #[must_use]
    pub fn check_for_runaways(&self, state: PhaseState, candidate: Option<&PhaseContext>) -> bool {
        if !state.is_not_re_entrant() {
            return false;
        }
        self.frames.windows(2).rev().any(|pair| {
            let (lower, upper) = (&pair[0], &pair[1]);
            upper.state() == state
                && lower.state() == state
                && candidate.is_none_or(|c| upper.is_runaway(c))
        })
    }

    /// The topmost frame that can take a capture of `kind`.
    ///
    /// The active frame takes it if its state accepts the kind. Otherwise
    /// the capture moves down only while each frame passed over forwards
    /// that kind.
    pub(crate) fn find_accepting_mut(&mut self, kind: CaptureKind) -> Option<&mut PhaseContext> {
        let mut target = None;
        for (index, frame) in self.frames.iter().enumerate().rev() {
            if frame.state().accepts(kind) {
                target = Some(index);
                break;
            }
            if !frame.state().forwards(kind) {
                break;
            }
        }
        target.map(|index| &mut self.frames[index])
    }

    /// Owned top-to-bottom dump of the current frames.
    #[must_use]
    pub fn snapshot(&self) -> StackSnapshot {
        let depth = self.frames.len();
        StackSnapshot {
            frames: self
                .iter()
                .enumerate()
                .map(|(i, frame)| FrameDump {
                    depth: depth - i,
                    phase: frame.state(),
                    fields: frame
                        .data()
                        .fields()
                        .into_iter()
                        .map(|(k, v)| (k.to_string(), v))
                        .collect(),
                    captures: frame.capture_counts(),
                })
                .collect(),
        }
    }
}

/// Immutable copy of a stack, safe to hand to other threads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StackSnapshot {
    /// Frames from top to bottom
    pub frames: Vec<FrameDump>,
}

impl StackSnapshot {
    /// Phase names from top to bottom.
    #[must_use]
    pub fn phase_names(&self) -> Vec<String> {
        self.frames.iter().map(|f| f.phase.to_string()).collect()
    }
}

impl std::fmt::Display for StackSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.frames.is_empty() {
            return write!(f, "<empty phase stack>");
        }
        for frame in &self.frames {
            write!(f, "\n  #{} {}", frame.depth, frame.phase)?;
            for (key, value) in &frame.fields {
                write!(f, " {key}={value}")?;
            }
            write!(
                f,
                " (blocks={}, spawns={}, slots={})",
                frame.captures.block_changes,
                frame.captures.entity_spawns,
                frame.captures.slot_transactions
            )?;
        }
        Ok(())
    }
}

/// One frame's distinguishing fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameDump {
    /// 1-based depth; the bottom frame is 1
    pub depth: usize,
    /// Frame state
    pub phase: PhaseState,
    /// Phase-specific fields
    pub fields: IndexMap<String, String>,
    /// Pending captures
    pub captures: CaptureCounts,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::capture::{BlockPos, BlockSnapshot, EntityId};
    use crate::phase::context::PhaseContextBuilder;

    fn command(text: &str) -> PhaseContext {
        PhaseContextBuilder::new(PhaseState::Command)
            .command(text)
            .actor("Steve")
            .seal()
            .unwrap()
    }

    fn block_tick(x: i32) -> PhaseContext {
        PhaseContextBuilder::new(PhaseState::BlockTick)
            .block(BlockSnapshot {
                pos: BlockPos::new(x, 64, 0),
                block_type: "minecraft:redstone_wire".to_string(),
            })
            .seal()
            .unwrap()
    }

    fn entity_tick(id: u64) -> PhaseContext {
        PhaseContextBuilder::new(PhaseState::EntityTick)
            .entity(EntityId(id))
            .seal()
            .unwrap()
    }

    fn packet() -> PhaseContext {
        PhaseContextBuilder::new(PhaseState::PacketProcessing)
            .player("Steve")
            .packet("use_item")
            .seal()
            .unwrap()
    }

    fn push(stack: &mut PhaseStack, ctx: PhaseContext) {
        stack.push(ctx.state(), ctx).unwrap();
    }

    #[test]
    fn test_empty_stack_reports_idle() {
        let stack = PhaseStack::new();
        assert!(stack.is_empty());
        assert_eq!(stack.peek_state(), PhaseState::Idle);
        assert_eq!(stack.peek_context().state(), PhaseState::Idle);
        assert_eq!(stack.peek().state(), PhaseState::Idle);
    }

    #[test]
    fn test_push_pop_is_lifo() {
        let mut stack = PhaseStack::new();
        push(&mut stack, command("/a"));
        push(&mut stack, block_tick(0));
        assert_eq!(stack.peek_state(), PhaseState::BlockTick);
        assert_eq!(stack.pop().unwrap().state(), PhaseState::BlockTick);
        assert_eq!(stack.peek_state(), PhaseState::Command);
        assert_eq!(stack.pop().unwrap().state(), PhaseState::Command);
        assert_eq!(stack.peek_state(), PhaseState::Idle);
    }

    #[test]
    fn test_push_mismatched_state_leaves_stack() {
        let mut stack = PhaseStack::new();
        push(&mut stack, command("/a"));
        let err = stack.push(PhaseState::EntityTick, block_tick(0)).unwrap_err();
        assert_eq!(
            err,
            ProtocolViolation::StateMismatch {
                requested: PhaseState::EntityTick,
                bound: PhaseState::BlockTick,
            }
        );
        assert_eq!(stack.len(), 1);
        assert_eq!(stack.peek_state(), PhaseState::Command);
    }

    #[test]
    fn test_push_incomplete_leaves_stack() {
        let mut stack = PhaseStack::new();
        let mut ctx = block_tick(0);
        ctx.reset();
        let err = stack.push(PhaseState::BlockTick, ctx).unwrap_err();
        assert!(matches!(err, ProtocolViolation::IncompleteContext { .. }));
        assert!(stack.is_empty());
    }

    #[test]
    fn test_push_sentinel_rejected() {
        let mut stack = PhaseStack::new();
        let err = stack
            .push(PhaseState::Idle, PhaseContext::empty().clone())
            .unwrap_err();
        assert_eq!(err, ProtocolViolation::SentinelPush(PhaseState::Idle));
        assert!(stack.is_empty());
    }

    #[test]
    fn test_pop_empty_is_violation() {
        let mut stack = PhaseStack::new();
        assert_eq!(stack.pop().unwrap_err(), ProtocolViolation::PopOnEmpty);
    }

    #[test]
    fn test_runaway_ignores_reentrant_states() {
        let mut stack = PhaseStack::new();
        push(&mut stack, packet());
        push(&mut stack, packet());
        push(&mut stack, packet());
        assert!(!stack.check_for_runaways(PhaseState::PacketProcessing, None));
        assert!(!stack.check_for_runaways(PhaseState::PacketProcessing, Some(&packet())));
    }

    #[test]
    fn test_runaway_adjacent_pair_at_top() {
        // top -> bottom: [S(a), S(b), T(c)]
        let mut stack = PhaseStack::new();
        push(&mut stack, command("/c"));
        push(&mut stack, block_tick(0));
        push(&mut stack, block_tick(0));
        assert!(stack.check_for_runaways(PhaseState::BlockTick, Some(&block_tick(0))));
    }

    #[test]
    fn test_runaway_not_adjacent() {
        // top -> bottom: [S(a), T(c), S(b)]
        let mut stack = PhaseStack::new();
        push(&mut stack, block_tick(0));
        push(&mut stack, command("/c"));
        push(&mut stack, block_tick(0));
        assert!(!stack.check_for_runaways(PhaseState::BlockTick, Some(&block_tick(0))));
        assert!(!stack.check_for_runaways(PhaseState::BlockTick, None));
    }

    #[test]
    fn test_runaway_found_below_top() {
        let mut stack = PhaseStack::new();
        push(&mut stack, entity_tick(5));
        push(&mut stack, entity_tick(5));
        push(&mut stack, command("/c"));
        assert!(stack.check_for_runaways(PhaseState::EntityTick, Some(&entity_tick(5))));
    }

    #[test]
    fn test_runaway_requires_candidate_match() {
        let mut stack = PhaseStack::new();
        push(&mut stack, block_tick(0));
        push(&mut stack, block_tick(0));
        assert!(!stack.check_for_runaways(PhaseState::BlockTick, Some(&block_tick(7))));
        assert!(stack.check_for_runaways(PhaseState::BlockTick, None));
    }

    #[test]
    fn test_runaway_requires_both_frames_of_state() {
        let mut stack = PhaseStack::new();
        push(&mut stack, entity_tick(1));
        push(&mut stack, entity_tick(1));
        assert!(!stack.check_for_runaways(PhaseState::BlockTick, None));
    }

    #[test]
    fn test_single_frame_is_not_runaway() {
        let mut stack = PhaseStack::new();
        push(&mut stack, command("/loop"));
        assert!(!stack.check_for_runaways(PhaseState::Command, Some(&command("/loop"))));
    }

    #[test]
    fn test_find_accepting_bubbles_slots_through_ticks() {
        let mut stack = PhaseStack::new();
        push(&mut stack, command("/give"));
        push(&mut stack, block_tick(0));
        push(&mut stack, entity_tick(2));
        let target = stack.find_accepting_mut(CaptureKind::SlotTransaction).unwrap();
        assert_eq!(target.state(), PhaseState::Command);
    }

    #[test]
    fn test_find_accepting_stops_at_non_forwarding_frame() {
        let mut stack = PhaseStack::new();
        push(&mut stack, command("/give"));
        push(
            &mut stack,
            PhaseContextBuilder::new(PhaseState::WorldGenInit)
                .world("overworld")
                .seal()
                .unwrap(),
        );
        assert!(stack.find_accepting_mut(CaptureKind::SlotTransaction).is_none());
        assert!(stack.find_accepting_mut(CaptureKind::BlockChange).is_none());
        assert_eq!(
            stack
                .find_accepting_mut(CaptureKind::EntitySpawn)
                .map(|f| f.state()),
            Some(PhaseState::WorldGenInit)
        );
    }

    #[test]
    fn test_snapshot_top_to_bottom() {
        let mut stack = PhaseStack::new();
        push(&mut stack, command("/give"));
        push(&mut stack, block_tick(3));
        let snapshot = stack.snapshot();
        assert_eq!(snapshot.phase_names(), vec!["BlockTick", "Command"]);
        assert_eq!(snapshot.frames[0].depth, 2);
        assert_eq!(snapshot.frames[1].fields["command"], "/give");
        assert!(snapshot.to_string().contains("#2 BlockTick"));
    }

    #[test]
    fn test_empty_snapshot_display() {
        assert_eq!(
            PhaseStack::new().snapshot().to_string(),
            "<empty phase stack>"
        );
    }
}
