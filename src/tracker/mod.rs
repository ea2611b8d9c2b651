//! The phase tracker
//!
//! [`PhaseTracker`] is the single owner of the live [`PhaseStack`]. It is
//! held by the simulation driver and threaded through hook calls; there is
//! no global instance.
//!
//! Hooks bracket engine logic with [`enter`](PhaseTracker::enter) and
//! [`exit`](PhaseTracker::exit), or preferably with
//! [`scope`](PhaseTracker::scope), whose guard pops on drop so a frame is
//! never left behind when the body returns early or panics.
//!
//! Runaway re-entrance and depth overflow are not errors: the entry is
//! replaced by an [`PhaseState::UnknownCause`] frame, a diagnostic is
//! recorded, and the simulation carries on with degraded attribution.

pub mod diagnostics;

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, ThreadId};

use tracing::{debug, error, warn};

use crate::config::{EntityTrackerConfig, MAX_SANE_DEPTH, TrackerConfig};
use crate::error::{IntegrityViolation, ProtocolViolation, Result, TrackerError};
use crate::observability::metrics;
use crate::phase::{
    BlockChange, Capture, CauseChain, EntitySpawn, Notification, OpenWorld,
    PhaseContext, PhaseContextBuilder, PhaseStack, PhaseState, SlotTransaction, StackSnapshot,
    WorldView,
};

pub use diagnostics::{Diagnostic, DiagnosticKind, DiagnosticLog};

/// Reset contexts kept for reuse.
const MAX_POOLED_CONTEXTS: usize = 32;

/// What [`PhaseTracker::enter`] actually pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnterOutcome {
    /// The requested phase was pushed.
    Pushed {
        /// The pushed state
        state: PhaseState,
        /// Stack depth after the push
        depth: usize,
    },
    /// The entry was replaced by an unknown-cause frame.
    Degraded {
        /// The state that was requested
        origin: PhaseState,
        /// Why it was replaced
        reason: DiagnosticKind,
        /// Stack depth after the push
        depth: usize,
    },
}

impl EnterOutcome {
    /// State of the frame that is now on top.
    #[must_use]
    pub const fn state(&self) -> PhaseState {
        match self {
            Self::Pushed { state, .. } => *state,
            Self::Degraded { .. } => PhaseState::UnknownCause,
        }
    }

    /// Stack depth after the entry.
    #[must_use]
    pub const fn depth(&self) -> usize {
        match self {
            Self::Pushed { depth, .. } | Self::Degraded { depth, .. } => *depth,
        }
    }

    /// Returns `true` if the entry was degraded.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }
}

/// Where a capture ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Stored in the active frame
    Stored,
    /// Handed up to an enclosing frame
    Bubbled {
        /// State of the frame that took it
        into: PhaseState,
    },
    /// No frame on the stack takes this kind of capture here
    Rejected,
    /// The entity type is disabled in the entity tracker
    Filtered,
}

impl CaptureOutcome {
    /// Returns `true` if some frame now owns the capture.
    #[must_use]
    pub const fn is_kept(&self) -> bool {
        matches!(self, Self::Stored | Self::Bubbled { .. })
    }
}

/// Read side of the published stack snapshot.
///
/// Cloned handles share one slot. Readers get an immutable
/// `Arc<StackSnapshot>`; the lock is only held to swap or clone the pointer.
#[derive(Debug, Clone, Default)]
pub struct SnapshotHandle(Arc<Mutex<Arc<StackSnapshot>>>);

impl SnapshotHandle {
    /// The most recently published snapshot.
    #[must_use]
    pub fn load(&self) -> Arc<StackSnapshot> {
        Arc::clone(&self.0.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn store(&self, snapshot: StackSnapshot) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Arc::new(snapshot);
    }
}

/// Orchestrates the phase stack for one simulation driver.
pub struct PhaseTracker {
    stack: PhaseStack,
    config: TrackerConfig,
    entities: EntityTrackerConfig,
    world: Box<dyn WorldView>,
    diagnostics: DiagnosticLog,
    outbox: Vec<Notification>,
    pool: Vec<PhaseContext>,
    printed_runaways: usize,
    snapshots: SnapshotHandle,
    driver: ThreadId,
}

impl std::fmt::Debug for PhaseTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseTracker")
            .field("stack", &self.stack)
            .field("config", &self.config)
            .field("diagnostics", &self.diagnostics.len())
            .field("outbox", &self.outbox.len())
            .field("pooled", &self.pool.len())
            .finish_non_exhaustive()
    }
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl PhaseTracker {
    /// Creates a tracker in which every capture applies.
    #[must_use]
    pub fn new(config: TrackerConfig) -> Self {
        Self::with_world(config, OpenWorld)
    }

    /// Creates a tracker that validates captures against `world` on unwind.
    ///
    /// The calling thread becomes the driver thread.
    #[must_use]
    pub fn with_world(config: TrackerConfig, world: impl WorldView + 'static) -> Self {
        Self {
            stack: PhaseStack::with_capacity(
                config
                    .initial_stack_capacity
                    .min(config.max_depth)
                    .min(MAX_SANE_DEPTH),
            ),
            entities: config.entity_tracker.clone(),
            diagnostics: DiagnosticLog::new(config.max_retained_diagnostics),
            world: Box::new(world),
            outbox: Vec::new(),
            pool: Vec::new(),
            printed_runaways: 0,
            snapshots: SnapshotHandle::default(),
            driver: thread::current().id(),
            config,
        }
    }

    fn assert_driver(&self) {
        debug_assert_eq!(
            thread::current().id(),
            self.driver,
            "phase tracker mutated off the driver thread"
        );
    }

    // ---- inspection ----

    /// Active phase, or [`PhaseState::Idle`] when nothing is tracked.
    #[must_use]
    pub fn current_state(&self) -> PhaseState {
        self.stack.peek_state()
    }

    /// Active context, or the empty context.
    #[must_use]
    pub fn current_context(&self) -> &PhaseContext {
        self.stack.peek_context()
    }

    /// Number of frames on the stack.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// The live stack.
    #[must_use]
    pub const fn stack(&self) -> &PhaseStack {
        &self.stack
    }

    /// Configuration the tracker was built with.
    #[must_use]
    pub const fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Entity tracker state, including auto-populated types.
    #[must_use]
    pub const fn entity_tracker(&self) -> &EntityTrackerConfig {
        &self.entities
    }

    /// Retained diagnostics.
    #[must_use]
    pub const fn diagnostics(&self) -> &DiagnosticLog {
        &self.diagnostics
    }

    /// Number of reset contexts waiting for reuse.
    #[must_use]
    pub fn pooled(&self) -> usize {
        self.pool.len()
    }

    // ---- entry and exit ----

    /// Starts a context for `state`, reusing a pooled one when available.
    pub fn builder(&mut self, state: PhaseState) -> PhaseContextBuilder {
        match self.pool.iter().position(|ctx| ctx.state() == state) {
            Some(index) => self.pool.swap_remove(index).reopen(),
            None => PhaseContextBuilder::new(state),
        }
    }

    /// Seals `builder` and pushes it, or a neutral replacement.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Protocol`] if the builder is for the idle
    /// sentinel, was given a field its state does not have, or is missing a
    /// required field. The stack is unchanged in that case.
    pub fn enter(&mut self, builder: PhaseContextBuilder) -> Result<EnterOutcome> {
        self.assert_driver();
        let state = builder.state();
        if state.is_sentinel() {
            return Err(self.protocol_violation(ProtocolViolation::SentinelPush(state)));
        }
        let context = match builder.seal() {
            Ok(context) => context,
            Err(violation) => return Err(self.protocol_violation(violation)),
        };

        if self.stack.len() >= self.config.max_depth {
            return self.degrade(context, DiagnosticKind::DepthExceeded);
        }
        if self.stack.check_for_runaways(state, Some(&context)) {
            return self.degrade(context, DiagnosticKind::Runaway);
        }

        self.push(context)?;
        debug!(phase = %state, depth = self.stack.len(), "phase entered");
        Ok(EnterOutcome::Pushed {
            state,
            depth: self.stack.len(),
        })
    }

    /// Pops the active frame and unwinds it.
    ///
    /// Captures that no longer apply to the world are skipped and recorded
    /// as diagnostics; the remaining captures are still reported.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Protocol`] if the stack is empty.
    pub fn exit(&mut self) -> Result<Vec<Notification>> {
        self.assert_driver();
        let mut context = match self.stack.pop() {
            Ok(context) => context,
            Err(violation) => return Err(self.protocol_violation(violation)),
        };
        let state = context.state();
        metrics::record_frame_popped(state);
        metrics::set_stack_depth(self.stack.len());

        let cause = CauseChain::from_frames(&context, self.stack.iter());
        let outcome = state.unwind(&mut context, cause, self.world.as_ref());

        for failure in outcome.failures {
            metrics::record_capture_failure(failure.capture_kind());
            let frames = self.stack.snapshot();
            self.report(Diagnostic::new(
                DiagnosticKind::CaptureFailure,
                state,
                format!("skipped {}: {failure}", failure.capture_kind()),
                frames,
            ));
        }
        for notification in &outcome.notifications {
            metrics::record_notification(notification.kind());
        }
        debug!(
            phase = %state,
            depth = self.stack.len(),
            notifications = outcome.notifications.len(),
            "phase exited"
        );

        self.recycle(context);
        Ok(outcome.notifications)
    }

    /// Enters a phase and returns a guard that exits it when dropped.
    ///
    /// Notifications produced by a drop-time exit are queued and can be
    /// collected with [`drain_notifications`](Self::drain_notifications).
    /// Call [`PhaseGuard::finish`] to receive them directly instead.
    ///
    /// # Errors
    ///
    /// Same as [`enter`](Self::enter); no guard is created on error.
    pub fn scope(&mut self, builder: PhaseContextBuilder) -> Result<PhaseGuard<'_>> {
        let entered = self.enter(builder)?;
        Ok(PhaseGuard {
            depth: entered.depth(),
            entered,
            tracker: self,
            finished: false,
        })
    }

    /// Runs `body` inside a phase scope.
    ///
    /// Returns the body's value and the notifications produced when the
    /// phase unwound.
    ///
    /// # Errors
    ///
    /// Returns an error if entering fails, or if `body` left the stack
    /// unbalanced.
    pub fn run<T>(
        &mut self,
        builder: PhaseContextBuilder,
        body: impl FnOnce(&mut Self) -> T,
    ) -> Result<(T, Vec<Notification>)> {
        let mut guard = self.scope(builder)?;
        let value = body(&mut *guard);
        let notifications = guard.finish()?;
        Ok((value, notifications))
    }

    // ---- captures ----

    /// Routes a capture to the frame that should own it.
    ///
    /// The active frame stores it if its state accepts the kind. Slot
    /// transactions raised inside ticks are handed to the nearest enclosing
    /// frame that accepts them. Spawns of entity types disabled in the
    /// entity tracker are dropped.
    pub fn capture(&mut self, capture: Capture) -> CaptureOutcome {
        self.assert_driver();
        let kind = capture.kind();
        if let Capture::EntitySpawn(spawn) = &capture {
            if !self.entities.is_tracked(&spawn.entity_type) {
                debug!(entity_type = %spawn.entity_type, "spawn of untracked entity type ignored");
                return CaptureOutcome::Filtered;
            }
        }

        let top = self.stack.peek_state();
        let Some(frame) = self.stack.find_accepting_mut(kind) else {
            metrics::record_capture_rejected(kind);
            debug!(phase = %top, kind = %kind, "capture rejected");
            return CaptureOutcome::Rejected;
        };
        let into = frame.state();
        frame.capture(capture);

        if top.accepts(kind) {
            CaptureOutcome::Stored
        } else {
            debug!(phase = %top, into = %into, kind = %kind, "capture bubbled");
            CaptureOutcome::Bubbled { into }
        }
    }

    /// Captures a block mutation.
    pub fn capture_block_change(&mut self, change: BlockChange) -> CaptureOutcome {
        self.capture(Capture::BlockChange(change))
    }

    /// Captures an entity spawn.
    pub fn capture_entity_spawn(&mut self, spawn: EntitySpawn) -> CaptureOutcome {
        self.capture(Capture::EntitySpawn(spawn))
    }

    /// Captures an inventory slot change.
    pub fn capture_slot_transaction(&mut self, transaction: SlotTransaction) -> CaptureOutcome {
        self.capture(Capture::SlotTransaction(transaction))
    }

    // ---- tick boundary ----

    /// Checks that every phase entered during the tick was exited, and
    /// publishes the (empty) stack.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Integrity`] naming the stuck frames. The
    /// frames are left in place for inspection.
    pub fn end_tick(&mut self) -> Result<()> {
        self.assert_driver();
        self.publish_snapshot();
        if self.stack.is_empty() {
            return Ok(());
        }
        let frames = self.stack.snapshot();
        let violation = IntegrityViolation {
            stuck: frames.phase_names(),
        };
        self.report(Diagnostic::new(
            DiagnosticKind::IntegrityViolation,
            self.stack.peek_state(),
            violation.to_string(),
            frames,
        ));
        Err(violation.into())
    }

    /// Takes the notifications queued by guards dropped without `finish`.
    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.outbox)
    }

    /// Takes every retained diagnostic.
    pub fn drain_diagnostics(&mut self) -> Vec<Diagnostic> {
        self.diagnostics.drain()
    }

    /// Handle other threads can use to read published snapshots.
    #[must_use]
    pub fn snapshot_handle(&self) -> SnapshotHandle {
        self.snapshots.clone()
    }

    /// Publishes the current stack to every [`SnapshotHandle`].
    pub fn publish_snapshot(&self) {
        self.snapshots.store(self.stack.snapshot());
    }

    // ---- internals ----

    fn push(&mut self, context: PhaseContext) -> Result<()> {
        let state = context.state();
        if let Err(violation) = self.stack.push(state, context) {
            return Err(self.protocol_violation(violation));
        }
        metrics::record_frame_pushed(state);
        metrics::set_stack_depth(self.stack.len());
        Ok(())
    }

    fn degrade(&mut self, rejected: PhaseContext, reason: DiagnosticKind) -> Result<EnterOutcome> {
        let origin = rejected.state();
        let message = match reason {
            DiagnosticKind::DepthExceeded => format!(
                "stack depth reached max_depth {}; {} entered as {}",
                self.config.max_depth,
                rejected.summary(),
                PhaseState::UnknownCause
            ),
            _ => format!(
                "{} re-entered itself without progress; entered as {}",
                rejected.summary(),
                PhaseState::UnknownCause
            ),
        };
        let frames = self.stack.snapshot();
        self.report(Diagnostic::new(reason, origin, message, frames));
        metrics::record_degraded(
            origin,
            if reason == DiagnosticKind::DepthExceeded {
                "depth"
            } else {
                "runaway"
            },
        );
        self.recycle(rejected);

        let neutral = self.builder(PhaseState::UnknownCause).origin(origin).seal()?;
        self.push(neutral)?;
        Ok(EnterOutcome::Degraded {
            origin,
            reason,
            depth: self.stack.len(),
        })
    }

    fn protocol_violation(&mut self, violation: ProtocolViolation) -> TrackerError {
        metrics::record_protocol_violation();
        let phase = match &violation {
            ProtocolViolation::StateMismatch { requested, .. } => *requested,
            ProtocolViolation::IncompleteContext { state, .. }
            | ProtocolViolation::FieldNotApplicable { state, .. }
            | ProtocolViolation::SentinelPush(state) => *state,
            ProtocolViolation::PopOnEmpty => PhaseState::Idle,
        };
        let frames = self.stack.snapshot();
        self.report(Diagnostic::new(
            DiagnosticKind::ProtocolViolation,
            phase,
            violation.to_string(),
            frames,
        ));
        violation.into()
    }

    /// Logs a diagnostic and retains it.
    fn report(&mut self, diagnostic: Diagnostic) {
        let dump = match diagnostic.kind {
            DiagnosticKind::Runaway => {
                self.printed_runaways += 1;
                self.config.verbose || self.printed_runaways <= self.config.max_printed_runaways
            }
            DiagnosticKind::ProtocolViolation | DiagnosticKind::IntegrityViolation => true,
            DiagnosticKind::DepthExceeded | DiagnosticKind::CaptureFailure => self.config.verbose,
        };

        let phase = diagnostic.phase;
        let kind = diagnostic.kind;
        match (kind.is_fatal(), dump) {
            (true, _) => error!(
                %phase, %kind, "{}\nphase stack:{}", diagnostic.message, diagnostic.frames
            ),
            (false, true) => warn!(
                %phase, %kind, "{}\nphase stack:{}", diagnostic.message, diagnostic.frames
            ),
            (false, false) => warn!(%phase, %kind, "{}", diagnostic.message),
        }
        self.diagnostics.record(diagnostic);
    }

    fn recycle(&mut self, mut context: PhaseContext) {
        context.reset();
        if self.pool.len() < MAX_POOLED_CONTEXTS {
            self.pool.push(context);
        }
    }

    /// Exits the frame a guard entered, if it is still the active one.
    fn close_scope(&mut self, depth: usize) -> Result<Vec<Notification>> {
        if self.stack.len() != depth {
            let frames = self.stack.snapshot();
            let stuck = if self.stack.len() > depth {
                frames.phase_names()[..self.stack.len() - depth].to_vec()
            } else {
                Vec::new()
            };
            let violation = IntegrityViolation { stuck };
            self.report(Diagnostic::new(
                DiagnosticKind::IntegrityViolation,
                self.stack.peek_state(),
                format!(
                    "guard for depth {depth} closed at depth {}: {violation}",
                    self.stack.len()
                ),
                frames,
            ));
            return Err(violation.into());
        }
        self.exit()
    }
}

/// Scope guard returned by [`PhaseTracker::scope`].
///
/// Dereferences to the tracker so the body can capture and open nested
/// scopes through it. Dropping the guard exits the phase exactly once,
/// including while unwinding from a panic.
#[must_use = "dropping the guard immediately exits the phase"]
pub struct PhaseGuard<'a> {
    tracker: &'a mut PhaseTracker,
    entered: EnterOutcome,
    depth: usize,
    finished: bool,
}

impl PhaseGuard<'_> {
    /// What was pushed when the scope opened.
    #[must_use]
    pub const fn entered(&self) -> EnterOutcome {
        self.entered
    }

    /// Exits the phase and returns its notifications.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Integrity`] if the body left nested frames on
    /// the stack or popped this scope's frame itself. Nothing is popped in
    /// that case.
    pub fn finish(mut self) -> Result<Vec<Notification>> {
        self.finished = true;
        self.tracker.close_scope(self.depth)
    }
}

impl Deref for PhaseGuard<'_> {
    type Target = PhaseTracker;

    fn deref(&self) -> &PhaseTracker {
        &*self.tracker
    }
}

impl DerefMut for PhaseGuard<'_> {
    fn deref_mut(&mut self) -> &mut PhaseTracker {
        &mut *self.tracker
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if thread::panicking() {
            debug!(phase = %self.entered.state(), "exiting phase during panic");
        }
        match self.tracker.close_scope(self.depth) {
            Ok(notifications) => self.tracker.outbox.extend(notifications),
            Err(e) => error!(error = %e, "phase scope closed with an unbalanced stack"),
        }
    }
}
