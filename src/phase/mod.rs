//! Phase tracking core
//!
//! A push-down automaton of phase frames. Each frame pairs a
//! [`PhaseState`] with a [`PhaseContext`] that buffers the side effects
//! captured while the phase is active.
//!
//! # Architecture
//!
//! - [`PhaseState`]: Fixed descriptor per phase kind (reentrancy, accepted captures)
//! - [`PhaseContext`]: Sealed per-entry capture buffer, built via [`PhaseContextBuilder`]
//! - [`PhaseStack`]: LIFO frame stack with the runaway detector
//! - [`unwind`]: Per-state conversion of captures into [`Notification`]s

pub mod capture;
pub mod context;
pub mod stack;
pub mod state;
pub mod unwind;

pub use capture::{
    BlockChange, BlockPos, BlockSnapshot, Capture, CaptureCounts, CaptureKind, Captures,
    ChunkPos, EntityId, EntitySpawn, SlotTransaction,
};
pub use context::{PhaseContext, PhaseContextBuilder, PhaseData};
pub use stack::{DEFAULT_STACK_CAPACITY, FrameDump, PhaseStack, StackSnapshot};
pub use state::PhaseState;
pub use unwind::{
    Cause, CauseChain, CaptureFailure, Notification, OpenWorld, UnwindOutcome, WorldView,
};
