//! Hook trace replay
//!
//! Drives a [`PhaseTracker`](crate::tracker::PhaseTracker) through a scripted
//! sequence of hook calls loaded from YAML, so tracking behavior can be
//! exercised and inspected without a running engine.

pub mod driver;
pub mod trace;

pub use driver::{ReplayReport, Replayer, ScriptedWorld, TickReport};
pub use trace::{
    HookSpec, HookTrace, LoadedTrace, TickSpec, WorldSpec, load_trace, parse_trace,
    suggest_phase, validate_trace,
};
