//! `phasetrack` - Phase tracking engine
//!
//! Attributes side effects in a tick-driven simulation to the operation
//! that caused them. Instrumented hooks enter and exit phases on a
//! [`PhaseTracker`](tracker::PhaseTracker); side effects captured while a
//! phase is active are held in its frame and turned into cause-annotated
//! notifications when the phase unwinds.

pub mod cli;
pub mod config;
pub mod error;
pub mod observability;
pub mod phase;
pub mod replay;
pub mod tracker;
