//! Tracker diagnostics.
//!
//! Non-fatal conditions (runaways, depth overflow, skipped captures) and
//! fatal ones alike are recorded here with the stack as it was when they
//! were raised. The log is a bounded ring: once full, the oldest entry is
//! dropped.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::phase::{PhaseState, StackSnapshot};

/// Diagnostic category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// A non-reentrant phase re-entered itself without progress
    Runaway,
    /// An entry would have exceeded the configured depth
    DepthExceeded,
    /// A hook broke the enter/exit protocol
    ProtocolViolation,
    /// A capture was skipped during unwind
    CaptureFailure,
    /// Frames were left on the stack
    IntegrityViolation,
}

impl DiagnosticKind {
    /// Returns `true` for kinds that abort the operation that raised them.
    #[must_use]
    pub const fn is_fatal(self) -> bool {
        matches!(self, Self::ProtocolViolation | Self::IntegrityViolation)
    }
}

impl std::fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Runaway => "runaway",
            Self::DepthExceeded => "depth exceeded",
            Self::ProtocolViolation => "protocol violation",
            Self::CaptureFailure => "capture failure",
            Self::IntegrityViolation => "integrity violation",
        };
        f.write_str(name)
    }
}

/// One recorded diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Category
    pub kind: DiagnosticKind,
    /// Phase the diagnostic is about
    pub phase: PhaseState,
    /// Human-readable message
    pub message: String,
    /// Stack at the time, top to bottom
    pub frames: StackSnapshot,
    /// When it was raised
    pub timestamp: DateTime<Utc>,
}

impl Diagnostic {
    /// Creates a diagnostic stamped with the current time.
    #[must_use]
    pub fn new(
        kind: DiagnosticKind,
        phase: PhaseState,
        message: impl Into<String>,
        frames: StackSnapshot,
    ) -> Self {
        Self {
            kind,
            phase,
            message: message.into(),
            frames,
            timestamp: Utc::now(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} in {}: {}", self.kind, self.phase, self.message)
    }
}

/// Bounded in-memory diagnostic log.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticLog {
    entries: VecDeque<Diagnostic>,
    capacity: usize,
    raised: u64,
    dropped: u64,
}

impl DiagnosticLog {
    /// Creates a log retaining at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            raised: 0,
            dropped: 0,
        }
    }

    /// Records a diagnostic, evicting the oldest if full.
    pub fn record(&mut self, diagnostic: Diagnostic) {
        self.raised += 1;
        if self.capacity == 0 {
            self.dropped += 1;
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
            self.dropped += 1;
        }
        self.entries.push_back(diagnostic);
    }

    /// Retained diagnostics, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    /// Number of retained diagnostics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total diagnostics ever recorded, retained or not.
    #[must_use]
    pub const fn raised(&self) -> u64 {
        self.raised
    }

    /// Diagnostics evicted or never retained.
    #[must_use]
    pub const fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Removes and returns every retained diagnostic.
    pub fn drain(&mut self) -> Vec<Diagnostic> {
        self.entries.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diag(message: &str) -> Diagnostic {
        Diagnostic::new(
            DiagnosticKind::Runaway,
            PhaseState::BlockTick,
            message,
            StackSnapshot::default(),
        )
    }

    #[test]
    fn test_ring_evicts_oldest() {
        let mut log = DiagnosticLog::new(2);
        log.record(diag("a"));
        log.record(diag("b"));
        log.record(diag("c"));
        let messages: Vec<_> = log.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(messages, ["b", "c"]);
        assert_eq!(log.raised(), 3);
        assert_eq!(log.dropped(), 1);
    }

    #[test]
    fn test_zero_capacity_retains_nothing() {
        let mut log = DiagnosticLog::new(0);
        log.record(diag("a"));
        assert!(log.is_empty());
        assert_eq!(log.raised(), 1);
        assert_eq!(log.dropped(), 1);
    }

    #[test]
    fn test_drain_empties_log() {
        let mut log = DiagnosticLog::new(4);
        log.record(diag("a"));
        assert_eq!(log.drain().len(), 1);
        assert!(log.is_empty());
        assert_eq!(log.raised(), 1);
    }

    #[test]
    fn test_display() {
        assert_eq!(diag("oops").to_string(), "runaway in BlockTick: oops");
        assert!(DiagnosticKind::ProtocolViolation.is_fatal());
        assert!(!DiagnosticKind::Runaway.is_fatal());
    }
}
