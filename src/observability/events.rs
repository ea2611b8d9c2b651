//! Structured event stream.
//!
//! Typed events emitted while a trace is replayed. Events are serialized as
//! newline-delimited JSON (JSONL) with a monotonically increasing sequence
//! number.

use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::phase::{Notification, PhaseState};
use crate::tracker::{Diagnostic, DiagnosticKind};

// ---------------------------------------------------------------------------
// Event variants
// ---------------------------------------------------------------------------

/// A discrete event emitted during tracking.
///
/// Tagged with `"type"` when serialized so consumers can dispatch on the
/// event kind.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum Event {
    /// A tick started.
    TickStarted {
        /// When the tick started.
        timestamp: DateTime<Utc>,
        /// Zero-based tick index.
        tick: u64,
        /// Number of top-level hooks scheduled for the tick.
        hooks: usize,
    },

    /// A phase unwound and produced a notification.
    NotificationEmitted {
        /// When the notification was drained.
        timestamp: DateTime<Utc>,
        /// Tick the notification belongs to.
        tick: u64,
        /// The notification itself.
        notification: Notification,
    },

    /// The tracker raised a diagnostic.
    DiagnosticRaised {
        /// When the diagnostic was raised.
        timestamp: DateTime<Utc>,
        /// Tick the diagnostic belongs to.
        tick: u64,
        /// Diagnostic category.
        kind: DiagnosticKind,
        /// Phase involved.
        phase: PhaseState,
        /// Human-readable message.
        message: String,
    },

    /// A tick finished.
    TickFinished {
        /// When the tick finished.
        timestamp: DateTime<Utc>,
        /// Zero-based tick index.
        tick: u64,
        /// Per-tick totals.
        summary: TickSummary,
    },
}

impl Event {
    /// Builds a `DiagnosticRaised` event from a retained diagnostic.
    #[must_use]
    pub fn diagnostic(tick: u64, diagnostic: &Diagnostic) -> Self {
        Self::DiagnosticRaised {
            timestamp: diagnostic.timestamp,
            tick,
            kind: diagnostic.kind,
            phase: diagnostic.phase,
            message: diagnostic.message.clone(),
        }
    }
}

/// Totals reported when a tick finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickSummary {
    /// Notifications emitted
    pub notifications: usize,
    /// Diagnostics raised
    pub diagnostics: usize,
    /// Deepest stack observed
    pub max_depth: usize,
}

// ---------------------------------------------------------------------------
// Envelope (adds sequence number via serde flatten)
// ---------------------------------------------------------------------------

/// Wraps an [`Event`] with a monotonically increasing sequence number.
#[derive(Debug, Serialize)]
struct EventEnvelope {
    sequence: u64,
    #[serde(flatten)]
    event: Event,
}

// ---------------------------------------------------------------------------
// Emitter
// ---------------------------------------------------------------------------

/// Thread-safe, buffered JSONL event writer.
///
/// Serialization or I/O failures are dropped: the event stream must never
/// abort a replay.
pub struct EventEmitter {
    writer: Mutex<BufWriter<Box<dyn Write + Send>>>,
    sequence: AtomicU64,
}

// Box<dyn Write> is not Debug.
impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("sequence", &self.sequence.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl EventEmitter {
    /// Creates an emitter that writes to the given writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(BufWriter::new(writer)),
            sequence: AtomicU64::new(0),
        }
    }

    /// Creates an emitter that writes to stdout.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    /// Creates an emitter that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self::new(Box::new(std::io::stderr()))
    }

    /// Creates an emitter that discards all events.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(Box::new(std::io::sink()))
    }

    /// Creates an emitter that writes to a file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be created.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self::new(Box::new(file)))
    }

    /// Emits an event as a single JSONL line.
    pub fn emit(&self, event: Event) {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let envelope = EventEnvelope {
            sequence: seq,
            event,
        };

        if let Ok(mut w) = self.writer.lock() {
            if let Ok(line) = serde_json::to_string(&envelope) {
                let _ = writeln!(w, "{line}");
                let _ = w.flush();
            }
        }
    }

    /// Returns the number of events emitted so far.
    #[must_use]
    pub fn event_count(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }
}
