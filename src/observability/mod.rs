//! Observability
//!
//! Logging, metrics, and the structured event stream emitted while
//! phases are tracked.

pub mod events;
pub mod logging;
pub mod metrics;

pub use events::{Event, EventEmitter, TickSummary};
pub use logging::{LogFormat, init_logging};
pub use metrics::describe_metrics;
