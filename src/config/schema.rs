//! Tracker configuration schema
//!
//! Deserialized from YAML. Every field has a default, so an empty mapping is
//! a valid configuration.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::phase::DEFAULT_STACK_CAPACITY;

/// Default maximum stack depth before entries are degraded.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Default number of runaway diagnostics logged with a full stack dump.
pub const DEFAULT_MAX_PRINTED_RUNAWAYS: usize = 3;

/// Default number of diagnostics retained in memory.
pub const DEFAULT_MAX_RETAINED_DIAGNOSTICS: usize = 64;

/// Namespace assumed for entity types written without one.
pub const DEFAULT_ENTITY_NAMESPACE: &str = "minecraft";

/// Runtime configuration of a [`PhaseTracker`](crate::tracker::PhaseTracker).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrackerConfig {
    /// Frames preallocated for the stack.
    pub initial_stack_capacity: usize,

    /// Entries beyond this depth are replaced by the neutral phase.
    pub max_depth: usize,

    /// Runaway diagnostics logged with a full stack dump; later ones are
    /// logged as a single line.
    pub max_printed_runaways: usize,

    /// Log a full stack dump with every diagnostic.
    pub verbose: bool,

    /// Size of the in-memory diagnostic ring buffer.
    pub max_retained_diagnostics: usize,

    /// Per-entity-type spawn tracking.
    pub entity_tracker: EntityTrackerConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            initial_stack_capacity: DEFAULT_STACK_CAPACITY,
            max_depth: DEFAULT_MAX_DEPTH,
            max_printed_runaways: DEFAULT_MAX_PRINTED_RUNAWAYS,
            verbose: false,
            max_retained_diagnostics: DEFAULT_MAX_RETAINED_DIAGNOSTICS,
            entity_tracker: EntityTrackerConfig::default(),
        }
    }
}

/// Controls which entity types have their spawns captured.
///
/// ```yaml
/// entity_tracker:
///   auto_populate: true
///   namespaces:
///     minecraft:
///       item: false
///       experience_orb: false
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EntityTrackerConfig {
    /// Register newly seen entity types (enabled) as they are encountered.
    pub auto_populate: bool,

    /// `namespace -> entity type -> tracked`.
    pub namespaces: IndexMap<String, IndexMap<String, bool>>,
}

impl EntityTrackerConfig {
    /// Splits `namespace:path`, defaulting the namespace.
    #[must_use]
    pub fn split_type(entity_type: &str) -> (&str, &str) {
        entity_type
            .split_once(':')
            .unwrap_or((DEFAULT_ENTITY_NAMESPACE, entity_type))
    }

    /// Configured toggle for an entity type, if any.
    #[must_use]
    pub fn lookup(&self, entity_type: &str) -> Option<bool> {
        let (namespace, path) = Self::split_type(entity_type);
        self.namespaces.get(namespace)?.get(path).copied()
    }

    /// Returns `true` if spawns of `entity_type` should be captured.
    ///
    /// Unknown types are tracked. With `auto_populate` they are also
    /// recorded so the populated configuration can be written back.
    pub fn is_tracked(&mut self, entity_type: &str) -> bool {
        if let Some(tracked) = self.lookup(entity_type) {
            return tracked;
        }
        if self.auto_populate {
            let (namespace, path) = Self::split_type(entity_type);
            self.namespaces
                .entry(namespace.to_string())
                .or_default()
                .insert(path.to_string(), true);
        }
        true
    }
}
