//! Hook trace schema, loading, and validation.
//!
//! A hook trace is a YAML description of the enter/exit calls an
//! instrumented engine would make, tick by tick:
//!
//! ```yaml
//! name: fill-then-tick
//! world:
//!   despawned: [7]
//! ticks:
//!   - hooks:
//!       - phase: command
//!         command: "/fill ~ ~ ~ ~1 ~1 ~1 minecraft:stone"
//!         actor: Steve
//!         captures:
//!           - kind: block_change
//!             pos: { x: 0, y: 64, z: 0 }
//!             original: minecraft:air
//!             replacement: minecraft:stone
//!         children:
//!           - phase: block_tick
//!             block: { pos: { x: 0, y: 64, z: 0 }, block_type: minecraft:stone }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Severity, TraceError, TrackerError, ValidationIssue};
use crate::phase::{
    BlockSnapshot, Capture, ChunkPos, EntityId, PhaseContextBuilder, PhaseState,
};

/// Maximum Damerau-Levenshtein distance for phase name suggestions.
const SUGGESTION_DISTANCE: usize = 3;

/// A complete hook trace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HookTrace {
    /// Optional trace name, for reports
    #[serde(default)]
    pub name: Option<String>,

    /// World state captures are validated against
    #[serde(default)]
    pub world: WorldSpec,

    /// Ticks, replayed in order
    #[serde(default)]
    pub ticks: Vec<TickSpec>,
}

/// Entities and chunks that are gone by the time phases unwind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorldSpec {
    /// Entities that no longer exist
    pub despawned: Vec<EntityId>,

    /// Chunks that are not loaded
    pub unloaded_chunks: Vec<ChunkPos>,
}

/// One simulation tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TickSpec {
    /// Top-level hooks, in call order
    pub hooks: Vec<HookSpec>,
}

/// One instrumented call: enter a phase, capture, run children, exit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HookSpec {
    /// Phase key, e.g. `block_tick`
    pub phase: String,

    /// Command text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Invoking actor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,

    /// Inventory the command operates on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory: Option<String>,

    /// Ticking block
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block: Option<BlockSnapshot>,

    /// Ticking entity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<EntityId>,

    /// World being generated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub world: Option<String>,

    /// Chunk being populated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk: Option<ChunkPos>,

    /// Sending player
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player: Option<String>,

    /// Packet kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packet: Option<String>,

    /// Replaced phase key, for `unknown_cause` hooks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,

    /// Side effects recorded before the children run
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub captures: Vec<Capture>,

    /// Nested hooks
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Self>,

    /// The hook body fails after its captures, skipping its children
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub fail: bool,
}

impl HookSpec {
    /// The hook's phase, if the key is known.
    #[must_use]
    pub fn state(&self) -> Option<PhaseState> {
        PhaseState::from_key(&self.phase)
    }

    /// Applies the hook's fields to `builder`.
    ///
    /// Fields that do not belong to the builder's state are still applied,
    /// so sealing reports them.
    pub fn apply(&self, mut builder: PhaseContextBuilder) -> PhaseContextBuilder {
        if let Some(command) = &self.command {
            builder = builder.command(command.clone());
        }
        if let Some(actor) = &self.actor {
            builder = builder.actor(actor.clone());
        }
        if let Some(inventory) = &self.inventory {
            builder = builder.inventory(inventory.clone());
        }
        if let Some(block) = &self.block {
            builder = builder.block(block.clone());
        }
        if let Some(entity) = self.entity {
            builder = builder.entity(entity);
        }
        if let Some(world) = &self.world {
            builder = builder.world(world.clone());
        }
        if let Some(chunk) = self.chunk {
            builder = builder.chunk(chunk);
        }
        if let Some(player) = &self.player {
            builder = builder.player(player.clone());
        }
        if let Some(packet) = &self.packet {
            builder = builder.packet(packet.clone());
        }
        if let Some(origin) = self.origin.as_deref().and_then(PhaseState::from_key) {
            builder = builder.origin(origin);
        }
        builder
    }

    /// Total number of hooks in this subtree, including this one.
    #[must_use]
    pub fn hook_count(&self) -> usize {
        1 + self.children.iter().map(Self::hook_count).sum::<usize>()
    }
}

/// A parsed trace together with its validation warnings.
#[derive(Debug, Clone)]
pub struct LoadedTrace {
    /// The trace
    pub trace: HookTrace,
    /// Non-fatal validation issues
    pub warnings: Vec<ValidationIssue>,
}

/// Reads, parses, and validates a trace file.
///
/// # Errors
///
/// Returns [`TrackerError::Io`] if the file cannot be read, or
/// [`TrackerError::Trace`] if it does not parse or fails validation.
pub fn load_trace(path: &Path) -> Result<LoadedTrace, TrackerError> {
    let raw = std::fs::read_to_string(path)?;
    let trace = parse_trace(&raw, path)?;
    let (errors, warnings): (Vec<_>, Vec<_>) = validate_trace(&trace)
        .into_iter()
        .partition(|issue| issue.severity == Severity::Error);
    if !errors.is_empty() {
        return Err(TraceError::Invalid {
            path: path.to_path_buf(),
            errors,
        }
        .into());
    }
    Ok(LoadedTrace { trace, warnings })
}

/// Parses a trace without validating it.
///
/// # Errors
///
/// Returns [`TraceError::ParseError`] if `raw` is not a valid trace.
pub fn parse_trace(raw: &str, path: &Path) -> Result<HookTrace, TraceError> {
    let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);
    if raw.trim().is_empty() {
        return Ok(HookTrace::default());
    }
    serde_yaml::from_str(raw).map_err(|e| TraceError::ParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Checks every hook of a parsed trace, collecting all issues.
#[must_use]
pub fn validate_trace(trace: &HookTrace) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    if trace.ticks.is_empty() {
        issues.push(warning("ticks", "trace has no ticks"));
    }
    for (t, tick) in trace.ticks.iter().enumerate() {
        if tick.hooks.is_empty() {
            issues.push(warning(&format!("ticks[{t}]"), "tick has no hooks"));
        }
        for (h, hook) in tick.hooks.iter().enumerate() {
            validate_hook(hook, &format!("ticks[{t}].hooks[{h}]"), &mut issues);
        }
    }
    issues
}

fn validate_hook(hook: &HookSpec, path: &str, issues: &mut Vec<ValidationIssue>) {
    match hook.state() {
        None => {
            let mut message = format!("unknown phase '{}'", hook.phase);
            if let Some(suggestion) = suggest_phase(&hook.phase) {
                message.push_str(&format!("; did you mean '{suggestion}'?"));
            }
            issues.push(error(&format!("{path}.phase"), &message));
        }
        Some(state) if state.is_sentinel() => {
            issues.push(error(
                &format!("{path}.phase"),
                "the idle phase marks an empty stack and cannot be entered",
            ));
        }
        Some(state) => {
            if let Err(violation) = hook.apply(PhaseContextBuilder::new(state)).seal() {
                issues.push(error(path, &violation.to_string()));
            }
            if let Some(origin) = &hook.origin {
                if PhaseState::from_key(origin).is_none() {
                    issues.push(error(
                        &format!("{path}.origin"),
                        &format!("unknown phase '{origin}'"),
                    ));
                }
            }
            for (c, capture) in hook.captures.iter().enumerate() {
                let kind = capture.kind();
                if !state.accepts(kind) && !state.forwards(kind) {
                    issues.push(warning(
                        &format!("{path}.captures[{c}]"),
                        &format!("{state} does not take {kind} captures; it will be rejected"),
                    ));
                }
            }
        }
    }
    for (c, child) in hook.children.iter().enumerate() {
        validate_hook(child, &format!("{path}.children[{c}]"), issues);
    }
}

/// Suggests a phase key for a misspelled one.
///
/// Returns the closest enterable phase key within a Damerau-Levenshtein
/// distance of 3.
#[must_use]
pub fn suggest_phase(input: &str) -> Option<&'static str> {
    PhaseState::ALL
        .into_iter()
        .filter(|state| !state.is_sentinel())
        .map(|state| (state.key(), strsim::damerau_levenshtein(input, state.key())))
        .filter(|(_, dist)| *dist <= SUGGESTION_DISTANCE)
        .min_by_key(|(_, dist)| *dist)
        .map(|(key, _)| key)
}

fn error(path: &str, message: &str) -> ValidationIssue {
    ValidationIssue {
        path: path.to_string(),
        message: message.to_string(),
        severity: Severity::Error,
    }
}

fn warning(path: &str, message: &str) -> ValidationIssue {
    ValidationIssue {
        path: path.to_string(),
        message: message.to_string(),
        severity: Severity::Warning,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACE: &str = r#"
name: give-and-tick
world:
  despawned: [7]
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
"#;

    fn parse(raw: &str) -> HookTrace {
        parse_trace(raw, Path::new("test.yaml")).unwrap()
    }

    #[test]
    fn test_parse_nested_hooks() {
        let trace = parse(TRACE);
        assert_eq!(trace.name.as_deref(), Some("give-and-tick"));
        assert_eq!(trace.world.despawned, vec![EntityId(7)]);
        let hook = &trace.ticks[0].hooks[0];
        assert_eq!(hook.state(), Some(PhaseState::Command));
        assert_eq!(hook.hook_count(), 2);
        assert_eq!(hook.children[0].captures.len(), 1);
        assert!(validate_trace(&trace).is_empty());
    }

    #[test]
    fn test_unknown_field_is_parse_error() {
        let err = parse_trace("ticks: []\ntick_rate: 20\n", Path::new("t.yaml")).unwrap_err();
        assert!(matches!(err, TraceError::ParseError { .. }));
    }

    #[test]
    fn test_empty_document_is_empty_trace() {
        let trace = parse("\u{feff}\n");
        assert!(trace.ticks.is_empty());
        let issues = validate_trace(&trace);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Warning);
    }

    #[test]
    fn test_misspelled_phase_gets_suggestion() {
        let trace = parse("ticks:\n  - hooks:\n      - phase: blok_tick\n");
        let issues = validate_trace(&trace);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].path, "ticks[0].hooks[0].phase");
        assert!(issues[0].message.contains("did you mean 'block_tick'"));
    }

    #[test]
    fn test_missing_and_misplaced_fields_reported() {
        let trace = parse(
            "ticks:\n  - hooks:\n      - phase: command\n        command: /kill\n      - phase: entity_tick\n        entity: 3\n        player: Alex\n",
        );
        let issues = validate_trace(&trace);
        assert_eq!(issues.len(), 2);
        assert!(issues[0].message.contains("missing actor"));
        assert!(issues[1].message.contains("'player' does not apply"));
    }

    #[test]
    fn test_idle_cannot_be_entered() {
        let trace = parse("ticks:\n  - hooks:\n      - phase: idle\n");
        let issues = validate_trace(&trace);
        assert_eq!(issues[0].severity, Severity::Error);
    }

    #[test]
    fn test_unplaceable_capture_warns() {
        let trace = parse(
            "ticks:\n  - hooks:\n      - phase: world_gen_init\n        world: overworld\n        captures:\n          - kind: block_change\n            pos: { x: 0, y: 0, z: 0 }\n            original: a\n            replacement: b\n",
        );
        let issues = validate_trace(&trace);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Warning);
    }

    #[test]
    fn test_suggest_phase() {
        assert_eq!(suggest_phase("comand"), Some("command"));
        assert_eq!(suggest_phase("entity_tik"), Some("entity_tick"));
        assert_eq!(suggest_phase("idle"), None);
        assert_eq!(suggest_phase("something_else_entirely"), None);
    }

    #[test]
    fn test_load_trace_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "ticks:\n  - hooks:\n      - phase: nope_nope_nope\n").unwrap();
        let err = load_trace(&path).unwrap_err();
        assert!(matches!(err, TrackerError::Trace(TraceError::Invalid { .. })));
    }
}
