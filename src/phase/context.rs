//! Phase contexts and their builder.
//!
//! Construction is two-phase. A [`PhaseContextBuilder`] is bound to one
//! [`PhaseState`] and collects that state's fields through fluent setters;
//! [`PhaseContextBuilder::seal`] performs the one-time completeness check
//! and yields a [`PhaseContext`]. Setters do not exist on a sealed context.
//!
//! A sealed context can be [`reset`](PhaseContext::reset) after it has been
//! popped and unwound, which drops it back to an incomplete state, and then
//! [`reopen`](PhaseContext::reopen)ed as a builder to reuse its buffers.

use std::sync::LazyLock;

use indexmap::IndexMap;

use crate::error::ProtocolViolation;

use super::capture::{BlockSnapshot, Capture, CaptureCounts, Captures, ChunkPos, EntityId};
use super::state::PhaseState;

/// Phase-specific fields.
///
/// Each variant carries only the fields its phase kind needs. Fields are
/// optional so that builders and reset contexts can represent their
/// absence; a sealed context has every required field set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseData {
    /// No fields.
    Idle,
    /// Command execution.
    Command {
        /// Raw command text (required)
        command: Option<String>,
        /// Invoking actor (required)
        actor: Option<String>,
        /// Inventory whose slot changes the command is expected to touch
        inventory: Option<String>,
    },
    /// Block tick.
    BlockTick {
        /// The ticking block (required)
        block: Option<BlockSnapshot>,
    },
    /// Entity tick.
    EntityTick {
        /// The ticking entity (required)
        entity: Option<EntityId>,
    },
    /// World generation.
    WorldGenInit {
        /// World being generated (required)
        world: Option<String>,
        /// Chunk being populated
        chunk: Option<ChunkPos>,
    },
    /// Inbound packet handling.
    PacketProcessing {
        /// Sending player (required)
        player: Option<String>,
        /// Packet kind (required)
        packet: Option<String>,
    },
    /// Neutral replacement phase.
    UnknownCause {
        /// The phase that was replaced (required)
        origin: Option<PhaseState>,
    },
}

impl PhaseData {
    /// Empty field set for `state`.
    #[must_use]
    pub const fn empty(state: PhaseState) -> Self {
        match state {
            PhaseState::Idle => Self::Idle,
            PhaseState::Command => Self::Command {
                command: None,
                actor: None,
                inventory: None,
            },
            PhaseState::BlockTick => Self::BlockTick { block: None },
            PhaseState::EntityTick => Self::EntityTick { entity: None },
            PhaseState::WorldGenInit => Self::WorldGenInit {
                world: None,
                chunk: None,
            },
            PhaseState::PacketProcessing => Self::PacketProcessing {
                player: None,
                packet: None,
            },
            PhaseState::UnknownCause => Self::UnknownCause { origin: None },
        }
    }

    /// Names of required fields that are not set.
    ///
    /// The idle sentinel is never complete; it reports a pseudo-field.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        match self {
            Self::Idle => missing.push("<sentinel>"),
            Self::Command {
                command, actor, ..
            } => {
                if command.is_none() {
                    missing.push("command");
                }
                if actor.is_none() {
                    missing.push("actor");
                }
            }
            Self::BlockTick { block } => {
                if block.is_none() {
                    missing.push("block");
                }
            }
            Self::EntityTick { entity } => {
                if entity.is_none() {
                    missing.push("entity");
                }
            }
            Self::WorldGenInit { world, .. } => {
                if world.is_none() {
                    missing.push("world");
                }
            }
            Self::PacketProcessing { player, packet } => {
                if player.is_none() {
                    missing.push("player");
                }
                if packet.is_none() {
                    missing.push("packet");
                }
            }
            Self::UnknownCause { origin } => {
                if origin.is_none() {
                    missing.push("origin");
                }
            }
        }
        missing
    }

    /// Distinguishing fields, for stack dumps.
    #[must_use]
    pub fn fields(&self) -> IndexMap<&'static str, String> {
        fn put<T: ToString>(map: &mut IndexMap<&'static str, String>, key: &'static str, v: Option<&T>) {
            if let Some(v) = v {
                map.insert(key, v.to_string());
            }
        }

        let mut map = IndexMap::new();
        match self {
            Self::Idle => {}
            Self::Command {
                command,
                actor,
                inventory,
            } => {
                put(&mut map, "command", command.as_ref());
                put(&mut map, "actor", actor.as_ref());
                put(&mut map, "inventory", inventory.as_ref());
            }
            Self::BlockTick { block } => {
                if let Some(block) = block {
                    map.insert("block", block.block_type.clone());
                    map.insert("pos", block.pos.to_string());
                }
            }
            Self::EntityTick { entity } => put(&mut map, "entity", entity.as_ref()),
            Self::WorldGenInit { world, chunk } => {
                put(&mut map, "world", world.as_ref());
                put(&mut map, "chunk", chunk.as_ref());
            }
            Self::PacketProcessing { player, packet } => {
                put(&mut map, "player", player.as_ref());
                put(&mut map, "packet", packet.as_ref());
            }
            Self::UnknownCause { origin } => put(&mut map, "origin", origin.as_ref()),
        }
        map
    }
}

static EMPTY: LazyLock<PhaseContext> = LazyLock::new(|| PhaseContext {
    state: PhaseState::Idle,
    data: PhaseData::Idle,
    captures: Captures::default(),
    complete: false,
});

/// Mutable capture buffer bound to one pushed phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseContext {
    state: PhaseState,
    data: PhaseData,
    captures: Captures,
    complete: bool,
}

impl PhaseContext {
    /// The shared empty context, bound to the idle sentinel.
    #[must_use]
    pub fn empty() -> &'static Self {
        &EMPTY
    }

    /// The state this context was built for.
    #[must_use]
    pub const fn state(&self) -> PhaseState {
        self.state
    }

    /// Phase-specific fields.
    #[must_use]
    pub const fn data(&self) -> &PhaseData {
        &self.data
    }

    /// Captured side effects.
    #[must_use]
    pub const fn captures(&self) -> &Captures {
        &self.captures
    }

    pub(crate) const fn captures_mut(&mut self) -> &mut Captures {
        &mut self.captures
    }

    /// Returns `true` while the context is sealed and not reset.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.complete
    }

    /// Returns `true` if any capture buffer is non-empty.
    #[must_use]
    pub fn has_captures(&self) -> bool {
        !self.captures.is_empty()
    }

    /// Per-kind capture counts.
    #[must_use]
    pub fn capture_counts(&self) -> CaptureCounts {
        self.captures.counts()
    }

    /// Stores a capture. Callers check [`PhaseState::accepts`] first.
    pub(crate) fn capture(&mut self, capture: Capture) {
        self.captures.insert(capture);
    }

    /// Command text, for command contexts.
    #[must_use]
    pub fn command(&self) -> Option<&str> {
        match &self.data {
            PhaseData::Command { command, .. } => command.as_deref(),
            _ => None,
        }
    }

    /// Invoking actor, for command contexts.
    #[must_use]
    pub fn actor(&self) -> Option<&str> {
        match &self.data {
            PhaseData::Command { actor, .. } => actor.as_deref(),
            _ => None,
        }
    }

    /// Clears captures and optional fields and marks the context incomplete.
    ///
    /// Must not be called while the context is on the stack; the stack only
    /// hands out contexts by value once they are popped.
    pub fn reset(&mut self) {
        self.data = PhaseData::empty(self.state);
        self.captures.clear();
        self.complete = false;
    }

    /// Turns this context back into a builder for the same state, keeping
    /// its buffer capacity.
    #[must_use]
    pub fn reopen(mut self) -> PhaseContextBuilder {
        self.reset();
        PhaseContextBuilder {
            context: self,
            misuse: None,
        }
    }

    /// Returns `true` if `candidate` repeats this frame's operation without
    /// progress.
    ///
    /// Frames of different states never match. Within a state:
    /// - Command: same command text and same actor
    /// - `BlockTick`: same position and block type
    /// - `EntityTick`: same entity
    /// - `WorldGenInit`: same world and chunk
    /// - `PacketProcessing`: same player and packet kind
    /// - Idle and `UnknownCause` never match
    #[must_use]
    pub fn is_runaway(&self, candidate: &Self) -> bool {
        match (&self.data, &candidate.data) {
            (
                PhaseData::Command {
                    command: a_cmd,
                    actor: a_actor,
                    ..
                },
                PhaseData::Command {
                    command: b_cmd,
                    actor: b_actor,
                    ..
                },
            ) => a_cmd.is_some() && a_cmd == b_cmd && a_actor == b_actor,
            (PhaseData::BlockTick { block: a }, PhaseData::BlockTick { block: b }) => {
                a.is_some() && a == b
            }
            (PhaseData::EntityTick { entity: a }, PhaseData::EntityTick { entity: b }) => {
                a.is_some() && a == b
            }
            (
                PhaseData::WorldGenInit {
                    world: a_world,
                    chunk: a_chunk,
                },
                PhaseData::WorldGenInit {
                    world: b_world,
                    chunk: b_chunk,
                },
            ) => a_world.is_some() && a_world == b_world && a_chunk == b_chunk,
            (
                PhaseData::PacketProcessing {
                    player: a_player,
                    packet: a_packet,
                },
                PhaseData::PacketProcessing {
                    player: b_player,
                    packet: b_packet,
                },
            ) => a_player.is_some() && a_player == b_player && a_packet == b_packet,
            _ => false,
        }
    }

    /// One-line description used in cause chains.
    #[must_use]
    pub fn summary(&self) -> String {
        let fields = self.data.fields();
        if fields.is_empty() {
            return self.state.name().to_string();
        }
        let parts: Vec<String> = fields.iter().map(|(k, v)| format!("{k}={v}")).collect();
        format!("{} {{{}}}", self.state, parts.join(", "))
    }
}

/// Open, mutable builder for a [`PhaseContext`].
#[derive(Debug, Clone)]
#[must_use = "a builder does nothing until sealed"]
pub struct PhaseContextBuilder {
    context: PhaseContext,
    misuse: Option<ProtocolViolation>,
}

impl PhaseContextBuilder {
    /// Starts a context bound to `state`.
    pub fn new(state: PhaseState) -> Self {
        Self {
            context: PhaseContext {
                state,
                data: PhaseData::empty(state),
                captures: Captures::default(),
                complete: false,
            },
            misuse: None,
        }
    }

    /// The state this builder is bound to.
    #[must_use]
    pub const fn state(&self) -> PhaseState {
        self.context.state
    }

    /// Returns `true` if sealing would succeed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.misuse.is_none() && self.context.data.missing_fields().is_empty()
    }

    fn misapplied(mut self, field: &'static str) -> Self {
        if self.misuse.is_none() {
            self.misuse = Some(ProtocolViolation::FieldNotApplicable {
                state: self.context.state,
                field,
            });
        }
        self
    }

    /// Sets the command text.
    pub fn command(mut self, text: impl Into<String>) -> Self {
        if let PhaseData::Command { command, .. } = &mut self.context.data {
            *command = Some(text.into());
            self
        } else {
            self.misapplied("command")
        }
    }

    /// Sets the invoking actor.
    pub fn actor(mut self, name: impl Into<String>) -> Self {
        if let PhaseData::Command { actor, .. } = &mut self.context.data {
            *actor = Some(name.into());
            self
        } else {
            self.misapplied("actor")
        }
    }

    /// Attaches the inventory the command operates on.
    pub fn inventory(mut self, id: impl Into<String>) -> Self {
        if let PhaseData::Command { inventory, .. } = &mut self.context.data {
            *inventory = Some(id.into());
            self
        } else {
            self.misapplied("inventory")
        }
    }

    /// Sets the ticking block.
    pub fn block(mut self, snapshot: BlockSnapshot) -> Self {
        if let PhaseData::BlockTick { block } = &mut self.context.data {
            *block = Some(snapshot);
            self
        } else {
            self.misapplied("block")
        }
    }

    /// Sets the ticking entity.
    pub fn entity(mut self, id: EntityId) -> Self {
        if let PhaseData::EntityTick { entity } = &mut self.context.data {
            *entity = Some(id);
            self
        } else {
            self.misapplied("entity")
        }
    }

    /// Sets the world being generated.
    pub fn world(mut self, name: impl Into<String>) -> Self {
        if let PhaseData::WorldGenInit { world, .. } = &mut self.context.data {
            *world = Some(name.into());
            self
        } else {
            self.misapplied("world")
        }
    }

    /// Sets the chunk being populated.
    pub fn chunk(mut self, pos: ChunkPos) -> Self {
        if let PhaseData::WorldGenInit { chunk, .. } = &mut self.context.data {
            *chunk = Some(pos);
            self
        } else {
            self.misapplied("chunk")
        }
    }

    /// Sets the sending player.
    pub fn player(mut self, name: impl Into<String>) -> Self {
        if let PhaseData::PacketProcessing { player, .. } = &mut self.context.data {
            *player = Some(name.into());
            self
        } else {
            self.misapplied("player")
        }
    }

    /// Sets the packet kind.
    pub fn packet(mut self, kind: impl Into<String>) -> Self {
        if let PhaseData::PacketProcessing { packet, .. } = &mut self.context.data {
            *packet = Some(kind.into());
            self
        } else {
            self.misapplied("packet")
        }
    }

    /// Sets the phase an unknown-cause frame stands in for.
    pub fn origin(mut self, state: PhaseState) -> Self {
        if let PhaseData::UnknownCause { origin } = &mut self.context.data {
            *origin = Some(state);
            self
        } else {
            self.misapplied("origin")
        }
    }

    /// Performs the completeness check and seals the context.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolViolation::FieldNotApplicable`] if a setter was used
    /// that does not belong to the bound state, or
    /// [`ProtocolViolation::IncompleteContext`] if a required field is unset.
    pub fn seal(self) -> Result<PhaseContext, ProtocolViolation> {
        if let Some(misuse) = self.misuse {
            return Err(misuse);
        }
        let missing = self.context.data.missing_fields();
        if !missing.is_empty() {
            return Err(ProtocolViolation::IncompleteContext {
                state: self.context.state,
                missing: missing.join(", "),
            });
        }
        let mut context = self.context;
        context.complete = true;
        Ok(context)
    }
}
