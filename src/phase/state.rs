//! Phase state descriptors
//!
//! A [`PhaseState`] names one kind of tracked engine operation and carries
//! its fixed capabilities: whether it may re-enter itself, which captures it
//! accepts, and which it hands up to an enclosing phase. The unwind policy
//! for each kind lives in [`super::unwind`].

use serde::{Deserialize, Serialize};

use super::capture::CaptureKind;

/// Kind of tracked engine operation.
///
/// Values are immutable and shared; all per-entry data lives in a
/// [`PhaseContext`](super::PhaseContext).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseState {
    /// Nothing is being tracked. Reported for an empty stack, never pushed.
    Idle,
    /// A command is executing on behalf of an actor.
    Command,
    /// A scheduled or random block tick.
    BlockTick,
    /// A per-tick entity update.
    EntityTick,
    /// Chunk population during world generation.
    WorldGenInit,
    /// An inbound player packet is being handled.
    PacketProcessing,
    /// Neutral phase substituted when the real cause could not be tracked.
    UnknownCause,
}

impl PhaseState {
    /// Every phase state, sentinel first.
    pub const ALL: [Self; 7] = [
        Self::Idle,
        Self::Command,
        Self::BlockTick,
        Self::EntityTick,
        Self::WorldGenInit,
        Self::PacketProcessing,
        Self::UnknownCause,
    ];

    /// Display name used in logs and stack dumps.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Command => "Command",
            Self::BlockTick => "BlockTick",
            Self::EntityTick => "EntityTick",
            Self::WorldGenInit => "WorldGenInit",
            Self::PacketProcessing => "PacketProcessing",
            Self::UnknownCause => "UnknownCause",
        }
    }

    /// Serialized key, as written in configuration and trace files.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Command => "command",
            Self::BlockTick => "block_tick",
            Self::EntityTick => "entity_tick",
            Self::WorldGenInit => "world_gen_init",
            Self::PacketProcessing => "packet_processing",
            Self::UnknownCause => "unknown_cause",
        }
    }

    /// Looks a state up by its serialized key.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|state| state.key() == key)
    }

    /// Returns `true` for the idle sentinel.
    #[must_use]
    pub const fn is_sentinel(self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Returns `true` if two back-to-back frames of this state without
    /// progress in between indicate a bug.
    #[must_use]
    pub const fn is_not_re_entrant(self) -> bool {
        matches!(
            self,
            Self::Command | Self::BlockTick | Self::EntityTick | Self::WorldGenInit
        )
    }

    /// Returns `true` if a frame of this state stores captures of `kind`.
    #[must_use]
    pub const fn accepts(self, kind: CaptureKind) -> bool {
        match self {
            Self::Idle => false,
            Self::Command | Self::PacketProcessing => true,
            Self::BlockTick | Self::EntityTick | Self::UnknownCause => {
                !matches!(kind, CaptureKind::SlotTransaction)
            }
            Self::WorldGenInit => matches!(kind, CaptureKind::EntitySpawn),
        }
    }

    /// Returns `true` if a frame of this state hands captures of `kind` it
    /// does not accept up to the nearest enclosing frame that does.
    ///
    /// Ticks nested inside a command move items on the command's behalf, so
    /// their slot transactions belong to the command's combined transaction.
    #[must_use]
    pub const fn forwards(self, kind: CaptureKind) -> bool {
        matches!(kind, CaptureKind::SlotTransaction)
            && matches!(self, Self::BlockTick | Self::EntityTick | Self::UnknownCause)
    }
}

impl std::fmt::Display for PhaseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
