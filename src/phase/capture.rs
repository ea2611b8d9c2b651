//! Capture records and per-frame capture buffers.
//!
//! A capture is a side effect recorded while a phase is active and held
//! until the phase unwinds. Records are plain owned values: once a record
//! sits in a frame's buffer that frame owns it exclusively.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// Absolute block coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockPos {
    /// X coordinate
    pub x: i32,
    /// Y coordinate
    pub y: i32,
    /// Z coordinate
    pub z: i32,
}

impl BlockPos {
    /// Creates a new position.
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Returns the chunk containing this block.
    #[must_use]
    pub const fn chunk(self) -> ChunkPos {
        ChunkPos {
            x: self.x >> 4,
            z: self.z >> 4,
        }
    }
}

impl std::fmt::Display for BlockPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Chunk column coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkPos {
    /// Chunk X
    pub x: i32,
    /// Chunk Z
    pub z: i32,
}

impl std::fmt::Display for ChunkPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.x, self.z)
    }
}

/// Engine-assigned entity identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A block at a position, as seen by a ticking phase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockSnapshot {
    /// Where the block is
    pub pos: BlockPos,
    /// Namespaced block type, e.g. `minecraft:grass`
    pub block_type: String,
}

/// A recorded block mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockChange {
    /// Mutated position
    pub pos: BlockPos,
    /// Block type before the change
    pub original: String,
    /// Block type after the change
    pub replacement: String,
}

/// A recorded entity spawn.
///
/// Spawns are kept in a set: the same entity spawned twice within one
/// phase is a single capture.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntitySpawn {
    /// Spawned entity
    pub entity: EntityId,
    /// Namespaced entity type, e.g. `minecraft:zombie`
    pub entity_type: String,
}

/// A recorded inventory slot change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotTransaction {
    /// Owning inventory (player name or container id)
    pub inventory: String,
    /// Slot index
    pub slot: u32,
    /// Item stack before the change
    pub original: String,
    /// Item stack after the change
    pub replacement: String,
}

/// Classification of capture records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureKind {
    /// [`BlockChange`]
    BlockChange,
    /// [`EntitySpawn`]
    EntitySpawn,
    /// [`SlotTransaction`]
    SlotTransaction,
}

impl std::fmt::Display for CaptureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::BlockChange => "block change",
            Self::EntitySpawn => "entity spawn",
            Self::SlotTransaction => "slot transaction",
        };
        f.write_str(name)
    }
}

/// A single capture on its way into a frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Capture {
    /// A block mutation
    BlockChange(BlockChange),
    /// An entity spawn
    EntitySpawn(EntitySpawn),
    /// An inventory slot change
    SlotTransaction(SlotTransaction),
}

impl Capture {
    /// Returns the kind of this capture.
    #[must_use]
    pub const fn kind(&self) -> CaptureKind {
        match self {
            Self::BlockChange(_) => CaptureKind::BlockChange,
            Self::EntitySpawn(_) => CaptureKind::EntitySpawn,
            Self::SlotTransaction(_) => CaptureKind::SlotTransaction,
        }
    }
}

/// Number of captures held per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CaptureCounts {
    /// Block changes
    pub block_changes: usize,
    /// Entity spawns
    pub entity_spawns: usize,
    /// Slot transactions
    pub slot_transactions: usize,
}

impl CaptureCounts {
    /// Total across all kinds.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.block_changes + self.entity_spawns + self.slot_transactions
    }
}

/// Capture buffers owned by one phase context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captures {
    pub(crate) block_changes: Vec<BlockChange>,
    pub(crate) entity_spawns: IndexSet<EntitySpawn>,
    pub(crate) slot_transactions: Vec<SlotTransaction>,
}

impl Captures {
    /// Captured block changes, in capture order.
    #[must_use]
    pub fn block_changes(&self) -> &[BlockChange] {
        &self.block_changes
    }

    /// Captured entity spawns, in first-capture order.
    #[must_use]
    pub const fn entity_spawns(&self) -> &IndexSet<EntitySpawn> {
        &self.entity_spawns
    }

    /// Captured slot transactions, in capture order.
    #[must_use]
    pub fn slot_transactions(&self) -> &[SlotTransaction] {
        &self.slot_transactions
    }

    /// Returns `true` if every buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.block_changes.is_empty()
            && self.entity_spawns.is_empty()
            && self.slot_transactions.is_empty()
    }

    /// Returns per-kind counts.
    #[must_use]
    pub fn counts(&self) -> CaptureCounts {
        CaptureCounts {
            block_changes: self.block_changes.len(),
            entity_spawns: self.entity_spawns.len(),
            slot_transactions: self.slot_transactions.len(),
        }
    }

    /// Stores a capture in the matching buffer.
    pub(crate) fn insert(&mut self, capture: Capture) {
        match capture {
            Capture::BlockChange(change) => self.block_changes.push(change),
            Capture::EntitySpawn(spawn) => {
                self.entity_spawns.insert(spawn);
            }
            Capture::SlotTransaction(tx) => self.slot_transactions.push(tx),
        }
    }

    /// Empties every buffer, keeping allocated capacity.
    pub(crate) fn clear(&mut self) {
        self.block_changes.clear();
        self.entity_spawns.clear();
        self.slot_transactions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn(id: u64) -> EntitySpawn {
        EntitySpawn {
            entity: EntityId(id),
            entity_type: "minecraft:zombie".to_string(),
        }
    }

    #[test]
    fn test_chunk_of_negative_block() {
        let pos = BlockPos::new(-1, 64, 17);
        assert_eq!(pos.chunk(), ChunkPos { x: -1, z: 1 });
    }

    #[test]
    fn test_duplicate_spawns_collapse() {
        let mut captures = Captures::default();
        captures.insert(Capture::EntitySpawn(spawn(7)));
        captures.insert(Capture::EntitySpawn(spawn(7)));
        captures.insert(Capture::EntitySpawn(spawn(3)));

        let ids: Vec<u64> = captures.entity_spawns().iter().map(|s| s.entity.0).collect();
        assert_eq!(ids, vec![7, 3]);
    }

    #[test]
    fn test_counts_and_clear() {
        let mut captures = Captures::default();
        assert!(captures.is_empty());

        captures.insert(Capture::BlockChange(BlockChange {
            pos: BlockPos::new(0, 64, 0),
            original: "minecraft:air".to_string(),
            replacement: "minecraft:stone".to_string(),
        }));
        captures.insert(Capture::EntitySpawn(spawn(1)));

        let counts = captures.counts();
        assert_eq!(counts.block_changes, 1);
        assert_eq!(counts.entity_spawns, 1);
        assert_eq!(counts.total(), 2);

        captures.clear();
        assert!(captures.is_empty());
        assert_eq!(captures.counts(), CaptureCounts::default());
    }

    #[test]
    fn test_capture_serializes_with_kind_tag() {
        let capture = Capture::EntitySpawn(spawn(9));
        let json = serde_json::to_value(&capture).unwrap();
        assert_eq!(json["kind"], "entity_spawn");
        assert_eq!(json["entity"], 9);
    }
}
