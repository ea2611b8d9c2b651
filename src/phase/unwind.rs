//! Unwinding: turning a popped frame's captures into notifications.
//!
//! Each capture is checked against the live world before it is reported.
//! A capture that no longer applies is skipped and reported as a
//! [`CaptureFailure`]; the rest of the frame's captures are still emitted.

use serde::Serialize;
use thiserror::Error;

use super::capture::{BlockChange, BlockPos, CaptureKind, EntityId, EntitySpawn, SlotTransaction};
use super::context::PhaseContext;
use super::state::PhaseState;

/// Read-only view of the simulated world used to validate captures.
pub trait WorldView {
    /// Returns `true` if the entity still exists.
    fn entity_exists(&self, entity: EntityId) -> bool;

    /// Returns `true` if the block's chunk is loaded.
    fn is_block_loaded(&self, pos: BlockPos) -> bool;
}

/// A world in which every capture applies.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenWorld;

impl WorldView for OpenWorld {
    fn entity_exists(&self, _entity: EntityId) -> bool {
        true
    }

    fn is_block_loaded(&self, _pos: BlockPos) -> bool {
        true
    }
}

/// One link in a cause chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cause {
    /// Phase of the frame
    pub phase: PhaseState,
    /// Distinguishing fields of the frame
    pub summary: String,
}

/// Causes of a notification, innermost first.
///
/// The first entry is the unwound frame itself, followed by the frames that
/// were still on the stack when it was popped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CauseChain(pub Vec<Cause>);

impl CauseChain {
    /// Builds a chain from the unwound frame and the remaining frames, top
    /// to bottom.
    pub fn from_frames<'a>(
        popped: &'a PhaseContext,
        remaining: impl IntoIterator<Item = &'a PhaseContext>,
    ) -> Self {
        Self(
            std::iter::once(popped)
                .chain(remaining)
                .map(|ctx| Cause {
                    phase: ctx.state(),
                    summary: ctx.summary(),
                })
                .collect(),
        )
    }

    /// The outermost cause, if any.
    #[must_use]
    pub fn root(&self) -> Option<&Cause> {
        self.0.last()
    }
}

/// Outbound notification produced by unwinding a frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    /// Blocks changed during a phase.
    ChangeBlocks {
        /// Phase that produced the changes
        phase: PhaseState,
        /// Cause chain
        cause: CauseChain,
        /// The changes, in capture order
        changes: Vec<BlockChange>,
    },

    /// Entities spawned during a phase.
    SpawnEntities {
        /// Phase that produced the spawns
        phase: PhaseState,
        /// Cause chain
        cause: CauseChain,
        /// The spawns, in first-capture order
        entities: Vec<EntitySpawn>,
    },

    /// Inventory slots changed during a phase.
    InventoryTransaction {
        /// Phase that produced the transactions
        phase: PhaseState,
        /// Cause chain
        cause: CauseChain,
        /// The slot changes, in capture order
        transactions: Vec<SlotTransaction>,
    },

    /// Everything a command did, as one transaction.
    CommandTransaction {
        /// Command text
        command: String,
        /// Invoking actor
        actor: String,
        /// Cause chain
        cause: CauseChain,
        /// Block changes
        block_changes: Vec<BlockChange>,
        /// Entity spawns
        entity_spawns: Vec<EntitySpawn>,
        /// Slot changes, including those made by nested phases
        transactions: Vec<SlotTransaction>,
    },
}

impl Notification {
    /// Serialized kind tag.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ChangeBlocks { .. } => "change_blocks",
            Self::SpawnEntities { .. } => "spawn_entities",
            Self::InventoryTransaction { .. } => "inventory_transaction",
            Self::CommandTransaction { .. } => "command_transaction",
        }
    }

    /// Phase the notification is attributed to.
    #[must_use]
    pub const fn phase(&self) -> PhaseState {
        match self {
            Self::ChangeBlocks { phase, .. }
            | Self::SpawnEntities { phase, .. }
            | Self::InventoryTransaction { phase, .. } => *phase,
            Self::CommandTransaction { .. } => PhaseState::Command,
        }
    }

    /// Cause chain of the notification.
    #[must_use]
    pub const fn cause(&self) -> &CauseChain {
        match self {
            Self::ChangeBlocks { cause, .. }
            | Self::SpawnEntities { cause, .. }
            | Self::InventoryTransaction { cause, .. }
            | Self::CommandTransaction { cause, .. } => cause,
        }
    }

    /// Number of captures carried.
    #[must_use]
    pub fn capture_count(&self) -> usize {
        match self {
            Self::ChangeBlocks { changes, .. } => changes.len(),
            Self::SpawnEntities { entities, .. } => entities.len(),
            Self::InventoryTransaction { transactions, .. } => transactions.len(),
            Self::CommandTransaction {
                block_changes,
                entity_spawns,
                transactions,
                ..
            } => block_changes.len() + entity_spawns.len() + transactions.len(),
        }
    }
}

/// A single capture that could not be turned into a notification.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum CaptureFailure {
    /// The spawned entity is gone
    #[error("entity {entity} ({entity_type}) no longer exists")]
    EntityMissing {
        /// Entity id
        entity: EntityId,
        /// Entity type
        entity_type: String,
    },

    /// The changed block's chunk is not loaded
    #[error("block at {pos} is not loaded")]
    BlockUnloaded {
        /// Block position
        pos: BlockPos,
    },

    /// A slot change does not follow from the previous change to that slot
    #[error("slot {slot} of {inventory} expected '{expected}' but change starts from '{found}'")]
    SlotConflict {
        /// Inventory id
        inventory: String,
        /// Slot index
        slot: u32,
        /// Item the previous change left in the slot
        expected: String,
        /// Item this change claims was there
        found: String,
    },
}

impl CaptureFailure {
    /// Kind of the failed capture.
    #[must_use]
    pub const fn capture_kind(&self) -> CaptureKind {
        match self {
            Self::EntityMissing { .. } => CaptureKind::EntitySpawn,
            Self::BlockUnloaded { .. } => CaptureKind::BlockChange,
            Self::SlotConflict { .. } => CaptureKind::SlotTransaction,
        }
    }
}

/// Result of unwinding one frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnwindOutcome {
    /// Notifications, in emission order
    pub notifications: Vec<Notification>,
    /// Captures that were skipped
    pub failures: Vec<CaptureFailure>,
}

/// Captures that survived validation.
struct Surviving {
    blocks: Vec<BlockChange>,
    spawns: Vec<EntitySpawn>,
    slots: Vec<SlotTransaction>,
}

impl Surviving {
    fn is_empty(&self) -> bool {
        self.blocks.is_empty() && self.spawns.is_empty() && self.slots.is_empty()
    }
}

impl PhaseState {
    /// Drains `context`'s captures into notifications according to this
    /// state's unwind policy.
    ///
    /// Command frames produce one combined transaction. Tick, packet and
    /// unknown-cause frames produce one notification per capture kind.
    /// World generation only reports spawns. Buffers are left empty but
    /// keep their capacity.
    pub fn unwind(
        self,
        context: &mut PhaseContext,
        cause: CauseChain,
        world: &dyn WorldView,
    ) -> UnwindOutcome {
        debug_assert_eq!(context.state(), self, "unwinding a foreign context");

        let mut failures = Vec::new();
        let surviving = validate(context, world, &mut failures);
        let mut notifications = Vec::new();

        match self {
            Self::Idle => {}
            Self::Command => {
                if !surviving.is_empty() {
                    notifications.push(Notification::CommandTransaction {
                        command: context.command().unwrap_or_default().to_string(),
                        actor: context.actor().unwrap_or_default().to_string(),
                        cause,
                        block_changes: surviving.blocks,
                        entity_spawns: surviving.spawns,
                        transactions: surviving.slots,
                    });
                }
            }
            Self::WorldGenInit => {
                if !surviving.spawns.is_empty() {
                    notifications.push(Notification::SpawnEntities {
                        phase: self,
                        cause,
                        entities: surviving.spawns,
                    });
                }
            }
            Self::BlockTick | Self::EntityTick | Self::PacketProcessing | Self::UnknownCause => {
                if !surviving.blocks.is_empty() {
                    notifications.push(Notification::ChangeBlocks {
                        phase: self,
                        cause: cause.clone(),
                        changes: surviving.blocks,
                    });
                }
                if !surviving.spawns.is_empty() {
                    notifications.push(Notification::SpawnEntities {
                        phase: self,
                        cause: cause.clone(),
                        entities: surviving.spawns,
                    });
                }
                if !surviving.slots.is_empty() {
                    notifications.push(Notification::InventoryTransaction {
                        phase: self,
                        cause,
                        transactions: surviving.slots,
                    });
                }
            }
        }

        UnwindOutcome {
            notifications,
            failures,
        }
    }
}

/// Drains the context's buffers, keeping captures that still apply.
fn validate(
    context: &mut PhaseContext,
    world: &dyn WorldView,
    failures: &mut Vec<CaptureFailure>,
) -> Surviving {
    let captures = context.captures_mut();

    let blocks = captures
        .block_changes
        .drain(..)
        .filter(|change| {
            let loaded = world.is_block_loaded(change.pos);
            if !loaded {
                failures.push(CaptureFailure::BlockUnloaded { pos: change.pos });
            }
            loaded
        })
        .collect();

    let spawns = captures
        .entity_spawns
        .drain(..)
        .filter(|spawn| {
            let exists = world.entity_exists(spawn.entity);
            if !exists {
                failures.push(CaptureFailure::EntityMissing {
                    entity: spawn.entity,
                    entity_type: spawn.entity_type.clone(),
                });
            }
            exists
        })
        .collect();

    let mut slots: Vec<SlotTransaction> = Vec::with_capacity(captures.slot_transactions.len());
    for tx in captures.slot_transactions.drain(..) {
        let previous = slots
            .iter()
            .rev()
            .find(|p| p.inventory == tx.inventory && p.slot == tx.slot);
        if let Some(previous) = previous {
            if previous.replacement != tx.original {
                failures.push(CaptureFailure::SlotConflict {
                    inventory: tx.inventory,
                    slot: tx.slot,
                    expected: previous.replacement.clone(),
                    found: tx.original,
                });
                continue;
            }
        }
        slots.push(tx);
    }

    Surviving {
        blocks,
        spawns,
        slots,
    }
}
