//! Shared integration-test helpers: context construction for every phase
//! kind and a runner for the `phasetrack` binary.

#![allow(dead_code)]

use std::path::PathBuf;
use std::process::{Command, Output};

use phasetrack::phase::{
    BlockPos, BlockSnapshot, ChunkPos, EntityId, PhaseContext, PhaseContextBuilder, PhaseState,
};

/// Every state that can be pushed.
pub const ENTERABLE: [PhaseState; 6] = [
    PhaseState::Command,
    PhaseState::BlockTick,
    PhaseState::EntityTick,
    PhaseState::WorldGenInit,
    PhaseState::PacketProcessing,
    PhaseState::UnknownCause,
];

/// Fills every required field of `state`, varying the distinguishing
/// field with `id`.
pub fn filled(state: PhaseState, id: u32) -> PhaseContextBuilder {
    let builder = PhaseContextBuilder::new(state);
    let coord = i32::try_from(id).unwrap();
    match state {
        PhaseState::Idle => builder,
        PhaseState::Command => builder.command(format!("/tp @s {id} 64 0")).actor("Steve"),
        PhaseState::BlockTick => builder.block(BlockSnapshot {
            pos: BlockPos::new(coord, 64, 0),
            block_type: "minecraft:redstone_wire".to_string(),
        }),
        PhaseState::EntityTick => builder.entity(EntityId(u64::from(id))),
        PhaseState::WorldGenInit => builder
            .world("overworld")
            .chunk(ChunkPos { x: coord, z: 0 }),
        PhaseState::PacketProcessing => builder.player("Alex").packet(format!("packet_{id}")),
        PhaseState::UnknownCause => builder.origin(PhaseState::BlockTick),
    }
}

/// A sealed context for `state`.
pub fn sealed(state: PhaseState, id: u32) -> PhaseContext {
    filled(state, id).seal().unwrap()
}

/// Runs the `phasetrack` binary with `args`.
pub fn run_cli(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_phasetrack"))
        .args(args)
        .env_remove("PHASETRACK_LOG_LEVEL")
        .env_remove("PHASETRACK_CONFIG")
        .output()
        .expect("failed to run phasetrack")
}

/// Path of a file under `tests/fixtures`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}
