//! Voxel data structures and the authoritative grid

pub mod voxel;
pub mod grid;

pub use voxel::{HoverTarget, Voxel, VoxelColor, VoxelId};
pub use grid::{AddOutcome, GridChange, GridSnapshot, VoxelGrid};
