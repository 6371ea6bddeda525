//! Voxsync - a multi-viewer voxel placement sandbox
//!
//! Voxels live in a `VoxelGrid`, are projected into a fixed-capacity GPU
//! instance set, picked with the view ray and kept in sync with a shared
//! store through optimistic inserts and realtime notifications.

pub mod core;
pub mod math;
pub mod voxel;
pub mod render;
pub mod interact;
pub mod sync;
pub mod session;
pub mod debug;
