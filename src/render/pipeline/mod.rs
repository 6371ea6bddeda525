//! Render pipelines

pub mod voxel;

pub use voxel::{DepthTexture, FrameDraw, VoxelPipeline};
