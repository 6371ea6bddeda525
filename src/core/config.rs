//! Sandbox configuration

use std::path::Path;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::core::error::Error;
use crate::core::types::Result;
use crate::render::instances::WorldExtentPolicy;
use crate::voxel::VoxelColor;

/// Default instance capacity (also the voxel capacity of the grid)
pub const DEFAULT_INSTANCE_CAPACITY: usize = 100_000;

/// Ground plane placement
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroundConfig {
    /// Y coordinate of the plane
    pub height: f32,
    /// Half of the side length of the square plane
    pub half_extent: f32,
}

impl Default for GroundConfig {
    fn default() -> Self {
        Self {
            height: 0.0,
            half_extent: 500.0,
        }
    }
}

/// Configuration for a sandbox session
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Fixed number of GPU instance slots
    pub instance_capacity: usize,
    /// Ground plane
    pub ground: GroundConfig,
    /// Maximum pick distance in world units
    pub reach: f32,
    /// Bounding volume policy for the instanced batch
    pub world_extent: WorldExtentPolicy,
    /// Colors selectable with the digit keys
    pub palette: Vec<VoxelColor>,
    /// Color used when nothing else is selected
    pub default_color: VoxelColor,
    /// Initial camera position
    pub camera_start: Vec3,
    /// Fly speed in units per second
    pub move_speed: f32,
    /// Mouse look sensitivity
    pub mouse_sensitivity: f32,
    /// Roll back optimistic inserts the store rejected (default keeps them)
    pub rollback_failed_inserts: bool,
    /// Debug server port, 0 disables it
    pub debug_port: u16,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            instance_capacity: DEFAULT_INSTANCE_CAPACITY,
            ground: GroundConfig::default(),
            reach: 200.0,
            world_extent: WorldExtentPolicy::Unbounded,
            palette: vec![
                VoxelColor::ACCENT,
                VoxelColor::rgb(0xe8, 0x4a, 0x3c), // Red
                VoxelColor::rgb(0xf2, 0xc1, 0x4e), // Yellow
                VoxelColor::rgb(0x4c, 0xaf, 0x50), // Green
                VoxelColor::rgb(0x8d, 0x6e, 0x63), // Brown
                VoxelColor::rgb(0xec, 0xef, 0xf1), // White
                VoxelColor::rgb(0x37, 0x47, 0x4f), // Slate
                VoxelColor::rgb(0x9c, 0x27, 0xb0), // Purple
                VoxelColor::rgb(0xff, 0x98, 0x00), // Orange
            ],
            default_color: VoxelColor::ACCENT,
            camera_start: Vec3::new(0.0, 4.0, 12.0),
            move_speed: 10.0,
            mouse_sensitivity: 1.0,
            rollback_failed_inserts: false,
            debug_port: voxsync_debug::DEFAULT_PORT,
        }
    }
}

impl SandboxConfig {
    /// Load a JSON config file; missing fields fall back to defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let config: SandboxConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the sandbox cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.instance_capacity == 0 {
            return Err(Error::Config("instance_capacity must be positive".into()));
        }
        if self.palette.is_empty() {
            return Err(Error::Config("palette must contain at least one color".into()));
        }
        if !(self.reach > 0.0) {
            return Err(Error::Config(format!("reach must be positive, got {}", self.reach)));
        }
        if !(self.ground.half_extent > 0.0) {
            return Err(Error::Config("ground.half_extent must be positive".into()));
        }
        Ok(())
    }
}
