//! Debug protocol - JSON command/response definitions

use serde::{Deserialize, Serialize};

/// Commands sent by a debug client, one JSON object per line
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "params")]
pub enum DebugCommand {
    /// Health check
    Ping,
    /// Voxel count, capacity, generation and pending inserts
    GetGridInfo,
    /// List placed voxels (at most `limit`, default 256)
    ListVoxels {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<usize>,
    },
    /// Queue an add intent; color is `#rrggbb`, selected color when omitted
    AddVoxel {
        x: i32,
        y: i32,
        z: i32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        color: Option<String>,
    },
    /// Queue a remove intent for the voxel at a cell
    RemoveVoxel { x: i32, y: i32, z: i32 },
    /// Current placement candidate under the view ray
    GetCandidate,
    /// Move camera to absolute position
    CameraMoveTo { x: f32, y: f32, z: f32 },
    /// Look at a target point
    CameraLookAt { x: f32, y: f32, z: f32 },
    /// Frame time statistics
    GetFpsStats,
}

/// Responses from debug server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum DebugResponse {
    #[serde(rename = "ok")]
    Ok { data: ResponseData },
    #[serde(rename = "error")]
    Error { message: String },
}

/// Response data variants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseData {
    None,
    Pong { message: String },
    GridInfo {
        voxel_count: usize,
        capacity: usize,
        generation: u64,
        pending: usize,
        instance_generation: u64,
        camera_position: [f32; 3],
    },
    Voxels {
        total: usize,
        voxels: Vec<VoxelInfo>,
    },
    Queued { description: String },
    Candidate {
        target_cell: Option<[i32; 3]>,
        hovered: Option<[i32; 3]>,
        hovered_id: Option<u64>,
    },
    FpsStats {
        current_fps: f32,
        frame_count: u64,
        avg: f32,
        min: f32,
        max: f32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoxelInfo {
    pub position: [i32; 3],
    pub color: String,
    /// Store identity, absent while the insert is pending
    pub id: Option<u64>,
}

impl DebugResponse {
    pub fn ok(data: ResponseData) -> Self {
        Self::Ok { data }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self::Error {
            message: msg.into(),
        }
    }

    pub fn pong() -> Self {
        Self::ok(ResponseData::Pong {
            message: "pong".into(),
        })
    }

    pub fn none() -> Self {
        Self::ok(ResponseData::None)
    }

    pub fn queued(description: impl Into<String>) -> Self {
        Self::ok(ResponseData::Queued {
            description: description.into(),
        })
    }
}
