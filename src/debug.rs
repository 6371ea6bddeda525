//! Debug server glue
//!
//! The debug handler runs on the tokio runtime and never touches the session
//! directly. It queues requests into `SharedDebugState`, and the frame loop
//! applies them and publishes the state the handler reads back.

use std::sync::{Arc, Mutex as StdMutex, MutexGuard};

use glam::{IVec3, Vec3};
use voxsync_debug::{DebugCommand, DebugHandler, DebugResponse, ResponseData, VoxelInfo};

use crate::core::camera::Camera;
use crate::core::camera_controller::FpsCameraController;
use crate::core::time::FpsStats;
use crate::interact::{Intent, PlacementCandidate};
use crate::session::Session;
use crate::voxel::{GridSnapshot, HoverTarget, VoxelColor};

/// Voxels listed when the client gives no limit
const DEFAULT_LIST_LIMIT: usize = 256;

/// Grid mutation requested over the debug connection
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DebugEdit {
    /// Add at `cell`, with the selected color when `color` is `None`
    Add { cell: IVec3, color: Option<VoxelColor> },
    Remove { cell: IVec3 },
}

#[derive(Default)]
pub struct SharedDebugState {
    // Requests (set by debug handler, consumed by frame loop)
    camera_move_to: Option<Vec3>,
    camera_look_at: Option<Vec3>,
    pending_edits: Vec<DebugEdit>,

    // Published state (updated by frame loop each frame)
    camera_position: [f32; 3],
    voxel_count: usize,
    capacity: usize,
    generation: u64,
    pending: usize,
    instance_generation: u64,
    snapshot: Option<GridSnapshot>,
    candidate: Option<PlacementCandidate>,
    current_fps: f32,
    fps_stats: FpsStats,
}

impl SharedDebugState {
    /// Apply queued requests on the frame loop. Edits go through the session
    /// so they are written to the store like pointer edits.
    pub fn apply_requests(
        &mut self,
        session: &mut Session,
        camera: &mut Camera,
        camera_controller: &mut FpsCameraController,
    ) {
        if let Some(position) = self.camera_move_to.take() {
            camera.position = position;
        }
        if let Some(target) = self.camera_look_at.take() {
            camera_controller.look_at(camera, target);
        }

        for edit in self.pending_edits.drain(..) {
            let intent = match edit {
                DebugEdit::Add { cell, color } => Intent::Add {
                    cell,
                    color: color.unwrap_or_else(|| session.controller().selected_color()),
                },
                DebugEdit::Remove { cell } => match session.grid().get(cell) {
                    Some(voxel) => Intent::Remove { target: HoverTarget::from(voxel) },
                    None => {
                        log::debug!("Debug remove at {} ignored: cell is empty", cell);
                        continue;
                    }
                },
            };
            log::debug!("Applying debug edit {:?}", intent);
            // Failures are reported by the session
            let _ = session.apply_intent(intent);
        }
    }

    /// Copy the state debug commands read
    pub fn publish(&mut self, session: &Session, camera: &Camera, fps: f32, fps_stats: FpsStats) {
        let grid = session.grid();
        self.camera_position = camera.position.to_array();
        self.voxel_count = grid.len();
        self.capacity = grid.capacity();
        self.pending = grid.pending_count();
        self.instance_generation = session.instances().generation();
        if self.snapshot.is_none() || self.generation != grid.generation() {
            self.snapshot = Some(grid.snapshot());
        }
        self.generation = grid.generation();
        self.candidate = session.candidate().copied();
        self.current_fps = fps;
        self.fps_stats = fps_stats;
    }

    pub fn pending_edits(&self) -> &[DebugEdit] {
        &self.pending_edits
    }
}

pub struct AppDebugHandler {
    state: Arc<StdMutex<SharedDebugState>>,
}

impl AppDebugHandler {
    pub fn new(state: Arc<StdMutex<SharedDebugState>>) -> Self {
        Self { state }
    }

    fn state(&self) -> MutexGuard<'_, SharedDebugState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl DebugHandler for AppDebugHandler {
    fn handle_command(&mut self, cmd: DebugCommand) -> DebugResponse {
        match cmd {
            DebugCommand::Ping => DebugResponse::pong(),

            DebugCommand::GetGridInfo => {
                let s = self.state();
                DebugResponse::ok(ResponseData::GridInfo {
                    voxel_count: s.voxel_count,
                    capacity: s.capacity,
                    generation: s.generation,
                    pending: s.pending,
                    instance_generation: s.instance_generation,
                    camera_position: s.camera_position,
                })
            }

            DebugCommand::ListVoxels { limit } => {
                let s = self.state();
                let voxels = s.snapshot.as_ref().map(|snap| snap.voxels()).unwrap_or_default();
                DebugResponse::ok(ResponseData::Voxels {
                    total: voxels.len(),
                    voxels: voxels
                        .iter()
                        .take(limit.unwrap_or(DEFAULT_LIST_LIMIT))
                        .map(|v| VoxelInfo {
                            position: v.position.to_array(),
                            color: v.color.to_string(),
                            id: v.id.map(|id| id.0),
                        })
                        .collect(),
                })
            }

            DebugCommand::AddVoxel { x, y, z, color } => {
                let color = match color.map(|c| c.parse::<VoxelColor>()).transpose() {
                    Ok(color) => color,
                    Err(e) => return DebugResponse::error(e),
                };
                let cell = IVec3::new(x, y, z);
                self.state().pending_edits.push(DebugEdit::Add { cell, color });
                DebugResponse::queued(format!("add at {}", cell))
            }

            DebugCommand::RemoveVoxel { x, y, z } => {
                let cell = IVec3::new(x, y, z);
                self.state().pending_edits.push(DebugEdit::Remove { cell });
                DebugResponse::queued(format!("remove at {}", cell))
            }

            DebugCommand::GetCandidate => {
                let s = self.state();
                let candidate = s.candidate.as_ref();
                DebugResponse::ok(ResponseData::Candidate {
                    target_cell: candidate.map(|c| c.target_cell.to_array()),
                    hovered: candidate.and_then(|c| c.hovered).map(|h| h.position.to_array()),
                    hovered_id: candidate.and_then(|c| c.hovered).and_then(|h| h.id).map(|id| id.0),
                })
            }

            DebugCommand::CameraMoveTo { x, y, z } => {
                self.state().camera_move_to = Some(Vec3::new(x, y, z));
                DebugResponse::none()
            }

            DebugCommand::CameraLookAt { x, y, z } => {
                self.state().camera_look_at = Some(Vec3::new(x, y, z));
                DebugResponse::none()
            }

            DebugCommand::GetFpsStats => {
                let s = self.state();
                DebugResponse::ok(ResponseData::FpsStats {
                    current_fps: s.current_fps,
                    frame_count: s.fps_stats.frame_count,
                    avg: s.fps_stats.avg,
                    min: s.fps_stats.min,
                    max: s.fps_stats.max,
                })
            }
        }
    }
}
