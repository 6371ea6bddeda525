//! View-ray picking against the voxel batch and the ground plane

use crate::core::camera::Camera;
use crate::core::config::{GroundConfig, SandboxConfig};
use crate::core::types::{IVec3, Vec3};
use crate::math::{Aabb, Ray, RayHit};
use crate::render::instances::RenderInstanceSet;
use crate::voxel::{HoverTarget, VoxelGrid};

/// A surface that can be hit by the view ray
pub trait PickTarget {
    /// Stable name used in logs and debug output
    fn name(&self) -> &'static str;

    /// Nearest hit no further than `max_t`
    fn pick(&self, ray: &Ray, max_t: f32) -> Option<PickHit>;
}

/// A pick result; `instance` is set for hits on the voxel batch
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PickHit {
    pub hit: RayHit,
    pub instance: Option<usize>,
}

/// The instanced voxel batch as a pick target
pub struct InstanceBatch<'a> {
    set: &'a RenderInstanceSet,
}

impl<'a> InstanceBatch<'a> {
    pub fn new(set: &'a RenderInstanceSet) -> Self {
        Self { set }
    }
}

impl PickTarget for InstanceBatch<'_> {
    fn name(&self) -> &'static str {
        "voxel_batch"
    }

    fn pick(&self, ray: &Ray, max_t: f32) -> Option<PickHit> {
        if self.set.is_empty() || !self.set.bounds().may_hit(ray, max_t) {
            return None;
        }

        let mut best: Option<PickHit> = None;
        for (index, instance) in self.set.instances().iter().enumerate() {
            let min = Vec3::from_array(instance.translation);
            let Some(hit) = ray.cast_aabb(&Aabb::new(min, min + Vec3::ONE)) else {
                continue;
            };
            if hit.t > max_t || best.is_some_and(|b| b.hit.t <= hit.t) {
                continue;
            }
            best = Some(PickHit {
                hit,
                instance: Some(index),
            });
        }
        best
    }
}

/// Finite horizontal ground plane, pickable from both sides
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GroundPlane {
    pub height: f32,
    pub half_extent: f32,
}

impl From<GroundConfig> for GroundPlane {
    fn from(config: GroundConfig) -> Self {
        Self {
            height: config.height,
            half_extent: config.half_extent,
        }
    }
}

impl PickTarget for GroundPlane {
    fn name(&self) -> &'static str {
        "ground_plane"
    }

    fn pick(&self, ray: &Ray, max_t: f32) -> Option<PickHit> {
        let hit = ray.cast_plane(Vec3::new(0.0, self.height, 0.0), Vec3::Y)?;
        if hit.t > max_t || hit.point.x.abs() > self.half_extent || hit.point.z.abs() > self.half_extent {
            return None;
        }
        Some(PickHit { hit, instance: None })
    }
}

/// Cell a placement would fill: the lattice cell just outside the hit face
pub fn target_cell(point: Vec3, normal: Vec3) -> IVec3 {
    (point + normal * 0.5).floor().as_ivec3()
}

/// Where the next placement would go and what is under the cursor
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlacementCandidate {
    pub target_cell: IVec3,
    /// Voxel under the view ray; `None` for ground hits or stale instance data
    pub hovered: Option<HoverTarget>,
    /// Grid generation the candidate was resolved against
    pub generation: u64,
}

/// Per-frame view-ray picking
pub struct RaycastInteractor {
    reach: f32,
    ground: GroundPlane,
    candidate: Option<PlacementCandidate>,
    stale_discards: u64,
}

impl RaycastInteractor {
    pub fn new(reach: f32, ground: GroundPlane) -> Self {
        Self {
            reach,
            ground,
            candidate: None,
            stale_discards: 0,
        }
    }

    pub fn from_config(config: &SandboxConfig) -> Self {
        Self::new(config.reach, GroundPlane::from(config.ground))
    }

    /// Cast the camera's view-centre ray and cache the result
    pub fn update(&mut self, camera: &Camera, set: &RenderInstanceSet, grid: &VoxelGrid) -> Option<PlacementCandidate> {
        self.cast(&camera.view_ray(), set, grid)
    }

    /// Resolve a ray into the cached candidate
    pub fn cast(&mut self, ray: &Ray, set: &RenderInstanceSet, grid: &VoxelGrid) -> Option<PlacementCandidate> {
        let batch = InstanceBatch::new(set);
        let targets: [&dyn PickTarget; 2] = [&batch, &self.ground];

        let mut nearest: Option<(PickHit, &'static str)> = None;
        for target in targets {
            if let Some(hit) = target.pick(ray, self.reach) {
                if nearest.is_none_or(|(best, _)| hit.hit.t < best.hit.t) {
                    nearest = Some((hit, target.name()));
                }
            }
        }

        self.candidate = nearest.map(|(pick, name)| {
            let hovered = pick.instance.and_then(|index| {
                if set.generation() != grid.generation() {
                    self.stale_discards += 1;
                    log::trace!(
                        "Discarding hover on {} instance {}: instances at generation {}, grid at {}",
                        name,
                        index,
                        set.generation(),
                        grid.generation()
                    );
                    return None;
                }
                set.hover_target(index)
            });

            PlacementCandidate {
                target_cell: target_cell(pick.hit.point, pick.hit.normal),
                hovered,
                generation: grid.generation(),
            }
        });

        self.candidate
    }

    /// Candidate from the last cast
    pub fn candidate(&self) -> Option<&PlacementCandidate> {
        self.candidate.as_ref()
    }

    pub fn reach(&self) -> f32 {
        self.reach
    }

    /// Hovers dropped because the instances lagged the grid
    pub fn stale_discards(&self) -> u64 {
        self.stale_discards
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::instances::{InstanceProjector, WorldExtentPolicy};
    use crate::voxel::{VoxelColor, VoxelId};

    fn ground() -> GroundPlane {
        GroundPlane { height: 0.0, half_extent: 50.0 }
    }

    fn scene(cells: &[IVec3]) -> (VoxelGrid, RenderInstanceSet) {
        let mut grid = VoxelGrid::new(64);
        for (i, &cell) in cells.iter().enumerate() {
            grid.add(cell, VoxelColor::ACCENT, Some(VoxelId(i as u64 + 1))).unwrap();
        }
        let mut set = RenderInstanceSet::new(64, WorldExtentPolicy::Unbounded);
        InstanceProjector::new().project(&mut set, &grid).unwrap();
        (grid, set)
    }

    #[test]
    fn test_target_cell_offset() {
        assert_eq!(target_cell(Vec3::new(0.5, 0.5, 1.0), Vec3::Z), IVec3::new(0, 0, 1));
        assert_eq!(target_cell(Vec3::new(0.5, 0.5, 0.0), Vec3::NEG_Z), IVec3::new(0, 0, -1));
        assert_eq!(target_cell(Vec3::new(-3.2, 0.0, 7.9), Vec3::Y), IVec3::new(-4, 0, 7));
        assert_eq!(target_cell(Vec3::new(-3.2, 0.0, 7.9), Vec3::NEG_Y), IVec3::new(-4, -1, 7));
    }

    #[test]
    fn test_hit_voxel_face_places_adjacent() {
        let (grid, set) = scene(&[IVec3::ZERO]);
        let mut interactor = RaycastInteractor::new(100.0, ground());

        let ray = Ray::new(Vec3::new(0.5, 0.5, 5.0), Vec3::NEG_Z);
        let candidate = interactor.cast(&ray, &set, &grid).unwrap();

        assert_eq!(candidate.target_cell, IVec3::new(0, 0, 1));
        assert_eq!(candidate.hovered, Some(HoverTarget { position: IVec3::ZERO, id: Some(VoxelId(1)) }));
        assert_eq!(interactor.candidate(), Some(&candidate));
    }

    #[test]
    fn test_ground_hit_has_no_hover() {
        let (grid, set) = scene(&[]);
        let mut interactor = RaycastInteractor::new(100.0, ground());

        let ray = Ray::new(Vec3::new(2.5, 10.0, -1.5), Vec3::NEG_Y);
        let candidate = interactor.cast(&ray, &set, &grid).unwrap();
        assert_eq!(candidate.target_cell, IVec3::new(2, 0, -2));
        assert!(candidate.hovered.is_none());

        // From below, the cell under the plane
        let ray = Ray::new(Vec3::new(2.5, -10.0, -1.5), Vec3::Y);
        let candidate = interactor.cast(&ray, &set, &grid).unwrap();
        assert_eq!(candidate.target_cell, IVec3::new(2, -1, -2));
    }

    #[test]
    fn test_nearest_hit_wins() {
        let (grid, set) = scene(&[IVec3::new(0, 0, 0), IVec3::new(0, 2, 0)]);
        let mut interactor = RaycastInteractor::new(100.0, ground());

        // Looking down: the upper voxel is nearer than the lower one and the ground
        let ray = Ray::new(Vec3::new(0.5, 10.0, 0.5), Vec3::NEG_Y);
        let candidate = interactor.cast(&ray, &set, &grid).unwrap();
        assert_eq!(candidate.hovered.unwrap().position, IVec3::new(0, 2, 0));
        assert_eq!(candidate.target_cell, IVec3::new(0, 3, 0));

        // Next to the voxels, the ground is the only hit
        let ray = Ray::new(Vec3::new(3.5, 10.0, 0.5), Vec3::NEG_Y);
        let candidate = interactor.cast(&ray, &set, &grid).unwrap();
        assert!(candidate.hovered.is_none());
        assert_eq!(candidate.target_cell, IVec3::new(3, 0, 0));
    }

    #[test]
    fn test_escape_and_reach_clear_candidate() {
        let (grid, set) = scene(&[IVec3::ZERO]);
        let mut interactor = RaycastInteractor::new(5.0, ground());

        let ray = Ray::new(Vec3::new(0.5, 0.5, 3.0), Vec3::NEG_Z);
        assert!(interactor.cast(&ray, &set, &grid).is_some());

        // Pointing at the sky
        let ray = Ray::new(Vec3::new(0.5, 3.0, 3.0), Vec3::Y);
        assert!(interactor.cast(&ray, &set, &grid).is_none());
        assert!(interactor.candidate().is_none());

        // Voxel and ground both beyond reach
        let ray = Ray::new(Vec3::new(0.5, 0.5, 30.0), Vec3::NEG_Z);
        assert!(interactor.cast(&ray, &set, &grid).is_none());
    }

    #[test]
    fn test_ground_is_finite() {
        let (grid, set) = scene(&[]);
        let mut interactor = RaycastInteractor::new(1000.0, ground());

        let ray = Ray::new(Vec3::new(80.0, 10.0, 0.0), Vec3::NEG_Y);
        assert!(interactor.cast(&ray, &set, &grid).is_none());
    }

    #[test]
    fn test_origin_inside_voxel_sees_through_it() {
        let (grid, set) = scene(&[IVec3::new(0, 1, 0)]);
        let mut interactor = RaycastInteractor::new(100.0, ground());

        let ray = Ray::new(Vec3::new(0.5, 1.5, 0.5), Vec3::NEG_Y);
        let candidate = interactor.cast(&ray, &set, &grid).unwrap();
        assert!(candidate.hovered.is_none());
        assert_eq!(candidate.target_cell, IVec3::new(0, 0, 0));
    }

    #[test]
    fn test_stale_generation_discards_hover() {
        let (mut grid, set) = scene(&[IVec3::ZERO]);
        let mut interactor = RaycastInteractor::new(100.0, ground());

        // Grid moves on without reprojecting
        grid.add(IVec3::new(5, 0, 0), VoxelColor::ACCENT, None).unwrap();

        let ray = Ray::new(Vec3::new(0.5, 0.5, 5.0), Vec3::NEG_Z);
        let candidate = interactor.cast(&ray, &set, &grid).unwrap();
        assert!(candidate.hovered.is_none());
        assert_eq!(candidate.target_cell, IVec3::new(0, 0, 1));
        assert_eq!(candidate.generation, grid.generation());
        assert_eq!(interactor.stale_discards(), 1);
    }

    #[test]
    fn test_camera_view_ray() {
        let (grid, set) = scene(&[IVec3::ZERO]);
        let mut interactor = RaycastInteractor::new(100.0, ground());
        let mut camera = Camera::new(Vec3::new(0.5, 0.5, 6.0), 70.0, 1.0);
        camera.look_at(Vec3::new(0.5, 0.5, 0.0));

        let candidate = interactor.update(&camera, &set, &grid).unwrap();
        assert_eq!(candidate.target_cell, IVec3::new(0, 0, 1));
    }

    #[test]
    fn test_pick_target_names() {
        let set = RenderInstanceSet::new(1, WorldExtentPolicy::Unbounded);
        assert_eq!(InstanceBatch::new(&set).name(), "voxel_batch");
        assert_eq!(ground().name(), "ground_plane");
    }
}
