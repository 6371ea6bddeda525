//! Grid to GPU instance projection
//!
//! `RenderInstanceSet` mirrors the grid order slot for slot: instance `i` is
//! the `i`-th voxel of the grid at the set's generation. The projector keeps
//! it current by replaying the grid's change journal, falling back to a full
//! rebuild when the journal no longer reaches back far enough.

use std::collections::BTreeSet;
use std::ops::Range;

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use crate::core::error::Error;
use crate::core::types::{Result, Vec3};
use crate::math::{Aabb, Frustum, Ray};
use crate::voxel::{GridChange, GridSnapshot, HoverTarget, Voxel, VoxelGrid};

/// Per-instance GPU data (must match `InstanceInput` in voxel.wgsl)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct InstanceRaw {
    /// Minimum corner of the cell (12 bytes, offset 0)
    pub translation: [f32; 3],
    /// Padding to 16 bytes
    pub _pad: f32,
    /// sRGB color, alpha in w (16 bytes, offset 16)
    pub color: [f32; 4],
}

impl InstanceRaw {
    pub fn from_voxel(voxel: &Voxel) -> Self {
        Self {
            translation: voxel.position.as_vec3().to_array(),
            _pad: 0.0,
            color: voxel.color.to_array_f32(),
        }
    }
}

/// How the batch's bounding volume is derived
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorldExtentPolicy {
    /// The batch is treated as covering all of space
    #[default]
    Unbounded,
    /// Bounds are refit to the instances on every projection
    FitInstances,
}

/// Bounding volume of the whole instance batch
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BatchBounds {
    Empty,
    Unbounded,
    Fit(Aabb),
}

impl BatchBounds {
    /// Broad phase for picking
    pub fn may_hit(&self, ray: &Ray, max_t: f32) -> bool {
        match self {
            BatchBounds::Empty => false,
            BatchBounds::Unbounded => true,
            BatchBounds::Fit(aabb) => ray
                .intersects_aabb(aabb)
                .is_some_and(|(t_near, _)| t_near <= max_t),
        }
    }

    /// Frustum culling for the batch draw
    pub fn is_visible(&self, frustum: &Frustum) -> bool {
        match self {
            BatchBounds::Empty => false,
            BatchBounds::Unbounded => true,
            BatchBounds::Fit(aabb) => frustum.intersects_aabb(aabb),
        }
    }
}

/// Fixed-capacity render-side copy of the grid
pub struct RenderInstanceSet {
    instances: Vec<InstanceRaw>,
    /// Slot -> hovered voxel, updated together with `instances`
    targets: Vec<HoverTarget>,
    capacity: usize,
    generation: u64,
    /// Slots changed since the last GPU upload
    dirty: Option<Range<usize>>,
    policy: WorldExtentPolicy,
    bounds: BatchBounds,
}

impl RenderInstanceSet {
    pub fn new(capacity: usize, policy: WorldExtentPolicy) -> Self {
        Self {
            instances: Vec::new(),
            targets: Vec::new(),
            capacity,
            generation: 0,
            dirty: None,
            policy,
            bounds: BatchBounds::Empty,
        }
    }

    /// Number of live instances
    pub fn count(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Grid generation this set reflects
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn instances(&self) -> &[InstanceRaw] {
        &self.instances
    }

    /// Voxel drawn by an instance
    pub fn hover_target(&self, index: usize) -> Option<HoverTarget> {
        self.targets.get(index).copied()
    }

    pub fn bounds(&self) -> BatchBounds {
        self.bounds
    }

    pub fn policy(&self) -> WorldExtentPolicy {
        self.policy
    }

    /// Take the slot range that needs uploading, clearing it
    pub fn take_dirty_range(&mut self) -> Option<Range<usize>> {
        self.dirty.take()
    }

    fn mark_dirty(&mut self, slots: Range<usize>) {
        if slots.is_empty() {
            return;
        }
        self.dirty = Some(match self.dirty.take() {
            Some(existing) => existing.start.min(slots.start)..existing.end.max(slots.end),
            None => slots,
        });
    }

    fn refresh_bounds(&mut self) {
        self.bounds = if self.instances.is_empty() {
            BatchBounds::Empty
        } else {
            match self.policy {
                WorldExtentPolicy::Unbounded => BatchBounds::Unbounded,
                WorldExtentPolicy::FitInstances => {
                    let (min, max) = self.instances.iter().fold(
                        (Vec3::splat(f32::MAX), Vec3::splat(f32::MIN)),
                        |(min, max), instance| {
                            let p = Vec3::from_array(instance.translation);
                            (min.min(p), max.max(p + Vec3::ONE))
                        },
                    );
                    BatchBounds::Fit(Aabb::new(min, max))
                }
            }
        };
    }
}

/// How a projection brought the set up to date
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProjectionKind {
    Unchanged,
    Incremental { changes: usize, slots: usize },
    Rebuilt,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProjectionReport {
    pub kind: ProjectionKind,
    pub count: usize,
    pub generation: u64,
}

/// Keeps a `RenderInstanceSet` in step with a `VoxelGrid`
#[derive(Debug, Default)]
pub struct InstanceProjector {
    rebuilds: u64,
    incremental_updates: u64,
}

impl InstanceProjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bring `set` up to the grid's generation.
    ///
    /// On `CapacityExceeded` the set keeps its previous contents and generation.
    pub fn project(&mut self, set: &mut RenderInstanceSet, grid: &VoxelGrid) -> Result<ProjectionReport> {
        if set.generation == grid.generation() {
            return Ok(ProjectionReport {
                kind: ProjectionKind::Unchanged,
                count: set.count(),
                generation: set.generation,
            });
        }
        if grid.len() > set.capacity {
            return Err(Error::CapacityExceeded { capacity: set.capacity });
        }

        let Some(changes) = grid.changes_since(set.generation) else {
            log::debug!(
                "Journal gap at generation {} (grid at {}), rebuilding instances",
                set.generation,
                grid.generation()
            );
            self.rebuild(set, &grid.snapshot())?;
            return Ok(ProjectionReport {
                kind: ProjectionKind::Rebuilt,
                count: set.count(),
                generation: set.generation,
            });
        };

        // Untouched slots still hold the same voxel, so only touched slots
        // need rewriting from the grid's current order.
        let mut touched = BTreeSet::new();
        let mut change_count = 0;
        for change in changes {
            change_count += 1;
            match *change {
                GridChange::Appended { slot } | GridChange::Modified { slot } => {
                    touched.insert(slot);
                }
                GridChange::Removed { slot, moved_from } => {
                    if moved_from.is_some() {
                        touched.insert(slot);
                    }
                }
            }
        }

        let len = grid.len();
        set.instances.resize(len, InstanceRaw::default());
        set.targets.resize(len, HoverTarget { position: Default::default(), id: None });

        let mut written = 0;
        for &slot in touched.range(..len) {
            let Some(voxel) = grid.get_slot(slot) else {
                continue;
            };
            set.instances[slot] = InstanceRaw::from_voxel(voxel);
            set.targets[slot] = HoverTarget::from(voxel);
            written += 1;
        }
        if let (Some(&first), Some(&last)) = (touched.range(..len).next(), touched.range(..len).next_back()) {
            set.mark_dirty(first..last + 1);
        }

        set.generation = grid.generation();
        set.refresh_bounds();
        self.incremental_updates += 1;

        log::trace!(
            "Applied {} grid changes to {} instance slots (generation {})",
            change_count,
            written,
            set.generation
        );

        Ok(ProjectionReport {
            kind: ProjectionKind::Incremental {
                changes: change_count,
                slots: written,
            },
            count: set.count(),
            generation: set.generation,
        })
    }

    /// Full re-projection from a snapshot
    pub fn rebuild(&mut self, set: &mut RenderInstanceSet, snapshot: &GridSnapshot) -> Result<()> {
        if snapshot.len() > set.capacity {
            return Err(Error::CapacityExceeded { capacity: set.capacity });
        }

        set.instances.clear();
        set.targets.clear();
        for voxel in snapshot.voxels() {
            set.instances.push(InstanceRaw::from_voxel(voxel));
            set.targets.push(HoverTarget::from(voxel));
        }
        set.dirty = None;
        set.mark_dirty(0..set.instances.len());
        set.generation = snapshot.generation();
        set.refresh_bounds();
        self.rebuilds += 1;

        log::debug!(
            "Rebuilt {} instances at generation {}",
            set.count(),
            set.generation
        );
        Ok(())
    }

    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds
    }

    pub fn incremental_count(&self) -> u64 {
        self.incremental_updates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::IVec3;
    use crate::voxel::{VoxelColor, VoxelId};

    fn assert_consistent(set: &RenderInstanceSet, grid: &VoxelGrid) {
        assert_eq!(set.count(), grid.len());
        assert_eq!(set.generation(), grid.generation());
        for (i, voxel) in grid.iter().enumerate() {
            assert_eq!(set.instances()[i], InstanceRaw::from_voxel(voxel), "slot {}", i);
            assert_eq!(set.hover_target(i), Some(HoverTarget::from(voxel)));
        }
    }

    #[test]
    fn test_instance_layout() {
        assert_eq!(std::mem::size_of::<InstanceRaw>(), 32);
    }

    #[test]
    fn test_projection_consistency() {
        let mut grid = VoxelGrid::new(64);
        let mut set = RenderInstanceSet::new(64, WorldExtentPolicy::Unbounded);
        let mut projector = InstanceProjector::new();

        grid.add(IVec3::new(2, 3, -1), VoxelColor::rgb(255, 0, 0), None).unwrap();
        grid.add(IVec3::new(0, 0, 0), VoxelColor::ACCENT, Some(VoxelId(4))).unwrap();

        let report = projector.project(&mut set, &grid).unwrap();
        assert_eq!(report.count, 2);
        assert_consistent(&set, &grid);
        assert_eq!(set.instances()[0].translation, [2.0, 3.0, -1.0]);
        assert_eq!(set.instances()[0].color, [1.0, 0.0, 0.0, 1.0]);

        let again = projector.project(&mut set, &grid).unwrap();
        assert_eq!(again.kind, ProjectionKind::Unchanged);
    }

    #[test]
    fn test_incremental_matches_rebuild() {
        let mut grid = VoxelGrid::new(512);
        let mut incremental = RenderInstanceSet::new(512, WorldExtentPolicy::FitInstances);
        let mut projector = InstanceProjector::new();

        // Deterministic mixed add/remove sequence
        let mut state = 0x2545_f491_u32;
        let mut next = || {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state
        };

        for step in 0..600 {
            let r = next();
            let cell = IVec3::new((r % 9) as i32 - 4, ((r >> 8) % 5) as i32, ((r >> 16) % 7) as i32 - 3);
            match r % 5 {
                0 | 1 | 2 => {
                    let id = (r % 3 == 0).then_some(VoxelId(step));
                    let _ = grid.add(cell, VoxelColor::rgb(r as u8, (r >> 8) as u8, (r >> 16) as u8), id);
                }
                3 => {
                    grid.remove_by_position(cell);
                }
                _ => {
                    grid.assign_identity(cell, VoxelId(10_000 + step));
                }
            }

            if step % 7 == 0 {
                projector.project(&mut incremental, &grid).unwrap();
                assert_consistent(&incremental, &grid);
            }
        }
        projector.project(&mut incremental, &grid).unwrap();

        let mut rebuilt = RenderInstanceSet::new(512, WorldExtentPolicy::FitInstances);
        InstanceProjector::new().rebuild(&mut rebuilt, &grid.snapshot()).unwrap();

        assert_eq!(incremental.instances(), rebuilt.instances());
        assert_eq!(incremental.bounds(), rebuilt.bounds());
        assert_consistent(&incremental, &grid);
        assert!(projector.incremental_count() > 0);
        assert_eq!(projector.rebuild_count(), 0);
    }

    #[test]
    fn test_journal_gap_rebuilds() {
        let mut grid = VoxelGrid::new(16);
        let mut set = RenderInstanceSet::new(16, WorldExtentPolicy::Unbounded);
        let mut projector = InstanceProjector::new();

        grid.add(IVec3::ZERO, VoxelColor::ACCENT, None).unwrap();
        grid.add(IVec3::ONE, VoxelColor::ACCENT, None).unwrap();
        // Another consumer acknowledged everything; the journal is gone
        grid.mark_clean(grid.generation());

        let report = projector.project(&mut set, &grid).unwrap();
        assert_eq!(report.kind, ProjectionKind::Rebuilt);
        assert_consistent(&set, &grid);
    }

    #[test]
    fn test_capacity_exceeded_keeps_previous_generation() {
        let mut grid = VoxelGrid::new(16);
        let mut set = RenderInstanceSet::new(2, WorldExtentPolicy::Unbounded);
        let mut projector = InstanceProjector::new();

        grid.add(IVec3::new(0, 0, 0), VoxelColor::ACCENT, None).unwrap();
        projector.project(&mut set, &grid).unwrap();
        let generation = set.generation();

        grid.add(IVec3::new(1, 0, 0), VoxelColor::ACCENT, None).unwrap();
        grid.add(IVec3::new(2, 0, 0), VoxelColor::ACCENT, None).unwrap();

        let err = projector.project(&mut set, &grid).unwrap_err();
        assert!(matches!(err, Error::CapacityExceeded { capacity: 2 }));
        assert_eq!(set.generation(), generation);
        assert_eq!(set.count(), 1);
    }

    #[test]
    fn test_dirty_range_covers_swap_remove() {
        let mut grid = VoxelGrid::new(16);
        let mut set = RenderInstanceSet::new(16, WorldExtentPolicy::Unbounded);
        let mut projector = InstanceProjector::new();

        for x in 0..5 {
            grid.add(IVec3::new(x, 0, 0), VoxelColor::ACCENT, None).unwrap();
        }
        projector.project(&mut set, &grid).unwrap();
        assert_eq!(set.take_dirty_range(), Some(0..5));
        assert_eq!(set.take_dirty_range(), None);

        grid.remove_by_position(IVec3::new(1, 0, 0));
        projector.project(&mut set, &grid).unwrap();
        assert_eq!(set.take_dirty_range(), Some(1..2));
        assert_eq!(set.instances()[1].translation, [4.0, 0.0, 0.0]);

        // Removing the last slot shrinks the count without an upload
        grid.remove_by_position(IVec3::new(3, 0, 0));
        projector.project(&mut set, &grid).unwrap();
        assert_eq!(set.take_dirty_range(), None);
        assert_eq!(set.count(), 3);
    }

    #[test]
    fn test_world_extent_policies() {
        let mut grid = VoxelGrid::new(16);
        let mut projector = InstanceProjector::new();
        let mut unbounded = RenderInstanceSet::new(16, WorldExtentPolicy::Unbounded);
        let mut fit = RenderInstanceSet::new(16, WorldExtentPolicy::FitInstances);

        projector.project(&mut fit, &grid).unwrap();
        assert_eq!(fit.bounds(), BatchBounds::Empty);

        grid.add(IVec3::new(10, 0, -3), VoxelColor::ACCENT, None).unwrap();
        grid.add(IVec3::new(-2, 5, 1), VoxelColor::ACCENT, None).unwrap();
        projector.project(&mut unbounded, &grid).unwrap();
        projector.project(&mut fit, &grid).unwrap();

        assert_eq!(unbounded.bounds(), BatchBounds::Unbounded);
        assert_eq!(
            fit.bounds(),
            BatchBounds::Fit(Aabb::new(Vec3::new(-2.0, 0.0, -3.0), Vec3::new(11.0, 6.0, 2.0)))
        );

        // Far from the origin the fitted bounds still catch the ray
        let ray = Ray::new(Vec3::new(10.5, 0.5, 20.0), Vec3::NEG_Z);
        assert!(fit.bounds().may_hit(&ray, 100.0));
        assert!(!fit.bounds().may_hit(&ray, 5.0));
    }

    #[test]
    fn test_world_extent_policy_serde() {
        let policy: WorldExtentPolicy = serde_json::from_str("\"fit_instances\"").unwrap();
        assert_eq!(policy, WorldExtentPolicy::FitInstances);
        assert_eq!(serde_json::to_string(&WorldExtentPolicy::Unbounded).unwrap(), "\"unbounded\"");
    }
}
