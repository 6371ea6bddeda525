use criterion::{criterion_group, criterion_main, Criterion, black_box};

use voxsync::interact::{GroundPlane, RaycastInteractor};
use voxsync::math::Ray;
use voxsync::render::{InstanceProjector, RenderInstanceSet, WorldExtentPolicy};
use voxsync::voxel::{VoxelColor, VoxelGrid, VoxelId};

use glam::{IVec3, Vec3};

const CAPACITY: usize = 100_000;

/// A flat slab of `side * side` voxels with store identities
fn filled_grid(side: i32) -> VoxelGrid {
    let mut grid = VoxelGrid::new(CAPACITY);
    let mut id = 1;
    for x in 0..side {
        for z in 0..side {
            let color = VoxelColor::rgb((x * 7) as u8, 128, (z * 13) as u8);
            // Positions are unique and the slab fits the capacity
            let _ = grid.add(IVec3::new(x, 0, z), color, Some(VoxelId(id)));
            id += 1;
        }
    }
    grid
}

fn projected(grid: &VoxelGrid, projector: &mut InstanceProjector) -> RenderInstanceSet {
    let mut set = RenderInstanceSet::new(CAPACITY, WorldExtentPolicy::FitInstances);
    let _ = projector.rebuild(&mut set, &grid.snapshot());
    set
}

fn bench_incremental_projection(c: &mut Criterion) {
    let mut grid = filled_grid(100);
    let mut projector = InstanceProjector::new();
    let mut set = projected(&grid, &mut projector);
    let cell = IVec3::new(0, 1, 0);

    c.bench_function("project_incremental_10k_add_remove", |b| {
        b.iter(|| {
            let _ = grid.add(black_box(cell), VoxelColor::ACCENT, None);
            if let Ok(report) = projector.project(&mut set, &grid) {
                grid.mark_clean(report.generation);
            }
            grid.remove_by_position(black_box(cell));
            if let Ok(report) = projector.project(&mut set, &grid) {
                grid.mark_clean(report.generation);
            }
        });
    });
}

fn bench_full_rebuild(c: &mut Criterion) {
    let grid = filled_grid(100);
    let snapshot = grid.snapshot();
    let mut projector = InstanceProjector::new();
    let mut set = RenderInstanceSet::new(CAPACITY, WorldExtentPolicy::FitInstances);

    c.bench_function("project_rebuild_10k", |b| {
        b.iter(|| projector.rebuild(&mut set, black_box(&snapshot)));
    });
}

fn bench_pick(c: &mut Criterion) {
    let grid = filled_grid(100);
    let mut projector = InstanceProjector::new();
    let set = projected(&grid, &mut projector);
    let mut interactor = RaycastInteractor::new(200.0, GroundPlane { height: 0.0, half_extent: 500.0 });
    let ray = Ray::new(Vec3::new(50.5, 20.0, 120.0), Vec3::new(0.0, -0.5, -1.0).normalize());

    c.bench_function("pick_10k_instances", |b| {
        b.iter(|| interactor.cast(black_box(&ray), &set, &grid));
    });
}

criterion_group!(benches, bench_incremental_projection, bench_full_rebuild, bench_pick);
criterion_main!(benches);
