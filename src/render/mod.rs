//! Rendering system and GPU interfaces

pub mod context;
pub mod buffer;
pub mod pipeline;
pub mod instances;

pub use context::GpuContext;
pub use instances::{
    BatchBounds, InstanceProjector, InstanceRaw, ProjectionKind, ProjectionReport, RenderInstanceSet,
    WorldExtentPolicy,
};
