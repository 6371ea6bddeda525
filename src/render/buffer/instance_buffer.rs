//! GPU vertex buffer holding the voxel instances

use crate::render::instances::{InstanceRaw, RenderInstanceSet};

const INSTANCE_SIZE: u64 = std::mem::size_of::<InstanceRaw>() as u64;

/// Fixed-size instance buffer mirroring a `RenderInstanceSet`
pub struct InstanceBuffer {
    buffer: wgpu::Buffer,
    capacity: usize,
    /// Instances drawn this frame
    count: u32,
}

impl InstanceBuffer {
    /// Allocate room for `capacity` instances
    pub fn new(device: &wgpu::Device, capacity: usize) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("voxel_instances"),
            size: INSTANCE_SIZE * capacity.max(1) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        log::info!(
            "Instance buffer: {} slots ({} KB)",
            capacity,
            INSTANCE_SIZE * capacity as u64 / 1024
        );

        Self {
            buffer,
            capacity,
            count: 0,
        }
    }

    /// Upload the slots changed since the last call. Returns the bytes written.
    pub fn upload(&mut self, queue: &wgpu::Queue, set: &mut RenderInstanceSet) -> u64 {
        self.count = set.count().min(self.capacity) as u32;

        let Some(range) = set.take_dirty_range() else {
            return 0;
        };
        let end = range.end.min(set.count()).min(self.capacity);
        if range.start >= end {
            return 0;
        }

        let bytes: &[u8] = bytemuck::cast_slice(&set.instances()[range.start..end]);
        queue.write_buffer(&self.buffer, range.start as u64 * INSTANCE_SIZE, bytes);
        log::trace!("Uploaded instance slots {}..{} ({} bytes)", range.start, end, bytes.len());
        bytes.len() as u64
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Vertex layout of `InstanceRaw` at locations 2 and 3
pub fn instance_layout() -> wgpu::VertexBufferLayout<'static> {
    // Spelled out because the color sits after the translation padding
    const ATTRIBUTES: [wgpu::VertexAttribute; 2] = [
        wgpu::VertexAttribute {
            format: wgpu::VertexFormat::Float32x3,
            offset: 0,
            shader_location: 2,
        },
        wgpu::VertexAttribute {
            format: wgpu::VertexFormat::Float32x4,
            offset: 16,
            shader_location: 3,
        },
    ];
    wgpu::VertexBufferLayout {
        array_stride: INSTANCE_SIZE,
        step_mode: wgpu::VertexStepMode::Instance,
        attributes: &ATTRIBUTES,
    }
}
