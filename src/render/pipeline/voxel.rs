//! Instanced voxel render pipeline
//!
//! One shader draws three things: the voxel batch (unit cube mesh x instance
//! buffer), the ground quad and a translucent preview cube at the placement
//! target. The ground and preview each use a one-instance buffer.

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::core::config::GroundConfig;
use crate::core::types::IVec3;
use crate::render::buffer::InstanceBuffer;
use crate::render::buffer::instance_buffer::instance_layout;
use crate::render::instances::InstanceRaw;

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Sky color in linear space (matches `SKY` in voxel.wgsl)
const CLEAR_COLOR: wgpu::Color = wgpu::Color { r: 0.52, g: 0.71, b: 0.92, a: 1.0 };

const GROUND_COLOR: [f32; 4] = [0.36, 0.42, 0.33, 1.0];
const PREVIEW_ALPHA: f32 = 0.35;
/// Ground sits a hair below its plane so cube bottoms do not z-fight with it
const GROUND_OFFSET: f32 = 0.002;

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct Vertex {
    position: [f32; 3],
    normal: [f32; 3],
}

impl Vertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 2] = wgpu::vertex_attr_array![
        0 => Float32x3,
        1 => Float32x3,
    ];

    fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// Unit cube with its minimum corner at the origin, counter-clockwise faces
fn cube_vertices() -> Vec<Vertex> {
    // (normal, four corners in CCW order seen from outside)
    let faces: [([f32; 3], [[f32; 3]; 4]); 6] = [
        ([1.0, 0.0, 0.0], [[1.0, 0.0, 1.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [1.0, 1.0, 1.0]]),
        ([-1.0, 0.0, 0.0], [[0.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 1.0], [0.0, 1.0, 0.0]]),
        ([0.0, 1.0, 0.0], [[0.0, 1.0, 1.0], [1.0, 1.0, 1.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]]),
        ([0.0, -1.0, 0.0], [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 0.0, 1.0], [0.0, 0.0, 1.0]]),
        ([0.0, 0.0, 1.0], [[0.0, 0.0, 1.0], [1.0, 0.0, 1.0], [1.0, 1.0, 1.0], [0.0, 1.0, 1.0]]),
        ([0.0, 0.0, -1.0], [[1.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 1.0, 0.0]]),
    ];

    let mut vertices = Vec::with_capacity(36);
    for (normal, corners) in faces {
        for index in [0, 1, 2, 0, 2, 3] {
            vertices.push(Vertex { position: corners[index], normal });
        }
    }
    vertices
}

/// Square ground quad facing up
fn ground_vertices(ground: GroundConfig) -> Vec<Vertex> {
    let e = ground.half_extent;
    let y = ground.height - GROUND_OFFSET;
    let normal = [0.0, 1.0, 0.0];
    [[-e, y, e], [e, y, e], [e, y, -e], [-e, y, e], [e, y, -e], [-e, y, -e]]
        .into_iter()
        .map(|position| Vertex { position, normal })
        .collect()
}

/// Depth buffer matching the surface size
pub struct DepthTexture {
    view: wgpu::TextureView,
    size: (u32, u32),
}

impl DepthTexture {
    pub fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth_texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { view, size: (width, height) }
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }
}

/// What to draw this frame besides the ground
pub struct FrameDraw<'a> {
    pub instances: &'a InstanceBuffer,
    /// False when the batch bounds are outside the view frustum
    pub draw_batch: bool,
    /// Cell to outline with the preview cube
    pub preview: Option<(IVec3, [f32; 4])>,
}

pub struct VoxelPipeline {
    pipeline: wgpu::RenderPipeline,
    preview_pipeline: wgpu::RenderPipeline,
    cube: wgpu::Buffer,
    cube_vertex_count: u32,
    ground: wgpu::Buffer,
    ground_instance: wgpu::Buffer,
    preview_instance: wgpu::Buffer,
}

impl VoxelPipeline {
    pub fn new(
        device: &wgpu::Device,
        surface_format: wgpu::TextureFormat,
        camera_layout: &wgpu::BindGroupLayout,
        ground: GroundConfig,
    ) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("voxel_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../../shaders/voxel.wgsl").into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("voxel_pipeline_layout"),
            bind_group_layouts: &[camera_layout],
            immediate_size: 0,
        });

        let pipeline = Self::create_pipeline(device, &pipeline_layout, &shader, surface_format, false);
        let preview_pipeline = Self::create_pipeline(device, &pipeline_layout, &shader, surface_format, true);

        let cube_vertices = cube_vertices();
        let cube = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("cube_vertices"),
            contents: bytemuck::cast_slice(&cube_vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let ground_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("ground_vertices"),
            contents: bytemuck::cast_slice(&ground_vertices(ground)),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let ground_instance = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("ground_instance"),
            contents: bytemuck::bytes_of(&InstanceRaw {
                translation: [0.0; 3],
                _pad: 0.0,
                color: GROUND_COLOR,
            }),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let preview_instance = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("preview_instance"),
            size: std::mem::size_of::<InstanceRaw>() as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            pipeline,
            preview_pipeline,
            cube,
            cube_vertex_count: cube_vertices.len() as u32,
            ground: ground_buffer,
            ground_instance,
            preview_instance,
        }
    }

    fn create_pipeline(
        device: &wgpu::Device,
        layout: &wgpu::PipelineLayout,
        shader: &wgpu::ShaderModule,
        surface_format: wgpu::TextureFormat,
        translucent: bool,
    ) -> wgpu::RenderPipeline {
        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(if translucent { "voxel_preview_pipeline" } else { "voxel_pipeline" }),
            layout: Some(layout),
            vertex: wgpu::VertexState {
                module: shader,
                entry_point: Some("vs_main"),
                buffers: &[Vertex::layout(), instance_layout()],
                compilation_options: Default::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                // The ground is seen from below too
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: !translucent,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: translucent.then_some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            multiview_mask: None,
            cache: None,
        })
    }

    /// Record the scene pass
    pub fn render(
        &self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        depth: &DepthTexture,
        camera_bind_group: &wgpu::BindGroup,
        frame: FrameDraw<'_>,
    ) {
        if let Some((cell, color)) = frame.preview {
            let preview = InstanceRaw {
                translation: cell.as_vec3().to_array(),
                _pad: 0.0,
                color: [color[0], color[1], color[2], PREVIEW_ALPHA],
            };
            queue.write_buffer(&self.preview_instance, 0, bytemuck::bytes_of(&preview));
        }

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("voxel_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: depth.view(),
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, camera_bind_group, &[]);

        // Ground
        pass.set_vertex_buffer(0, self.ground.slice(..));
        pass.set_vertex_buffer(1, self.ground_instance.slice(..));
        pass.draw(0..6, 0..1);

        // Voxel batch
        let count = frame.instances.count();
        if frame.draw_batch && count > 0 {
            pass.set_vertex_buffer(0, self.cube.slice(..));
            pass.set_vertex_buffer(1, frame.instances.buffer().slice(..));
            pass.draw(0..self.cube_vertex_count, 0..count);
        }

        if frame.preview.is_some() {
            pass.set_pipeline(&self.preview_pipeline);
            pass.set_vertex_buffer(0, self.cube.slice(..));
            pass.set_vertex_buffer(1, self.preview_instance.slice(..));
            pass.draw(0..self.cube_vertex_count, 0..1);
        }
    }
}
