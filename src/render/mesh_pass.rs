//! Scene graph rendering with depth testing, lighting and fog.
//!
//! The mesh pass draws a flattened [`SceneGraph`](crate::scene_graph::SceneGraph)
//! in two sweeps: opaque nodes in tree order with depth writes, then
//! translucent nodes sorted back to front with depth writes off.
//!
//! # Bind groups
//!
//! - **Group 0**: frame uniforms (view-projection, camera position, fog,
//!   light rig, tone mapping)
//! - **Group 1**: model uniforms, one slot per draw item, addressed with a
//!   dynamic offset

use std::collections::HashMap;
use std::mem::size_of;

use glam::Vec3;

use super::render_target::TARGET_FORMAT;
use super::{DrawRequest, ToneMapping};
use crate::gpu::GpuContext;
use crate::mesh::{Mesh, Shape, Vertex3d};
use crate::scene_graph::DrawItem;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Per-frame uniforms shared by every draw.
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct FrameUniforms {
    view_proj: [[f32; 4]; 4],
    /// xyz: camera position, w: elapsed seconds.
    camera_pos: [f32; 4],
    /// rgb: fog color, w: density (0 disables fog).
    fog: [f32; 4],
    /// rgb: sky color, w: hemisphere intensity.
    sky: [f32; 4],
    ground: [f32; 4],
    /// xyz: direction toward the sun, w: intensity.
    sun_dir: [f32; 4],
    sun_color: [f32; 4],
    /// x: exposure, y: 1 for ACES.
    grading: [f32; 4],
}

/// Per-draw uniforms.
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct ModelUniforms {
    model: [[f32; 4]; 4],
    normal_matrix: [[f32; 4]; 4],
    color: [f32; 4],
    /// x: emissive, y: 1 if fogged.
    params: [f32; 4],
}

pub struct MeshPass {
    opaque_pipeline: wgpu::RenderPipeline,
    transparent_pipeline: wgpu::RenderPipeline,
    frame_buffer: wgpu::Buffer,
    frame_bind_group: wgpu::BindGroup,
    model_layout: wgpu::BindGroupLayout,
    model_buffer: wgpu::Buffer,
    model_bind_group: wgpu::BindGroup,
    model_capacity: u64,
    model_stride: u64,
    depth_view: wgpu::TextureView,
    depth_size: (u32, u32),
    meshes: HashMap<Shape, Mesh>,
}

impl MeshPass {
    pub fn new(gpu: &GpuContext, width: u32, height: u32) -> Self {
        let device = &gpu.device;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Mesh Shader"),
            source: wgpu::ShaderSource::Wgsl(MESH_SHADER.into()),
        });

        let frame_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Mesh Frame Uniforms"),
            size: size_of::<FrameUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let frame_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Mesh Frame Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let frame_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Mesh Frame Bind Group"),
            layout: &frame_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: frame_buffer.as_entire_binding(),
            }],
        });

        let model_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Mesh Model Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(size_of::<ModelUniforms>() as u64),
                },
                count: None,
            }],
        });

        let alignment = device.limits().min_uniform_buffer_offset_alignment as u64;
        let model_stride = (size_of::<ModelUniforms>() as u64).div_ceil(alignment) * alignment;
        let model_capacity = 64;
        let (model_buffer, model_bind_group) =
            Self::create_model_buffer(gpu, &model_layout, model_stride, model_capacity);

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Mesh Pipeline Layout"),
            bind_group_layouts: &[&frame_layout, &model_layout],
            push_constant_ranges: &[],
        });

        let make_pipeline = |label: &str, depth_write_enabled: bool| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs"),
                    buffers: &[Vertex3d::LAYOUT],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some("fs"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: TARGET_FORMAT,
                        blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                // Planes and rings are seen from both sides.
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    cull_mode: None,
                    front_face: wgpu::FrontFace::Ccw,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        };

        let opaque_pipeline = make_pipeline("Mesh Opaque Pipeline", true);
        let transparent_pipeline = make_pipeline("Mesh Transparent Pipeline", false);

        let depth_view = Self::create_depth_view(gpu, width, height);

        let meshes = Shape::ALL
            .into_iter()
            .map(|shape| (shape, Mesh::new(gpu, &shape.mesh_data())))
            .collect();

        Self {
            opaque_pipeline,
            transparent_pipeline,
            frame_buffer,
            frame_bind_group,
            model_layout,
            model_buffer,
            model_bind_group,
            model_capacity,
            model_stride,
            depth_view,
            depth_size: (width.max(1), height.max(1)),
            meshes,
        }
    }

    fn create_model_buffer(
        gpu: &GpuContext,
        layout: &wgpu::BindGroupLayout,
        stride: u64,
        capacity: u64,
    ) -> (wgpu::Buffer, wgpu::BindGroup) {
        let buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Mesh Model Uniforms"),
            size: stride * capacity,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Mesh Model Bind Group"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(size_of::<ModelUniforms>() as u64),
                }),
            }],
        });
        (buffer, bind_group)
    }

    fn create_depth_view(gpu: &GpuContext, width: u32, height: u32) -> wgpu::TextureView {
        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Mesh Depth Texture"),
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
        texture.create_view(&wgpu::TextureViewDescriptor::default())
    }

    fn ensure_depth_size(&mut self, gpu: &GpuContext, width: u32, height: u32) {
        let size = (width.max(1), height.max(1));
        if self.depth_size != size {
            self.depth_view = Self::create_depth_view(gpu, size.0, size.1);
            self.depth_size = size;
        }
    }

    fn ensure_model_capacity(&mut self, gpu: &GpuContext, count: u64) {
        if count <= self.model_capacity {
            return;
        }
        let capacity = count.next_power_of_two();
        log::debug!("growing mesh model buffer to {capacity} slots");
        let (buffer, bind_group) =
            Self::create_model_buffer(gpu, &self.model_layout, self.model_stride, capacity);
        self.model_buffer = buffer;
        self.model_bind_group = bind_group;
        self.model_capacity = capacity;
    }

    fn frame_uniforms(request: &DrawRequest<'_>) -> FrameUniforms {
        let state = request.state;
        let camera = request.camera;
        let lights = &state.lighting;
        let sky = lights.sky.to_linear();
        let ground = lights.ground.to_linear();
        let sun = lights.sun_color.to_linear();
        let sun_dir = lights.sun_position.normalize_or(Vec3::Y);
        let (fog_color, fog_density) = match state.fog {
            Some(fog) => (fog.color.to_linear(), fog.density),
            None => (crate::color::Color::BLACK, 0.0),
        };
        let aces = match state.tone_mapping {
            ToneMapping::Aces => 1.0,
            ToneMapping::None => 0.0,
        };

        FrameUniforms {
            view_proj: camera.view_projection().to_cols_array_2d(),
            camera_pos: camera.position.extend(request.time).to_array(),
            fog: [fog_color.r, fog_color.g, fog_color.b, fog_density],
            sky: [sky.r, sky.g, sky.b, lights.hemisphere_intensity],
            ground: [ground.r, ground.g, ground.b, 0.0],
            sun_dir: sun_dir.extend(lights.sun_intensity).to_array(),
            sun_color: [sun.r, sun.g, sun.b, 0.0],
            grading: [state.exposure, aces, 0.0, 0.0],
        }
    }

    fn model_uniforms(item: &DrawItem) -> ModelUniforms {
        let color = item.visual.color.to_linear();
        ModelUniforms {
            model: item.world.to_cols_array_2d(),
            normal_matrix: item.world.inverse().transpose().to_cols_array_2d(),
            color: [color.r, color.g, color.b, item.visual.opacity.clamp(0.0, 1.0)],
            params: [
                item.visual.emissive,
                if item.visual.fog { 1.0 } else { 0.0 },
                0.0,
                0.0,
            ],
        }
    }

    /// Record the scene into `target`, clearing it first.
    pub fn render(
        &mut self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        size: (u32, u32),
        request: &DrawRequest<'_>,
    ) {
        self.ensure_depth_size(gpu, size.0, size.1);

        let items = request.graph.draw_list();
        let (mut transparent, opaque): (Vec<DrawItem>, Vec<DrawItem>) = items
            .into_iter()
            .partition(|item| item.visual.is_transparent());
        let eye = request.camera.position;
        transparent.sort_by(|a, b| {
            let da = a.world.w_axis.truncate().distance_squared(eye);
            let db = b.world.w_axis.truncate().distance_squared(eye);
            db.total_cmp(&da)
        });

        self.ensure_model_capacity(gpu, (opaque.len() + transparent.len()) as u64);

        gpu.queue.write_buffer(
            &self.frame_buffer,
            0,
            bytemuck::bytes_of(&Self::frame_uniforms(request)),
        );
        let ordered: Vec<&DrawItem> = opaque.iter().chain(transparent.iter()).collect();
        for (slot, item) in ordered.iter().enumerate() {
            gpu.queue.write_buffer(
                &self.model_buffer,
                slot as u64 * self.model_stride,
                bytemuck::bytes_of(&Self::model_uniforms(item)),
            );
        }

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Mesh Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(request.state.clear_color.to_wgpu()),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        pass.set_bind_group(0, &self.frame_bind_group, &[]);
        for (slot, item) in ordered.iter().enumerate() {
            if slot == opaque.len() {
                pass.set_pipeline(&self.transparent_pipeline);
            } else if slot == 0 {
                pass.set_pipeline(&self.opaque_pipeline);
            }
            let Some(mesh) = self.meshes.get(&item.visual.shape) else {
                continue;
            };
            let offset = (slot as u64 * self.model_stride) as u32;
            pass.set_bind_group(1, &self.model_bind_group, &[offset]);
            pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
            pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..mesh.index_count, 0, 0..1);
        }
    }
}

const MESH_SHADER: &str = r#"
struct Frame {
    view_proj: mat4x4<f32>,
    camera_pos: vec4<f32>,
    fog: vec4<f32>,
    sky: vec4<f32>,
    ground: vec4<f32>,
    sun_dir: vec4<f32>,
    sun_color: vec4<f32>,
    grading: vec4<f32>,
};

struct Model {
    model: mat4x4<f32>,
    normal_matrix: mat4x4<f32>,
    color: vec4<f32>,
    params: vec4<f32>,
};

@group(0) @binding(0) var<uniform> frame: Frame;
@group(1) @binding(0) var<uniform> model: Model;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
};

struct VertexOutput {
    @builtin(position) clip: vec4<f32>,
    @location(0) world_pos: vec3<f32>,
    @location(1) normal: vec3<f32>,
};

@vertex
fn vs(in: VertexInput) -> VertexOutput {
    let world = model.model * vec4<f32>(in.position, 1.0);
    var out: VertexOutput;
    out.clip = frame.view_proj * world;
    out.world_pos = world.xyz;
    out.normal = (model.normal_matrix * vec4<f32>(in.normal, 0.0)).xyz;
    return out;
}

fn aces(x: vec3<f32>) -> vec3<f32> {
    let a = 2.51;
    let b = 0.03;
    let c = 2.43;
    let d = 0.59;
    let e = 0.14;
    return clamp((x * (a * x + b)) / (x * (c * x + d) + e), vec3<f32>(0.0), vec3<f32>(1.0));
}

@fragment
fn fs(in: VertexOutput, @builtin(front_facing) front: bool) -> @location(0) vec4<f32> {
    var n = normalize(in.normal);
    if (!front) {
        n = -n;
    }

    let hemi = mix(frame.ground.rgb, frame.sky.rgb, n.y * 0.5 + 0.5) * frame.sky.w;
    let diffuse = max(dot(n, normalize(frame.sun_dir.xyz)), 0.0) * frame.sun_color.rgb * frame.sun_dir.w;
    var color = model.color.rgb * (hemi + diffuse) + model.color.rgb * model.params.x;

    if (frame.grading.y > 0.5) {
        color = aces(color * frame.grading.x);
    }

    if (model.params.y > 0.5 && frame.fog.w > 0.0) {
        let dist = distance(in.world_pos, frame.camera_pos.xyz);
        let amount = 1.0 - exp(-frame.fog.w * frame.fog.w * dist * dist);
        color = mix(color, frame.fog.rgb, clamp(amount, 0.0, 1.0));
    }

    return vec4<f32>(color, model.color.a);
}
"#;
