//! Fullscreen post effects for compositors.
//!
//! One pipeline serves every [`PostEffect`]; the effect is selected by a
//! mode uniform. Each call reads one target and writes another, so chains
//! ping-pong between targets the compositor owns.

use std::mem::size_of;

use super::PostEffect;
use super::render_target::TARGET_FORMAT;
use super::texture::linear_sampler;
use crate::gpu::GpuContext;

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct PostUniforms {
    resolution: [f32; 2],
    mode: u32,
    time: f32,
    /// Bloom: threshold, strength, radius. Film: grain, vignette.
    params: [f32; 4],
}

const MODE_COPY: u32 = 0;
const MODE_BLOOM: u32 = 1;
const MODE_FILM: u32 = 2;

pub struct PostPass {
    pipeline: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
}

impl PostPass {
    pub fn new(gpu: &GpuContext) -> Self {
        let device = &gpu.device;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Post Shader"),
            source: wgpu::ShaderSource::Wgsl(POST_SHADER.into()),
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Post Uniforms"),
            size: size_of::<PostUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let sampler = linear_sampler(gpu, "Post Sampler");

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Post Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Post Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Post Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: TARGET_FORMAT,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Self {
            pipeline,
            uniform_buffer,
            bind_group_layout,
            sampler,
        }
    }

    fn uniforms(effect: PostEffect, size: (u32, u32)) -> PostUniforms {
        let (mode, time, params) = match effect {
            PostEffect::Copy => (MODE_COPY, 0.0, [0.0; 4]),
            PostEffect::Bloom {
                threshold,
                strength,
                radius,
            } => (MODE_BLOOM, 0.0, [threshold, strength, radius, 0.0]),
            PostEffect::Film {
                grain,
                vignette,
                time,
            } => (MODE_FILM, time, [grain, vignette, 0.0, 0.0]),
        };
        PostUniforms {
            resolution: [size.0 as f32, size.1 as f32],
            mode,
            time,
            params,
        }
    }

    pub fn render(
        &self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        effect: PostEffect,
        input: &wgpu::TextureView,
        output: &wgpu::TextureView,
        size: (u32, u32),
    ) {
        gpu.queue.write_buffer(
            &self.uniform_buffer,
            0,
            bytemuck::bytes_of(&Self::uniforms(effect, size)),
        );

        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Post Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(input),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Post Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: output,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.draw(0..3, 0..1);
    }
}

const POST_SHADER: &str = r#"
struct Uniforms {
    resolution: vec2<f32>,
    mode: u32,
    time: f32,
    params: vec4<f32>,
};

@group(0) @binding(0) var<uniform> u: Uniforms;
@group(0) @binding(1) var t_input: texture_2d<f32>;
@group(0) @binding(2) var s_input: sampler;

@vertex
fn vs(@builtin(vertex_index) vi: u32) -> @builtin(position) vec4<f32> {
    // Fullscreen triangle
    let corner = vec2<f32>(f32((vi << 1u) & 2u), f32(vi & 2u));
    return vec4<f32>(corner * 2.0 - 1.0, 0.0, 1.0);
}

fn hash(p: vec2<f32>) -> f32 {
    return fract(sin(dot(p, vec2<f32>(12.9898, 78.233))) * 43758.5453);
}

fn bloom(uv: vec2<f32>, base: vec3<f32>) -> vec3<f32> {
    let threshold = u.params.x;
    let strength = u.params.y;
    let radius = u.params.z;
    let texel = 1.0 / u.resolution;
    var glow = vec3<f32>(0.0);
    var weight = 0.0;
    for (var ring = 1; ring <= 4; ring++) {
        let r = f32(ring) * (2.0 + radius * 12.0);
        for (var i = 0; i < 8; i++) {
            let angle = f32(i) * 0.785398 + f32(ring) * 0.39;
            let offset = vec2<f32>(cos(angle), sin(angle)) * r * texel;
            let c = textureSampleLevel(t_input, s_input, uv + offset, 0.0).rgb;
            let w = 1.0 / f32(ring);
            glow += max(c - vec3<f32>(threshold), vec3<f32>(0.0)) * w;
            weight += w;
        }
    }
    return base + glow / weight * strength * 4.0;
}

fn film(uv: vec2<f32>, base: vec3<f32>) -> vec3<f32> {
    let grain = (hash(uv * u.resolution + vec2<f32>(u.time * 61.0, u.time * 17.0)) - 0.5) * u.params.x;
    let d = distance(uv, vec2<f32>(0.5));
    let vignette = 1.0 - smoothstep(0.35, 0.85, d) * u.params.y;
    return (base + vec3<f32>(grain)) * vignette;
}

@fragment
fn fs(@builtin(position) pos: vec4<f32>) -> @location(0) vec4<f32> {
    let uv = pos.xy / u.resolution;
    var color = textureSampleLevel(t_input, s_input, uv, 0.0).rgb;
    if (u.mode == 1u) {
        color = bloom(uv, color);
    } else if (u.mode == 2u) {
        color = film(uv, color);
    }
    return vec4<f32>(color, 1.0);
}
"#;
