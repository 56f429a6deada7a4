//! Final composite: frame image, glitch, then transition overlay layers.
//!
//! The base draw copies the frame image to the surface, applying the
//! pointer glitch jolt when one is active. Each overlay layer is then
//! alpha-blended on top with its own uniforms. Snapshot and mask textures are
//! uploaded once per image id and evicted when no layer references them.

use std::collections::{HashMap, HashSet};
use std::mem::size_of;

use wgpu::util::DeviceExt;

use super::texture::{Texture, linear_sampler};
use crate::ambient::GlitchFrame;
use crate::gpu::GpuContext;
use crate::overlay::{LayerKind, OverlayLayer, OverlayStage, SnapshotEffect};

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct OverlayUniforms {
    resolution: [f32; 2],
    mode: u32,
    opacity: f32,
    color: [f32; 4],
    params0: [f32; 4],
    params1: [f32; 4],
}

const MODE_BASE: u32 = 0;
const MODE_SOLID: u32 = 1;
const MODE_SNAPSHOT: u32 = 2;
const MODE_CHANNEL_SPLIT: u32 = 3;
const MODE_DISSOLVE: u32 = 4;
const MODE_WIPE: u32 = 5;
const MODE_RIPPLE: u32 = 6;

impl OverlayUniforms {
    fn new(size: (u32, u32), mode: u32, opacity: f32) -> Self {
        Self {
            resolution: [size.0 as f32, size.1 as f32],
            mode,
            opacity,
            color: [0.0; 4],
            params0: [0.0; 4],
            params1: [0.0; 4],
        }
    }
}

pub struct OverlayPass {
    base_pipeline: wgpu::RenderPipeline,
    layer_pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    placeholder: Texture,
    textures: HashMap<u64, Texture>,
}

impl OverlayPass {
    pub fn new(gpu: &GpuContext) -> Self {
        let device = &gpu.device;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Overlay Shader"),
            source: wgpu::ShaderSource::Wgsl(OVERLAY_SHADER.into()),
        });

        let texture_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Overlay Bind Group Layout"),
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
                // Image
                texture_entry(1),
                // Mask
                texture_entry(2),
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Overlay Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let make_pipeline = |label: &str, entry_point: &str, blend: wgpu::BlendState| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs"),
                    buffers: &[],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some(entry_point),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: gpu.config.format,
                        blend: Some(blend),
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
            })
        };

        let base_pipeline =
            make_pipeline("Overlay Base Pipeline", "fs_base", wgpu::BlendState::REPLACE);
        let layer_pipeline = make_pipeline(
            "Overlay Layer Pipeline",
            "fs_layer",
            wgpu::BlendState::ALPHA_BLENDING,
        );

        Self {
            base_pipeline,
            layer_pipeline,
            bind_group_layout,
            sampler: linear_sampler(gpu, "Overlay Sampler"),
            placeholder: Texture::placeholder(gpu, "Overlay Placeholder"),
            textures: HashMap::new(),
        }
    }

    /// Upload textures the stage references and evict the rest.
    fn sync_textures(&mut self, gpu: &GpuContext, overlay: &OverlayStage) {
        let mut live = HashSet::new();
        for layer in overlay.drawn() {
            let LayerKind::Snapshot { image, effect } = &layer.kind else {
                continue;
            };
            live.insert(image.id());
            self.textures
                .entry(image.id())
                .or_insert_with(|| Texture::from_rgba(gpu, image.image(), "Overlay Snapshot"));

            if let SnapshotEffect::Dissolve { mask, .. } | SnapshotEffect::Wipe { mask, .. } =
                effect
            {
                live.insert(mask.id());
                self.textures
                    .entry(mask.id())
                    .or_insert_with(|| Texture::from_gray(gpu, mask.pixels(), "Overlay Mask"));
            }
        }
        self.textures.retain(|id, _| live.contains(id));
    }

    fn layer_uniforms(layer: &OverlayLayer, size: (u32, u32)) -> Option<OverlayUniforms> {
        let uniforms = match &layer.kind {
            LayerKind::CameraPunch { .. } => return None,
            LayerKind::Solid { color } => {
                let c = color.to_linear();
                OverlayUniforms {
                    color: c.to_array(),
                    ..OverlayUniforms::new(size, MODE_SOLID, layer.opacity)
                }
            }
            LayerKind::Snapshot { effect, .. } => match effect {
                SnapshotEffect::Plain => OverlayUniforms::new(size, MODE_SNAPSHOT, layer.opacity),
                SnapshotEffect::ChannelSplit { offset } => OverlayUniforms {
                    params0: [offset.x, offset.y, 0.0, 0.0],
                    ..OverlayUniforms::new(size, MODE_CHANNEL_SPLIT, layer.opacity)
                },
                SnapshotEffect::Dissolve {
                    threshold,
                    softness,
                    ..
                } => OverlayUniforms {
                    params0: [*threshold, *softness, 0.0, 0.0],
                    ..OverlayUniforms::new(size, MODE_DISSOLVE, layer.opacity)
                },
                SnapshotEffect::Wipe {
                    direction,
                    progress,
                    softness,
                    ..
                } => {
                    let dir = direction.try_normalize().unwrap_or(glam::Vec2::X);
                    OverlayUniforms {
                        params0: [dir.x, dir.y, *progress, *softness],
                        ..OverlayUniforms::new(size, MODE_WIPE, layer.opacity)
                    }
                }
                SnapshotEffect::Ripple {
                    center,
                    radius,
                    amplitude,
                    width,
                } => OverlayUniforms {
                    params0: [center.x, center.y, *radius, *amplitude],
                    params1: [*width, 0.0, 0.0, 0.0],
                    ..OverlayUniforms::new(size, MODE_RIPPLE, layer.opacity)
                },
            },
        };
        Some(uniforms)
    }

    fn bind_group(
        &self,
        gpu: &GpuContext,
        uniforms: &OverlayUniforms,
        image: &wgpu::TextureView,
        mask: &wgpu::TextureView,
    ) -> wgpu::BindGroup {
        let buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Overlay Uniforms"),
                contents: bytemuck::bytes_of(uniforms),
                usage: wgpu::BufferUsages::UNIFORM,
            });
        gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Overlay Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(image),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(mask),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn render(
        &mut self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        frame: &wgpu::TextureView,
        target: &wgpu::TextureView,
        size: (u32, u32),
        overlay: &OverlayStage,
        glitch: Option<&GlitchFrame>,
    ) {
        self.sync_textures(gpu, overlay);

        let mut base = OverlayUniforms::new(size, MODE_BASE, 1.0);
        if let Some(g) = glitch {
            base.params0 = [
                g.offset.x,
                g.offset.y,
                g.skew_degrees.to_radians(),
                g.hue_degrees.to_radians(),
            ];
            base.params1 = [g.overlay_shift.x, g.overlay_shift.y, g.overlay_alpha, 0.0];
        }
        let base_group = self.bind_group(gpu, &base, frame, &self.placeholder.view);

        let mut layer_groups = Vec::new();
        for layer in overlay.drawn() {
            let Some(uniforms) = Self::layer_uniforms(layer, size) else {
                continue;
            };
            let (image, mask) = match &layer.kind {
                LayerKind::Snapshot { image, effect } => {
                    let mask_id = match effect {
                        SnapshotEffect::Dissolve { mask, .. } | SnapshotEffect::Wipe { mask, .. } => {
                            Some(mask.id())
                        }
                        _ => None,
                    };
                    (Some(image.id()), mask_id)
                }
                _ => (None, None),
            };
            let view_of = |id: Option<u64>| {
                id.and_then(|id| self.textures.get(&id))
                    .map(|t| &t.view)
                    .unwrap_or(&self.placeholder.view)
            };
            layer_groups.push(self.bind_group(gpu, &uniforms, view_of(image), view_of(mask)));
        }

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Overlay Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
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

        pass.set_pipeline(&self.base_pipeline);
        pass.set_bind_group(0, &base_group, &[]);
        pass.draw(0..3, 0..1);

        pass.set_pipeline(&self.layer_pipeline);
        for group in &layer_groups {
            pass.set_bind_group(0, group, &[]);
            pass.draw(0..3, 0..1);
        }
    }
}

// Sized so the uniform block stays 16-byte aligned.
const _: () = assert!(size_of::<OverlayUniforms>() % 16 == 0);

const OVERLAY_SHADER: &str = r#"
struct Uniforms {
    resolution: vec2f,
    mode: u32,
    opacity: f32,
    color: vec4f,
    p0: vec4f,
    p1: vec4f,
}

@group(0) @binding(0) var<uniform> u: Uniforms;
@group(0) @binding(1) var t_image: texture_2d<f32>;
@group(0) @binding(2) var t_mask: texture_2d<f32>;
@group(0) @binding(3) var s_linear: sampler;

@vertex
fn vs(@builtin(vertex_index) vi: u32) -> @builtin(position) vec4f {
    // Fullscreen triangle
    let corner = vec2f(f32((vi << 1u) & 2u), f32(vi & 2u));
    return vec4f(corner * 2.0 - 1.0, 0.0, 1.0);
}

fn image(uv: vec2f) -> vec3f {
    return textureSampleLevel(t_image, s_linear, uv, 0.0).rgb;
}

fn mask(uv: vec2f) -> f32 {
    return textureSampleLevel(t_mask, s_linear, uv, 0.0).r;
}

fn hue_rotate(c: vec3f, angle: f32) -> vec3f {
    let k = vec3f(0.57735);
    let ca = cos(angle);
    return c * ca + cross(k, c) * sin(angle) + k * dot(k, c) * (1.0 - ca);
}

@fragment
fn fs_base(@builtin(position) pos: vec4f) -> @location(0) vec4f {
    // Canvas jolt: translate by p0.xy, skew horizontally by p0.z about the centre.
    let half = u.resolution * 0.5;
    let c = pos.xy - half - u.p0.xy;
    let skewed = vec2f(c.x - tan(u.p0.z) * c.y, c.y);
    let uv = (skewed + half) / u.resolution;

    var color = vec3f(0.0);
    if (all(uv >= vec2f(0.0)) && all(uv <= vec2f(1.0))) {
        color = image(uv);
    }

    // Hue-shifted ghost, offset by p1.xy.
    if (u.p1.z > 0.0) {
        let ghost_uv = clamp((pos.xy - u.p1.xy) / u.resolution, vec2f(0.0), vec2f(1.0));
        let ghost = hue_rotate(image(ghost_uv), u.p0.w);
        color = mix(color, ghost, u.p1.z * 0.35);
    }

    return vec4f(color, 1.0);
}

@fragment
fn fs_layer(@builtin(position) pos: vec4f) -> @location(0) vec4f {
    let uv = pos.xy / u.resolution;
    var rgb = vec3f(0.0);
    var alpha = u.opacity;

    switch u.mode {
        case 1u: {
            rgb = u.color.rgb;
            alpha = alpha * u.color.a;
        }
        case 3u: {
            let offset = u.p0.xy / u.resolution;
            rgb = vec3f(image(uv + offset).r, image(uv).g, image(uv - offset).b);
        }
        case 4u: {
            rgb = image(uv);
            alpha = alpha * smoothstep(u.p0.x - u.p0.y, u.p0.x + u.p0.y, mask(uv));
        }
        case 5u: {
            let dir = u.p0.xy;
            let soft = u.p0.w;
            let span = abs(dir.x) + abs(dir.y);
            let along = dot(uv - vec2f(0.5), dir) / span + 0.5;
            let s = along - mask(uv) * 0.25;
            let edge = (-0.25 - soft) + (1.25 + 2.0 * soft) * clamp(u.p0.z, 0.0, 1.0);
            rgb = image(uv);
            alpha = alpha * smoothstep(edge - soft, edge + soft, s);
        }
        case 6u: {
            let aspect = u.resolution.x / u.resolution.y;
            var d = uv - u.p0.xy;
            d.x = d.x * aspect;
            let dist = length(d);
            let band = 1.0 - smoothstep(0.0, u.p1.x, abs(dist - u.p0.z));
            let dir = d / max(dist, 1e-4);
            var disp = dir * band * u.p0.w;
            disp.x = disp.x / aspect;
            rgb = image(uv - disp);
        }
        default: {
            rgb = image(uv);
        }
    }

    return vec4f(rgb, alpha);
}
"#;
