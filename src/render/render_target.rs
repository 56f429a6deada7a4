//! Offscreen color targets.

use crate::gpu::GpuContext;

/// Format of the frame image and every offscreen target.
///
/// sRGB storage keeps readback bytes directly usable as an `RgbaImage`.
pub const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

/// A texture that passes render into and later passes sample from.
///
/// Targets follow the drawing-buffer size: [`ensure_size`](Self::ensure_size)
/// reallocates when the viewport changed.
pub struct RenderTarget {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    label: String,
    width: u32,
    height: u32,
}

impl RenderTarget {
    pub fn new(gpu: &GpuContext, label: &str, width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            label: label.to_string(),
            width,
            height,
        }
    }

    /// Reallocate if the size changed. Contents are lost on reallocation.
    pub fn ensure_size(&mut self, gpu: &GpuContext, width: u32, height: u32) {
        if self.width != width.max(1) || self.height != height.max(1) {
            let label = std::mem::take(&mut self.label);
            *self = Self::new(gpu, &label, width, height);
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
