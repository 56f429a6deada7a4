//! Sampled textures uploaded from CPU images.

use image::{GrayImage, RgbaImage};

use crate::gpu::GpuContext;

/// A GPU texture that can be bound to shaders.
#[derive(Debug)]
pub struct Texture {
    #[allow(dead_code)]
    pub(crate) texture: wgpu::Texture,
    pub(crate) view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

impl Texture {
    fn upload(
        gpu: &GpuContext,
        data: &[u8],
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        label: &str,
    ) -> Self {
        use wgpu::util::DeviceExt;

        let texture = gpu.device.create_texture_with_data(
            &gpu.queue,
            &wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            data,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            texture,
            view,
            width,
            height,
        }
    }

    /// Upload a captured frame. Captures are read back as sRGB bytes.
    pub fn from_rgba(gpu: &GpuContext, image: &RgbaImage, label: &str) -> Self {
        let (width, height) = image.dimensions();
        Self::upload(
            gpu,
            image.as_raw(),
            width,
            height,
            wgpu::TextureFormat::Rgba8UnormSrgb,
            label,
        )
    }

    /// Upload a single-channel mask.
    pub fn from_gray(gpu: &GpuContext, image: &GrayImage, label: &str) -> Self {
        let (width, height) = image.dimensions();
        Self::upload(
            gpu,
            image.as_raw(),
            width,
            height,
            wgpu::TextureFormat::R8Unorm,
            label,
        )
    }

    /// A 1x1 texture for bind slots a layer does not use.
    pub fn placeholder(gpu: &GpuContext, label: &str) -> Self {
        Self::upload(
            gpu,
            &[255, 255, 255, 255],
            1,
            1,
            wgpu::TextureFormat::Rgba8UnormSrgb,
            label,
        )
    }
}

/// Linear, clamped sampler shared by the fullscreen passes.
pub fn linear_sampler(gpu: &GpuContext, label: &str) -> wgpu::Sampler {
    gpu.device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some(label),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    })
}
