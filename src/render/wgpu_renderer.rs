//! The windowed [`Renderer`] backend.

use std::collections::BTreeMap;
use std::sync::mpsc;

use image::RgbaImage;

use super::mesh_pass::MeshPass;
use super::overlay_pass::OverlayPass;
use super::post_pass::PostPass;
use super::render_target::RenderTarget;
use super::{DrawRequest, DrawTarget, PostEffect, Renderer, TargetId};
use crate::ambient::GlitchFrame;
use crate::error::SnapshotError;
use crate::gpu::GpuContext;
use crate::overlay::OverlayStage;
use crate::resize::ViewportSize;

/// Bytes per pixel of [`TARGET_FORMAT`](super::render_target::TARGET_FORMAT).
const BYTES_PER_PIXEL: u32 = 4;

/// A frame readback waiting for its buffer to map.
struct PendingCapture {
    buffer: wgpu::Buffer,
    receiver: mpsc::Receiver<Result<(), wgpu::BufferAsyncError>>,
    width: u32,
    height: u32,
    padded_row: u32,
}

/// Draws scenes with wgpu and presents them to a window surface.
///
/// Every draw lands in an internal frame target first. Presenting composites
/// that frame, the glitch and the overlay onto the surface texture, which
/// lets captures read the frame without the overlay.
pub struct WgpuRenderer {
    gpu: GpuContext,
    frame: RenderTarget,
    targets: BTreeMap<TargetId, RenderTarget>,
    next_target: u32,
    mesh_pass: MeshPass,
    post_pass: PostPass,
    overlay_pass: OverlayPass,
    capture: Option<PendingCapture>,
}

impl WgpuRenderer {
    pub fn new(gpu: GpuContext) -> Self {
        let (width, height) = (gpu.width(), gpu.height());
        let frame = RenderTarget::new(&gpu, "Frame Target", width, height);
        let mesh_pass = MeshPass::new(&gpu, width, height);
        let post_pass = PostPass::new(&gpu);
        let overlay_pass = OverlayPass::new(&gpu);
        Self {
            gpu,
            frame,
            targets: BTreeMap::new(),
            next_target: 0,
            mesh_pass,
            post_pass,
            overlay_pass,
            capture: None,
        }
    }

    pub fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    fn encoder(&self, label: &str) -> wgpu::CommandEncoder {
        self.gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }

    fn view(&self, target: DrawTarget) -> Option<&wgpu::TextureView> {
        match target {
            DrawTarget::Screen => Some(&self.frame.view),
            DrawTarget::Offscreen(id) => self.targets.get(&id).map(|t| &t.view),
        }
    }

    fn finish_capture(capture: PendingCapture) -> Result<RgbaImage, SnapshotError> {
        let row_bytes = (capture.width * BYTES_PER_PIXEL) as usize;
        let mut pixels = Vec::with_capacity(row_bytes * capture.height as usize);
        {
            let mapped = capture.buffer.slice(..).get_mapped_range();
            for row in mapped.chunks(capture.padded_row as usize) {
                pixels.extend_from_slice(&row[..row_bytes]);
            }
        }
        capture.buffer.unmap();
        RgbaImage::from_raw(capture.width, capture.height, pixels)
            .ok_or_else(|| SnapshotError::Readback("readback size mismatch".to_string()))
    }
}

impl Renderer for WgpuRenderer {
    fn set_size(&mut self, size: ViewportSize) {
        let (width, height) = size.physical();
        self.gpu.resize(width, height);
        self.frame.ensure_size(&self.gpu, width, height);
        for target in self.targets.values_mut() {
            target.ensure_size(&self.gpu, width, height);
        }
    }

    fn size(&self) -> (u32, u32) {
        self.frame.size()
    }

    fn create_target(&mut self, label: &str) -> TargetId {
        self.next_target += 1;
        let id = TargetId(self.next_target);
        let (width, height) = self.frame.size();
        self.targets
            .insert(id, RenderTarget::new(&self.gpu, label, width, height));
        id
    }

    fn release_target(&mut self, id: TargetId) {
        if self.targets.remove(&id).is_none() {
            log::warn!("release of unknown render target {id:?}");
        }
    }

    fn live_targets(&self) -> usize {
        self.targets.len()
    }

    fn draw_scene(&mut self, request: &DrawRequest<'_>) {
        let size = self.frame.size();
        let mut encoder = self.encoder("Scene Encoder");
        let target = match request.target {
            DrawTarget::Screen => &self.frame.view,
            DrawTarget::Offscreen(id) => match self.targets.get(&id) {
                Some(t) => &t.view,
                None => {
                    log::warn!("draw into unknown render target {id:?}");
                    return;
                }
            },
        };
        self.mesh_pass
            .render(&self.gpu, &mut encoder, target, size, request);
        self.gpu.queue.submit(std::iter::once(encoder.finish()));
    }

    fn post_process(&mut self, effect: PostEffect, input: TargetId, output: DrawTarget) {
        if output == DrawTarget::Offscreen(input) {
            log::warn!("post pass cannot read and write {input:?}");
            return;
        }
        let (Some(input_view), Some(output_view)) =
            (self.targets.get(&input).map(|t| &t.view), self.view(output))
        else {
            log::warn!("post pass with unknown target {input:?} -> {output:?}");
            return;
        };
        let mut encoder = self.encoder("Post Encoder");
        self.post_pass.render(
            &self.gpu,
            &mut encoder,
            effect,
            input_view,
            output_view,
            self.frame.size(),
        );
        self.gpu.queue.submit(std::iter::once(encoder.finish()));
    }

    fn request_capture(&mut self) {
        if self.capture.is_some() {
            return;
        }
        let (width, height) = self.frame.size();
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_row = (width * BYTES_PER_PIXEL).div_ceil(align) * align;

        let buffer = self.gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Capture Buffer"),
            size: padded_row as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self.encoder("Capture Encoder");
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.frame.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.gpu.queue.submit(std::iter::once(encoder.finish()));

        let (sender, receiver) = mpsc::channel();
        buffer
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                let _ = sender.send(result);
            });

        self.capture = Some(PendingCapture {
            buffer,
            receiver,
            width,
            height,
            padded_row,
        });
    }

    fn poll_capture(&mut self) -> Option<Result<RgbaImage, SnapshotError>> {
        let pending = self.capture.as_ref()?;
        if let Err(e) = self.gpu.device.poll(wgpu::PollType::Poll) {
            log::warn!("device poll failed: {e}");
        }
        let outcome = match pending.receiver.try_recv() {
            Ok(result) => result.map_err(|e| SnapshotError::Readback(e.to_string())),
            Err(mpsc::TryRecvError::Empty) => return None,
            Err(mpsc::TryRecvError::Disconnected) => Err(SnapshotError::Readback(
                "map callback dropped".to_string(),
            )),
        };
        let capture = self.capture.take()?;
        Some(outcome.and_then(|()| Self::finish_capture(capture)))
    }

    fn present(&mut self, overlay: &OverlayStage, glitch: Option<&GlitchFrame>) {
        let output = match self.gpu.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.gpu.reconfigure();
                return;
            }
            Err(e) => {
                log::warn!("skipping frame: {e}");
                return;
            }
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let size = self.frame.size();
        let mut encoder = self.encoder("Present Encoder");
        self.overlay_pass.render(
            &self.gpu,
            &mut encoder,
            &self.frame.view,
            &view,
            size,
            overlay,
            glitch,
        );
        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        output.present();
    }
}
