//! A renderer that draws nothing and remembers everything.
//!
//! [`HeadlessRenderer`] records each [`Renderer`] call tagged with the frame
//! it happened in. Tests use it to check draw counts per frame, resize
//! application, and post pass ordering without a GPU. Captures return a
//! synthetic image derived from the last screen draw, so two different
//! scenes produce two different snapshots.

use std::collections::BTreeMap;

use image::{Rgba, RgbaImage};

use super::{DrawPair, DrawRequest, DrawTarget, PostEffect, Renderer, TargetId};
use crate::ambient::GlitchFrame;
use crate::color::Color;
use crate::error::SnapshotError;
use crate::overlay::OverlayStage;
use crate::resize::ViewportSize;

#[derive(Clone, Debug, PartialEq)]
pub enum RenderCall {
    SetSize {
        width: u32,
        height: u32,
    },
    DrawScene {
        pair: DrawPair,
        target: DrawTarget,
        items: usize,
        fov: f32,
    },
    PostProcess {
        effect: PostEffect,
        input: TargetId,
        output: DrawTarget,
    },
    Capture,
    Present {
        layers: usize,
        glitch: bool,
    },
}

#[derive(Clone, Copy, Debug, Default)]
struct ScreenState {
    clear: Color,
    items: usize,
}

pub struct HeadlessRenderer {
    width: u32,
    height: u32,
    frame: u64,
    calls: Vec<(u64, RenderCall)>,
    targets: BTreeMap<TargetId, String>,
    contents: BTreeMap<TargetId, ScreenState>,
    next_target: u32,
    screen: ScreenState,
    capture_pending: Option<ScreenState>,
    capture_requests: usize,
    stall: bool,
    fail: bool,
}

impl HeadlessRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            frame: 0,
            calls: Vec::new(),
            targets: BTreeMap::new(),
            contents: BTreeMap::new(),
            next_target: 0,
            screen: ScreenState::default(),
            capture_pending: None,
            capture_requests: 0,
            stall: false,
            fail: false,
        }
    }

    /// Hold captures in flight until switched off again.
    pub fn stall_captures(&mut self, stall: bool) {
        self.stall = stall;
    }

    /// Deliver readback errors instead of images.
    pub fn fail_captures(&mut self, fail: bool) {
        self.fail = fail;
    }

    /// Index of the frame being recorded. Advances on every present.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn calls(&self) -> &[(u64, RenderCall)] {
        &self.calls
    }

    pub fn calls_in_frame(&self, frame: u64) -> impl Iterator<Item = &RenderCall> {
        self.calls
            .iter()
            .filter(move |(f, _)| *f == frame)
            .map(|(_, call)| call)
    }

    /// Screen draws of the primary scene/camera pair in one frame.
    pub fn primary_draws(&self, frame: u64) -> usize {
        self.calls_in_frame(frame)
            .filter(|call| {
                matches!(
                    call,
                    RenderCall::DrawScene {
                        pair,
                        target: DrawTarget::Screen,
                        ..
                    } if pair.is_primary()
                )
            })
            .count()
    }

    /// Every size applied, in order.
    pub fn applied_sizes(&self) -> Vec<(u32, u32)> {
        self.calls
            .iter()
            .filter_map(|(_, call)| match call {
                RenderCall::SetSize { width, height } => Some((*width, *height)),
                _ => None,
            })
            .collect()
    }

    pub fn presented_frames(&self) -> usize {
        self.calls
            .iter()
            .filter(|(_, call)| matches!(call, RenderCall::Present { .. }))
            .count()
    }

    pub fn capture_requests(&self) -> usize {
        self.capture_requests
    }

    pub fn target_labels(&self) -> Vec<&str> {
        self.targets.values().map(String::as_str).collect()
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    fn record(&mut self, call: RenderCall) {
        self.calls.push((self.frame, call));
    }

    fn synthesize(&self, state: ScreenState) -> RgbaImage {
        let base = state.clear.to_array();
        let tint = (state.items as f32 * 0.07).fract();
        RgbaImage::from_fn(self.width, self.height, |x, y| {
            let u = x as f32 / self.width as f32;
            let v = y as f32 / self.height as f32;
            let to_byte = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
            Rgba([
                to_byte(base[0] + u * 0.5 + tint),
                to_byte(base[1] + v * 0.5),
                to_byte(base[2] + (1.0 - u) * 0.25 + tint * 0.5),
                255,
            ])
        })
    }
}

impl Renderer for HeadlessRenderer {
    fn set_size(&mut self, size: ViewportSize) {
        let (width, height) = size.physical();
        self.width = width;
        self.height = height;
        self.record(RenderCall::SetSize { width, height });
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn create_target(&mut self, label: &str) -> TargetId {
        self.next_target += 1;
        let id = TargetId(self.next_target);
        self.targets.insert(id, label.to_string());
        id
    }

    fn release_target(&mut self, id: TargetId) {
        self.contents.remove(&id);
        if self.targets.remove(&id).is_none() {
            log::warn!("release of unknown render target {id:?}");
        }
    }

    fn live_targets(&self) -> usize {
        self.targets.len()
    }

    fn draw_scene(&mut self, request: &DrawRequest<'_>) {
        let items = request.graph.draw_list().len();
        let state = ScreenState {
            clear: request.state.clear_color,
            items,
        };
        match request.target {
            DrawTarget::Screen => self.screen = state,
            DrawTarget::Offscreen(id) => {
                self.contents.insert(id, state);
            }
        }
        self.record(RenderCall::DrawScene {
            pair: request.pair,
            target: request.target,
            items,
            fov: request.camera.fov,
        });
    }

    fn post_process(&mut self, effect: PostEffect, input: TargetId, output: DrawTarget) {
        if !self.targets.contains_key(&input) {
            log::warn!("post pass reads unknown target {input:?}");
        }
        // Post passes carry the input's contents through to the output.
        let carried = self.contents.get(&input).copied().unwrap_or_default();
        match output {
            DrawTarget::Screen => self.screen = carried,
            DrawTarget::Offscreen(id) => {
                self.contents.insert(id, carried);
            }
        }
        self.record(RenderCall::PostProcess {
            effect,
            input,
            output,
        });
    }

    fn request_capture(&mut self) {
        self.capture_requests += 1;
        self.capture_pending = Some(self.screen);
        self.record(RenderCall::Capture);
    }

    fn poll_capture(&mut self) -> Option<Result<RgbaImage, SnapshotError>> {
        if self.stall {
            return None;
        }
        let state = self.capture_pending.take()?;
        if self.fail {
            return Some(Err(SnapshotError::Readback(
                "headless capture disabled".to_string(),
            )));
        }
        Some(Ok(self.synthesize(state)))
    }

    fn present(&mut self, overlay: &OverlayStage, glitch: Option<&GlitchFrame>) {
        self.record(RenderCall::Present {
            layers: overlay.drawn().count(),
            glitch: glitch.is_some(),
        });
        self.frame += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn present_advances_the_frame() {
        let mut renderer = HeadlessRenderer::new(32, 32);
        renderer.present(&OverlayStage::new(), None);
        renderer.present(&OverlayStage::new(), None);
        assert_eq!(renderer.frame(), 2);
        assert_eq!(renderer.presented_frames(), 2);
    }

    #[test]
    fn targets_are_tracked() {
        let mut renderer = HeadlessRenderer::new(32, 32);
        let a = renderer.create_target("bloom");
        let _b = renderer.create_target("film");
        assert_eq!(renderer.live_targets(), 2);
        renderer.release_target(a);
        assert_eq!(renderer.target_labels(), vec!["film"]);
    }

    #[test]
    fn set_size_uses_physical_pixels() {
        let mut renderer = HeadlessRenderer::new(1, 1);
        renderer.set_size(ViewportSize::new(400.0, 300.0, 2.0));
        assert_eq!(renderer.size(), (800, 600));
        assert_eq!(renderer.applied_sizes(), vec![(800, 600)]);
    }

    #[test]
    fn failing_capture_reports_readback_error() {
        let mut renderer = HeadlessRenderer::new(4, 4);
        renderer.fail_captures(true);
        renderer.request_capture();
        assert!(matches!(
            renderer.poll_capture(),
            Some(Err(SnapshotError::Readback(_)))
        ));
        assert!(renderer.poll_capture().is_none());
    }
}
