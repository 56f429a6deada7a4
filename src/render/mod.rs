//! The drawing seam between the host and a graphics backend.
//!
//! The host never talks to wgpu directly. Everything it needs from a backend
//! is the [`Renderer`] trait: resize the drawing buffer, draw the scene graph
//! through a camera into the screen or an offscreen target, run a fullscreen
//! post effect, read the last frame back, and present the frame with the
//! transition overlay on top.
//!
//! Two backends implement it:
//!
//! - [`WgpuRenderer`] draws into a window surface.
//! - [`HeadlessRenderer`] records every call and synthesises capture pixels.
//!   Tests and `--headless` runs use it.
//!
//! "Screen" means the backend's frame image, not the swapchain: the overlay
//! is composited only at [`Renderer::present`], so frame captures never
//! contain overlay layers.

mod headless;
mod mesh_pass;
mod overlay_pass;
mod post_pass;
mod render_target;
mod texture;
mod wgpu_renderer;

pub use headless::{HeadlessRenderer, RenderCall};
pub use wgpu_renderer::WgpuRenderer;

use glam::Vec3;
use image::RgbaImage;

use crate::ambient::GlitchFrame;
use crate::camera::Camera;
use crate::color::Color;
use crate::error::SnapshotError;
use crate::overlay::OverlayStage;
use crate::resize::ViewportSize;
use crate::scene_graph::SceneGraph;

/// Handle to an offscreen render target owned by a renderer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(pub(crate) u32);

/// Where a draw or post pass writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrawTarget {
    /// The frame image that is presented.
    Screen,
    Offscreen(TargetId),
}

/// Identifies which scene graph a draw renders.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SceneKey(pub u32);

/// Identifies which camera a draw renders through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CameraKey(pub u32);

/// The scene/camera pair a draw call is for.
///
/// The host issues exactly one draw per frame for [`DrawPair::PRIMARY`].
/// Compositors may draw other pairs as sub-passes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DrawPair {
    pub scene: SceneKey,
    pub camera: CameraKey,
}

impl DrawPair {
    pub const PRIMARY: DrawPair = DrawPair {
        scene: SceneKey(0),
        camera: CameraKey(0),
    };

    pub fn is_primary(&self) -> bool {
        *self == Self::PRIMARY
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ToneMapping {
    #[default]
    None,
    /// ACES filmic curve.
    Aces,
}

/// Exponential-squared fog.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Fog {
    pub color: Color,
    pub density: f32,
}

/// The fixed light rig: a sky/ground hemisphere plus one directional light.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Lighting {
    pub sky: Color,
    pub ground: Color,
    pub hemisphere_intensity: f32,
    pub sun_color: Color,
    pub sun_intensity: f32,
    /// The directional light shines from here toward the origin.
    pub sun_position: Vec3,
}

impl Default for Lighting {
    fn default() -> Self {
        Self {
            sky: Color::WHITE,
            ground: Color::hex(0x222244),
            hemisphere_intensity: 1.0,
            sun_color: Color::WHITE,
            sun_intensity: 0.8,
            sun_position: Vec3::new(5.0, 10.0, 7.0),
        }
    }
}

/// Global render state a mounted scene module may change and must restore.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderState {
    pub clear_color: Color,
    pub fog: Option<Fog>,
    pub tone_mapping: ToneMapping,
    pub exposure: f32,
    pub lighting: Lighting,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            clear_color: Color::hex(0x191925),
            fog: Some(Fog {
                color: Color::hex(0x191925),
                density: 0.06,
            }),
            tone_mapping: ToneMapping::None,
            exposure: 1.0,
            lighting: Lighting::default(),
        }
    }
}

/// Everything a backend needs to draw the scene once.
#[derive(Clone, Copy)]
pub struct DrawRequest<'a> {
    pub graph: &'a SceneGraph,
    pub camera: &'a Camera,
    pub state: &'a RenderState,
    pub target: DrawTarget,
    pub pair: DrawPair,
    pub time: f32,
}

impl<'a> DrawRequest<'a> {
    /// The same draw, written somewhere else.
    pub fn retarget(&self, target: DrawTarget) -> Self {
        Self { target, ..*self }
    }

    /// The same scene through a different camera, tagged with its pair.
    pub fn through(&self, camera: &'a Camera, pair: DrawPair) -> Self {
        Self {
            camera,
            pair,
            ..*self
        }
    }
}

/// Fullscreen post effects available to compositors.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PostEffect {
    /// Plain copy.
    Copy,
    /// Bright-pass glow added on top of the input.
    Bloom {
        threshold: f32,
        strength: f32,
        radius: f32,
    },
    /// Film grain and vignette.
    Film {
        grain: f32,
        vignette: f32,
        time: f32,
    },
}

/// A graphics backend the host can drive.
pub trait Renderer {
    /// Resize the drawing buffer. Offscreen targets follow.
    fn set_size(&mut self, size: ViewportSize);

    /// Drawing-buffer size in physical pixels.
    fn size(&self) -> (u32, u32);

    /// Allocate an offscreen target matching the drawing buffer.
    fn create_target(&mut self, label: &str) -> TargetId;

    fn release_target(&mut self, id: TargetId);

    /// Number of offscreen targets currently allocated.
    fn live_targets(&self) -> usize;

    /// Draw the scene graph. Clears the target to the state's clear color first.
    fn draw_scene(&mut self, request: &DrawRequest<'_>);

    fn post_process(&mut self, effect: PostEffect, input: TargetId, output: DrawTarget);

    /// Start reading back the frame image as it stands now.
    fn request_capture(&mut self);

    /// Collect a requested capture. `None` while the readback is still in flight.
    fn poll_capture(&mut self) -> Option<Result<RgbaImage, SnapshotError>>;

    /// Composite the overlay and the glitch onto the frame image and show it.
    fn present(&mut self, overlay: &OverlayStage, glitch: Option<&GlitchFrame>);
}
