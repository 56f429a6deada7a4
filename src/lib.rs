//! # Vitrine
//!
//! **One viewport, many scenes.**
//!
//! Vitrine hosts a single render loop and swaps self-contained *scene
//! modules* in and out of it. A module mounts under a dedicated content root,
//! may take over global render state, the camera pose and the primary draw
//! (through a compositor installed in the render override slot), and hands
//! back a teardown that puts everything back. Moving between modules runs one
//! of six transition strategies drawn over the live frame.
//!
//! ## Quick Start
//!
//! ```no_run
//! use vitrine::*;
//!
//! fn main() -> Result<(), AppError> {
//!     run(AppConfig::new().title("Ideas").route("/002"))
//! }
//! ```
//!
//! ## Writing a module
//!
//! ```
//! use vitrine::*;
//!
//! fn mount(ctx: &mut SceneContext<'_>) -> Result<Option<Teardown>, MountError> {
//!     let cube = ctx.graph.spawn_visual(
//!         ctx.content_root,
//!         "cube",
//!         Transform::from_position(Vec3::new(0.0, 0.5, 0.0)),
//!         Visual::new(Shape::Cube, Color::hex(0x9aa3ff)),
//!     )?;
//!     Ok(Some(Box::new(move |ctx: &mut SceneContext<'_>| {
//!         let _ = ctx.graph.despawn(cube);
//!     })))
//! }
//!
//! let mut modules = scenes::builtin_registry();
//! modules.register("010", mount);
//!
//! let mut host = RenderHost::new(
//!     HeadlessRenderer::new(320, 240),
//!     modules,
//!     ViewportSize::new(320.0, 240.0, 1.0),
//!     HostConfig::new().seed(7),
//! )?;
//! let load = host.navigate("/010");
//! for i in 0..240 {
//!     host.frame(f64::from(i) / 60.0);
//! }
//! assert_eq!(load.status(), LoadStatus::Completed);
//! assert_eq!(host.mounted().map(SceneId::as_str), Some("010"));
//! # Ok::<(), GraphError>(())
//! ```

mod ambient;
mod app;
mod camera;
mod color;
mod config;
mod effects;
mod error;
mod gpu;
mod host;
mod input;
mod mesh;
mod module;
mod orbit_camera;
mod overlay;
mod override_slot;
mod picking;
pub mod render;
mod resize;
pub mod router;
mod scene_graph;
pub mod scenes;
mod snapshot;
pub mod transition;

#[cfg(test)]
mod test_support;

pub use ambient::{Backdrop, GlitchFrame, GlitchPulse, Planet};
pub use app::{AppConfig, run};
pub use camera::{Camera, CameraPose, HOME_POSITION, HOME_TARGET};
pub use color::Color;
pub use config::HostConfig;
pub use effects::{EffectId, EffectRegistry, EffectStatus, FrameContext};
pub use error::{
    AppError, GpuError, GraphError, LoadError, MountError, SlotError, SnapshotError,
    TransitionError, UnknownStrategy,
};
pub use gpu::GpuContext;
pub use host::{LoadHandle, LoadStatus, RenderHost};
pub use input::{ClickTracker, Input, Press};
pub use mesh::{Shape, Transform};
pub use module::{ModuleRegistry, SceneContext, SceneId, SceneModule, Teardown};
pub use orbit_camera::OrbitControls;
pub use overlay::{LayerId, LayerKind, OverlayLayer, OverlayStage, SnapshotEffect};
pub use override_slot::{
    CompositePass, Compositor, DrawRoutine, OverrideHandle, RenderOverrideSlot, draw_routine,
};
pub use picking::Ray;
pub use render::{
    DrawPair, DrawRequest, DrawTarget, HeadlessRenderer, PostEffect, RenderState, Renderer,
    TargetId, WgpuRenderer,
};
pub use resize::{ResizeSmoother, ViewportSize};
pub use scene_graph::{NodeId, SceneGraph, Visual};
pub use snapshot::{FrameSnapshot, MaskImage};
pub use transition::{StrategyKind, TransitionPhase, TransitionStrategy, TransitionToken};

// Re-export glam math types for convenience
pub use glam::{Mat4, Quat, Vec2, Vec3};
