//! The single draw entry point the host renders through.
//!
//! The host issues one primary draw per frame via [`RenderOverrideSlot::draw`].
//! With nothing installed that reaches the base routine, which draws the
//! scene graph straight to the screen. A scene module can install one
//! [`Compositor`] to take over the primary draw and build a multi-pass
//! chain instead: render the scene into offscreen targets, run post passes,
//! write the result to the screen.
//!
//! While a compositor runs it is taken out of the slot, so the sub-draws it
//! issues through [`CompositePass`] reach the base routine instead of
//! recursing into itself. Draws of any pair other than
//! [`DrawPair::PRIMARY`] always bypass the compositor.
//!
//! # Example
//! ```ignore
//! let handle = ctx.override_slot.install(Box::new(BloomChain { scene, bloom }))?;
//! Ok(Some(Box::new(move |ctx: &mut SceneContext<'_>| {
//!     let _ = ctx.override_slot.restore(handle);
//! })))
//! ```

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::camera::Camera;
use crate::error::SlotError;
use crate::render::{DrawPair, DrawRequest, DrawTarget, PostEffect, Renderer, TargetId};

/// The routine that actually draws a request.
pub type DrawRoutine = Rc<dyn Fn(&mut dyn Renderer, &DrawRequest<'_>)>;

static NEXT_OVERRIDE_ID: AtomicU64 = AtomicU64::new(1);

/// Wrap a closure as a [`DrawRoutine`].
pub fn draw_routine(f: impl Fn(&mut dyn Renderer, &DrawRequest<'_>) + 'static) -> DrawRoutine {
    Rc::new(f)
}

fn draw_directly(renderer: &mut dyn Renderer, request: &DrawRequest<'_>) {
    renderer.draw_scene(request);
}

/// A multi-pass replacement for the primary draw.
pub trait Compositor {
    fn composite(&mut self, pass: &mut CompositePass<'_, '_>);
}

/// Proof of an installed compositor. Hand it back to [`RenderOverrideSlot::restore`].
pub struct OverrideHandle {
    id: u64,
    routine: DrawRoutine,
}

impl OverrideHandle {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl fmt::Debug for OverrideHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverrideHandle").field("id", &self.id).finish()
    }
}

struct Installed {
    id: u64,
    /// `None` while the compositor is running.
    compositor: Option<Box<dyn Compositor>>,
    routine: DrawRoutine,
}

pub struct RenderOverrideSlot {
    base: DrawRoutine,
    installed: Option<Installed>,
}

impl Default for RenderOverrideSlot {
    fn default() -> Self {
        Self::new(Rc::new(draw_directly))
    }
}

impl RenderOverrideSlot {
    pub fn new(base: DrawRoutine) -> Self {
        Self {
            base,
            installed: None,
        }
    }

    /// The routine that draws when no compositor intercepts.
    pub fn base_routine(&self) -> DrawRoutine {
        Rc::clone(&self.base)
    }

    pub fn is_installed(&self) -> bool {
        self.installed.is_some()
    }

    /// Install a compositor. Fails if one is already installed.
    pub fn install(&mut self, compositor: Box<dyn Compositor>) -> Result<OverrideHandle, SlotError> {
        if let Some(installed) = &self.installed {
            return Err(SlotError::Occupied {
                installed: installed.id,
            });
        }
        let id = NEXT_OVERRIDE_ID.fetch_add(1, Ordering::Relaxed);
        self.installed = Some(Installed {
            id,
            compositor: Some(compositor),
            routine: Rc::clone(&self.base),
        });
        log::debug!("render override #{id} installed");
        Ok(OverrideHandle {
            id,
            routine: Rc::clone(&self.base),
        })
    }

    /// Remove the compositor `handle` was issued for and reinstate the
    /// routine that was active when it was installed.
    pub fn restore(&mut self, handle: OverrideHandle) -> Result<(), SlotError> {
        let installed = self.installed.as_ref().map(|i| i.id);
        if installed != Some(handle.id) {
            return Err(SlotError::Mismatch {
                handle: handle.id,
                installed,
            });
        }
        self.installed = None;
        self.base = handle.routine;
        log::debug!("render override #{} restored", handle.id);
        Ok(())
    }

    /// Drop whatever is installed without a handle. Returns the dropped id.
    pub fn force_clear(&mut self) -> Option<u64> {
        let installed = self.installed.take()?;
        self.base = installed.routine;
        Some(installed.id)
    }

    /// Draw one request, through the compositor if it applies.
    pub fn draw(&mut self, renderer: &mut dyn Renderer, request: &DrawRequest<'_>) {
        let compositor = if request.pair.is_primary() {
            self.installed.as_mut().and_then(|i| i.compositor.take())
        } else {
            None
        };
        let Some(mut compositor) = compositor else {
            log::trace!("base draw {:?} -> {:?}", request.pair, request.target);
            (self.base)(renderer, request);
            return;
        };

        let mut pass = CompositePass {
            slot: &mut *self,
            renderer: &mut *renderer,
            request: *request,
        };
        compositor.composite(&mut pass);

        if let Some(installed) = self.installed.as_mut() {
            installed.compositor = Some(compositor);
        }
    }
}

impl fmt::Debug for RenderOverrideSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderOverrideSlot")
            .field("installed", &self.installed.as_ref().map(|i| i.id))
            .finish()
    }
}

/// What a running compositor may do.
pub struct CompositePass<'a, 'r> {
    slot: &'a mut RenderOverrideSlot,
    renderer: &'a mut dyn Renderer,
    request: DrawRequest<'r>,
}

impl<'r> CompositePass<'_, 'r> {
    /// The primary draw being replaced.
    pub fn request(&self) -> &DrawRequest<'r> {
        &self.request
    }

    /// Draw the primary pair into `target`. Reaches the base routine.
    pub fn draw(&mut self, target: DrawTarget) {
        let request = self.request.retarget(target);
        self.slot.draw(self.renderer, &request);
    }

    /// Draw the same scene through another camera, tagged with its own pair.
    pub fn draw_pair(&mut self, camera: &Camera, pair: DrawPair, target: DrawTarget) {
        let request = DrawRequest {
            graph: self.request.graph,
            camera,
            state: self.request.state,
            target,
            pair,
            time: self.request.time,
        };
        self.slot.draw(self.renderer, &request);
    }

    pub fn post(&mut self, effect: PostEffect, input: TargetId, output: DrawTarget) {
        self.renderer.post_process(effect, input, output);
    }

    pub fn renderer(&mut self) -> &mut dyn Renderer {
        &mut *self.renderer
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::render::{CameraKey, HeadlessRenderer, RenderCall, RenderState, SceneKey};
    use crate::scene_graph::SceneGraph;

    struct Fixture {
        graph: SceneGraph,
        camera: Camera,
        state: RenderState,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                graph: SceneGraph::new(),
                camera: Camera::new(),
                state: RenderState::default(),
            }
        }

        fn request(&self, pair: DrawPair) -> DrawRequest<'_> {
            DrawRequest {
                graph: &self.graph,
                camera: &self.camera,
                state: &self.state,
                target: DrawTarget::Screen,
                pair,
                time: 0.0,
            }
        }
    }

    /// Draws offscreen, then posts the result to the screen.
    struct TwoPass {
        target: TargetId,
    }

    impl Compositor for TwoPass {
        fn composite(&mut self, pass: &mut CompositePass<'_, '_>) {
            pass.draw(DrawTarget::Offscreen(self.target));
            pass.post(PostEffect::Copy, self.target, DrawTarget::Screen);
        }
    }

    fn counting_slot() -> (RenderOverrideSlot, Rc<Cell<usize>>) {
        let count = Rc::new(Cell::new(0));
        let seen = Rc::clone(&count);
        let slot = RenderOverrideSlot::new(draw_routine(move |renderer, request| {
            seen.set(seen.get() + 1);
            renderer.draw_scene(request);
        }));
        (slot, count)
    }

    #[test]
    fn empty_slot_draws_through_base() {
        let fixture = Fixture::new();
        let (mut slot, count) = counting_slot();
        let mut renderer = HeadlessRenderer::new(8, 8);
        slot.draw(&mut renderer, &fixture.request(DrawPair::PRIMARY));
        assert_eq!(count.get(), 1);
        assert_eq!(renderer.primary_draws(0), 1);
    }

    #[test]
    fn compositor_sub_draws_reach_the_base_routine() {
        let fixture = Fixture::new();
        let (mut slot, count) = counting_slot();
        let mut renderer = HeadlessRenderer::new(8, 8);
        let target = renderer.create_target("scene");
        let _handle = slot.install(Box::new(TwoPass { target })).unwrap();

        slot.draw(&mut renderer, &fixture.request(DrawPair::PRIMARY));
        assert_eq!(count.get(), 1);
        let calls: Vec<_> = renderer.calls_in_frame(0).cloned().collect();
        assert!(matches!(
            calls[0],
            RenderCall::DrawScene {
                target: DrawTarget::Offscreen(t),
                ..
            } if t == target
        ));
        assert!(matches!(calls[1], RenderCall::PostProcess { .. }));

        // Reinstalled after running.
        slot.draw(&mut renderer, &fixture.request(DrawPair::PRIMARY));
        assert_eq!(count.get(), 2);
        assert_eq!(renderer.primary_draws(0), 0);
    }

    #[test]
    fn other_pairs_bypass_the_compositor() {
        let fixture = Fixture::new();
        let (mut slot, count) = counting_slot();
        let mut renderer = HeadlessRenderer::new(8, 8);
        let target = renderer.create_target("scene");
        let _handle = slot.install(Box::new(TwoPass { target })).unwrap();

        let secondary = DrawPair {
            scene: SceneKey(0),
            camera: CameraKey(1),
        };
        slot.draw(&mut renderer, &fixture.request(secondary));
        assert_eq!(count.get(), 1);
        assert!(
            renderer
                .calls_in_frame(0)
                .all(|call| !matches!(call, RenderCall::PostProcess { .. }))
        );
    }

    #[test]
    fn second_install_is_refused() {
        let mut slot = RenderOverrideSlot::default();
        let first = slot.install(Box::new(TwoPass { target: TargetId(1) })).unwrap();
        let err = slot
            .install(Box::new(TwoPass { target: TargetId(2) }))
            .unwrap_err();
        assert_eq!(err, SlotError::Occupied { installed: first.id() });
    }

    #[test]
    fn restore_reinstates_the_identical_routine() {
        let mut slot = RenderOverrideSlot::default();
        let before = slot.base_routine();
        let handle = slot.install(Box::new(TwoPass { target: TargetId(1) })).unwrap();
        slot.restore(handle).unwrap();
        assert!(!slot.is_installed());
        assert!(Rc::ptr_eq(&before, &slot.base_routine()));
    }

    #[test]
    fn foreign_handle_is_a_mismatch() {
        let mut slot = RenderOverrideSlot::default();
        let mut other = RenderOverrideSlot::default();
        let _mine = slot.install(Box::new(TwoPass { target: TargetId(1) })).unwrap();
        let theirs = other.install(Box::new(TwoPass { target: TargetId(1) })).unwrap();
        assert!(matches!(
            slot.restore(theirs),
            Err(SlotError::Mismatch { .. })
        ));
        assert!(slot.is_installed());
    }

    #[test]
    fn force_clear_empties_the_slot() {
        let mut slot = RenderOverrideSlot::default();
        let before = slot.base_routine();
        let handle = slot.install(Box::new(TwoPass { target: TargetId(1) })).unwrap();
        assert_eq!(slot.force_clear(), Some(handle.id()));
        assert_eq!(slot.force_clear(), None);
        assert!(Rc::ptr_eq(&before, &slot.base_routine()));
    }
}
