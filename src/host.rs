//! The render host: one viewport, one loop, one mounted scene module.
//!
//! [`RenderHost`] owns the renderer, the scene graph, the camera and every
//! registry, and drives them in a fixed order once per
//! [`frame`](RenderHost::frame):
//!
//! 1. advance the clock
//! 2. apply at most one resize step
//! 3. tick ambient effects, then module animations
//! 4. advance camera damping
//! 5. advance transitions (which may swap modules)
//! 6. draw the primary pair once through the override slot
//! 7. fulfil frame capture requests
//! 8. present with the overlay and any glitch on top
//!
//! Navigation goes through [`load_scene`](RenderHost::load_scene). Each call
//! that changes the destination mints a new [`TransitionToken`]; only the
//! transition holding the newest token is allowed to step, and older ones
//! are abandoned the next time the host looks at them. Module failures never
//! reach the caller: a missing or broken module leaves the viewport empty
//! and logs a warning.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use glam::Vec2;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::ambient::{self, Backdrop, GlitchPulse};
use crate::camera::{Camera, HOME_POSITION, HOME_TARGET};
use crate::config::HostConfig;
use crate::effects::{EffectRegistry, FrameContext};
use crate::error::GraphError;
use crate::mesh::Transform;
use crate::module::{ModuleRegistry, SceneContext, SceneId, Teardown};
use crate::orbit_camera::OrbitControls;
use crate::overlay::OverlayStage;
use crate::override_slot::RenderOverrideSlot;
use crate::picking::Ray;
use crate::render::{DrawPair, DrawRequest, DrawTarget, RenderState, Renderer};
use crate::resize::{ResizeSmoother, ViewportSize};
use crate::router;
use crate::scene_graph::{NodeId, SceneGraph};
use crate::snapshot::SnapshotQueue;
use crate::transition::{self, Step, StepContext, StrategyKind, TransitionStrategy, TransitionToken};

/// Longest frame delta fed to animations, in seconds.
const MAX_FRAME_DELTA: f32 = 0.1;

/// How a [`load_scene`](RenderHost::load_scene) call ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadStatus {
    /// The transition is still running.
    Pending,
    /// The requested scene was already the destination; nothing happened.
    Unchanged,
    Completed,
    /// The transition failed. Its overlay was cleared and the swap still happened.
    Faulted,
    /// A newer request took over before this one finished.
    Superseded,
}

impl LoadStatus {
    pub fn is_settled(self) -> bool {
        self != LoadStatus::Pending
    }
}

/// Shared view of one navigation request's outcome.
#[derive(Clone, Debug)]
pub struct LoadHandle(Rc<Cell<LoadStatus>>);

impl LoadHandle {
    fn new(status: LoadStatus) -> Self {
        Self(Rc::new(Cell::new(status)))
    }

    pub fn status(&self) -> LoadStatus {
        self.0.get()
    }

    pub fn is_settled(&self) -> bool {
        self.status().is_settled()
    }

    fn settle(&self, status: LoadStatus) {
        self.0.set(status);
    }
}

struct ActiveTransition {
    token: TransitionToken,
    target: Option<SceneId>,
    strategy: Box<dyn TransitionStrategy>,
    swapped: bool,
    handle: LoadHandle,
}

#[derive(Default)]
struct Clock {
    last: Option<f64>,
    time: f32,
    dt: f32,
}

impl Clock {
    fn tick(&mut self, now: f64) {
        self.dt = match self.last {
            Some(last) => ((now - last) as f32).clamp(0.0, MAX_FRAME_DELTA),
            None => 0.0,
        };
        self.last = Some(now);
        self.time += self.dt;
    }
}

fn describe(id: Option<&SceneId>) -> String {
    id.map_or_else(|| "home".to_string(), |id| format!("scene `{id}`"))
}

/// Owns the viewport and everything drawn in it.
pub struct RenderHost<R: Renderer> {
    config: HostConfig,
    renderer: R,
    graph: SceneGraph,
    content_root: NodeId,
    backdrop: Backdrop,
    camera: Camera,
    orbit: OrbitControls,
    render_state: RenderState,
    resize: ResizeSmoother,
    ambient: EffectRegistry,
    animations: EffectRegistry,
    override_slot: RenderOverrideSlot,
    modules: ModuleRegistry,
    mounted: Option<SceneId>,
    teardown: Option<Teardown>,
    overlay: OverlayStage,
    snapshots: SnapshotQueue,
    transitions: Vec<ActiveTransition>,
    latest: TransitionToken,
    rng: StdRng,
    clock: Clock,
    glitch: Option<GlitchPulse>,
}

impl<R: Renderer> RenderHost<R> {
    /// Build the host around a renderer already sized for `viewport`.
    pub fn new(
        renderer: R,
        modules: ModuleRegistry,
        viewport: ViewportSize,
        config: HostConfig,
    ) -> Result<Self, GraphError> {
        let mut graph = SceneGraph::new();
        let backdrop = Backdrop::build(&mut graph)?;
        let content_root = graph.spawn(graph.root(), "content", Transform::new())?;
        graph.protect(content_root)?;

        let mut ambient = EffectRegistry::new();
        backdrop.animate(&mut ambient);

        let resize = ResizeSmoother::new(viewport, &config);
        let mut camera = Camera::new();
        let applied = resize.current();
        camera.set_viewport(applied.width, applied.height);

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        log::info!(
            "render host ready: {} scene modules, {}x{} @{}",
            modules.len(),
            applied.width,
            applied.height,
            applied.pixel_ratio
        );

        Ok(Self {
            config,
            renderer,
            graph,
            content_root,
            backdrop,
            camera,
            orbit: OrbitControls::new(),
            render_state: RenderState::default(),
            resize,
            ambient,
            animations: EffectRegistry::new(),
            override_slot: RenderOverrideSlot::default(),
            modules,
            mounted: None,
            teardown: None,
            overlay: OverlayStage::new(),
            snapshots: SnapshotQueue::new(),
            transitions: Vec::new(),
            latest: TransitionToken(0),
            rng,
            clock: Clock::default(),
            glitch: None,
        })
    }

    /// Navigate to `id`, or home for `None`.
    ///
    /// Asking for the scene that is already the destination does nothing and
    /// returns a handle settled as [`LoadStatus::Unchanged`].
    pub fn load_scene(&mut self, id: Option<SceneId>) -> LoadHandle {
        let effective = self
            .transitions
            .last()
            .map_or(self.mounted.as_ref(), |t| t.target.as_ref());
        if effective == id.as_ref() {
            log::debug!("{} is already the destination", describe(id.as_ref()));
            return LoadHandle::new(LoadStatus::Unchanged);
        }

        self.latest = TransitionToken(self.latest.0 + 1);
        let kind = transition::select(&mut self.rng, &self.config);
        let strategy = kind.build(&mut self.rng);
        log::info!(
            "navigating to {} with `{kind}` (transition #{})",
            describe(id.as_ref()),
            self.latest.0
        );

        let handle = LoadHandle::new(LoadStatus::Pending);
        self.transitions.push(ActiveTransition {
            token: self.latest,
            target: id,
            strategy,
            swapped: false,
            handle: handle.clone(),
        });
        handle
    }

    /// Routing hook. Same as [`load_scene`](Self::load_scene).
    pub fn on_navigate(&mut self, id: Option<SceneId>) -> LoadHandle {
        self.load_scene(id)
    }

    /// Resolve `path` and navigate there.
    pub fn navigate(&mut self, path: &str) -> LoadHandle {
        let route = router::resolve(path);
        if route.redirected {
            log::warn!("unknown path `{path}`, going home");
        }
        self.on_navigate(route.scene)
    }

    /// Render one frame. `now` is seconds on any monotonic clock.
    pub fn frame(&mut self, now: f64) {
        self.clock.tick(now);
        let (time, dt) = (self.clock.time, self.clock.dt);

        if let Some(size) = self.resize.step() {
            self.renderer.set_size(size);
            self.camera.set_viewport(size.width, size.height);
            log::debug!("viewport {}x{} @{}", size.width, size.height, size.pixel_ratio);
        }

        let mut cx = FrameContext {
            graph: &mut self.graph,
            camera: &mut self.camera,
            state: &mut self.render_state,
            time,
            dt,
        };
        self.ambient.tick(&mut cx);
        self.animations.tick(&mut cx);

        self.orbit.update(&mut self.camera);

        self.advance_transitions(dt);

        let camera = self.camera.with_fov_offset(self.overlay.fov_offset());
        let request = DrawRequest {
            graph: &self.graph,
            camera: &camera,
            state: &self.render_state,
            target: DrawTarget::Screen,
            pair: DrawPair::PRIMARY,
            time,
        };
        self.override_slot.draw(&mut self.renderer, &request);

        self.snapshots.pump(&mut self.renderer);

        let glitch = self.glitch.and_then(|pulse| pulse.sample(time));
        if glitch.is_none() {
            self.glitch = None;
        }
        self.renderer.present(&self.overlay, glitch.as_ref());
    }

    fn advance_transitions(&mut self, dt: f32) {
        for mut active in std::mem::take(&mut self.transitions) {
            if active.token != self.latest {
                log::info!(
                    "transition #{} to {} superseded",
                    active.token.0,
                    describe(active.target.as_ref())
                );
                self.settle(&active, LoadStatus::Superseded);
                continue;
            }

            let phase_before = active.strategy.phase();
            let step = {
                let mut cx = StepContext {
                    token: active.token,
                    dt,
                    overlay: &mut self.overlay,
                    snapshots: &mut self.snapshots,
                    viewport: self.resize.current(),
                    rng: &mut self.rng,
                    duration_scale: self.config.duration_scale,
                    snapshot_timeout: self.config.snapshot_timeout,
                };
                active.strategy.step(&mut cx)
            };
            let phase = active.strategy.phase();
            if phase != phase_before {
                log::debug!("transition #{}: {phase_before:?} -> {phase:?}", active.token.0);
            }

            match step {
                Ok(Step::Continue) => self.transitions.push(active),
                Ok(Step::Swap) => {
                    if active.swapped {
                        log::warn!(
                            "`{}` asked to swap twice; ignoring",
                            active.strategy.kind()
                        );
                    } else {
                        self.load_next(active.target.clone());
                        active.swapped = true;
                    }
                    self.transitions.push(active);
                }
                Ok(Step::Done) => {
                    if !active.swapped {
                        log::debug!("`{}` finished without swapping", active.strategy.kind());
                        self.load_next(active.target.clone());
                    }
                    log::info!(
                        "transition #{} to {} complete",
                        active.token.0,
                        describe(active.target.as_ref())
                    );
                    self.settle(&active, LoadStatus::Completed);
                }
                Err(err) => {
                    log::warn!("`{}` transition failed: {err}", active.strategy.kind());
                    if !active.swapped {
                        self.load_next(active.target.clone());
                    }
                    self.settle(&active, LoadStatus::Faulted);
                }
            }
        }
    }

    fn settle(&mut self, active: &ActiveTransition, status: LoadStatus) {
        let layers = self.overlay.clear_owner(active.token);
        let captures = self.snapshots.discard_owner(active.token);
        if layers + captures > 0 {
            log::debug!(
                "transition #{}: dropped {layers} overlay layers, {captures} captures",
                active.token.0
            );
        }
        active.handle.settle(status);
    }

    /// Unmount whatever is mounted and mount `target`.
    fn load_next(&mut self, target: Option<SceneId>) {
        self.unmount();
        if let Some(id) = target {
            self.mount(id);
        }
    }

    fn scene_context(&mut self) -> SceneContext<'_> {
        SceneContext {
            graph: &mut self.graph,
            content_root: self.content_root,
            camera: &mut self.camera,
            render_state: &mut self.render_state,
            renderer: &mut self.renderer,
            override_slot: &mut self.override_slot,
            animations: &mut self.animations,
            clock: self.clock.time,
            backdrop: &self.backdrop,
            viewport: self.resize.current(),
        }
    }

    fn unmount(&mut self) {
        let previous = self.mounted.take();
        if let Some(teardown) = self.teardown.take() {
            let mut cx = self.scene_context();
            teardown(&mut cx);
        }
        let label = describe(previous.as_ref());

        match self.graph.clear_children(self.content_root) {
            Ok(0) => {}
            Ok(count) => log::warn!("{label} left {count} nodes under the content root"),
            Err(err) => log::warn!("could not clear the content root after {label}: {err}"),
        }
        if let Some(id) = self.override_slot.force_clear() {
            log::warn!("{label} left render override #{id} installed");
        }
        let animations = self.animations.clear();
        if animations > 0 {
            log::warn!("{label} left {animations} animations registered");
        }
        if previous.is_some() {
            log::info!("unmounted {label}");
        }
    }

    fn mount(&mut self, id: SceneId) {
        let module = match self.modules.resolve(&id) {
            Ok(module) => module,
            Err(err) => {
                log::warn!("{err}; showing no scene");
                return;
            }
        };

        let state_before = self.render_state;
        let pose_before = self.camera.pose();
        let targets_before = self.renderer.live_targets();

        let result = {
            let mut cx = self.scene_context();
            (*module)(&mut cx)
        };
        match result {
            Ok(teardown) => {
                log::info!("mounted scene `{id}`");
                self.teardown = teardown;
                self.mounted = Some(id);
            }
            Err(err) => {
                log::warn!("scene `{id}` failed to mount: {err}; showing no scene");
                if let Err(err) = self.graph.clear_children(self.content_root) {
                    log::warn!("could not clear the content root: {err}");
                }
                self.animations.clear();
                self.override_slot.force_clear();
                self.render_state = state_before;
                self.camera.set_pose(pose_before);
                let leaked = self.renderer.live_targets().saturating_sub(targets_before);
                if leaked > 0 {
                    log::warn!("scene `{id}` leaked {leaked} render targets while failing");
                }
            }
        }
    }

    /// Primary press at `position` (logical pixels): ripple on the floor and a glitch.
    pub fn pointer_down(&mut self, position: Vec2) {
        let viewport = self.resize.current();
        let ray = Ray::from_screen(
            &self.camera,
            position,
            Vec2::new(viewport.width, viewport.height),
        );
        if let Some(point) = ray.hit_floor() {
            if let Err(err) =
                ambient::spawn_ripple(&mut self.graph, &mut self.ambient, &mut self.rng, point)
            {
                log::warn!("ripple failed: {err}");
            }
        }
        self.glitch = Some(GlitchPulse::trigger(&mut self.rng, self.clock.time));
    }

    pub fn double_click(&mut self) {
        self.reset_view();
    }

    /// Put the camera back at its home pose.
    pub fn reset_view(&mut self) {
        self.orbit.stop();
        self.camera.position = HOME_POSITION;
        self.camera.target = HOME_TARGET;
    }

    /// Queue an orbit rotation from a drag in logical pixels.
    pub fn orbit_drag(&mut self, delta: Vec2) {
        self.orbit.rotate(delta, self.resize.current().height);
    }

    /// Queue a zoom step; positive moves closer.
    pub fn zoom(&mut self, delta: f32) {
        self.orbit.zoom(delta);
    }

    /// Feed a window size change. Applied gradually over the next frames.
    pub fn resize(&mut self, logical_width: f32, logical_height: f32, pixel_ratio: f32) {
        self.resize
            .set_target(ViewportSize::new(logical_width, logical_height, pixel_ratio));
    }

    pub fn mounted(&self) -> Option<&SceneId> {
        self.mounted.as_ref()
    }

    pub fn is_transitioning(&self) -> bool {
        !self.transitions.is_empty()
    }

    /// The strategy of the newest running transition.
    pub fn active_strategy(&self) -> Option<StrategyKind> {
        self.transitions.last().map(|t| t.strategy.kind())
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    pub fn content_root(&self) -> NodeId {
        self.content_root
    }

    pub fn backdrop(&self) -> &Backdrop {
        &self.backdrop
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn render_state(&self) -> &RenderState {
        &self.render_state
    }

    pub fn overlay(&self) -> &OverlayStage {
        &self.overlay
    }

    pub fn animations(&self) -> &EffectRegistry {
        &self.animations
    }

    pub fn ambient_effects(&self) -> &EffectRegistry {
        &self.ambient
    }

    pub fn override_slot(&self) -> &RenderOverrideSlot {
        &self.override_slot
    }

    pub fn viewport(&self) -> ViewportSize {
        self.resize.current()
    }

    /// Seconds of host time.
    pub fn time(&self) -> f32 {
        self.clock.time
    }

    pub fn is_glitching(&self) -> bool {
        self.glitch.is_some()
    }
}

impl<R: Renderer> fmt::Debug for RenderHost<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderHost")
            .field("mounted", &self.mounted)
            .field("transitions", &self.transitions.len())
            .field("latest", &self.latest)
            .field("overlay_layers", &self.overlay.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::HeadlessRenderer;

    fn host() -> RenderHost<HeadlessRenderer> {
        let mut modules = ModuleRegistry::new();
        modules.register("001", |_| Ok(None));
        RenderHost::new(
            HeadlessRenderer::new(320, 240),
            modules,
            ViewportSize::new(320.0, 240.0, 1.0),
            HostConfig::new().seed(1).strategy(StrategyKind::Fade),
        )
        .unwrap()
    }

    #[test]
    fn home_to_home_is_unchanged() {
        let mut host = host();
        assert_eq!(host.load_scene(None).status(), LoadStatus::Unchanged);
        assert!(!host.is_transitioning());
    }

    #[test]
    fn first_frame_has_no_delta() {
        let mut host = host();
        host.frame(100.0);
        assert_eq!(host.time(), 0.0);
        host.frame(100.5);
        assert!((host.time() - MAX_FRAME_DELTA).abs() < 1e-6);
    }

    #[test]
    fn reset_view_restores_home_pose() {
        let mut host = host();
        host.orbit_drag(Vec2::new(200.0, 40.0));
        host.zoom(3.0);
        for i in 0..30 {
            host.frame(i as f64 / 60.0);
        }
        assert_ne!(host.camera().position, HOME_POSITION);
        host.double_click();
        assert_eq!(host.camera().position, HOME_POSITION);
        assert_eq!(host.camera().target, HOME_TARGET);
    }

    #[test]
    fn pointer_on_floor_spawns_a_ripple_and_glitch() {
        let mut host = host();
        host.frame(0.0);
        let effects = host.ambient_effects().len();
        // Below the horizon at the center bottom of the view.
        host.pointer_down(Vec2::new(160.0, 230.0));
        assert_eq!(host.ambient_effects().len(), effects + 1);
        assert!(host.is_glitching());
    }

    #[test]
    fn pointer_at_sky_only_glitches() {
        let mut host = host();
        host.frame(0.0);
        let effects = host.ambient_effects().len();
        host.pointer_down(Vec2::new(160.0, 0.0));
        assert_eq!(host.ambient_effects().len(), effects);
        assert!(host.is_glitching());
    }
}
