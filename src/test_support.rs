//! A bare mount environment for scene module unit tests.

use crate::ambient::Backdrop;
use crate::camera::Camera;
use crate::effects::{EffectRegistry, FrameContext};
use crate::error::MountError;
use crate::mesh::Transform;
use crate::module::{SceneContext, Teardown};
use crate::override_slot::RenderOverrideSlot;
use crate::render::{DrawPair, DrawRequest, DrawTarget, HeadlessRenderer, RenderState};
use crate::resize::ViewportSize;
use crate::scene_graph::{NodeId, SceneGraph};

pub struct SceneFixture {
    pub graph: SceneGraph,
    pub content_root: NodeId,
    pub backdrop: Backdrop,
    pub camera: Camera,
    pub render_state: RenderState,
    pub renderer: HeadlessRenderer,
    pub override_slot: RenderOverrideSlot,
    pub animations: EffectRegistry,
    pub time: f32,
}

impl SceneFixture {
    pub fn new() -> Self {
        let mut graph = SceneGraph::new();
        let backdrop = Backdrop::build(&mut graph).unwrap();
        let content_root = graph.spawn(graph.root(), "content", Transform::new()).unwrap();
        graph.protect(content_root).unwrap();
        Self {
            graph,
            content_root,
            backdrop,
            camera: Camera::new(),
            render_state: RenderState::default(),
            renderer: HeadlessRenderer::new(64, 48),
            override_slot: RenderOverrideSlot::default(),
            animations: EffectRegistry::new(),
            time: 0.0,
        }
    }

    fn context(&mut self) -> SceneContext<'_> {
        SceneContext {
            graph: &mut self.graph,
            content_root: self.content_root,
            camera: &mut self.camera,
            render_state: &mut self.render_state,
            renderer: &mut self.renderer,
            override_slot: &mut self.override_slot,
            animations: &mut self.animations,
            clock: self.time,
            backdrop: &self.backdrop,
            viewport: ViewportSize::new(64.0, 48.0, 1.0),
        }
    }

    pub fn mount(
        &mut self,
        module: impl Fn(&mut SceneContext<'_>) -> Result<Option<Teardown>, MountError>,
    ) -> Result<Option<Teardown>, MountError> {
        module(&mut self.context())
    }

    pub fn unmount(&mut self, teardown: Teardown) {
        teardown(&mut self.context());
    }

    /// Advance module animations by `dt` seconds.
    pub fn tick(&mut self, dt: f32) {
        self.time += dt;
        let mut cx = FrameContext {
            graph: &mut self.graph,
            camera: &mut self.camera,
            state: &mut self.render_state,
            time: self.time,
            dt,
        };
        self.animations.tick(&mut cx);
    }

    /// One primary draw through the override slot.
    pub fn draw(&mut self) {
        let request = DrawRequest {
            graph: &self.graph,
            camera: &self.camera,
            state: &self.render_state,
            target: DrawTarget::Screen,
            pair: DrawPair::PRIMARY,
            time: self.time,
        };
        self.override_slot.draw(&mut self.renderer, &request);
    }

    /// Nodes under the content root, counting whole subtrees as one.
    pub fn content_nodes(&self) -> usize {
        self.graph.child_count(self.content_root)
    }
}
