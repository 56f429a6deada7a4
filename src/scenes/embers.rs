//! A dusk plaza with embers drifting up past a lit tree.
//!
//! The compositor renders the main view offscreen, blooms it hard and lays
//! film grain over the result. It also draws an overhead view of the plaza
//! into its own target as a second scene/camera pair; the override slot
//! forwards that sub-pass straight to the base draw.

use glam::Vec3;
use rand::Rng;

use crate::camera::Camera;
use crate::color::Color;
use crate::effects::EffectStatus;
use crate::error::{GraphError, MountError};
use crate::mesh::{Shape, Transform};
use crate::module::{SceneContext, Teardown};
use crate::override_slot::{CompositePass, Compositor};
use crate::render::{
    CameraKey, DrawPair, DrawTarget, Fog, Lighting, PostEffect, SceneKey, TargetId, ToneMapping,
};
use crate::scene_graph::{NodeId, SceneGraph, Visual};

const BACKGROUND: Color = Color::hex(0x05050b);
const EMBER_COUNT: usize = 180;
const EMBER_CEILING: f32 = 5.0;
/// Upward drift in units per second.
const EMBER_RISE: f32 = 0.3;

/// The overhead sub-pass: same scene, second camera.
pub const OVERHEAD_PAIR: DrawPair = DrawPair {
    scene: SceneKey(0),
    camera: CameraKey(1),
};

struct Ember {
    node: NodeId,
    position: Vec3,
}

struct EmberGrade {
    scene: TargetId,
    bloom: TargetId,
    overhead: TargetId,
    overhead_camera: Camera,
}

impl Compositor for EmberGrade {
    fn composite(&mut self, pass: &mut CompositePass<'_, '_>) {
        let (time, aspect) = {
            let request = pass.request();
            (request.time, request.camera.aspect)
        };
        self.overhead_camera.aspect = aspect;
        pass.draw_pair(
            &self.overhead_camera,
            OVERHEAD_PAIR,
            DrawTarget::Offscreen(self.overhead),
        );

        pass.draw(DrawTarget::Offscreen(self.scene));
        pass.post(
            PostEffect::Bloom {
                threshold: 0.42,
                strength: 1.4,
                radius: 0.65,
            },
            self.scene,
            DrawTarget::Offscreen(self.bloom),
        );
        pass.post(
            PostEffect::Film {
                grain: 0.65,
                vignette: 0.35,
                time,
            },
            self.bloom,
            DrawTarget::Screen,
        );
    }
}

fn build_plaza(graph: &mut SceneGraph, root: NodeId, rng: &mut impl Rng) -> Result<(), GraphError> {
    graph.spawn_visual(
        root,
        "plaza",
        Transform::from_position(Vec3::new(0.0, 0.1, -0.8)).scale(Vec3::new(5.8, 0.2, 5.8)),
        Visual::new(Shape::Sphere, Color::hex(0x1c1c2a)),
    )?;
    graph.spawn_visual(
        root,
        "trunk",
        Transform::from_position(Vec3::new(-2.6, 2.5, 0.8)).scale(Vec3::new(0.45, 5.0, 0.45)),
        Visual::new(Shape::Cube, Color::hex(0x3b2a20)),
    )?;
    graph.spawn_visual(
        root,
        "canopy",
        Transform::from_position(Vec3::new(-2.6, 4.3, 0.8)).uniform_scale(3.8),
        Visual::new(Shape::Sphere, Color::hex(0x2f5a3a)).emissive(0.15),
    )?;
    graph.spawn_visual(
        root,
        "canopy-halo",
        Transform::from_position(Vec3::new(-2.6, 4.3, 0.8)).uniform_scale(4.8),
        Visual::new(Shape::Sphere, Color::hex(0xffcf8a))
            .opacity(0.15)
            .emissive(0.6),
    )?;

    let city = graph.spawn(root, "city", Transform::from_position(Vec3::new(2.4, 0.0, -1.4)))?;
    for _ in 0..9 {
        let size = Vec3::new(
            rng.random_range(0.3..0.8),
            rng.random_range(0.6..2.6),
            rng.random_range(0.3..0.8),
        );
        let at = Vec3::new(
            rng.random_range(-1.5..1.5),
            size.y / 2.0,
            rng.random_range(-1.0..1.0),
        );
        graph.spawn_visual(
            city,
            "tower",
            Transform::from_position(at).scale(size),
            Visual::new(Shape::Cube, Color::hex(0x151a2e)).emissive(0.1),
        )?;
    }
    Ok(())
}

/// Bloom and film grain over a field of rising embers.
pub fn mount(ctx: &mut SceneContext<'_>) -> Result<Option<Teardown>, MountError> {
    let mut rng = rand::rng();

    let root = ctx.graph.spawn(ctx.content_root, "embers", Transform::new())?;
    build_plaza(ctx.graph, root, &mut rng)?;

    let field = ctx.graph.spawn(root, "ember-field", Transform::new())?;
    let mut embers = Vec::with_capacity(EMBER_COUNT);
    for _ in 0..EMBER_COUNT {
        let position = Vec3::new(
            rng.random_range(-3.0..3.0),
            rng.random_range(1.0..EMBER_CEILING),
            rng.random_range(-2.5..2.5),
        );
        let node = ctx.graph.spawn_visual(
            field,
            "ember",
            Transform::from_position(position).uniform_scale(0.04),
            Visual::new(Shape::Sphere, Color::hex(0xffcfa7))
                .opacity(0.6)
                .emissive(2.0)
                .unfogged(),
        )?;
        embers.push(Ember { node, position });
    }

    let saved_state = *ctx.render_state;
    let state = &mut *ctx.render_state;
    state.clear_color = BACKGROUND;
    state.fog = Some(Fog {
        color: BACKGROUND,
        density: 0.05,
    });
    state.tone_mapping = ToneMapping::Aces;
    state.exposure = 1.35;
    state.lighting = Lighting {
        sky: Color::hex(0x10162b),
        ground: BACKGROUND,
        hemisphere_intensity: 0.8,
        sun_color: Color::hex(0xffbb7d),
        sun_intensity: 1.6,
        sun_position: Vec3::new(-1.2, 6.5, 4.6),
    };

    let drift = ctx.animations.add("ember-drift", move |cx| {
        let mut rng = rand::rng();
        let opacity = 0.45 + (cx.time * 0.6).sin() * 0.1;
        for ember in &mut embers {
            let phase = ember.position.x * 0.5 + ember.position.z * 0.4;
            let sway = (cx.time * 0.5 + phase).sin() * 0.04;
            ember.position.y += (EMBER_RISE + sway) * cx.dt;
            if ember.position.y > EMBER_CEILING {
                ember.position.y = 1.0 + rng.random_range(0.0..0.4);
            }
            let position = ember.position;
            let moved = cx
                .graph
                .update_transform(ember.node, |t| t.position = position)
                .and_then(|()| cx.graph.update_visual(ember.node, |v| v.opacity = opacity));
            if moved.is_err() {
                return EffectStatus::Finished;
            }
        }
        EffectStatus::Running
    });

    let targets = [
        ctx.renderer.create_target("embers-scene"),
        ctx.renderer.create_target("embers-bloom"),
        ctx.renderer.create_target("embers-overhead"),
    ];
    let [scene, bloom, overhead] = targets;
    let grade = EmberGrade {
        scene,
        bloom,
        overhead,
        overhead_camera: Camera::new()
            .at(Vec3::new(0.0, 9.0, 0.5))
            .looking_at(Vec3::new(0.0, 0.0, -0.8))
            .with_fov(50.0),
    };
    let handle = match ctx.override_slot.install(Box::new(grade)) {
        Ok(handle) => handle,
        Err(err) => {
            for target in targets {
                ctx.renderer.release_target(target);
            }
            return Err(err.into());
        }
    };

    Ok(Some(Box::new(move |ctx: &mut SceneContext<'_>| {
        if let Err(err) = ctx.override_slot.restore(handle) {
            log::warn!("embers teardown: {err}");
        }
        for target in targets {
            ctx.renderer.release_target(target);
        }
        ctx.animations.remove(drift);
        if let Err(err) = ctx.graph.despawn(root) {
            log::warn!("embers teardown: {err}");
        }
        *ctx.render_state = saved_state;
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{RenderCall, Renderer};
    use crate::test_support::SceneFixture;

    #[test]
    fn chain_runs_overhead_then_bloom_then_film() {
        let mut fixture = SceneFixture::new();
        let _teardown = fixture.mount(mount).unwrap().unwrap();
        assert_eq!(fixture.render_state.clear_color, BACKGROUND);
        assert_eq!(fixture.render_state.exposure, 1.35);

        fixture.renderer.clear_calls();
        fixture.draw();
        let calls = fixture.renderer.calls_in_frame(0).cloned().collect::<Vec<_>>();
        assert_eq!(calls.len(), 4);
        assert!(matches!(
            calls[0],
            RenderCall::DrawScene { pair, target: DrawTarget::Offscreen(_), .. } if pair == OVERHEAD_PAIR
        ));
        assert!(matches!(
            calls[1],
            RenderCall::DrawScene { pair, target: DrawTarget::Offscreen(_), .. } if pair.is_primary()
        ));
        assert!(matches!(
            calls[2],
            RenderCall::PostProcess { effect: PostEffect::Bloom { .. }, output: DrawTarget::Offscreen(_), .. }
        ));
        assert!(matches!(
            calls[3],
            RenderCall::PostProcess { effect: PostEffect::Film { .. }, output: DrawTarget::Screen, .. }
        ));
    }

    #[test]
    fn embers_rise_and_wrap() {
        let mut fixture = SceneFixture::new();
        let _teardown = fixture.mount(mount).unwrap().unwrap();
        for _ in 0..200 {
            fixture.tick(0.1);
        }
        let embers = fixture.graph.children(fixture.content_root)[0];
        let field = fixture
            .graph
            .children(embers)
            .into_iter()
            .find(|&n| fixture.graph.name(n).as_deref() == Some("ember-field"))
            .unwrap();
        let nodes = fixture.graph.children(field);
        assert_eq!(nodes.len(), EMBER_COUNT);
        for node in nodes {
            let y = fixture.graph.transform(node).unwrap().position.y;
            assert!((0.9..=EMBER_CEILING + 0.1).contains(&y), "ember at {y}");
        }
    }

    #[test]
    fn teardown_releases_targets_and_state() {
        let mut fixture = SceneFixture::new();
        let state_before = fixture.render_state;
        let teardown = fixture.mount(mount).unwrap().unwrap();
        assert_eq!(fixture.renderer.live_targets(), 3);

        fixture.unmount(teardown);
        assert_eq!(fixture.renderer.live_targets(), 0);
        assert_eq!(fixture.render_state, state_before);
        assert!(!fixture.override_slot.is_installed());
        assert_eq!(fixture.content_nodes(), 0);
    }
}
