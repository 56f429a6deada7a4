use std::f32::consts::{FRAC_PI_2, TAU};

use glam::{Quat, Vec3};
use rand::Rng;

use crate::camera::CameraPose;
use crate::color::Color;
use crate::effects::EffectStatus;
use crate::error::{GraphError, MountError};
use crate::mesh::{Shape, Transform};
use crate::module::{SceneContext, Teardown};
use crate::override_slot::{CompositePass, Compositor};
use crate::render::{DrawTarget, Fog, Lighting, PostEffect, TargetId, ToneMapping};
use crate::scene_graph::{NodeId, SceneGraph, Visual};

const BACKGROUND: Color = Color::hex(0x191925);
const FOG_DENSITY: f32 = 0.04;

const BIRD_COUNT: usize = 3;
const PATH_RADIUS: f32 = 3.0;
const PATH_SPEED: f32 = 0.2;
const CRUISE_HEIGHT: f32 = 1.8;
const HEIGHT_VARIATION: f32 = 0.3;
const FLAP_SPEED: f32 = 0.8 * TAU;
const FLAP_AMPLITUDE: f32 = 0.25;
const SPREAD: Vec3 = Vec3::new(2.5, 1.2, 2.5);
const OFFSET_RANDOMNESS: f32 = 0.8;

const CAMERA_POSITION: Vec3 = Vec3::new(4.0, 2.5, 6.0);
const LOOK_TARGET: Vec3 = Vec3::new(0.0, 1.6, 0.0);
const CAMERA_FOV: f32 = 60.0;
const CAMERA_DRIFT_RADIUS: f32 = 0.2;
const CAMERA_DRIFT_SPEED: f32 = 0.1;

struct Bird {
    body: NodeId,
    wing_left: NodeId,
    wing_right: NodeId,
    path_offset: f32,
    height_offset: f32,
    flap_phase: f32,
    center_offset: Vec3,
}

impl Bird {
    fn spawn(
        graph: &mut SceneGraph,
        parent: NodeId,
        index: usize,
        rng: &mut impl Rng,
    ) -> Result<Self, GraphError> {
        let feathers = Color::hex(0xe6e6f6);
        let body = graph.spawn(parent, &format!("bird-{index}"), Transform::new())?;
        graph.spawn_visual(
            body,
            "torso",
            Transform::new().scale(Vec3::new(0.46, 0.2, 0.2)),
            Visual::new(Shape::Sphere, feathers),
        )?;
        graph.spawn_visual(
            body,
            "head",
            Transform::from_position(Vec3::new(0.22, 0.05, 0.0)).uniform_scale(0.18),
            Visual::new(Shape::Sphere, feathers),
        )?;
        graph.spawn_visual(
            body,
            "beak",
            Transform::from_position(Vec3::new(0.33, 0.04, 0.0)).scale(Vec3::new(0.12, 0.04, 0.04)),
            Visual::new(Shape::Cube, Color::hex(0xffc36b)),
        )?;
        graph.spawn_visual(
            body,
            "tail",
            Transform::from_position(Vec3::new(-0.26, 0.0, 0.0)).scale(Vec3::new(0.18, 0.02, 0.12)),
            Visual::new(Shape::Cube, feathers),
        )?;

        // Each wing hinges at the shoulder and extends sideways from it.
        let mut wing = |name: &str, side: f32| -> Result<NodeId, GraphError> {
            let hinge = graph.spawn(
                body,
                name,
                Transform::from_position(Vec3::new(0.0, 0.05, 0.08 * side)),
            )?;
            graph.spawn_visual(
                hinge,
                "feathers",
                Transform::from_position(Vec3::new(0.0, 0.0, 0.25 * side))
                    .scale(Vec3::new(0.18, 1.0, 0.5)),
                Visual::new(Shape::Plane, feathers),
            )?;
            Ok(hinge)
        };
        let wing_left = wing("wing-left", 1.0)?;
        let wing_right = wing("wing-right", -1.0)?;

        let center_offset = Vec3::new(
            rng.random_range(-0.5..0.5) * SPREAD.x,
            rng.random_range(-0.5..0.5) * SPREAD.y,
            rng.random_range(-0.5..0.5) * SPREAD.z,
        ) * OFFSET_RANDOMNESS;

        Ok(Self {
            body,
            wing_left,
            wing_right,
            path_offset: rng.random_range(0.0..TAU),
            height_offset: rng.random_range(0.0..TAU),
            flap_phase: rng.random_range(0.0..TAU),
            center_offset,
        })
    }

    fn update(&mut self, graph: &mut SceneGraph, time: f32, dt: f32) -> Result<(), GraphError> {
        let angle = time * PATH_SPEED + self.path_offset;
        let radius = PATH_RADIUS + (time * 0.15 + self.path_offset).sin() * 0.2;
        let height = CRUISE_HEIGHT + (time * 0.4 + self.height_offset).sin() * HEIGHT_VARIATION;
        let position = Vec3::new(angle.cos() * radius, height, angle.sin() * radius) + self.center_offset;

        // Local +X is the beak; turn it along the path tangent.
        let heading = Quat::from_rotation_y(-angle - FRAC_PI_2);
        graph.update_transform(self.body, |t| {
            t.position = position;
            t.rotation = heading;
        })?;

        self.flap_phase += dt * FLAP_SPEED;
        let lift = 0.1 + self.flap_phase.sin() * FLAP_AMPLITUDE;
        graph.update_transform(self.wing_left, |t| t.rotation = Quat::from_rotation_x(-lift))?;
        graph.update_transform(self.wing_right, |t| t.rotation = Quat::from_rotation_x(lift))?;
        Ok(())
    }
}

/// Draws the scene offscreen, then adds a soft bloom on the way to the screen.
struct SoftBloom {
    scene: TargetId,
}

impl Compositor for SoftBloom {
    fn composite(&mut self, pass: &mut CompositePass<'_, '_>) {
        pass.draw(DrawTarget::Offscreen(self.scene));
        pass.post(
            PostEffect::Bloom {
                threshold: 0.85,
                strength: 0.2,
                radius: 0.8,
            },
            self.scene,
            DrawTarget::Screen,
        );
    }
}

fn build_set(graph: &mut SceneGraph, root: NodeId) -> Result<(), GraphError> {
    graph.spawn_visual(
        root,
        "ground",
        Transform::from_position(Vec3::new(0.0, -0.05, 0.0)).scale(Vec3::new(8.4, 0.1, 8.4)),
        Visual::new(Shape::Sphere, Color::hex(0x161623)),
    )?;
    graph.spawn_visual(
        root,
        "ribbon",
        Transform::from_position(Vec3::new(0.0, 1.4, 0.0)).scale(Vec3::new(2.2, 0.4, 2.2)),
        Visual::new(Shape::Torus, Color::hex(0x2f3e6b))
            .opacity(0.8)
            .emissive(0.3),
    )?;
    for i in 0..6 {
        let angle = i as f32 / 6.0 * TAU + 0.4;
        let distance = 2.6 + (i % 3) as f32 * 0.5;
        graph.spawn_visual(
            root,
            "rock",
            Transform::from_position(Vec3::new(angle.cos() * distance, 0.1, angle.sin() * distance))
                .scale(Vec3::new(0.5, 0.3, 0.45) * (0.7 + (i % 2) as f32 * 0.4)),
            Visual::new(Shape::Sphere, Color::hex(0x24243a)),
        )?;
    }
    Ok(())
}

/// Three birds circling under a dusk sky.
pub fn mount(ctx: &mut SceneContext<'_>) -> Result<Option<Teardown>, MountError> {
    let mut rng = rand::rng();

    let root = ctx.graph.spawn(ctx.content_root, "flock", Transform::new())?;
    build_set(ctx.graph, root)?;
    let mut birds = Vec::with_capacity(BIRD_COUNT);
    for i in 0..BIRD_COUNT {
        birds.push(Bird::spawn(ctx.graph, root, i, &mut rng)?);
    }

    let saved_state = *ctx.render_state;
    let saved_pose = ctx.camera.pose();

    let state = &mut *ctx.render_state;
    state.clear_color = BACKGROUND;
    state.fog = Some(Fog {
        color: BACKGROUND,
        density: FOG_DENSITY,
    });
    state.tone_mapping = ToneMapping::Aces;
    state.exposure = 1.1;
    state.lighting = Lighting {
        sky: Color::hex(0xbfc6ff),
        ground: BACKGROUND,
        hemisphere_intensity: 0.5,
        sun_color: Color::hex(0x9aa3ff),
        sun_intensity: 0.8,
        sun_position: Vec3::new(3.0, 4.0, 2.0),
    };
    ctx.camera.set_pose(CameraPose {
        position: CAMERA_POSITION,
        target: LOOK_TARGET,
        fov: CAMERA_FOV,
    });

    let mut drift = 0.0_f32;
    let flight = ctx.animations.add("flock-flight", move |cx| {
        for bird in &mut birds {
            if let Err(err) = bird.update(cx.graph, cx.time, cx.dt) {
                log::warn!("flock stopped: {err}");
                return EffectStatus::Finished;
            }
        }
        drift += cx.dt * CAMERA_DRIFT_SPEED;
        cx.camera.position =
            CAMERA_POSITION + Vec3::new(drift.cos(), 0.0, drift.sin()) * CAMERA_DRIFT_RADIUS;
        cx.camera.target = LOOK_TARGET;
        EffectStatus::Running
    });

    let scene_target = ctx.renderer.create_target("flock-scene");
    let handle = match ctx.override_slot.install(Box::new(SoftBloom {
        scene: scene_target,
    })) {
        Ok(handle) => handle,
        Err(err) => {
            ctx.renderer.release_target(scene_target);
            return Err(err.into());
        }
    };

    Ok(Some(Box::new(move |ctx: &mut SceneContext<'_>| {
        if let Err(err) = ctx.override_slot.restore(handle) {
            log::warn!("flock teardown: {err}");
        }
        ctx.renderer.release_target(scene_target);
        ctx.animations.remove(flight);
        if let Err(err) = ctx.graph.despawn(root) {
            log::warn!("flock teardown: {err}");
        }
        *ctx.render_state = saved_state;
        ctx.camera.set_pose(saved_pose);
    })))
}
