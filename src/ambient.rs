//! Decoration that belongs to the host rather than to any scene module.
//!
//! - [`Backdrop`]: the floor and a small solar system, protected in the
//!   scene graph and kept in motion by one ambient effect.
//! - [`spawn_ripple`]: three rings that expand from a floor hit and clean
//!   up after themselves.
//! - [`GlitchPulse`]: a short jolt of the presented frame on every press.

use std::f32::consts::{PI, TAU};

use glam::{Vec2, Vec3};
use rand::Rng;

use crate::color::Color;
use crate::effects::{EffectId, EffectRegistry, EffectStatus};
use crate::error::GraphError;
use crate::mesh::{Shape, Transform};
use crate::scene_graph::{NodeId, SceneGraph, Visual};

/// Half the side length of the square floor.
pub const FLOOR_HALF_EXTENT: f32 = 25.0;

struct PlanetSpec {
    distance: f32,
    size: f32,
    color: u32,
    orbit_speed: f32,
    self_speed: f32,
    ring: bool,
}

const fn planet(distance: f32, size: f32, color: u32, orbit_speed: f32, self_speed: f32) -> PlanetSpec {
    PlanetSpec {
        distance,
        size,
        color,
        orbit_speed,
        self_speed,
        ring: false,
    }
}

const PLANETS: [PlanetSpec; 8] = [
    planet(1.1, 0.08, 0xb7b5ff, 1.2, 0.6),
    planet(1.5, 0.1, 0x74cfff, 0.9, 0.4),
    planet(1.9, 0.11, 0xffa66f, 0.7, 0.3),
    PlanetSpec {
        ring: true,
        ..planet(2.5, 0.16, 0xfff2a6, 0.5, 0.35)
    },
    planet(3.1, 0.14, 0xa8b4ff, 0.32, 0.25),
    planet(3.8, 0.12, 0x9ee6ff, 0.22, 0.2),
    planet(4.4, 0.11, 0x7fa7ff, 0.18, 0.18),
    planet(5.2, 0.1, 0xe0e8ff, 0.12, 0.16),
];

/// Self rotation in radians per second per unit of `self_speed`.
const SPIN_RATE: f32 = 0.6;

/// One orbiting planet.
#[derive(Clone, Debug)]
pub struct Planet {
    /// Pivot at the sun; its yaw is the orbit angle.
    pub orbit: NodeId,
    pub body: NodeId,
    pub ring: Option<NodeId>,
    orbit_speed: f32,
    self_speed: f32,
    tilt: f32,
    index: usize,
}

/// The host's fixed scenery. Every node is protected.
#[derive(Clone, Debug)]
pub struct Backdrop {
    pub floor: NodeId,
    pub solar_root: NodeId,
    pub sun: NodeId,
    pub glow: NodeId,
    pub planets: Vec<Planet>,
    pub orbit_paths: Vec<NodeId>,
}

impl Backdrop {
    pub fn build(graph: &mut SceneGraph) -> Result<Self, GraphError> {
        let root = graph.root();
        let floor = graph.spawn_visual(
            root,
            "floor",
            Transform::new().scale(Vec3::new(
                FLOOR_HALF_EXTENT * 2.0,
                1.0,
                FLOOR_HALF_EXTENT * 2.0,
            )),
            Visual::new(Shape::Plane, Color::hex(0x222233)),
        )?;

        let solar_root = graph.spawn(root, "solar-system", Transform::from_position(Vec3::Y))?;
        let sun = graph.spawn_visual(
            solar_root,
            "sun",
            Transform::new().uniform_scale(1.2),
            Visual::new(Shape::Sphere, Color::hex(0xffd27f)).emissive(1.8),
        )?;
        let glow = graph.spawn_visual(
            solar_root,
            "sun-glow",
            Transform::new().uniform_scale(1.7),
            Visual::new(Shape::Sphere, Color::hex(0xffe5a1))
                .opacity(0.2)
                .emissive(1.0),
        )?;

        let mut planets = Vec::with_capacity(PLANETS.len());
        let mut orbit_paths = Vec::with_capacity(PLANETS.len());
        for (index, spec) in PLANETS.iter().enumerate() {
            let tilt = 0.3 + index as f32 * 0.05;
            let orbit = graph.spawn(
                solar_root,
                &format!("orbit-{index}"),
                Transform::new().euler(0.05 * index as f32, 0.0, 0.0),
            )?;
            orbit_paths.push(graph.spawn_visual(
                solar_root,
                &format!("orbit-path-{index}"),
                Transform::new().uniform_scale(spec.distance),
                Visual::new(Shape::OrbitPath, Color::hex(0x2a2a40)).opacity(0.6),
            )?);
            let body = graph.spawn_visual(
                orbit,
                &format!("planet-{index}"),
                Transform::from_position(Vec3::X * spec.distance)
                    .euler(tilt, 0.0, 0.0)
                    .uniform_scale(spec.size * 2.0),
                Visual::new(Shape::Sphere, Color::hex(spec.color)),
            )?;
            let ring = if spec.ring {
                // Child of the body, so sizes are relative to its diameter.
                Some(graph.spawn_visual(
                    body,
                    &format!("planet-{index}-ring"),
                    Transform::new().euler(PI / 3.0, 0.0, 0.0).uniform_scale(0.85),
                    Visual::new(Shape::Torus, Color::hex(0xd9d3a1)).opacity(0.6),
                )?)
            } else {
                None
            };
            planets.push(Planet {
                orbit,
                body,
                ring,
                orbit_speed: spec.orbit_speed,
                self_speed: spec.self_speed,
                tilt,
                index,
            });
        }

        let backdrop = Self {
            floor,
            solar_root,
            sun,
            glow,
            planets,
            orbit_paths,
        };
        for node in backdrop.nodes() {
            graph.protect(node)?;
        }
        Ok(backdrop)
    }

    /// Every node the backdrop owns.
    pub fn nodes(&self) -> Vec<NodeId> {
        let mut nodes = vec![self.floor, self.solar_root, self.sun, self.glow];
        nodes.extend(self.orbit_paths.iter().copied());
        for planet in &self.planets {
            nodes.push(planet.orbit);
            nodes.push(planet.body);
            nodes.extend(planet.ring);
        }
        nodes
    }

    /// Register the effect that keeps the planets moving.
    pub fn animate(&self, effects: &mut EffectRegistry) -> EffectId {
        let mut planets: Vec<(Planet, f32)> =
            self.planets.iter().map(|p| (p.clone(), 0.0)).collect();
        effects.add("solar-orbits", move |cx| {
            for (planet, spin) in &mut planets {
                *spin = (*spin + SPIN_RATE * planet.self_speed * cx.dt) % TAU;
                let yaw = cx.time * planet.orbit_speed;
                let pitch = 0.05 * planet.index as f32;
                let tilt = planet.tilt;
                let spin = *spin;
                let _ = cx.graph.update_transform(planet.orbit, |t| {
                    *t = t.euler(pitch, yaw, 0.0);
                });
                let _ = cx.graph.update_transform(planet.body, |t| {
                    *t = t.euler(tilt, spin, 0.0);
                });
            }
            EffectStatus::Running
        })
    }
}

const RIPPLE_SECONDS: f32 = 1.6;
const RIPPLE_RINGS: usize = 3;
const RIPPLE_START_SCALE: f32 = 0.2;

/// Spawn three expanding rings at `point` on the floor.
///
/// The rings live under the scene root, not the content root, so they keep
/// going across module swaps. The returned effect despawns them and
/// deregisters itself after 1.6 s.
pub fn spawn_ripple(
    graph: &mut SceneGraph,
    effects: &mut EffectRegistry,
    rng: &mut impl Rng,
    point: Vec3,
) -> Result<EffectId, GraphError> {
    let root = graph.root();
    let mut rings = Vec::with_capacity(RIPPLE_RINGS);
    for idx in 0..RIPPLE_RINGS {
        let radius = 0.1 + idx as f32 * 0.04;
        let node = graph.spawn_visual(
            root,
            &format!("ripple-{idx}"),
            Transform::from_position(point + Vec3::Y * 0.01)
                .uniform_scale(radius * RIPPLE_START_SCALE),
            Visual::new(Shape::Ring, Color::hex(0x9aa3ff))
                .opacity(ring_opacity(idx))
                .emissive(1.0),
        )?;
        rings.push((node, radius));
    }

    let max_radius = rng.random_range(2.4..4.0);
    let mut elapsed = 0.0;
    Ok(effects.add("pointer-ripple", move |cx| {
        elapsed += cx.dt;
        let k = (elapsed / RIPPLE_SECONDS).min(1.0);
        let eased = 1.0 - (1.0 - k).powi(3);
        let pulsate = 1.0 + (k * PI * 2.5).sin() * 0.05 * (1.0 - k);

        if k >= 1.0 {
            for (node, _) in &rings {
                let _ = cx.graph.despawn(*node);
            }
            return EffectStatus::Finished;
        }
        for (idx, (node, radius)) in rings.iter().enumerate() {
            let spread = max_radius * (1.0 + idx as f32 * 0.12);
            let scale = radius
                * (RIPPLE_START_SCALE + eased * (spread / RIPPLE_START_SCALE) * pulsate);
            let _ = cx.graph.update_transform(*node, |t| t.scale = Vec3::splat(scale));
            let _ = cx
                .graph
                .update_visual(*node, |v| v.opacity = ring_opacity(idx) * (1.0 - k));
        }
        EffectStatus::Running
    }))
}

fn ring_opacity(idx: usize) -> f32 {
    0.85 - idx as f32 * 0.2
}

/// How long the frame itself is displaced.
pub const GLITCH_CANVAS_SECONDS: f32 = 0.18;
/// How long the hue-shifted ghost lingers.
pub const GLITCH_OVERLAY_SECONDS: f32 = 0.24;

/// The glitch as it should look in one presented frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GlitchFrame {
    /// Frame translation in pixels.
    pub offset: Vec2,
    pub skew_degrees: f32,
    pub hue_degrees: f32,
    /// Ghost translation in pixels.
    pub overlay_shift: Vec2,
    /// Ghost strength, fading from 1 to 0.
    pub overlay_alpha: f32,
}

/// One press worth of glitch, with its random parameters fixed at trigger time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GlitchPulse {
    started: f32,
    offset: Vec2,
    skew_degrees: f32,
    shift: Vec2,
    hue_degrees: f32,
}

impl GlitchPulse {
    pub fn trigger(rng: &mut impl Rng, now: f32) -> Self {
        Self {
            started: now,
            offset: Vec2::new(rng.random_range(-9.0..9.0), rng.random_range(-6.0..6.0)),
            skew_degrees: rng.random_range(-1.2..1.2),
            shift: Vec2::new(rng.random_range(-12.0..12.0), rng.random_range(-9.0..9.0)),
            hue_degrees: rng.random_range(-15..15) as f32,
        }
    }

    pub fn is_expired(&self, now: f32) -> bool {
        now - self.started >= GLITCH_OVERLAY_SECONDS
    }

    /// The glitch at `now`, or `None` once it has fully expired.
    pub fn sample(&self, now: f32) -> Option<GlitchFrame> {
        let age = (now - self.started).max(0.0);
        if age >= GLITCH_OVERLAY_SECONDS {
            return None;
        }
        let canvas = age < GLITCH_CANVAS_SECONDS;
        Some(GlitchFrame {
            offset: if canvas { self.offset } else { Vec2::ZERO },
            skew_degrees: if canvas { self.skew_degrees } else { 0.0 },
            hue_degrees: self.hue_degrees,
            overlay_shift: self.shift,
            overlay_alpha: 1.0 - age / GLITCH_OVERLAY_SECONDS,
        })
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::camera::Camera;
    use crate::effects::FrameContext;
    use crate::render::RenderState;

    fn run_effects(graph: &mut SceneGraph, effects: &mut EffectRegistry, frames: usize) {
        let mut camera = Camera::new();
        let mut state = RenderState::default();
        for frame in 0..frames {
            effects.tick(&mut FrameContext {
                graph,
                camera: &mut camera,
                state: &mut state,
                time: frame as f32 / 60.0,
                dt: 1.0 / 60.0,
            });
        }
    }

    #[test]
    fn backdrop_cannot_be_despawned() {
        let mut graph = SceneGraph::new();
        let backdrop = Backdrop::build(&mut graph).unwrap();
        assert_eq!(backdrop.planets.len(), 8);
        assert_eq!(backdrop.planets.iter().filter(|p| p.ring.is_some()).count(), 1);
        for node in backdrop.nodes() {
            assert!(matches!(graph.despawn(node), Err(GraphError::Protected(_))));
        }
    }

    #[test]
    fn planets_orbit_over_time() {
        let mut graph = SceneGraph::new();
        let backdrop = Backdrop::build(&mut graph).unwrap();
        let mut effects = EffectRegistry::new();
        backdrop.animate(&mut effects);
        let body = backdrop.planets[0].body;
        let before = graph.world_matrix(body).unwrap().w_axis;
        run_effects(&mut graph, &mut effects, 30);
        let after = graph.world_matrix(body).unwrap().w_axis;
        assert!((before - after).length() > 0.1);
        assert_eq!(effects.len(), 1);
    }

    #[test]
    fn ripple_cleans_up_after_itself() {
        let mut graph = SceneGraph::new();
        let mut effects = EffectRegistry::new();
        let mut rng = StdRng::seed_from_u64(3);
        let nodes_before = graph.len();
        let id = spawn_ripple(&mut graph, &mut effects, &mut rng, Vec3::new(1.0, 0.0, 2.0)).unwrap();
        assert_eq!(graph.len(), nodes_before + RIPPLE_RINGS);

        run_effects(&mut graph, &mut effects, 60);
        assert!(effects.contains(id));
        assert_eq!(graph.len(), nodes_before + RIPPLE_RINGS);

        // 1.6 s at 60 fps, plus slack for float accumulation.
        run_effects(&mut graph, &mut effects, 40);
        assert!(!effects.contains(id));
        assert_eq!(graph.len(), nodes_before);
    }

    #[test]
    fn ripple_rings_grow() {
        let mut graph = SceneGraph::new();
        let mut effects = EffectRegistry::new();
        let mut rng = StdRng::seed_from_u64(3);
        spawn_ripple(&mut graph, &mut effects, &mut rng, Vec3::ZERO).unwrap();
        let ring = graph.children(graph.root())[0];
        let start = graph.transform(ring).unwrap().scale.x;
        run_effects(&mut graph, &mut effects, 30);
        assert!(graph.transform(ring).unwrap().scale.x > start * 5.0);
    }

    #[test]
    fn glitch_stays_within_bounds_and_expires() {
        let mut rng = StdRng::seed_from_u64(8);
        for _ in 0..200 {
            let pulse = GlitchPulse::trigger(&mut rng, 10.0);
            let frame = pulse.sample(10.0).unwrap();
            assert!(frame.offset.x.abs() <= 9.0 && frame.offset.y.abs() <= 6.0);
            assert!(frame.skew_degrees.abs() <= 1.2);
            assert!((-15.0..15.0).contains(&frame.hue_degrees));
            assert!(frame.overlay_shift.x.abs() <= 12.0 && frame.overlay_shift.y.abs() <= 9.0);
        }

        let pulse = GlitchPulse::trigger(&mut rng, 0.0);
        let late = pulse.sample(0.2).unwrap();
        assert_eq!(late.offset, Vec2::ZERO);
        assert_eq!(late.skew_degrees, 0.0);
        assert!(late.overlay_alpha > 0.0);
        assert!(pulse.sample(0.25).is_none());
        assert!(pulse.is_expired(0.25));
    }
}
