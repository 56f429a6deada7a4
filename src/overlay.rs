//! Layers drawn over the presented frame by running transitions.
//!
//! Every layer belongs to the transition token that pushed it. When a
//! transition completes, faults, or is superseded, the host removes its
//! layers with [`OverlayStage::clear_owner`]. That way an abandoned
//! transition cannot leave a black sheet or a frozen snapshot behind.
//!
//! The per-pixel coverage functions below are the CPU reference for the
//! overlay shader. The shader evaluates the same formulas.

use std::rc::Rc;

use glam::Vec2;

use crate::color::Color;
use crate::snapshot::{FrameSnapshot, MaskImage};
use crate::transition::TransitionToken;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(u64);

/// How a snapshot layer is shaded.
#[derive(Clone, Debug)]
pub enum SnapshotEffect {
    Plain,
    /// Red is sampled at `+offset`, blue at `-offset`, in pixels.
    ChannelSplit { offset: Vec2 },
    /// Pixels whose mask value is below `threshold` become transparent.
    Dissolve {
        mask: Rc<MaskImage>,
        threshold: f32,
        softness: f32,
    },
    /// A directional edge sweeps across, bent forward where `mask` is high.
    Wipe {
        mask: Rc<MaskImage>,
        direction: Vec2,
        progress: f32,
        softness: f32,
    },
    /// A radial displacement ring. `center` is in UV space.
    Ripple {
        center: Vec2,
        radius: f32,
        amplitude: f32,
        width: f32,
    },
}

#[derive(Clone, Debug)]
pub enum LayerKind {
    Solid {
        color: Color,
    },
    Snapshot {
        image: Rc<FrameSnapshot>,
        effect: SnapshotEffect,
    },
    /// Not drawn. Widens the primary camera's field of view by `fov_delta` degrees.
    CameraPunch {
        fov_delta: f32,
    },
}

#[derive(Clone, Debug)]
pub struct OverlayLayer {
    pub id: LayerId,
    pub owner: TransitionToken,
    pub kind: LayerKind,
    pub opacity: f32,
}

impl OverlayLayer {
    pub fn is_drawn(&self) -> bool {
        !matches!(self.kind, LayerKind::CameraPunch { .. }) && self.opacity > 0.0
    }
}

/// Ordered overlay layers, bottom first.
#[derive(Debug, Default)]
pub struct OverlayStage {
    layers: Vec<OverlayLayer>,
    next_id: u64,
}

impl OverlayStage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, owner: TransitionToken, kind: LayerKind, opacity: f32) -> LayerId {
        self.next_id += 1;
        let id = LayerId(self.next_id);
        self.layers.push(OverlayLayer {
            id,
            owner,
            kind,
            opacity: opacity.clamp(0.0, 1.0),
        });
        id
    }

    pub fn layer(&self, id: LayerId) -> Option<&OverlayLayer> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn layer_mut(&mut self, id: LayerId) -> Option<&mut OverlayLayer> {
        self.layers.iter_mut().find(|l| l.id == id)
    }

    pub fn set_opacity(&mut self, id: LayerId, opacity: f32) {
        if let Some(layer) = self.layer_mut(id) {
            layer.opacity = opacity.clamp(0.0, 1.0);
        }
    }

    pub fn remove(&mut self, id: LayerId) -> bool {
        let before = self.layers.len();
        self.layers.retain(|l| l.id != id);
        before != self.layers.len()
    }

    /// Remove every layer pushed by `owner`.
    pub fn clear_owner(&mut self, owner: TransitionToken) -> usize {
        let before = self.layers.len();
        self.layers.retain(|l| l.owner != owner);
        before - self.layers.len()
    }

    pub fn owned_by(&self, owner: TransitionToken) -> usize {
        self.layers.iter().filter(|l| l.owner == owner).count()
    }

    pub fn clear(&mut self) {
        self.layers.clear();
    }

    pub fn layers(&self) -> &[OverlayLayer] {
        &self.layers
    }

    /// Layers that produce pixels, bottom first.
    pub fn drawn(&self) -> impl Iterator<Item = &OverlayLayer> {
        self.layers.iter().filter(|l| l.is_drawn())
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Total field-of-view widening requested by camera punch layers.
    pub fn fov_offset(&self) -> f32 {
        self.layers
            .iter()
            .map(|l| match l.kind {
                LayerKind::CameraPunch { fov_delta } => fov_delta,
                _ => 0.0,
            })
            .sum()
    }
}

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Coverage of the old frame during a luminance dissolve.
///
/// `threshold` runs from `-softness` (fully covered) to `1 + softness`
/// (fully revealed). Dark pixels go first.
pub fn dissolve_coverage(mask: f32, threshold: f32, softness: f32) -> f32 {
    smoothstep(threshold - softness, threshold + softness, mask)
}

/// Coverage of the old frame during a directional wipe.
///
/// `uv` is the pixel position in `[0, 1]²`. The edge travels along
/// `direction`; `mask` pulls the edge forward by up to a quarter screen
/// where the frames differ most. Full cover at `progress = 0`, none at 1.
pub fn wipe_coverage(uv: Vec2, direction: Vec2, mask: f32, progress: f32, softness: f32) -> f32 {
    let dir = direction.try_normalize().unwrap_or(Vec2::X);
    let span = dir.x.abs() + dir.y.abs();
    let along = ((uv - Vec2::splat(0.5)).dot(dir) / span) + 0.5;
    let s = along - mask * 0.25;
    let edge = (-0.25 - softness) + (1.25 + 2.0 * softness) * progress.clamp(0.0, 1.0);
    smoothstep(edge - softness, edge + softness, s)
}
