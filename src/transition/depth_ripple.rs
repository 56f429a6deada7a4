use glam::Vec2;
use rand::Rng;
use rand::rngs::StdRng;

use super::{
    Easing, PendingSnapshot, Step, StepContext, StrategyKind, TransitionPhase, TransitionStrategy,
    Tween,
};
use crate::error::TransitionError;
use crate::overlay::{LayerId, LayerKind, SnapshotEffect};

const GROW_SECONDS: f32 = 0.35;
const SPREAD_SECONDS: f32 = 0.6;
/// Ring radius at the swap, as a fraction of screen height.
const SWAP_RADIUS: f32 = 0.25;
const FINAL_RADIUS: f32 = 1.45;
const AMPLITUDE: f32 = 0.035;
const RING_WIDTH: f32 = 0.09;

/// Ripple the frozen outgoing frame from a random point, swap under it, then
/// let the ring run off screen while the frame fades.
#[derive(Debug)]
pub struct DepthRipple {
    phase: TransitionPhase,
    center: Vec2,
    pending: Option<PendingSnapshot>,
    layer: Option<LayerId>,
    tween: Tween,
    done: bool,
}

impl DepthRipple {
    pub fn new(rng: &mut StdRng) -> Self {
        Self {
            phase: TransitionPhase::Idle,
            center: Vec2::new(rng.random_range(0.2..0.8), rng.random_range(0.2..0.8)),
            pending: None,
            layer: None,
            tween: Tween::new(0.0, 0.0, 0.0),
            done: false,
        }
    }

    /// The ripple origin in UV space.
    pub fn center(&self) -> Vec2 {
        self.center
    }

    fn apply(&self, cx: &mut StepContext<'_>, radius: f32, amplitude: f32, opacity: f32) {
        let Some(layer) = self.layer.and_then(|id| cx.overlay.layer_mut(id)) else {
            return;
        };
        layer.opacity = opacity.clamp(0.0, 1.0);
        if let LayerKind::Snapshot { effect, .. } = &mut layer.kind {
            *effect = SnapshotEffect::Ripple {
                center: self.center,
                radius,
                amplitude,
                width: RING_WIDTH,
            };
        }
    }
}

impl TransitionStrategy for DepthRipple {
    fn kind(&self) -> StrategyKind {
        StrategyKind::DepthRipple
    }

    fn phase(&self) -> TransitionPhase {
        self.phase
    }

    fn step(&mut self, cx: &mut StepContext<'_>) -> Result<Step, TransitionError> {
        if self.done {
            return Ok(Step::Done);
        }
        match self.phase {
            TransitionPhase::Idle => {
                self.pending = Some(cx.request_snapshot());
                self.phase = TransitionPhase::Snapshotting;
            }
            TransitionPhase::Snapshotting => {
                let Some(pending) = self.pending.as_mut() else {
                    return Err(TransitionError::Decode("capture was never requested".into()));
                };
                let Some(image) = pending.poll(cx)? else {
                    return Ok(Step::Continue);
                };
                self.pending = None;
                self.layer = Some(cx.push_layer(
                    LayerKind::Snapshot {
                        image,
                        effect: SnapshotEffect::Ripple {
                            center: self.center,
                            radius: 0.0,
                            amplitude: 0.0,
                            width: RING_WIDTH,
                        },
                    },
                    1.0,
                ));
                self.tween = Tween::new(0.0, 1.0, cx.scaled(GROW_SECONDS)).easing(Easing::EaseOut);
                self.phase = TransitionPhase::AnimatingIn;
            }
            TransitionPhase::AnimatingIn => {
                let t = self.tween.advance(cx.dt);
                self.apply(cx, SWAP_RADIUS * t, AMPLITUDE * t, 1.0);
                if self.tween.is_finished() {
                    self.phase = TransitionPhase::LoadingNew;
                    return Ok(Step::Swap);
                }
            }
            TransitionPhase::LoadingNew => {
                self.tween =
                    Tween::new(0.0, 1.0, cx.scaled(SPREAD_SECONDS)).easing(Easing::CubicOut);
                self.phase = TransitionPhase::AnimatingOut;
            }
            _ => {
                let t = self.tween.advance(cx.dt);
                let radius = SWAP_RADIUS + (FINAL_RADIUS - SWAP_RADIUS) * t;
                self.apply(cx, radius, AMPLITUDE * (1.0 - t), 1.0 - t);
                if self.tween.is_finished() {
                    self.phase = TransitionPhase::Idle;
                    self.done = true;
                    return Ok(Step::Done);
                }
            }
        }
        Ok(Step::Continue)
    }
}
