use std::f32::consts::TAU;

use glam::Vec2;
use rand::Rng;
use rand::rngs::StdRng;

use super::{
    Easing, PendingSnapshot, Step, StepContext, StrategyKind, TransitionPhase, TransitionStrategy,
    Tween,
};
use crate::error::TransitionError;
use crate::overlay::{LayerId, LayerKind, SnapshotEffect};

const SPLIT_SECONDS: f32 = 0.3;
const DRIFT_SECONDS: f32 = 0.55;
/// Channel separation at the swap, in pixels.
const MAX_SPLIT: f32 = 14.0;
/// Extra separation gained while fading out.
const DRIFT_SPLIT: f32 = 26.0;

/// Freeze the outgoing frame, pull its color channels apart along a random
/// direction, swap underneath, then let the ghost drift off as it fades.
#[derive(Debug)]
pub struct ChannelDrift {
    phase: TransitionPhase,
    direction: Vec2,
    pending: Option<PendingSnapshot>,
    layer: Option<LayerId>,
    tween: Tween,
    done: bool,
}

impl ChannelDrift {
    pub fn new(rng: &mut StdRng) -> Self {
        let angle = rng.random_range(0.0..TAU);
        Self {
            phase: TransitionPhase::Idle,
            direction: Vec2::from_angle(angle),
            pending: None,
            layer: None,
            tween: Tween::new(0.0, 0.0, 0.0),
            done: false,
        }
    }

    fn apply(&self, cx: &mut StepContext<'_>, split: f32, opacity: f32) {
        let Some(layer) = self.layer.and_then(|id| cx.overlay.layer_mut(id)) else {
            return;
        };
        layer.opacity = opacity.clamp(0.0, 1.0);
        if let LayerKind::Snapshot { effect, .. } = &mut layer.kind {
            *effect = SnapshotEffect::ChannelSplit {
                offset: self.direction * split,
            };
        }
    }
}

impl TransitionStrategy for ChannelDrift {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ChannelDrift
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
                if let Some(image) = pending.poll(cx)? {
                    self.pending = None;
                    self.layer = Some(cx.push_layer(
                        LayerKind::Snapshot {
                            image,
                            effect: SnapshotEffect::ChannelSplit { offset: Vec2::ZERO },
                        },
                        1.0,
                    ));
                    self.tween = Tween::new(0.0, MAX_SPLIT, cx.scaled(SPLIT_SECONDS))
                        .easing(Easing::EaseIn);
                    self.phase = TransitionPhase::AnimatingIn;
                }
            }
            TransitionPhase::AnimatingIn => {
                let split = self.tween.advance(cx.dt);
                self.apply(cx, split, 1.0);
                if self.tween.is_finished() {
                    self.phase = TransitionPhase::LoadingNew;
                    return Ok(Step::Swap);
                }
            }
            TransitionPhase::LoadingNew => {
                self.tween = Tween::new(0.0, 1.0, cx.scaled(DRIFT_SECONDS)).easing(Easing::EaseOut);
                self.phase = TransitionPhase::AnimatingOut;
            }
            _ => {
                let t = self.tween.advance(cx.dt);
                self.apply(cx, MAX_SPLIT + DRIFT_SPLIT * t, 1.0 - t);
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

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::super::testing::Harness;
    use super::*;

    #[test]
    fn captures_before_covering() {
        let mut harness = Harness::new();
        let mut drift = ChannelDrift::new(&mut StdRng::seed_from_u64(5));
        harness.step(&mut drift).unwrap();
        assert_eq!(drift.phase(), TransitionPhase::Snapshotting);
        assert!(harness.overlay.is_empty());

        harness.step(&mut drift).unwrap();
        assert_eq!(drift.phase(), TransitionPhase::AnimatingIn);
        assert_eq!(harness.overlay.len(), 1);
        assert_eq!(harness.renderer.capture_requests(), 1);
    }

    #[test]
    fn drift_follows_the_chosen_direction() {
        let mut harness = Harness::new();
        let mut drift = ChannelDrift::new(&mut StdRng::seed_from_u64(9));
        let direction = drift.direction;
        loop {
            if harness.step(&mut drift).unwrap() == Step::Swap {
                break;
            }
        }
        let LayerKind::Snapshot {
            effect: SnapshotEffect::ChannelSplit { offset },
            ..
        } = &harness.overlay.layers()[0].kind
        else {
            panic!("expected a channel split layer");
        };
        assert!((offset.length() - MAX_SPLIT).abs() < 1e-3);
        assert!(offset.normalize().dot(direction) > 0.999);
    }
}
