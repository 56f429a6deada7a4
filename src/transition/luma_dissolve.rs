use std::rc::Rc;

use super::{
    Easing, PendingSnapshot, Step, StepContext, StrategyKind, TransitionPhase, TransitionStrategy,
    Tween,
};
use crate::error::TransitionError;
use crate::overlay::{LayerId, LayerKind, SnapshotEffect};
use crate::snapshot::MaskImage;

const DISSOLVE_SECONDS: f32 = 0.9;
const SOFTNESS: f32 = 0.08;

/// Cover the screen with the outgoing frame, swap underneath, then dissolve
/// the cover by luminance: shadows go first, highlights linger.
#[derive(Debug)]
pub struct LumaDissolve {
    phase: TransitionPhase,
    pending: Option<PendingSnapshot>,
    layer: Option<LayerId>,
    mask: Option<Rc<MaskImage>>,
    tween: Tween,
    done: bool,
}

impl LumaDissolve {
    pub fn new() -> Self {
        Self {
            phase: TransitionPhase::Idle,
            pending: None,
            layer: None,
            mask: None,
            tween: Tween::new(0.0, 0.0, 0.0),
            done: false,
        }
    }

    fn apply(&self, cx: &mut StepContext<'_>, threshold: f32) {
        let (Some(layer), Some(mask)) = (
            self.layer.and_then(|id| cx.overlay.layer_mut(id)),
            self.mask.as_ref(),
        ) else {
            return;
        };
        if let LayerKind::Snapshot { effect, .. } = &mut layer.kind {
            *effect = SnapshotEffect::Dissolve {
                mask: Rc::clone(mask),
                threshold,
                softness: SOFTNESS,
            };
        }
    }
}

impl Default for LumaDissolve {
    fn default() -> Self {
        Self::new()
    }
}

impl TransitionStrategy for LumaDissolve {
    fn kind(&self) -> StrategyKind {
        StrategyKind::LumaDissolve
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
                self.phase = TransitionPhase::OverlayBuilding;

                let mask = Rc::new(image.luminance_mask());
                log::debug!(
                    "luminance mask #{} ready, mean {:.2}",
                    mask.id(),
                    mask.mean()
                );
                self.layer = Some(cx.push_layer(
                    LayerKind::Snapshot {
                        image,
                        effect: SnapshotEffect::Dissolve {
                            mask: Rc::clone(&mask),
                            threshold: -SOFTNESS,
                            softness: SOFTNESS,
                        },
                    },
                    1.0,
                ));
                self.mask = Some(mask);
                self.phase = TransitionPhase::LoadingNew;
                return Ok(Step::Swap);
            }
            TransitionPhase::LoadingNew => {
                self.tween = Tween::new(-SOFTNESS, 1.0 + SOFTNESS, cx.scaled(DISSOLVE_SECONDS))
                    .easing(Easing::EaseInOut);
                self.phase = TransitionPhase::AnimatingOut;
            }
            _ => {
                let threshold = self.tween.advance(cx.dt);
                self.apply(cx, threshold);
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
    use super::super::testing::Harness;
    use super::*;
    use crate::overlay::dissolve_coverage;

    fn threshold(harness: &Harness) -> f32 {
        match &harness.overlay.layers()[0].kind {
            LayerKind::Snapshot {
                effect: SnapshotEffect::Dissolve { threshold, .. },
                ..
            } => *threshold,
            other => panic!("unexpected layer {other:?}"),
        }
    }

    #[test]
    fn cover_is_complete_at_swap_and_gone_at_the_end() {
        let mut harness = Harness::new();
        let mut dissolve = LumaDissolve::new();
        let mut step = harness.step(&mut dissolve).unwrap();
        while step != Step::Swap {
            step = harness.step(&mut dissolve).unwrap();
        }
        let t = threshold(&harness);
        assert!(dissolve_coverage(0.0, t, SOFTNESS) > 0.999);

        while step != Step::Done {
            step = harness.step(&mut dissolve).unwrap();
        }
        let t = threshold(&harness);
        assert!(dissolve_coverage(1.0, t, SOFTNESS) < 0.001);
    }
}
