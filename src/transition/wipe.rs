use std::f32::consts::TAU;
use std::rc::Rc;

use glam::Vec2;
use rand::Rng;
use rand::rngs::StdRng;

use super::{
    Easing, PendingSnapshot, Step, StepContext, StrategyKind, TransitionPhase, TransitionStrategy,
    Tween,
};
use crate::error::TransitionError;
use crate::overlay::{LayerId, LayerKind, SnapshotEffect};
use crate::snapshot::{FrameSnapshot, MaskImage};

const WIPE_SECONDS: f32 = 0.8;
const SOFTNESS: f32 = 0.06;

/// Capture before, cover, swap, capture after, then wipe the cover away
/// along a random direction. The edge runs ahead wherever the two frames
/// differ most.
#[derive(Debug)]
pub struct DirectionalWipe {
    phase: TransitionPhase,
    direction: Vec2,
    pending: Option<PendingSnapshot>,
    before: Option<Rc<FrameSnapshot>>,
    mask: Option<Rc<MaskImage>>,
    layer: Option<LayerId>,
    tween: Tween,
    done: bool,
}

impl DirectionalWipe {
    pub fn new(rng: &mut StdRng) -> Self {
        Self {
            phase: TransitionPhase::Idle,
            direction: Vec2::from_angle(rng.random_range(0.0..TAU)),
            pending: None,
            before: None,
            mask: None,
            layer: None,
            tween: Tween::new(0.0, 0.0, 0.0),
            done: false,
        }
    }

    fn apply(&self, cx: &mut StepContext<'_>, progress: f32) {
        let (Some(layer), Some(mask)) = (
            self.layer.and_then(|id| cx.overlay.layer_mut(id)),
            self.mask.as_ref(),
        ) else {
            return;
        };
        if let LayerKind::Snapshot { effect, .. } = &mut layer.kind {
            *effect = SnapshotEffect::Wipe {
                mask: Rc::clone(mask),
                direction: self.direction,
                progress,
                softness: SOFTNESS,
            };
        }
    }

    fn poll(&mut self, cx: &mut StepContext<'_>) -> Result<Option<Rc<FrameSnapshot>>, TransitionError> {
        let Some(pending) = self.pending.as_mut() else {
            return Err(TransitionError::Decode("capture was never requested".into()));
        };
        let image = pending.poll(cx)?;
        if image.is_some() {
            self.pending = None;
        }
        Ok(image)
    }
}

impl TransitionStrategy for DirectionalWipe {
    fn kind(&self) -> StrategyKind {
        StrategyKind::DirectionalWipe
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
                let Some(before) = self.poll(cx)? else {
                    return Ok(Step::Continue);
                };
                self.layer = Some(cx.push_layer(
                    LayerKind::Snapshot {
                        image: Rc::clone(&before),
                        effect: SnapshotEffect::Plain,
                    },
                    1.0,
                ));
                self.before = Some(before);
                self.phase = TransitionPhase::UnloadingOld;
                return Ok(Step::Swap);
            }
            TransitionPhase::UnloadingOld => {
                // The new module is mounted; its first frame is drawn after this step.
                self.pending = Some(cx.request_snapshot());
                self.phase = TransitionPhase::LoadingNew;
            }
            TransitionPhase::LoadingNew => {
                let Some(after) = self.poll(cx)? else {
                    return Ok(Step::Continue);
                };
                let Some(before) = self.before.take() else {
                    return Err(TransitionError::Decode("missing before capture".into()));
                };
                let mask = Rc::new(before.difference(&after));
                log::debug!("difference mask #{} mean {:.3}", mask.id(), mask.mean());
                self.mask = Some(mask);
                self.apply(cx, 0.0);
                self.tween = Tween::new(0.0, 1.0, cx.scaled(WIPE_SECONDS)).easing(Easing::EaseInOut);
                self.phase = TransitionPhase::AnimatingOut;
            }
            _ => {
                let progress = self.tween.advance(cx.dt);
                self.apply(cx, progress);
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
