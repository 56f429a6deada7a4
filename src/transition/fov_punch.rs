use super::{Easing, Step, StepContext, StrategyKind, TransitionPhase, TransitionStrategy, Tween};
use crate::color::Color;
use crate::error::TransitionError;
use crate::overlay::{LayerId, LayerKind};

const PUNCH_OUT_DEGREES: f32 = 22.0;
const PUNCH_OUT_SECONDS: f32 = 0.35;
const PUNCH_IN_DEGREES: f32 = -10.0;
const PUNCH_IN_SECONDS: f32 = 0.5;
const FLASH_OPACITY: f32 = 0.18;

/// Widen the field of view with a faint flash, swap at the peak, then settle
/// from a narrowed view back to normal.
#[derive(Debug)]
pub struct FovPunch {
    phase: TransitionPhase,
    punch: Option<LayerId>,
    flash: Option<LayerId>,
    tween: Tween,
    done: bool,
}

impl FovPunch {
    pub fn new() -> Self {
        Self {
            phase: TransitionPhase::Idle,
            punch: None,
            flash: None,
            tween: Tween::new(0.0, 0.0, 0.0),
            done: false,
        }
    }

    fn apply(&self, cx: &mut StepContext<'_>, fov_delta: f32, flash: f32) {
        if let Some(layer) = self.punch.and_then(|id| cx.overlay.layer_mut(id)) {
            layer.kind = LayerKind::CameraPunch { fov_delta };
        }
        if let Some(id) = self.flash {
            cx.overlay.set_opacity(id, flash);
        }
    }
}

impl Default for FovPunch {
    fn default() -> Self {
        Self::new()
    }
}

impl TransitionStrategy for FovPunch {
    fn kind(&self) -> StrategyKind {
        StrategyKind::FovPunch
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
                self.punch = Some(cx.push_layer(LayerKind::CameraPunch { fov_delta: 0.0 }, 1.0));
                self.flash = Some(cx.push_layer(LayerKind::Solid { color: Color::WHITE }, 0.0));
                self.tween = Tween::new(0.0, PUNCH_OUT_DEGREES, cx.scaled(PUNCH_OUT_SECONDS))
                    .easing(Easing::EaseIn);
                self.phase = TransitionPhase::AnimatingIn;
            }
            TransitionPhase::AnimatingIn => {
                let delta = self.tween.advance(cx.dt);
                self.apply(cx, delta, FLASH_OPACITY * self.tween.progress());
                if self.tween.is_finished() {
                    self.phase = TransitionPhase::LoadingNew;
                    return Ok(Step::Swap);
                }
            }
            TransitionPhase::LoadingNew => {
                self.tween = Tween::new(PUNCH_IN_DEGREES, 0.0, cx.scaled(PUNCH_IN_SECONDS))
                    .easing(Easing::EaseOut);
                self.apply(cx, PUNCH_IN_DEGREES, FLASH_OPACITY);
                self.phase = TransitionPhase::AnimatingOut;
            }
            _ => {
                let delta = self.tween.advance(cx.dt);
                self.apply(cx, delta, FLASH_OPACITY * (1.0 - self.tween.progress()));
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
