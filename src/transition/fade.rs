use super::{Easing, Step, StepContext, StrategyKind, TransitionPhase, TransitionStrategy, Tween};
use crate::color::Color;
use crate::error::TransitionError;
use crate::overlay::{LayerId, LayerKind};

/// Seconds for each half of the fade.
const FADE_SECONDS: f32 = 0.45;

/// Fade to black, swap under full cover, fade back in. No capture.
#[derive(Debug)]
pub struct Fade {
    phase: TransitionPhase,
    layer: Option<LayerId>,
    tween: Tween,
    done: bool,
}

impl Fade {
    pub fn new() -> Self {
        Self {
            phase: TransitionPhase::Idle,
            layer: None,
            tween: Tween::new(0.0, 0.0, 0.0),
            done: false,
        }
    }

    fn apply(&self, cx: &mut StepContext<'_>, opacity: f32) {
        if let Some(layer) = self.layer {
            cx.overlay.set_opacity(layer, opacity);
        }
    }
}

impl Default for Fade {
    fn default() -> Self {
        Self::new()
    }
}

impl TransitionStrategy for Fade {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Fade
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
                self.layer = Some(cx.push_layer(LayerKind::Solid { color: Color::BLACK }, 0.0));
                self.tween =
                    Tween::new(0.0, 1.0, cx.scaled(FADE_SECONDS)).easing(Easing::EaseInOut);
                self.phase = TransitionPhase::AnimatingIn;
            }
            TransitionPhase::AnimatingIn => {
                let opacity = self.tween.advance(cx.dt);
                self.apply(cx, opacity);
                if self.tween.is_finished() {
                    self.phase = TransitionPhase::LoadingNew;
                    return Ok(Step::Swap);
                }
            }
            TransitionPhase::LoadingNew => {
                self.tween =
                    Tween::new(1.0, 0.0, cx.scaled(FADE_SECONDS)).easing(Easing::EaseInOut);
                self.phase = TransitionPhase::AnimatingOut;
            }
            _ => {
                let opacity = self.tween.advance(cx.dt);
                self.apply(cx, opacity);
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

    #[test]
    fn screen_is_fully_black_when_swapping() {
        let mut harness = Harness::new();
        let mut fade = Fade::new();
        loop {
            if harness.step(&mut fade).unwrap() == Step::Swap {
                break;
            }
        }
        let layer = &harness.overlay.layers()[0];
        assert!(matches!(layer.kind, LayerKind::Solid { .. }));
        assert_eq!(layer.opacity, 1.0);
        assert_eq!(harness.renderer.capture_requests(), 0);
    }
}
