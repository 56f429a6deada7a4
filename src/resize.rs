//! Damped viewport resizing.
//!
//! Window systems deliver size changes in bursts: a drag produces dozens of
//! events per frame and a scale-factor change arrives as a separate event.
//! [`ResizeSmoother`] turns that stream into at most one applied size per
//! rendered frame. Raw events only move the target; once per frame
//! [`step`](ResizeSmoother::step) moves the applied size a fixed fraction of
//! the remaining distance, snapping once the remainder drops under the
//! epsilon.

use crate::config::HostConfig;

/// Logical viewport dimensions plus the device pixel ratio.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewportSize {
    pub width: f32,
    pub height: f32,
    pub pixel_ratio: f32,
}

impl ViewportSize {
    pub const fn new(width: f32, height: f32, pixel_ratio: f32) -> Self {
        Self {
            width,
            height,
            pixel_ratio,
        }
    }

    /// Drawing-buffer size in physical pixels, never smaller than 1x1.
    pub fn physical(&self) -> (u32, u32) {
        (
            ((self.width * self.pixel_ratio).round() as u32).max(1),
            ((self.height * self.pixel_ratio).round() as u32).max(1),
        )
    }

    pub fn aspect(&self) -> f32 {
        if self.height > 0.0 {
            self.width / self.height
        } else {
            1.0
        }
    }
}

/// Pixel ratio differences smaller than this are treated as equal.
const PIXEL_RATIO_EPSILON: f32 = 0.01;

/// Per-frame interpolation of the viewport toward the latest requested size.
#[derive(Clone, Debug)]
pub struct ResizeSmoother {
    current: ViewportSize,
    target: ViewportSize,
    damping: f32,
    epsilon: f32,
    max_pixel_ratio: f32,
}

impl ResizeSmoother {
    pub fn new(initial: ViewportSize, config: &HostConfig) -> Self {
        let initial = ViewportSize {
            pixel_ratio: initial.pixel_ratio.min(config.max_pixel_ratio),
            ..initial
        };
        Self {
            current: initial,
            target: initial,
            damping: config.resize_damping,
            epsilon: config.resize_epsilon,
            max_pixel_ratio: config.max_pixel_ratio,
        }
    }

    /// Record a raw size change. Nothing is applied until the next [`step`](Self::step).
    pub fn set_target(&mut self, size: ViewportSize) {
        self.target = ViewportSize {
            width: size.width.max(0.0),
            height: size.height.max(0.0),
            pixel_ratio: size.pixel_ratio.clamp(0.1, self.max_pixel_ratio),
        };
    }

    /// Advance one frame. Returns the newly applied size, or `None` if it did not change.
    pub fn step(&mut self) -> Option<ViewportSize> {
        if self.current == self.target {
            return None;
        }

        let close = (self.target.width - self.current.width).abs() < self.epsilon
            && (self.target.height - self.current.height).abs() < self.epsilon
            && (self.target.pixel_ratio - self.current.pixel_ratio).abs() < PIXEL_RATIO_EPSILON;

        if close {
            self.current = self.target;
        } else {
            let k = self.damping;
            self.current = ViewportSize {
                width: self.current.width + (self.target.width - self.current.width) * k,
                height: self.current.height + (self.target.height - self.current.height) * k,
                pixel_ratio: self.current.pixel_ratio
                    + (self.target.pixel_ratio - self.current.pixel_ratio) * k,
            };
        }
        Some(self.current)
    }

    pub fn current(&self) -> ViewportSize {
        self.current
    }

    pub fn target(&self) -> ViewportSize {
        self.target
    }

    pub fn is_settled(&self) -> bool {
        self.current == self.target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn smoother(width: f32, height: f32) -> ResizeSmoother {
        ResizeSmoother::new(ViewportSize::new(width, height, 1.0), &HostConfig::default())
    }

    #[test]
    fn remaining_delta_decays_geometrically() {
        let mut s = smoother(800.0, 600.0);
        let delta = 400.0;
        s.set_target(ViewportSize::new(800.0 + delta, 600.0, 1.0));

        for n in 1..=10 {
            let applied = s.step().expect("size changes every frame while far from target");
            let remaining = 800.0 + delta - applied.width;
            let expected = delta * 0.75f32.powi(n);
            assert!(
                (remaining - expected).abs() < 0.01,
                "frame {n}: remaining {remaining}, expected {expected}"
            );
        }
    }

    #[test]
    fn snaps_exactly_once_close() {
        let mut s = smoother(800.0, 600.0);
        s.set_target(ViewportSize::new(1000.0, 600.0, 1.0));

        let mut frames = 0;
        while let Some(applied) = s.step() {
            frames += 1;
            assert!(frames < 100);
            if applied.width == 1000.0 {
                break;
            }
        }
        assert_eq!(s.current().width, 1000.0);
        assert!(s.is_settled());
        assert_eq!(s.step(), None);
    }

    #[test]
    fn tiny_change_snaps_immediately() {
        let mut s = smoother(800.0, 600.0);
        s.set_target(ViewportSize::new(800.3, 600.0, 1.0));
        assert_eq!(s.step().map(|v| v.width), Some(800.3));
        assert_eq!(s.step(), None);
    }

    #[test]
    fn pixel_ratio_is_capped() {
        let mut s = smoother(800.0, 600.0);
        s.set_target(ViewportSize::new(800.0, 600.0, 3.0));
        assert_eq!(s.target().pixel_ratio, 2.0);
    }

    #[test]
    fn physical_size_never_zero() {
        assert_eq!(ViewportSize::new(0.0, 0.0, 1.0).physical(), (1, 1));
        assert_eq!(ViewportSize::new(640.0, 360.0, 2.0).physical(), (1280, 720));
    }
}
