use std::collections::HashSet;

use glam::Vec2;
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Two presses closer than this in time count as a double click.
pub const DOUBLE_CLICK_SECONDS: f64 = 0.3;
/// ...and closer than this in logical pixels.
pub const DOUBLE_CLICK_DISTANCE: f32 = 6.0;

/// A primary-button press.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Press {
    /// Logical pixels, origin top-left.
    pub position: Vec2,
    /// Completes a double click.
    pub double: bool,
}

/// Pairs presses into double clicks.
#[derive(Clone, Copy, Debug, Default)]
pub struct ClickTracker {
    last: Option<(f64, Vec2)>,
}

impl ClickTracker {
    /// Record a press at `now` seconds. Returns true if it completes a double click.
    pub fn press(&mut self, position: Vec2, now: f64) -> bool {
        let double = matches!(
            self.last,
            Some((at, pos)) if now - at <= DOUBLE_CLICK_SECONDS
                && pos.distance(position) <= DOUBLE_CLICK_DISTANCE
        );
        // A third quick press starts a new pair.
        self.last = if double { None } else { Some((now, position)) };
        double
    }
}

/// Per-frame pointer and keyboard state gathered from window events.
pub struct Input {
    scale_factor: f64,
    keys_pressed: HashSet<KeyCode>,
    primary_down: bool,
    cursor: Vec2,
    presses: Vec<Press>,
    drag: Vec2,
    scroll: f32,
    clicks: ClickTracker,
}

impl Default for Input {
    fn default() -> Self {
        Self {
            scale_factor: 1.0,
            keys_pressed: HashSet::new(),
            primary_down: false,
            cursor: Vec2::ZERO,
            presses: Vec::new(),
            drag: Vec2::ZERO,
            scroll: 0.0,
            clicks: ClickTracker::default(),
        }
    }
}

impl Input {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cursor events arrive in physical pixels; everything here is logical.
    pub fn set_scale_factor(&mut self, scale_factor: f64) {
        self.scale_factor = scale_factor.max(0.1);
    }

    /// Call at the start of each frame to reset per-frame state.
    pub fn begin_frame(&mut self) {
        self.keys_pressed.clear();
        self.presses.clear();
        self.drag = Vec2::ZERO;
        self.scroll = 0.0;
    }

    /// Process a window event. `now` is seconds on any monotonic clock.
    pub fn handle_event(&mut self, event: &WindowEvent, now: f64) {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key
                    && event.state == ElementState::Pressed
                    && !event.repeat
                {
                    self.keys_pressed.insert(key);
                }
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => match state {
                ElementState::Pressed => {
                    self.primary_down = true;
                    let double = self.clicks.press(self.cursor, now);
                    self.presses.push(Press {
                        position: self.cursor,
                        double,
                    });
                }
                ElementState::Released => self.primary_down = false,
            },
            WindowEvent::CursorMoved { position, .. } => {
                let scale = self.scale_factor;
                let new_pos = Vec2::new((position.x / scale) as f32, (position.y / scale) as f32);
                if self.primary_down {
                    self.drag += new_pos - self.cursor;
                }
                self.cursor = new_pos;
            }
            WindowEvent::CursorLeft { .. } => self.primary_down = false,
            WindowEvent::MouseWheel { delta, .. } => {
                self.scroll += match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 120.0,
                };
            }
            _ => {}
        }
    }

    pub fn key_pressed(&self, key: KeyCode) -> bool {
        self.keys_pressed.contains(&key)
    }

    /// Primary-button presses this frame, in order.
    pub fn presses(&self) -> &[Press] {
        &self.presses
    }

    /// Cursor travel with the primary button held, this frame.
    pub fn drag(&self) -> Vec2 {
        self.drag
    }

    /// Wheel movement this frame, in lines. Positive scrolls up.
    pub fn scroll(&self) -> f32 {
        self.scroll
    }

    pub fn cursor(&self) -> Vec2 {
        self.cursor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quick_close_presses_pair_up() {
        let mut clicks = ClickTracker::default();
        assert!(!clicks.press(Vec2::new(10.0, 10.0), 1.0));
        assert!(clicks.press(Vec2::new(13.0, 12.0), 1.2));
        // The pair is consumed.
        assert!(!clicks.press(Vec2::new(13.0, 12.0), 1.3));
    }

    #[test]
    fn slow_or_distant_presses_do_not_pair() {
        let mut clicks = ClickTracker::default();
        clicks.press(Vec2::ZERO, 0.0);
        assert!(!clicks.press(Vec2::ZERO, 0.5));
        assert!(!clicks.press(Vec2::new(20.0, 0.0), 0.6));
    }
}
