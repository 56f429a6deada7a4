use glam::{Vec2, Vec3};

use crate::camera::Camera;

const ELEVATION_LIMIT: f32 = std::f32::consts::FRAC_PI_2 - 0.01;

/// Damped orbit controls for the host camera.
///
/// The controls never own the camera pose. Each [`update`](Self::update)
/// reads the camera's current position relative to its target, applies the
/// pending rotation and zoom, and writes the result back. A scene module that
/// moves the camera directly is therefore respected on the next frame.
///
/// Input accumulates into pending deltas which are spent gradually: each
/// update applies `damping` of what is pending and keeps the rest, so the
/// camera glides to a stop after the pointer is released.
///
/// # Example
/// ```ignore
/// let mut controls = OrbitControls::new().damping(0.08);
///
/// // On pointer drag:
/// controls.rotate(drag_delta, viewport_height);
///
/// // Once per frame:
/// controls.update(&mut camera);
/// ```
#[derive(Clone, Debug)]
pub struct OrbitControls {
    /// Fraction of the pending motion applied per update.
    pub damping: f32,
    /// Drag sensitivity; a full-height drag turns by `2π * rotate_speed`.
    pub rotate_speed: f32,
    /// Scroll sensitivity.
    pub zoom_speed: f32,
    /// Minimum distance from target.
    pub min_distance: f32,
    /// Maximum distance from target.
    pub max_distance: f32,
    pending_azimuth: f32,
    pending_elevation: f32,
    pending_zoom: f32,
}

impl Default for OrbitControls {
    fn default() -> Self {
        Self {
            damping: 0.05,
            rotate_speed: 1.0,
            zoom_speed: 1.0,
            min_distance: 0.5,
            max_distance: 60.0,
            pending_azimuth: 0.0,
            pending_elevation: 0.0,
            pending_zoom: 0.0,
        }
    }
}

impl OrbitControls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn damping(mut self, damping: f32) -> Self {
        self.damping = damping.clamp(0.001, 1.0);
        self
    }

    pub fn distance_limits(mut self, min: f32, max: f32) -> Self {
        self.min_distance = min;
        self.max_distance = max;
        self
    }

    /// Queue a rotation from a pointer drag measured in pixels.
    pub fn rotate(&mut self, drag: Vec2, viewport_height: f32) {
        let height = viewport_height.max(1.0);
        let turn = std::f32::consts::TAU * self.rotate_speed / height;
        self.pending_azimuth -= drag.x * turn;
        self.pending_elevation += drag.y * turn;
    }

    /// Queue a zoom step; positive values move toward the target.
    pub fn zoom(&mut self, wheel: f32) {
        self.pending_zoom += wheel * self.zoom_speed;
    }

    /// Drop any pending motion.
    pub fn stop(&mut self) {
        self.pending_azimuth = 0.0;
        self.pending_elevation = 0.0;
        self.pending_zoom = 0.0;
    }

    pub fn is_moving(&self) -> bool {
        self.pending_azimuth.abs() > 1e-5
            || self.pending_elevation.abs() > 1e-5
            || self.pending_zoom.abs() > 1e-5
    }

    /// Advance damping and write the new position into `camera`.
    ///
    /// Returns `true` if the camera moved.
    pub fn update(&mut self, camera: &mut Camera) -> bool {
        if !self.is_moving() {
            self.stop();
            return false;
        }

        let offset = camera.position - camera.target;
        let distance = offset.length().max(1e-4);
        let mut azimuth = offset.x.atan2(offset.z);
        let mut elevation = (offset.y / distance).clamp(-1.0, 1.0).asin();

        let step_azimuth = self.pending_azimuth * self.damping;
        let step_elevation = self.pending_elevation * self.damping;
        let step_zoom = self.pending_zoom * self.damping;

        azimuth += step_azimuth;
        elevation = (elevation + step_elevation).clamp(-ELEVATION_LIMIT, ELEVATION_LIMIT);
        let distance =
            (distance * 0.95f32.powf(step_zoom)).clamp(self.min_distance, self.max_distance);

        // Spherical to Cartesian conversion
        let offset = Vec3::new(
            distance * elevation.cos() * azimuth.sin(),
            distance * elevation.sin(),
            distance * elevation.cos() * azimuth.cos(),
        );
        camera.position = camera.target + offset;

        self.pending_azimuth -= step_azimuth;
        self.pending_elevation -= step_elevation;
        self.pending_zoom -= step_zoom;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_controls_leave_camera_alone() {
        let mut controls = OrbitControls::new();
        let mut camera = Camera::new();
        let before = camera.position;
        assert!(!controls.update(&mut camera));
        assert_eq!(camera.position, before);
    }

    #[test]
    fn rotation_glides_and_keeps_distance() {
        let mut controls = OrbitControls::new().damping(0.25);
        let mut camera = Camera::new();
        let distance = (camera.position - camera.target).length();
        controls.rotate(Vec2::new(100.0, 0.0), 600.0);

        let first = {
            controls.update(&mut camera);
            camera.position
        };
        controls.update(&mut camera);
        let second = camera.position;

        assert_ne!(first, second);
        assert!(((second - camera.target).length() - distance).abs() < 1e-3);
        assert!(controls.is_moving());
    }

    #[test]
    fn zoom_respects_limits() {
        let mut controls = OrbitControls::new().damping(1.0).distance_limits(2.0, 10.0);
        let mut camera = Camera::new();
        controls.zoom(500.0);
        controls.update(&mut camera);
        assert!(((camera.position - camera.target).length() - 2.0).abs() < 1e-4);
    }
}
