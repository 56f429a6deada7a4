use glam::{Mat4, Vec3};

/// Default camera position, restored by a view reset.
pub const HOME_POSITION: Vec3 = Vec3::new(4.0, 3.0, 6.0);
/// Default orbit target, restored by a view reset.
pub const HOME_TARGET: Vec3 = Vec3::ZERO;

/// The host's perspective camera.
///
/// The camera looks from `position` toward `target`. Aspect ratio is owned by
/// the host and follows the applied viewport size; scene modules change the
/// pose through [`CameraPose`] so that restoring it never clobbers the aspect.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

/// The module-owned part of the camera state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraPose {
    pub position: Vec3,
    pub target: Vec3,
    pub fov: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: HOME_POSITION,
            target: HOME_TARGET,
            up: Vec3::Y,
            fov: 60.0,
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 100.0,
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(mut self, position: impl Into<Vec3>) -> Self {
        self.position = position.into();
        self
    }

    pub fn looking_at(mut self, target: impl Into<Vec3>) -> Self {
        self.target = target.into();
        self
    }

    pub fn with_fov(mut self, fov_degrees: f32) -> Self {
        self.fov = fov_degrees;
        self
    }

    /// A copy with the field of view widened (or narrowed) by `delta_degrees`.
    pub fn with_fov_offset(mut self, delta_degrees: f32) -> Self {
        self.fov = (self.fov + delta_degrees).clamp(1.0, 170.0);
        self
    }

    pub fn pose(&self) -> CameraPose {
        CameraPose {
            position: self.position,
            target: self.target,
            fov: self.fov,
        }
    }

    pub fn set_pose(&mut self, pose: CameraPose) {
        self.position = pose.position;
        self.target = pose.target;
        self.fov = pose.fov;
    }

    /// Recompute the aspect ratio for a viewport. Zero-height viewports are ignored.
    pub fn set_viewport(&mut self, width: f32, height: f32) {
        if height > 0.0 && width > 0.0 {
            self.aspect = width / height;
        }
    }

    pub fn forward(&self) -> Vec3 {
        (self.target - self.position).normalize_or(Vec3::NEG_Z)
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov.to_radians(), self.aspect, self.near, self.far)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pose_round_trip_keeps_aspect() {
        let mut camera = Camera::new();
        camera.set_viewport(1000.0, 500.0);
        let saved = camera.pose();
        camera.position = Vec3::new(1.0, 2.0, 3.0);
        camera.fov = 30.0;
        camera.set_viewport(400.0, 400.0);
        camera.set_pose(saved);
        assert_eq!(camera.position, HOME_POSITION);
        assert_eq!(camera.fov, 60.0);
        assert_eq!(camera.aspect, 1.0);
    }

    #[test]
    fn fov_offset_is_clamped() {
        let camera = Camera::new().with_fov(160.0).with_fov_offset(40.0);
        assert_eq!(camera.fov, 170.0);
    }

    #[test]
    fn zero_height_viewport_keeps_aspect() {
        let mut camera = Camera::new();
        let before = camera.aspect;
        camera.set_viewport(800.0, 0.0);
        assert_eq!(camera.aspect, before);
    }
}
