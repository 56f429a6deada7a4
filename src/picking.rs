//! Screen-space rays against the ground plane.
//!
//! Pointer presses cast a ray through the camera and test it against the
//! floor. Only the floor is pickable: ripples start where the ray meets
//! `y = 0` inside the 50×50 square.

use glam::{Vec2, Vec3, Vec4};

use crate::ambient::FLOOR_HALF_EXTENT;
use crate::camera::Camera;

/// A ray in 3D space.
///
/// # Example
///
/// ```
/// use vitrine::{Ray, Vec3};
///
/// let ray = Ray::new(Vec3::new(0.0, 2.0, 0.0), Vec3::NEG_Y);
/// assert_eq!(ray.intersect_plane(Vec3::Y, 0.0), Some(2.0));
/// ```
#[derive(Clone, Copy, Debug)]
pub struct Ray {
    pub origin: Vec3,
    /// Normalized.
    pub direction: Vec3,
}

impl Ray {
    /// The direction is normalized.
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    /// The ray under a pointer at `position` (logical pixels, origin top-left)
    /// in a viewport of `size` logical pixels.
    pub fn from_screen(camera: &Camera, position: Vec2, size: Vec2) -> Self {
        let ndc_x = 2.0 * position.x / size.x.max(1.0) - 1.0;
        let ndc_y = 1.0 - 2.0 * position.y / size.y.max(1.0);

        let inv_view_proj = camera.view_projection().inverse();
        let near = inv_view_proj * Vec4::new(ndc_x, ndc_y, 0.0, 1.0);
        let far = inv_view_proj * Vec4::new(ndc_x, ndc_y, 1.0, 1.0);
        let near = near.truncate() / near.w;
        let far = far.truncate() / far.w;

        Self::new(near, far - near)
    }

    #[inline]
    pub fn point_at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Distance to the plane `dot(normal, p) = offset`, if it lies ahead.
    pub fn intersect_plane(&self, normal: Vec3, offset: f32) -> Option<f32> {
        let denom = normal.dot(self.direction);
        if denom.abs() < f32::EPSILON {
            return None;
        }
        let t = (offset - normal.dot(self.origin)) / denom;
        (t >= 0.0).then_some(t)
    }

    /// Where the ray meets the floor, if it does.
    pub fn hit_floor(&self) -> Option<Vec3> {
        let point = self.point_at(self.intersect_plane(Vec3::Y, 0.0)?);
        (point.x.abs() <= FLOOR_HALF_EXTENT && point.z.abs() <= FLOOR_HALF_EXTENT).then_some(point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_of_screen_looks_at_target() {
        let camera = Camera::new().at(Vec3::new(0.0, 5.0, 5.0)).looking_at(Vec3::ZERO);
        let ray = Ray::from_screen(&camera, Vec2::new(400.0, 300.0), Vec2::new(800.0, 600.0));
        let hit = ray.hit_floor().unwrap();
        assert!(hit.length() < 1e-3, "hit {hit}");
    }

    #[test]
    fn sky_misses_the_floor() {
        let camera = Camera::new().at(Vec3::new(0.0, 1.0, 5.0)).looking_at(Vec3::new(0.0, 1.0, 0.0));
        let ray = Ray::from_screen(&camera, Vec2::new(400.0, 10.0), Vec2::new(800.0, 600.0));
        assert!(ray.hit_floor().is_none());
    }

    #[test]
    fn floor_is_finite() {
        let ray = Ray::new(Vec3::new(0.0, 1.0, 0.0), Vec3::new(100.0, -1.0, 0.0));
        assert!(ray.intersect_plane(Vec3::Y, 0.0).is_some());
        assert!(ray.hit_floor().is_none());
    }

    #[test]
    fn parallel_ray_never_hits() {
        let ray = Ray::new(Vec3::Y, Vec3::X);
        assert!(ray.intersect_plane(Vec3::Y, 0.0).is_none());
    }
}
