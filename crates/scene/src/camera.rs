//! Perspective camera.

use glam::{Mat4, Vec3};

/// A perspective camera looking from `position` towards `target`.
#[derive(Clone, Debug)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov_y: 50.0_f32.to_radians(),
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 100.0,
        }
    }
}

impl Camera {
    /// Create a new camera with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the perspective projection.
    pub fn set_perspective(&mut self, fov_y: f32, aspect: f32, near: f32, far: f32) {
        self.fov_y = fov_y;
        self.aspect = aspect;
        self.near = near;
        self.far = far;
    }

    /// Update the aspect ratio, e.g. after a resize.
    pub fn set_aspect(&mut self, aspect: f32) {
        if aspect.is_finite() && aspect > 0.0 {
            self.aspect = aspect;
        }
    }

    pub fn look_at(&mut self, position: Vec3, target: Vec3) {
        self.position = position;
        self.target = target;
    }

    /// Places the camera on a circle of `radius` around `target` in the XZ
    /// plane, `height` above it, at `angle` radians.
    pub fn orbit(&mut self, angle: f32, radius: f32, height: f32) {
        self.position = self.target + Vec3::new(radius * angle.sin(), height, radius * angle.cos());
    }

    /// Get the view matrix.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    /// Get the projection matrix (with Vulkan Y-flip and 0..1 depth).
    pub fn projection_matrix(&self) -> Mat4 {
        let mut proj = Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far);
        // Flip Y for Vulkan coordinate system
        proj.y_axis.y *= -1.0;
        proj
    }

    /// Get the view-projection matrix.
    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_projects_to_center() {
        let camera = Camera::new();
        let clip = camera.view_projection() * camera.target.extend(1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() < 1e-5);
        assert!(ndc.y.abs() < 1e-5);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }

    #[test]
    fn test_vulkan_y_flip() {
        let camera = Camera::new();
        // A point above the target lands in the upper half, which is -Y in
        // Vulkan clip space.
        let clip = camera.view_projection() * Vec3::new(0.0, 1.0, 0.0).extend(1.0);
        assert!(clip.y / clip.w < 0.0);
    }

    #[test]
    fn test_orbit_keeps_distance() {
        let mut camera = Camera::new();
        for step in 0..8 {
            camera.orbit(step as f32 * 0.8, 4.0, 1.0);
            let offset = camera.position - camera.target;
            assert!((Vec3::new(offset.x, 0.0, offset.z).length() - 4.0).abs() < 1e-5);
            assert!((offset.y - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_invalid_aspect_ignored() {
        let mut camera = Camera::new();
        camera.set_aspect(0.0);
        assert_eq!(camera.aspect, 16.0 / 9.0);
        camera.set_aspect(2.0);
        assert_eq!(camera.aspect, 2.0);
    }
}
