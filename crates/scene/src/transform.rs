//! Transform component for scene objects.
//!
//! # Example
//!
//! ```
//! use engine_scene::Transform;
//! use glam::Vec3;
//!
//! let transform = Transform::new()
//!     .with_translation(Vec3::new(1.0, 0.0, 0.0))
//!     .with_scale(Vec3::splat(2.0));
//!
//! let p = transform.mat4().transform_point3(Vec3::new(1.0, 0.0, 0.0));
//! assert!((p - Vec3::new(3.0, 0.0, 0.0)).length() < 1e-5);
//! ```

use glam::{EulerRot, Mat3, Mat4, Quat, Vec3};

/// Translation, scale and Euler rotation of an object.
///
/// Rotation is in radians and applied as Tait-Bryan angles in Y, X, Z
/// order: the matrix is `T * Ry * Rx * Rz * S`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub scale: Vec3,
    /// Rotation around the X, Y and Z axes.
    pub rotation: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            scale: Vec3::ONE,
            rotation: Vec3::ZERO,
        }
    }
}

impl Transform {
    /// Create a new identity transform.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_translation(mut self, translation: Vec3) -> Self {
        self.translation = translation;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_rotation(mut self, rotation: Vec3) -> Self {
        self.rotation = rotation;
        self
    }

    /// Rotation as a quaternion.
    pub fn quat(&self) -> Quat {
        Quat::from_euler(
            EulerRot::YXZ,
            self.rotation.y,
            self.rotation.x,
            self.rotation.z,
        )
    }

    /// Object-to-world matrix.
    pub fn mat4(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.quat(), self.translation)
    }

    /// Matrix for transforming normals: `R * S^-1`.
    ///
    /// Components with zero scale are left unscaled so the result stays
    /// finite.
    pub fn normal_matrix(&self) -> Mat3 {
        let inverse_scale = Vec3::select(
            self.scale.cmpeq(Vec3::ZERO),
            Vec3::ONE,
            self.scale.recip(),
        );
        Mat3::from_quat(self.quat()) * Mat3::from_diagonal(inverse_scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-5;

    #[test]
    fn test_transform_default() {
        let transform = Transform::default();
        assert_eq!(transform.translation, Vec3::ZERO);
        assert_eq!(transform.scale, Vec3::ONE);
        assert_eq!(transform.rotation, Vec3::ZERO);
        assert!(transform.mat4().abs_diff_eq(Mat4::IDENTITY, EPSILON));
    }

    #[test]
    fn test_rotation_order_is_yxz() {
        let rotation = Vec3::new(0.3, -1.1, 0.7);
        let transform = Transform::new().with_rotation(rotation);

        let expected = Mat4::from_rotation_y(rotation.y)
            * Mat4::from_rotation_x(rotation.x)
            * Mat4::from_rotation_z(rotation.z);
        assert!(transform.mat4().abs_diff_eq(expected, EPSILON));
    }

    #[test]
    fn test_scale_then_rotate_then_translate() {
        let transform = Transform::new()
            .with_translation(Vec3::new(0.0, 0.0, 5.0))
            .with_scale(Vec3::new(2.0, 1.0, 1.0))
            .with_rotation(Vec3::new(0.0, std::f32::consts::FRAC_PI_2, 0.0));

        // +X scaled to 2, rotated 90 degrees about Y to -Z, then moved.
        let p = transform.mat4().transform_point3(Vec3::X);
        assert!((p - Vec3::new(0.0, 0.0, 3.0)).length() < EPSILON);
    }

    #[test]
    fn test_normal_matrix_with_scale() {
        let transform = Transform::new().with_scale(Vec3::new(2.0, 4.0, 1.0));
        let normal = transform.normal_matrix();
        assert!(normal.abs_diff_eq(
            Mat3::from_diagonal(Vec3::new(0.5, 0.25, 1.0)),
            EPSILON
        ));
    }

    #[test]
    fn test_normal_matrix_zero_scale_is_finite() {
        let transform = Transform::new().with_scale(Vec3::new(0.0, 1.0, 1.0));
        assert!(transform.normal_matrix().is_finite());
    }
}
