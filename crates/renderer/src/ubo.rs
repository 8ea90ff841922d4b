//! Uniform buffer object definitions for shaders.
//!
//! These structures must match the GLSL uniform block layouts exactly.
//! All structures use `#[repr(C)]` for predictable memory layout and implement
//! `Pod` and `Zeroable` for safe byte casting.

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

/// Per-frame particle uniforms, binding 0 of the particle descriptor set.
///
/// Read by the compute shader (`delta_time`) and the vertex shader
/// (`view_projection`).
///
/// # Memory Layout
///
/// - Offset 0: view-projection matrix (64 bytes)
/// - Offset 64: delta time in seconds (4 bytes)
/// - Offset 68: padding (12 bytes)
/// - Total size: 80 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct ParticleUbo {
    pub view_projection: Mat4,
    pub delta_time: f32,
    /// Padding to a 16-byte multiple.
    pub _padding: [f32; 3],
}

impl ParticleUbo {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn new(view_projection: Mat4, delta_time: f32) -> Self {
        Self {
            view_projection,
            delta_time,
            _padding: [0.0; 3],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_particle_ubo_layout() {
        use std::mem::offset_of;

        assert_eq!(ParticleUbo::SIZE, 80);
        assert_eq!(offset_of!(ParticleUbo, view_projection), 0);
        assert_eq!(offset_of!(ParticleUbo, delta_time), 64);
        assert_eq!(ParticleUbo::SIZE % 16, 0);
    }

    #[test]
    fn test_particle_ubo_bytes() {
        let ubo = ParticleUbo::new(Mat4::IDENTITY, 0.016);
        let bytes: &[u8] = bytemuck::bytes_of(&ubo);
        assert_eq!(bytes.len(), 80);

        let delta = f32::from_ne_bytes([bytes[64], bytes[65], bytes[66], bytes[67]]);
        assert_eq!(delta, 0.016);
        assert!(bytes[68..].iter().all(|&b| b == 0));
    }
}
