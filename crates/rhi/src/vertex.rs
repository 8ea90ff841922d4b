//! Vertex and instance data layouts shared with the particle shaders.
//!
//! - [`ParticleVertex`] - billboard corner, bound as per-vertex input
//! - [`ParticleInstance`] - one simulated particle as stored in the
//!   ping-pong storage buffers (std430 layout)

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

/// Billboard vertex with a single position attribute.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ParticleVertex {
    pub position: Vec3,
}

impl ParticleVertex {
    #[inline]
    pub const fn new(position: Vec3) -> Self {
        Self { position }
    }

    /// Get the vertex input binding description.
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Get the vertex attribute descriptions.
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 1] {
        [vk::VertexInputAttributeDescription {
            binding: 0,
            location: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: 0,
        }]
    }
}

/// Per-particle record read and written by the compute shader.
///
/// Every field is a `vec4` so the struct matches std430 without padding:
/// - Offset 0: position (w = 1)
/// - Offset 16: color (rgba)
/// - Offset 32: velocity (w unused)
/// - Total size: 48 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct ParticleInstance {
    pub position: Vec4,
    pub color: Vec4,
    pub velocity: Vec4,
}

impl ParticleInstance {
    /// White particle moving along +Z.
    pub fn at(position: Vec3) -> Self {
        Self {
            position: position.extend(1.0),
            color: Vec4::ONE,
            velocity: Vec4::new(0.0, 0.0, 1.0, 0.0),
        }
    }
}

impl Default for ParticleInstance {
    fn default() -> Self {
        Self::at(Vec3::ZERO)
    }
}
