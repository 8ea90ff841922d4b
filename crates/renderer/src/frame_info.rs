//! Per-frame context handed to the systems that record into a frame.

use ash::vk;
use glam::Mat4;

/// Everything a system needs to record its work for the current frame.
///
/// `frame_index` is the frame slot (`0..MAX_FRAMES_IN_FLIGHT`), not the
/// swapchain image index.
#[derive(Clone, Copy, Debug)]
pub struct FrameInfo {
    pub frame_index: usize,
    /// Seconds elapsed since the previous frame.
    pub frame_time: f32,
    pub command_buffer: vk::CommandBuffer,
    /// Descriptor set belonging to this frame slot.
    pub descriptor_set: vk::DescriptorSet,
    pub view_projection: Mat4,
}
