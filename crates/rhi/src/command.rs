//! Command recording.
//!
//! [`CommandBuffer`] is a thin recorder over a handle allocated from the
//! device pool ([`Device::allocate_command_buffers`]). It exposes the
//! commands the frame loop records: render pass scope, pipeline and
//! descriptor binding, quad geometry, direct and indirect indexed draws,
//! compute dispatch and shader-write barriers.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use engine_rhi::device::Device;
//! use engine_rhi::command::CommandBuffer;
//!
//! # fn example(device: Arc<Device>, particles: vk::Buffer) -> Result<(), engine_rhi::RhiError> {
//! let handle = device.allocate_command_buffers(1)?[0];
//! let cmd = CommandBuffer::from_handle(device.clone(), handle);
//!
//! cmd.begin()?;
//! cmd.dispatch(4, 1, 1);
//! cmd.shader_write_barrier(
//!     particles,
//!     vk::PipelineStageFlags::COMPUTE_SHADER,
//!     vk::PipelineStageFlags::VERTEX_SHADER,
//! );
//! cmd.end()?;
//! # Ok(())
//! # }
//! ```

use std::slice;
use std::sync::Arc;

use ash::vk;

use crate::device::Device;
use crate::error::RhiResult;

/// Records into a command buffer owned by the device pool.
///
/// Cloning shares the handle; freeing is up to whoever allocated it.
#[derive(Clone)]
pub struct CommandBuffer {
    device: Arc<Device>,
    buffer: vk::CommandBuffer,
}

impl CommandBuffer {
    #[inline]
    pub fn from_handle(device: Arc<Device>, buffer: vk::CommandBuffer) -> Self {
        Self { device, buffer }
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer
    }

    #[inline]
    fn raw(&self) -> &ash::Device {
        self.device.handle()
    }

    /// Starts a one-time-submit recording. Any previous contents are
    /// discarded implicitly (the pool allows per-buffer reset).
    pub fn begin(&self) -> RhiResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.raw().begin_command_buffer(self.buffer, &begin_info)? };
        Ok(())
    }

    pub fn end(&self) -> RhiResult<()> {
        unsafe { self.raw().end_command_buffer(self.buffer)? };
        Ok(())
    }

    // =========================================================================
    // Render pass
    // =========================================================================

    /// Begins `render_pass` on `framebuffer` with inline contents.
    ///
    /// `clear_values` are in attachment order.
    pub fn begin_render_pass(
        &self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
        clear_values: &[vk::ClearValue],
    ) {
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(render_area)
            .clear_values(clear_values);
        unsafe {
            self.raw()
                .cmd_begin_render_pass(self.buffer, &begin_info, vk::SubpassContents::INLINE);
        }
    }

    pub fn end_render_pass(&self) {
        unsafe { self.raw().cmd_end_render_pass(self.buffer) };
    }

    /// Sets the dynamic viewport and scissor.
    pub fn set_viewport_and_scissor(&self, viewport: vk::Viewport, scissor: vk::Rect2D) {
        unsafe {
            self.raw()
                .cmd_set_viewport(self.buffer, 0, slice::from_ref(&viewport));
            self.raw()
                .cmd_set_scissor(self.buffer, 0, slice::from_ref(&scissor));
        }
    }

    // =========================================================================
    // Binding
    // =========================================================================

    pub fn bind_pipeline(&self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        unsafe { self.raw().cmd_bind_pipeline(self.buffer, bind_point, pipeline) };
    }

    /// Binds `set` as set 0 of `layout`.
    pub fn bind_descriptor_set(
        &self,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        set: vk::DescriptorSet,
    ) {
        unsafe {
            self.raw().cmd_bind_descriptor_sets(
                self.buffer,
                bind_point,
                layout,
                0,
                slice::from_ref(&set),
                &[],
            );
        }
    }

    /// Binds a vertex buffer at binding 0 and a `u32` index buffer.
    pub fn bind_indexed_geometry(&self, vertices: vk::Buffer, indices: vk::Buffer) {
        unsafe {
            self.raw()
                .cmd_bind_vertex_buffers(self.buffer, 0, slice::from_ref(&vertices), &[0]);
            self.raw()
                .cmd_bind_index_buffer(self.buffer, indices, 0, vk::IndexType::UINT32);
        }
    }

    // =========================================================================
    // Work
    // =========================================================================

    /// Draws the whole bound index range `instance_count` times.
    pub fn draw_indexed(&self, index_count: u32, instance_count: u32, first_instance: u32) {
        unsafe {
            self.raw()
                .cmd_draw_indexed(self.buffer, index_count, instance_count, 0, 0, first_instance);
        }
    }

    /// Issues `draw_count` indexed draws read from `buffer`.
    ///
    /// A `draw_count` above 1 requires the `multiDrawIndirect` feature.
    pub fn draw_indexed_indirect(
        &self,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        draw_count: u32,
        stride: u32,
    ) {
        unsafe {
            self.raw()
                .cmd_draw_indexed_indirect(self.buffer, buffer, offset, draw_count, stride);
        }
    }

    pub fn dispatch(&self, x: u32, y: u32, z: u32) {
        unsafe { self.raw().cmd_dispatch(self.buffer, x, y, z) };
    }

    /// Makes shader writes to all of `buffer` in `src_stage` visible to
    /// shader reads in `dst_stage`.
    pub fn shader_write_barrier(
        &self,
        buffer: vk::Buffer,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
    ) {
        let barrier = shader_write_barrier(buffer);
        unsafe {
            self.raw().cmd_pipeline_barrier(
                self.buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                slice::from_ref(&barrier),
                &[],
            );
        }
    }
}

fn shader_write_barrier(buffer: vk::Buffer) -> vk::BufferMemoryBarrier<'static> {
    vk::BufferMemoryBarrier::default()
        .src_access_mask(vk::AccessFlags::SHADER_WRITE)
        .dst_access_mask(vk::AccessFlags::SHADER_READ)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .buffer(buffer)
        .offset(0)
        .size(vk::WHOLE_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_buffer_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<CommandBuffer>();
    }

    #[test]
    fn test_shader_write_barrier_covers_whole_buffer() {
        let barrier = shader_write_barrier(vk::Buffer::null());
        assert_eq!(barrier.src_access_mask, vk::AccessFlags::SHADER_WRITE);
        assert_eq!(barrier.dst_access_mask, vk::AccessFlags::SHADER_READ);
        assert_eq!(barrier.offset, 0);
        assert_eq!(barrier.size, vk::WHOLE_SIZE);
        assert_eq!(barrier.src_queue_family_index, vk::QUEUE_FAMILY_IGNORED);
        assert_eq!(barrier.dst_queue_family_index, vk::QUEUE_FAMILY_IGNORED);
    }
}
