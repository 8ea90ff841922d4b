//! Synchronization primitives.
//!
//! - [`Semaphore`] orders queue operations against each other (acquire → render → present)
//! - [`Fence`] lets the host wait for submitted work to retire
//! - [`FrameSync`] is the triple owned by one frame slot
//!
//! The engine keeps exactly [`MAX_FRAMES_IN_FLIGHT`] triples alive, independent
//! of how many images the swapchain has.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use engine_rhi::device::Device;
//! use engine_rhi::sync::create_frame_syncs;
//!
//! # fn example(device: Arc<Device>) -> Result<(), engine_rhi::RhiError> {
//! let syncs = create_frame_syncs(&device)?;
//! let slot = &syncs[0];
//!
//! // Block until the GPU has retired the last submission that used slot 0
//! slot.in_flight_fence().wait_forever()?;
//! slot.in_flight_fence().reset()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Number of frame slots the CPU may record ahead of the GPU.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Vulkan semaphore wrapper.
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates an unsignaled binary semaphore.
    ///
    /// # Errors
    ///
    /// Returns an error if semaphore creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };

        Ok(Self { device, semaphore })
    }

    /// Returns the Vulkan semaphore handle.
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Vulkan fence wrapper.
///
/// Waits are unbounded in the frame loop: a hung GPU is an external fault
/// this layer does not try to recover from.
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    /// Creates a new fence.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `signaled` - Create the fence already signaled, so the first wait
    ///   on a fresh frame slot returns immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if fence creation fails.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { device.handle().create_fence(&create_info, None)? };

        Ok(Self { device, fence })
    }

    /// Returns the Vulkan fence handle.
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Blocks until the fence is signaled or `timeout` nanoseconds elapse.
    ///
    /// # Errors
    ///
    /// Returns `VulkanError(TIMEOUT)` when the timeout expires first, or the
    /// driver error if the wait itself fails.
    pub fn wait(&self, timeout: u64) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&[self.fence], true, timeout)?
        };
        Ok(())
    }

    /// Blocks until the fence is signaled, however long that takes.
    #[inline]
    pub fn wait_forever(&self) -> RhiResult<()> {
        self.wait(u64::MAX)
    }

    /// Returns the fence to the unsignaled state.
    ///
    /// The fence must not be pending on any queue.
    pub fn reset(&self) -> RhiResult<()> {
        unsafe { self.device.handle().reset_fences(&[self.fence])? };
        Ok(())
    }

    /// Non-blocking status query.
    pub fn is_signaled(&self) -> bool {
        let result = unsafe { self.device.handle().get_fence_status(self.fence) };
        matches!(result, Ok(true))
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
    }
}

/// Synchronization objects owned by one frame slot.
///
/// ```text
/// wait(in_flight) ─ acquire ──signal──▶ image_available
///                   submit  ◀──wait─── image_available   (COLOR_ATTACHMENT_OUTPUT)
///                           ──signal──▶ render_finished, in_flight
///                   present ◀──wait─── render_finished
/// ```
pub struct FrameSync {
    image_available: Semaphore,
    render_finished: Semaphore,
    in_flight: Fence,
}

impl FrameSync {
    /// Creates the triple with the fence already signaled.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        Ok(Self {
            image_available: Semaphore::new(device.clone())?,
            render_finished: Semaphore::new(device.clone())?,
            in_flight: Fence::new(device, true)?,
        })
    }

    /// Signaled by image acquisition, waited on by the frame's submission.
    #[inline]
    pub fn image_available_semaphore(&self) -> &Semaphore {
        &self.image_available
    }

    /// Signaled by the frame's submission, waited on by presentation.
    #[inline]
    pub fn render_finished_semaphore(&self) -> &Semaphore {
        &self.render_finished
    }

    /// Signaled when the frame's command buffer has finished executing.
    #[inline]
    pub fn in_flight_fence(&self) -> &Fence {
        &self.in_flight
    }
}

/// Creates one [`FrameSync`] per frame slot.
pub fn create_frame_syncs(device: &Arc<Device>) -> RhiResult<Vec<FrameSync>> {
    let syncs = (0..MAX_FRAMES_IN_FLIGHT)
        .map(|_| FrameSync::new(device.clone()))
        .collect::<RhiResult<Vec<_>>>()?;

    debug!("Created {} frame sync triples", syncs.len());
    Ok(syncs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_slots_allow_double_buffering() {
        assert!(MAX_FRAMES_IN_FLIGHT >= 2);
    }

    #[test]
    fn test_sync_types_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Semaphore>();
        assert_send_sync::<Fence>();
        assert_send_sync::<FrameSync>();
    }
}
