//! Acquire/submit/present sequencing across frames in flight.
//!
//! # Overview
//!
//! Two indices move independently while rendering:
//! - the **frame slot** (`0..frames_in_flight`) selects the command buffer,
//!   sync objects and descriptor set being recorded;
//! - the **image index** (`0..image_count`) returned by acquire selects the
//!   framebuffer to draw into.
//!
//! [`FramePacer`] owns the frame slot and the per-image ownership table. It
//! talks to the GPU only through [`PresentBackend`], so the sequencing can be
//! driven by a mock in tests. The Vulkan swapchain supplies the real backend.
//!
//! A frame goes through:
//! 1. [`FramePacer::acquire`]: wait for the slot's fence, acquire an image
//! 2. record commands
//! 3. [`FramePacer::submit`]: wait for whichever slot last used the image,
//!    reset the slot fence, submit, present, advance the slot

use ash::vk;
use tracing::trace;

use crate::error::{RhiError, RhiResult};

/// Outcome of acquiring a swapchain image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireStatus {
    /// An image is ready; `suboptimal` means it can still be used this frame.
    Image { index: u32, suboptimal: bool },
    /// The swapchain no longer matches the surface and must be recreated.
    OutOfDate,
}

/// Outcome of presenting a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    Optimal,
    Suboptimal,
    OutOfDate,
}

impl PresentStatus {
    /// Whether the swapchain should be recreated before the next frame.
    #[inline]
    pub fn needs_recreate(self) -> bool {
        !matches!(self, PresentStatus::Optimal)
    }
}

/// GPU operations the pacer sequences, addressed by frame slot.
pub trait PresentBackend {
    /// Blocks until the slot's in-flight fence is signaled.
    fn wait_for_fence(&mut self, slot: usize) -> RhiResult<()>;

    /// Resets the slot's in-flight fence to unsignaled.
    fn reset_fence(&mut self, slot: usize) -> RhiResult<()>;

    /// Acquires the next image, signaling the slot's image-available semaphore.
    fn acquire_image(&mut self, slot: usize) -> Result<(u32, bool), vk::Result>;

    /// Submits `command_buffer`, waiting on image-available and signaling
    /// render-finished plus the slot fence.
    fn submit(&mut self, slot: usize, command_buffer: vk::CommandBuffer) -> RhiResult<()>;

    /// Presents `image_index` once render-finished is signaled.
    /// Returns `true` when the swapchain is suboptimal.
    fn present(&mut self, slot: usize, image_index: u32) -> Result<bool, vk::Result>;
}

/// Frame-slot state machine.
#[derive(Debug, Clone)]
pub struct FramePacer {
    frames_in_flight: usize,
    current_frame: usize,
    /// Slot whose fence last covered each swapchain image.
    images_in_flight: Vec<Option<usize>>,
}

impl FramePacer {
    /// # Panics
    ///
    /// Panics if `frames_in_flight` is zero.
    pub fn new(image_count: usize, frames_in_flight: usize) -> Self {
        assert!(frames_in_flight > 0, "at least one frame in flight is required");
        Self {
            frames_in_flight,
            current_frame: 0,
            images_in_flight: vec![None; image_count],
        }
    }

    /// Current frame slot.
    #[inline]
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Slot that last submitted work for `image_index`, if any.
    #[inline]
    pub fn image_owner(&self, image_index: u32) -> Option<usize> {
        self.images_in_flight
            .get(image_index as usize)
            .copied()
            .flatten()
    }

    /// Waits for the current slot to retire, then acquires an image.
    ///
    /// Does not advance the frame slot.
    ///
    /// # Errors
    ///
    /// Any backend failure other than `ERROR_OUT_OF_DATE_KHR`.
    pub fn acquire<B: PresentBackend>(&mut self, backend: &mut B) -> RhiResult<AcquireStatus> {
        let slot = self.current_frame;
        backend.wait_for_fence(slot)?;

        match backend.acquire_image(slot) {
            Ok((index, suboptimal)) => {
                trace!("Slot {} acquired image {}", slot, index);
                Ok(AcquireStatus::Image { index, suboptimal })
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireStatus::OutOfDate),
            Err(e) => Err(e.into()),
        }
    }

    /// Submits the slot's commands for `image_index`, presents, and advances.
    ///
    /// If another slot still owns the image, its fence is waited on first.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidHandle`] for an image index outside the swapchain,
    /// or any backend failure other than `ERROR_OUT_OF_DATE_KHR` on present.
    pub fn submit<B: PresentBackend>(
        &mut self,
        backend: &mut B,
        command_buffer: vk::CommandBuffer,
        image_index: u32,
    ) -> RhiResult<PresentStatus> {
        let slot = self.current_frame;
        let owner = self
            .images_in_flight
            .get_mut(image_index as usize)
            .ok_or_else(|| {
                RhiError::InvalidHandle(format!("image index {} out of range", image_index))
            })?;

        if let Some(previous) = *owner {
            backend.wait_for_fence(previous)?;
        }
        *owner = Some(slot);

        backend.reset_fence(slot)?;
        backend.submit(slot, command_buffer)?;

        let status = match backend.present(slot, image_index) {
            Ok(false) => PresentStatus::Optimal,
            Ok(true) => PresentStatus::Suboptimal,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => PresentStatus::OutOfDate,
            Err(e) => return Err(e.into()),
        };

        self.current_frame = (self.current_frame + 1) % self.frames_in_flight;
        Ok(status)
    }
}
