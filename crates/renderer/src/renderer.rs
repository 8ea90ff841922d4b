//! Frame scheduler.
//!
//! [`Renderer`] owns the swapchain and one command buffer per frame slot and
//! drives the begin/submit/present cycle:
//!
//! ```text
//! begin_frame()                 -> wait slot fence, acquire image, begin cmd
//!   begin_swapchain_render_pass -> clear, viewport, scissor
//!   ... record draws ...
//!   end_swapchain_render_pass
//! end_frame()                   -> end cmd, submit, present, advance slot
//! ```
//!
//! Out-of-date and suboptimal swapchains, as well as resizes reported by the
//! [`SurfaceSource`], recreate the swapchain and drop the current frame.
//! Recreation is deferred while the surface is zero-sized.
//!
//! # Example
//!
//! ```no_run
//! use engine_platform::SurfaceSource;
//! use engine_renderer::Renderer;
//!
//! # fn example(renderer: &mut Renderer, window: &mut impl SurfaceSource) -> Result<(), engine_rhi::RhiError> {
//! if let Some(cmd) = renderer.begin_frame(window)? {
//!     renderer.begin_swapchain_render_pass(cmd);
//!     // draws...
//!     renderer.end_swapchain_render_pass(cmd);
//!     renderer.end_frame(window)?;
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use engine_platform::SurfaceSource;
use engine_rhi::RhiResult;
use engine_rhi::command::CommandBuffer;
use engine_rhi::device::Device;
use engine_rhi::frame_pacing::AcquireStatus;
use engine_rhi::instance::Instance;
use engine_rhi::swapchain::Swapchain;
use engine_rhi::sync::MAX_FRAMES_IN_FLIGHT;

/// Color the swapchain image is cleared to.
pub const CLEAR_COLOR: [f32; 4] = [0.01, 0.01, 0.01, 1.0];

/// Depth the depth attachment is cleared to.
pub const CLEAR_DEPTH: f32 = 1.0;

/// Clear values in attachment order (color, depth).
pub fn clear_values() -> [vk::ClearValue; 2] {
    [
        vk::ClearValue {
            color: vk::ClearColorValue {
                float32: CLEAR_COLOR,
            },
        },
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: CLEAR_DEPTH,
                stencil: 0,
            },
        },
    ]
}

/// Viewport covering `extent` with the full depth range.
pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Scissor covering `extent`.
pub fn full_scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

/// Frame scheduler over a swapchain.
///
/// The frame slot lives in the swapchain's pacer; the renderer only keeps
/// the image index acquired for the frame in progress.
pub struct Renderer {
    device: Arc<Device>,
    swapchain: Swapchain,
    command_buffers: Vec<CommandBuffer>,
    current_image_index: u32,
    frame_started: bool,
    recreate: RecreateState,
}

impl Renderer {
    /// Creates the swapchain for `surface` and one command buffer per frame
    /// slot.
    ///
    /// # Errors
    ///
    /// Returns an error if swapchain creation or command buffer allocation
    /// fails.
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        source: &impl SurfaceSource,
    ) -> RhiResult<Self> {
        let extent = source.extent();
        let swapchain = Swapchain::new(instance, device.clone(), surface, extent)?;

        let command_buffers = device
            .allocate_command_buffers(MAX_FRAMES_IN_FLIGHT as u32)?
            .into_iter()
            .map(|handle| CommandBuffer::from_handle(device.clone(), handle))
            .collect();

        info!(
            "Renderer initialized: {} swapchain images, {} frames in flight",
            swapchain.image_count(),
            MAX_FRAMES_IN_FLIGHT
        );

        Ok(Self {
            device,
            swapchain,
            command_buffers,
            current_image_index: 0,
            frame_started: false,
            recreate: RecreateState::default(),
        })
    }

    /// Starts a frame and returns its command buffer in the recording state.
    ///
    /// Returns `None` when no frame can be rendered this iteration: the
    /// surface is zero-sized, or the swapchain was out of date and has just
    /// been recreated.
    ///
    /// # Panics
    ///
    /// If called while a frame is already in progress.
    pub fn begin_frame(
        &mut self,
        source: &mut impl SurfaceSource,
    ) -> RhiResult<Option<vk::CommandBuffer>> {
        assert!(
            !self.frame_started,
            "Can't call begin_frame while a frame is already in progress"
        );

        match self.recreate.gate(source) {
            FrameGate::Skip => return Ok(None),
            FrameGate::Recreate => {
                debug!("Resize pending, recreating swapchain before acquire");
                self.recreate_swapchain(source)?;
            }
            FrameGate::Acquire => {}
        }

        match self.swapchain.acquire_next_image()? {
            AcquireStatus::OutOfDate => {
                debug!("Swapchain out of date on acquire");
                self.recreate_swapchain(source)?;
                Ok(None)
            }
            AcquireStatus::Image { index, suboptimal } => {
                if suboptimal {
                    debug!("Acquired image {} from a suboptimal swapchain", index);
                }
                self.current_image_index = index;

                let command_buffer = &self.command_buffers[self.frame_index()];
                command_buffer.begin()?;
                self.frame_started = true;
                Ok(Some(command_buffer.handle()))
            }
        }
    }

    /// Ends recording, submits and presents the current frame.
    ///
    /// Recreates the swapchain when presentation reports it out of date or
    /// suboptimal, or when the surface was resized.
    ///
    /// # Panics
    ///
    /// If no frame is in progress.
    pub fn end_frame(&mut self, source: &mut impl SurfaceSource) -> RhiResult<()> {
        assert!(
            self.frame_started,
            "Can't call end_frame while frame is not in progress"
        );

        let command_buffer = &self.command_buffers[self.frame_index()];
        command_buffer.end()?;
        let handle = command_buffer.handle();

        // The slot advances even when presentation fails with out-of-date.
        self.frame_started = false;
        let status = self
            .swapchain
            .submit_command_buffers(handle, self.current_image_index)?;

        if status.needs_recreate() || source.was_resized() {
            debug!("Present reported {:?}, recreating swapchain", status);
            self.recreate_swapchain(source)?;
        }

        Ok(())
    }

    /// Begins the swapchain render pass on `command_buffer` and sets the
    /// viewport and scissor to the swapchain extent.
    ///
    /// # Panics
    ///
    /// If no frame is in progress or `command_buffer` is not the current
    /// frame's buffer.
    pub fn begin_swapchain_render_pass(&self, command_buffer: vk::CommandBuffer) {
        let cmd = self.checked_command_buffer(command_buffer);
        let extent = self.swapchain.extent();

        cmd.begin_render_pass(
            self.swapchain.render_pass(),
            self.swapchain.framebuffer(self.current_image_index),
            full_scissor(extent),
            &clear_values(),
        );
        cmd.set_viewport_and_scissor(full_viewport(extent), full_scissor(extent));
    }

    /// Ends the swapchain render pass.
    ///
    /// # Panics
    ///
    /// Same conditions as [`Renderer::begin_swapchain_render_pass`].
    pub fn end_swapchain_render_pass(&self, command_buffer: vk::CommandBuffer) {
        self.checked_command_buffer(command_buffer).end_render_pass();
    }

    /// Current frame slot.
    #[inline]
    pub fn frame_index(&self) -> usize {
        self.swapchain.current_frame()
    }

    #[inline]
    pub fn aspect_ratio(&self) -> f32 {
        self.swapchain.extent_aspect_ratio()
    }

    /// Render pass the swapchain framebuffers were built for.
    ///
    /// Stays compatible across recreation, so pipelines built against it
    /// remain valid.
    #[inline]
    pub fn render_pass(&self) -> vk::RenderPass {
        self.swapchain.render_pass()
    }

    #[inline]
    pub fn swapchain_image_count(&self) -> usize {
        self.swapchain.image_count()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    #[inline]
    pub fn is_frame_in_progress(&self) -> bool {
        self.frame_started
    }

    /// Command buffer of the frame in progress.
    ///
    /// # Panics
    ///
    /// If no frame is in progress.
    pub fn current_command_buffer(&self) -> vk::CommandBuffer {
        assert!(
            self.frame_started,
            "Cannot get command buffer when frame not in progress"
        );
        self.command_buffers[self.frame_index()].handle()
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    fn checked_command_buffer(&self, command_buffer: vk::CommandBuffer) -> &CommandBuffer {
        assert!(
            self.frame_started,
            "Can't record into the swapchain render pass while frame is not in progress"
        );
        let current = &self.command_buffers[self.frame_index()];
        assert_eq!(
            current.handle(),
            command_buffer,
            "Can't begin render pass on command buffer from a different frame"
        );
        current
    }

    fn recreate_swapchain(&mut self, source: &mut impl SurfaceSource) -> RhiResult<()> {
        let swapchain = &mut self.swapchain;
        let recreated = self.recreate.recreate_with(source, |extent| {
            let previous_images = swapchain.image_count();
            swapchain.recreate(extent)?;
            if swapchain.image_count() != previous_images {
                warn!(
                    "Swapchain image count changed from {} to {}",
                    previous_images,
                    swapchain.image_count()
                );
            }
            Ok(())
        })?;
        if !recreated {
            debug!("Surface is zero-sized, deferring swapchain recreation");
        }
        Ok(())
    }
}

/// What [`Renderer::begin_frame`] does before acquiring an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FrameGate {
    /// Zero-sized surface: no acquire this iteration.
    Skip,
    /// Recreate the swapchain, then acquire.
    Recreate,
    Acquire,
}

/// Deferred swapchain recreation.
#[derive(Debug, Default)]
struct RecreateState {
    /// Set when recreation was requested while the surface was zero-sized.
    pending: bool,
}

impl RecreateState {
    fn gate(&mut self, source: &impl SurfaceSource) -> FrameGate {
        if source.is_zero_sized() {
            if source.was_resized() {
                self.pending = true;
            }
            return FrameGate::Skip;
        }
        if self.pending || source.was_resized() {
            FrameGate::Recreate
        } else {
            FrameGate::Acquire
        }
    }

    /// Runs `recreate` at the source extent, or defers it while the surface
    /// is zero-sized. Returns whether it ran.
    ///
    /// The resize flag and the pending bit are cleared only after `recreate`
    /// succeeds.
    fn recreate_with<S: SurfaceSource>(
        &mut self,
        source: &mut S,
        recreate: impl FnOnce(vk::Extent2D) -> RhiResult<()>,
    ) -> RhiResult<bool> {
        if source.is_zero_sized() {
            self.pending = true;
            return Ok(false);
        }
        recreate(source.extent())?;
        source.reset_resized();
        self.pending = false;
        Ok(true)
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            warn!("Failed to wait for device idle during renderer drop: {}", e);
        }
        let handles: Vec<vk::CommandBuffer> =
            self.command_buffers.iter().map(CommandBuffer::handle).collect();
        self.device.free_command_buffers(&handles);
        debug!("Renderer command buffers freed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_rhi::RhiError;

    struct MockSurface {
        extent: vk::Extent2D,
        resized: bool,
    }

    impl MockSurface {
        fn new(width: u32, height: u32) -> Self {
            Self {
                extent: vk::Extent2D { width, height },
                resized: false,
            }
        }

        fn resize(&mut self, width: u32, height: u32) {
            self.extent = vk::Extent2D { width, height };
            self.resized = true;
        }
    }

    impl SurfaceSource for MockSurface {
        fn extent(&self) -> vk::Extent2D {
            self.extent
        }

        fn was_resized(&self) -> bool {
            self.resized
        }

        fn reset_resized(&mut self) {
            self.resized = false;
        }
    }

    #[test]
    fn test_zero_sized_surface_skips_acquire() {
        let mut state = RecreateState::default();
        let surface = MockSurface::new(0, 0);
        assert_eq!(state.gate(&surface), FrameGate::Skip);
        assert!(!state.pending);

        let surface = MockSurface::new(800, 600);
        assert_eq!(state.gate(&surface), FrameGate::Acquire);
    }

    #[test]
    fn test_resize_while_minimized_recreates_on_first_visible_frame() {
        let mut state = RecreateState::default();
        let mut surface = MockSurface::new(800, 600);

        surface.resize(0, 0);
        assert_eq!(state.gate(&surface), FrameGate::Skip);
        assert!(state.pending);

        let mut extents = Vec::new();
        let ran = state
            .recreate_with(&mut surface, |extent| {
                extents.push(extent);
                Ok(())
            })
            .unwrap();
        assert!(!ran);
        assert!(extents.is_empty());
        assert!(state.pending);

        // Restored without a fresh resize event: the pending bit alone
        // forces recreation.
        surface.extent = vk::Extent2D {
            width: 1024,
            height: 768,
        };
        surface.resized = false;
        assert_eq!(state.gate(&surface), FrameGate::Recreate);

        let ran = state
            .recreate_with(&mut surface, |extent| {
                extents.push(extent);
                Ok(())
            })
            .unwrap();
        assert!(ran);
        assert_eq!(
            extents,
            vec![vk::Extent2D {
                width: 1024,
                height: 768
            }]
        );
        assert!(!state.pending);
        assert_eq!(state.gate(&surface), FrameGate::Acquire);
    }

    #[test]
    fn test_resize_flag_survives_failed_recreation() {
        let mut state = RecreateState::default();
        let mut surface = MockSurface::new(800, 600);
        surface.resize(1024, 768);
        assert_eq!(state.gate(&surface), FrameGate::Recreate);

        let err = state
            .recreate_with(&mut surface, |_| Err(RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST)))
            .unwrap_err();
        assert!(matches!(err, RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST)));
        assert!(surface.was_resized());
        assert_eq!(state.gate(&surface), FrameGate::Recreate);

        assert!(state.recreate_with(&mut surface, |_| Ok(())).unwrap());
        assert!(!surface.was_resized());
        assert_eq!(state.gate(&surface), FrameGate::Acquire);
    }

    #[test]
    fn test_clear_values() {
        let values = clear_values();
        unsafe {
            assert_eq!(values[0].color.float32, [0.01, 0.01, 0.01, 1.0]);
            assert_eq!(values[1].depth_stencil.depth, 1.0);
            assert_eq!(values[1].depth_stencil.stencil, 0);
        }
    }

    #[test]
    fn test_full_viewport_and_scissor() {
        let extent = vk::Extent2D {
            width: 1024,
            height: 768,
        };

        let viewport = full_viewport(extent);
        assert_eq!(viewport.x, 0.0);
        assert_eq!(viewport.width, 1024.0);
        assert_eq!(viewport.height, 768.0);
        assert_eq!(viewport.min_depth, 0.0);
        assert_eq!(viewport.max_depth, 1.0);

        let scissor = full_scissor(extent);
        assert_eq!(scissor.offset.x, 0);
        assert_eq!(scissor.offset.y, 0);
        assert_eq!(scissor.extent.width, 1024);
        assert_eq!(scissor.extent.height, 768);
    }
}
