//! Swapchain management.
//!
//! This module owns everything tied to one generation of presentable images:
//! image views, per-image depth attachments, the render pass, framebuffers,
//! and the per-slot synchronization objects.
//!
//! # Overview
//!
//! - [`SwapchainSupportDetails`] queries what a surface supports.
//! - [`SwapchainPlan`] turns that support data into concrete choices (image
//!   count, formats, present mode, extent) without touching the GPU.
//! - [`Swapchain`] builds the Vulkan objects from a plan, paces frames through
//!   a [`FramePacer`], and rebuilds itself on resize.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use engine_rhi::device::Device;
//! use engine_rhi::frame_pacing::AcquireStatus;
//! use engine_rhi::instance::Instance;
//! use engine_rhi::swapchain::Swapchain;
//! use ash::vk;
//!
//! # fn example(instance: &Instance, device: Arc<Device>, surface: vk::SurfaceKHR, cmd: vk::CommandBuffer) -> Result<(), engine_rhi::RhiError> {
//! let extent = vk::Extent2D { width: 1280, height: 720 };
//! let mut swapchain = Swapchain::new(instance, device, surface, extent)?;
//!
//! match swapchain.acquire_next_image()? {
//!     AcquireStatus::Image { index, .. } => {
//!         // record into cmd using swapchain.framebuffer(index)...
//!         let status = swapchain.submit_command_buffers(cmd, index)?;
//!         if status.needs_recreate() {
//!             swapchain.recreate(extent)?;
//!         }
//!     }
//!     AcquireStatus::OutOfDate => swapchain.recreate(extent)?,
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::depth::{DepthImage, find_depth_format};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::frame_pacing::{AcquireStatus, FramePacer, PresentBackend, PresentStatus};
use crate::instance::Instance;
use crate::render_pass::{Framebuffer, RenderPass};
use crate::sync::{FrameSync, MAX_FRAMES_IN_FLIGHT, create_frame_syncs};

/// Preferred surface format and color space.
pub const PREFERRED_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Swapchain surface support details.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    /// Surface capabilities (image counts, extents, transforms)
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported format and color space combinations
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// Queries swapchain support details for a physical device and surface.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the surface queries fail.
    pub fn query(
        surface_loader: &ash::khr::surface::Instance,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> RhiResult<Self> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };
        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };
        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };

        debug!(
            "Swapchain support: {} formats, {} present modes, image count {}..{}",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count,
            capabilities.max_image_count
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// True if at least one format and one present mode are available.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Concrete swapchain parameters derived from surface support.
#[derive(Debug, Clone, Copy)]
pub struct SwapchainPlan {
    pub image_count: u32,
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub depth_format: vk::Format,
}

impl SwapchainPlan {
    /// Chooses formats, present mode, extent and image count.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::SwapchainError`] if the surface offers no format
    /// or present mode.
    pub fn new(
        support: &SwapchainSupportDetails,
        requested_extent: vk::Extent2D,
        depth_format: vk::Format,
    ) -> RhiResult<Self> {
        if !support.is_adequate() {
            return Err(RhiError::SwapchainError(
                "inadequate swapchain support (no formats or present modes)".to_string(),
            ));
        }

        Ok(Self {
            image_count: choose_image_count(&support.capabilities),
            surface_format: choose_surface_format(&support.formats),
            present_mode: choose_present_mode(&support.present_modes),
            extent: choose_extent(&support.capabilities, requested_extent),
            depth_format,
        })
    }

    /// Checks that a rebuilt swapchain can reuse objects built for `previous`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::FormatMismatch`] if the color or depth format changed.
    pub fn ensure_compatible(&self, previous: &SwapchainPlan) -> RhiResult<()> {
        if self.surface_format.format != previous.surface_format.format {
            return Err(RhiError::FormatMismatch {
                what: "color",
                old: previous.surface_format.format,
                new: self.surface_format.format,
            });
        }
        if self.depth_format != previous.depth_format {
            return Err(RhiError::FormatMismatch {
                what: "depth",
                old: previous.depth_format,
                new: self.depth_format,
            });
        }
        Ok(())
    }
}

/// Vulkan swapchain with its per-image and per-slot resources.
///
/// `image_views`, `depth_images` and `framebuffers` always have one entry
/// per swapchain image. `frame_syncs` always has [`MAX_FRAMES_IN_FLIGHT`].
///
/// # Thread Safety
///
/// Acquire and submit take `&mut self`; only one thread drives presentation.
pub struct Swapchain {
    device: Arc<Device>,
    surface_loader: ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
    swapchain_loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    plan: SwapchainPlan,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    // Field order is destruction order for everything below.
    framebuffers: Vec<Framebuffer>,
    depth_images: Vec<DepthImage>,
    render_pass: RenderPass,
    frame_syncs: Vec<FrameSync>,
    pacer: FramePacer,
}

impl Swapchain {
    /// Creates a swapchain for `surface`.
    ///
    /// # Errors
    ///
    /// Returns an error if surface queries fail, no depth format is usable,
    /// or any swapchain, view, render pass, framebuffer or sync object
    /// creation fails.
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        extent: vk::Extent2D,
    ) -> RhiResult<Self> {
        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());
        Self::create_internal(
            device,
            surface_loader,
            swapchain_loader,
            surface,
            extent,
            None,
        )
    }

    fn create_internal(
        device: Arc<Device>,
        surface_loader: ash::khr::surface::Instance,
        swapchain_loader: ash::khr::swapchain::Device,
        surface: vk::SurfaceKHR,
        extent: vk::Extent2D,
        previous: Option<(&SwapchainPlan, vk::SwapchainKHR)>,
    ) -> RhiResult<Self> {
        let support =
            SwapchainSupportDetails::query(&surface_loader, device.physical_device(), surface)?;
        let depth_format = find_depth_format(&device)?;
        let plan = SwapchainPlan::new(&support, extent, depth_format)?;

        let old_swapchain = match previous {
            Some((previous_plan, handle)) => {
                plan.ensure_compatible(previous_plan)?;
                handle
            }
            None => vk::SwapchainKHR::null(),
        };

        info!(
            "Creating swapchain: {}x{}, format {:?}, present mode {:?}, {} images, depth {:?}",
            plan.extent.width,
            plan.extent.height,
            plan.surface_format.format,
            plan.present_mode,
            plan.image_count,
            plan.depth_format
        );

        let queue_families = device.queue_families();
        let (Some(graphics_family), Some(present_family)) =
            (queue_families.graphics_family, queue_families.present_family)
        else {
            return Err(RhiError::SwapchainError(
                "device has no graphics/present queue families".to_string(),
            ));
        };
        let family_indices = [graphics_family, present_family];
        let (sharing_mode, shared_families) = if graphics_family != present_family {
            (vk::SharingMode::CONCURRENT, family_indices.as_slice())
        } else {
            (vk::SharingMode::EXCLUSIVE, &[][..])
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(plan.image_count)
            .image_format(plan.surface_format.format)
            .image_color_space(plan.surface_format.color_space)
            .image_extent(plan.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(shared_families)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(plan.present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None)? };
        let images = match unsafe { swapchain_loader.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(e) => {
                unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
                return Err(e.into());
            }
        };

        let render_pass = match RenderPass::for_swapchain(
            device.clone(),
            plan.surface_format.format,
            plan.depth_format,
        ) {
            Ok(render_pass) => render_pass,
            Err(e) => {
                unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
                return Err(e);
            }
        };

        // Once assembled, Drop releases whatever the remaining steps created.
        let mut this = Self {
            pacer: FramePacer::new(images.len(), MAX_FRAMES_IN_FLIGHT),
            device,
            surface_loader,
            surface,
            swapchain_loader,
            swapchain,
            plan,
            images,
            image_views: Vec::new(),
            framebuffers: Vec::new(),
            depth_images: Vec::new(),
            render_pass,
            frame_syncs: Vec::new(),
        };
        this.create_image_views()?;
        this.create_depth_images()?;
        this.create_framebuffers()?;
        this.frame_syncs = create_frame_syncs(&this.device)?;

        info!("Swapchain created with {} images", this.images.len());
        Ok(this)
    }

    fn create_image_views(&mut self) -> RhiResult<()> {
        for (i, &image) in self.images.iter().enumerate() {
            let create_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(self.plan.surface_format.format)
                .components(vk::ComponentMapping::default())
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .base_mip_level(0)
                        .level_count(1)
                        .base_array_layer(0)
                        .layer_count(1),
                );

            let view = unsafe {
                self.device
                    .handle()
                    .create_image_view(&create_info, None)
                    .map_err(|e| {
                        RhiError::SwapchainError(format!(
                            "failed to create image view {}: {:?}",
                            i, e
                        ))
                    })?
            };
            self.image_views.push(view);
        }
        Ok(())
    }

    fn create_depth_images(&mut self) -> RhiResult<()> {
        for _ in 0..self.images.len() {
            let depth = DepthImage::new(
                self.device.clone(),
                self.plan.extent,
                self.plan.depth_format,
            )?;
            self.depth_images.push(depth);
        }
        Ok(())
    }

    fn create_framebuffers(&mut self) -> RhiResult<()> {
        for (view, depth) in self.image_views.iter().zip(&self.depth_images) {
            let framebuffer = Framebuffer::new(
                self.device.clone(),
                &self.render_pass,
                &[*view, depth.view()],
                self.plan.extent,
            )?;
            self.framebuffers.push(framebuffer);
        }
        Ok(())
    }

    /// Rebuilds the swapchain for a new surface extent.
    ///
    /// Waits for the device to go idle, builds a new generation with the
    /// current swapchain as the `old_swapchain` hint, then tears the old
    /// generation down. The frame slot restarts at 0.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::FormatMismatch`] if the surface now reports a
    /// different color or depth format. This is not recoverable: pipelines
    /// were built against the old formats.
    pub fn recreate(&mut self, extent: vk::Extent2D) -> RhiResult<()> {
        self.device.wait_idle()?;
        info!(
            "Recreating swapchain: {}x{} -> {}x{}",
            self.plan.extent.width, self.plan.extent.height, extent.width, extent.height
        );

        let rebuilt = Self::create_internal(
            self.device.clone(),
            self.surface_loader.clone(),
            self.swapchain_loader.clone(),
            self.surface,
            extent,
            Some((&self.plan, self.swapchain)),
        )?;

        let previous = std::mem::replace(self, rebuilt);
        drop(previous);
        Ok(())
    }

    /// Waits for the current slot, then acquires the next image.
    ///
    /// # Errors
    ///
    /// Any failure other than an out-of-date swapchain, which is reported as
    /// [`AcquireStatus::OutOfDate`].
    pub fn acquire_next_image(&mut self) -> RhiResult<AcquireStatus> {
        let mut backend = VulkanPresentBackend {
            device: &self.device,
            swapchain_loader: &self.swapchain_loader,
            swapchain: self.swapchain,
            frame_syncs: &self.frame_syncs,
        };
        self.pacer.acquire(&mut backend)
    }

    /// Submits `command_buffer` for `image_index`, presents, and advances the
    /// frame slot.
    pub fn submit_command_buffers(
        &mut self,
        command_buffer: vk::CommandBuffer,
        image_index: u32,
    ) -> RhiResult<PresentStatus> {
        let mut backend = VulkanPresentBackend {
            device: &self.device,
            swapchain_loader: &self.swapchain_loader,
            swapchain: self.swapchain,
            frame_syncs: &self.frame_syncs,
        };
        self.pacer.submit(&mut backend, command_buffer, image_index)
    }

    /// Returns the swapchain handle.
    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    #[inline]
    pub fn plan(&self) -> &SwapchainPlan {
        &self.plan
    }

    /// Returns the swapchain image format.
    #[inline]
    pub fn image_format(&self) -> vk::Format {
        self.plan.surface_format.format
    }

    #[inline]
    pub fn depth_format(&self) -> vk::Format {
        self.plan.depth_format
    }

    /// Returns the swapchain extent (resolution).
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.plan.extent
    }

    /// Width over height of the current extent.
    #[inline]
    pub fn extent_aspect_ratio(&self) -> f32 {
        self.plan.extent.width as f32 / self.plan.extent.height.max(1) as f32
    }

    /// Returns the number of swapchain images.
    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass.handle()
    }

    /// Returns the framebuffer for an acquired image.
    ///
    /// # Panics
    ///
    /// Panics if `image_index` is out of bounds.
    #[inline]
    pub fn framebuffer(&self, image_index: u32) -> vk::Framebuffer {
        self.framebuffers[image_index as usize].handle()
    }

    /// Current frame slot.
    #[inline]
    pub fn current_frame(&self) -> usize {
        self.pacer.current_frame()
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        // Framebuffers reference the views; release them before the views go.
        self.framebuffers.clear();
        unsafe {
            for &view in &self.image_views {
                self.device.handle().destroy_image_view(view, None);
            }
            self.swapchain_loader
                .destroy_swapchain(self.swapchain, None);
        }
        debug!(
            "Swapchain destroyed (was {}x{}, {} images)",
            self.plan.extent.width,
            self.plan.extent.height,
            self.images.len()
        );
    }
}

/// [`PresentBackend`] over borrowed swapchain parts.
struct VulkanPresentBackend<'a> {
    device: &'a Device,
    swapchain_loader: &'a ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    frame_syncs: &'a [FrameSync],
}

impl PresentBackend for VulkanPresentBackend<'_> {
    fn wait_for_fence(&mut self, slot: usize) -> RhiResult<()> {
        self.frame_syncs[slot].in_flight_fence().wait_forever()
    }

    fn reset_fence(&mut self, slot: usize) -> RhiResult<()> {
        self.frame_syncs[slot].in_flight_fence().reset()
    }

    fn acquire_image(&mut self, slot: usize) -> Result<(u32, bool), vk::Result> {
        let semaphore = self.frame_syncs[slot].image_available_semaphore().handle();
        unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        }
    }

    fn submit(&mut self, slot: usize, command_buffer: vk::CommandBuffer) -> RhiResult<()> {
        let sync = &self.frame_syncs[slot];
        let wait_semaphores = [sync.image_available_semaphore().handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [sync.render_finished_semaphore().handle()];
        let command_buffers = [command_buffer];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device.handle().queue_submit(
                self.device.graphics_queue(),
                &[submit_info],
                sync.in_flight_fence().handle(),
            )?;
        }
        Ok(())
    }

    fn present(&mut self, slot: usize, image_index: u32) -> Result<bool, vk::Result> {
        let wait_semaphores = [self.frame_syncs[slot].render_finished_semaphore().handle()];
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe {
            self.swapchain_loader
                .queue_present(self.device.present_queue(), &present_info)
        }
    }
}

/// Prefers [`PREFERRED_SURFACE_FORMAT`], else the first available format.
fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    let preferred = formats.iter().find(|f| {
        f.format == PREFERRED_SURFACE_FORMAT.format
            && f.color_space == PREFERRED_SURFACE_FORMAT.color_space
    });

    match preferred {
        Some(&format) => format,
        None => {
            warn!(
                "Preferred surface format unavailable, using {:?}",
                formats[0].format
            );
            formats[0]
        }
    }
}

/// MAILBOX when available, otherwise FIFO (always supported).
fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        debug!("Selected MAILBOX present mode");
        return vk::PresentModeKHR::MAILBOX;
    }
    debug!("Selected FIFO present mode (vsync)");
    vk::PresentModeKHR::FIFO
}

/// Uses the surface's current extent unless it is the "any size" sentinel,
/// in which case the requested size is clamped to the surface limits.
fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, requested: vk::Extent2D) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: requested.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: requested.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// One more than the minimum, capped by the maximum (0 means unbounded).
fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    fn dims(extent: vk::Extent2D) -> (u32, u32) {
        (extent.width, extent.height)
    }

    fn resizable_support() -> SwapchainSupportDetails {
        SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 8,
                current_extent: extent(u32::MAX, u32::MAX),
                min_image_extent: extent(1, 1),
                max_image_extent: extent(4096, 4096),
                ..Default::default()
            },
            formats: vec![
                vk::SurfaceFormatKHR {
                    format: vk::Format::R8G8B8A8_UNORM,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
                PREFERRED_SURFACE_FORMAT,
            ],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        }
    }

    #[test]
    fn test_choose_surface_format_prefers_srgb() {
        let support = resizable_support();
        let selected = choose_surface_format(&support.formats);
        assert_eq!(selected.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(selected.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn test_choose_surface_format_fallback() {
        let formats = vec![vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }];
        assert_eq!(
            choose_surface_format(&formats).format,
            vk::Format::R8G8B8A8_UNORM
        );
    }

    #[test]
    fn test_choose_present_mode() {
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX]),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE]),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn test_choose_extent_uses_current() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: extent(1920, 1080),
            min_image_extent: extent(1, 1),
            max_image_extent: extent(4096, 4096),
            ..Default::default()
        };
        assert_eq!(dims(choose_extent(&capabilities, extent(800, 600))), (1920, 1080));
    }

    #[test]
    fn test_choose_extent_clamps_to_limits() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: extent(u32::MAX, u32::MAX),
            min_image_extent: extent(100, 100),
            max_image_extent: extent(2000, 2000),
            ..Default::default()
        };
        assert_eq!(dims(choose_extent(&capabilities, extent(3000, 3000))), (2000, 2000));
        assert_eq!(dims(choose_extent(&capabilities, extent(50, 50))), (100, 100));
        assert_eq!(dims(choose_extent(&capabilities, extent(800, 600))), (800, 600));
    }

    #[test]
    fn test_choose_image_count() {
        let capped = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 2,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&capped), 2);

        let unbounded = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&unbounded), 3);
    }

    #[test]
    fn test_plan_rejects_inadequate_support() {
        let mut support = resizable_support();
        support.present_modes.clear();
        let err = SwapchainPlan::new(&support, extent(800, 600), vk::Format::D32_SFLOAT)
            .unwrap_err();
        assert!(matches!(err, RhiError::SwapchainError(_)));
    }

    #[test]
    fn test_resize_round_trip_keeps_formats_and_image_count() {
        let support = resizable_support();
        let depth = vk::Format::D32_SFLOAT;

        let initial = SwapchainPlan::new(&support, extent(800, 600), depth).unwrap();
        let grown = SwapchainPlan::new(&support, extent(1024, 768), depth).unwrap();
        grown.ensure_compatible(&initial).unwrap();
        let restored = SwapchainPlan::new(&support, extent(800, 600), depth).unwrap();
        restored.ensure_compatible(&grown).unwrap();

        assert_eq!(dims(grown.extent), (1024, 768));
        assert_eq!(dims(restored.extent), dims(initial.extent));
        for plan in [&grown, &restored] {
            assert_eq!(plan.image_count, initial.image_count);
            assert_eq!(plan.surface_format.format, initial.surface_format.format);
            assert_eq!(plan.surface_format.color_space, initial.surface_format.color_space);
            assert_eq!(plan.present_mode, initial.present_mode);
            assert_eq!(plan.depth_format, initial.depth_format);
        }
    }

    #[test]
    fn test_format_change_is_rejected() {
        let support = resizable_support();
        let previous = SwapchainPlan::new(&support, extent(800, 600), vk::Format::D32_SFLOAT)
            .unwrap();

        let depth_changed =
            SwapchainPlan::new(&support, extent(800, 600), vk::Format::D24_UNORM_S8_UINT)
                .unwrap();
        assert!(matches!(
            depth_changed.ensure_compatible(&previous),
            Err(RhiError::FormatMismatch { what: "depth", .. })
        ));

        let mut color_support = support.clone();
        color_support.formats.retain(|f| f.format != vk::Format::B8G8R8A8_SRGB);
        let color_changed =
            SwapchainPlan::new(&color_support, extent(800, 600), vk::Format::D32_SFLOAT).unwrap();
        assert!(matches!(
            color_changed.ensure_compatible(&previous),
            Err(RhiError::FormatMismatch { what: "color", .. })
        ));
    }

    #[test]
    fn test_swapchain_support_details_is_adequate() {
        let support = resizable_support();
        assert!(support.is_adequate());

        let no_formats = SwapchainSupportDetails {
            formats: vec![],
            ..support
        };
        assert!(!no_formats.is_adequate());
    }
}
