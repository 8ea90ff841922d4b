//! Vulkan surface ownership and the surface-extent seam used by the renderer.

use ash::vk;

/// Drawable-surface state the frame scheduler polls once per frame.
///
/// The resize flag is sticky: it stays set until the consumer calls
/// [`SurfaceSource::reset_resized`].
pub trait SurfaceSource {
    /// Current drawable extent in pixels.
    fn extent(&self) -> vk::Extent2D;

    /// Whether the surface changed size since the last reset.
    fn was_resized(&self) -> bool;

    fn reset_resized(&mut self);

    /// Zero-sized surfaces (e.g. minimized windows) cannot back a swapchain.
    fn is_zero_sized(&self) -> bool {
        let extent = self.extent();
        extent.width == 0 || extent.height == 0
    }
}

/// RAII wrapper for a Vulkan surface.
///
/// The caller must ensure that the Vulkan instance outlives this surface.
pub struct Surface {
    pub(crate) handle: vk::SurfaceKHR,
    pub(crate) surface_loader: ash::khr::surface::Instance,
}

impl Surface {
    /// Get the raw Vulkan surface handle.
    ///
    /// Valid only as long as this `Surface` exists.
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// Loader for surface capability, format and present-mode queries.
    #[inline]
    pub fn loader(&self) -> &ash::khr::surface::Instance {
        &self.surface_loader
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        // SAFETY: The handle was created by ash_window::create_surface from the
        // same instance as the loader, and is destroyed only here.
        unsafe {
            self.surface_loader.destroy_surface(self.handle, None);
        }
        tracing::debug!("Vulkan surface destroyed");
    }
}
