//! Vulkan logical device, queues and one-shot command submission.
//!
//! The [`Device`] is the leaf every other GPU object hangs off. It owns:
//! - the logical device and its graphics/present queues
//! - the gpu-allocator instance used for every buffer and image
//! - a command pool on the graphics family, used both for the renderer's
//!   per-frame command buffers and for synchronous upload work
//!
//! # Example
//!
//! ```no_run
//! use engine_core::DeviceSelection;
//! use engine_rhi::instance::Instance;
//! use engine_rhi::physical_device::select_physical_device;
//! use engine_rhi::device::Device;
//! use ash::vk;
//!
//! # fn example(instance: &Instance, surface: vk::SurfaceKHR) -> Result<(), engine_rhi::RhiError> {
//! let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//! let info = select_physical_device(instance.handle(), surface, &surface_loader, DeviceSelection::Rated)?;
//! let device = Device::new(instance, &info)?;
//!
//! let cmd = device.begin_single_time_commands()?;
//! // record transfer commands...
//! device.end_single_time_commands(cmd)?;
//! # Ok(())
//! # }
//! ```

use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex, PoisonError};

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use tracing::{debug, error, info};

use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::physical_device::{PhysicalDeviceInfo, QueueFamilyIndices, REQUIRED_DEVICE_EXTENSIONS};

/// Vulkan logical device wrapper.
///
/// Shared as `Arc<Device>`; every RAII wrapper in this crate holds a clone,
/// so the device is destroyed only after the last dependent object.
pub struct Device {
    device: ash::Device,
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    properties: vk::PhysicalDeviceProperties,
    /// Dropped explicitly before the device is destroyed.
    allocator: ManuallyDrop<Mutex<Allocator>>,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    queue_families: QueueFamilyIndices,
    /// Command pools require external synchronization.
    command_pool: Mutex<vk::CommandPool>,
    multi_draw_indirect: bool,
}

impl Device {
    /// Creates the logical device, its queues, allocator and command pool.
    ///
    /// Multi-draw-indirect is enabled only if the physical device reports it;
    /// query [`supports_multi_draw_indirect`](Self::supports_multi_draw_indirect)
    /// to choose the indirect draw path.
    ///
    /// # Errors
    ///
    /// Returns an error if device, allocator or command pool creation fails.
    pub fn new(
        instance: &Instance,
        physical_device_info: &PhysicalDeviceInfo,
    ) -> RhiResult<Arc<Self>> {
        let queue_families = physical_device_info.queue_families;
        let (Some(graphics_family), Some(present_family)) =
            (queue_families.graphics_family, queue_families.present_family)
        else {
            return Err(RhiError::NoSuitableGpu);
        };

        let unique_families = queue_families.unique_families();
        let queue_priorities = [1.0f32];
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();

        let multi_draw_indirect = physical_device_info.supports_multi_draw_indirect();
        let features = vk::PhysicalDeviceFeatures::default()
            .sampler_anisotropy(true)
            .multi_draw_indirect(multi_draw_indirect);

        let extension_names: Vec<*const std::ffi::c_char> = REQUIRED_DEVICE_EXTENSIONS
            .iter()
            .map(|ext| ext.as_ptr())
            .collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&features);

        let device = unsafe {
            instance
                .handle()
                .create_device(physical_device_info.device, &create_info, None)?
        };

        info!(
            "Logical device created for '{}' (queue families {:?})",
            physical_device_info.device_name(),
            unique_families
        );

        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_family, 0) };

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle().clone(),
            device: device.clone(),
            physical_device: physical_device_info.device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })?;

        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(graphics_family)
            .flags(
                vk::CommandPoolCreateFlags::TRANSIENT
                    | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            );
        let command_pool = unsafe { device.create_command_pool(&pool_info, None)? };
        debug!("Command pool created on family {}", graphics_family);

        Ok(Arc::new(Self {
            device,
            instance: instance.handle().clone(),
            physical_device: physical_device_info.device,
            properties: physical_device_info.properties,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            graphics_queue,
            present_queue,
            queue_families,
            command_pool: Mutex::new(command_pool),
            multi_draw_indirect,
        }))
    }

    /// Returns the Vulkan logical device handle.
    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    /// Returns the Vulkan instance the device was created from.
    #[inline]
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// Returns the physical device handle.
    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Returns the physical device properties (limits, name).
    #[inline]
    pub fn properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.properties
    }

    /// Graphics queue; also used for compute dispatches.
    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Present queue; may be the same queue as graphics.
    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    #[inline]
    pub fn queue_families(&self) -> &QueueFamilyIndices {
        &self.queue_families
    }

    /// Returns the GPU memory allocator.
    #[inline]
    pub fn allocator(&self) -> &Mutex<Allocator> {
        &self.allocator
    }

    /// Whether `multiDrawIndirect` was enabled on this device.
    #[inline]
    pub fn supports_multi_draw_indirect(&self) -> bool {
        self.multi_draw_indirect
    }

    /// Waits for all queues to go idle.
    pub fn wait_idle(&self) -> RhiResult<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    /// Allocates primary command buffers from the device's command pool.
    pub fn allocate_command_buffers(&self, count: u32) -> RhiResult<Vec<vk::CommandBuffer>> {
        let pool = self.command_pool.lock().unwrap_or_else(PoisonError::into_inner);
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(*pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        let buffers = unsafe { self.device.allocate_command_buffers(&alloc_info)? };
        debug!("Allocated {} command buffer(s)", count);
        Ok(buffers)
    }

    /// Returns command buffers to the device's command pool.
    pub fn free_command_buffers(&self, buffers: &[vk::CommandBuffer]) {
        if buffers.is_empty() {
            return;
        }
        let pool = self.command_pool.lock().unwrap_or_else(PoisonError::into_inner);
        unsafe { self.device.free_command_buffers(*pool, buffers) };
    }

    /// Allocates a primary command buffer and begins it for one submission.
    ///
    /// Pair with [`end_single_time_commands`](Self::end_single_time_commands).
    pub fn begin_single_time_commands(&self) -> RhiResult<vk::CommandBuffer> {
        let cmd = self.allocate_command_buffers(1)?[0];
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        if let Err(e) = unsafe { self.device.begin_command_buffer(cmd, &begin_info) } {
            self.free_command_buffers(&[cmd]);
            return Err(e.into());
        }
        Ok(cmd)
    }

    /// Ends, submits and waits for a buffer from
    /// [`begin_single_time_commands`](Self::begin_single_time_commands), then frees it.
    ///
    /// This blocks on the graphics queue, so it serializes with frame
    /// submissions. Use it for loading work, never in the frame loop.
    pub fn end_single_time_commands(&self, cmd: vk::CommandBuffer) -> RhiResult<()> {
        let result = (|| -> RhiResult<()> {
            unsafe {
                self.device.end_command_buffer(cmd)?;
                let command_buffers = [cmd];
                let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
                self.device
                    .queue_submit(self.graphics_queue, &[submit_info], vk::Fence::null())?;
                self.device.queue_wait_idle(self.graphics_queue)?;
            }
            Ok(())
        })();

        self.free_command_buffers(&[cmd]);
        result
    }

    /// Copies `size` bytes from `src` to `dst` and waits for the copy to finish.
    pub fn copy_buffer(
        &self,
        src: vk::Buffer,
        dst: vk::Buffer,
        size: vk::DeviceSize,
    ) -> RhiResult<()> {
        let cmd = self.begin_single_time_commands()?;
        let region = vk::BufferCopy::default().size(size);
        unsafe { self.device.cmd_copy_buffer(cmd, src, dst, &[region]) };
        self.end_single_time_commands(cmd)
    }

    /// Returns the first candidate format whose tiling supports `features`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::SwapchainError`] if none of the candidates qualify.
    pub fn find_supported_format(
        &self,
        candidates: &[vk::Format],
        tiling: vk::ImageTiling,
        features: vk::FormatFeatureFlags,
    ) -> RhiResult<vk::Format> {
        select_supported_format(candidates, tiling, features, |format| unsafe {
            self.instance
                .get_physical_device_format_properties(self.physical_device, format)
        })
        .ok_or_else(|| {
            RhiError::SwapchainError(format!(
                "none of {:?} supports {:?} with {:?} tiling",
                candidates, features, tiling
            ))
        })
    }
}

/// Format selection against an arbitrary properties source.
pub fn select_supported_format(
    candidates: &[vk::Format],
    tiling: vk::ImageTiling,
    features: vk::FormatFeatureFlags,
    mut properties: impl FnMut(vk::Format) -> vk::FormatProperties,
) -> Option<vk::Format> {
    candidates.iter().copied().find(|&format| {
        let props = properties(format);
        match tiling {
            vk::ImageTiling::LINEAR => props.linear_tiling_features.contains(features),
            vk::ImageTiling::OPTIMAL => props.optimal_tiling_features.contains(features),
            _ => false,
        }
    })
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                error!("Failed to wait for device idle during drop: {:?}", e);
            }

            let pool = *self.command_pool.get_mut().unwrap_or_else(PoisonError::into_inner);
            self.device.destroy_command_pool(pool, None);

            // Allocator frees its memory blocks through the device, so it goes first.
            ManuallyDrop::drop(&mut self.allocator);

            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// Safety: ash::Device and ash::Instance are Send + Sync, handles are plain
// integers, and the allocator and command pool are behind mutexes.
unsafe impl Send for Device {}
unsafe impl Sync for Device {}
