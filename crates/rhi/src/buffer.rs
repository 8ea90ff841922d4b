//! GPU buffer management.
//!
//! # Overview
//!
//! - [`BufferUsage`] picks Vulkan usage flags and a memory location.
//! - [`Buffer`] owns a `VkBuffer` and its gpu-allocator allocation. It is laid
//!   out as `instance_count` elements of `instance_size` bytes, each padded to
//!   `alignment_size` so individual elements can be bound as descriptors.
//!
//! Host-visible buffers (`Uniform`, `Staging`) stay persistently mapped for
//! their whole lifetime. Device-local buffers are filled through a staging
//! copy with [`Buffer::new_device_local`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use engine_rhi::device::Device;
//! use engine_rhi::buffer::{Buffer, BufferUsage};
//!
//! # fn example(device: Arc<Device>) -> Result<(), engine_rhi::RhiError> {
//! let indices: [u32; 6] = [0, 2, 1, 2, 0, 3];
//! let index_buffer = Buffer::new_device_local(device, BufferUsage::Index, &indices)?;
//! assert_eq!(index_buffer.instance_count(), 6);
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, PoisonError};

use ash::vk;
use bytemuck::Pod;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Buffer usage type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Vertex data, device-local
    Vertex,
    /// Index data, device-local
    Index,
    /// Per-frame shader uniforms, host-visible
    Uniform,
    /// Shader storage, device-local
    Storage,
    /// Draw-indirect arguments, device-local and also bindable as storage
    Indirect,
    /// Host-visible upload source
    Staging,
}

impl BufferUsage {
    /// Converts to Vulkan buffer usage flags.
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferUsage::Vertex => {
                vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Index => {
                vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
            BufferUsage::Storage => {
                vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Indirect => {
                vk::BufferUsageFlags::INDIRECT_BUFFER
                    | vk::BufferUsageFlags::STORAGE_BUFFER
                    | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
        }
    }

    /// Returns the memory location for this buffer type.
    pub fn memory_location(self) -> MemoryLocation {
        match self {
            BufferUsage::Uniform | BufferUsage::Staging => MemoryLocation::CpuToGpu,
            BufferUsage::Vertex
            | BufferUsage::Index
            | BufferUsage::Storage
            | BufferUsage::Indirect => MemoryLocation::GpuOnly,
        }
    }

    /// Returns a human-readable name for the buffer type.
    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::Vertex => "vertex",
            BufferUsage::Index => "index",
            BufferUsage::Uniform => "uniform",
            BufferUsage::Storage => "storage",
            BufferUsage::Indirect => "indirect",
            BufferUsage::Staging => "staging",
        }
    }
}

/// Rounds `instance_size` up to a multiple of `min_offset_alignment`.
///
/// An alignment of 0 or 1 leaves the size unchanged. Vulkan alignments are
/// powers of two.
#[inline]
pub fn aligned_size(instance_size: vk::DeviceSize, min_offset_alignment: vk::DeviceSize) -> vk::DeviceSize {
    if min_offset_alignment > 1 {
        (instance_size + min_offset_alignment - 1) & !(min_offset_alignment - 1)
    } else {
        instance_size
    }
}

/// GPU buffer wrapper with managed memory.
///
/// # Thread Safety
///
/// Writes through the mapping are not synchronized with the GPU. Only write
/// to a region the in-flight fences say is idle.
pub struct Buffer {
    device: Arc<Device>,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    usage: BufferUsage,
    instance_size: vk::DeviceSize,
    instance_count: u32,
    alignment_size: vk::DeviceSize,
    size: vk::DeviceSize,
}

impl Buffer {
    /// Creates a buffer of `instance_count` elements.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `usage` - The intended buffer usage
    /// * `instance_size` - Size of one element in bytes
    /// * `instance_count` - Number of elements
    /// * `min_offset_alignment` - Per-element alignment, 1 for tightly packed
    ///
    /// # Errors
    ///
    /// Returns an error if the size is zero, or if buffer creation or memory
    /// allocation fails.
    pub fn new(
        device: Arc<Device>,
        usage: BufferUsage,
        instance_size: vk::DeviceSize,
        instance_count: u32,
        min_offset_alignment: vk::DeviceSize,
    ) -> RhiResult<Self> {
        let alignment_size = aligned_size(instance_size, min_offset_alignment);
        let size = alignment_size * instance_count as vk::DeviceSize;
        if size == 0 {
            return Err(RhiError::InvalidHandle(
                "Buffer size must be greater than 0".to_string(),
            ));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage.to_vk_usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None)? };

        // Drop takes care of the handle if allocation fails below.
        let mut this = Self {
            device,
            buffer,
            allocation: None,
            usage,
            instance_size,
            instance_count,
            alignment_size,
            size,
        };

        let requirements = unsafe { this.device.handle().get_buffer_memory_requirements(buffer) };
        let allocation = this
            .device
            .allocator()
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .allocate(&AllocationCreateDesc {
                name: usage.name(),
                requirements,
                location: usage.memory_location(),
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })?;

        let bind = unsafe {
            this.device
                .handle()
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        };
        this.allocation = Some(allocation);
        bind?;

        debug!(
            "Created {} buffer: {} x {} bytes",
            usage.name(),
            instance_count,
            alignment_size
        );
        Ok(this)
    }

    /// Creates a device-local buffer holding `data`, uploaded through a
    /// temporary staging buffer.
    ///
    /// Blocks until the copy completes.
    pub fn new_device_local<T: Pod>(
        device: Arc<Device>,
        usage: BufferUsage,
        data: &[T],
    ) -> RhiResult<Self> {
        let instance_size = std::mem::size_of::<T>() as vk::DeviceSize;
        let instance_count = data.len() as u32;

        let staging = Self::new(
            device.clone(),
            BufferUsage::Staging,
            instance_size,
            instance_count,
            1,
        )?;
        staging.write_to_buffer(bytemuck::cast_slice(data), 0)?;

        let buffer = Self::new(device.clone(), usage, instance_size, instance_count, 1)?;
        device.copy_buffer(staging.handle(), buffer.handle(), buffer.size())?;
        Ok(buffer)
    }

    /// Copies `data` into the mapping at byte `offset`.
    ///
    /// # Errors
    ///
    /// [`RhiError::BufferOverflow`] if the write runs past the end, or
    /// [`RhiError::InvalidHandle`] if the buffer is not host-visible.
    pub fn write_to_buffer(&self, data: &[u8], offset: vk::DeviceSize) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        let len = data.len() as vk::DeviceSize;
        if offset.checked_add(len).is_none_or(|end| end > self.size) {
            return Err(RhiError::BufferOverflow {
                offset,
                len,
                size: self.size,
            });
        }

        let mapped_ptr = self
            .allocation
            .as_ref()
            .and_then(Allocation::mapped_ptr)
            .ok_or_else(|| {
                RhiError::InvalidHandle(format!("{} buffer is not mapped", self.usage.name()))
            })?;

        unsafe {
            let dst = mapped_ptr.as_ptr().cast::<u8>().add(offset as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }
        Ok(())
    }

    /// Writes one element at `index`, honoring the element alignment.
    pub fn write_to_index<T: Pod>(&self, value: &T, index: u32) -> RhiResult<()> {
        let bytes = bytemuck::bytes_of(value);
        if bytes.len() as vk::DeviceSize > self.instance_size {
            return Err(RhiError::BufferOverflow {
                offset: index as vk::DeviceSize * self.alignment_size,
                len: bytes.len() as vk::DeviceSize,
                size: self.instance_size,
            });
        }
        self.write_to_buffer(bytes, index as vk::DeviceSize * self.alignment_size)
    }

    /// Descriptor info covering `range` bytes from `offset`.
    #[inline]
    pub fn descriptor_info(
        &self,
        range: vk::DeviceSize,
        offset: vk::DeviceSize,
    ) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo::default()
            .buffer(self.buffer)
            .offset(offset)
            .range(range)
    }

    /// Descriptor info covering the whole buffer.
    #[inline]
    pub fn whole_descriptor_info(&self) -> vk::DescriptorBufferInfo {
        self.descriptor_info(vk::WHOLE_SIZE, 0)
    }

    /// Returns the Vulkan buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Returns the buffer size in bytes.
    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    #[inline]
    pub fn instance_size(&self) -> vk::DeviceSize {
        self.instance_size
    }

    #[inline]
    pub fn instance_count(&self) -> u32 {
        self.instance_count
    }

    #[inline]
    pub fn alignment_size(&self) -> vk::DeviceSize {
        self.alignment_size
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
        }

        if let Some(allocation) = self.allocation.take() {
            let mut allocator = self
                .device
                .allocator()
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Err(e) = allocator.free(allocation) {
                error!("Failed to free buffer allocation: {:?}", e);
            }
        }

        debug!("Destroyed {} buffer", self.usage.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_usage_to_vk_usage() {
        let device_local = [
            (BufferUsage::Vertex, vk::BufferUsageFlags::VERTEX_BUFFER),
            (BufferUsage::Index, vk::BufferUsageFlags::INDEX_BUFFER),
            (BufferUsage::Storage, vk::BufferUsageFlags::STORAGE_BUFFER),
            (BufferUsage::Indirect, vk::BufferUsageFlags::INDIRECT_BUFFER),
        ];
        for (usage, flag) in device_local {
            let flags = usage.to_vk_usage();
            assert!(flags.contains(flag), "{:?}", usage);
            assert!(flags.contains(vk::BufferUsageFlags::TRANSFER_DST), "{:?}", usage);
            assert_eq!(usage.memory_location(), MemoryLocation::GpuOnly);
        }

        assert!(
            BufferUsage::Indirect
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::STORAGE_BUFFER)
        );
        assert!(
            BufferUsage::Staging
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::TRANSFER_SRC)
        );
    }

    #[test]
    fn test_host_visible_usages() {
        assert_eq!(
            BufferUsage::Uniform.memory_location(),
            MemoryLocation::CpuToGpu
        );
        assert_eq!(
            BufferUsage::Staging.memory_location(),
            MemoryLocation::CpuToGpu
        );
    }

    #[test]
    fn test_aligned_size() {
        assert_eq!(aligned_size(80, 0), 80);
        assert_eq!(aligned_size(80, 1), 80);
        assert_eq!(aligned_size(80, 64), 128);
        assert_eq!(aligned_size(128, 64), 128);
        assert_eq!(aligned_size(1, 256), 256);
    }

    #[test]
    fn test_buffer_usage_name() {
        assert_eq!(BufferUsage::Indirect.name(), "indirect");
        assert_eq!(BufferUsage::Staging.name(), "staging");
    }

    #[test]
    fn test_buffer_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Buffer>();
    }
}
