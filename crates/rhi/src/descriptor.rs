//! Descriptor set management for shader resource binding.
//!
//! # Overview
//!
//! Three builders separate *what* a shader needs from *which* resources
//! satisfy it:
//! 1. [`DescriptorSetLayoutBuilder`] declares bindings (kind, stages, count)
//!    and produces an immutable [`DescriptorSetLayout`].
//! 2. [`DescriptorPoolBuilder`] declares an allocation budget and produces a
//!    [`DescriptorPool`].
//! 3. [`DescriptorWriter`] validates buffer/image writes against a layout,
//!    then either allocates a new set ([`DescriptorWriter::build`]) or
//!    refreshes an existing one ([`DescriptorWriter::overwrite`]).
//!
//! Pool exhaustion is reported as `Ok(None)` rather than an error so callers
//! can fall back to another pool.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use engine_rhi::device::Device;
//! use engine_rhi::descriptor::{DescriptorPoolBuilder, DescriptorSetLayoutBuilder, DescriptorWriter};
//!
//! # fn example(device: Arc<Device>, ubo: vk::DescriptorBufferInfo) -> Result<(), engine_rhi::RhiError> {
//! let layout = DescriptorSetLayoutBuilder::new()
//!     .add_binding(0, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::VERTEX, 1)?
//!     .build(device.clone())?;
//!
//! let pool = DescriptorPoolBuilder::new()
//!     .set_max_sets(2)
//!     .add_pool_size(vk::DescriptorType::UNIFORM_BUFFER, 2)
//!     .build(device)?;
//!
//! let set = DescriptorWriter::new(&layout, &pool)
//!     .write_buffer(0, ubo)?
//!     .build()?
//!     .ok_or(engine_rhi::RhiError::PoolExhausted)?;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Default set budget for pools that don't specify one.
pub const DEFAULT_MAX_SETS: u32 = 1000;

/// One declared binding of a set layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutBinding {
    pub descriptor_type: vk::DescriptorType,
    pub stage_flags: vk::ShaderStageFlags,
    pub count: u32,
}

/// Collects bindings for a [`DescriptorSetLayout`].
#[derive(Debug, Clone, Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: BTreeMap<u32, LayoutBinding>,
}

impl DescriptorSetLayoutBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `binding`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::DuplicateBinding`] if the number is already taken.
    pub fn add_binding(
        mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        stage_flags: vk::ShaderStageFlags,
        count: u32,
    ) -> RhiResult<Self> {
        if self.bindings.contains_key(&binding) {
            return Err(RhiError::DuplicateBinding(binding));
        }
        self.bindings.insert(
            binding,
            LayoutBinding {
                descriptor_type,
                stage_flags,
                count,
            },
        );
        Ok(self)
    }

    /// Bindings registered so far, keyed by binding number.
    #[inline]
    pub fn bindings(&self) -> &BTreeMap<u32, LayoutBinding> {
        &self.bindings
    }

    /// Creates the layout.
    pub fn build(self, device: Arc<Device>) -> RhiResult<DescriptorSetLayout> {
        DescriptorSetLayout::new(device, self.bindings)
    }
}

/// Descriptor set layout wrapper.
///
/// Immutable after creation. Keeps its binding table so writers can check
/// writes against it.
pub struct DescriptorSetLayout {
    device: Arc<Device>,
    layout: vk::DescriptorSetLayout,
    bindings: BTreeMap<u32, LayoutBinding>,
}

impl DescriptorSetLayout {
    fn new(device: Arc<Device>, bindings: BTreeMap<u32, LayoutBinding>) -> RhiResult<Self> {
        let vk_bindings: Vec<vk::DescriptorSetLayoutBinding> = bindings
            .iter()
            .map(|(&binding, info)| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(binding)
                    .descriptor_type(info.descriptor_type)
                    .descriptor_count(info.count)
                    .stage_flags(info.stage_flags)
            })
            .collect();

        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&vk_bindings);
        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)?
        };

        debug!(
            "Created descriptor set layout with {} binding(s)",
            bindings.len()
        );

        Ok(Self {
            device,
            layout,
            bindings,
        })
    }

    /// Returns the Vulkan descriptor set layout handle.
    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    #[inline]
    pub fn bindings(&self) -> &BTreeMap<u32, LayoutBinding> {
        &self.bindings
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None);
        }
        debug!("Destroyed descriptor set layout");
    }
}

/// Declares the budget of a [`DescriptorPool`].
#[derive(Debug, Clone)]
pub struct DescriptorPoolBuilder {
    pool_sizes: Vec<vk::DescriptorPoolSize>,
    max_sets: u32,
}

impl Default for DescriptorPoolBuilder {
    fn default() -> Self {
        Self {
            pool_sizes: Vec::new(),
            max_sets: DEFAULT_MAX_SETS,
        }
    }
}

impl DescriptorPoolBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pool_size(mut self, descriptor_type: vk::DescriptorType, count: u32) -> Self {
        self.pool_sizes.push(
            vk::DescriptorPoolSize::default()
                .ty(descriptor_type)
                .descriptor_count(count),
        );
        self
    }

    pub fn set_max_sets(mut self, max_sets: u32) -> Self {
        self.max_sets = max_sets;
        self
    }

    /// Creates the pool.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::PoolCreation`] if the driver rejects the budget.
    pub fn build(self, device: Arc<Device>) -> RhiResult<DescriptorPool> {
        DescriptorPool::new(device, self.max_sets, &self.pool_sizes)
    }
}

/// Fixed-capacity descriptor set allocator.
///
/// # Thread Safety
///
/// Pool operations need external synchronization; the engine touches pools
/// from the render thread only.
pub struct DescriptorPool {
    device: Arc<Device>,
    pool: vk::DescriptorPool,
    max_sets: u32,
}

impl DescriptorPool {
    fn new(
        device: Arc<Device>,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);

        let pool = unsafe {
            device
                .handle()
                .create_descriptor_pool(&create_info, None)
                .map_err(RhiError::PoolCreation)?
        };

        debug!(
            "Created descriptor pool: max_sets={}, pool_sizes={}",
            max_sets,
            pool_sizes.len()
        );

        Ok(Self {
            device,
            pool,
            max_sets,
        })
    }

    /// Allocates one set for `layout`.
    ///
    /// Returns `Ok(None)` when the pool is out of memory or fragmented.
    ///
    /// # Errors
    ///
    /// Any other allocation failure.
    pub fn allocate_descriptor(
        &self,
        layout: &DescriptorSetLayout,
    ) -> RhiResult<Option<vk::DescriptorSet>> {
        let layouts = [layout.handle()];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        let result = unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info) };
        classify_allocation(result)
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    #[inline]
    pub fn max_sets(&self) -> u32 {
        self.max_sets
    }

    #[inline]
    fn device(&self) -> &Device {
        &self.device
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_pool(self.pool, None);
        }
        debug!("Destroyed descriptor pool");
    }
}

/// Maps an allocation result, treating exhaustion as a soft failure.
fn classify_allocation(
    result: Result<Vec<vk::DescriptorSet>, vk::Result>,
) -> RhiResult<Option<vk::DescriptorSet>> {
    match result {
        Ok(sets) => Ok(sets.into_iter().next()),
        Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL) => {
            warn!("Descriptor pool exhausted");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Checks that a single resource may be written to `binding`.
pub fn check_write(
    bindings: &BTreeMap<u32, LayoutBinding>,
    binding: u32,
) -> RhiResult<LayoutBinding> {
    let info = bindings
        .get(&binding)
        .copied()
        .ok_or(RhiError::UnknownBinding(binding))?;
    if info.count != 1 {
        return Err(RhiError::BindingCardinality {
            binding,
            count: info.count,
        });
    }
    Ok(info)
}

#[derive(Debug, Clone, Copy)]
enum WriteResource {
    Buffer(vk::DescriptorBufferInfo),
    Image(vk::DescriptorImageInfo),
}

#[derive(Debug, Clone, Copy)]
struct PendingWrite {
    binding: u32,
    descriptor_type: vk::DescriptorType,
    resource: WriteResource,
}

impl PendingWrite {
    /// Validates `binding` and takes its descriptor type from the layout.
    fn new(
        bindings: &BTreeMap<u32, LayoutBinding>,
        binding: u32,
        resource: WriteResource,
    ) -> RhiResult<Self> {
        let layout_binding = check_write(bindings, binding)?;
        Ok(Self {
            binding,
            descriptor_type: layout_binding.descriptor_type,
            resource,
        })
    }

    fn to_vk(&self, set: vk::DescriptorSet) -> vk::WriteDescriptorSet<'_> {
        let write = vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(self.binding)
            .dst_array_element(0)
            .descriptor_type(self.descriptor_type);
        match &self.resource {
            WriteResource::Buffer(info) => write.buffer_info(std::slice::from_ref(info)),
            WriteResource::Image(info) => write.image_info(std::slice::from_ref(info)),
        }
    }
}

/// Accumulates resource writes for one set.
pub struct DescriptorWriter<'a> {
    layout: &'a DescriptorSetLayout,
    pool: &'a DescriptorPool,
    writes: Vec<PendingWrite>,
}

impl<'a> DescriptorWriter<'a> {
    pub fn new(layout: &'a DescriptorSetLayout, pool: &'a DescriptorPool) -> Self {
        Self {
            layout,
            pool,
            writes: Vec::new(),
        }
    }

    /// Queues a buffer for `binding`.
    ///
    /// # Errors
    ///
    /// [`RhiError::UnknownBinding`] or [`RhiError::BindingCardinality`].
    pub fn write_buffer(
        mut self,
        binding: u32,
        info: vk::DescriptorBufferInfo,
    ) -> RhiResult<Self> {
        self.writes.push(PendingWrite::new(
            self.layout.bindings(),
            binding,
            WriteResource::Buffer(info),
        )?);
        Ok(self)
    }

    /// Queues an image/sampler for `binding`.
    ///
    /// # Errors
    ///
    /// [`RhiError::UnknownBinding`] or [`RhiError::BindingCardinality`].
    pub fn write_image(mut self, binding: u32, info: vk::DescriptorImageInfo) -> RhiResult<Self> {
        self.writes.push(PendingWrite::new(
            self.layout.bindings(),
            binding,
            WriteResource::Image(info),
        )?);
        Ok(self)
    }

    /// Allocates a set from the pool and applies all queued writes.
    ///
    /// Returns `Ok(None)` if the pool is exhausted.
    pub fn build(self) -> RhiResult<Option<vk::DescriptorSet>> {
        let Some(set) = self.pool.allocate_descriptor(self.layout)? else {
            return Ok(None);
        };
        self.overwrite(set);
        Ok(Some(set))
    }

    /// Applies all queued writes to an already allocated set.
    pub fn overwrite(&self, set: vk::DescriptorSet) {
        let writes: Vec<vk::WriteDescriptorSet> =
            self.writes.iter().map(|pending| pending.to_vk(set)).collect();

        if writes.is_empty() {
            return;
        }
        unsafe {
            self.pool.device().handle().update_descriptor_sets(&writes, &[]);
        }
        debug!("Wrote {} descriptor binding(s)", writes.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn particle_layout() -> DescriptorSetLayoutBuilder {
        DescriptorSetLayoutBuilder::new()
            .add_binding(
                0,
                vk::DescriptorType::UNIFORM_BUFFER,
                vk::ShaderStageFlags::COMPUTE | vk::ShaderStageFlags::VERTEX,
                1,
            )
            .unwrap()
            .add_binding(
                1,
                vk::DescriptorType::STORAGE_BUFFER,
                vk::ShaderStageFlags::COMPUTE,
                1,
            )
            .unwrap()
    }

    #[test]
    fn test_duplicate_binding_fails_before_build() {
        let err = particle_layout()
            .add_binding(
                1,
                vk::DescriptorType::STORAGE_BUFFER,
                vk::ShaderStageFlags::VERTEX,
                1,
            )
            .unwrap_err();
        assert!(matches!(err, RhiError::DuplicateBinding(1)));
    }

    #[test]
    fn test_builder_keeps_bindings_sorted() {
        let builder = DescriptorSetLayoutBuilder::new()
            .add_binding(2, vk::DescriptorType::STORAGE_BUFFER, vk::ShaderStageFlags::COMPUTE, 1)
            .unwrap()
            .add_binding(0, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::VERTEX, 1)
            .unwrap();
        let numbers: Vec<u32> = builder.bindings().keys().copied().collect();
        assert_eq!(numbers, vec![0, 2]);
    }

    #[test]
    fn test_check_write_unknown_binding() {
        let builder = particle_layout();
        assert!(matches!(
            check_write(builder.bindings(), 7),
            Err(RhiError::UnknownBinding(7))
        ));
    }

    #[test]
    fn test_check_write_cardinality() {
        let builder = particle_layout()
            .add_binding(
                3,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                vk::ShaderStageFlags::FRAGMENT,
                4,
            )
            .unwrap();
        assert!(matches!(
            check_write(builder.bindings(), 3),
            Err(RhiError::BindingCardinality {
                binding: 3,
                count: 4
            })
        ));

        let info = check_write(builder.bindings(), 0).unwrap();
        assert_eq!(info.descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
    }

    #[test]
    fn test_image_write_takes_layout_type() {
        let builder = particle_layout()
            .add_binding(
                3,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                vk::ShaderStageFlags::FRAGMENT,
                1,
            )
            .unwrap();
        let image = vk::DescriptorImageInfo::default()
            .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);

        let pending =
            PendingWrite::new(builder.bindings(), 3, WriteResource::Image(image)).unwrap();
        assert_eq!(pending.descriptor_type, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);

        let write = pending.to_vk(vk::DescriptorSet::null());
        assert_eq!(write.dst_binding, 3);
        assert_eq!(write.descriptor_count, 1);
        assert_eq!(write.descriptor_type, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert!(!write.p_image_info.is_null());
        assert!(write.p_buffer_info.is_null());
        let written = unsafe { &*write.p_image_info };
        assert_eq!(written.image_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    }

    #[test]
    fn test_image_write_checks_binding() {
        let builder = particle_layout()
            .add_binding(
                3,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                vk::ShaderStageFlags::FRAGMENT,
                2,
            )
            .unwrap();
        let image = WriteResource::Image(vk::DescriptorImageInfo::default());
        assert!(matches!(
            PendingWrite::new(builder.bindings(), 4, image),
            Err(RhiError::UnknownBinding(4))
        ));
        assert!(matches!(
            PendingWrite::new(builder.bindings(), 3, image),
            Err(RhiError::BindingCardinality {
                binding: 3,
                count: 2
            })
        ));
    }

    #[test]
    fn test_buffer_write_points_at_buffer_info() {
        let buffer = vk::DescriptorBufferInfo::default().range(vk::WHOLE_SIZE);
        let pending =
            PendingWrite::new(particle_layout().bindings(), 1, WriteResource::Buffer(buffer))
                .unwrap();
        let write = pending.to_vk(vk::DescriptorSet::null());
        assert_eq!(write.descriptor_type, vk::DescriptorType::STORAGE_BUFFER);
        assert!(!write.p_buffer_info.is_null());
        assert!(write.p_image_info.is_null());
    }

    #[test]
    fn test_pool_builder_defaults() {
        let builder = DescriptorPoolBuilder::new();
        assert_eq!(builder.max_sets, DEFAULT_MAX_SETS);
        assert!(builder.pool_sizes.is_empty());

        let builder = builder
            .set_max_sets(2)
            .add_pool_size(vk::DescriptorType::STORAGE_BUFFER, 4);
        assert_eq!(builder.max_sets, 2);
        assert_eq!(builder.pool_sizes[0].descriptor_count, 4);
    }

    #[test]
    fn test_exhaustion_is_not_an_error() {
        assert!(matches!(
            classify_allocation(Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY)),
            Ok(None)
        ));
        assert!(matches!(
            classify_allocation(Err(vk::Result::ERROR_FRAGMENTED_POOL)),
            Ok(None)
        ));
        assert!(matches!(
            classify_allocation(Err(vk::Result::ERROR_DEVICE_LOST)),
            Err(RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST))
        ));
        assert!(matches!(
            classify_allocation(Ok(vec![vk::DescriptorSet::null()])),
            Ok(Some(_))
        ));
    }
}
