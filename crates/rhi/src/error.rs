//! RHI-specific error types.

use ash::vk;
use thiserror::Error;

/// RHI-specific error type.
///
/// Setup faults (`NoSuitableGpu`, `PipelineError`, `PoolCreation`, ...) are
/// fatal at their call site. Transient presentation conditions are not
/// errors at all; they surface as [`AcquireStatus`](crate::frame_pacing::AcquireStatus)
/// and [`PresentStatus`](crate::frame_pacing::PresentStatus) values instead.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] vk::Result),

    /// Failed to load Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// No suitable GPU found
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// Shader loading error
    #[error("Shader error: {0}")]
    ShaderError(String),

    /// Surface creation error
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// Swapchain or presentation setup error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// A recreated swapchain no longer matches the formats the pipelines were built for
    #[error("Swapchain {what} format changed from {old:?} to {new:?}")]
    FormatMismatch {
        what: &'static str,
        old: vk::Format,
        new: vk::Format,
    },

    /// Invalid handle error
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Rejected engine settings
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Pipeline creation error
    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// Descriptor pool creation rejected by the driver
    #[error("Descriptor pool creation failed: {0}")]
    PoolCreation(vk::Result),

    /// Descriptor pool has no room left for another set
    #[error("Descriptor pool exhausted")]
    PoolExhausted,

    /// A binding number was registered twice on one layout
    #[error("Descriptor binding {0} is already in use")]
    DuplicateBinding(u32),

    /// A write targeted a binding the layout does not declare
    #[error("Layout does not contain binding {0}")]
    UnknownBinding(u32),

    /// A single-resource write targeted an array binding
    #[error("Binding {binding} expects {count} descriptors, but a single one was written")]
    BindingCardinality { binding: u32, count: u32 },

    /// A host write would run past the end of a buffer
    #[error("Write of {len} bytes at offset {offset} exceeds buffer size {size}")]
    BufferOverflow {
        offset: vk::DeviceSize,
        len: vk::DeviceSize,
        size: vk::DeviceSize,
    },
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vk_result_converts() {
        fn fail() -> RhiResult<()> {
            Err(vk::Result::ERROR_DEVICE_LOST)?;
            Ok(())
        }
        assert!(matches!(
            fail(),
            Err(RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST))
        ));
    }

    #[test]
    fn test_format_mismatch_message() {
        let err = RhiError::FormatMismatch {
            what: "depth",
            old: vk::Format::D32_SFLOAT,
            new: vk::Format::D24_UNORM_S8_UINT,
        };
        let msg = err.to_string();
        assert!(msg.contains("depth"));
        assert!(msg.contains("D32_SFLOAT"));
    }
}
