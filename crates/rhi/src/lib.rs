//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! This crate provides a safe abstraction over Vulkan using the `ash` crate.
//! It handles:
//! - Instance, physical device and logical device creation
//! - Swapchain management and frame pacing
//! - Render pass, framebuffers and depth resources
//! - Command buffer recording
//! - Buffer management and staged uploads
//! - Descriptor set layouts, pools and writers
//! - Graphics and compute pipeline creation
//! - Synchronization primitives

mod error;

pub mod buffer;
pub mod command;
pub mod depth;
pub mod descriptor;
pub mod device;
pub mod frame_pacing;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod render_pass;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod vertex;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
