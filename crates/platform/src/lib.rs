//! Platform abstraction layer for the particle engine.
//!
//! This crate provides platform-specific functionality:
//! - Window management and resize tracking via winit
//! - Vulkan surface creation through raw window handles

mod surface;
mod window;

pub use surface::{Surface, SurfaceSource};
pub use window::Window;

// Re-export winit types that users might need
pub use winit::event::{Event, WindowEvent};
pub use winit::event_loop::EventLoop;
