//! Frame scheduling and the particle pipeline.
//!
//! This crate sits on top of `engine_rhi`:
//! - [`Renderer`] drives acquire/submit/present over the swapchain
//! - [`FrameInfo`] carries the per-frame recording context
//! - [`particle`] simulates particles in a compute pass and draws them
//!   instanced or through indirect draw records

mod frame_info;
pub mod particle;
mod renderer;
pub mod ubo;

pub use frame_info::FrameInfo;
pub use particle::ParticleSystem;
pub use renderer::{CLEAR_COLOR, CLEAR_DEPTH, Renderer, clear_values, full_scissor, full_viewport};
