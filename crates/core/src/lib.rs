//! Core utilities for the particle engine.
//!
//! This crate provides foundational types and utilities used across the engine:
//! - Error types and result aliases
//! - Logging initialization
//! - Frame timer
//! - TOML configuration

pub mod config;
mod error;
mod logging;
mod timer;

pub use config::{DeviceSelection, DrawStrategy, EngineConfig};
pub use error::{Error, Result};
pub use logging::{DEFAULT_LOG_FILTER, init_logging, init_logging_with};
pub use timer::{MAX_FRAME_TIME, Timer};
