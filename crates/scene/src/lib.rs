//! Scene objects and camera.
//!
//! This crate provides:
//! - Entity id allocation
//! - Game objects (transform, mesh handle, color)
//! - A perspective camera

pub mod camera;
pub mod game_object;
pub mod registry;
pub mod transform;

pub use camera::Camera;
pub use game_object::GameObject;
pub use registry::{EntityId, EntityRegistry};
pub use transform::Transform;
