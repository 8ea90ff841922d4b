//! Asset data and ownership.
//!
//! This crate handles host-side assets:
//! - Mesh data (vertex positions and optional indices)
//! - A keyed registry that owns assets and hands out generational handles

mod error;
pub mod mesh;
pub mod registry;

pub use error::{ResourceError, ResourceResult};
pub use mesh::MeshData;
pub use registry::{AssetHandle, AssetRegistry};

/// Handle to a mesh owned by an `AssetRegistry<MeshData>`.
pub type MeshHandle = AssetHandle<MeshData>;
