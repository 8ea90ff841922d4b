//! Error types for asset management.

use thiserror::Error;

/// Error type for asset registry and mesh operations.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ResourceError {
    /// The handle does not refer to any slot of this registry.
    #[error("Unknown asset handle (index {index})")]
    UnknownHandle { index: u32 },

    /// The asset behind the handle was unloaded.
    #[error("Asset {index} (generation {generation}) was already unloaded")]
    AlreadyUnloaded { index: u32, generation: u32 },

    /// A mesh needs at least one vertex.
    #[error("Mesh has no vertices")]
    EmptyMesh,

    /// An index points past the end of the vertex list.
    #[error("Mesh index {index} is out of range for {vertex_count} vertices")]
    IndexOutOfRange { index: u32, vertex_count: usize },
}

/// Result type alias for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;
