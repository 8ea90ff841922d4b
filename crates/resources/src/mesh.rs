//! Host-side mesh data.

use glam::Vec3;

use crate::error::{ResourceError, ResourceResult};

/// Vertex positions plus an optional index list, as handed to the GPU upload.
#[derive(Clone, Debug, PartialEq)]
pub struct MeshData {
    positions: Vec<Vec3>,
    indices: Option<Vec<u32>>,
}

impl MeshData {
    /// Creates a mesh, validating that it has vertices and that every index
    /// is in range.
    pub fn new(positions: Vec<Vec3>, indices: Option<Vec<u32>>) -> ResourceResult<Self> {
        if positions.is_empty() {
            return Err(ResourceError::EmptyMesh);
        }
        if let Some(indices) = &indices
            && let Some(&index) = indices.iter().find(|&&i| i as usize >= positions.len())
        {
            return Err(ResourceError::IndexOutOfRange {
                index,
                vertex_count: positions.len(),
            });
        }
        Ok(Self { positions, indices })
    }

    /// Billboard quad in the XY plane spanning `[-1, 1]`, two triangles.
    pub fn unit_quad() -> Self {
        Self {
            positions: vec![
                Vec3::new(-1.0, -1.0, 0.0),
                Vec3::new(-1.0, 1.0, 0.0),
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::new(1.0, -1.0, 0.0),
            ],
            indices: Some(vec![0, 2, 1, 2, 0, 3]),
        }
    }

    #[inline]
    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    /// Index list, empty for non-indexed meshes.
    #[inline]
    pub fn indices(&self) -> &[u32] {
        self.indices.as_deref().unwrap_or(&[])
    }

    #[inline]
    pub fn is_indexed(&self) -> bool {
        self.indices.is_some()
    }

    #[inline]
    pub fn vertex_count(&self) -> u32 {
        self.positions.len() as u32
    }

    #[inline]
    pub fn index_count(&self) -> u32 {
        self.indices().len() as u32
    }

    /// Triangles drawn, from the index list when present.
    pub fn triangle_count(&self) -> u32 {
        if self.is_indexed() {
            self.index_count() / 3
        } else {
            self.vertex_count() / 3
        }
    }
}
