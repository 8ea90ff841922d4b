//! Game objects: an id plus the components the renderer reads.

use glam::Vec3;

use engine_resources::MeshHandle;

use crate::registry::{EntityId, EntityRegistry};
use crate::transform::Transform;

/// A renderable object in the scene.
#[derive(Clone, Debug)]
pub struct GameObject {
    id: EntityId,
    pub transform: Transform,
    pub mesh: Option<MeshHandle>,
    pub color: Vec3,
}

impl GameObject {
    /// Create an object with an id from `registry`, an identity transform,
    /// no mesh and a white color.
    pub fn new(registry: &mut EntityRegistry) -> Self {
        Self {
            id: registry.create(),
            transform: Transform::default(),
            mesh: None,
            color: Vec3::ONE,
        }
    }

    pub fn with_mesh(mut self, mesh: MeshHandle) -> Self {
        self.mesh = Some(mesh);
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_color(mut self, color: Vec3) -> Self {
        self.color = color;
        self
    }

    #[inline]
    pub fn id(&self) -> EntityId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_resources::{AssetRegistry, MeshData};

    #[test]
    fn test_objects_get_distinct_ids() {
        let mut registry = EntityRegistry::new();
        let a = GameObject::new(&mut registry);
        let b = GameObject::new(&mut registry);
        assert_ne!(a.id(), b.id());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_objects_share_mesh_handle() {
        let mut entities = EntityRegistry::new();
        let mut meshes = AssetRegistry::new();
        let quad = meshes.load("builtin:quad", MeshData::unit_quad());

        let a = GameObject::new(&mut entities).with_mesh(quad);
        let b = GameObject::new(&mut entities)
            .with_mesh(quad)
            .with_color(Vec3::new(1.0, 0.0, 0.0));

        assert_eq!(a.mesh, b.mesh);
        assert_eq!(meshes.len(), 1);
        assert_eq!(a.color, Vec3::ONE);
        assert_eq!(b.color, Vec3::new(1.0, 0.0, 0.0));
    }
}
