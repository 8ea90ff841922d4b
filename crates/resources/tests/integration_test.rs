//! Integration tests for mesh registration.

use glam::Vec3;

use engine_resources::{AssetRegistry, MeshData, ResourceError};

#[test]
fn test_meshes_shared_by_key() {
    let mut meshes = AssetRegistry::new();

    let quad = meshes.load("builtin:quad", MeshData::unit_quad());
    let triangle = meshes.load(
        "builtin:triangle",
        MeshData::new(vec![Vec3::X, Vec3::Y, Vec3::Z], Some(vec![0, 1, 2])).unwrap(),
    );
    assert_ne!(quad, triangle);

    // A second object asking for the quad gets the same handle.
    assert_eq!(meshes.load("builtin:quad", MeshData::unit_quad()), quad);
    assert_eq!(meshes.len(), 2);

    let total_triangles: u32 = [quad, triangle]
        .iter()
        .map(|&h| meshes.get(h).unwrap().triangle_count())
        .sum();
    assert_eq!(total_triangles, 3);
}

#[test]
fn test_explicit_unload_only() {
    let mut meshes = AssetRegistry::new();
    let quad = meshes.load("builtin:quad", MeshData::unit_quad());
    let copy = quad;

    let unloaded = meshes.unload(quad).unwrap();
    assert_eq!(unloaded.vertex_count(), 4);
    assert!(matches!(
        meshes.get(copy),
        Err(ResourceError::AlreadyUnloaded { .. })
    ));

    // Reloading under the same key yields a fresh handle.
    let reloaded = meshes.load("builtin:quad", MeshData::unit_quad());
    assert_ne!(reloaded, quad);
    assert!(meshes.get(reloaded).is_ok());
}
