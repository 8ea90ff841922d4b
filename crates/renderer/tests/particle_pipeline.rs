//! Cross-module checks of the particle pipeline's host-side planning.

use engine_core::DrawStrategy;
use engine_core::config::ParticleConfig;
use engine_renderer::particle::{
    DrawCall, QUAD_INDEX_COUNT, build_indirect_commands, dispatch_group_count,
    generate_point_cloud, ping_pong_indices, record_draw_calls,
};
use engine_resources::MeshData;
use engine_rhi::sync::MAX_FRAMES_IN_FLIGHT;

#[test]
fn indirect_records_cover_generated_cloud() {
    let config = ParticleConfig::default();
    let particles = generate_point_cloud(&config).unwrap();
    let records = build_indirect_commands(
        config.group_count,
        config.particles_per_group,
        QUAD_INDEX_COUNT,
    );

    let drawn: u32 = records.iter().map(|r| r.instance_count).sum();
    assert_eq!(drawn as usize, particles.len());

    let last = records.last().unwrap();
    assert_eq!(
        (last.first_instance + last.instance_count) as usize,
        particles.len()
    );
}

#[test]
fn quad_mesh_matches_indirect_index_count() {
    let quad = MeshData::unit_quad();
    assert_eq!(quad.index_count(), QUAD_INDEX_COUNT);
    assert_eq!(quad.vertex_count(), 4);
}

#[test]
fn every_strategy_draws_every_particle_once() {
    let config = ParticleConfig::default();
    let total = config.total_particles();

    for (strategy, multi_draw) in [
        (DrawStrategy::Instanced, false),
        (DrawStrategy::Indirect, true),
        (DrawStrategy::Indirect, false),
    ] {
        let calls = record_draw_calls(
            strategy,
            multi_draw,
            config.group_count,
            config.particles_per_group,
            QUAD_INDEX_COUNT,
        );
        let instances: u32 = calls
            .iter()
            .map(|call| match *call {
                DrawCall::Indexed { instance_count, .. } => instance_count,
                DrawCall::Indirect { draw_count, .. } => draw_count * config.particles_per_group,
            })
            .sum();
        assert_eq!(instances, total, "{:?} multi_draw={}", strategy, multi_draw);
    }
}

#[test]
fn dispatch_covers_default_cloud() {
    let config = ParticleConfig::default();
    let groups = dispatch_group_count(config.total_particles(), config.workgroup_size);
    assert!(groups * config.workgroup_size >= config.total_particles());
}

#[test]
fn ping_pong_chain_over_many_frames() {
    // Each frame reads what the previous frame wrote.
    let mut previous_write = ping_pong_indices(0).1;
    for frame in 1..10 {
        let (read, write) = ping_pong_indices(frame % MAX_FRAMES_IN_FLIGHT);
        assert_eq!(read, previous_write);
        previous_write = write;
    }
}
