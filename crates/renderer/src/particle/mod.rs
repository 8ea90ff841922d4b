//! GPU particle simulation and rendering.
//!
//! Each frame slot owns a descriptor set exposing the per-frame uniforms,
//! the storage buffer written by the previous slot (read) and its own
//! storage buffer (write). The compute pass advances the particles into the
//! write buffer, and the graphics pass draws one billboard per particle from
//! that same buffer, either instanced or through indirect draw records.

mod indirect;
mod point_cloud;
mod system;

pub use indirect::{
    DrawCall, IndirectDrawCommand, QUAD_INDEX_COUNT, build_indirect_commands, record_draw_calls,
};
pub use point_cloud::generate_point_cloud;
pub use system::ParticleSystem;

use engine_rhi::sync::MAX_FRAMES_IN_FLIGHT;

/// Number of compute workgroups needed to cover `total_particles`.
///
/// `workgroup_size` is the local size the compute pipeline was specialized
/// with ([`Pipeline::compute`](engine_rhi::pipeline::Pipeline::compute)). Rounds up so the trailing partial workgroup is dispatched; the shader
/// bounds-checks its invocation index. Zero for an empty system.
pub fn dispatch_group_count(total_particles: u32, workgroup_size: u32) -> u32 {
    if workgroup_size == 0 {
        return 0;
    }
    total_particles.div_ceil(workgroup_size)
}

/// Storage buffer indices `(read, write)` used by frame slot `slot`.
///
/// A slot writes its own buffer and reads the one written by the previous
/// slot.
pub fn ping_pong_indices(slot: usize) -> (usize, usize) {
    let write = slot % MAX_FRAMES_IN_FLIGHT;
    let read = (MAX_FRAMES_IN_FLIGHT + write - 1) % MAX_FRAMES_IN_FLIGHT;
    (read, write)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_group_count_rounds_up() {
        assert_eq!(dispatch_group_count(8000, 256), 32);
        assert_eq!(dispatch_group_count(8192, 256), 32);
        assert_eq!(dispatch_group_count(8193, 256), 33);
        assert_eq!(dispatch_group_count(1, 256), 1);
        assert_eq!(dispatch_group_count(0, 256), 0);
        assert_eq!(dispatch_group_count(100, 0), 0);
    }

    #[test]
    fn test_dispatch_covers_every_particle() {
        for total in [1u32, 199, 200, 201, 7999, 8000, 8001] {
            for size in [1u32, 64, 200, 256, 512, 1024] {
                let groups = dispatch_group_count(total, size);
                assert!(groups * size >= total);
                assert!((groups - 1) * size < total);
            }
        }
    }

    #[test]
    fn test_dispatch_with_large_workgroups() {
        let total = engine_core::config::ParticleConfig::default().total_particles();
        assert_eq!(dispatch_group_count(total, 512), 16);
        assert!(16 * 512 >= total);
        assert_eq!(dispatch_group_count(total, 1024), 8);
    }

    #[test]
    fn test_ping_pong_read_write_disjoint() {
        for slot in 0..MAX_FRAMES_IN_FLIGHT {
            let (read, write) = ping_pong_indices(slot);
            assert_eq!(write, slot);
            assert_eq!(
                read,
                (MAX_FRAMES_IN_FLIGHT + slot - 1) % MAX_FRAMES_IN_FLIGHT
            );
            assert_ne!(read, write);
        }
    }

    #[test]
    fn test_ping_pong_reads_previous_write() {
        let (read_1, _) = ping_pong_indices(1);
        let (_, write_0) = ping_pong_indices(0);
        assert_eq!(read_1, write_0);

        let (read_0, _) = ping_pong_indices(0);
        let (_, write_last) = ping_pong_indices(MAX_FRAMES_IN_FLIGHT - 1);
        assert_eq!(read_0, write_last);
    }
}
