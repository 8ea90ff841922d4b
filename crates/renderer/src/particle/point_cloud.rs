//! Deterministic point-cloud generation.

use std::f32::consts::PI;

use glam::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal, NormalError};

use engine_core::config::ParticleConfig;
use engine_rhi::vertex::ParticleInstance;

/// Generates `group_count * particles_per_group` particles.
///
/// Group centers are uniform in the cube `[-range, range)^3`. Around each
/// center, particles are placed along a uniformly distributed direction
/// (`cos(phi)` uniform in `[-1, 1)`, `theta` uniform in `[0, 2pi)`) at a
/// normally distributed radius. Particles of group `g` occupy indices
/// `g * particles_per_group ..`.
///
/// The output depends only on the config, so the same seed always yields
/// the same cloud.
///
/// # Errors
///
/// Returns an error if `std_dev` is not a valid standard deviation.
pub fn generate_point_cloud(config: &ParticleConfig) -> Result<Vec<ParticleInstance>, NormalError> {
    let radius = Normal::new(config.mean, config.std_dev)?;
    let mut rng = StdRng::seed_from_u64(config.seed);
    let half_width = config.range;

    let mut particles = Vec::with_capacity(config.total_particles() as usize);
    for _ in 0..config.group_count {
        let mut coordinate = || {
            if half_width > 0.0 {
                rng.gen_range(-half_width..half_width)
            } else {
                0.0
            }
        };
        let center = Vec3::new(coordinate(), coordinate(), coordinate());

        for _ in 0..config.particles_per_group {
            let cos_phi: f32 = rng.gen_range(-1.0..1.0);
            let sin_phi = (1.0 - cos_phi * cos_phi).sqrt();
            let theta: f32 = rng.gen_range(0.0..2.0 * PI);
            let r = radius.sample(&mut rng);

            let offset = Vec3::new(
                r * sin_phi * theta.cos(),
                r * sin_phi * theta.sin(),
                r * cos_phi,
            );
            particles.push(ParticleInstance::at(center + offset));
        }
    }

    Ok(particles)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_config() -> ParticleConfig {
        ParticleConfig {
            group_count: 8,
            particles_per_group: 1000,
            mean: 0.0,
            std_dev: 0.3,
            ..ParticleConfig::default()
        }
    }

    #[test]
    fn test_same_seed_is_bit_identical() {
        let config = default_config();
        let first = generate_point_cloud(&config).unwrap();
        let second = generate_point_cloud(&config).unwrap();

        assert_eq!(first.len(), 8000);
        let first_bytes: &[u8] = bytemuck::cast_slice(&first);
        let second_bytes: &[u8] = bytemuck::cast_slice(&second);
        assert_eq!(first_bytes, second_bytes);
    }

    #[test]
    fn test_different_seed_differs() {
        let config = default_config();
        let other = ParticleConfig {
            seed: config.seed + 1,
            ..config.clone()
        };
        let a = generate_point_cloud(&config).unwrap();
        let b = generate_point_cloud(&other).unwrap();
        assert_ne!(a[0].position, b[0].position);
    }

    #[test]
    fn test_particle_defaults() {
        let particles = generate_point_cloud(&default_config()).unwrap();
        for particle in &particles {
            assert_eq!(particle.position.w, 1.0);
            assert_eq!(particle.color, glam::Vec4::ONE);
            assert_eq!(particle.velocity, glam::Vec4::new(0.0, 0.0, 1.0, 0.0));
            assert!(particle.position.is_finite());
        }
    }

    #[test]
    fn test_zero_deviation_places_points_on_sphere() {
        let config = ParticleConfig {
            group_count: 1,
            particles_per_group: 200,
            mean: 0.5,
            std_dev: 0.0,
            range: 0.0,
            ..ParticleConfig::default()
        };
        let particles = generate_point_cloud(&config).unwrap();
        for particle in &particles {
            let distance = particle.position.truncate().length();
            assert!((distance - 0.5).abs() < 1e-4, "distance {}", distance);
        }
    }

    #[test]
    fn test_groups_cluster_around_centers() {
        let config = ParticleConfig {
            group_count: 4,
            particles_per_group: 500,
            std_dev: 0.01,
            ..ParticleConfig::default()
        };
        let particles = generate_point_cloud(&config).unwrap();

        for group in particles.chunks(500) {
            let centroid = group
                .iter()
                .map(|p| p.position.truncate())
                .sum::<Vec3>()
                / group.len() as f32;
            assert!(centroid.abs().max_element() < config.range + 0.1);
            for particle in group {
                assert!(particle.position.truncate().distance(centroid) < 0.1);
            }
        }
    }

    #[test]
    fn test_invalid_deviation_rejected() {
        let config = ParticleConfig {
            std_dev: -1.0,
            ..ParticleConfig::default()
        };
        assert!(generate_point_cloud(&config).is_err());
    }
}
