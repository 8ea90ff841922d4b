//! Engine configuration loaded from TOML.
//!
//! Every field has a default, so a config file only needs to name what it
//! changes:
//!
//! ```toml
//! [particles]
//! group_count = 16
//! draw_strategy = "instanced"
//!
//! [vulkan]
//! device_selection = "first-suitable"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};

/// How the physical device is chosen at startup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceSelection {
    /// Score every suitable device and take the best one.
    #[default]
    Rated,
    /// Take the first device that passes the suitability checks.
    FirstSuitable,
}

/// How the particle billboards are drawn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DrawStrategy {
    /// One indexed draw with `instanceCount = total particles`.
    Instanced,
    /// Draw arguments read from a per-frame indirect buffer, one record per group.
    #[default]
    Indirect,
}

/// Window settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            title: "Particle Engine".to_string(),
        }
    }
}

/// Instance and device settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VulkanConfig {
    pub enable_validation: bool,
    pub device_selection: DeviceSelection,
}

impl Default for VulkanConfig {
    fn default() -> Self {
        Self {
            enable_validation: cfg!(debug_assertions),
            device_selection: DeviceSelection::default(),
        }
    }
}

/// Point-cloud generation and simulation settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleConfig {
    /// Number of independent point-cloud groups.
    pub group_count: u32,
    /// Particles generated around each group center.
    pub particles_per_group: u32,
    /// Mean of the normally distributed radius.
    pub mean: f32,
    /// Standard deviation of the radius.
    pub std_dev: f32,
    /// Half-width of the cube that group centers are placed in.
    pub range: f32,
    /// Seed of the point-cloud generator.
    pub seed: u64,
    pub draw_strategy: DrawStrategy,
    /// Local workgroup size the compute shader was built with.
    pub workgroup_size: u32,
}

/// Bytes of one particle record in the storage buffers.
pub const PARTICLE_RECORD_SIZE: u64 = 48;

/// Largest particle storage buffer the engine will create. Storage
/// descriptor ranges are 32-bit.
pub const MAX_PARTICLE_BUFFER_BYTES: u64 = u32::MAX as u64;

impl ParticleConfig {
    /// Particle count of `group_count` groups of `per_group`, or `None` if
    /// the count overflows or its records exceed [`MAX_PARTICLE_BUFFER_BYTES`].
    pub fn checked_total(group_count: u32, per_group: u32) -> Option<u32> {
        let total = group_count.checked_mul(per_group)?;
        let bytes = u64::from(total).checked_mul(PARTICLE_RECORD_SIZE)?;
        (bytes <= MAX_PARTICLE_BUFFER_BYTES).then_some(total)
    }

    /// Total number of simulated particles.
    ///
    /// Exact for validated configs; saturates otherwise.
    #[inline]
    pub fn total_particles(&self) -> u32 {
        self.group_count.saturating_mul(self.particles_per_group)
    }
}

impl Default for ParticleConfig {
    fn default() -> Self {
        Self {
            group_count: 8,
            particles_per_group: 1000,
            mean: 0.0,
            std_dev: 0.3,
            range: 1.5,
            seed: 54321,
            draw_strategy: DrawStrategy::default(),
            workgroup_size: 256,
        }
    }
}

/// Compiled SPIR-V locations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    pub compute: PathBuf,
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            compute: PathBuf::from("shaders/spirv/particle_compute.comp.spv"),
            vertex: PathBuf::from("shaders/spirv/particle_shader.vert.spv"),
            fragment: PathBuf::from("shaders/spirv/particle_shader.frag.spv"),
        }
    }
}

/// Top-level engine configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub window: WindowConfig,
    pub vulkan: VulkanConfig,
    pub particles: ParticleConfig,
    pub shaders: ShaderConfig,
    /// Fallback tracing filter when `RUST_LOG` is not set.
    pub log_filter: Option<String>,
}

impl EngineConfig {
    /// Parses a configuration from TOML text and validates it.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read and
    /// [`Error::ConfigParse`] if it is not valid TOML for this schema.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&contents)
    }

    /// Loads a configuration file if it exists. Does not log, so it can run
    /// before logging is initialized.
    pub fn try_load(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }
        Self::load(path).map(Some)
    }

    /// Loads a configuration file, falling back to defaults when it does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match Self::try_load(path)? {
            Some(config) => {
                info!("Loaded config from {}", path.display());
                Ok(config)
            }
            None => {
                info!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
        }
    }

    /// Serializes the configuration as pretty TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    fn validate(&self) -> Result<()> {
        let p = &self.particles;
        if p.group_count == 0 || p.particles_per_group == 0 {
            return Err(Error::Config(
                "particle group_count and particles_per_group must be non-zero".to_string(),
            ));
        }
        if ParticleConfig::checked_total(p.group_count, p.particles_per_group).is_none() {
            return Err(Error::Config(format!(
                "{} groups of {} particles exceed the {} byte particle buffer limit",
                p.group_count, p.particles_per_group, MAX_PARTICLE_BUFFER_BYTES
            )));
        }
        if p.workgroup_size == 0 {
            return Err(Error::Config("workgroup_size must be non-zero".to_string()));
        }
        if !p.mean.is_finite() {
            return Err(Error::Config(format!(
                "mean must be a finite number, got {}",
                p.mean
            )));
        }
        if !p.std_dev.is_finite() || p.std_dev < 0.0 {
            return Err(Error::Config(format!(
                "std_dev must be a finite non-negative number, got {}",
                p.std_dev
            )));
        }
        if !p.range.is_finite() || p.range < 0.0 {
            return Err(Error::Config(format!(
                "range must be a finite non-negative number, got {}",
                p.range
            )));
        }
        if self.window.width == 0 || self.window.height == 0 {
            return Err(Error::Config("window size must be non-zero".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.particles.seed, 54321);
        assert_eq!(config.particles.total_particles(), 8000);
    }

    #[test]
    fn test_partial_override() {
        let config = EngineConfig::from_toml_str(
            r#"
            log_filter = "debug"

            [particles]
            group_count = 3
            draw_strategy = "instanced"

            [vulkan]
            device_selection = "first-suitable"
            "#,
        )
        .unwrap();

        assert_eq!(config.particles.group_count, 3);
        assert_eq!(config.particles.particles_per_group, 1000);
        assert_eq!(config.particles.draw_strategy, DrawStrategy::Instanced);
        assert_eq!(config.vulkan.device_selection, DeviceSelection::FirstSuitable);
        assert_eq!(config.log_filter.as_deref(), Some("debug"));
        assert_eq!(config.window, WindowConfig::default());
    }

    #[test]
    fn test_unknown_strategy_is_parse_error() {
        let err = EngineConfig::from_toml_str("[particles]\ndraw_strategy = \"meshlet\"").unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));
    }

    #[test]
    fn test_negative_range_rejected() {
        let err = EngineConfig::from_toml_str("[particles]\nrange = -1.0").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_zero_groups_rejected() {
        let err = EngineConfig::from_toml_str("[particles]\ngroup_count = 0").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_particle_count_overflow_rejected() {
        let err = EngineConfig::from_toml_str(
            "[particles]\ngroup_count = 70000\nparticles_per_group = 70000",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(ParticleConfig::checked_total(70_000, 70_000), None);
    }

    #[test]
    fn test_particle_buffer_size_limit() {
        // 100M records fit a u32 count but not a 32-bit storage range.
        assert_eq!(ParticleConfig::checked_total(100_000, 1000), None);
        let err = EngineConfig::from_toml_str(
            "[particles]\ngroup_count = 100000\nparticles_per_group = 1000",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let largest = (MAX_PARTICLE_BUFFER_BYTES / PARTICLE_RECORD_SIZE) as u32;
        assert_eq!(ParticleConfig::checked_total(1, largest), Some(largest));
        assert_eq!(ParticleConfig::checked_total(1, largest + 1), None);
        assert_eq!(ParticleConfig::checked_total(8, 1000), Some(8000));
    }

    #[test]
    fn test_unvalidated_total_saturates() {
        let config = ParticleConfig {
            group_count: 70_000,
            particles_per_group: 70_000,
            ..ParticleConfig::default()
        };
        assert_eq!(config.total_particles(), u32::MAX);
    }

    #[test]
    fn test_non_finite_distribution_rejected() {
        for text in [
            "[particles]\nstd_dev = inf",
            "[particles]\nstd_dev = nan",
            "[particles]\nstd_dev = -0.5",
            "[particles]\nmean = inf",
            "[particles]\nmean = -inf",
            "[particles]\nmean = nan",
        ] {
            let err = EngineConfig::from_toml_str(text).unwrap_err();
            assert!(matches!(err, Error::Config(_)), "{text} was accepted");
        }
        assert!(EngineConfig::from_toml_str("[particles]\nmean = 2.5\nstd_dev = 0.0").is_ok());
    }

    #[test]
    fn test_round_trip_through_toml() {
        let mut config = EngineConfig::default();
        config.particles.workgroup_size = 64;
        config.shaders.compute = PathBuf::from("custom.comp.spv");

        let text = config.to_toml_string().unwrap();
        let parsed = EngineConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_missing_file_falls_back() {
        let config = EngineConfig::load_or_default("definitely/not/here.toml").unwrap();
        assert_eq!(config.window.width, 1280);
    }

    #[test]
    fn test_try_load_reports_missing_file() {
        assert!(EngineConfig::try_load("definitely/not/here.toml").unwrap().is_none());

        let path = std::env::temp_dir().join(format!("engine-config-{}.toml", std::process::id()));
        std::fs::write(&path, "[particles]\ngroup_count = 2\n").unwrap();
        let loaded = EngineConfig::try_load(&path);
        std::fs::remove_file(&path).unwrap();

        let config = loaded.unwrap().expect("config file exists");
        assert_eq!(config.particles.group_count, 2);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = EngineConfig::load("definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
