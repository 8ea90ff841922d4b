//! SPIR-V shader modules.
//!
//! Shaders are compiled ahead of time; the engine only validates the binary
//! header and hands the words to the driver. Every module uses `main` as its
//! entry point.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use engine_rhi::device::Device;
//! use engine_rhi::shader::{Shader, ShaderStage};
//!
//! # fn example(device: Arc<Device>) -> Result<(), engine_rhi::RhiError> {
//! let compute = Shader::load(
//!     device,
//!     "shaders/spirv/particle_compute.comp.spv",
//!     ShaderStage::Compute,
//! )?;
//! assert_eq!(compute.stage(), ShaderStage::Compute);
//! # Ok(())
//! # }
//! ```

use std::ffi::CStr;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// First word of every SPIR-V module.
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Entry point of every engine shader.
pub const ENTRY_POINT: &CStr = c"main";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

impl ShaderStage {
    pub fn flags(self) -> vk::ShaderStageFlags {
        match self {
            Self::Vertex => vk::ShaderStageFlags::VERTEX,
            Self::Fragment => vk::ShaderStageFlags::FRAGMENT,
            Self::Compute => vk::ShaderStageFlags::COMPUTE,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Vertex => "vertex",
            Self::Fragment => "fragment",
            Self::Compute => "compute",
        })
    }
}

/// Decodes a little-endian SPIR-V binary into code words.
///
/// # Errors
///
/// [`RhiError::ShaderError`] if the length is not a multiple of 4, the
/// binary is empty, or the first word is not [`SPIRV_MAGIC`].
pub fn spirv_words(bytes: &[u8]) -> RhiResult<Vec<u32>> {
    let words = bytes.chunks_exact(4);
    if !words.remainder().is_empty() {
        return Err(RhiError::ShaderError(format!(
            "SPIR-V length {} is not a multiple of 4",
            bytes.len()
        )));
    }

    let code: Vec<u32> = words
        .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
        .collect();
    match code.first() {
        None => Err(RhiError::ShaderError("SPIR-V binary is empty".to_string())),
        Some(&SPIRV_MAGIC) => Ok(code),
        Some(magic) => Err(RhiError::ShaderError(format!(
            "not a SPIR-V binary (magic {:#010x})",
            magic
        ))),
    }
}

/// A shader module tagged with its pipeline stage.
pub struct Shader {
    device: Arc<Device>,
    module: vk::ShaderModule,
    stage: ShaderStage,
}

impl Shader {
    /// Reads and creates a shader module from a `.spv` file.
    ///
    /// # Errors
    ///
    /// [`RhiError::ShaderError`] naming the path if it cannot be read or is
    /// not SPIR-V, or the driver error from module creation.
    pub fn load(
        device: Arc<Device>,
        path: impl AsRef<Path>,
        stage: ShaderStage,
    ) -> RhiResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            RhiError::ShaderError(format!(
                "cannot read {} shader {}: {}",
                stage,
                path.display(),
                e
            ))
        })?;
        let shader = Self::from_spirv(device, &bytes, stage).map_err(|e| match e {
            RhiError::ShaderError(msg) => {
                RhiError::ShaderError(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })?;
        debug!("Loaded {} shader {}", stage, path.display());
        Ok(shader)
    }

    /// Creates a shader module from an in-memory SPIR-V binary.
    pub fn from_spirv(device: Arc<Device>, bytes: &[u8], stage: ShaderStage) -> RhiResult<Self> {
        let code = spirv_words(bytes)?;
        let create_info = vk::ShaderModuleCreateInfo::default().code(&code);
        let module = unsafe { device.handle().create_shader_module(&create_info, None)? };

        Ok(Self {
            device,
            module,
            stage,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    #[inline]
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn stage_create_info(&self) -> vk::PipelineShaderStageCreateInfo<'static> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage.flags())
            .module(self.module)
            .name(ENTRY_POINT)
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_shader_module(self.module, None) };
        debug!("Destroyed {} shader module", self.stage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn test_stage_flags() {
        assert_eq!(ShaderStage::Vertex.flags(), vk::ShaderStageFlags::VERTEX);
        assert_eq!(ShaderStage::Fragment.flags(), vk::ShaderStageFlags::FRAGMENT);
        assert_eq!(ShaderStage::Compute.flags(), vk::ShaderStageFlags::COMPUTE);
        assert_eq!(ShaderStage::Compute.to_string(), "compute");
    }

    #[test]
    fn test_spirv_words_decodes_little_endian() {
        let bytes = encode(&[SPIRV_MAGIC, 0x0001_0300, 42]);
        assert_eq!(spirv_words(&bytes).unwrap(), vec![SPIRV_MAGIC, 0x0001_0300, 42]);
    }

    #[test]
    fn test_spirv_words_rejects_truncated_word() {
        let mut bytes = encode(&[SPIRV_MAGIC]);
        bytes.push(0);
        assert!(matches!(spirv_words(&bytes), Err(RhiError::ShaderError(_))));
    }

    #[test]
    fn test_spirv_words_rejects_foreign_binary() {
        let bytes = encode(&[0xdead_beef, 0]);
        assert!(matches!(spirv_words(&bytes), Err(RhiError::ShaderError(_))));
        // Big-endian SPIR-V is not accepted either.
        let bytes = encode(&[SPIRV_MAGIC.swap_bytes()]);
        assert!(spirv_words(&bytes).is_err());
    }

    #[test]
    fn test_spirv_words_rejects_empty() {
        assert!(spirv_words(&[]).is_err());
    }
}
