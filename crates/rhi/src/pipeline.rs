//! Pipelines and pipeline layouts.
//!
//! Graphics pipelines are described by a [`GraphicsPipelineConfig`], a plain
//! record of fixed-function state with sensible defaults. Viewport and
//! scissor are always dynamic so a pipeline survives swapchain recreation
//! as long as the render pass stays compatible.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use engine_rhi::device::Device;
//! use engine_rhi::shader::{Shader, ShaderStage};
//! use engine_rhi::pipeline::{GraphicsPipelineConfig, Pipeline, PipelineLayout, VertexInput};
//! use engine_rhi::vertex::ParticleVertex;
//!
//! # fn example(device: Arc<Device>, render_pass: vk::RenderPass, set_layout: vk::DescriptorSetLayout) -> Result<(), engine_rhi::RhiError> {
//! let vert = Shader::load(device.clone(), "shaders/spirv/particle_shader.vert.spv", ShaderStage::Vertex)?;
//! let frag = Shader::load(device.clone(), "shaders/spirv/particle_shader.frag.spv", ShaderStage::Fragment)?;
//! let layout = PipelineLayout::new(device.clone(), &[set_layout], &[])?;
//!
//! let pipeline = Pipeline::graphics(
//!     device,
//!     &layout,
//!     render_pass,
//!     [&vert, &frag],
//!     VertexInput {
//!         bindings: &[ParticleVertex::binding_description()],
//!         attributes: &ParticleVertex::attribute_descriptions(),
//!     },
//!     &GraphicsPipelineConfig::billboards(),
//! )?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::shader::{ENTRY_POINT, Shader, ShaderStage};

/// Specialization constant id compute shaders declare their local X size
/// with (`layout(local_size_x_id = 0) in;`).
pub const WORKGROUP_SIZE_CONSTANT_ID: u32 = 0;

pub struct PipelineLayout {
    device: Arc<Device>,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    pub fn new(
        device: Arc<Device>,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constants: &[vk::PushConstantRange],
    ) -> RhiResult<Self> {
        let create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(set_layouts)
            .push_constant_ranges(push_constants);
        let layout = unsafe { device.handle().create_pipeline_layout(&create_info, None)? };
        debug!(
            "Created pipeline layout ({} set layouts, {} push constant ranges)",
            set_layouts.len(),
            push_constants.len()
        );
        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_pipeline_layout(self.layout, None) };
    }
}

/// Blend state of the single color attachment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorBlend {
    #[default]
    Opaque,
    /// `src * a + dst * (1 - a)`
    Alpha,
    /// `src * a + dst`
    Additive,
}

impl ColorBlend {
    fn attachment_state(self) -> vk::PipelineColorBlendAttachmentState {
        let (enable, src, dst) = match self {
            Self::Opaque => (false, vk::BlendFactor::ONE, vk::BlendFactor::ZERO),
            Self::Alpha => (
                true,
                vk::BlendFactor::SRC_ALPHA,
                vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
            ),
            Self::Additive => (true, vk::BlendFactor::SRC_ALPHA, vk::BlendFactor::ONE),
        };
        vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(enable)
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .src_color_blend_factor(src)
            .dst_color_blend_factor(dst)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
            .alpha_blend_op(vk::BlendOp::ADD)
    }
}

/// Fixed-function state of a graphics pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GraphicsPipelineConfig {
    pub topology: vk::PrimitiveTopology,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_compare_op: vk::CompareOp,
    pub blend: ColorBlend,
    pub subpass: u32,
}

impl Default for GraphicsPipelineConfig {
    /// Triangle list, back-face culling, counter-clockwise front faces,
    /// depth test and write with `LESS`, opaque color, subpass 0.
    fn default() -> Self {
        Self {
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_test: true,
            depth_write: true,
            depth_compare_op: vk::CompareOp::LESS,
            blend: ColorBlend::Opaque,
            subpass: 0,
        }
    }
}

impl GraphicsPipelineConfig {
    /// Camera-facing quads: no culling, so winding after the billboard
    /// transform does not matter.
    pub fn billboards() -> Self {
        Self {
            cull_mode: vk::CullModeFlags::NONE,
            ..Self::default()
        }
    }
}

/// Vertex buffer bindings and attributes consumed by the vertex shader.
#[derive(Clone, Copy, Debug, Default)]
pub struct VertexInput<'a> {
    pub bindings: &'a [vk::VertexInputBindingDescription],
    pub attributes: &'a [vk::VertexInputAttributeDescription],
}

/// A graphics or compute pipeline.
pub struct Pipeline {
    device: Arc<Device>,
    pipeline: vk::Pipeline,
    bind_point: vk::PipelineBindPoint,
}

impl Pipeline {
    /// Creates a compute pipeline with its local X size specialized to
    /// `workgroup_size` through [`WORKGROUP_SIZE_CONSTANT_ID`].
    ///
    /// # Errors
    ///
    /// [`RhiError::PipelineError`] if `shader` is not a compute shader,
    /// [`RhiError::InvalidConfig`] if the device cannot run `workgroup_size`
    /// invocations per group, or the driver error.
    pub fn compute(
        device: Arc<Device>,
        shader: &Shader,
        layout: &PipelineLayout,
        workgroup_size: u32,
    ) -> RhiResult<Self> {
        expect_stage(shader, ShaderStage::Compute)?;
        check_workgroup_size(workgroup_size, &device.properties().limits)?;

        let map_entries = [vk::SpecializationMapEntry {
            constant_id: WORKGROUP_SIZE_CONSTANT_ID,
            offset: 0,
            size: std::mem::size_of::<u32>(),
        }];
        let data = workgroup_size.to_ne_bytes();
        let specialization = vk::SpecializationInfo::default()
            .map_entries(&map_entries)
            .data(&data);
        let stage = vk::PipelineShaderStageCreateInfo::default()
            .stage(shader.stage().flags())
            .module(shader.handle())
            .name(ENTRY_POINT)
            .specialization_info(&specialization);

        let create_info = vk::ComputePipelineCreateInfo::default()
            .stage(stage)
            .layout(layout.handle());
        let pipeline = unsafe {
            device
                .handle()
                .create_compute_pipelines(vk::PipelineCache::null(), &[create_info], None)
                .map_err(|(_, result)| result)?[0]
        };
        debug!("Created compute pipeline, workgroup size {}", workgroup_size);

        Ok(Self {
            device,
            pipeline,
            bind_point: vk::PipelineBindPoint::COMPUTE,
        })
    }

    /// Creates a graphics pipeline for `render_pass` from a vertex and a
    /// fragment shader.
    ///
    /// # Errors
    ///
    /// [`RhiError::PipelineError`] if the shaders are not `[vertex,
    /// fragment]` or the render pass is null, or the driver error.
    pub fn graphics(
        device: Arc<Device>,
        layout: &PipelineLayout,
        render_pass: vk::RenderPass,
        [vertex, fragment]: [&Shader; 2],
        input: VertexInput<'_>,
        config: &GraphicsPipelineConfig,
    ) -> RhiResult<Self> {
        expect_stage(vertex, ShaderStage::Vertex)?;
        expect_stage(fragment, ShaderStage::Fragment)?;
        if render_pass == vk::RenderPass::null() {
            return Err(RhiError::PipelineError(
                "graphics pipeline needs a render pass".to_string(),
            ));
        }

        let stages = [vertex.stage_create_info(), fragment.stage_create_info()];
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(input.bindings)
            .vertex_attribute_descriptions(input.attributes);
        let input_assembly =
            vk::PipelineInputAssemblyStateCreateInfo::default().topology(config.topology);
        let viewport = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);
        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(config.cull_mode)
            .front_face(config.front_face);
        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(config.depth_test)
            .depth_write_enable(config.depth_write)
            .depth_compare_op(config.depth_compare_op)
            .max_depth_bounds(1.0);
        let attachments = [config.blend.attachment_state()];
        let color_blend =
            vk::PipelineColorBlendStateCreateInfo::default().attachments(&attachments);
        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic)
            .layout(layout.handle())
            .render_pass(render_pass)
            .subpass(config.subpass);

        let pipeline = unsafe {
            device
                .handle()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
                .map_err(|(_, result)| result)?[0]
        };
        debug!("Created graphics pipeline ({:?})", config.topology);

        Ok(Self {
            device,
            pipeline,
            bind_point: vk::PipelineBindPoint::GRAPHICS,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    #[inline]
    pub fn bind_point(&self) -> vk::PipelineBindPoint {
        self.bind_point
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_pipeline(self.pipeline, None) };
        debug!("Destroyed {:?} pipeline", self.bind_point);
    }
}

fn expect_stage(shader: &Shader, expected: ShaderStage) -> RhiResult<()> {
    check_stage(shader.stage(), expected)
}

fn check_stage(actual: ShaderStage, expected: ShaderStage) -> RhiResult<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(RhiError::PipelineError(format!(
            "expected a {} shader, got a {} shader",
            expected, actual
        )))
    }
}

/// Checks a 1D workgroup size against the device compute limits.
fn check_workgroup_size(workgroup_size: u32, limits: &vk::PhysicalDeviceLimits) -> RhiResult<()> {
    let max = limits.max_compute_work_group_size[0].min(limits.max_compute_work_group_invocations);
    if workgroup_size == 0 || workgroup_size > max {
        return Err(RhiError::InvalidConfig(format!(
            "workgroup size {} outside the device range 1..={}",
            workgroup_size, max
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GraphicsPipelineConfig::default();
        assert_eq!(config.topology, vk::PrimitiveTopology::TRIANGLE_LIST);
        assert_eq!(config.cull_mode, vk::CullModeFlags::BACK);
        assert!(config.depth_test && config.depth_write);
        assert_eq!(config.depth_compare_op, vk::CompareOp::LESS);
        assert_eq!(config.blend, ColorBlend::Opaque);
    }

    #[test]
    fn test_billboards_disable_culling_only() {
        let config = GraphicsPipelineConfig::billboards();
        assert_eq!(config.cull_mode, vk::CullModeFlags::NONE);
        assert_eq!(
            GraphicsPipelineConfig {
                cull_mode: vk::CullModeFlags::BACK,
                ..config
            },
            GraphicsPipelineConfig::default()
        );
    }

    #[test]
    fn test_color_blend_states() {
        let opaque = ColorBlend::Opaque.attachment_state();
        assert_eq!(opaque.blend_enable, vk::FALSE);
        assert_eq!(opaque.color_write_mask, vk::ColorComponentFlags::RGBA);

        let additive = ColorBlend::Additive.attachment_state();
        assert_eq!(additive.blend_enable, vk::TRUE);
        assert_eq!(additive.dst_color_blend_factor, vk::BlendFactor::ONE);

        let alpha = ColorBlend::Alpha.attachment_state();
        assert_eq!(alpha.dst_color_blend_factor, vk::BlendFactor::ONE_MINUS_SRC_ALPHA);
    }

    fn compute_limits(size_x: u32, invocations: u32) -> vk::PhysicalDeviceLimits {
        vk::PhysicalDeviceLimits {
            max_compute_work_group_size: [size_x, 1024, 64],
            max_compute_work_group_invocations: invocations,
            ..Default::default()
        }
    }

    #[test]
    fn test_workgroup_size_within_device_limits() {
        let limits = compute_limits(1024, 1024);
        for size in [1, 64, 256, 512, 1024] {
            assert!(check_workgroup_size(size, &limits).is_ok(), "size {size}");
        }
        assert!(matches!(
            check_workgroup_size(1025, &limits),
            Err(RhiError::InvalidConfig(_))
        ));
        assert!(matches!(
            check_workgroup_size(0, &limits),
            Err(RhiError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_workgroup_size_bounded_by_invocations() {
        let limits = compute_limits(1024, 256);
        assert!(check_workgroup_size(256, &limits).is_ok());
        assert!(check_workgroup_size(512, &limits).is_err());
    }

    #[test]
    fn test_stage_mismatch_is_pipeline_error() {
        assert!(check_stage(ShaderStage::Compute, ShaderStage::Compute).is_ok());
        assert!(matches!(
            check_stage(ShaderStage::Fragment, ShaderStage::Vertex),
            Err(RhiError::PipelineError(_))
        ));
    }
}
