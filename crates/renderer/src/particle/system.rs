//! Particle system: GPU resources, pipelines and per-frame recording.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use engine_core::config::{ParticleConfig, ShaderConfig};
use engine_resources::MeshData;
use engine_rhi::buffer::{Buffer, BufferUsage};
use engine_rhi::command::CommandBuffer;
use engine_rhi::descriptor::{
    DescriptorPool, DescriptorPoolBuilder, DescriptorSetLayout, DescriptorSetLayoutBuilder,
    DescriptorWriter,
};
use engine_rhi::device::Device;
use engine_rhi::pipeline::{GraphicsPipelineConfig, Pipeline, PipelineLayout, VertexInput};
use engine_rhi::shader::{Shader, ShaderStage};
use engine_rhi::sync::MAX_FRAMES_IN_FLIGHT;
use engine_rhi::vertex::{ParticleInstance, ParticleVertex};
use engine_rhi::{RhiError, RhiResult};

use super::indirect::{DrawCall, build_indirect_commands, record_draw_calls};
use super::point_cloud::generate_point_cloud;
use super::{dispatch_group_count, ping_pong_indices};
use crate::frame_info::FrameInfo;
use crate::ubo::ParticleUbo;

const UBO_BINDING: u32 = 0;
const READ_BINDING: u32 = 1;
const WRITE_BINDING: u32 = 2;

/// Compute-driven point cloud rendered as instanced billboards.
///
/// Field order is drop order: pipelines, then descriptors, then buffers.
pub struct ParticleSystem {
    graphics_pipeline: Pipeline,
    graphics_layout: PipelineLayout,
    compute_pipeline: Pipeline,
    compute_layout: PipelineLayout,

    descriptor_sets: Vec<vk::DescriptorSet>,
    descriptor_pool: DescriptorPool,
    descriptor_set_layout: DescriptorSetLayout,

    uniform_buffers: Vec<Buffer>,
    indirect_buffers: Vec<Buffer>,
    storage_buffers: Vec<Buffer>,
    quad_vertex_buffer: Buffer,
    quad_index_buffer: Buffer,
    quad_index_count: u32,

    config: ParticleConfig,
    draw_calls: Vec<DrawCall>,
    device: Arc<Device>,
}

impl ParticleSystem {
    /// Generates the point cloud, uploads every buffer and builds the
    /// descriptor sets and pipelines.
    ///
    /// The compute shader declares its local size through specialization
    /// constant 0, which is set to `config.workgroup_size`.
    ///
    /// # Errors
    ///
    /// Any resource or pipeline creation failure. Running out of descriptor
    /// sets is reported as [`RhiError::PoolExhausted`].
    pub fn new(
        device: Arc<Device>,
        render_pass: vk::RenderPass,
        config: &ParticleConfig,
        shaders: &ShaderConfig,
    ) -> RhiResult<Self> {
        let total =
            ParticleConfig::checked_total(config.group_count, config.particles_per_group)
                .ok_or_else(|| {
                    RhiError::InvalidConfig(format!(
                        "{} groups of {} particles overflow the particle buffers",
                        config.group_count, config.particles_per_group
                    ))
                })?;
        check_storage_range(&device, total)?;

        let particles = generate_point_cloud(config).map_err(|e| {
            RhiError::InvalidConfig(format!("particle radius distribution: {}", e))
        })?;
        info!(
            "Generated {} particles in {} groups",
            particles.len(),
            config.group_count
        );

        let quad = MeshData::unit_quad();
        let quad_vertices: Vec<ParticleVertex> =
            quad.positions().iter().copied().map(ParticleVertex::new).collect();
        let quad_vertex_buffer =
            Buffer::new_device_local(device.clone(), BufferUsage::Vertex, &quad_vertices)?;
        let quad_index_buffer =
            Buffer::new_device_local(device.clone(), BufferUsage::Index, quad.indices())?;
        let quad_index_count = quad.index_count();

        let storage_buffers = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|_| Buffer::new_device_local(device.clone(), BufferUsage::Storage, &particles))
            .collect::<RhiResult<Vec<_>>>()?;

        let indirect_buffers = Self::create_indirect_buffers(
            &device,
            config.group_count,
            config.particles_per_group,
            quad_index_count,
        )?;

        let min_alignment = device.properties().limits.min_uniform_buffer_offset_alignment;
        let uniform_buffers = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|_| {
                Buffer::new(
                    device.clone(),
                    BufferUsage::Uniform,
                    ParticleUbo::SIZE as vk::DeviceSize,
                    1,
                    min_alignment,
                )
            })
            .collect::<RhiResult<Vec<_>>>()?;

        let descriptor_set_layout = DescriptorSetLayoutBuilder::new()
            .add_binding(
                UBO_BINDING,
                vk::DescriptorType::UNIFORM_BUFFER,
                vk::ShaderStageFlags::COMPUTE | vk::ShaderStageFlags::VERTEX,
                1,
            )?
            .add_binding(
                READ_BINDING,
                vk::DescriptorType::STORAGE_BUFFER,
                vk::ShaderStageFlags::COMPUTE,
                1,
            )?
            .add_binding(
                WRITE_BINDING,
                vk::DescriptorType::STORAGE_BUFFER,
                vk::ShaderStageFlags::COMPUTE | vk::ShaderStageFlags::VERTEX,
                1,
            )?
            .build(device.clone())?;

        let descriptor_pool = DescriptorPoolBuilder::new()
            .set_max_sets(MAX_FRAMES_IN_FLIGHT as u32)
            .add_pool_size(
                vk::DescriptorType::UNIFORM_BUFFER,
                MAX_FRAMES_IN_FLIGHT as u32,
            )
            .add_pool_size(
                vk::DescriptorType::STORAGE_BUFFER,
                2 * MAX_FRAMES_IN_FLIGHT as u32,
            )
            .build(device.clone())?;

        let mut descriptor_sets = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        for slot in 0..MAX_FRAMES_IN_FLIGHT {
            let (read, write) = ping_pong_indices(slot);
            let set = DescriptorWriter::new(&descriptor_set_layout, &descriptor_pool)
                .write_buffer(UBO_BINDING, uniform_buffers[slot].whole_descriptor_info())?
                .write_buffer(READ_BINDING, storage_buffers[read].whole_descriptor_info())?
                .write_buffer(WRITE_BINDING, storage_buffers[write].whole_descriptor_info())?
                .build()?
                .ok_or(RhiError::PoolExhausted)?;
            debug!(
                "Particle descriptor set {}: read buffer {}, write buffer {}",
                slot, read, write
            );
            descriptor_sets.push(set);
        }

        let (compute_pipeline, compute_layout) =
            Self::create_compute_pipeline(&device, &descriptor_set_layout, shaders, config)?;
        let (graphics_pipeline, graphics_layout) = Self::create_graphics_pipeline(
            &device,
            &descriptor_set_layout,
            render_pass,
            shaders,
        )?;

        let draw_calls = record_draw_calls(
            config.draw_strategy,
            device.supports_multi_draw_indirect(),
            config.group_count,
            config.particles_per_group,
            quad_index_count,
        );
        info!(
            "Particle system ready: {:?} drawing with {} draw call(s)",
            config.draw_strategy,
            draw_calls.len()
        );

        Ok(Self {
            graphics_pipeline,
            graphics_layout,
            compute_pipeline,
            compute_layout,
            descriptor_sets,
            descriptor_pool,
            descriptor_set_layout,
            uniform_buffers,
            indirect_buffers,
            storage_buffers,
            quad_vertex_buffer,
            quad_index_buffer,
            quad_index_count,
            config: config.clone(),
            draw_calls,
            device,
        })
    }

    fn create_indirect_buffers(
        device: &Arc<Device>,
        group_count: u32,
        per_group: u32,
        index_count: u32,
    ) -> RhiResult<Vec<Buffer>> {
        let commands = build_indirect_commands(group_count, per_group, index_count);
        (0..MAX_FRAMES_IN_FLIGHT)
            .map(|_| Buffer::new_device_local(device.clone(), BufferUsage::Indirect, &commands))
            .collect()
    }

    fn create_compute_pipeline(
        device: &Arc<Device>,
        set_layout: &DescriptorSetLayout,
        shaders: &ShaderConfig,
        config: &ParticleConfig,
    ) -> RhiResult<(Pipeline, PipelineLayout)> {
        let compute_shader = Shader::load(device.clone(), &shaders.compute, ShaderStage::Compute)?;
        let layout = PipelineLayout::new(device.clone(), &[set_layout.handle()], &[])?;
        let pipeline =
            Pipeline::compute(device.clone(), &compute_shader, &layout, config.workgroup_size)?;
        Ok((pipeline, layout))
    }

    fn create_graphics_pipeline(
        device: &Arc<Device>,
        set_layout: &DescriptorSetLayout,
        render_pass: vk::RenderPass,
        shaders: &ShaderConfig,
    ) -> RhiResult<(Pipeline, PipelineLayout)> {
        let vertex_shader = Shader::load(device.clone(), &shaders.vertex, ShaderStage::Vertex)?;
        let fragment_shader =
            Shader::load(device.clone(), &shaders.fragment, ShaderStage::Fragment)?;

        let layout = PipelineLayout::new(device.clone(), &[set_layout.handle()], &[])?;
        let pipeline = Pipeline::graphics(
            device.clone(),
            &layout,
            render_pass,
            [&vertex_shader, &fragment_shader],
            VertexInput {
                bindings: &[ParticleVertex::binding_description()],
                attributes: &ParticleVertex::attribute_descriptions(),
            },
            &GraphicsPipelineConfig::billboards(),
        )?;
        Ok((pipeline, layout))
    }

    /// Writes this frame's uniforms.
    pub fn update(&self, frame_info: &FrameInfo) -> RhiResult<()> {
        let ubo = ParticleUbo::new(frame_info.view_projection, frame_info.frame_time);
        self.uniform_buffers[frame_info.frame_index].write_to_index(&ubo, 0)
    }

    /// Records the simulation step for this frame slot.
    ///
    /// Must be recorded outside a render pass. Ends with a barrier that
    /// makes the written particles visible to the vertex shader.
    pub fn dispatch(&self, frame_info: &FrameInfo) {
        let cmd = CommandBuffer::from_handle(self.device.clone(), frame_info.command_buffer);
        let (read, write) = ping_pong_indices(frame_info.frame_index);

        // The read buffer was written by the previous slot's submission.
        cmd.shader_write_barrier(
            self.storage_buffers[read].handle(),
            vk::PipelineStageFlags::COMPUTE_SHADER,
            vk::PipelineStageFlags::COMPUTE_SHADER,
        );

        cmd.bind_pipeline(vk::PipelineBindPoint::COMPUTE, self.compute_pipeline.handle());
        cmd.bind_descriptor_set(
            vk::PipelineBindPoint::COMPUTE,
            self.compute_layout.handle(),
            frame_info.descriptor_set,
        );
        cmd.dispatch(
            dispatch_group_count(self.config.total_particles(), self.config.workgroup_size),
            1,
            1,
        );

        cmd.shader_write_barrier(
            self.storage_buffers[write].handle(),
            vk::PipelineStageFlags::COMPUTE_SHADER,
            vk::PipelineStageFlags::VERTEX_SHADER,
        );
    }

    /// Records the billboard draw inside the swapchain render pass.
    pub fn render_point_cloud(&self, frame_info: &FrameInfo) {
        let cmd = CommandBuffer::from_handle(self.device.clone(), frame_info.command_buffer);

        cmd.bind_pipeline(vk::PipelineBindPoint::GRAPHICS, self.graphics_pipeline.handle());
        cmd.bind_descriptor_set(
            vk::PipelineBindPoint::GRAPHICS,
            self.graphics_layout.handle(),
            frame_info.descriptor_set,
        );
        cmd.bind_indexed_geometry(
            self.quad_vertex_buffer.handle(),
            self.quad_index_buffer.handle(),
        );

        let indirect_buffer = self.indirect_buffers[frame_info.frame_index].handle();
        for call in &self.draw_calls {
            match *call {
                DrawCall::Indexed {
                    index_count,
                    instance_count,
                    first_instance,
                } => cmd.draw_indexed(index_count, instance_count, first_instance),
                DrawCall::Indirect {
                    offset,
                    draw_count,
                    stride,
                } => cmd.draw_indexed_indirect(indirect_buffer, offset, draw_count, stride),
            }
        }
    }

    /// Regenerates the indirect draw records for new group counts.
    ///
    /// Waits for the device to go idle. The new total must fit in the
    /// storage buffers created at startup.
    ///
    /// # Errors
    ///
    /// [`RhiError::BufferOverflow`] if the new total exceeds the storage
    /// capacity, or any buffer creation failure.
    pub fn rebuild_indirect_commands(
        &mut self,
        group_count: u32,
        per_group: u32,
    ) -> RhiResult<()> {
        let total = ParticleConfig::checked_total(group_count, per_group).ok_or_else(|| {
            RhiError::InvalidConfig(format!(
                "{} groups of {} particles overflow the particle buffers",
                group_count, per_group
            ))
        })?;
        let needed = particle_bytes(total);
        let capacity = self.storage_buffers[0].size();
        if needed > capacity {
            return Err(RhiError::BufferOverflow {
                offset: 0,
                len: needed,
                size: capacity,
            });
        }

        self.device.wait_idle()?;
        self.indirect_buffers = Self::create_indirect_buffers(
            &self.device,
            group_count,
            per_group,
            self.quad_index_count,
        )?;

        self.config.group_count = group_count;
        self.config.particles_per_group = per_group;
        self.draw_calls = record_draw_calls(
            self.config.draw_strategy,
            self.device.supports_multi_draw_indirect(),
            group_count,
            per_group,
            self.quad_index_count,
        );

        info!(
            "Rebuilt indirect draw records: {} groups x {} particles",
            group_count, per_group
        );
        Ok(())
    }

    /// Descriptor set of frame slot `frame_index`.
    #[inline]
    pub fn descriptor_set(&self, frame_index: usize) -> vk::DescriptorSet {
        self.descriptor_sets[frame_index]
    }

    #[inline]
    pub fn total_particles(&self) -> u32 {
        self.config.total_particles()
    }

    #[inline]
    pub fn descriptor_pool(&self) -> &DescriptorPool {
        &self.descriptor_pool
    }

    #[inline]
    pub fn descriptor_set_layout(&self) -> &DescriptorSetLayout {
        &self.descriptor_set_layout
    }
}

fn particle_bytes(total: u32) -> vk::DeviceSize {
    vk::DeviceSize::from(total) * std::mem::size_of::<ParticleInstance>() as vk::DeviceSize
}

/// Rejects particle buffers larger than the device's storage descriptor range.
fn check_storage_range(device: &Device, total: u32) -> RhiResult<()> {
    let bytes = particle_bytes(total);
    let limit = vk::DeviceSize::from(device.properties().limits.max_storage_buffer_range);
    if bytes > limit {
        return Err(RhiError::InvalidConfig(format!(
            "{} particles need {} bytes of storage, device allows {}",
            total, bytes, limit
        )));
    }
    Ok(())
}
