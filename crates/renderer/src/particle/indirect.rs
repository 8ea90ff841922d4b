//! Indirect draw records and draw-call planning.

use bytemuck::{Pod, Zeroable};

use engine_core::DrawStrategy;

/// Indices in the billboard quad (two triangles).
pub const QUAD_INDEX_COUNT: u32 = 6;

/// One `VkDrawIndexedIndirectCommand` record as laid out in GPU memory.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct IndirectDrawCommand {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub vertex_offset: i32,
    pub first_instance: u32,
}

impl IndirectDrawCommand {
    /// Byte stride between consecutive records.
    pub const STRIDE: u32 = std::mem::size_of::<Self>() as u32;
}

/// One record per group: group `g` draws instances
/// `g * per_group .. (g + 1) * per_group`.
///
/// The counts must pass [`ParticleConfig::checked_total`]; instance offsets
/// saturate otherwise.
///
/// [`ParticleConfig::checked_total`]: engine_core::config::ParticleConfig::checked_total
pub fn build_indirect_commands(
    group_count: u32,
    per_group: u32,
    index_count: u32,
) -> Vec<IndirectDrawCommand> {
    (0..group_count)
        .map(|group| IndirectDrawCommand {
            index_count,
            instance_count: per_group,
            first_index: 0,
            vertex_offset: 0,
            first_instance: group.saturating_mul(per_group),
        })
        .collect()
}

/// A draw command to record into the graphics pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrawCall {
    /// `vkCmdDrawIndexed`
    Indexed {
        index_count: u32,
        instance_count: u32,
        first_instance: u32,
    },
    /// `vkCmdDrawIndexedIndirect` against the frame's indirect buffer
    Indirect {
        offset: u64,
        draw_count: u32,
        stride: u32,
    },
}

/// Plans the draw calls for a strategy.
///
/// Indirect drawing issues a single multi-draw when the device supports
/// `multiDrawIndirect`, otherwise one call per group record. Counts follow
/// the same contract as [`build_indirect_commands`].
pub fn record_draw_calls(
    strategy: DrawStrategy,
    multi_draw_indirect: bool,
    group_count: u32,
    per_group: u32,
    index_count: u32,
) -> Vec<DrawCall> {
    let stride = IndirectDrawCommand::STRIDE;
    match strategy {
        DrawStrategy::Instanced => vec![DrawCall::Indexed {
            index_count,
            instance_count: group_count.saturating_mul(per_group),
            first_instance: 0,
        }],
        DrawStrategy::Indirect if group_count == 0 => Vec::new(),
        DrawStrategy::Indirect if multi_draw_indirect => vec![DrawCall::Indirect {
            offset: 0,
            draw_count: group_count,
            stride,
        }],
        DrawStrategy::Indirect => (0..group_count)
            .map(|group| DrawCall::Indirect {
                offset: u64::from(group) * u64::from(stride),
                draw_count: 1,
                stride,
            })
            .collect(),
    }
}
