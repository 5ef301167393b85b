//! Push-constant blocks.
//!
//! Each struct mirrors a `layout(push_constant)` block in `physarum-shaders`.
//! Fields are 4-byte scalars or column-major matrices, so `#[repr(C)]` and
//! std430 agree on every offset.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use crate::params::SimParams;

/// Bytes every implementation guarantees for push constants.
pub const MAX_PUSH_CONSTANT_SIZE: usize = 128;

/// A block of per-dispatch values written right before a pass runs.
pub trait PushConstantBlock: Pod {
    /// Stages that read the block.
    const STAGES: vk::ShaderStageFlags;

    /// Size in bytes.
    #[allow(clippy::cast_possible_truncation)]
    const SIZE: u32 = std::mem::size_of::<Self>() as u32;

    fn range() -> vk::PushConstantRange {
        vk::PushConstantRange::default()
            .stage_flags(Self::STAGES)
            .offset(0)
            .size(Self::SIZE)
    }

    /// Record `vkCmdPushConstants` for this block.
    ///
    /// # Safety
    /// The command buffer must be recording and `layout` must declare [`Self::range`].
    unsafe fn push(&self, device: &ash::Device, cmd: vk::CommandBuffer, layout: vk::PipelineLayout) {
        device.cmd_push_constants(cmd, layout, Self::STAGES, 0, bytemuck::bytes_of(self));
    }
}

macro_rules! assert_push_block {
    ($ty:ty) => {
        const _: () = {
            let size = std::mem::size_of::<$ty>();
            assert!(size > 0 && size % 4 == 0, "push constants must be 4-byte multiples");
            assert!(size <= MAX_PUSH_CONSTANT_SIZE, "push constants exceed 128 bytes");
        };
    };
}

/// `update.comp` push block.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct UpdatePushConstants {
    pub agent_count: u32,
    /// Seconds since start; seeds the per-agent random numbers.
    pub time: f32,
    pub delta_time: f32,
    pub width: u32,
    pub height: u32,
    pub move_speed: f32,
    pub turn_speed: f32,
    pub sensor_angle: f32,
    pub sensor_distance: f32,
    pub deposit_amount: f32,
}

impl UpdatePushConstants {
    pub const fn new(
        agent_count: u32,
        extent: vk::Extent2D,
        time: f32,
        delta_time: f32,
        params: &SimParams,
    ) -> Self {
        Self {
            agent_count,
            time,
            delta_time,
            width: extent.width,
            height: extent.height,
            move_speed: params.move_speed,
            turn_speed: params.turn_speed,
            sensor_angle: params.sensor_angle,
            sensor_distance: params.sensor_distance,
            deposit_amount: params.deposit_amount,
        }
    }
}

impl PushConstantBlock for UpdatePushConstants {
    const STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::COMPUTE;
}

assert_push_block!(UpdatePushConstants);

/// `blur.comp` push block.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct BlurPushConstants {
    pub width: u32,
    pub height: u32,
    pub delta_time: f32,
    pub diffuse_rate: f32,
    pub decay_rate: f32,
}

impl BlurPushConstants {
    pub const fn new(extent: vk::Extent2D, delta_time: f32, params: &SimParams) -> Self {
        Self {
            width: extent.width,
            height: extent.height,
            delta_time,
            diffuse_rate: params.diffuse_rate,
            decay_rate: params.decay_rate,
        }
    }
}

impl PushConstantBlock for BlurPushConstants {
    const STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::COMPUTE;
}

assert_push_block!(BlurPushConstants);

/// `display.frag` push block: the camera's inverse matrices.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct DisplayPushConstants {
    pub inverse_view: [[f32; 4]; 4],
    pub inverse_projection: [[f32; 4]; 4],
}

impl DisplayPushConstants {
    pub fn new(inverse_view: Mat4, inverse_projection: Mat4) -> Self {
        Self {
            inverse_view: inverse_view.to_cols_array_2d(),
            inverse_projection: inverse_projection.to_cols_array_2d(),
        }
    }
}

impl Default for DisplayPushConstants {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, Mat4::IDENTITY)
    }
}

impl PushConstantBlock for DisplayPushConstants {
    const STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::FRAGMENT;
}

assert_push_block!(DisplayPushConstants);
