//! Agent records and their GPU buffer.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use gpu_allocator::MemoryLocation;
use physarum_gpu::command::execute_single_time_commands;
use physarum_gpu::{GpuContext, GpuError, ResourceArena, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::TAU;

/// One simulated agent, laid out as the `Agent` struct in `update.comp`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Agent {
    /// Trail-image pixels.
    pub position: [f32; 2],
    /// Heading in radians.
    pub angle: f32,
    pub _pad: f32,
}

const _: () = assert!(std::mem::size_of::<Agent>() == 16);

impl Agent {
    pub const fn new(x: f32, y: f32, angle: f32) -> Self {
        Self {
            position: [x, y],
            angle,
            _pad: 0.0,
        }
    }
}

/// Scatter `count` agents uniformly over a disc centred in the image, each
/// heading toward the centre. The same seed always gives the same agents.
#[allow(clippy::cast_precision_loss)]
pub fn spawn_agents(count: u32, extent: vk::Extent2D, seed: u64) -> Vec<Agent> {
    let mut rng = StdRng::seed_from_u64(seed);
    let cx = extent.width as f32 * 0.5;
    let cy = extent.height as f32 * 0.5;
    let radius = cx.min(cy) * 0.8;

    (0..count)
        .map(|_| {
            // sqrt keeps the density uniform over the disc's area.
            let r = radius * rng.random::<f32>().sqrt();
            let theta = rng.random_range(0.0..TAU);
            let x = cx + r * theta.cos();
            let y = cy + r * theta.sin();
            Agent::new(x, y, (cy - y).atan2(cx - x))
        })
        .collect()
}

/// Device-local storage buffer holding every agent.
///
/// Read and written in place by the update pass; never ping-ponged.
#[derive(Debug, Clone, Copy)]
pub struct AgentBuffer {
    pub buffer: vk::Buffer,
    pub size: u64,
    count: u32,
}

impl AgentBuffer {
    /// Create the buffer, owned by `arena`, and fill it through a staging copy.
    pub fn upload(
        gpu: &GpuContext,
        arena: &mut ResourceArena,
        command_pool: vk::CommandPool,
        agents: &[Agent],
    ) -> Result<Self> {
        if agents.is_empty() {
            return Err(GpuError::InvalidState(
                "agent buffer needs at least one agent".to_string(),
            ));
        }
        let count = u32::try_from(agents.len())
            .map_err(|_| GpuError::InvalidState(format!("{} agents", agents.len())))?;
        let bytes: &[u8] = bytemuck::cast_slice(agents);
        let size = bytes.len() as u64;

        let buffer = gpu.allocator().lock().create_buffer(
            size,
            vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            MemoryLocation::GpuOnly,
            "agents",
        )?;
        let buffer = arena.adopt_buffer(buffer);

        let mut staging = gpu.allocator().lock().create_buffer(
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
            "agents_staging",
        )?;

        let copied = staging.write(bytes).and_then(|()| unsafe {
            execute_single_time_commands(gpu.device(), command_pool, gpu.queue(), |cmd| {
                let region = vk::BufferCopy::default().size(size);
                gpu.device()
                    .cmd_copy_buffer(cmd, staging.buffer, buffer, &[region]);
                record_agent_barrier(
                    gpu.device(),
                    cmd,
                    vk::PipelineStageFlags2::TRANSFER,
                    vk::AccessFlags2::TRANSFER_WRITE,
                );
            })
        });
        gpu.allocator().lock().free_buffer(&mut staging)?;
        copied?;

        tracing::info!("Uploaded {count} agents ({size} bytes)");
        Ok(Self {
            buffer,
            size,
            count,
        })
    }

    pub const fn count(&self) -> u32 {
        self.count
    }
}

/// Make prior writes to the agent buffer visible to the update shader.
///
/// # Safety
/// The command buffer must be recording.
pub unsafe fn record_agent_barrier(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    src_stage: vk::PipelineStageFlags2,
    src_access: vk::AccessFlags2,
) {
    let barrier = vk::MemoryBarrier2::default()
        .src_stage_mask(src_stage)
        .src_access_mask(src_access)
        .dst_stage_mask(vk::PipelineStageFlags2::COMPUTE_SHADER)
        .dst_access_mask(
            vk::AccessFlags2::SHADER_STORAGE_READ | vk::AccessFlags2::SHADER_STORAGE_WRITE,
        );
    let dependency = vk::DependencyInfo::default().memory_barriers(std::slice::from_ref(&barrier));
    device.cmd_pipeline_barrier2(cmd, &dependency);
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXTENT: vk::Extent2D = vk::Extent2D {
        width: 800,
        height: 600,
    };

    #[test]
    fn spawn_is_deterministic() {
        assert_eq!(spawn_agents(64, EXTENT, 7), spawn_agents(64, EXTENT, 7));
        assert_ne!(spawn_agents(64, EXTENT, 7), spawn_agents(64, EXTENT, 8));
    }

    #[test]
    fn agents_start_inside_disc_facing_centre() {
        let agents = spawn_agents(500, EXTENT, 1);
        assert_eq!(agents.len(), 500);

        for agent in &agents {
            let dx = 400.0 - agent.position[0];
            let dy = 300.0 - agent.position[1];
            assert!(dx.hypot(dy) <= 240.0 + 1e-3);
            if dx.hypot(dy) > 1.0 {
                let heading = (agent.angle.cos(), agent.angle.sin());
                let dot = heading.0 * dx + heading.1 * dy;
                approx::assert_relative_eq!(dot, dx.hypot(dy), max_relative = 1e-3);
            }
        }
    }

    #[test]
    fn record_is_std430_sized() {
        let agents = [Agent::new(1.0, 2.0, 0.5), Agent::default()];
        let bytes: &[u8] = bytemuck::cast_slice(&agents);
        assert_eq!(bytes.len(), 32);
        assert_eq!(&bytes[0..4], &1.0_f32.to_le_bytes());
        assert_eq!(&bytes[8..12], &0.5_f32.to_le_bytes());
    }
}
