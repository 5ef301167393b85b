//! Command buffer recording and submission.

use crate::error::{GpuError, Result};
use ash::vk;

/// Create a command pool whose buffers can be reset individually.
///
/// # Safety
/// The device must be valid and the queue family must exist.
pub unsafe fn create_command_pool(
    device: &ash::Device,
    queue_family: u32,
) -> Result<vk::CommandPool> {
    let create_info = vk::CommandPoolCreateInfo::default()
        .queue_family_index(queue_family)
        .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

    let pool = device.create_command_pool(&create_info, None)?;
    Ok(pool)
}

/// Allocate one primary command buffer.
///
/// # Safety
/// The device and pool must be valid.
pub unsafe fn allocate_command_buffer(
    device: &ash::Device,
    pool: vk::CommandPool,
) -> Result<vk::CommandBuffer> {
    let alloc_info = vk::CommandBufferAllocateInfo::default()
        .command_pool(pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(1);

    device
        .allocate_command_buffers(&alloc_info)?
        .into_iter()
        .next()
        .ok_or_else(|| GpuError::InvalidState("pool returned no command buffer".to_string()))
}

/// Reset and begin recording a command buffer for a single submission.
///
/// # Safety
/// The command buffer must not be pending execution.
pub unsafe fn begin_command_buffer(device: &ash::Device, cmd: vk::CommandBuffer) -> Result<()> {
    device.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;
    let begin_info =
        vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
    device.begin_command_buffer(cmd, &begin_info)?;
    Ok(())
}

/// End recording a command buffer.
///
/// # Safety
/// The command buffer must be recording.
pub unsafe fn end_command_buffer(device: &ash::Device, cmd: vk::CommandBuffer) -> Result<()> {
    device.end_command_buffer(cmd)?;
    Ok(())
}

/// Semaphores a frame submission waits on and signals.
///
/// Both are absent when the frame is not presented.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubmitSemaphores {
    pub wait: Option<vk::Semaphore>,
    pub signal: Option<vk::Semaphore>,
}

/// Submit one command buffer, signalling `fence` on completion.
///
/// The acquire semaphore is waited on at color attachment output, so compute
/// work in the same submission does not wait for the presentation engine.
///
/// # Safety
/// All handles must be valid and the fence must be unsignaled.
pub unsafe fn submit_frame(
    device: &ash::Device,
    queue: vk::Queue,
    cmd: vk::CommandBuffer,
    semaphores: SubmitSemaphores,
    fence: vk::Fence,
) -> Result<()> {
    let wait = semaphores.wait.as_slice();
    let wait_stages: &[vk::PipelineStageFlags] = if wait.is_empty() {
        &[]
    } else {
        &[vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT]
    };
    let signal = semaphores.signal.as_slice();

    let submit_info = vk::SubmitInfo::default()
        .command_buffers(std::slice::from_ref(&cmd))
        .wait_semaphores(wait)
        .wait_dst_stage_mask(wait_stages)
        .signal_semaphores(signal);

    device.queue_submit(queue, &[submit_info], fence)?;
    Ok(())
}

/// Record, submit and wait for a throwaway command buffer.
///
/// # Safety
/// All handles must be valid.
pub unsafe fn execute_single_time_commands<F>(
    device: &ash::Device,
    pool: vk::CommandPool,
    queue: vk::Queue,
    f: F,
) -> Result<()>
where
    F: FnOnce(vk::CommandBuffer),
{
    let cmd = allocate_command_buffer(device, pool)?;

    let result = (|| -> Result<()> {
        begin_command_buffer(device, cmd)?;
        f(cmd);
        end_command_buffer(device, cmd)?;

        let submit_info = vk::SubmitInfo::default().command_buffers(std::slice::from_ref(&cmd));
        device.queue_submit(queue, &[submit_info], vk::Fence::null())?;
        device.queue_wait_idle(queue)?;
        Ok(())
    })();

    device.free_command_buffers(pool, &[cmd]);
    result
}
