//! Frame synchronization.

use crate::arena::{ArenaEntry, ResourceArena};
use crate::error::Result;
use ash::vk;

/// Create a semaphore.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_semaphore(device: &ash::Device) -> Result<vk::Semaphore> {
    let create_info = vk::SemaphoreCreateInfo::default();
    let semaphore = device.create_semaphore(&create_info, None)?;
    Ok(semaphore)
}

/// Create a fence.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_fence(device: &ash::Device, signaled: bool) -> Result<vk::Fence> {
    let flags = if signaled {
        vk::FenceCreateFlags::SIGNALED
    } else {
        vk::FenceCreateFlags::empty()
    };

    let create_info = vk::FenceCreateInfo::default().flags(flags);
    let fence = device.create_fence(&create_info, None)?;
    Ok(fence)
}

/// Synchronization for the one frame that may be in flight.
///
/// The fence starts signaled so the first wait returns immediately.
#[derive(Debug, Clone, Copy)]
pub struct FrameSync {
    /// Signaled when the acquired swapchain image may be written.
    pub image_available: vk::Semaphore,
    /// Signaled when the frame's commands complete; presentation waits on it.
    pub render_finished: vk::Semaphore,
    /// Signaled when the frame's command buffer may be reused.
    pub in_flight: vk::Fence,
}

impl FrameSync {
    /// Create the objects and hand ownership to `arena`.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(device: &ash::Device, arena: &mut ResourceArena) -> Result<Self> {
        let image_available = create_semaphore(device)?;
        arena.push(ArenaEntry::Semaphore(image_available));
        let render_finished = create_semaphore(device)?;
        arena.push(ArenaEntry::Semaphore(render_finished));
        let in_flight = create_fence(device, true)?;
        arena.push(ArenaEntry::Fence(in_flight));

        Ok(Self {
            image_available,
            render_finished,
            in_flight,
        })
    }

    /// Block until the previous submission has completed.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn wait(&self, device: &ash::Device) -> Result<()> {
        device.wait_for_fences(&[self.in_flight], true, u64::MAX)?;
        Ok(())
    }

    /// Unsignal the fence ahead of the next submission.
    ///
    /// # Safety
    /// The fence must not be pending.
    pub unsafe fn reset(&self, device: &ash::Device) -> Result<()> {
        device.reset_fences(&[self.in_flight])?;
        Ok(())
    }
}
