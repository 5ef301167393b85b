//! Ownership tracking for Vulkan objects.
//!
//! Every object created during setup is pushed into a [`ResourceArena`]. The
//! arena destroys them in reverse creation order when it is dropped, after the
//! device has gone idle. Because the arena is filled incrementally, an error
//! half way through setup still releases exactly what had been created.

use std::sync::Arc;

use ash::vk;
use parking_lot::Mutex;

use crate::context::GpuContext;
use crate::memory::{GpuAllocator, GpuBuffer, GpuImage};

/// One owned Vulkan object.
pub enum ArenaEntry {
    Buffer(GpuBuffer),
    Image(GpuImage),
    ImageView(vk::ImageView),
    Sampler(vk::Sampler),
    Pipeline(vk::Pipeline),
    PipelineLayout(vk::PipelineLayout),
    DescriptorSetLayout(vk::DescriptorSetLayout),
    DescriptorPool(vk::DescriptorPool),
    Semaphore(vk::Semaphore),
    Fence(vk::Fence),
    CommandPool(vk::CommandPool),
    Swapchain(ash::khr::swapchain::Device, vk::SwapchainKHR),
    Surface(ash::khr::surface::Instance, vk::SurfaceKHR),
}

impl ArenaEntry {
    /// Short name used in teardown logs.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Buffer(_) => "buffer",
            Self::Image(_) => "image",
            Self::ImageView(_) => "image view",
            Self::Sampler(_) => "sampler",
            Self::Pipeline(_) => "pipeline",
            Self::PipelineLayout(_) => "pipeline layout",
            Self::DescriptorSetLayout(_) => "descriptor set layout",
            Self::DescriptorPool(_) => "descriptor pool",
            Self::Semaphore(_) => "semaphore",
            Self::Fence(_) => "fence",
            Self::CommandPool(_) => "command pool",
            Self::Swapchain(..) => "swapchain",
            Self::Surface(..) => "surface",
        }
    }

    /// Destroy the object.
    ///
    /// # Safety
    /// The device must be idle with respect to this object.
    unsafe fn destroy(self, device: &ash::Device, allocator: &mut GpuAllocator) {
        match self {
            Self::Buffer(mut buffer) => {
                if let Err(e) = allocator.free_buffer(&mut buffer) {
                    tracing::error!("Failed to free buffer: {e}");
                }
            }
            Self::Image(mut image) => {
                if let Err(e) = allocator.free_image(&mut image) {
                    tracing::error!("Failed to free image: {e}");
                }
            }
            Self::ImageView(view) => device.destroy_image_view(view, None),
            Self::Sampler(sampler) => device.destroy_sampler(sampler, None),
            Self::Pipeline(pipeline) => device.destroy_pipeline(pipeline, None),
            Self::PipelineLayout(layout) => device.destroy_pipeline_layout(layout, None),
            Self::DescriptorSetLayout(layout) => device.destroy_descriptor_set_layout(layout, None),
            Self::DescriptorPool(pool) => device.destroy_descriptor_pool(pool, None),
            Self::Semaphore(semaphore) => device.destroy_semaphore(semaphore, None),
            Self::Fence(fence) => device.destroy_fence(fence, None),
            Self::CommandPool(pool) => device.destroy_command_pool(pool, None),
            Self::Swapchain(loader, swapchain) => loader.destroy_swapchain(swapchain, None),
            Self::Surface(loader, surface) => loader.destroy_surface(surface, None),
        }
    }
}

/// Owns Vulkan objects and releases them last-in first-out.
pub struct ResourceArena {
    label: &'static str,
    device: Arc<ash::Device>,
    allocator: Arc<Mutex<GpuAllocator>>,
    entries: Vec<ArenaEntry>,
}

impl ResourceArena {
    /// Create an empty arena bound to the context's device and allocator.
    pub fn new(gpu: &GpuContext, label: &'static str) -> Self {
        Self {
            label,
            device: Arc::clone(&gpu.device),
            allocator: Arc::clone(&gpu.allocator),
            entries: Vec::new(),
        }
    }

    /// Take ownership of an object.
    pub fn push(&mut self, entry: ArenaEntry) {
        self.entries.push(entry);
    }

    /// Take ownership of a buffer and hand back its handle.
    pub fn adopt_buffer(&mut self, buffer: GpuBuffer) -> vk::Buffer {
        let handle = buffer.buffer;
        self.entries.push(ArenaEntry::Buffer(buffer));
        handle
    }

    /// Take ownership of an image and hand back its handle.
    pub fn adopt_image(&mut self, image: GpuImage) -> vk::Image {
        let handle = image.image;
        self.entries.push(ArenaEntry::Image(image));
        handle
    }

    /// Look up an adopted buffer, for host access to mapped memory.
    pub fn buffer(&self, handle: vk::Buffer) -> Option<&GpuBuffer> {
        self.entries.iter().find_map(|entry| match entry {
            ArenaEntry::Buffer(buffer) if buffer.buffer == handle => Some(buffer),
            _ => None,
        })
    }

    /// Number of objects currently owned.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the arena owns nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Wait for the device, then destroy everything in reverse creation order.
    pub fn release(&mut self) {
        if self.entries.is_empty() {
            return;
        }

        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                tracing::error!("Device wait before teardown of {} failed: {e}", self.label);
            }
        }

        let count = self.entries.len();
        let mut allocator = self.allocator.lock();
        for entry in release_order(&mut self.entries) {
            tracing::trace!(arena = self.label, "Destroying {}", entry.kind());
            unsafe { entry.destroy(&self.device, &mut allocator) };
        }
        tracing::debug!("Released {count} objects from {}", self.label);
    }
}

impl Drop for ResourceArena {
    fn drop(&mut self) {
        self.release();
    }
}

fn release_order(entries: &mut Vec<ArenaEntry>) -> impl Iterator<Item = ArenaEntry> + '_ {
    entries.drain(..).rev()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn entries_release_last_in_first_out() {
        let mut entries = vec![
            ArenaEntry::CommandPool(vk::CommandPool::from_raw(1)),
            ArenaEntry::Fence(vk::Fence::from_raw(2)),
            ArenaEntry::Semaphore(vk::Semaphore::from_raw(3)),
            ArenaEntry::Pipeline(vk::Pipeline::from_raw(4)),
        ];

        let kinds: Vec<_> = release_order(&mut entries).map(|e| e.kind()).collect();

        assert_eq!(kinds, ["pipeline", "semaphore", "fence", "command pool"]);
        assert!(entries.is_empty());
    }
}
