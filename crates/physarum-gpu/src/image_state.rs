//! Per-image layout/access/stage tracking.
//!
//! Every image remembers the access pattern it was last transitioned to. A
//! transition always uses that remembered pattern as the barrier source and
//! the requested one as the destination, then stores the destination. Nothing
//! here can fail: recording a redundant barrier is wasteful but never wrong.

use ash::vk;

/// How an image is accessed: the layout it must be in, the memory access
/// performed, and the pipeline stage performing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageAccess {
    pub layout: vk::ImageLayout,
    pub access: vk::AccessFlags2,
    pub stage: vk::PipelineStageFlags2,
}

impl ImageAccess {
    /// Freshly created image. Used as a barrier source it waits on nothing.
    pub const UNDEFINED: Self = Self::new(
        vk::ImageLayout::UNDEFINED,
        vk::AccessFlags2::NONE,
        vk::PipelineStageFlags2::NONE,
    );

    /// Compute shader `imageLoad`.
    pub const COMPUTE_READ: Self = Self::new(
        vk::ImageLayout::GENERAL,
        vk::AccessFlags2::SHADER_STORAGE_READ,
        vk::PipelineStageFlags2::COMPUTE_SHADER,
    );

    /// Compute shader `imageStore`, possibly after `imageLoad` of the same texel.
    pub const COMPUTE_WRITE: Self = Self::new(
        vk::ImageLayout::GENERAL,
        vk::AccessFlags2::from_raw(
            vk::AccessFlags2::SHADER_STORAGE_READ.as_raw()
                | vk::AccessFlags2::SHADER_STORAGE_WRITE.as_raw(),
        ),
        vk::PipelineStageFlags2::COMPUTE_SHADER,
    );

    /// Fragment shader sampling.
    pub const FRAGMENT_SAMPLED: Self = Self::new(
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        vk::AccessFlags2::SHADER_SAMPLED_READ,
        vk::PipelineStageFlags2::FRAGMENT_SHADER,
    );

    /// Source of a copy.
    pub const TRANSFER_SRC: Self = Self::new(
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        vk::AccessFlags2::TRANSFER_READ,
        vk::PipelineStageFlags2::TRANSFER,
    );

    /// Destination of a copy or clear.
    pub const TRANSFER_DST: Self = Self::new(
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        vk::AccessFlags2::TRANSFER_WRITE,
        vk::PipelineStageFlags2::TRANSFER,
    );

    /// Color attachment of a dynamic rendering pass.
    pub const COLOR_ATTACHMENT: Self = Self::new(
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
        vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
    );

    /// Swapchain image just acquired. Its contents are discarded; the stage
    /// matches the semaphore wait stage of the frame submission.
    pub const SWAPCHAIN_ACQUIRED: Self = Self::new(
        vk::ImageLayout::UNDEFINED,
        vk::AccessFlags2::NONE,
        vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
    );

    /// Handed to the presentation engine; no further device access.
    pub const PRESENT: Self = Self::new(
        vk::ImageLayout::PRESENT_SRC_KHR,
        vk::AccessFlags2::NONE,
        vk::PipelineStageFlags2::NONE,
    );

    pub const fn new(
        layout: vk::ImageLayout,
        access: vk::AccessFlags2,
        stage: vk::PipelineStageFlags2,
    ) -> Self {
        Self {
            layout,
            access,
            stage,
        }
    }
}

/// Full color subresource of a single-mip, single-layer image.
pub const COLOR_RANGE: vk::ImageSubresourceRange = vk::ImageSubresourceRange {
    aspect_mask: vk::ImageAspectFlags::COLOR,
    base_mip_level: 0,
    level_count: 1,
    base_array_layer: 0,
    layer_count: 1,
};

/// Last known access pattern of one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceState {
    current: ImageAccess,
    transitions: u64,
}

impl Default for ResourceState {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceState {
    /// State of an image that has never been used.
    pub const fn new() -> Self {
        Self {
            current: ImageAccess::UNDEFINED,
            transitions: 0,
        }
    }

    /// The access pattern recorded by the last transition.
    pub const fn current(&self) -> ImageAccess {
        self.current
    }

    /// Whether the image has left the undefined layout.
    pub fn is_initialized(&self) -> bool {
        self.current.layout != vk::ImageLayout::UNDEFINED
    }

    /// Number of transitions recorded so far.
    pub const fn transition_count(&self) -> u64 {
        self.transitions
    }

    /// Move to `target` and describe the barrier that makes the move legal.
    pub fn transition(
        &mut self,
        image: vk::Image,
        target: ImageAccess,
    ) -> vk::ImageMemoryBarrier2<'static> {
        let source = self.current;
        self.current = target;
        self.transitions += 1;
        barrier(image, source, target)
    }
}

/// Barrier between two access patterns of the same image.
pub fn barrier(
    image: vk::Image,
    source: ImageAccess,
    target: ImageAccess,
) -> vk::ImageMemoryBarrier2<'static> {
    vk::ImageMemoryBarrier2::default()
        .src_stage_mask(source.stage)
        .src_access_mask(source.access)
        .dst_stage_mask(target.stage)
        .dst_access_mask(target.access)
        .old_layout(source.layout)
        .new_layout(target.layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(COLOR_RANGE)
}

/// Record image barriers in a single dependency.
///
/// # Safety
/// The command buffer must be recording and every barrier must name a live image.
pub unsafe fn record_image_barriers(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    barriers: &[vk::ImageMemoryBarrier2<'_>],
) {
    if barriers.is_empty() {
        return;
    }
    let dependency = vk::DependencyInfo::default().image_memory_barriers(barriers);
    device.cmd_pipeline_barrier2(cmd, &dependency);
}

/// An image the frame loop owns, with its view and tracked state.
#[derive(Debug)]
pub struct TrackedImage {
    pub name: &'static str,
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    state: ResourceState,
}

impl TrackedImage {
    /// Wrap an image that has just been created in the undefined layout.
    pub const fn new(
        name: &'static str,
        image: vk::Image,
        view: vk::ImageView,
        format: vk::Format,
        extent: vk::Extent2D,
    ) -> Self {
        Self {
            name,
            image,
            view,
            format,
            extent,
            state: ResourceState::new(),
        }
    }

    pub const fn state(&self) -> &ResourceState {
        &self.state
    }

    /// Update the tracked state and return the barrier to record.
    pub fn transition(&mut self, target: ImageAccess) -> vk::ImageMemoryBarrier2<'static> {
        self.state.transition(self.image, target)
    }

    /// Transition and record the barrier immediately.
    ///
    /// # Safety
    /// The command buffer must be recording.
    pub unsafe fn record_transition(
        &mut self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        target: ImageAccess,
    ) {
        let barrier = self.transition(target);
        record_image_barriers(device, cmd, std::slice::from_ref(&barrier));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn image() -> TrackedImage {
        TrackedImage::new(
            "test",
            vk::Image::from_raw(7),
            vk::ImageView::from_raw(8),
            vk::Format::R8G8B8A8_UNORM,
            vk::Extent2D {
                width: 4,
                height: 4,
            },
        )
    }

    #[test]
    fn first_transition_waits_on_nothing() {
        let mut img = image();
        assert!(!img.state().is_initialized());

        let b = img.transition(ImageAccess::COMPUTE_WRITE);

        assert_eq!(b.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(b.src_access_mask, vk::AccessFlags2::NONE);
        assert_eq!(b.src_stage_mask, vk::PipelineStageFlags2::NONE);
        assert_eq!(b.new_layout, vk::ImageLayout::GENERAL);
        assert_eq!(b.dst_stage_mask, vk::PipelineStageFlags2::COMPUTE_SHADER);
        assert!(img.state().is_initialized());
    }

    #[test]
    fn new_state_becomes_next_source() {
        let mut img = image();
        img.transition(ImageAccess::COMPUTE_WRITE);

        let b = img.transition(ImageAccess::FRAGMENT_SAMPLED);

        assert_eq!(b.old_layout, vk::ImageLayout::GENERAL);
        assert_eq!(b.src_access_mask, ImageAccess::COMPUTE_WRITE.access);
        assert_eq!(b.src_stage_mask, vk::PipelineStageFlags2::COMPUTE_SHADER);
        assert_eq!(b.new_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(b.dst_access_mask, vk::AccessFlags2::SHADER_SAMPLED_READ);
        assert_eq!(img.state().current(), ImageAccess::FRAGMENT_SAMPLED);
    }

    #[test]
    fn repeated_transition_is_idempotent() {
        let mut img = image();
        img.transition(ImageAccess::COMPUTE_READ);
        let before = img.state().current();

        let b = img.transition(ImageAccess::COMPUTE_READ);

        assert_eq!(img.state().current(), before);
        assert_eq!(b.old_layout, b.new_layout);
        assert_eq!(b.src_access_mask, b.dst_access_mask);
        assert_eq!(img.state().transition_count(), 2);
    }

    #[test]
    fn barrier_targets_whole_color_image() {
        let b = barrier(
            vk::Image::from_raw(3),
            ImageAccess::TRANSFER_DST,
            ImageAccess::COMPUTE_READ,
        );
        assert_eq!(b.image, vk::Image::from_raw(3));
        assert_eq!(b.subresource_range.aspect_mask, vk::ImageAspectFlags::COLOR);
        assert_eq!(b.subresource_range.level_count, 1);
        assert_eq!(b.src_queue_family_index, vk::QUEUE_FAMILY_IGNORED);
    }

    #[test]
    fn write_access_includes_read() {
        assert!(ImageAccess::COMPUTE_WRITE
            .access
            .contains(vk::AccessFlags2::SHADER_STORAGE_WRITE));
        assert!(ImageAccess::COMPUTE_WRITE
            .access
            .contains(vk::AccessFlags2::SHADER_STORAGE_READ));
    }
}
