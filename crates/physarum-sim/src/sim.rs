//! The simulation: two trail images, the agent buffer and the passes over them.

use ash::vk;
use physarum_gpu::command::execute_single_time_commands;
use physarum_gpu::{GpuContext, GpuError, ImageAccess, ResourceArena, Result, TrackedImage};

use crate::agents::{record_agent_barrier, Agent, AgentBuffer};
use crate::display::{DisplayPass, PresentTarget};
use crate::params::SimParams;
use crate::pass::{record_seed_copy, DispatchDomain, PassRunner, WorkgroupSize};
use crate::push::{BlurPushConstants, DisplayPushConstants, UpdatePushConstants};
use crate::rebind::{BindingSlot, DescriptorRebinder, SlotKind};
use crate::roles::RoleBuffer;
use crate::sequence::PassKind;
use crate::trail::{create_trail_image, record_clear};

/// Local size declared by `update.comp`.
pub const UPDATE_WORKGROUP: WorkgroupSize = WorkgroupSize::linear(64);
/// Local size declared by `blur.comp`.
pub const BLUR_WORKGROUP: WorkgroupSize = WorkgroupSize::planar(32, 8);

const UPDATE_SLOTS: [BindingSlot; 3] = [
    BindingSlot::new(0, SlotKind::Agents),
    BindingSlot::new(1, SlotKind::ReadImage),
    BindingSlot::new(2, SlotKind::WriteImage),
];

const BLUR_SLOTS: [BindingSlot; 2] = [
    BindingSlot::new(0, SlotKind::ReadImage),
    BindingSlot::new(1, SlotKind::WriteImage),
];

/// Per-frame timing handed to the compute passes.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameParams {
    /// Seconds since the simulation started.
    pub time: f32,
    /// Seconds simulated by this frame.
    pub delta_time: f32,
}

/// Everything needed to create a [`SimPipeline`].
#[derive(Debug, Clone)]
pub struct SimDesc {
    pub extent: vk::Extent2D,
    pub agents: Vec<Agent>,
    pub params: SimParams,
    /// Swapchain format to build the display pass for; headless runs pass `None`.
    pub display_format: Option<vk::Format>,
}

/// Trail images under a read/write role assignment, the agents, and the
/// update, blur and display passes.
pub struct SimPipeline {
    images: RoleBuffer<TrackedImage>,
    agents: AgentBuffer,
    update: PassRunner<UpdatePushConstants>,
    blur: PassRunner<BlurPushConstants>,
    display: Option<DisplayPass>,
    rebinder: DescriptorRebinder,
    params: SimParams,
    extent: vk::Extent2D,
}

impl SimPipeline {
    /// Create every simulation resource inside `arena`.
    ///
    /// Both trail images are cleared to zero before this returns.
    pub fn new(
        gpu: &GpuContext,
        arena: &mut ResourceArena,
        command_pool: vk::CommandPool,
        desc: &SimDesc,
    ) -> Result<Self> {
        let extent = desc.extent;
        if extent.width == 0 || extent.height == 0 {
            return Err(GpuError::InvalidState(format!(
                "trail extent {}x{} is empty",
                extent.width, extent.height
            )));
        }

        let mut images = RoleBuffer::new(
            create_trail_image(gpu, arena, "trail_a", extent)?,
            create_trail_image(gpu, arena, "trail_b", extent)?,
        );
        let agents = AgentBuffer::upload(gpu, arena, command_pool, &desc.agents)?;

        let device = gpu.device();
        let update = unsafe {
            PassRunner::new(
                device,
                arena,
                "update",
                physarum_shaders::update(),
                &UPDATE_SLOTS,
                UPDATE_WORKGROUP,
            )?
        };
        let blur = unsafe {
            PassRunner::new(
                device,
                arena,
                "blur",
                physarum_shaders::blur(),
                &BLUR_SLOTS,
                BLUR_WORKGROUP,
            )?
        };
        let display = match desc.display_format {
            Some(format) => Some(unsafe { DisplayPass::new(device, arena, format)? }),
            None => None,
        };

        unsafe {
            execute_single_time_commands(device, command_pool, gpu.queue(), |cmd| {
                for image in images.slots_mut() {
                    record_clear(device, cmd, image);
                }
            })?;
        }

        tracing::info!(
            "Simulation ready: {}x{} trail, {} agents",
            extent.width,
            extent.height,
            agents.count()
        );

        Ok(Self {
            images,
            agents,
            update,
            blur,
            display,
            rebinder: DescriptorRebinder::new(),
            params: desc.params,
            extent,
        })
    }

    pub const fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub const fn agent_count(&self) -> u32 {
        self.agents.count()
    }

    pub const fn params(&self) -> &SimParams {
        &self.params
    }

    pub const fn images(&self) -> &RoleBuffer<TrackedImage> {
        &self.images
    }

    pub const fn rebinder(&self) -> &DescriptorRebinder {
        &self.rebinder
    }

    /// Dispatches recorded so far by a compute pass. Display is not one.
    pub const fn dispatch_count(&self, pass: PassKind) -> u64 {
        match pass {
            PassKind::Update => self.update.dispatch_count(),
            PassKind::Blur => self.blur.dispatch_count(),
            PassKind::Display => 0,
        }
    }

    /// Bytes needed to read back one trail image.
    pub const fn readback_size(&self) -> vk::DeviceSize {
        self.extent.width as vk::DeviceSize * self.extent.height as vk::DeviceSize * 4
    }

    /// Record one compute pass. The caller swaps roles afterwards.
    ///
    /// # Safety
    /// The command buffer must be recording and the previous submission using
    /// the descriptor sets must have completed.
    pub unsafe fn record_pass(
        &mut self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        pass: PassKind,
        frame: &FrameParams,
    ) -> Result<()> {
        match pass {
            PassKind::Update => self.record_update(device, cmd, frame),
            PassKind::Blur => self.record_blur(device, cmd, frame),
            PassKind::Display => Err(GpuError::InvalidState(
                "display is not a compute pass".to_string(),
            )),
        }
    }

    /// Agents read the read image and deposit into the write image.
    ///
    /// The write image is first seeded with the read image, since the shader
    /// only touches the texels under agents.
    ///
    /// # Safety
    /// See [`Self::record_pass`].
    pub unsafe fn record_update(
        &mut self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        frame: &FrameParams,
    ) -> Result<()> {
        // The previous frame's update wrote the agents.
        record_agent_barrier(
            device,
            cmd,
            vk::PipelineStageFlags2::COMPUTE_SHADER,
            vk::AccessFlags2::SHADER_STORAGE_WRITE,
        );
        record_seed_copy(device, cmd, &mut self.images);

        let push = UpdatePushConstants::new(
            self.agents.count(),
            self.extent,
            frame.time,
            frame.delta_time,
            &self.params,
        );
        self.update.record(
            device,
            cmd,
            &mut self.rebinder,
            &mut self.images,
            Some((self.agents.buffer, self.agents.size)),
            &push,
            DispatchDomain::linear(self.agents.count()),
            ImageAccess::COMPUTE_READ,
        )
    }

    /// Diffuse and decay the read image into the write image.
    ///
    /// # Safety
    /// See [`Self::record_pass`].
    pub unsafe fn record_blur(
        &mut self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        frame: &FrameParams,
    ) -> Result<()> {
        let push = BlurPushConstants::new(self.extent, frame.delta_time, &self.params);
        self.blur.record(
            device,
            cmd,
            &mut self.rebinder,
            &mut self.images,
            None,
            &push,
            DispatchDomain::planar(self.extent),
            ImageAccess::FRAGMENT_SAMPLED,
        )
    }

    pub fn swap_roles(&mut self) {
        self.images.swap();
    }

    /// Leave the final read image ready for fragment sampling.
    ///
    /// # Safety
    /// The command buffer must be recording.
    pub unsafe fn finish_compute(&mut self, device: &ash::Device, cmd: vk::CommandBuffer) {
        self.images
            .read_mut()
            .record_transition(device, cmd, ImageAccess::FRAGMENT_SAMPLED);
    }

    /// Draw the read image into a swapchain image.
    ///
    /// # Safety
    /// The command buffer must be recording and [`Self::finish_compute`] must
    /// have been recorded this frame.
    pub unsafe fn record_display(
        &mut self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        target: PresentTarget,
        push: &DisplayPushConstants,
    ) -> Result<()> {
        let display = self.display.as_ref().ok_or_else(|| {
            GpuError::InvalidState("simulation was created without a display pass".to_string())
        })?;
        display.record(
            device,
            cmd,
            &mut self.rebinder,
            self.images.read(),
            target,
            push,
        )
    }

    /// Copy the read image into a host-visible buffer of at least
    /// [`Self::readback_size`] bytes, tightly packed RGBA8 rows.
    ///
    /// # Safety
    /// The command buffer must be recording and `buffer` must be a live
    /// transfer-destination buffer.
    pub unsafe fn record_readback(
        &mut self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        buffer: vk::Buffer,
    ) {
        let read = self.images.read_mut();
        read.record_transition(device, cmd, ImageAccess::TRANSFER_SRC);

        let region = vk::BufferImageCopy::default()
            .image_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .layer_count(1),
            )
            .image_extent(vk::Extent3D {
                width: read.extent.width,
                height: read.extent.height,
                depth: 1,
            });
        device.cmd_copy_image_to_buffer(
            cmd,
            read.image,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            buffer,
            &[region],
        );

        let to_host = vk::BufferMemoryBarrier2::default()
            .src_stage_mask(vk::PipelineStageFlags2::TRANSFER)
            .src_access_mask(vk::AccessFlags2::TRANSFER_WRITE)
            .dst_stage_mask(vk::PipelineStageFlags2::HOST)
            .dst_access_mask(vk::AccessFlags2::HOST_READ)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .buffer(buffer)
            .offset(0)
            .size(vk::WHOLE_SIZE);
        let dependency =
            vk::DependencyInfo::default().buffer_memory_barriers(std::slice::from_ref(&to_host));
        device.cmd_pipeline_barrier2(cmd, &dependency);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pass::dispatch_groups;

    #[test]
    fn workgroups_fit_requested_limit() {
        // GpuContextBuilder rejects devices below 256 invocations per group.
        assert!(UPDATE_WORKGROUP.invocations() <= 256);
        assert_eq!(BLUR_WORKGROUP.invocations(), 256);
    }

    #[test]
    fn update_reads_agents_and_both_images() {
        let kinds: Vec<_> = UPDATE_SLOTS.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            [SlotKind::Agents, SlotKind::ReadImage, SlotKind::WriteImage]
        );
        assert!(BLUR_SLOTS.iter().all(|s| s.kind != SlotKind::Agents));
    }

    #[test]
    fn blur_covers_trail() {
        let extent = vk::Extent2D {
            width: 1920,
            height: 1080,
        };
        let [x, y, z] = dispatch_groups(DispatchDomain::planar(extent), BLUR_WORKGROUP);
        assert_eq!([x, y, z], [60, 135, 1]);
        assert!(x * BLUR_WORKGROUP.x >= extent.width);
        assert!(y * BLUR_WORKGROUP.y >= extent.height);
    }

    #[test]
    fn single_agent_needs_one_group() {
        assert_eq!(
            dispatch_groups(DispatchDomain::linear(1), UPDATE_WORKGROUP),
            [1, 1, 1]
        );
    }
}
