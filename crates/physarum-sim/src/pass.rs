//! Compute passes over the ping-pong images.

use ash::vk;
use physarum_gpu::image_state::record_image_barriers;
use physarum_gpu::{ArenaEntry, ComputePipeline, ImageAccess, ResourceArena, Result, TrackedImage};
use std::marker::PhantomData;

use crate::push::PushConstantBlock;
use crate::rebind::{BindingSlot, BoundResources, DescriptorRebinder, PassDescriptor};
use crate::roles::RoleBuffer;

/// Local size declared by a compute shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkgroupSize {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl WorkgroupSize {
    pub const fn linear(x: u32) -> Self {
        Self { x, y: 1, z: 1 }
    }

    pub const fn planar(x: u32, y: u32) -> Self {
        Self { x, y, z: 1 }
    }

    pub const fn invocations(self) -> u32 {
        self.x * self.y * self.z
    }
}

/// Number of invocations a pass must cover along each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchDomain {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

impl DispatchDomain {
    pub const fn linear(width: u32) -> Self {
        Self {
            width,
            height: 1,
            depth: 1,
        }
    }

    pub const fn planar(extent: vk::Extent2D) -> Self {
        Self {
            width: extent.width,
            height: extent.height,
            depth: 1,
        }
    }
}

/// Workgroups to dispatch: `ceil(domain / local)` per axis.
///
/// Shaders must bounds-check, since the last group along an axis may run
/// past the domain.
pub const fn dispatch_groups(domain: DispatchDomain, local: WorkgroupSize) -> [u32; 3] {
    [
        domain.width.div_ceil(local.x),
        domain.height.div_ceil(local.y),
        domain.depth.div_ceil(local.z),
    ]
}

/// One compute pass reading the read role and writing the write role.
pub struct PassRunner<P> {
    pub name: &'static str,
    pipeline: ComputePipeline,
    descriptor: PassDescriptor,
    local: WorkgroupSize,
    dispatches: u64,
    _push: PhantomData<P>,
}

impl<P: PushConstantBlock> PassRunner<P> {
    /// Build the descriptor set and pipeline, handing ownership to `arena`.
    ///
    /// # Safety
    /// The device must be valid and `shader` must declare `local` as its local size.
    pub unsafe fn new(
        device: &ash::Device,
        arena: &mut ResourceArena,
        name: &'static str,
        shader: &[u32],
        slots: &[BindingSlot],
        local: WorkgroupSize,
    ) -> Result<Self> {
        let descriptor =
            PassDescriptor::new(device, arena, name, vk::ShaderStageFlags::COMPUTE, slots)?;

        let pipeline = ComputePipeline::new(device, shader, &[descriptor.layout], &[P::range()])?;
        arena.push(ArenaEntry::PipelineLayout(pipeline.layout));
        arena.push(ArenaEntry::Pipeline(pipeline.pipeline));

        tracing::info!(
            pass = name,
            "Compute pass ready: local size {}x{}x{}, {} byte push block",
            local.x,
            local.y,
            local.z,
            P::SIZE
        );

        Ok(Self {
            name,
            pipeline,
            descriptor,
            local,
            dispatches: 0,
            _push: PhantomData,
        })
    }

    pub const fn descriptor(&self) -> &PassDescriptor {
        &self.descriptor
    }

    pub const fn dispatch_count(&self) -> u64 {
        self.dispatches
    }

    /// Record the pass.
    ///
    /// 1. Move the read image to storage-read and the write image to storage-write.
    /// 2. Point the descriptor set at the images now holding those roles.
    /// 3. Push `push`.
    /// 4. Bind pipeline and set.
    /// 5. Dispatch enough groups to cover `domain`.
    /// 6. Move the written image to `consumer`, the access of whoever reads it next.
    ///
    /// The caller swaps roles afterwards.
    ///
    /// # Safety
    /// The command buffer must be recording and no submission may be using the
    /// descriptor set.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn record(
        &mut self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        rebinder: &mut DescriptorRebinder,
        images: &mut RoleBuffer<TrackedImage>,
        agents: Option<(vk::Buffer, vk::DeviceSize)>,
        push: &P,
        domain: DispatchDomain,
        consumer: ImageAccess,
    ) -> Result<()> {
        let (read, write) = images.pair_mut();
        let barriers = [
            read.transition(ImageAccess::COMPUTE_READ),
            write.transition(ImageAccess::COMPUTE_WRITE),
        ];
        record_image_barriers(device, cmd, &barriers);

        let resources = BoundResources {
            read: read.view,
            write: write.view,
            agents,
            sampler: None,
        };
        rebinder.rebind(device, &self.descriptor, &resources)?;

        push.push(device, cmd, self.pipeline.layout);

        device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::COMPUTE, self.pipeline.pipeline);
        device.cmd_bind_descriptor_sets(
            cmd,
            vk::PipelineBindPoint::COMPUTE,
            self.pipeline.layout,
            0,
            &[self.descriptor.set],
            &[],
        );

        let [x, y, z] = dispatch_groups(domain, self.local);
        device.cmd_dispatch(cmd, x, y, z);
        self.dispatches += 1;

        write.record_transition(device, cmd, consumer);

        tracing::trace!(pass = self.name, groups = ?[x, y, z], "Dispatched");
        Ok(())
    }
}

/// Copy the read image into the write image, leaving both in transfer layouts.
///
/// # Safety
/// The command buffer must be recording.
pub unsafe fn record_seed_copy(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    images: &mut RoleBuffer<TrackedImage>,
) {
    let (read, write) = images.pair_mut();
    let barriers = [
        read.transition(ImageAccess::TRANSFER_SRC),
        write.transition(ImageAccess::TRANSFER_DST),
    ];
    record_image_barriers(device, cmd, &barriers);

    let layers = vk::ImageSubresourceLayers::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .layer_count(1);
    let region = vk::ImageCopy::default()
        .src_subresource(layers)
        .dst_subresource(layers)
        .extent(vk::Extent3D {
            width: read.extent.width,
            height: read.extent.height,
            depth: 1,
        });

    device.cmd_copy_image(
        cmd,
        read.image,
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        write.image,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        &[region],
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_round_up() {
        let local = WorkgroupSize::planar(32, 8);
        assert_eq!(
            dispatch_groups(DispatchDomain::linear(800), WorkgroupSize::linear(32)),
            [25, 1, 1]
        );
        assert_eq!(
            dispatch_groups(DispatchDomain::linear(801), WorkgroupSize::linear(32)),
            [26, 1, 1]
        );
        assert_eq!(
            dispatch_groups(
                DispatchDomain::planar(vk::Extent2D {
                    width: 800,
                    height: 601
                }),
                local
            ),
            [25, 76, 1]
        );
    }

    #[test]
    fn exact_multiple_has_no_spare_group() {
        assert_eq!(
            dispatch_groups(DispatchDomain::linear(64), WorkgroupSize::linear(64)),
            [1, 1, 1]
        );
        assert_eq!(
            dispatch_groups(DispatchDomain::linear(1), WorkgroupSize::linear(64)),
            [1, 1, 1]
        );
    }

    #[test]
    fn empty_domain_dispatches_nothing() {
        assert_eq!(
            dispatch_groups(DispatchDomain::linear(0), WorkgroupSize::linear(64))[0],
            0
        );
    }

    #[test]
    fn invocations_multiply() {
        assert_eq!(WorkgroupSize::planar(32, 8).invocations(), 256);
    }
}
