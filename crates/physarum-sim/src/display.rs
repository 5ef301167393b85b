//! Presentation pass: draw the final read image into a swapchain image.

use ash::vk;
use physarum_gpu::image_state::{barrier, record_image_barriers};
use physarum_gpu::pipeline::GraphicsPipelineConfig;
use physarum_gpu::{ArenaEntry, GraphicsPipeline, ImageAccess, ResourceArena, Result, TrackedImage};

use crate::push::{DisplayPushConstants, PushConstantBlock};
use crate::rebind::{BindingSlot, BoundResources, DescriptorRebinder, PassDescriptor, SlotKind};
use crate::trail::create_trail_sampler;
use crate::viewport::fit_viewport;

const SLOTS: [BindingSlot; 1] = [BindingSlot::new(0, SlotKind::SampledRead)];

/// Swapchain image a frame draws into.
#[derive(Debug, Clone, Copy)]
pub struct PresentTarget {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub extent: vk::Extent2D,
}

/// Full-screen triangle sampling the trail through the camera.
pub struct DisplayPass {
    pipeline: GraphicsPipeline,
    descriptor: PassDescriptor,
    sampler: vk::Sampler,
}

impl DisplayPass {
    /// # Safety
    /// The device must be valid and support dynamic rendering.
    pub unsafe fn new(
        device: &ash::Device,
        arena: &mut ResourceArena,
        color_format: vk::Format,
    ) -> Result<Self> {
        let sampler = create_trail_sampler(device, arena)?;
        let descriptor =
            PassDescriptor::new(device, arena, "display", vk::ShaderStageFlags::FRAGMENT, &SLOTS)?;

        let config = GraphicsPipelineConfig::fullscreen(
            physarum_shaders::display_vert(),
            physarum_shaders::display_frag(),
            color_format,
        );
        let pipeline = GraphicsPipeline::new(
            device,
            &config,
            &[descriptor.layout],
            &[DisplayPushConstants::range()],
        )?;
        arena.push(ArenaEntry::PipelineLayout(pipeline.layout));
        arena.push(ArenaEntry::Pipeline(pipeline.pipeline));

        tracing::info!("Display pass ready ({color_format:?})");
        Ok(Self {
            pipeline,
            descriptor,
            sampler,
        })
    }

    /// Record the draw into `target`, leaving it ready to present.
    ///
    /// `trail` must already be in [`ImageAccess::FRAGMENT_SAMPLED`].
    ///
    /// # Safety
    /// The command buffer must be recording, outside any rendering scope.
    pub unsafe fn record(
        &self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        rebinder: &mut DescriptorRebinder,
        trail: &TrackedImage,
        target: PresentTarget,
        push: &DisplayPushConstants,
    ) -> Result<()> {
        let resources = BoundResources {
            read: trail.view,
            sampler: Some(self.sampler),
            ..BoundResources::default()
        };
        rebinder.rebind(device, &self.descriptor, &resources)?;

        record_image_barriers(
            device,
            cmd,
            &[barrier(
                target.image,
                ImageAccess::SWAPCHAIN_ACQUIRED,
                ImageAccess::COLOR_ATTACHMENT,
            )],
        );

        let clear = vk::ClearValue {
            color: vk::ClearColorValue {
                float32: [0.0, 0.0, 0.0, 1.0],
            },
        };
        let attachment = vk::RenderingAttachmentInfo::default()
            .image_view(target.view)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(clear);
        let rendering = vk::RenderingInfo::default()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: target.extent,
            })
            .layer_count(1)
            .color_attachments(std::slice::from_ref(&attachment));

        device.cmd_begin_rendering(cmd, &rendering);

        let (viewport, scissor) = fit_viewport(trail.extent, target.extent);
        device.cmd_set_viewport(cmd, 0, &[viewport]);
        device.cmd_set_scissor(cmd, 0, &[scissor]);

        device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline.pipeline);
        device.cmd_bind_descriptor_sets(
            cmd,
            vk::PipelineBindPoint::GRAPHICS,
            self.pipeline.layout,
            0,
            &[self.descriptor.set],
            &[],
        );
        push.push(device, cmd, self.pipeline.layout);
        device.cmd_draw(cmd, 3, 1, 0, 0);

        device.cmd_end_rendering(cmd);

        record_image_barriers(
            device,
            cmd,
            &[barrier(
                target.image,
                ImageAccess::COLOR_ATTACHMENT,
                ImageAccess::PRESENT,
            )],
        );
        Ok(())
    }
}
