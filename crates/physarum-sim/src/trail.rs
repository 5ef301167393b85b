//! Trail images and the sampler used to display them.

use ash::vk;
use gpu_allocator::MemoryLocation;
use physarum_gpu::image_state::COLOR_RANGE;
use physarum_gpu::{ArenaEntry, GpuContext, ResourceArena, Result, TrackedImage, TRAIL_FORMAT};

/// Create one trail image and its view, owned by `arena`.
///
/// The image starts in the undefined layout.
pub fn create_trail_image(
    gpu: &GpuContext,
    arena: &mut ResourceArena,
    name: &'static str,
    extent: vk::Extent2D,
) -> Result<TrackedImage> {
    let image_info = vk::ImageCreateInfo::default()
        .image_type(vk::ImageType::TYPE_2D)
        .format(TRAIL_FORMAT)
        .extent(vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(
            vk::ImageUsageFlags::STORAGE
                | vk::ImageUsageFlags::SAMPLED
                | vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::TRANSFER_DST,
        )
        .initial_layout(vk::ImageLayout::UNDEFINED);

    let image = gpu
        .allocator()
        .lock()
        .create_image(&image_info, MemoryLocation::GpuOnly, name)?;
    let image = arena.adopt_image(image);

    let view_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(TRAIL_FORMAT)
        .subresource_range(COLOR_RANGE);
    let view = unsafe { gpu.device().create_image_view(&view_info, None)? };
    arena.push(ArenaEntry::ImageView(view));

    Ok(TrackedImage::new(name, image, view, TRAIL_FORMAT, extent))
}

/// Record a clear to zero, leaving the image in transfer-destination layout.
///
/// # Safety
/// The command buffer must be recording.
pub unsafe fn record_clear(device: &ash::Device, cmd: vk::CommandBuffer, image: &mut TrackedImage) {
    image.record_transition(device, cmd, physarum_gpu::ImageAccess::TRANSFER_DST);
    device.cmd_clear_color_image(
        cmd,
        image.image,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        &vk::ClearColorValue::default(),
        &[COLOR_RANGE],
    );
}

/// Linear sampler returning black outside the image.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_trail_sampler(
    device: &ash::Device,
    arena: &mut ResourceArena,
) -> Result<vk::Sampler> {
    let info = vk::SamplerCreateInfo::default()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
        .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_BORDER)
        .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_BORDER)
        .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_BORDER)
        .border_color(vk::BorderColor::FLOAT_OPAQUE_BLACK)
        .max_lod(0.0);
    let sampler = device.create_sampler(&info, None)?;
    arena.push(ArenaEntry::Sampler(sampler));
    Ok(sampler)
}
