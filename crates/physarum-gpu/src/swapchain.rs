//! Swapchain management.
//!
//! The frame loop never recreates the swapchain. An out-of-date or
//! suboptimal result from acquire or present is reported as
//! [`GpuError::SwapchainOutOfDate`] and ends the run.

use crate::arena::{ArenaEntry, ResourceArena};
use crate::error::{GpuError, Result};
use crate::image_state::COLOR_RANGE;
use ash::vk;

/// Swapchain handle plus its images and views.
///
/// The swapchain and the views are owned by the arena passed to [`Swapchain::new`].
pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
}

/// Everything needed to create a swapchain for one surface.
pub struct SwapchainDesc {
    pub surface: vk::SurfaceKHR,
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub queue_family: u32,
}

impl Swapchain {
    /// Create a swapchain and views for each of its images.
    ///
    /// # Safety
    /// All handles must be valid.
    pub unsafe fn new(
        device: &ash::Device,
        loader: &ash::khr::swapchain::Device,
        desc: &SwapchainDesc,
        arena: &mut ResourceArena,
    ) -> Result<Self> {
        let caps = &desc.capabilities;
        let mut image_count = caps.min_image_count + 1;
        if caps.max_image_count > 0 && image_count > caps.max_image_count {
            image_count = caps.max_image_count;
        }

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(desc.surface)
            .min_image_count(image_count)
            .image_format(desc.surface_format.format)
            .image_color_space(desc.surface_format.color_space)
            .image_extent(desc.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .queue_family_indices(std::slice::from_ref(&desc.queue_family))
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(desc.present_mode)
            .clipped(true);

        let swapchain = loader
            .create_swapchain(&create_info, None)
            .map_err(|e| GpuError::SwapchainCreation(e.to_string()))?;
        arena.push(ArenaEntry::Swapchain(loader.clone(), swapchain));

        let images = loader.get_swapchain_images(swapchain)?;

        let mut image_views = Vec::with_capacity(images.len());
        for &image in &images {
            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(desc.surface_format.format)
                .subresource_range(COLOR_RANGE);
            let view = device.create_image_view(&view_info, None)?;
            arena.push(ArenaEntry::ImageView(view));
            image_views.push(view);
        }

        tracing::info!(
            "Swapchain created: {}x{} {:?} {:?}, {} images",
            desc.extent.width,
            desc.extent.height,
            desc.surface_format.format,
            desc.present_mode,
            images.len()
        );

        Ok(Self {
            swapchain,
            images,
            image_views,
            format: desc.surface_format.format,
            extent: desc.extent,
        })
    }

    /// Acquire the next image, signalling `semaphore` once it is writable.
    ///
    /// # Safety
    /// All handles must be valid.
    pub unsafe fn acquire_next_image(
        &self,
        loader: &ash::khr::swapchain::Device,
        semaphore: vk::Semaphore,
    ) -> Result<u32> {
        let result =
            loader.acquire_next_image(self.swapchain, u64::MAX, semaphore, vk::Fence::null());
        acquire_outcome(result)
    }

    /// Queue `image_index` for presentation once `wait` is signaled.
    ///
    /// # Safety
    /// All handles must be valid.
    pub unsafe fn present(
        &self,
        loader: &ash::khr::swapchain::Device,
        queue: vk::Queue,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> Result<()> {
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(std::slice::from_ref(&wait))
            .swapchains(std::slice::from_ref(&self.swapchain))
            .image_indices(std::slice::from_ref(&image_index));

        present_outcome(loader.queue_present(queue, &present_info))
    }
}

fn acquire_outcome(result: std::result::Result<(u32, bool), vk::Result>) -> Result<u32> {
    match result {
        Ok((index, false)) => Ok(index),
        Ok((_, true)) => Err(GpuError::SwapchainOutOfDate("acquire reported suboptimal")),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
            Err(GpuError::SwapchainOutOfDate("acquire reported out of date"))
        }
        Err(e) => Err(e.into()),
    }
}

fn present_outcome(result: std::result::Result<bool, vk::Result>) -> Result<()> {
    match result {
        Ok(false) => Ok(()),
        Ok(true) => Err(GpuError::SwapchainOutOfDate("present reported suboptimal")),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
            Err(GpuError::SwapchainOutOfDate("present reported out of date"))
        }
        Err(e) => Err(e.into()),
    }
}

/// Select the surface format, preferring 8-bit sRGB.
pub fn select_surface_format(available: &[vk::SurfaceFormatKHR]) -> Result<vk::SurfaceFormatKHR> {
    available
        .iter()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| available.first())
        .copied()
        .ok_or_else(|| GpuError::SwapchainCreation("surface reports no formats".to_string()))
}

/// Select the present mode. FIFO is the only mode guaranteed to exist.
pub fn select_present_mode(available: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if vsync {
        return vk::PresentModeKHR::FIFO;
    }
    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        .into_iter()
        .find(|mode| available.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Swapchain extent for a window of the given size.
pub fn calculate_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    desired_width: u32,
    desired_height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: desired_width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: desired_height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suboptimal_is_fatal() {
        assert_eq!(acquire_outcome(Ok((2, false))).unwrap(), 2);
        assert!(matches!(
            acquire_outcome(Ok((2, true))),
            Err(GpuError::SwapchainOutOfDate(_))
        ));
        assert!(matches!(
            present_outcome(Ok(true)),
            Err(GpuError::SwapchainOutOfDate(_))
        ));
    }

    #[test]
    fn out_of_date_is_fatal() {
        assert!(matches!(
            acquire_outcome(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)),
            Err(GpuError::SwapchainOutOfDate(_))
        ));
        assert!(matches!(
            present_outcome(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)),
            Err(GpuError::SwapchainOutOfDate(_))
        ));
        assert!(matches!(
            present_outcome(Err(vk::Result::ERROR_DEVICE_LOST)),
            Err(GpuError::Vulkan(vk::Result::ERROR_DEVICE_LOST))
        ));
    }

    #[test]
    fn prefers_srgb_format() {
        let unorm = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let srgb = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };

        assert_eq!(select_surface_format(&[unorm, srgb]).unwrap(), srgb);
        assert_eq!(select_surface_format(&[unorm]).unwrap(), unorm);
        assert!(select_surface_format(&[]).is_err());
    }

    #[test]
    fn present_mode_fallbacks() {
        let all = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::MAILBOX,
        ];
        assert_eq!(select_present_mode(&all, true), vk::PresentModeKHR::FIFO);
        assert_eq!(select_present_mode(&all, false), vk::PresentModeKHR::MAILBOX);
        assert_eq!(
            select_present_mode(&[vk::PresentModeKHR::FIFO], false),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn extent_clamped_when_surface_undecided() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 1024,
                height: 1024,
            },
            ..Default::default()
        };

        let extent = calculate_extent(&caps, 4000, 600);
        assert_eq!((extent.width, extent.height), (1024, 600));
    }
}
