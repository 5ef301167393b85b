//! Window surface and swapchain setup.

use crate::arena::{ArenaEntry, ResourceArena};
use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::swapchain::{
    calculate_extent, select_present_mode, select_surface_format, Swapchain, SwapchainDesc,
};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

/// A window surface and the loaders needed to present to it.
///
/// The surface itself is owned by the arena passed to [`SurfaceContext::from_window`].
pub struct SurfaceContext {
    pub surface: vk::SurfaceKHR,
    pub surface_loader: ash::khr::surface::Instance,
    pub swapchain_loader: ash::khr::swapchain::Device,
}

impl SurfaceContext {
    /// Create a surface for `window`.
    ///
    /// Fails if the context's queue cannot present to the new surface.
    ///
    /// # Safety
    /// The window must outlive the surface.
    pub unsafe fn from_window<W>(
        gpu: &GpuContext,
        window: &W,
        arena: &mut ResourceArena,
    ) -> Result<Self>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        if !gpu.is_windowed() {
            return Err(GpuError::SurfaceCreation(
                "context was created without swapchain support".to_string(),
            ));
        }

        let display = window
            .display_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("display handle: {e}")))?;
        let window_handle = window
            .window_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("window handle: {e}")))?;

        let surface = ash_window::create_surface(
            gpu.entry(),
            gpu.instance(),
            display.as_raw(),
            window_handle.as_raw(),
            None,
        )
        .map_err(|e| GpuError::SurfaceCreation(e.to_string()))?;

        let surface_loader = ash::khr::surface::Instance::new(gpu.entry(), gpu.instance());
        arena.push(ArenaEntry::Surface(surface_loader.clone(), surface));

        let supported = surface_loader.get_physical_device_surface_support(
            gpu.physical_device(),
            gpu.queue_family(),
            surface,
        )?;
        if !supported {
            return Err(GpuError::SurfaceCreation(format!(
                "queue family {} cannot present to this surface",
                gpu.queue_family()
            )));
        }

        let swapchain_loader = ash::khr::swapchain::Device::new(gpu.instance(), gpu.device());

        Ok(Self {
            surface,
            surface_loader,
            swapchain_loader,
        })
    }

    /// Query surface capabilities.
    pub fn capabilities(&self, gpu: &GpuContext) -> Result<SurfaceCapabilities> {
        unsafe {
            let caps = self
                .surface_loader
                .get_physical_device_surface_capabilities(gpu.physical_device(), self.surface)?;

            let formats = self
                .surface_loader
                .get_physical_device_surface_formats(gpu.physical_device(), self.surface)?;

            let present_modes = self
                .surface_loader
                .get_physical_device_surface_present_modes(gpu.physical_device(), self.surface)?;

            Ok(SurfaceCapabilities {
                capabilities: caps,
                formats,
                present_modes,
            })
        }
    }

    /// Create the swapchain for this surface.
    ///
    /// # Safety
    /// The GPU context must be valid.
    pub unsafe fn create_swapchain(
        &self,
        gpu: &GpuContext,
        width: u32,
        height: u32,
        vsync: bool,
        arena: &mut ResourceArena,
    ) -> Result<Swapchain> {
        let caps = self.capabilities(gpu)?;

        let desc = SwapchainDesc {
            surface: self.surface,
            capabilities: caps.capabilities,
            surface_format: select_surface_format(&caps.formats)?,
            present_mode: select_present_mode(&caps.present_modes, vsync),
            extent: calculate_extent(&caps.capabilities, width, height),
            queue_family: gpu.queue_family(),
        };

        Swapchain::new(gpu.device(), &self.swapchain_loader, &desc, arena)
    }
}

/// Surface capabilities query result.
pub struct SurfaceCapabilities {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}
