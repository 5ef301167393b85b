//! GPU context management.

use crate::capabilities::GpuCapabilities;
use crate::error::{GpuError, Result};
use crate::instance::{create_instance, select_physical_device, DebugMessenger};
use crate::memory::GpuAllocator;
use ash::vk;
use parking_lot::Mutex;
use std::ffi::{c_char, CStr};
use std::sync::Arc;

/// Instance, device, allocator and the single queue the frame loop submits to.
///
/// The queue family supports both graphics and compute, so every pass of a
/// frame goes into one command buffer on one queue.
pub struct GpuContext {
    pub(crate) entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    debug: Option<DebugMessenger>,
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) device: Arc<ash::Device>,
    pub(crate) capabilities: GpuCapabilities,
    pub(crate) allocator: Arc<Mutex<GpuAllocator>>,
    pub(crate) queue_family: u32,
    pub(crate) queue: vk::Queue,
    windowed: bool,
}

impl GpuContext {
    /// Get the Vulkan device handle.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Get the Vulkan entry point.
    pub const fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    /// Get the Vulkan instance handle.
    pub const fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// Get the physical device handle.
    pub const fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Get GPU capabilities.
    pub const fn capabilities(&self) -> &GpuCapabilities {
        &self.capabilities
    }

    /// The graphics + compute queue.
    pub const fn queue(&self) -> vk::Queue {
        self.queue
    }

    /// Family index of [`Self::queue`].
    pub const fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Whether the device was created with swapchain support.
    pub const fn is_windowed(&self) -> bool {
        self.windowed
    }

    /// Get access to the GPU allocator.
    pub fn allocator(&self) -> &Mutex<GpuAllocator> {
        &self.allocator
    }

    /// Block until the device has finished all submitted work.
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device.device_wait_idle()?;
        }
        Ok(())
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();

            // All VkDeviceMemory must be returned before the device goes away.
            self.allocator.lock().shutdown();

            self.device.destroy_device(None);
            if let Some((loader, messenger)) = self.debug.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        tracing::debug!("GPU context destroyed");
    }
}

/// Builder for creating a GPU context.
pub struct GpuContextBuilder {
    app_name: String,
    enable_validation: bool,
    windowed: bool,
    workgroup_invocations: u32,
}

impl Default for GpuContextBuilder {
    fn default() -> Self {
        Self {
            app_name: "physarum".to_string(),
            enable_validation: cfg!(debug_assertions),
            windowed: true,
            workgroup_invocations: 256,
        }
    }
}

impl GpuContextBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    #[must_use]
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Enable or disable validation layers.
    #[must_use]
    pub const fn validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Request surface and swapchain extensions. Headless contexts skip them.
    #[must_use]
    pub const fn windowed(mut self, windowed: bool) -> Self {
        self.windowed = windowed;
        self
    }

    /// Largest compute local size the device must support.
    #[must_use]
    pub const fn workgroup_invocations(mut self, invocations: u32) -> Self {
        self.workgroup_invocations = invocations;
        self
    }

    /// Build the GPU context.
    pub fn build(self) -> Result<GpuContext> {
        let entry = unsafe { ash::Entry::load() }.map_err(|e| GpuError::Loader(e.to_string()))?;

        let bundle = unsafe {
            create_instance(&entry, &self.app_name, self.enable_validation, self.windowed)
        }?;
        let instance = bundle.instance;
        let debug = bundle.debug;

        // Everything below must unwind the instance on failure.
        let destroy_instance = |debug: Option<DebugMessenger>| unsafe {
            if let Some((loader, messenger)) = debug {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            instance.destroy_instance(None);
        };

        let selected = unsafe { self.select(&instance) };
        let (physical_device, capabilities, queue_family) = match selected {
            Ok(selected) => selected,
            Err(e) => {
                destroy_instance(debug);
                return Err(e);
            }
        };

        tracing::info!("Selected GPU: {}", capabilities.summary());

        let device = match unsafe {
            create_device(&instance, physical_device, queue_family, self.windowed)
        } {
            Ok(device) => Arc::new(device),
            Err(e) => {
                destroy_instance(debug);
                return Err(e);
            }
        };
        let queue = unsafe { device.get_device_queue(queue_family, 0) };

        let allocator = match unsafe {
            GpuAllocator::new(&instance, Arc::clone(&device), physical_device)
        } {
            Ok(allocator) => allocator,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                destroy_instance(debug);
                return Err(e);
            }
        };

        Ok(GpuContext {
            entry,
            instance,
            debug,
            physical_device,
            device,
            capabilities,
            allocator: Arc::new(Mutex::new(allocator)),
            queue_family,
            queue,
            windowed: self.windowed,
        })
    }

    unsafe fn select(
        &self,
        instance: &ash::Instance,
    ) -> Result<(vk::PhysicalDevice, GpuCapabilities, u32)> {
        let physical_device = select_physical_device(instance)?;
        let capabilities = GpuCapabilities::query(instance, physical_device);

        if !capabilities.meets_requirements(self.workgroup_invocations) {
            tracing::error!(
                "{} does not meet requirements (workgroup invocations {})",
                capabilities.summary(),
                self.workgroup_invocations
            );
            return Err(GpuError::NoSuitableDevice);
        }

        let queue_family = find_queue_family(instance, physical_device)?;
        Ok((physical_device, capabilities, queue_family))
    }
}

/// First queue family that supports both graphics and compute.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn find_queue_family(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> Result<u32> {
    let families = instance.get_physical_device_queue_family_properties(physical_device);
    let wanted = vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE;

    families
        .iter()
        .position(|family| family.queue_flags.contains(wanted))
        .and_then(|index| u32::try_from(index).ok())
        .ok_or(GpuError::NoSuitableDevice)
}

fn required_device_extensions(windowed: bool) -> Vec<&'static CStr> {
    let mut extensions = Vec::new();
    if windowed {
        extensions.push(ash::khr::swapchain::NAME);
    }
    #[cfg(target_os = "macos")]
    extensions.push(ash::khr::portability_subset::NAME);
    extensions
}

/// Create the logical device with the Vulkan 1.3 features the frame loop uses.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn create_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    queue_family: u32,
    windowed: bool,
) -> Result<ash::Device> {
    let available: Vec<String> = instance
        .enumerate_device_extension_properties(physical_device)?
        .iter()
        .filter_map(|ext| ext.extension_name_as_c_str().ok())
        .map(|name| name.to_string_lossy().into_owned())
        .collect();

    let extensions = required_device_extensions(windowed);
    for ext in &extensions {
        let name = ext.to_string_lossy();
        if !available.iter().any(|a| *a == name) {
            return Err(GpuError::ExtensionNotSupported(name.into_owned()));
        }
    }
    let extension_names: Vec<*const c_char> = extensions.iter().map(|e| e.as_ptr()).collect();

    let queue_priority = 1.0_f32;
    let queue_info = vk::DeviceQueueCreateInfo::default()
        .queue_family_index(queue_family)
        .queue_priorities(std::slice::from_ref(&queue_priority));

    let mut vulkan_1_3_features = vk::PhysicalDeviceVulkan13Features::default()
        .dynamic_rendering(true)
        .synchronization2(true);

    let mut features2 = vk::PhysicalDeviceFeatures2::default().push_next(&mut vulkan_1_3_features);

    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(std::slice::from_ref(&queue_info))
        .enabled_extension_names(&extension_names)
        .push_next(&mut features2);

    let device = instance.create_device(physical_device, &device_create_info, None)?;
    Ok(device)
}
