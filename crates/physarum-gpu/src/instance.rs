//! Vulkan instance creation and physical device selection.

use crate::debug;
use crate::error::{GpuError, Result};
use ash::vk;
use std::ffi::{c_char, CStr, CString};

const ENGINE_NAME: &CStr = c"physarum";

/// Instance extensions needed to present to a window on this platform.
pub fn surface_instance_extensions() -> Vec<&'static CStr> {
    vec![
        ash::khr::surface::NAME,
        #[cfg(target_os = "windows")]
        ash::khr::win32_surface::NAME,
        #[cfg(target_os = "linux")]
        ash::khr::xlib_surface::NAME,
        #[cfg(target_os = "linux")]
        ash::khr::wayland_surface::NAME,
        #[cfg(target_os = "macos")]
        ash::ext::metal_surface::NAME,
    ]
}

/// Validation layers requested when validation is enabled.
pub fn validation_layers() -> Vec<&'static CStr> {
    vec![c"VK_LAYER_KHRONOS_validation"]
}

/// Debug utils loader and the messenger it created.
pub type DebugMessenger = (ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT);

/// An instance plus the optional validation messenger created with it.
pub struct InstanceBundle {
    pub instance: ash::Instance,
    pub debug: Option<DebugMessenger>,
}

/// Create a Vulkan 1.3 instance.
///
/// `windowed` adds the platform surface extensions. Validation is silently
/// downgraded to off when the Khronos layer is not installed.
///
/// # Safety
/// The entry must be a valid Vulkan entry point.
pub unsafe fn create_instance(
    entry: &ash::Entry,
    app_name: &str,
    enable_validation: bool,
    windowed: bool,
) -> Result<InstanceBundle> {
    let app_name = CString::new(app_name)
        .map_err(|e| GpuError::InvalidState(format!("Application name contains NUL: {e}")))?;

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(ENGINE_NAME)
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(vk::API_VERSION_1_3);

    let available_layers = entry.enumerate_instance_layer_properties()?;
    let layers: Vec<&CStr> = if enable_validation {
        validation_layers()
            .into_iter()
            .filter(|wanted| {
                let found = available_layers
                    .iter()
                    .any(|props| props.layer_name_as_c_str().ok() == Some(*wanted));
                if !found {
                    tracing::warn!("Validation layer {wanted:?} not available");
                }
                found
            })
            .collect()
    } else {
        Vec::new()
    };
    let validation = !layers.is_empty();

    let mut extensions: Vec<&CStr> = if windowed {
        surface_instance_extensions()
    } else {
        Vec::new()
    };
    if validation {
        extensions.push(ash::ext::debug_utils::NAME);
    }
    #[cfg(target_os = "macos")]
    extensions.push(ash::khr::portability_enumeration::NAME);

    let extension_names: Vec<*const c_char> = extensions.iter().map(|e| e.as_ptr()).collect();
    let layer_names: Vec<*const c_char> = layers.iter().map(|l| l.as_ptr()).collect();

    #[cfg(target_os = "macos")]
    let create_flags = vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
    #[cfg(not(target_os = "macos"))]
    let create_flags = vk::InstanceCreateFlags::empty();

    // Also covers messages emitted during vkCreateInstance itself.
    let mut instance_messenger_info = debug::messenger_create_info();
    let mut create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extension_names)
        .enabled_layer_names(&layer_names)
        .flags(create_flags);
    if validation {
        create_info = create_info.push_next(&mut instance_messenger_info);
    }

    let instance = entry.create_instance(&create_info, None)?;

    let debug = if validation {
        let loader = ash::ext::debug_utils::Instance::new(entry, &instance);
        match debug::create_debug_messenger(&loader) {
            Ok(messenger) => Some((loader, messenger)),
            Err(e) => {
                instance.destroy_instance(None);
                return Err(e);
            }
        }
    } else {
        None
    };

    tracing::debug!(validation, windowed, "Vulkan instance created");

    Ok(InstanceBundle { instance, debug })
}

/// Select the highest scoring Vulkan 1.3 physical device.
///
/// # Safety
/// The instance must be valid.
pub unsafe fn select_physical_device(instance: &ash::Instance) -> Result<vk::PhysicalDevice> {
    instance
        .enumerate_physical_devices()?
        .into_iter()
        .map(|device| (score_physical_device(instance, device), device))
        .filter(|(score, _)| *score >= 0)
        .max_by_key(|(score, _)| *score)
        .map(|(_, device)| device)
        .ok_or(GpuError::NoSuitableDevice)
}

/// Score a physical device. Negative scores are rejected.
unsafe fn score_physical_device(instance: &ash::Instance, device: vk::PhysicalDevice) -> i64 {
    let properties = instance.get_physical_device_properties(device);

    if !supports_vulkan_1_3(properties.api_version) {
        return -1;
    }

    let mut score = match properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 50,
        _ => 0,
    };

    let memory = instance.get_physical_device_memory_properties(device);
    let vram_gb: u64 = memory
        .memory_heaps
        .iter()
        .take(memory.memory_heap_count as usize)
        .filter(|h| h.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
        .map(|h| h.size >> 30)
        .sum();
    score += i64::try_from(vram_gb).unwrap_or(i64::MAX / 2);

    score
}

/// Whether a packed API version is at least 1.3.
pub const fn supports_vulkan_1_3(api_version: u32) -> bool {
    let major = vk::api_version_major(api_version);
    let minor = vk::api_version_minor(api_version);
    major > 1 || (major == 1 && minor >= 3)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_version_gate() {
        assert!(supports_vulkan_1_3(vk::API_VERSION_1_3));
        assert!(supports_vulkan_1_3(vk::make_api_version(0, 1, 4, 0)));
        assert!(!supports_vulkan_1_3(vk::API_VERSION_1_2));
        assert!(!supports_vulkan_1_3(vk::API_VERSION_1_0));
    }

    #[test]
    fn surface_extensions_include_khr_surface() {
        assert!(surface_instance_extensions().contains(&ash::khr::surface::NAME));
    }
}
