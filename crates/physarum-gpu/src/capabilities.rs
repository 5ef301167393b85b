//! GPU capability detection.

use crate::instance::supports_vulkan_1_3;
use ash::vk;
use std::ffi::CStr;

/// Format used by the trail images.
pub const TRAIL_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
    /// Identify vendor from PCI vendor ID.
    pub const fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

/// Detected GPU capabilities.
#[derive(Debug, Clone)]
pub struct GpuCapabilities {
    pub vendor: GpuVendor,
    pub device_name: String,
    pub api_version: u32,
    pub driver_version: u32,
    /// Device-local memory in MB
    pub device_local_memory_mb: u64,
    /// Largest push-constant block the pipeline layout may declare
    pub max_push_constants_size: u32,
    pub max_compute_workgroup_size: [u32; 3],
    pub max_compute_workgroup_invocations: u32,
    /// Whether [`TRAIL_FORMAT`] supports optimal-tiling storage and sampling
    pub trail_format_storage: bool,
}

impl GpuCapabilities {
    /// Query capabilities from a physical device.
    ///
    /// # Safety
    /// The instance and physical device must be valid.
    pub unsafe fn query(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Self {
        let properties = instance.get_physical_device_properties(physical_device);
        let memory_properties = instance.get_physical_device_memory_properties(physical_device);
        let format_properties =
            instance.get_physical_device_format_properties(physical_device, TRAIL_FORMAT);

        let device_name = CStr::from_ptr(properties.device_name.as_ptr())
            .to_string_lossy()
            .into_owned();

        let device_local_memory_mb: u64 = memory_properties
            .memory_heaps
            .iter()
            .take(memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size / (1024 * 1024))
            .sum();

        let trail_format_storage = format_properties.optimal_tiling_features.contains(
            vk::FormatFeatureFlags::STORAGE_IMAGE
                | vk::FormatFeatureFlags::SAMPLED_IMAGE
                | vk::FormatFeatureFlags::TRANSFER_SRC
                | vk::FormatFeatureFlags::TRANSFER_DST,
        );

        Self {
            vendor: GpuVendor::from_vendor_id(properties.vendor_id),
            device_name,
            api_version: properties.api_version,
            driver_version: properties.driver_version,
            device_local_memory_mb,
            max_push_constants_size: properties.limits.max_push_constants_size,
            max_compute_workgroup_size: properties.limits.max_compute_work_group_size,
            max_compute_workgroup_invocations: properties.limits.max_compute_work_group_invocations,
            trail_format_storage,
        }
    }

    /// Check the device can run the simulation passes.
    ///
    /// `workgroup_invocations` is the largest local size any pass declares.
    pub fn meets_requirements(&self, workgroup_invocations: u32) -> bool {
        supports_vulkan_1_3(self.api_version)
            && self.trail_format_storage
            && self.max_push_constants_size >= 128
            && self.max_compute_workgroup_invocations >= workgroup_invocations
    }

    /// Get a human-readable summary of capabilities.
    pub fn summary(&self) -> String {
        format!(
            "{} ({:?}) - Vulkan {}.{}.{} - {} MB VRAM",
            self.device_name,
            self.vendor,
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version),
            self.device_local_memory_mb,
        )
    }
}
