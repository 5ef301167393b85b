//! Descriptor set layouts and pools.

use crate::error::{GpuError, Result};
use ash::vk;

/// Descriptor set layout builder.
///
/// Binding numbers must be unique; [`Self::build`] rejects duplicates.
#[derive(Default)]
pub struct DescriptorSetLayoutBuilder<'a> {
    bindings: Vec<vk::DescriptorSetLayoutBinding<'a>>,
}

impl<'a> DescriptorSetLayoutBuilder<'a> {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a binding.
    #[must_use]
    pub fn binding(
        mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        stage_flags: vk::ShaderStageFlags,
    ) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding)
                .descriptor_type(descriptor_type)
                .descriptor_count(1)
                .stage_flags(stage_flags),
        );
        self
    }

    /// Add a storage buffer binding.
    #[must_use]
    pub fn storage_buffer(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.binding(binding, vk::DescriptorType::STORAGE_BUFFER, stage_flags)
    }

    /// Add a storage image binding.
    #[must_use]
    pub fn storage_image(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.binding(binding, vk::DescriptorType::STORAGE_IMAGE, stage_flags)
    }

    /// Check the declared bindings.
    pub fn validate(&self) -> Result<()> {
        for (i, a) in self.bindings.iter().enumerate() {
            if self.bindings[..i].iter().any(|b| b.binding == a.binding) {
                return Err(GpuError::DescriptorSetup(format!(
                    "binding {} declared twice",
                    a.binding
                )));
            }
        }
        Ok(())
    }

    /// Pool sizes needed to allocate `sets` sets of this layout.
    pub fn pool_sizes(&self, sets: u32) -> Vec<vk::DescriptorPoolSize> {
        let mut sizes: Vec<vk::DescriptorPoolSize> = Vec::new();
        for binding in &self.bindings {
            let count = binding.descriptor_count * sets;
            match sizes.iter_mut().find(|s| s.ty == binding.descriptor_type) {
                Some(size) => size.descriptor_count += count,
                None => sizes.push(
                    vk::DescriptorPoolSize::default()
                        .ty(binding.descriptor_type)
                        .descriptor_count(count),
                ),
            }
        }
        sizes
    }

    /// Build the descriptor set layout.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn build(&self, device: &ash::Device) -> Result<vk::DescriptorSetLayout> {
        self.validate()?;
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&self.bindings);
        let layout = device.create_descriptor_set_layout(&layout_info, None)?;
        Ok(layout)
    }
}

/// Create a pool sized for `max_sets` sets.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_descriptor_pool(
    device: &ash::Device,
    max_sets: u32,
    pool_sizes: &[vk::DescriptorPoolSize],
) -> Result<vk::DescriptorPool> {
    let create_info = vk::DescriptorPoolCreateInfo::default()
        .max_sets(max_sets)
        .pool_sizes(pool_sizes);

    let pool = device.create_descriptor_pool(&create_info, None)?;
    Ok(pool)
}

/// Allocate one descriptor set from `pool`.
///
/// # Safety
/// The device, pool and layout must be valid.
pub unsafe fn allocate_descriptor_set(
    device: &ash::Device,
    pool: vk::DescriptorPool,
    layout: vk::DescriptorSetLayout,
) -> Result<vk::DescriptorSet> {
    let alloc_info = vk::DescriptorSetAllocateInfo::default()
        .descriptor_pool(pool)
        .set_layouts(std::slice::from_ref(&layout));

    device
        .allocate_descriptor_sets(&alloc_info)?
        .into_iter()
        .next()
        .ok_or_else(|| GpuError::DescriptorSetup("pool returned no descriptor set".to_string()))
}
