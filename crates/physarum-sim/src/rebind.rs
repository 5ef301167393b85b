//! Descriptor rebinding.
//!
//! A [`PassDescriptor`] fixes which binding numbers a pass uses and what kind
//! of resource each one takes. The resources themselves are looked up through
//! the current role assignment and rewritten before every recording of the
//! pass, because the image behind "read" changes from pass to pass.

use ash::vk;
use physarum_gpu::descriptors::{allocate_descriptor_set, create_descriptor_pool};
use physarum_gpu::{ArenaEntry, DescriptorSetLayoutBuilder, GpuError, ResourceArena, Result};

/// What a binding slot is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// Storage image holding the read role.
    ReadImage,
    /// Storage image holding the write role.
    WriteImage,
    /// Storage buffer of agents.
    Agents,
    /// Read role sampled through a combined image sampler.
    SampledRead,
}

impl SlotKind {
    const fn descriptor_type(self) -> vk::DescriptorType {
        match self {
            Self::ReadImage | Self::WriteImage => vk::DescriptorType::STORAGE_IMAGE,
            Self::Agents => vk::DescriptorType::STORAGE_BUFFER,
            Self::SampledRead => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        }
    }
}

/// One binding number and what it takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingSlot {
    pub binding: u32,
    pub kind: SlotKind,
}

impl BindingSlot {
    pub const fn new(binding: u32, kind: SlotKind) -> Self {
        Self { binding, kind }
    }
}

/// Resources the current role assignment resolves to.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoundResources {
    pub read: vk::ImageView,
    pub write: vk::ImageView,
    pub agents: Option<(vk::Buffer, vk::DeviceSize)>,
    pub sampler: Option<vk::Sampler>,
}

/// A single descriptor write, before conversion to Vulkan structs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorWrite {
    StorageImage {
        binding: u32,
        view: vk::ImageView,
    },
    StorageBuffer {
        binding: u32,
        buffer: vk::Buffer,
        range: vk::DeviceSize,
    },
    SampledImage {
        binding: u32,
        view: vk::ImageView,
        sampler: vk::Sampler,
    },
}

/// A pass's descriptor set and the fixed slots it declares.
#[derive(Debug, Clone)]
pub struct PassDescriptor {
    pub name: &'static str,
    pub layout: vk::DescriptorSetLayout,
    pub set: vk::DescriptorSet,
    slots: Vec<BindingSlot>,
}

impl PassDescriptor {
    /// Create the layout, a pool and one set, all owned by `arena`.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(
        device: &ash::Device,
        arena: &mut ResourceArena,
        name: &'static str,
        stages: vk::ShaderStageFlags,
        slots: &[BindingSlot],
    ) -> Result<Self> {
        let builder = slots
            .iter()
            .fold(DescriptorSetLayoutBuilder::new(), |builder, slot| {
                builder.binding(slot.binding, slot.kind.descriptor_type(), stages)
            });

        let layout = builder.build(device)?;
        arena.push(ArenaEntry::DescriptorSetLayout(layout));

        let pool = create_descriptor_pool(device, 1, &builder.pool_sizes(1))?;
        arena.push(ArenaEntry::DescriptorPool(pool));

        let set = allocate_descriptor_set(device, pool, layout)?;

        tracing::debug!(pass = name, slots = slots.len(), "Descriptor set allocated");
        Ok(Self {
            name,
            layout,
            set,
            slots: slots.to_vec(),
        })
    }

    pub fn slots(&self) -> &[BindingSlot] {
        &self.slots
    }

    /// Resolve every declared slot against `resources`.
    pub fn plan(&self, resources: &BoundResources) -> Result<Vec<DescriptorWrite>> {
        plan_writes(self.name, &self.slots, resources)
    }
}

fn plan_writes(
    pass: &str,
    slots: &[BindingSlot],
    resources: &BoundResources,
) -> Result<Vec<DescriptorWrite>> {
    slots
        .iter()
        .map(|slot| {
            let binding = slot.binding;
            match slot.kind {
                SlotKind::ReadImage => Ok(DescriptorWrite::StorageImage {
                    binding,
                    view: resources.read,
                }),
                SlotKind::WriteImage => Ok(DescriptorWrite::StorageImage {
                    binding,
                    view: resources.write,
                }),
                SlotKind::Agents => {
                    let (buffer, range) = resources.agents.ok_or_else(|| {
                        GpuError::DescriptorSetup(format!(
                            "{pass}: binding {binding} needs the agent buffer"
                        ))
                    })?;
                    Ok(DescriptorWrite::StorageBuffer {
                        binding,
                        buffer,
                        range,
                    })
                }
                SlotKind::SampledRead => {
                    let sampler = resources.sampler.ok_or_else(|| {
                        GpuError::DescriptorSetup(format!(
                            "{pass}: binding {binding} is a combined image sampler without a sampler"
                        ))
                    })?;
                    Ok(DescriptorWrite::SampledImage {
                        binding,
                        view: resources.read,
                        sampler,
                    })
                }
            }
        })
        .collect()
}

/// Rewrites pass descriptor sets against the current role assignment.
#[derive(Debug, Default)]
pub struct DescriptorRebinder {
    updates: u64,
}

impl DescriptorRebinder {
    pub const fn new() -> Self {
        Self { updates: 0 }
    }

    /// Number of descriptor set updates issued.
    pub const fn update_count(&self) -> u64 {
        self.updates
    }

    /// Rewrite every binding `pass` declares.
    ///
    /// Host-side only: the set must not be in use by a pending submission,
    /// and must not yet be bound in the command buffer being recorded.
    ///
    /// # Safety
    /// The device and all handles in `resources` must be valid.
    pub unsafe fn rebind(
        &mut self,
        device: &ash::Device,
        pass: &PassDescriptor,
        resources: &BoundResources,
    ) -> Result<()> {
        let plan = pass.plan(resources)?;

        // Info structs must stay put while the writes point at them.
        let infos: Vec<WriteInfo> = plan.iter().map(WriteInfo::from).collect();
        let writes: Vec<vk::WriteDescriptorSet<'_>> = plan
            .iter()
            .zip(&infos)
            .map(|(write, info)| info.write(pass.set, write))
            .collect();

        device.update_descriptor_sets(&writes, &[]);
        self.updates += 1;
        tracing::trace!(pass = pass.name, bindings = writes.len(), "Descriptors rebound");
        Ok(())
    }
}

enum WriteInfo {
    Image(vk::DescriptorImageInfo),
    Buffer(vk::DescriptorBufferInfo),
}

impl From<&DescriptorWrite> for WriteInfo {
    fn from(write: &DescriptorWrite) -> Self {
        match *write {
            DescriptorWrite::StorageImage { view, .. } => Self::Image(
                vk::DescriptorImageInfo::default()
                    .image_view(view)
                    .image_layout(vk::ImageLayout::GENERAL),
            ),
            DescriptorWrite::StorageBuffer { buffer, range, .. } => Self::Buffer(
                vk::DescriptorBufferInfo::default()
                    .buffer(buffer)
                    .offset(0)
                    .range(range),
            ),
            DescriptorWrite::SampledImage { view, sampler, .. } => Self::Image(
                vk::DescriptorImageInfo::default()
                    .image_view(view)
                    .sampler(sampler)
                    .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
            ),
        }
    }
}

impl WriteInfo {
    fn write<'a>(
        &'a self,
        set: vk::DescriptorSet,
        write: &DescriptorWrite,
    ) -> vk::WriteDescriptorSet<'a> {
        let (binding, ty) = match *write {
            DescriptorWrite::StorageImage { binding, .. } => {
                (binding, vk::DescriptorType::STORAGE_IMAGE)
            }
            DescriptorWrite::StorageBuffer { binding, .. } => {
                (binding, vk::DescriptorType::STORAGE_BUFFER)
            }
            DescriptorWrite::SampledImage { binding, .. } => {
                (binding, vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            }
        };
        let base = vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(binding)
            .descriptor_type(ty);
        match self {
            Self::Image(info) => base.image_info(std::slice::from_ref(info)),
            Self::Buffer(info) => base.buffer_info(std::slice::from_ref(info)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn resources(read: u64, write: u64) -> BoundResources {
        BoundResources {
            read: vk::ImageView::from_raw(read),
            write: vk::ImageView::from_raw(write),
            agents: Some((vk::Buffer::from_raw(9), 160)),
            sampler: None,
        }
    }

    const UPDATE_SLOTS: [BindingSlot; 3] = [
        BindingSlot::new(0, SlotKind::Agents),
        BindingSlot::new(1, SlotKind::ReadImage),
        BindingSlot::new(2, SlotKind::WriteImage),
    ];

    #[test]
    fn plan_follows_current_roles() {
        let before = plan_writes("update", &UPDATE_SLOTS, &resources(1, 2)).unwrap();
        let after = plan_writes("update", &UPDATE_SLOTS, &resources(2, 1)).unwrap();

        assert_eq!(
            before[1],
            DescriptorWrite::StorageImage {
                binding: 1,
                view: vk::ImageView::from_raw(1)
            }
        );
        assert_eq!(
            after[1],
            DescriptorWrite::StorageImage {
                binding: 1,
                view: vk::ImageView::from_raw(2)
            }
        );
        assert_eq!(
            after[2],
            DescriptorWrite::StorageImage {
                binding: 2,
                view: vk::ImageView::from_raw(1)
            }
        );
    }

    #[test]
    fn every_slot_is_written() {
        let plan = plan_writes("update", &UPDATE_SLOTS, &resources(1, 2)).unwrap();
        let bindings: Vec<u32> = plan
            .iter()
            .map(|w| match *w {
                DescriptorWrite::StorageImage { binding, .. }
                | DescriptorWrite::StorageBuffer { binding, .. }
                | DescriptorWrite::SampledImage { binding, .. } => binding,
            })
            .collect();
        assert_eq!(bindings, [0, 1, 2]);
        assert!(matches!(
            plan[0],
            DescriptorWrite::StorageBuffer { range: 160, .. }
        ));
    }

    #[test]
    fn missing_agent_buffer_is_rejected() {
        let mut res = resources(1, 2);
        res.agents = None;
        let err = plan_writes("update", &UPDATE_SLOTS, &res).unwrap_err();
        assert!(matches!(err, GpuError::DescriptorSetup(msg) if msg.contains("agent")));
    }

    #[test]
    fn sampler_slot_requires_sampler() {
        let slots = [BindingSlot::new(0, SlotKind::SampledRead)];
        let mut res = resources(5, 6);
        assert!(matches!(
            plan_writes("display", &slots, &res),
            Err(GpuError::DescriptorSetup(_))
        ));

        res.sampler = Some(vk::Sampler::from_raw(3));
        let plan = plan_writes("display", &slots, &res).unwrap();
        assert_eq!(
            plan[0],
            DescriptorWrite::SampledImage {
                binding: 0,
                view: vk::ImageView::from_raw(5),
                sampler: vk::Sampler::from_raw(3),
            }
        );
    }

    #[test]
    fn write_info_layouts() {
        let storage = WriteInfo::from(&DescriptorWrite::StorageImage {
            binding: 0,
            view: vk::ImageView::from_raw(1),
        });
        let sampled = WriteInfo::from(&DescriptorWrite::SampledImage {
            binding: 0,
            view: vk::ImageView::from_raw(1),
            sampler: vk::Sampler::from_raw(2),
        });
        assert!(matches!(storage, WriteInfo::Image(i) if i.image_layout == vk::ImageLayout::GENERAL));
        assert!(matches!(
            sampled,
            WriteInfo::Image(i) if i.image_layout == vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        ));
    }
}
