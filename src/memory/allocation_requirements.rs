use {
    crate::{MemoryProperties, PrettyBitflag, PrettySize, VkalError},
    anyhow::Context,
    ash::vk,
};

/// Everything needed to pick and allocate a piece of device memory.
#[derive(Copy, Clone, Default)]
pub struct AllocationRequirements {
    pub size_in_bytes: u64,
    pub alignment: u64,
    pub memory_type_bits: u32,
    pub memory_type_index: usize,
    pub memory_properties: vk::MemoryPropertyFlags,
    pub allocate_flags: vk::MemoryAllocateFlags,
}

// Public API
// ----------

impl AllocationRequirements {
    /// Build requirements from the driver's answer for some resource.
    pub fn from_memory_requirements(
        memory_properties: &MemoryProperties,
        requested_flags: vk::MemoryPropertyFlags,
        requirements: vk::MemoryRequirements,
    ) -> Result<Self, VkalError> {
        let memory_type_index = memory_properties.find_memory_type_index(
            requirements.memory_type_bits,
            requested_flags,
        )?;
        Ok(Self {
            size_in_bytes: requirements.size,
            alignment: requirements.alignment.max(1),
            memory_type_bits: requirements.memory_type_bits,
            memory_type_index,
            memory_properties: memory_properties.flags_for(memory_type_index),
            allocate_flags: vk::MemoryAllocateFlags::empty(),
        })
    }

    /// Get the memory requirements for an existing buffer.
    pub fn for_buffer(
        device: &ash::Device,
        memory_properties: &MemoryProperties,
        requested_flags: vk::MemoryPropertyFlags,
        buffer: vk::Buffer,
    ) -> Result<Self, VkalError> {
        let requirements =
            unsafe { device.get_buffer_memory_requirements(buffer) };
        Self::from_memory_requirements(
            memory_properties,
            requested_flags,
            requirements,
        )
    }

    /// Get the memory requirements for an existing image.
    pub fn for_image(
        device: &ash::Device,
        memory_properties: &MemoryProperties,
        requested_flags: vk::MemoryPropertyFlags,
        image: vk::Image,
    ) -> Result<Self, VkalError> {
        let requirements =
            unsafe { device.get_image_memory_requirements(image) };
        Self::from_memory_requirements(
            memory_properties,
            requested_flags,
            requirements,
        )
    }

    /// Derive requirements for `size_in_bytes` of memory that buffers with
    /// `usage` can be bound to.
    ///
    /// A throwaway buffer is created only to learn which memory types the
    /// driver accepts for that usage.
    pub fn for_buffer_usage(
        device: &ash::Device,
        memory_properties: &MemoryProperties,
        size_in_bytes: u64,
        usage: vk::BufferUsageFlags,
        requested_flags: vk::MemoryPropertyFlags,
    ) -> Result<Self, VkalError> {
        let create_info = vk::BufferCreateInfo::default()
            .size(size_in_bytes)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let throwaway = unsafe {
            device.create_buffer(&create_info, None).with_context(|| {
                format!("Unable to create a throwaway buffer for {:?}", usage)
            })?
        };
        let requirements = Self::for_buffer(
            device,
            memory_properties,
            requested_flags,
            throwaway,
        );
        unsafe { device.destroy_buffer(throwaway, None) };
        let requirements = requirements?;
        Ok(Self {
            size_in_bytes: requirements.size_in_bytes.max(size_in_bytes),
            ..requirements
        })
    }

    /// The size rounded up so that a following allocation stays aligned.
    pub fn aligned_size(&self) -> u64 {
        num::Integer::next_multiple_of(
            &self.size_in_bytes,
            &self.alignment.max(1),
        )
    }
}

impl std::fmt::Debug for AllocationRequirements {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllocationRequirements")
            .field("size_in_bytes", &PrettySize(self.size_in_bytes))
            .field("alignment", &self.alignment)
            .field("memory_type_bits", &PrettyBitflag(self.memory_type_bits))
            .field("memory_type_index", &self.memory_type_index)
            .field("memory_properties", &self.memory_properties)
            .field("allocate_flags", &self.allocate_flags)
            .finish()
    }
}

impl std::fmt::Display for AllocationRequirements {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{:#?}", self))
    }
}

#[cfg(test)]
mod test {
    use {super::*, pretty_assertions::assert_eq};

    #[test]
    fn aligned_size_rounds_up() {
        let requirements = AllocationRequirements {
            size_in_bytes: 100,
            alignment: 64,
            ..AllocationRequirements::default()
        };
        assert_eq!(requirements.aligned_size(), 128);
    }

    #[test]
    fn picks_type_from_driver_requirements() {
        let properties = MemoryProperties::from_raw(
            &[
                vk::MemoryType {
                    property_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL,
                    heap_index: 0,
                },
                vk::MemoryType {
                    property_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL
                        | vk::MemoryPropertyFlags::HOST_VISIBLE,
                    heap_index: 0,
                },
            ],
            &[],
        );
        let requirements = AllocationRequirements::from_memory_requirements(
            &properties,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryRequirements {
                size: 256,
                alignment: 16,
                memory_type_bits: 0b10,
            },
        )
        .unwrap();
        assert_eq!(requirements.memory_type_index, 1);
        assert!(requirements
            .memory_properties
            .contains(vk::MemoryPropertyFlags::HOST_VISIBLE));
    }
}
