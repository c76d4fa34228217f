use {
    crate::{
        AllocationRequirements, BlockAllocator, DeviceMemoryBlock, VkalError,
    },
    ash::vk,
};

/// Allocates every block directly from the device.
pub struct DeviceAllocator {
    device: ash::Device,
}

impl DeviceAllocator {
    /// # Safety
    ///
    /// Unsafe because:
    ///  - the device must not be destroyed while this allocator still exists
    ///  - every block must be freed before destroying the device
    pub unsafe fn new(device: ash::Device) -> Self {
        Self { device }
    }
}

impl BlockAllocator for DeviceAllocator {
    unsafe fn allocate(
        &mut self,
        allocation_requirements: AllocationRequirements,
    ) -> Result<DeviceMemoryBlock, VkalError> {
        let mut flags_info = vk::MemoryAllocateFlagsInfo::default()
            .flags(allocation_requirements.allocate_flags);
        let mut allocate_info = vk::MemoryAllocateInfo::default()
            .allocation_size(allocation_requirements.size_in_bytes)
            .memory_type_index(
                allocation_requirements.memory_type_index as u32,
            );
        if !allocation_requirements.allocate_flags.is_empty() {
            allocate_info = allocate_info.push_next(&mut flags_info);
        }
        let memory = match self.device.allocate_memory(&allocate_info, None) {
            Ok(memory) => memory,
            Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY) => {
                return Err(VkalError::OutOfDeviceMemory)
            }
            Err(err) => {
                return Err(anyhow::Error::new(err)
                    .context(format!(
                        "Error allocating memory with requirements {}",
                        allocation_requirements,
                    ))
                    .into())
            }
        };
        log::debug!(
            "Allocated device memory block {:?}",
            allocation_requirements
        );
        Ok(DeviceMemoryBlock::new(memory, allocation_requirements))
    }

    unsafe fn free(&mut self, block: DeviceMemoryBlock) {
        let mut block = block;
        while block.is_mapped() {
            if block.unmap(&self.device).is_err() {
                break;
            }
        }
        self.device.free_memory(block.memory(), None)
    }
}
