use {
    crate::{
        AllocationRequirements, BlockAllocator, DeviceMemoryBlock, VkalError,
    },
    ash::{vk, vk::Handle},
};

/// A block allocator which never touches a device. Every block gets a unique
/// fake memory handle and all requests are recorded.
#[derive(Default)]
pub struct FakeAllocator {
    /// Every request, in order.
    pub allocations: Vec<AllocationRequirements>,

    /// Blocks which have not been freed yet.
    pub active_allocations: u32,

    /// The total number of blocks handed out.
    pub allocation_count: u64,

    /// When set, requests larger than this fail like the device ran out of
    /// memory.
    pub max_block_size: Option<u64>,
}

impl BlockAllocator for FakeAllocator {
    unsafe fn allocate(
        &mut self,
        allocation_requirements: AllocationRequirements,
    ) -> Result<DeviceMemoryBlock, VkalError> {
        if self
            .max_block_size
            .is_some_and(|max| allocation_requirements.size_in_bytes > max)
        {
            return Err(VkalError::OutOfDeviceMemory);
        }
        self.active_allocations += 1;
        self.allocation_count += 1;
        self.allocations.push(allocation_requirements);

        Ok(DeviceMemoryBlock::new(
            vk::DeviceMemory::from_raw(self.allocation_count),
            allocation_requirements,
        ))
    }

    unsafe fn free(&mut self, _block: DeviceMemoryBlock) {
        self.active_allocations -= 1;
    }
}
