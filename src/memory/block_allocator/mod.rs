mod device_allocator;
mod fake_allocator;
mod trace_allocator;

use {
    crate::{AllocationRequirements, DeviceMemoryBlock, VkalError},
    std::sync::{Arc, Mutex},
};

pub use self::{
    device_allocator::DeviceAllocator, fake_allocator::FakeAllocator,
    trace_allocator::{BlockMetrics, TraceAllocator},
};

/// Move a block allocator behind an Arc<Mutex>.
pub fn into_shared<T: BlockAllocator>(allocator: T) -> Arc<Mutex<T>> {
    Arc::new(Mutex::new(allocator))
}

/// Something which hands out whole [DeviceMemoryBlock]s.
pub trait BlockAllocator {
    /// Allocate a block which satisfies the requirements.
    ///
    /// # Safety
    ///
    /// Unsafe because the block must be freed before the device is destroyed.
    unsafe fn allocate(
        &mut self,
        allocation_requirements: AllocationRequirements,
    ) -> Result<DeviceMemoryBlock, VkalError>;

    /// Return a block to the device.
    ///
    /// # Safety
    ///
    /// Unsafe because:
    ///  - nothing bound to the block may be used by the GPU anymore
    ///  - every resource bound into the block must already be destroyed
    unsafe fn free(&mut self, block: DeviceMemoryBlock);
}

impl BlockAllocator for Box<dyn BlockAllocator> {
    unsafe fn allocate(
        &mut self,
        allocation_requirements: AllocationRequirements,
    ) -> Result<DeviceMemoryBlock, VkalError> {
        self.as_mut().allocate(allocation_requirements)
    }

    unsafe fn free(&mut self, block: DeviceMemoryBlock) {
        self.as_mut().free(block)
    }
}

impl<T> BlockAllocator for Arc<Mutex<T>>
where
    T: BlockAllocator,
{
    unsafe fn allocate(
        &mut self,
        allocation_requirements: AllocationRequirements,
    ) -> Result<DeviceMemoryBlock, VkalError> {
        self.lock()
            .map_err(|_| anyhow::anyhow!("Block allocator lock poisoned"))?
            .allocate(allocation_requirements)
    }

    unsafe fn free(&mut self, block: DeviceMemoryBlock) {
        match self.lock() {
            Ok(mut allocator) => allocator.free(block),
            Err(poisoned) => poisoned.into_inner().free(block),
        }
    }
}
