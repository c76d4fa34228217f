//! Device memory: type selection, large blocks, and bump sub-allocation.

mod allocation_requirements;
mod block_allocator;
mod device_memory;
mod linear_cursor;
mod memory_properties;

use {
    crate::{MemoryBlockHandle, SlotTable, VkalError},
    ash::vk,
};

pub use self::{
    allocation_requirements::AllocationRequirements,
    block_allocator::{
        into_shared, BlockAllocator, BlockMetrics, DeviceAllocator,
        FakeAllocator, TraceAllocator,
    },
    device_memory::DeviceMemoryBlock,
    linear_cursor::LinearCursor,
    memory_properties::MemoryProperties,
};

/// Allocate and register a block of device memory that buffers with `usage`
/// can be bound to.
///
/// The first memory type allowed for the usage whose flags contain every
/// requested property flag is used. When no type matches this fails, it
/// never settles for a partial match.
///
/// # Safety
///
/// The block must be freed with the same allocator before the device is
/// destroyed.
#[allow(clippy::too_many_arguments)]
pub unsafe fn allocate_block(
    device: &ash::Device,
    memory_properties: &MemoryProperties,
    blocks: &mut SlotTable<DeviceMemoryBlock>,
    allocator: &mut impl BlockAllocator,
    size_in_bytes: u64,
    usage: vk::BufferUsageFlags,
    memory_property_flags: vk::MemoryPropertyFlags,
    extra_allocate_flags: vk::MemoryAllocateFlags,
) -> Result<MemoryBlockHandle, VkalError> {
    let requirements = AllocationRequirements::for_buffer_usage(
        device,
        memory_properties,
        size_in_bytes,
        usage,
        memory_property_flags,
    )?;
    register_block(
        blocks,
        allocator,
        &AllocationRequirements {
            allocate_flags: extra_allocate_flags,
            ..requirements
        },
    )
}

/// Allocate a block for the requirements and register it.
///
/// Nothing is allocated when the table is already full.
///
/// # Safety
///
/// The block must be freed through the same allocator.
pub unsafe fn register_block(
    blocks: &mut SlotTable<DeviceMemoryBlock>,
    allocator: &mut impl BlockAllocator,
    requirements: &AllocationRequirements,
) -> Result<MemoryBlockHandle, VkalError> {
    if blocks.len() == blocks.capacity() {
        return Err(VkalError::RegistryFull {
            kind: blocks.kind(),
            capacity: blocks.capacity(),
        });
    }
    let block = allocator.allocate(*requirements)?;
    log::debug!("New memory block registered: {:?}", block);
    blocks.insert(block)
}

/// Pick the registered block that fits a request most tightly.
///
/// Only blocks of the required memory type with room for the aligned request
/// are considered. Among them the one with the least free space wins.
pub fn best_fit_block(
    blocks: &SlotTable<DeviceMemoryBlock>,
    requirements: &AllocationRequirements,
) -> Option<MemoryBlockHandle> {
    blocks
        .iter()
        .filter(|(_, block)| {
            block.memory_type_index() == requirements.memory_type_index
                && block.can_claim(
                    requirements.size_in_bytes,
                    requirements.alignment,
                )
        })
        .min_by_key(|(_, block)| block.free())
        .map(|(handle, _)| handle)
}

/// Claim memory for a resource from the best fitting registered block,
/// allocating and registering a new block of at least `min_block_size` when
/// nothing fits.
///
/// Returns the block and the offset of the claimed region.
///
/// # Safety
///
/// New blocks must eventually be freed through the same allocator.
pub unsafe fn claim_from_blocks(
    blocks: &mut SlotTable<DeviceMemoryBlock>,
    allocator: &mut impl BlockAllocator,
    requirements: &AllocationRequirements,
    min_block_size: u64,
) -> Result<(MemoryBlockHandle, u64), VkalError> {
    let handle = match best_fit_block(blocks, requirements) {
        Some(handle) => handle,
        None => register_block(
            blocks,
            allocator,
            &AllocationRequirements {
                size_in_bytes: requirements
                    .aligned_size()
                    .max(min_block_size),
                ..*requirements
            },
        )?,
    };
    let offset = blocks
        .get_mut(handle)?
        .claim(requirements.size_in_bytes, requirements.alignment)?;
    Ok((handle, offset))
}
