//! Tests for memory type selection and block sub-allocation.

use {
    anyhow::Result,
    ash::vk,
    assert2::{check, let_assert},
    ccthw_vkal::{
        allocate_block, claim_from_blocks,
        image::{create_image, ImageDesc, ImageMemory},
        into_shared, register_block, AllocationRequirements, BlockAllocator,
        BlockMetrics, FakeAllocator, HandleRegistry, MemoryProperties,
        SlotTable, TraceAllocator, VkalError,
    },
    common::fake_device::fake_device,
};

mod common;

/// A discrete GPU without resizable BAR: nothing is both device local and
/// host visible.
fn discrete_gpu() -> MemoryProperties {
    MemoryProperties::from_raw(
        &[
            vk::MemoryType {
                property_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL,
                heap_index: 0,
            },
            vk::MemoryType {
                property_flags: vk::MemoryPropertyFlags::HOST_VISIBLE
                    | vk::MemoryPropertyFlags::HOST_COHERENT,
                heap_index: 1,
            },
            vk::MemoryType {
                property_flags: vk::MemoryPropertyFlags::HOST_VISIBLE
                    | vk::MemoryPropertyFlags::HOST_COHERENT
                    | vk::MemoryPropertyFlags::HOST_CACHED,
                heap_index: 1,
            },
        ],
        &[
            vk::MemoryHeap {
                size: 8 * 1024 * 1024 * 1024,
                flags: vk::MemoryHeapFlags::DEVICE_LOCAL,
            },
            vk::MemoryHeap {
                size: 16 * 1024 * 1024 * 1024,
                flags: vk::MemoryHeapFlags::empty(),
            },
        ],
    )
}

fn requirements(
    size_in_bytes: u64,
    alignment: u64,
    memory_type_index: usize,
) -> AllocationRequirements {
    AllocationRequirements {
        size_in_bytes,
        alignment,
        memory_type_index,
        ..AllocationRequirements::default()
    }
}

#[test]
fn test_first_matching_type_wins() -> Result<()> {
    common::setup_logger();

    let properties = discrete_gpu();
    let host = vk::MemoryPropertyFlags::HOST_VISIBLE
        | vk::MemoryPropertyFlags::HOST_COHERENT;

    let host_any = properties.find_memory_type_index(0b111, host)?;
    let host_cached_only = properties.find_memory_type_index(0b100, host)?;
    let device = properties
        .find_memory_type_index(0b111, vk::MemoryPropertyFlags::DEVICE_LOCAL)?;

    check!(host_any == 1);
    check!(host_cached_only == 2);
    check!(device == 0);

    Ok(())
}

#[test]
fn test_partial_matches_are_never_accepted() -> Result<()> {
    common::setup_logger();

    let properties = discrete_gpu();
    let wanted = vk::MemoryPropertyFlags::DEVICE_LOCAL
        | vk::MemoryPropertyFlags::HOST_VISIBLE
        | vk::MemoryPropertyFlags::HOST_COHERENT;

    let_assert!(
        Err(VkalError::NoSupportedTypeForProperties(_, flags)) =
            properties.find_memory_type_index(0b111, wanted)
    );
    check!(flags == wanted);

    // Allowed bits exclude the only host visible types.
    check!(properties
        .find_memory_type_index(0b001, vk::MemoryPropertyFlags::HOST_VISIBLE)
        .is_err());

    Ok(())
}

#[test]
fn test_images_share_blocks_until_full() -> Result<()> {
    common::setup_logger();

    let mut registry = HandleRegistry::default();
    let mut allocator = FakeAllocator::default();

    let claims = [
        requirements(4096, 1024, 0),
        requirements(100, 256, 0),
        requirements(5000, 1024, 0),
    ];
    let mut placed = vec![];
    for claim in &claims {
        placed.push(unsafe {
            claim_from_blocks(
                &mut registry.memory_blocks,
                &mut allocator,
                claim,
                16 * 1024,
            )?
        });
    }

    check!(allocator.allocation_count == 1);
    check!(placed[0].1 == 0);
    check!(placed[1].1 == 4096);
    check!(placed[2].1 == 5120);
    check!(placed.iter().all(|(block, _)| *block == placed[0].0));

    let block = registry.memory_blocks.get(placed[0].0)?;
    check!(block.free() == 16 * 1024 - 10120);

    Ok(())
}

#[test]
fn test_memory_types_never_share_a_block() -> Result<()> {
    common::setup_logger();

    let mut registry = HandleRegistry::default();
    let mut allocator = FakeAllocator::default();

    let (device_block, _) = unsafe {
        claim_from_blocks(
            &mut registry.memory_blocks,
            &mut allocator,
            &requirements(64, 64, 0),
            1024,
        )?
    };
    let (host_block, offset) = unsafe {
        claim_from_blocks(
            &mut registry.memory_blocks,
            &mut allocator,
            &requirements(64, 64, 1),
            1024,
        )?
    };

    check!(device_block != host_block);
    check!(offset == 0);
    check!(registry.memory_blocks.len() == 2);

    Ok(())
}

#[test]
fn test_out_of_device_memory_is_reported() -> Result<()> {
    common::setup_logger();

    let mut registry = HandleRegistry::default();
    let mut allocator = FakeAllocator {
        max_block_size: Some(1024),
        ..FakeAllocator::default()
    };

    let_assert!(
        Err(VkalError::OutOfDeviceMemory) = unsafe {
            claim_from_blocks(
                &mut registry.memory_blocks,
                &mut allocator,
                &requirements(64, 1, 0),
                4096,
            )
        }
    );
    check!(registry.memory_blocks.is_empty());
    check!(allocator.active_allocations == 0);

    Ok(())
}

#[test]
fn test_trace_allocator_counts_blocks_per_type() -> Result<()> {
    common::setup_logger();

    let fake = into_shared(FakeAllocator::default());
    let mut allocator =
        TraceAllocator::new(discrete_gpu(), fake.clone(), "Test Trace");

    let a = unsafe { allocator.allocate(requirements(1000, 1, 0))? };
    let b = unsafe { allocator.allocate(requirements(500, 1, 1))? };
    let c = unsafe { allocator.allocate(requirements(250, 1, 1))? };

    check!(
        allocator.total()
            == BlockMetrics {
                total_blocks: 3,
                live_blocks: 3,
                live_bytes: 1750,
            }
    );
    check!(allocator.for_memory_type(1).live_blocks == 2);
    check!(allocator.report().contains("Test Trace"));

    unsafe {
        allocator.free(b);
        allocator.free(a);
    }
    check!(allocator.total().live_blocks == 1);
    check!(allocator.total().live_bytes == 250);
    check!(allocator.for_memory_type(0).total_blocks == 1);
    check!(allocator.for_memory_type(0).live_blocks == 0);
    check!(allocator.for_memory_type(2) == BlockMetrics::default());

    unsafe { allocator.free(c) };
    let active = fake.lock().map(|fake| fake.active_allocations);
    check!(active.ok() == Some(0));

    Ok(())
}

#[test]
fn test_shared_allocator_is_usable_from_threads() -> Result<()> {
    common::setup_logger();

    let fake = into_shared(FakeAllocator::default());
    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let mut allocator = fake.clone();
            std::thread::spawn(move || -> Result<(), VkalError> {
                for _ in 0..8 {
                    let block = unsafe {
                        allocator.allocate(requirements(64, 1, worker))?
                    };
                    unsafe { allocator.free(block) };
                }
                Ok(())
            })
        })
        .collect();
    for worker in workers {
        let_assert!(Ok(Ok(())) = worker.join());
    }
    let counts = fake
        .lock()
        .map(|fake| (fake.active_allocations, fake.allocation_count));
    check!(counts.ok() == Some((0, 32)));

    Ok(())
}

#[test]
fn test_registered_blocks_match_requested_properties() -> Result<()> {
    common::setup_logger();

    let properties = discrete_gpu();
    let host = vk::MemoryPropertyFlags::HOST_VISIBLE
        | vk::MemoryPropertyFlags::HOST_COHERENT;
    let driver_answer = vk::MemoryRequirements {
        size: 1024 * 1024,
        alignment: 64,
        memory_type_bits: 0b111,
    };
    let staging = AllocationRequirements {
        allocate_flags: vk::MemoryAllocateFlags::DEVICE_ADDRESS,
        ..AllocationRequirements::from_memory_requirements(
            &properties,
            host,
            driver_answer,
        )?
    };

    let fake = into_shared(FakeAllocator::default());
    let mut allocator =
        TraceAllocator::new(discrete_gpu(), fake.clone(), "Registered");
    let mut registry = HandleRegistry::default();
    let handle = unsafe {
        register_block(&mut registry.memory_blocks, &mut allocator, &staging)?
    };

    let block = registry.memory_blocks.get(handle)?;
    check!(block.memory_type_index() == 1);
    check!(block.property_flags().contains(host));
    check!(block.free() == 1024 * 1024);
    check!(allocator.for_memory_type(1).live_blocks == 1);
    let flags = fake.lock().map(|fake| fake.allocations[0].allocate_flags);
    check!(flags.ok() == Some(vk::MemoryAllocateFlags::DEVICE_ADDRESS));

    unsafe { registry.destroy_memory_block(&mut allocator, handle)? };
    check!(allocator.total().live_blocks == 0);
    let_assert!(
        Err(VkalError::StaleHandle {
            kind: "memory block",
            ..
        }) = unsafe { registry.destroy_memory_block(&mut allocator, handle) }
    );

    // Device local and host coherent at once is not on offer.
    let everything = host | vk::MemoryPropertyFlags::DEVICE_LOCAL;
    check!(AllocationRequirements::from_memory_requirements(
        &properties,
        everything,
        driver_answer
    )
    .is_err());
    check!(registry.memory_blocks.is_empty());

    Ok(())
}

#[test]
fn test_full_block_table_allocates_nothing() -> Result<()> {
    common::setup_logger();

    let mut blocks = SlotTable::new("memory block", 1);
    let mut allocator = FakeAllocator::default();
    let small = requirements(64, 1, 0);
    unsafe { register_block(&mut blocks, &mut allocator, &small)? };

    let_assert!(
        Err(VkalError::RegistryFull { capacity: 1, .. }) =
            unsafe { register_block(&mut blocks, &mut allocator, &small) }
    );
    check!(allocator.allocation_count == 1);
    check!(blocks.len() == 1);

    Ok(())
}

#[test]
fn test_failed_bind_returns_the_dedicated_block() -> Result<()> {
    common::setup_logger();

    let device = fake_device(false);
    let mut registry = HandleRegistry::default();
    let mut allocator = FakeAllocator::default();
    let desc = ImageDesc::new(
        32,
        32,
        vk::Format::R8G8B8A8_UNORM,
        vk::ImageUsageFlags::SAMPLED,
    );

    let dedicated = unsafe {
        create_image(
            &device,
            &discrete_gpu(),
            &mut registry,
            &mut allocator,
            &desc,
            ImageMemory::Dedicated,
        )
    };
    check!(dedicated.is_err());
    check!(registry.images.is_empty());
    check!(registry.memory_blocks.is_empty());
    check!(allocator.allocation_count == 1);
    check!(allocator.active_allocations == 0);

    // Shared blocks outlive a failed image, the claimed range stays used.
    let shared = unsafe {
        create_image(
            &device,
            &discrete_gpu(),
            &mut registry,
            &mut allocator,
            &desc,
            ImageMemory::Shared {
                min_block_size: 64 * 1024,
            },
        )
    };
    check!(shared.is_err());
    check!(registry.images.is_empty());
    check!(registry.memory_blocks.len() == 1);
    check!(allocator.active_allocations == 1);

    Ok(())
}

#[test]
fn test_bound_dedicated_images_are_registered() -> Result<()> {
    common::setup_logger();

    let device = fake_device(true);
    let mut registry = HandleRegistry::default();
    let mut allocator = FakeAllocator::default();
    let desc = ImageDesc::new(
        32,
        32,
        vk::Format::R8G8B8A8_UNORM,
        vk::ImageUsageFlags::SAMPLED,
    );

    let (image, memory) = unsafe {
        create_image(
            &device,
            &discrete_gpu(),
            &mut registry,
            &mut allocator,
            &desc,
            ImageMemory::Dedicated,
        )?
    };
    check!(registry.images.contains(image));
    let block = registry.memory_blocks.get(memory)?;
    check!(block.size() == 4096);
    check!(block.free() == 0);

    Ok(())
}

#[test]
fn test_allocate_registers_a_block_for_the_buffer_usage() -> Result<()> {
    common::setup_logger();

    let device = fake_device(true);
    let properties = discrete_gpu();
    let mut registry = HandleRegistry::default();
    let mut allocator = FakeAllocator::default();
    let usage = vk::BufferUsageFlags::TRANSFER_SRC;
    let host = vk::MemoryPropertyFlags::HOST_VISIBLE
        | vk::MemoryPropertyFlags::HOST_COHERENT;

    let handle = unsafe {
        allocate_block(
            &device,
            &properties,
            &mut registry.memory_blocks,
            &mut allocator,
            1024 * 1024,
            usage,
            host,
            vk::MemoryAllocateFlags::empty(),
        )?
    };
    let block = registry.memory_blocks.get(handle)?;
    check!(block.memory_type_index() == 1);
    check!(block.size() == 1024 * 1024);
    check!(block.alignment() == 64);

    // The usage only allows host memory types.
    let_assert!(
        Err(VkalError::NoSupportedTypeForProperties(_, _)) = unsafe {
            allocate_block(
                &device,
                &properties,
                &mut registry.memory_blocks,
                &mut allocator,
                1024,
                usage,
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
                vk::MemoryAllocateFlags::empty(),
            )
        }
    );
    check!(registry.memory_blocks.len() == 1);
    check!(allocator.allocation_count == 1);

    Ok(())
}
