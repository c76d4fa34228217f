//! Images, image views, samplers and layout transitions.

use {
    crate::{
        claim_from_blocks, register_block, AllocationRequirements,
        BlockAllocator, HandleRegistry, ImageHandle, ImageViewHandle,
        MemoryBlockHandle, MemoryProperties, SamplerHandle, VkalError,
    },
    anyhow::Context,
    ash::vk,
};

/// Everything needed to create a 2D image (optionally layered).
#[derive(Debug, Copy, Clone)]
pub struct ImageDesc {
    pub width: u32,
    pub height: u32,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub array_layers: u32,
    pub memory_flags: vk::MemoryPropertyFlags,
}

impl ImageDesc {
    pub fn new(
        width: u32,
        height: u32,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> Self {
        Self {
            width,
            height,
            format,
            usage,
            array_layers: 1,
            memory_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL,
        }
    }
}

/// Where an image's memory comes from.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ImageMemory {
    /// Claimed from the best fitting shared block. New blocks are at least
    /// `min_block_size` bytes.
    Shared { min_block_size: u64 },

    /// A block of its own which can be released with
    /// [release_dedicated_image].
    Dedicated,
}

/// Create an image, bind it to device memory, and register both.
///
/// # Safety
///
/// The image must be destroyed before the device. Shared memory stays
/// claimed in its block until the block itself is freed.
pub unsafe fn create_image(
    device: &ash::Device,
    memory_properties: &MemoryProperties,
    registry: &mut HandleRegistry,
    allocator: &mut impl BlockAllocator,
    desc: &ImageDesc,
    placement: ImageMemory,
) -> Result<(ImageHandle, MemoryBlockHandle), VkalError> {
    let create_info = vk::ImageCreateInfo::default()
        .image_type(vk::ImageType::TYPE_2D)
        .format(desc.format)
        .extent(vk::Extent3D {
            width: desc.width,
            height: desc.height,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(desc.array_layers)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(desc.usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED);
    let image = device
        .create_image(&create_info, None)
        .with_context(|| format!("Error creating image {:#?}", desc))?;

    let placed = AllocationRequirements::for_image(
        device,
        memory_properties,
        desc.memory_flags,
        image,
    )
    .and_then(|requirements| match placement {
        ImageMemory::Shared { min_block_size } => claim_from_blocks(
            &mut registry.memory_blocks,
            allocator,
            &requirements,
            min_block_size,
        ),
        ImageMemory::Dedicated => {
            dedicated_block(registry, allocator, &requirements)
        }
    });
    let (block, offset) = match placed {
        Ok(placed) => placed,
        Err(err) => {
            device.destroy_image(image, None);
            return Err(err);
        }
    };

    let bound = registry
        .memory_blocks
        .get(block)
        .map(|block| block.memory())
        .and_then(|memory| {
            device
                .bind_image_memory(image, memory, offset)
                .context("Error binding image memory")?;
            registry.images.insert(image)
        });
    match bound {
        Ok(handle) => {
            log::debug!(
                "Created {}x{} {:?} image {:?} ({:?})",
                desc.width,
                desc.height,
                desc.format,
                handle,
                placement
            );
            Ok((handle, block))
        }
        Err(err) => {
            device.destroy_image(image, None);
            // Shared blocks keep the claimed range, dedicated ones go back.
            if placement == ImageMemory::Dedicated {
                if let Ok(block) = registry.memory_blocks.remove(block) {
                    allocator.free(block);
                }
            }
            Err(err)
        }
    }
}

/// Destroy an image created with [ImageMemory::Dedicated] and free its
/// block.
///
/// # Safety
///
/// The image must not be in use and nothing else may be bound to the
/// block.
pub unsafe fn release_dedicated_image(
    device: &ash::Device,
    registry: &mut HandleRegistry,
    allocator: &mut impl BlockAllocator,
    image: ImageHandle,
    memory: MemoryBlockHandle,
) -> Result<(), VkalError> {
    registry.destroy_image(device, image)?;
    registry.destroy_memory_block(allocator, memory)
}

unsafe fn dedicated_block(
    registry: &mut HandleRegistry,
    allocator: &mut impl BlockAllocator,
    requirements: &AllocationRequirements,
) -> Result<(MemoryBlockHandle, u64), VkalError> {
    let blocks = &mut registry.memory_blocks;
    let handle = register_block(blocks, allocator, requirements)?;
    let claimed = blocks
        .get_mut(handle)
        .and_then(|block| {
            block.claim(requirements.size_in_bytes, requirements.alignment)
        });
    match claimed {
        Ok(offset) => Ok((handle, offset)),
        Err(err) => {
            if let Ok(block) = blocks.remove(handle) {
                allocator.free(block);
            }
            Err(err)
        }
    }
}

/// Create and register a view of an image.
///
/// The image does not need to be registered, swapchain images are viewed
/// through here too.
///
/// # Safety
///
/// The view must be destroyed before the image.
pub unsafe fn create_image_view(
    device: &ash::Device,
    registry: &mut HandleRegistry,
    image: vk::Image,
    format: vk::Format,
    aspect_mask: vk::ImageAspectFlags,
    layer_count: u32,
) -> Result<ImageViewHandle, VkalError> {
    let view_type = if layer_count > 1 {
        vk::ImageViewType::TYPE_2D_ARRAY
    } else {
        vk::ImageViewType::TYPE_2D
    };
    let create_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(view_type)
        .format(format)
        .components(vk::ComponentMapping::default())
        .subresource_range(subresource_range(aspect_mask, layer_count));
    let view = device
        .create_image_view(&create_info, None)
        .context("Error creating an image view")?;
    registry.image_views.insert(view).map_err(|err| {
        device.destroy_image_view(view, None);
        err
    })
}

/// Sampler settings. The defaults are linear filtering with repeat
/// addressing.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SamplerDesc {
    pub filter: vk::Filter,
    pub address_mode: vk::SamplerAddressMode,
    pub max_anisotropy: Option<f32>,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            filter: vk::Filter::LINEAR,
            address_mode: vk::SamplerAddressMode::REPEAT,
            max_anisotropy: None,
        }
    }
}

/// Create and register a sampler.
///
/// # Safety
///
/// The sampler must be destroyed before the device.
pub unsafe fn create_sampler(
    device: &ash::Device,
    registry: &mut HandleRegistry,
    desc: &SamplerDesc,
) -> Result<SamplerHandle, VkalError> {
    let create_info = vk::SamplerCreateInfo::default()
        .mag_filter(desc.filter)
        .min_filter(desc.filter)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .address_mode_u(desc.address_mode)
        .address_mode_v(desc.address_mode)
        .address_mode_w(desc.address_mode)
        .anisotropy_enable(desc.max_anisotropy.is_some())
        .max_anisotropy(desc.max_anisotropy.unwrap_or(1.0))
        .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
        .compare_op(vk::CompareOp::ALWAYS)
        .min_lod(0.0)
        .max_lod(vk::LOD_CLAMP_NONE);
    let sampler = device
        .create_sampler(&create_info, None)
        .context("Error creating a sampler")?;
    registry.samplers.insert(sampler).map_err(|err| {
        device.destroy_sampler(sampler, None);
        err
    })
}

pub fn subresource_range(
    aspect_mask: vk::ImageAspectFlags,
    layer_count: u32,
) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count,
    }
}

/// Access masks and pipeline stages for a layout transition.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TransitionMasks {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

/// The barrier masks for the transitions this crate performs.
pub fn transition_masks(
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> Result<TransitionMasks, VkalError> {
    use vk::{AccessFlags as A, ImageLayout as L, PipelineStageFlags as S};
    let masks = match (old_layout, new_layout) {
        (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL) => TransitionMasks {
            src_access: A::empty(),
            dst_access: A::TRANSFER_WRITE,
            src_stage: S::TOP_OF_PIPE,
            dst_stage: S::TRANSFER,
        },
        (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => {
            TransitionMasks {
                src_access: A::TRANSFER_WRITE,
                dst_access: A::SHADER_READ,
                src_stage: S::TRANSFER,
                dst_stage: S::FRAGMENT_SHADER,
            }
        }
        (L::UNDEFINED, L::SHADER_READ_ONLY_OPTIMAL) => TransitionMasks {
            src_access: A::empty(),
            dst_access: A::SHADER_READ,
            src_stage: S::TOP_OF_PIPE,
            dst_stage: S::FRAGMENT_SHADER,
        },
        (L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => {
            TransitionMasks {
                src_access: A::empty(),
                dst_access: A::DEPTH_STENCIL_ATTACHMENT_READ
                    | A::DEPTH_STENCIL_ATTACHMENT_WRITE,
                src_stage: S::TOP_OF_PIPE,
                dst_stage: S::EARLY_FRAGMENT_TESTS,
            }
        }
        (L::UNDEFINED, L::GENERAL) => TransitionMasks {
            src_access: A::empty(),
            dst_access: A::SHADER_READ | A::SHADER_WRITE,
            src_stage: S::TOP_OF_PIPE,
            dst_stage: S::COMPUTE_SHADER | S::FRAGMENT_SHADER,
        },
        (old, new) => {
            return Err(anyhow::anyhow!(
                "Unsupported layout transition {:?} -> {:?}",
                old,
                new
            )
            .into())
        }
    };
    Ok(masks)
}

/// Record a layout transition barrier for every layer of an image.
///
/// # Safety
///
/// `command_buffer` must be recording.
pub unsafe fn cmd_transition_image_layout(
    device: &ash::Device,
    command_buffer: vk::CommandBuffer,
    image: vk::Image,
    aspect_mask: vk::ImageAspectFlags,
    layer_count: u32,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> Result<(), VkalError> {
    let masks = transition_masks(old_layout, new_layout)?;
    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(subresource_range(aspect_mask, layer_count))
        .src_access_mask(masks.src_access)
        .dst_access_mask(masks.dst_access);
    device.cmd_pipeline_barrier(
        command_buffer,
        masks.src_stage,
        masks.dst_stage,
        vk::DependencyFlags::empty(),
        &[],
        &[],
        &[barrier],
    );
    Ok(())
}

/// Record a copy of tightly packed rows, starting at `first_row`, from a
/// buffer into one layer of a color image in TRANSFER_DST_OPTIMAL layout.
///
/// # Safety
///
/// `command_buffer` must be recording.
pub unsafe fn cmd_copy_buffer_to_image(
    device: &ash::Device,
    command_buffer: vk::CommandBuffer,
    buffer: vk::Buffer,
    buffer_offset: u64,
    image: vk::Image,
    width: u32,
    first_row: u32,
    rows: u32,
    layer: u32,
) {
    let region = vk::BufferImageCopy::default()
        .buffer_offset(buffer_offset)
        .image_subresource(vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: layer,
            layer_count: 1,
        })
        .image_offset(vk::Offset3D {
            x: 0,
            y: first_row as i32,
            z: 0,
        })
        .image_extent(vk::Extent3D {
            width,
            height: rows,
            depth: 1,
        });
    device.cmd_copy_buffer_to_image(
        command_buffer,
        buffer,
        image,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        &[region],
    );
}
