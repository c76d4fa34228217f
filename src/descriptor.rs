//! The context's descriptor pool and in-place descriptor set updates.
//!
//! Updates take effect immediately. Updating a set which is referenced by a
//! command buffer still executing on the GPU is not detected here, callers
//! wait on the frame fence first.

use {
    crate::{
        DescriptorSetLayoutHandle, HandleRegistry, TextureHandle, VkalConfig,
        VkalError,
    },
    anyhow::Context,
    ash::vk,
};

/// Bookkeeping for the fixed number of sets a pool can hand out.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SetBudget {
    capacity: u32,
    allocated: u32,
}

impl SetBudget {
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            allocated: 0,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.capacity - self.allocated
    }

    /// Account for `count` more sets, or fail without changing anything.
    pub fn reserve(&mut self, count: u32) -> Result<(), VkalError> {
        if count > self.remaining() {
            return Err(VkalError::DescriptorPoolExhausted {
                requested: count,
                remaining: self.remaining(),
            });
        }
        self.allocated += count;
        Ok(())
    }

    pub fn release(&mut self, count: u32) {
        self.allocated = self.allocated.saturating_sub(count);
    }
}

/// One pre-sized pool. It never grows.
pub struct DescriptorPool {
    pool: vk::DescriptorPool,
    budget: SetBudget,
}

pub fn pool_sizes(config: &VkalConfig) -> Vec<vk::DescriptorPoolSize> {
    [
        (
            vk::DescriptorType::UNIFORM_BUFFER,
            config.max_uniform_descriptors,
        ),
        (
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            config.max_sampler_descriptors,
        ),
        (
            vk::DescriptorType::STORAGE_BUFFER,
            config.max_storage_descriptors,
        ),
    ]
    .into_iter()
    .filter(|&(_, count)| count > 0)
    .map(|(ty, descriptor_count)| vk::DescriptorPoolSize {
        ty,
        descriptor_count,
    })
    .collect()
}

impl DescriptorPool {
    /// # Safety
    ///
    /// [DescriptorPool::destroy] must be called before the device is
    /// destroyed.
    pub unsafe fn new(
        device: &ash::Device,
        config: &VkalConfig,
    ) -> Result<Self, VkalError> {
        let sizes = pool_sizes(config);
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(config.max_descriptor_sets)
            .pool_sizes(&sizes);
        let pool = device
            .create_descriptor_pool(&create_info, None)
            .with_context(|| {
                format!("Error creating descriptor pool with {:?}", sizes)
            })?;
        Ok(Self {
            pool,
            budget: SetBudget::new(config.max_descriptor_sets),
        })
    }

    pub fn remaining(&self) -> u32 {
        self.budget.remaining()
    }

    /// Allocate one set per layout.
    ///
    /// # Safety
    ///
    /// The sets are freed with the pool.
    pub unsafe fn allocate(
        &mut self,
        device: &ash::Device,
        registry: &HandleRegistry,
        layouts: &[DescriptorSetLayoutHandle],
    ) -> Result<Vec<vk::DescriptorSet>, VkalError> {
        let raw_layouts = layouts
            .iter()
            .map(|&layout| registry.descriptor_set_layouts.get(layout).copied())
            .collect::<Result<Vec<_>, _>>()?;
        let count = raw_layouts.len() as u32;
        self.budget.reserve(count)?;

        let allocate_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(&raw_layouts);
        match device.allocate_descriptor_sets(&allocate_info) {
            Ok(sets) => {
                log::trace!(
                    "Allocated {} descriptor sets, {} left",
                    count,
                    self.remaining()
                );
                Ok(sets)
            }
            Err(
                vk::Result::ERROR_OUT_OF_POOL_MEMORY
                | vk::Result::ERROR_FRAGMENTED_POOL,
            ) => {
                self.budget.release(count);
                Err(VkalError::DescriptorPoolExhausted {
                    requested: count,
                    remaining: self.remaining(),
                })
            }
            Err(err) => {
                self.budget.release(count);
                Err(VkalError::from_vk(err))
            }
        }
    }

    /// # Safety
    ///
    /// No set from the pool may be in use.
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        device.destroy_descriptor_pool(self.pool, None);
    }
}

/// Point a uniform buffer binding at a buffer range.
///
/// # Safety
///
/// The set must not be in use by pending GPU work.
pub unsafe fn update_descriptor_set_uniform(
    device: &ash::Device,
    set: vk::DescriptorSet,
    binding: u32,
    info: vk::DescriptorBufferInfo,
) {
    write_buffer(
        device,
        set,
        binding,
        vk::DescriptorType::UNIFORM_BUFFER,
        info,
    );
}

/// Point a storage buffer binding at a buffer range.
///
/// # Safety
///
/// The set must not be in use by pending GPU work.
pub unsafe fn update_descriptor_set_storage_buffer(
    device: &ash::Device,
    set: vk::DescriptorSet,
    binding: u32,
    info: vk::DescriptorBufferInfo,
) {
    write_buffer(
        device,
        set,
        binding,
        vk::DescriptorType::STORAGE_BUFFER,
        info,
    );
}

/// Bind a texture to a combined image sampler binding.
///
/// # Safety
///
/// The set must not be in use by pending GPU work.
pub unsafe fn update_descriptor_set_texture(
    device: &ash::Device,
    registry: &HandleRegistry,
    set: vk::DescriptorSet,
    binding: u32,
    texture: TextureHandle,
) -> Result<(), VkalError> {
    update_descriptor_set_texture_array(
        device,
        registry,
        set,
        binding,
        &[texture],
    )
}

/// Bind textures to consecutive elements of an array binding, starting at
/// element zero.
///
/// # Safety
///
/// The set must not be in use by pending GPU work.
pub unsafe fn update_descriptor_set_texture_array(
    device: &ash::Device,
    registry: &HandleRegistry,
    set: vk::DescriptorSet,
    binding: u32,
    textures: &[TextureHandle],
) -> Result<(), VkalError> {
    let image_infos = textures
        .iter()
        .map(|&texture| texture_image_info(registry, texture))
        .collect::<Result<Vec<_>, _>>()?;
    let write = vk::WriteDescriptorSet::default()
        .dst_set(set)
        .dst_binding(binding)
        .dst_array_element(0)
        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
        .image_info(&image_infos);
    device.update_descriptor_sets(&[write], &[]);
    Ok(())
}

fn texture_image_info(
    registry: &HandleRegistry,
    texture: TextureHandle,
) -> Result<vk::DescriptorImageInfo, VkalError> {
    let texture = registry.textures.get(texture)?;
    Ok(vk::DescriptorImageInfo {
        sampler: *registry.samplers.get(texture.sampler)?,
        image_view: *registry.image_views.get(texture.view)?,
        image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    })
}

unsafe fn write_buffer(
    device: &ash::Device,
    set: vk::DescriptorSet,
    binding: u32,
    descriptor_type: vk::DescriptorType,
    info: vk::DescriptorBufferInfo,
) {
    let buffer_infos = [info];
    let write = vk::WriteDescriptorSet::default()
        .dst_set(set)
        .dst_binding(binding)
        .dst_array_element(0)
        .descriptor_type(descriptor_type)
        .buffer_info(&buffer_infos);
    device.update_descriptor_sets(&[write], &[]);
}
