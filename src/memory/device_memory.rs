use {
    crate::{AllocationRequirements, LinearCursor, PrettySize, VkalError},
    anyhow::Context,
    ash::vk,
    std::{ffi::c_void, fmt::Debug},
};

/// A large native memory allocation which resources are bump-allocated out
/// of.
///
/// `free()` starts at the full size and only shrinks. Regions are never
/// returned to the block, the whole block is released when it is freed by the
/// allocator that produced it.
pub struct DeviceMemoryBlock {
    memory: vk::DeviceMemory,
    requirements: AllocationRequirements,
    cursor: LinearCursor,
    mapped: MappedPtr,
}

// Public Api
// ----------

impl DeviceMemoryBlock {
    /// Wrap a freshly allocated piece of device memory.
    pub fn new(
        memory: vk::DeviceMemory,
        requirements: AllocationRequirements,
    ) -> Self {
        Self {
            memory,
            requirements,
            cursor: LinearCursor::new(
                "device memory block",
                requirements.size_in_bytes,
            ),
            mapped: MappedPtr::default(),
        }
    }

    /// The underlying Vulkan memory handle.
    ///
    /// # Safety
    ///
    /// Ownership is not transferred. The caller must not free the memory or
    /// keep the handle after the block is freed.
    pub unsafe fn memory(&self) -> vk::DeviceMemory {
        self.memory
    }

    pub fn size(&self) -> u64 {
        self.cursor.size()
    }

    /// Bytes which have not been claimed yet.
    pub fn free(&self) -> u64 {
        self.cursor.free()
    }

    pub fn memory_type_index(&self) -> usize {
        self.requirements.memory_type_index
    }

    /// The alignment the block itself was allocated with.
    pub fn alignment(&self) -> u64 {
        self.requirements.alignment
    }

    pub fn property_flags(&self) -> vk::MemoryPropertyFlags {
        self.requirements.memory_properties
    }

    pub fn requirements(&self) -> &AllocationRequirements {
        &self.requirements
    }

    pub fn is_host_visible(&self) -> bool {
        self.property_flags()
            .contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
    }

    /// Claim a region of the block and return its offset.
    pub fn claim(
        &mut self,
        size_in_bytes: u64,
        alignment: u64,
    ) -> Result<u64, VkalError> {
        self.cursor.claim(size_in_bytes, alignment)
    }

    /// True when a region with the given size and alignment still fits.
    pub fn can_claim(&self, size_in_bytes: u64, alignment: u64) -> bool {
        self.cursor.can_claim(size_in_bytes, alignment)
    }

    /// Map the entire block into host memory.
    ///
    /// Repeated calls return the same pointer and must each be paired with a
    /// call to [DeviceMemoryBlock::unmap].
    ///
    /// # Safety
    ///
    /// The application must synchronize host access with GPU work touching
    /// the same memory.
    pub unsafe fn map(
        &mut self,
        device: &ash::Device,
    ) -> Result<*mut c_void, VkalError> {
        if !self.is_host_visible() {
            return Err(VkalError::NotHostVisible("device memory block"));
        }
        if self.mapped.map_count == 0 {
            self.mapped.host_accessible_ptr = device
                .map_memory(
                    self.memory,
                    0,
                    vk::WHOLE_SIZE,
                    vk::MemoryMapFlags::empty(),
                )
                .with_context(|| "Unable to map a device memory block!")?;
        }
        self.mapped.map_count += 1;
        Ok(self.mapped.host_accessible_ptr)
    }

    /// Release one mapping of the block.
    ///
    /// # Safety
    ///
    /// The pointer returned by map() must not be used once the last mapping
    /// is released.
    pub unsafe fn unmap(
        &mut self,
        device: &ash::Device,
    ) -> Result<(), VkalError> {
        match self.mapped.map_count {
            0 => {
                return Err(VkalError::RuntimeError(anyhow::anyhow!(
                    "Unmap called on a block which is not mapped"
                )))
            }
            1 => {
                device.unmap_memory(self.memory);
                self.mapped.host_accessible_ptr = std::ptr::null_mut();
            }
            _ => (),
        }
        self.mapped.map_count -= 1;
        Ok(())
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped.map_count > 0
    }
}

impl Debug for DeviceMemoryBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceMemoryBlock")
            .field("memory", &self.memory)
            .field("size", &PrettySize(self.size()))
            .field("free", &PrettySize(self.free()))
            .field("memory_type_index", &self.memory_type_index())
            .field("map_count", &self.mapped.map_count)
            .finish()
    }
}

/// vkMapMemory may only be called once per allocation, so every user of a
/// block shares one pointer and a count of outstanding mappings.
struct MappedPtr {
    host_accessible_ptr: *mut c_void,
    map_count: u32,
}

// The pointer is only dereferenced through the block's owner.
unsafe impl Send for MappedPtr {}

impl Default for MappedPtr {
    fn default() -> Self {
        Self {
            host_accessible_ptr: std::ptr::null_mut(),
            map_count: 0,
        }
    }
}
