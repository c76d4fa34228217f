//! Buffers, host mappings, and the linear sub-allocators built on them.

mod default_buffers;
mod linear_buffer;
mod uniform;

use {
    crate::{
        AllocationRequirements, BlockAllocator, DeviceMemoryBlock,
        MemoryProperties, PrettySize, VkalError,
    },
    anyhow::Context,
    ash::vk,
    std::ffi::c_void,
};

pub use self::{
    default_buffers::{DefaultBuffers, StagingUploader},
    linear_buffer::LinearBuffer,
    uniform::UniformBuffer,
};

/// Copies bytes into buffers the host cannot write directly.
pub trait Uploader {
    /// Copy `bytes` into `dst` starting at `dst_offset`.
    ///
    /// # Safety
    ///
    /// The destination range must not be in use by pending GPU work.
    unsafe fn upload(
        &mut self,
        dst: vk::Buffer,
        dst_offset: u64,
        bytes: &[u8],
    ) -> Result<(), VkalError>;
}

/// An uploader for buffers which are known to be host visible. Any attempt to
/// use it is an error.
pub struct HostOnly;

impl Uploader for HostOnly {
    unsafe fn upload(
        &mut self,
        _dst: vk::Buffer,
        _dst_offset: u64,
        _bytes: &[u8],
    ) -> Result<(), VkalError> {
        Err(VkalError::NotHostVisible("buffer"))
    }
}

/// A bounds-checked view of host-mapped memory.
pub struct HostMapping {
    ptr: *mut u8,
    len: u64,
}

impl HostMapping {
    /// # Safety
    ///
    /// `ptr` must be valid for reads and writes of `len` bytes for as long as
    /// the mapping is used.
    pub unsafe fn new(ptr: *mut c_void, len: u64) -> Self {
        Self {
            ptr: ptr as *mut u8,
            len,
        }
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr
    }

    pub fn write(
        &mut self,
        offset: u64,
        bytes: &[u8],
    ) -> Result<(), VkalError> {
        self.check(offset, bytes.len() as u64)?;
        unsafe {
            std::ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                self.ptr.add(offset as usize),
                bytes.len(),
            );
        }
        Ok(())
    }

    pub fn read(&self, offset: u64, len: u64) -> Result<&[u8], VkalError> {
        self.check(offset, len)?;
        Ok(unsafe {
            std::slice::from_raw_parts(
                self.ptr.add(offset as usize),
                len as usize,
            )
        })
    }

    fn check(&self, offset: u64, len: u64) -> Result<(), VkalError> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(VkalError::MappingOutOfBounds {
                offset,
                len,
                size: self.len,
            }),
        }
    }
}

// Writes and reads go through `&mut self` and `&self` respectively.
unsafe impl Send for HostMapping {}

impl std::fmt::Debug for HostMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostMapping")
            .field("ptr", &self.ptr)
            .field("len", &PrettySize(self.len))
            .finish()
    }
}

/// A native buffer together with the memory block it is bound to.
#[derive(Debug)]
pub struct Buffer {
    name: &'static str,
    buffer: vk::Buffer,
    memory: DeviceMemoryBlock,
    size: u64,
    usage: vk::BufferUsageFlags,
    mapping: Option<HostMapping>,
}

// Public API
// ----------

impl Buffer {
    /// Create a buffer backed by its own memory block.
    ///
    /// Host visible buffers are mapped for their whole lifetime.
    ///
    /// # Safety
    ///
    /// The buffer must be destroyed with [Buffer::destroy] using the same
    /// allocator before the device is destroyed.
    pub unsafe fn create(
        device: &ash::Device,
        memory_properties: &MemoryProperties,
        allocator: &mut impl BlockAllocator,
        name: &'static str,
        size: u64,
        usage: vk::BufferUsageFlags,
        memory_property_flags: vk::MemoryPropertyFlags,
    ) -> Result<Self, VkalError> {
        let create_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = device
            .create_buffer(&create_info, None)
            .with_context(|| format!("Error creating the {} buffer", name))?;

        let requirements = match AllocationRequirements::for_buffer(
            device,
            memory_properties,
            memory_property_flags,
            buffer,
        ) {
            Ok(requirements) => requirements,
            Err(err) => {
                device.destroy_buffer(buffer, None);
                return Err(err);
            }
        };
        let mut memory = match allocator.allocate(requirements) {
            Ok(memory) => memory,
            Err(err) => {
                device.destroy_buffer(buffer, None);
                return Err(err);
            }
        };

        let bound = memory
            .claim(size, requirements.alignment)
            .and_then(|offset| {
                device
                    .bind_buffer_memory(buffer, memory.memory(), offset)
                    .with_context(|| {
                        format!("Error binding the {} buffer", name)
                    })?;
                Ok(offset)
            })
            .and_then(|offset| {
                if !memory.is_host_visible() {
                    return Ok(None);
                }
                let ptr = memory.map(device)?;
                Ok(Some(HostMapping::new(
                    (ptr as *mut u8).add(offset as usize) as *mut c_void,
                    size,
                )))
            });
        let mapping = match bound {
            Ok(mapping) => mapping,
            Err(err) => {
                device.destroy_buffer(buffer, None);
                allocator.free(memory);
                return Err(err);
            }
        };

        log::debug!(
            "Created {} buffer: {} {:?} host visible: {}",
            name,
            PrettySize(size),
            usage,
            mapping.is_some()
        );

        Ok(Self {
            name,
            buffer,
            memory,
            size,
            usage,
            mapping,
        })
    }

    /// Assemble a buffer from parts which already exist.
    ///
    /// # Safety
    ///
    /// `buffer` must be bound to `memory`, and `mapping` (if any) must cover
    /// exactly the buffer's range.
    pub unsafe fn from_parts(
        name: &'static str,
        buffer: vk::Buffer,
        memory: DeviceMemoryBlock,
        size: u64,
        usage: vk::BufferUsageFlags,
        mapping: Option<HostMapping>,
    ) -> Self {
        Self {
            name,
            buffer,
            memory,
            size,
            usage,
            mapping,
        }
    }

    /// # Safety
    ///
    /// The buffer must not be used by pending GPU work.
    pub unsafe fn destroy(
        self,
        device: &ash::Device,
        allocator: &mut impl BlockAllocator,
    ) {
        device.destroy_buffer(self.buffer, None);
        allocator.free(self.memory);
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn raw(&self) -> vk::Buffer {
        self.buffer
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    pub fn memory(&self) -> &DeviceMemoryBlock {
        &self.memory
    }

    pub fn mapping(&self) -> Option<&HostMapping> {
        self.mapping.as_ref()
    }

    pub fn mapping_mut(&mut self) -> Option<&mut HostMapping> {
        self.mapping.as_mut()
    }
}
