use {
    crate::{
        commands::{cmd_copy_buffer, TransferCommands},
        BlockAllocator, Buffer, HostOnly, LinearBuffer, MemoryProperties,
        Uploader, VkalConfig, VkalError,
    },
    anyhow::anyhow,
    ash::vk,
};

/// The four buffers every context owns: vertex, index, uniform and staging.
///
/// They are sized once from [VkalConfig] and live until the context is
/// destroyed.
pub struct DefaultBuffers {
    pub vertex: LinearBuffer,
    pub index: LinearBuffer,
    pub uniform: LinearBuffer,
    pub staging: LinearBuffer,
}

impl DefaultBuffers {
    /// # Safety
    ///
    /// [DefaultBuffers::destroy] must be called with the same allocator
    /// before the device is destroyed.
    pub unsafe fn new(
        device: &ash::Device,
        memory_properties: &MemoryProperties,
        allocator: &mut impl BlockAllocator,
        config: &VkalConfig,
    ) -> Result<Self, VkalError> {
        let host_visible = vk::MemoryPropertyFlags::HOST_VISIBLE
            | vk::MemoryPropertyFlags::HOST_COHERENT;
        let geometry_flags = if config.host_visible_geometry {
            host_visible
        } else {
            vk::MemoryPropertyFlags::DEVICE_LOCAL
        };
        let geometry_usage = vk::BufferUsageFlags::TRANSFER_DST
            | vk::BufferUsageFlags::STORAGE_BUFFER;

        let specs = [
            (
                "vertex",
                config.vertex_buffer_size,
                vk::BufferUsageFlags::VERTEX_BUFFER | geometry_usage,
                geometry_flags,
            ),
            (
                "index",
                config.index_buffer_size,
                vk::BufferUsageFlags::INDEX_BUFFER | geometry_usage,
                geometry_flags,
            ),
            (
                "uniform",
                config.uniform_buffer_size,
                vk::BufferUsageFlags::UNIFORM_BUFFER
                    | vk::BufferUsageFlags::TRANSFER_DST,
                host_visible,
            ),
            (
                "staging",
                config.staging_buffer_size,
                vk::BufferUsageFlags::TRANSFER_SRC,
                host_visible,
            ),
        ];

        let mut created: Vec<Buffer> = Vec::with_capacity(specs.len());
        for (name, size, usage, flags) in specs {
            match Buffer::create(
                device,
                memory_properties,
                allocator,
                name,
                size,
                usage,
                flags,
            ) {
                Ok(buffer) => created.push(buffer),
                Err(err) => {
                    for buffer in created {
                        buffer.destroy(device, allocator);
                    }
                    return Err(err);
                }
            }
        }

        let [vertex, index, uniform, staging]: [Buffer; 4] =
            match created.try_into() {
                Ok(buffers) => buffers,
                Err(_) => {
                    return Err(anyhow!("Expected four default buffers").into())
                }
            };
        Ok(Self {
            vertex: LinearBuffer::new(vertex),
            index: LinearBuffer::new(index),
            uniform: LinearBuffer::new(uniform),
            staging: LinearBuffer::new(staging),
        })
    }

    /// # Safety
    ///
    /// None of the buffers may be used by pending GPU work.
    pub unsafe fn destroy(
        self,
        device: &ash::Device,
        allocator: &mut impl BlockAllocator,
    ) {
        for buffer in [self.vertex, self.index, self.uniform, self.staging] {
            buffer.into_buffer().destroy(device, allocator);
        }
    }

    /// Append vertex data and return its byte offset.
    ///
    /// # Safety
    ///
    /// The vertex buffer must not be read by pending GPU work in the range
    /// being written.
    pub unsafe fn add_vertex_bytes(
        &mut self,
        device: &ash::Device,
        transfer: &TransferCommands,
        bytes: &[u8],
        element_size: u64,
        count: u64,
    ) -> Result<u64, VkalError> {
        let mut uploader = StagingUploader {
            device,
            transfer,
            staging: &mut self.staging,
        };
        self.vertex
            .add_bytes(bytes, element_size, count, &mut uploader)
    }

    /// Append index data and return its byte offset.
    ///
    /// # Safety
    ///
    /// See [DefaultBuffers::add_vertex_bytes].
    pub unsafe fn add_index_bytes(
        &mut self,
        device: &ash::Device,
        transfer: &TransferCommands,
        bytes: &[u8],
        element_size: u64,
        count: u64,
    ) -> Result<u64, VkalError> {
        let mut uploader = StagingUploader {
            device,
            transfer,
            staging: &mut self.staging,
        };
        self.index.add_bytes(bytes, element_size, count, &mut uploader)
    }
}

/// Uploads through the staging buffer with a blocking device-side copy.
///
/// Data larger than the staging buffer is copied in staging-sized pieces.
pub struct StagingUploader<'a> {
    pub device: &'a ash::Device,
    pub transfer: &'a TransferCommands,
    pub staging: &'a mut LinearBuffer,
}

impl Uploader for StagingUploader<'_> {
    unsafe fn upload(
        &mut self,
        dst: vk::Buffer,
        dst_offset: u64,
        bytes: &[u8],
    ) -> Result<(), VkalError> {
        let chunk_size = self.staging.buffer().size().max(1) as usize;
        for (index, chunk) in bytes.chunks(chunk_size).enumerate() {
            self.staging.reset();
            let src_offset = self.staging.add_bytes(
                chunk,
                1,
                chunk.len() as u64,
                &mut HostOnly,
            )?;
            let src = self.staging.buffer().raw();
            let chunk_offset = dst_offset + (index * chunk_size) as u64;
            let len = chunk.len() as u64;
            self.transfer.submit_and_wait(self.device, |command_buffer| {
                cmd_copy_buffer(
                    self.device,
                    command_buffer,
                    src,
                    src_offset,
                    dst,
                    chunk_offset,
                    len,
                );
            })?;
        }
        self.staging.reset();
        Ok(())
    }
}
