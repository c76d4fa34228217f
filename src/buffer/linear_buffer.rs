use {
    crate::{Buffer, LinearCursor, Uploader, VkalError},
    anyhow::anyhow,
};

/// A bump allocator over one [Buffer].
///
/// Every `add` returns the offset its data starts at. Offsets are never
/// reused until [LinearBuffer::reset] rewinds the whole buffer, after which
/// every previously returned offset is meaningless. Dynamic batches reset
/// once per frame and re-add everything they draw.
#[derive(Debug)]
pub struct LinearBuffer {
    buffer: Buffer,
    cursor: LinearCursor,
}

impl LinearBuffer {
    pub fn new(buffer: Buffer) -> Self {
        let cursor = LinearCursor::new(buffer.name(), buffer.size());
        Self { buffer, cursor }
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    pub fn into_buffer(self) -> Buffer {
        self.buffer
    }

    /// The offset the next `add` will use (before alignment).
    pub fn offset(&self) -> u64 {
        self.cursor.offset()
    }

    pub fn free(&self) -> u64 {
        self.cursor.free()
    }

    pub fn is_host_visible(&self) -> bool {
        self.buffer.mapping().is_some()
    }

    /// Append `count` elements of `element_size` bytes each.
    ///
    /// Host visible buffers are written through their mapping, anything else
    /// goes through the uploader. Returns the offset of the first element.
    /// When the data does not fit nothing is written and the cursor stays
    /// where it was.
    ///
    /// # Safety
    ///
    /// The written range must not be in use by pending GPU work.
    pub unsafe fn add_bytes(
        &mut self,
        bytes: &[u8],
        element_size: u64,
        count: u64,
        uploader: &mut impl Uploader,
    ) -> Result<u64, VkalError> {
        let required = element_size.checked_mul(count).ok_or_else(|| {
            anyhow!("{} elements of {} bytes overflow", count, element_size)
        })?;
        if bytes.len() as u64 != required {
            return Err(anyhow!(
                "{}: expected {} bytes ({} x {}) but got {}",
                self.buffer.name(),
                required,
                count,
                element_size,
                bytes.len()
            )
            .into());
        }
        let offset = self.cursor.claim(required, 1)?;
        let written = match self.buffer.mapping_mut() {
            Some(mapping) => mapping.write(offset, bytes),
            None => uploader.upload(self.buffer.raw(), offset, bytes),
        };
        if let Err(err) = written {
            self.cursor.truncate(offset);
            return Err(err);
        }
        Ok(offset)
    }

    /// Append a slice of plain-old-data elements.
    ///
    /// # Safety
    ///
    /// See [LinearBuffer::add_bytes].
    pub unsafe fn add<T: bytemuck::Pod>(
        &mut self,
        data: &[T],
        uploader: &mut impl Uploader,
    ) -> Result<u64, VkalError> {
        self.add_bytes(
            bytemuck::cast_slice(data),
            std::mem::size_of::<T>() as u64,
            data.len() as u64,
            uploader,
        )
    }

    /// Claim an aligned range without writing anything to it.
    pub fn reserve(
        &mut self,
        size_in_bytes: u64,
        alignment: u64,
    ) -> Result<u64, VkalError> {
        self.cursor.claim(size_in_bytes, alignment)
    }

    /// Overwrite bytes inside a host visible buffer.
    pub fn write_at(
        &mut self,
        offset: u64,
        bytes: &[u8],
    ) -> Result<(), VkalError> {
        let name = self.buffer.name();
        self.buffer
            .mapping_mut()
            .ok_or(VkalError::NotHostVisible(name))?
            .write(offset, bytes)
    }

    /// Read bytes back from a host visible buffer.
    pub fn read_at(&self, offset: u64, len: u64) -> Result<&[u8], VkalError> {
        self.buffer
            .mapping()
            .ok_or(VkalError::NotHostVisible(self.buffer.name()))?
            .read(offset, len)
    }

    /// Rewind to offset zero. Every offset returned so far becomes invalid.
    pub fn reset(&mut self) {
        log::trace!(
            "{} reset after {} bytes",
            self.buffer.name(),
            self.cursor.offset()
        );
        self.cursor.reset();
    }
}
