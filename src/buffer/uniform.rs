use {
    crate::{LinearBuffer, PrettySize, VkalError},
    anyhow::anyhow,
    ash::vk,
};

/// A region of the uniform buffer holding `count` equally sized elements.
///
/// Elements are spaced by `stride`, which is the element size rounded up to
/// the device's uniform offset alignment, so each one can be bound with a
/// dynamic or static offset on its own.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct UniformBuffer {
    pub offset: u64,
    pub element_size: u64,
    pub stride: u64,
    pub count: u32,
    pub binding: u32,
}

impl UniformBuffer {
    /// Reserve space for `count` elements in the uniform buffer.
    pub fn reserve(
        uniforms: &mut LinearBuffer,
        element_size: u64,
        count: u32,
        binding: u32,
        min_offset_alignment: u64,
    ) -> Result<Self, VkalError> {
        let alignment = min_offset_alignment.max(1);
        let too_large = || VkalError::OutOfSpace {
            name: uniforms.buffer().name(),
            requested: PrettySize(element_size.saturating_mul(count as u64)),
            available: PrettySize(uniforms.free()),
        };
        let stride = element_size
            .max(1)
            .checked_next_multiple_of(alignment)
            .ok_or_else(too_large)?;
        let total = stride
            .checked_mul(count as u64)
            .ok_or_else(too_large)?;
        let offset = uniforms.reserve(total, alignment)?;
        log::trace!(
            "Uniform buffer for binding {}: {} x {} bytes at {}",
            binding,
            count,
            stride,
            offset
        );
        Ok(Self {
            offset,
            element_size,
            stride,
            count,
            binding,
        })
    }

    /// The byte offset of one element inside the uniform buffer.
    pub fn element_offset(&self, index: u32) -> Result<u64, VkalError> {
        if index >= self.count {
            return Err(anyhow!(
                "Uniform element {} out of range for binding {} ({} elements)",
                index,
                self.binding,
                self.count
            )
            .into());
        }
        Ok(self.offset + self.stride * index as u64)
    }

    pub fn total_size(&self) -> u64 {
        self.stride * self.count as u64
    }

    /// The descriptor info for a single element.
    pub fn descriptor_info(
        &self,
        buffer: vk::Buffer,
        index: u32,
    ) -> Result<vk::DescriptorBufferInfo, VkalError> {
        Ok(vk::DescriptorBufferInfo {
            buffer,
            offset: self.element_offset(index)?,
            range: self.element_size,
        })
    }

    /// Write one element through the uniform buffer's host mapping.
    pub fn write(
        &self,
        uniforms: &mut LinearBuffer,
        index: u32,
        bytes: &[u8],
    ) -> Result<(), VkalError> {
        if bytes.len() as u64 > self.element_size {
            return Err(anyhow!(
                "{} bytes do not fit a {} byte uniform element",
                bytes.len(),
                self.element_size
            )
            .into());
        }
        uniforms.write_at(self.element_offset(index)?, bytes)
    }
}
