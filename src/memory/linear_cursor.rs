use crate::{PrettySize, VkalError};

/// A bump cursor over a fixed range of bytes.
///
/// Claims only ever move the cursor forward. Nothing is freed individually,
/// [LinearCursor::reset] rewinds to zero and every offset handed out before
/// the reset must be considered invalid.
#[derive(Debug, Clone)]
pub struct LinearCursor {
    name: &'static str,
    size: u64,
    offset: u64,
}

impl LinearCursor {
    pub fn new(name: &'static str, size: u64) -> Self {
        Self {
            name,
            size,
            offset: 0,
        }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// The next unclaimed byte.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Bytes left after the cursor.
    pub fn free(&self) -> u64 {
        self.size - self.offset
    }

    /// Claim `size_in_bytes` starting at the next multiple of `alignment`.
    ///
    /// Returns the start of the claimed range. On failure the cursor does not
    /// move.
    pub fn claim(
        &mut self,
        size_in_bytes: u64,
        alignment: u64,
    ) -> Result<u64, VkalError> {
        let start = self.aligned_offset(alignment);
        let end = start
            .checked_add(size_in_bytes)
            .filter(|&end| end <= self.size)
            .ok_or(VkalError::OutOfSpace {
                name: self.name,
                requested: PrettySize(size_in_bytes),
                available: PrettySize(self.size.saturating_sub(start)),
            })?;
        self.offset = end;
        log::trace!(
            "{}: claimed {} at {} ({} free)",
            self.name,
            PrettySize(size_in_bytes),
            start,
            PrettySize(self.free())
        );
        Ok(start)
    }

    /// True when [LinearCursor::claim] would succeed.
    pub fn can_claim(&self, size_in_bytes: u64, alignment: u64) -> bool {
        self.aligned_offset(alignment)
            .checked_add(size_in_bytes)
            .is_some_and(|end| end <= self.size)
    }

    pub fn reset(&mut self) {
        self.offset = 0;
    }

    /// Move the cursor back to `offset`, undoing the claims made after it.
    /// Offsets past the cursor are ignored.
    pub fn truncate(&mut self, offset: u64) {
        self.offset = self.offset.min(offset);
    }

    fn aligned_offset(&self, alignment: u64) -> u64 {
        num::Integer::next_multiple_of(&self.offset, &alignment.max(1))
    }
}
