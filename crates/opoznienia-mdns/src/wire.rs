//! Bounds-checked cursor over a received packet.

use crate::error::WireError;

/// Reads big-endian integers from a borrowed buffer.
///
/// The whole message is kept, not just the unread tail, so that name
/// compression pointers can jump back to earlier offsets.
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    /// Borrow `n` bytes starting at the cursor and advance past them.
    pub(crate) fn bytes(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        let slice = self.peek_at(self.pos, n)?;
        self.pos += n;
        Ok(slice)
    }

    /// Borrow `n` bytes at an absolute offset without moving the cursor.
    pub(crate) fn peek_at(&self, offset: usize, n: usize) -> Result<&'a [u8], WireError> {
        offset
            .checked_add(n)
            .and_then(|end| self.buf.get(offset..end))
            .ok_or(WireError::Truncated { offset, needed: n })
    }

    pub(crate) fn u8(&mut self) -> Result<u8, WireError> {
        Ok(self.bytes(1)?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16, WireError> {
        let b = self.bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub(crate) fn u32(&mut self) -> Result<u32, WireError> {
        let b = self.bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}
