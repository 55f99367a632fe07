//! Bounded reader over an in-memory byte slice.

use crate::{Error, Result};

/// A cursor over `[start, end)` of a byte slice.
///
/// Every read is checked against `end`; running out of bytes returns
/// [`Error::UnexpectedEof`] instead of panicking, so container parsers can
/// surface truncated input as a structural error.
#[derive(Debug, Clone)]
pub struct Region<'a> {
    data: &'a [u8],
    pos: usize,
    end: usize,
}

impl<'a> Region<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            end: data.len(),
        }
    }

    /// A sub-region of the same buffer spanning `[start, end)`.
    ///
    /// The bounds are clamped to the parent region's end.
    pub fn slice(&self, start: usize, end: usize) -> Self {
        let end = end.min(self.end);
        Self {
            data: self.data,
            pos: start.min(end),
            end,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn remaining(&self) -> usize {
        self.end - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.end
    }

    pub fn seek(&mut self, pos: usize) {
        self.pos = pos.min(self.end);
    }

    /// Take the next `n` bytes and advance.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(Error::UnexpectedEof {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// Look at the next `n` bytes without advancing.
    pub fn peek(&self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(Error::UnexpectedEof {
                needed: n,
                remaining: self.remaining(),
            });
        }
        Ok(&self.data[self.pos..self.pos + n])
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16le(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    pub fn read_u32le(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_u64le(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn read_u16be(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.take(2)?.try_into().unwrap()))
    }

    pub fn read_u24be(&mut self) -> Result<u32> {
        let b = self.take(3)?;
        Ok(u32::from_be_bytes([0, b[0], b[1], b[2]]))
    }

    pub fn read_u32be(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_u64be(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.take(8)?.try_into().unwrap()))
    }

    /// RIFF-style padding: consume one byte when the cursor sits on an odd
    /// offset and the region still has bytes left.
    pub fn pad_to_even(&mut self) -> Result<()> {
        if self.pos % 2 == 1 && self.pos < self.end {
            self.skip(1)?;
        }
        Ok(())
    }
}
