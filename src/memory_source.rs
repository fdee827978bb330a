//! Pull-side in-memory source.
//!
//! The whole compressed stream is resident, so refilling never blocks: once the
//! cursor reaches the end, `fill_input_buffer` reports that no more data will
//! arrive and readers fail with [`CodecError::NeedMoreData`].

use crate::error::CodecError;

#[derive(Debug, Clone)]
pub struct MemorySource<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> MemorySource<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Nothing to set up: the buffer is already in memory.
    pub fn init(&mut self) {}

    /// Called when the cursor hits the end of the buffer. Always `false`,
    /// meaning end of data.
    pub fn fill_input_buffer(&mut self) -> bool {
        false
    }

    /// Advances the cursor by `count` bytes, clamped to what is left.
    pub fn skip_input_data(&mut self, count: usize) {
        self.position += count.min(self.data.len() - self.position);
    }

    pub fn term(&mut self) {}

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        if self.position >= self.data.len() && !self.fill_input_buffer() {
            return Err(CodecError::NeedMoreData);
        }
        let value = self.data[self.position];
        self.position += 1;
        Ok(value)
    }

    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        let high = self.read_u8()? as u16;
        let low = self.read_u8()? as u16;
        Ok((high << 8) | low)
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8], CodecError> {
        if count > self.data.len() - self.position {
            self.position = self.data.len();
            return Err(CodecError::NeedMoreData);
        }
        let bytes = &self.data[self.position..self.position + count];
        self.position += count;
        Ok(bytes)
    }

    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.position..]
    }

    pub fn position(&self) -> usize {
        self.position
    }
}
