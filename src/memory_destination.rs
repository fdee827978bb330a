//! Push-side in-memory destination that grows in fixed-size chunks.

/// Growth step of the output buffer.
pub const DESTINATION_CHUNK_SIZE: usize = 4096;

#[derive(Debug, Default)]
pub struct MemoryDestination {
    buffer: Vec<u8>,
    position: usize,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensures at least one chunk of room and rewinds the write cursor.
    pub fn init(&mut self) {
        if self.buffer.len() < DESTINATION_CHUNK_SIZE {
            self.buffer.resize(DESTINATION_CHUNK_SIZE, 0);
        }
        self.position = 0;
    }

    /// Grows the buffer by one chunk. Bytes already written are kept.
    pub fn empty_output_buffer(&mut self) {
        let len = self.buffer.len();
        self.buffer.resize(len + DESTINATION_CHUNK_SIZE, 0);
    }

    /// Drops the unused tail left over from the last growth step.
    pub fn term(&mut self) {
        self.buffer.truncate(self.position);
    }

    pub fn write_u8(&mut self, value: u8) {
        if self.position >= self.buffer.len() {
            self.empty_output_buffer();
        }
        self.buffer[self.position] = value;
        self.position += 1;
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        while self.buffer.len() - self.position < bytes.len() {
            self.empty_output_buffer();
        }
        self.buffer[self.position..self.position + bytes.len()].copy_from_slice(bytes);
        self.position += bytes.len();
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.position
    }

    pub fn is_empty(&self) -> bool {
        self.position == 0
    }

    pub fn written(&self) -> &[u8] {
        &self.buffer[..self.position]
    }

    /// Terminates the destination and hands back exactly the written bytes.
    pub fn into_inner(mut self) -> Vec<u8> {
        self.term();
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_allocates_first_chunk() {
        let mut destination = MemoryDestination::new();
        assert_eq!(destination.buffer.len(), 0);
        destination.init();
        assert_eq!(destination.buffer.len(), DESTINATION_CHUNK_SIZE);
        assert!(destination.is_empty());
    }

    #[test]
    fn test_growth_preserves_written_bytes() {
        let mut destination = MemoryDestination::new();
        destination.init();
        for i in 0..(DESTINATION_CHUNK_SIZE * 2 + 10) {
            destination.write_u8((i % 251) as u8);
        }
        assert_eq!(destination.buffer.len(), DESTINATION_CHUNK_SIZE * 3);
        let bytes = destination.into_inner();
        assert_eq!(bytes.len(), DESTINATION_CHUNK_SIZE * 2 + 10);
        assert!(bytes.iter().enumerate().all(|(i, &b)| b == (i % 251) as u8));
    }

    #[test]
    fn test_write_bytes_across_chunk_boundary() {
        let mut destination = MemoryDestination::new();
        destination.write_bytes(&[7u8; 5000]);
        destination.write_u8(9);
        assert_eq!(destination.len(), 5001);
        assert_eq!(destination.written()[4999], 7);
        assert_eq!(destination.written()[5000], 9);
    }

    #[test]
    fn test_term_truncates_to_written_length() {
        let mut destination = MemoryDestination::new();
        destination.init();
        destination.write_bytes(&[4, 5]);
        destination.term();
        assert_eq!(destination.into_inner(), vec![4, 5]);
    }
}
