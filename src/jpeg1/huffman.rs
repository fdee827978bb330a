//! Huffman coding for sequential and progressive JPEG scans.
//! Handles DHT-defined and standard (Annex K) tables and bit-stream packing.

use crate::error::CodecError;
use crate::memory_destination::MemoryDestination;

/// Represents a Huffman code with its bit value and length.
#[derive(Debug, Clone, Copy, Default)]
pub struct HuffmanCode {
    pub value: u16,
    pub length: u8,
}

/// Standard JPEG DC luminance Huffman table lengths (Table K.3).
pub const STD_LUMINANCE_DC_LENGTHS: [u8; 16] = [0, 1, 5, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0];

/// Standard JPEG DC Huffman table values, shared by luminance and chrominance.
pub const STD_DC_VALUES: [u8; 12] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11];

/// Standard JPEG DC chrominance Huffman table lengths (Table K.4).
pub const STD_CHROMINANCE_DC_LENGTHS: [u8; 16] = [0, 3, 1, 1, 1, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0];

/// Standard JPEG AC luminance Huffman table lengths (Table K.5).
pub const STD_LUMINANCE_AC_LENGTHS: [u8; 16] = [0, 2, 1, 3, 3, 2, 4, 3, 5, 5, 4, 4, 0, 0, 1, 125];

#[rustfmt::skip]
pub const STD_LUMINANCE_AC_VALUES: [u8; 162] = [
    0x01, 0x02, 0x03, 0x00, 0x04, 0x11, 0x05, 0x12,
    0x21, 0x31, 0x41, 0x06, 0x13, 0x51, 0x61, 0x07,
    0x22, 0x71, 0x14, 0x32, 0x81, 0x91, 0xa1, 0x08,
    0x23, 0x42, 0xb1, 0xc1, 0x15, 0x52, 0xd1, 0xf0,
    0x24, 0x33, 0x62, 0x72, 0x82, 0x09, 0x0a, 0x16,
    0x17, 0x18, 0x19, 0x1a, 0x25, 0x26, 0x27, 0x28,
    0x29, 0x2a, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39,
    0x3a, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x49,
    0x4a, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59,
    0x5a, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68, 0x69,
    0x6a, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79,
    0x7a, 0x83, 0x84, 0x85, 0x86, 0x87, 0x88, 0x89,
    0x8a, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97, 0x98,
    0x99, 0x9a, 0xa2, 0xa3, 0xa4, 0xa5, 0xa6, 0xa7,
    0xa8, 0xa9, 0xaa, 0xb2, 0xb3, 0xb4, 0xb5, 0xb6,
    0xb7, 0xb8, 0xb9, 0xba, 0xc2, 0xc3, 0xc4, 0xc5,
    0xc6, 0xc7, 0xc8, 0xc9, 0xca, 0xd2, 0xd3, 0xd4,
    0xd5, 0xd6, 0xd7, 0xd8, 0xd9, 0xda, 0xe1, 0xe2,
    0xe3, 0xe4, 0xe5, 0xe6, 0xe7, 0xe8, 0xe9, 0xea,
    0xf1, 0xf2, 0xf3, 0xf4, 0xf5, 0xf6, 0xf7, 0xf8,
    0xf9, 0xfa,
];

/// Standard JPEG AC chrominance Huffman table lengths (Table K.6).
pub const STD_CHROMINANCE_AC_LENGTHS: [u8; 16] = [0, 2, 1, 2, 4, 4, 3, 4, 7, 5, 4, 4, 0, 1, 2, 119];

#[rustfmt::skip]
pub const STD_CHROMINANCE_AC_VALUES: [u8; 162] = [
    0x00, 0x01, 0x02, 0x03, 0x11, 0x04, 0x05, 0x21,
    0x31, 0x06, 0x12, 0x41, 0x51, 0x07, 0x61, 0x71,
    0x13, 0x22, 0x32, 0x81, 0x08, 0x14, 0x42, 0x91,
    0xa1, 0xb1, 0xc1, 0x09, 0x23, 0x33, 0x52, 0xf0,
    0x15, 0x62, 0x72, 0xd1, 0x0a, 0x16, 0x24, 0x34,
    0xe1, 0x25, 0xf1, 0x17, 0x18, 0x19, 0x1a, 0x26,
    0x27, 0x28, 0x29, 0x2a, 0x35, 0x36, 0x37, 0x38,
    0x39, 0x3a, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48,
    0x49, 0x4a, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58,
    0x59, 0x5a, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68,
    0x69, 0x6a, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78,
    0x79, 0x7a, 0x82, 0x83, 0x84, 0x85, 0x86, 0x87,
    0x88, 0x89, 0x8a, 0x92, 0x93, 0x94, 0x95, 0x96,
    0x97, 0x98, 0x99, 0x9a, 0xa2, 0xa3, 0xa4, 0xa5,
    0xa6, 0xa7, 0xa8, 0xa9, 0xaa, 0xb2, 0xb3, 0xb4,
    0xb5, 0xb6, 0xb7, 0xb8, 0xb9, 0xba, 0xc2, 0xc3,
    0xc4, 0xc5, 0xc6, 0xc7, 0xc8, 0xc9, 0xca, 0xd2,
    0xd3, 0xd4, 0xd5, 0xd6, 0xd7, 0xd8, 0xd9, 0xda,
    0xe2, 0xe3, 0xe4, 0xe5, 0xe6, 0xe7, 0xe8, 0xe9,
    0xea, 0xf2, 0xf3, 0xf4, 0xf5, 0xf6, 0xf7, 0xf8,
    0xf9, 0xfa,
];

/// Encapsulates MSB-aligned Huffman table for encoding and decoding.
#[derive(Clone)]
pub struct HuffmanTable {
    pub codes: [HuffmanCode; 256],
    pub lengths: [u8; 16],
    pub values: Vec<u8>,

    // Decoding fields
    pub min_code: [i32; 16],
    pub max_code: [i32; 16],
    pub val_ptr: [i32; 16],
}

impl std::fmt::Debug for HuffmanTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HuffmanTable")
            .field("lengths", &self.lengths)
            .field("values", &self.values.len())
            .finish()
    }
}

impl HuffmanTable {
    fn empty() -> Self {
        Self {
            codes: [HuffmanCode::default(); 256],
            lengths: [0; 16],
            values: Vec::new(),
            min_code: [0; 16],
            max_code: [-1; 16],
            val_ptr: [0; 16],
        }
    }

    /// Builds a table from JPEG DHT lengths and values.
    ///
    /// Fails when the counts do not match the values or when the code space
    /// overflows for some length.
    pub fn build_from_dht(lengths: &[u8; 16], values: &[u8]) -> Result<Self, CodecError> {
        let total: usize = lengths.iter().map(|&n| n as usize).sum();
        if total != values.len() || total > 256 {
            return Err(CodecError::InvalidHuffmanTable);
        }

        let mut table = Self::empty();
        table.lengths.copy_from_slice(lengths);
        table.values = values.to_vec();

        let mut code = 0u32;
        let mut val_idx = 0;

        for i in 0..16 {
            let n_codes = lengths[i] as usize;
            if n_codes == 0 {
                table.max_code[i] = -1;
            } else {
                table.val_ptr[i] = val_idx as i32;
                table.min_code[i] = code as i32;
                for _ in 0..n_codes {
                    if code >= (1u32 << (i + 1)) {
                        return Err(CodecError::InvalidHuffmanTable);
                    }
                    let val = values[val_idx] as usize;
                    table.codes[val] = HuffmanCode {
                        value: code as u16,
                        length: (i + 1) as u8,
                    };
                    code += 1;
                    val_idx += 1;
                }
                table.max_code[i] = code as i32 - 1;
            }
            code <<= 1;
        }
        Ok(table)
    }

    fn standard(lengths: &[u8; 16], values: &[u8]) -> Self {
        // The Annex K tables are well formed; fall back to an empty table only
        // to keep this infallible.
        Self::build_from_dht(lengths, values).unwrap_or_else(|_| Self::empty())
    }

    pub fn standard_luminance_dc() -> Self {
        Self::standard(&STD_LUMINANCE_DC_LENGTHS, &STD_DC_VALUES)
    }

    pub fn standard_chrominance_dc() -> Self {
        Self::standard(&STD_CHROMINANCE_DC_LENGTHS, &STD_DC_VALUES)
    }

    /// Returns the standard Luminance AC Huffman table.
    pub fn standard_luminance_ac() -> Self {
        Self::standard(&STD_LUMINANCE_AC_LENGTHS, &STD_LUMINANCE_AC_VALUES)
    }

    pub fn standard_chrominance_ac() -> Self {
        Self::standard(&STD_CHROMINANCE_AC_LENGTHS, &STD_CHROMINANCE_AC_VALUES)
    }

    /// Code for `symbol`, or an error if the table has no code for it.
    pub fn code_for(&self, symbol: u8) -> Result<HuffmanCode, CodecError> {
        let code = self.codes[symbol as usize];
        if code.length == 0 {
            return Err(CodecError::UnencodableCoefficient);
        }
        Ok(code)
    }

    /// Decodes the next symbol from the given JpegBitReader.
    pub fn decode(&self, reader: &mut JpegBitReader) -> Result<u8, CodecError> {
        let mut code = 0i32;
        for i in 0..16 {
            let bit = reader.read_bits(1)? as i32;
            code = (code << 1) | bit;
            if code <= self.max_code[i] {
                let idx = self.val_ptr[i] + (code - self.min_code[i]);
                return self
                    .values
                    .get(idx as usize)
                    .copied()
                    .ok_or(CodecError::InvalidHuffmanCode);
            }
        }
        Err(CodecError::InvalidHuffmanCode)
    }
}

/// Reads entropy-coded bits, removing FF00 stuffing.
///
/// When a marker is reached the reader stops consuming input and yields zero
/// bits, leaving the marker for the segment reader. Running off the end of the
/// buffer is an error.
pub struct JpegBitReader<'a> {
    source: &'a [u8],
    position: usize,
    bit_buffer: u32,
    bits_in_buffer: i32,
    marker_reached: bool,
}

impl<'a> JpegBitReader<'a> {
    pub fn new(source: &'a [u8]) -> Self {
        Self {
            source,
            position: 0,
            bit_buffer: 0,
            bits_in_buffer: 0,
            marker_reached: false,
        }
    }

    pub fn read_bits(&mut self, count: u8) -> Result<u16, CodecError> {
        if count == 0 {
            return Ok(0);
        }
        let count = count as i32;
        while self.bits_in_buffer < count {
            let byte = self.read_byte_unstuffed()?;
            self.bit_buffer = (self.bit_buffer << 8) | (byte as u32);
            self.bits_in_buffer += 8;
        }

        let shift = self.bits_in_buffer - count;
        let value = (self.bit_buffer >> shift) & ((1u32 << count) - 1);
        self.bits_in_buffer -= count;
        self.bit_buffer &= (1u32 << self.bits_in_buffer) - 1;
        Ok(value as u16)
    }

    pub fn read_bit(&mut self) -> Result<bool, CodecError> {
        Ok(self.read_bits(1)? != 0)
    }

    /// Reads `category` magnitude bits and sign-extends them (F.2.2.1).
    pub fn receive_extend(&mut self, category: u8) -> Result<i32, CodecError> {
        if category > 16 {
            return Err(CodecError::CoefficientOutOfRange);
        }
        let bits = self.read_bits(category)?;
        Ok(extend(bits, category))
    }

    fn read_byte_unstuffed(&mut self) -> Result<u8, CodecError> {
        if self.marker_reached {
            return Ok(0);
        }
        let byte = *self
            .source
            .get(self.position)
            .ok_or(CodecError::NeedMoreData)?;

        if byte == 0xFF {
            let next_byte = *self
                .source
                .get(self.position + 1)
                .ok_or(CodecError::NeedMoreData)?;
            if next_byte != 0x00 {
                self.marker_reached = true;
                return Ok(0);
            }
            self.position += 2;
            return Ok(0xFF);
        }
        self.position += 1;
        Ok(byte)
    }

    /// Discards buffered bits and consumes the expected RSTn marker.
    pub fn process_restart(&mut self, expected: u8) -> Result<(), CodecError> {
        self.bit_buffer = 0;
        self.bits_in_buffer = 0;
        self.marker_reached = false;

        while self.source.get(self.position) == Some(&0xFF)
            && self.source.get(self.position + 1) == Some(&0xFF)
        {
            self.position += 1;
        }
        match (self.source.get(self.position), self.source.get(self.position + 1)) {
            (Some(&0xFF), Some(&marker)) if marker == 0xD0 + (expected & 7) => {
                self.position += 2;
                Ok(())
            }
            (None, _) | (Some(&0xFF), None) => Err(CodecError::NeedMoreData),
            _ => Err(CodecError::InvalidData),
        }
    }

    /// Bytes consumed from the start of the entropy-coded segment.
    pub fn position(&self) -> usize {
        self.position
    }
}

/// Packs bits into a [`MemoryDestination`] with FF00 stuffing.
pub struct JpegBitWriter<'a> {
    destination: &'a mut MemoryDestination,
    bit_buffer: u32,
    bits_in_buffer: i32,
}

impl<'a> JpegBitWriter<'a> {
    pub fn new(destination: &'a mut MemoryDestination) -> Self {
        Self {
            destination,
            bit_buffer: 0,
            bits_in_buffer: 0,
        }
    }

    pub fn write_bits(&mut self, value: u16, length: u8) {
        if length == 0 {
            return;
        }
        let length = length as i32;
        let mask = (1u32 << length) - 1;
        self.bit_buffer = (self.bit_buffer << length) | (value as u32 & mask);
        self.bits_in_buffer += length;

        while self.bits_in_buffer >= 8 {
            let shift = self.bits_in_buffer - 8;
            let byte = ((self.bit_buffer >> shift) & 0xFF) as u8;
            self.emit_byte(byte);
            self.bits_in_buffer = shift;
            self.bit_buffer &= (1u32 << shift) - 1;
        }
    }

    pub fn write_code(&mut self, code: HuffmanCode) {
        self.write_bits(code.value, code.length);
    }

    fn emit_byte(&mut self, byte: u8) {
        self.destination.write_u8(byte);
        if byte == 0xFF {
            self.destination.write_u8(0x00);
        }
    }

    /// Pads the final partial byte with one bits.
    pub fn flush(&mut self) {
        if self.bits_in_buffer > 0 {
            let pad_bits = 8 - self.bits_in_buffer;
            let value = (1u32 << pad_bits) - 1;
            self.write_bits(value as u16, pad_bits as u8);
        }
    }
}

/// Computes the magnitude category of an integer (ISO/IEC 10918-1 F.1.2.1).
pub fn category(value: i32) -> u8 {
    if value == 0 {
        return 0;
    }
    (32 - value.unsigned_abs().leading_zeros()) as u8
}

/// Encodes the bits for a given category and value (ISO/IEC 10918-1 F.1.2.1.1).
pub fn magnitude_bits(value: i32, category: u8) -> (u16, u8) {
    if category == 0 {
        return (0, 0);
    }
    if value >= 0 {
        (value as u16, category)
    } else {
        ((value + (1 << category) - 1) as u16, category)
    }
}

/// Decodes the value from bits given its category (ISO/IEC 10918-1 F.2.2.1).
pub fn extend(bits: u16, category: u8) -> i32 {
    if category == 0 {
        return 0;
    }
    let threshold = 1i32 << (category - 1);
    let bits = bits as i32;
    if bits >= threshold {
        bits
    } else {
        bits - (1i32 << category) + 1
    }
}
