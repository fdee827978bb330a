//! Header-only size probe.

use crate::error::{JpegContentError, Result};
use crate::jpeg_stream_reader::JpegStreamReader;
use crate::orientation::Orientation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PixelSize {
    pub width: u32,
    pub height: u32,
}

impl PixelSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn transposed(self) -> Self {
        Self::new(self.height, self.width)
    }
}

impl std::fmt::Display for PixelSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Encoded size from the SOFn segment. Nothing past the first SOS is read.
pub fn probe_encoded_size(raw: &[u8]) -> Result<PixelSize> {
    if raw.is_empty() {
        return Err(JpegContentError::NoData);
    }
    let mut reader = JpegStreamReader::new(raw);
    let frame = reader.read_header().map_err(JpegContentError::CorruptHeader)?;
    let size = PixelSize::new(frame.width as u32, frame.height as u32);
    log::debug!("encoded size {size}");
    Ok(size)
}

/// The encoded size as it should be displayed under `orientation`.
pub fn display_size(encoded: PixelSize, orientation: Orientation) -> PixelSize {
    if orientation.swaps_dimensions() {
        encoded.transposed()
    } else {
        encoded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;

    /// SOI, DQT, SOF0 (width x height, one component), SOS. No scan data.
    fn header(width: u16, height: u16) -> Vec<u8> {
        let mut data = vec![0xFF, 0xD8, 0xFF, 0xDB, 0x00, 0x43, 0x00];
        data.extend(std::iter::repeat_n(1u8, 64));
        data.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x0B, 8]);
        data.extend_from_slice(&height.to_be_bytes());
        data.extend_from_slice(&width.to_be_bytes());
        data.extend_from_slice(&[1, 1, 0x11, 0]);
        data.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x08, 1, 1, 0x00, 0, 63, 0]);
        data
    }

    #[test]
    fn test_encoded_size() {
        assert_eq!(probe_encoded_size(&header(256, 128)).unwrap(), PixelSize::new(256, 128));
    }

    #[test]
    fn test_quarter_turns_swap() {
        let encoded = probe_encoded_size(&header(256, 128)).unwrap();
        for orientation in [
            Orientation::Transpose,
            Orientation::Rot90,
            Orientation::Transverse,
            Orientation::Rot270,
        ] {
            assert_eq!(display_size(encoded, orientation), PixelSize::new(128, 256));
        }
        for orientation in [
            Orientation::NotAvailable,
            Orientation::Normal,
            Orientation::HFlip,
            Orientation::Rot180,
            Orientation::VFlip,
        ] {
            assert_eq!(display_size(encoded, orientation), PixelSize::new(256, 128));
        }
    }

    #[test]
    fn test_empty_is_no_data() {
        assert!(matches!(probe_encoded_size(&[]), Err(JpegContentError::NoData)));
    }

    #[test]
    fn test_corrupt_header() {
        let mut data = header(64, 64);
        data.truncate(20);
        assert!(matches!(
            probe_encoded_size(&data),
            Err(JpegContentError::CorruptHeader(CodecError::NeedMoreData))
        ));
        assert!(matches!(
            probe_encoded_size(b"plain text"),
            Err(JpegContentError::CorruptHeader(CodecError::StartOfImageMarkerNotFound))
        ));
    }
}
