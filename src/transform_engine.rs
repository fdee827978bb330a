//! Lossless geometric rewrite of a JPEG stream.
//!
//! The source is entropy decoded to quantized DCT coefficients, the blocks are
//! rearranged for the requested transform and the result is entropy encoded
//! again. Quantization tables and coefficients never change value, only place
//! and sign, so the decoded pixels of the output are exactly the transformed
//! pixels of the input. APPn and COM segments are carried over verbatim.

use crate::error::{JpegContentError, Result};
use crate::error_trap::ErrorTrap;
use crate::jpeg1::{Jpeg1Decoder, Jpeg1Encoder, TransformCode, TransformWorkspace};

/// Applies `code` to the JPEG stream in `source` and returns the new stream.
/// `TransformCode::None` returns the input bytes untouched.
pub fn transform_jpeg(source: &[u8], code: TransformCode) -> Result<Vec<u8>> {
    if source.is_empty() {
        return Err(JpegContentError::NoData);
    }
    if code == TransformCode::None {
        return Ok(source.to_vec());
    }

    ErrorTrap::new("lossless transform").run(|| {
        let mut decoder = Jpeg1Decoder::new(source);
        decoder.save_markers(true);
        let frame = decoder.read_header()?;
        log::debug!(
            "transforming {}x{} ({} components) with {code:?}",
            frame.width,
            frame.height,
            frame.components.len()
        );

        let coefficients = decoder.read_coefficients()?;
        let markers = decoder.take_markers();

        let workspace = TransformWorkspace::request(code, &coefficients)?;
        let (width, height, _) = workspace.adjusted_parameters();
        let transformed = workspace.execute(&coefficients)?;
        log::debug!("output frame {width}x{height}, {} saved markers", markers.len());

        Jpeg1Encoder::new().encode(&transformed, &markers)
    })
}
