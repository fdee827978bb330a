//! DCT-based JPEG (ISO/IEC 10918-1 / ITU-T T.81) in the coefficient domain.
//!
//! Nothing here touches pixels: streams are entropy decoded to quantized DCT
//! coefficients, rearranged, and entropy encoded again.
//!
//! Features:
//! - Baseline, extended sequential and progressive Huffman-coded input.
//! - Restart intervals (DRI/RSTm) on input.
//! - Baseline output with the standard Annex K Huffman tables.
//! - Lossless rotations, flips, transposition and transversion.

pub mod coefficients;
pub mod decoder;
pub mod encoder;
pub mod huffman;
pub mod transform;

pub use coefficients::CoefficientImage;
pub use decoder::Jpeg1Decoder;
pub use encoder::Jpeg1Encoder;
pub use transform::{TransformCode, TransformWorkspace};
