//! Lossless geometric transforms on quantized DCT coefficients.
//!
//! Blocks are moved and their coefficients sign-flipped or transposed; nothing
//! is requantized. Partial iMCUs at the right and bottom edges cannot be
//! mirrored without trimming, so they stay in place and only get the part of
//! the transform that does not move them across the edge.

use crate::error::CodecError;
use crate::jpeg_stream_reader::{FrameComponent, QuantizationTable};
use crate::jpeg1::coefficients::{CoefficientBlock, CoefficientImage, ZIGZAG_ORDER};

/// Geometric transform understood by the coefficient engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformCode {
    None,
    FlipH,
    FlipV,
    Transpose,
    Transverse,
    Rot90,
    Rot180,
    Rot270,
}

impl TransformCode {
    /// Transforms that exchange width and height.
    pub fn swaps_dimensions(self) -> bool {
        matches!(
            self,
            TransformCode::Transpose | TransformCode::Transverse | TransformCode::Rot90 | TransformCode::Rot270
        )
    }
}

/// Per-block coefficient operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOp {
    Copy,
    FlipH,
    FlipV,
    Rot180,
    Transpose,
    Rot90,
    Rot270,
    Transverse,
}

/// Applies `op` to a block in natural order (index `v * 8 + u`).
pub fn apply_block_op(op: BlockOp, src: &CoefficientBlock) -> CoefficientBlock {
    let mut dst = [0i16; 64];
    for v in 0..8 {
        for u in 0..8 {
            let (value, negate) = match op {
                BlockOp::Copy => (src[v * 8 + u], false),
                BlockOp::FlipH => (src[v * 8 + u], u % 2 == 1),
                BlockOp::FlipV => (src[v * 8 + u], v % 2 == 1),
                BlockOp::Rot180 => (src[v * 8 + u], (u + v) % 2 == 1),
                BlockOp::Transpose => (src[u * 8 + v], false),
                BlockOp::Rot90 => (src[u * 8 + v], u % 2 == 1),
                BlockOp::Rot270 => (src[u * 8 + v], v % 2 == 1),
                BlockOp::Transverse => (src[u * 8 + v], (u + v) % 2 == 1),
            };
            dst[v * 8 + u] = if negate { value.wrapping_neg() } else { value };
        }
    }
    dst
}

/// Source block and operation for destination block (x, y).
///
/// `cw` and `ch` are the component's block counts covered by whole iMCUs in
/// the destination.
pub fn source_block(code: TransformCode, x: usize, y: usize, cw: usize, ch: usize) -> (usize, usize, BlockOp) {
    let in_w = x < cw;
    let in_h = y < ch;
    match code {
        TransformCode::None => (x, y, BlockOp::Copy),
        TransformCode::FlipH if in_w => (cw - 1 - x, y, BlockOp::FlipH),
        TransformCode::FlipH => (x, y, BlockOp::Copy),
        TransformCode::FlipV if in_h => (x, ch - 1 - y, BlockOp::FlipV),
        TransformCode::FlipV => (x, y, BlockOp::Copy),
        TransformCode::Transpose => (y, x, BlockOp::Transpose),
        TransformCode::Rot90 if in_w => (y, cw - 1 - x, BlockOp::Rot90),
        TransformCode::Rot90 => (y, x, BlockOp::Transpose),
        TransformCode::Rot270 if in_h => (ch - 1 - y, x, BlockOp::Rot270),
        TransformCode::Rot270 => (y, x, BlockOp::Transpose),
        TransformCode::Rot180 => match (in_w, in_h) {
            (true, true) => (cw - 1 - x, ch - 1 - y, BlockOp::Rot180),
            (false, true) => (x, ch - 1 - y, BlockOp::FlipV),
            (true, false) => (cw - 1 - x, y, BlockOp::FlipH),
            (false, false) => (x, y, BlockOp::Copy),
        },
        TransformCode::Transverse => match (in_w, in_h) {
            (true, true) => (ch - 1 - y, cw - 1 - x, BlockOp::Transverse),
            (false, true) => (ch - 1 - y, x, BlockOp::Rot270),
            (true, false) => (y, cw - 1 - x, BlockOp::Rot90),
            (false, false) => (y, x, BlockOp::Transpose),
        },
    }
}

/// Quantization table of a transposed block, still in zigzag order.
pub fn transpose_quantization_table(table: &QuantizationTable) -> QuantizationTable {
    let mut zigzag_index = [0usize; 64];
    for (k, &natural) in ZIGZAG_ORDER.iter().enumerate() {
        zigzag_index[natural] = k;
    }
    let mut values = [0u16; 64];
    for (k, &natural) in ZIGZAG_ORDER.iter().enumerate() {
        let (v, u) = (natural / 8, natural % 8);
        values[k] = table.values[zigzag_index[u * 8 + v]];
    }
    QuantizationTable { values }
}

/// Destination arrays for a transform, sized before any coefficient moves.
#[derive(Debug)]
pub struct TransformWorkspace {
    code: TransformCode,
    destination: CoefficientImage,
}

impl TransformWorkspace {
    /// Allocates destination coefficient arrays for applying `code` to `source`.
    pub fn request(code: TransformCode, source: &CoefficientImage) -> Result<Self, CodecError> {
        let (width, height) = if code.swaps_dimensions() {
            (source.height, source.width)
        } else {
            (source.width, source.height)
        };
        let components: Vec<FrameComponent> = source
            .frame_components()
            .into_iter()
            .map(|c| {
                if code.swaps_dimensions() {
                    FrameComponent {
                        h_samp_factor: c.v_samp_factor,
                        v_samp_factor: c.h_samp_factor,
                        ..c
                    }
                } else {
                    c
                }
            })
            .collect();

        let mut destination = CoefficientImage::with_components(width, height, &components)?;
        destination.quantization_tables = source.quantization_tables;
        if code.swaps_dimensions() {
            for table in destination.quantization_tables.iter_mut().flatten() {
                *table = transpose_quantization_table(table);
            }
        }
        Ok(Self { code, destination })
    }

    pub fn code(&self) -> TransformCode {
        self.code
    }

    /// Frame parameters the output must be written with.
    pub fn adjusted_parameters(&self) -> (u16, u16, Vec<FrameComponent>) {
        (
            self.destination.width,
            self.destination.height,
            self.destination.frame_components(),
        )
    }

    /// Moves every block of `source` into the destination arrays.
    pub fn execute(mut self, source: &CoefficientImage) -> Result<CoefficientImage, CodecError> {
        if source.components.len() != self.destination.components.len() {
            return Err(CodecError::InvalidParameterComponentCount);
        }
        let mcu_width = self.destination.max_h_samp_factor() as usize * 8;
        let mcu_height = self.destination.max_v_samp_factor() as usize * 8;
        let full_mcus_x = self.destination.width as usize / mcu_width;
        let full_mcus_y = self.destination.height as usize / mcu_height;

        for (dst, src) in self.destination.components.iter_mut().zip(&source.components) {
            let cw = full_mcus_x * dst.h_samp_factor as usize;
            let ch = full_mcus_y * dst.v_samp_factor as usize;
            for y in 0..dst.height_in_blocks {
                for x in 0..dst.width_in_blocks {
                    let (sx, sy, op) = source_block(self.code, x, y, cw, ch);
                    let Some(src_block) = src.block(sx, sy) else {
                        return Err(CodecError::InvalidData);
                    };
                    let transformed = apply_block_op(op, src_block);
                    if let Some(dst_block) = dst.block_mut(x, y) {
                        *dst_block = transformed;
                    }
                }
            }
        }
        Ok(self.destination)
    }
}
