//! Quantized DCT coefficient storage.
//!
//! Each component keeps a grid of 8x8 blocks in natural (row-major) order,
//! padded out to whole MCUs so interleaved scans can address every block.

use crate::error::CodecError;
use crate::jpeg_stream_reader::{FrameComponent, FrameHeader, QuantizationTable};

/// 64 quantized coefficients of one block, natural order, index `v * 8 + u`.
pub type CoefficientBlock = [i16; 64];

/// Zigzag scan pattern for 8x8 blocks: entry `k` is the natural index of the
/// `k`-th coefficient in coding order.
#[rustfmt::skip]
pub const ZIGZAG_ORDER: [usize; 64] = [
    0,  1,  8, 16,  9,  2,  3, 10,
    17, 24, 32, 25, 18, 11,  4,  5,
    12, 19, 26, 33, 40, 48, 41, 34,
    27, 20, 13,  6,  7, 14, 21, 28,
    35, 42, 49, 56, 57, 50, 43, 36,
    29, 22, 15, 23, 30, 37, 44, 51,
    58, 59, 52, 45, 38, 31, 39, 46,
    53, 60, 61, 54, 47, 55, 62, 63,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentCoefficients {
    pub id: u8,
    pub h_samp_factor: u8,
    pub v_samp_factor: u8,
    pub quant_table_dest: u8,
    /// Blocks covering real image samples.
    pub width_in_blocks: usize,
    pub height_in_blocks: usize,
    /// Allocated grid, rounded up to whole MCUs.
    pub blocks_per_row: usize,
    pub block_rows: usize,
    blocks: Vec<CoefficientBlock>,
}

impl ComponentCoefficients {
    pub fn block(&self, x: usize, y: usize) -> Option<&CoefficientBlock> {
        if x >= self.blocks_per_row {
            return None;
        }
        self.blocks.get(y * self.blocks_per_row + x)
    }

    pub fn block_mut(&mut self, x: usize, y: usize) -> Option<&mut CoefficientBlock> {
        if x >= self.blocks_per_row {
            return None;
        }
        self.blocks.get_mut(y * self.blocks_per_row + x)
    }

    pub fn frame_component(&self) -> FrameComponent {
        FrameComponent {
            id: self.id,
            h_samp_factor: self.h_samp_factor,
            v_samp_factor: self.v_samp_factor,
            quant_table_dest: self.quant_table_dest,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoefficientImage {
    pub width: u16,
    pub height: u16,
    pub components: Vec<ComponentCoefficients>,
    pub quantization_tables: [Option<QuantizationTable>; 4],
}

impl CoefficientImage {
    /// Allocates zeroed coefficient arrays for `frame`.
    ///
    /// A single-component image is always stored with 1x1 sampling, which is
    /// how its non-interleaved scans are laid out.
    pub fn new(frame: &FrameHeader) -> Result<Self, CodecError> {
        let mut components: Vec<FrameComponent> = frame.components.clone();
        if components.len() == 1 {
            components[0].h_samp_factor = 1;
            components[0].v_samp_factor = 1;
        }
        Self::with_components(frame.width, frame.height, &components)
    }

    pub fn with_components(
        width: u16,
        height: u16,
        components: &[FrameComponent],
    ) -> Result<Self, CodecError> {
        if width == 0 {
            return Err(CodecError::InvalidParameterWidth);
        }
        if height == 0 {
            return Err(CodecError::InvalidParameterHeight);
        }
        if components.is_empty() || components.len() > 4 {
            return Err(CodecError::InvalidParameterComponentCount);
        }
        let max_h = components.iter().map(|c| c.h_samp_factor).max().unwrap_or(1) as usize;
        let max_v = components.iter().map(|c| c.v_samp_factor).max().unwrap_or(1) as usize;
        let mcus_x = (width as usize).div_ceil(max_h * 8);
        let mcus_y = (height as usize).div_ceil(max_v * 8);

        let components = components
            .iter()
            .map(|c| {
                let h = c.h_samp_factor as usize;
                let v = c.v_samp_factor as usize;
                let blocks_per_row = mcus_x * h;
                let block_rows = mcus_y * v;
                ComponentCoefficients {
                    id: c.id,
                    h_samp_factor: c.h_samp_factor,
                    v_samp_factor: c.v_samp_factor,
                    quant_table_dest: c.quant_table_dest,
                    width_in_blocks: (width as usize * h).div_ceil(max_h * 8),
                    height_in_blocks: (height as usize * v).div_ceil(max_v * 8),
                    blocks_per_row,
                    block_rows,
                    blocks: vec![[0i16; 64]; blocks_per_row * block_rows],
                }
            })
            .collect();

        Ok(Self {
            width,
            height,
            components,
            quantization_tables: [None; 4],
        })
    }

    pub fn max_h_samp_factor(&self) -> u8 {
        self.components.iter().map(|c| c.h_samp_factor).max().unwrap_or(1)
    }

    pub fn max_v_samp_factor(&self) -> u8 {
        self.components.iter().map(|c| c.v_samp_factor).max().unwrap_or(1)
    }

    pub fn mcus_per_row(&self) -> usize {
        (self.width as usize).div_ceil(self.max_h_samp_factor() as usize * 8)
    }

    pub fn mcu_rows(&self) -> usize {
        (self.height as usize).div_ceil(self.max_v_samp_factor() as usize * 8)
    }

    pub fn frame_components(&self) -> Vec<FrameComponent> {
        self.components.iter().map(|c| c.frame_component()).collect()
    }
}
