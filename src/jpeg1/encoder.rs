//! JPEG coefficient encoder.
//!
//! Serializes a [`CoefficientImage`] as a baseline (or extended sequential when
//! 16-bit quantization tables are present) Huffman-coded stream using the
//! standard Annex K tables. Saved APPn/COM segments follow SOI verbatim.

use crate::error::CodecError;
use crate::jpeg_marker_code::JpegMarkerCode;
use crate::jpeg_stream_reader::MarkerSegment;
use crate::jpeg_stream_writer::JpegStreamWriter;
use crate::jpeg1::coefficients::{CoefficientBlock, CoefficientImage, ComponentCoefficients, ZIGZAG_ORDER};
use crate::jpeg1::huffman::{
    HuffmanTable, JpegBitWriter, STD_CHROMINANCE_AC_LENGTHS, STD_CHROMINANCE_AC_VALUES,
    STD_CHROMINANCE_DC_LENGTHS, STD_DC_VALUES, STD_LUMINANCE_AC_LENGTHS, STD_LUMINANCE_AC_VALUES,
    STD_LUMINANCE_DC_LENGTHS, category, magnitude_bits,
};

/// Largest number of blocks allowed in one MCU of an interleaved scan.
const MAX_BLOCKS_IN_MCU: usize = 10;

pub struct Jpeg1Encoder {
    dc_table_lum: HuffmanTable,
    ac_table_lum: HuffmanTable,
    dc_table_chrom: HuffmanTable,
    ac_table_chrom: HuffmanTable,
}

impl Default for Jpeg1Encoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Jpeg1Encoder {
    pub fn new() -> Self {
        Self {
            dc_table_lum: HuffmanTable::standard_luminance_dc(),
            ac_table_lum: HuffmanTable::standard_luminance_ac(),
            dc_table_chrom: HuffmanTable::standard_chrominance_dc(),
            ac_table_chrom: HuffmanTable::standard_chrominance_ac(),
        }
    }

    /// Huffman table slot for a component: luminance for the first, chrominance
    /// for the rest.
    fn table_slot(component_index: usize) -> u8 {
        if component_index == 0 { 0 } else { 1 }
    }

    fn tables(&self, slot: u8) -> (&HuffmanTable, &HuffmanTable) {
        if slot == 0 {
            (&self.dc_table_lum, &self.ac_table_lum)
        } else {
            (&self.dc_table_chrom, &self.ac_table_chrom)
        }
    }

    pub fn encode(&self, image: &CoefficientImage, markers: &[MarkerSegment]) -> Result<Vec<u8>, CodecError> {
        let mut writer = JpegStreamWriter::new();
        writer.write_start_of_image();
        for marker in markers {
            writer.write_marker_segment(marker)?;
        }

        let mut extended = false;
        for (slot, table) in image.quantization_tables.iter().enumerate() {
            let used = image.components.iter().any(|c| c.quant_table_dest as usize == slot);
            if !used {
                continue;
            }
            let table = table.as_ref().ok_or(CodecError::MissingQuantizationTable)?;
            extended |= !table.is_8bit();
            writer.write_dqt(slot as u8, table)?;
        }

        let marker = if extended {
            JpegMarkerCode::StartOfFrameExtendedSequential
        } else {
            JpegMarkerCode::StartOfFrameBaseline
        };
        writer.write_start_of_frame(marker, image.width, image.height, &image.frame_components())?;

        writer.write_dht(0, 0, &STD_LUMINANCE_DC_LENGTHS, &STD_DC_VALUES)?;
        writer.write_dht(1, 0, &STD_LUMINANCE_AC_LENGTHS, &STD_LUMINANCE_AC_VALUES)?;
        if image.components.len() > 1 {
            writer.write_dht(0, 1, &STD_CHROMINANCE_DC_LENGTHS, &STD_DC_VALUES)?;
            writer.write_dht(1, 1, &STD_CHROMINANCE_AC_LENGTHS, &STD_CHROMINANCE_AC_VALUES)?;
        }

        let blocks_in_mcu: usize = image
            .components
            .iter()
            .map(|c| c.h_samp_factor as usize * c.v_samp_factor as usize)
            .sum();

        if image.components.len() > 1 && blocks_in_mcu <= MAX_BLOCKS_IN_MCU {
            self.write_interleaved_scan(&mut writer, image)?;
        } else {
            for index in 0..image.components.len() {
                self.write_component_scan(&mut writer, image, index)?;
            }
        }

        writer.write_end_of_image();
        Ok(writer.finish())
    }

    fn write_interleaved_scan(&self, writer: &mut JpegStreamWriter, image: &CoefficientImage) -> Result<(), CodecError> {
        let selectors: Vec<(u8, u8, u8)> = image
            .components
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id, Self::table_slot(i), Self::table_slot(i)))
            .collect();
        writer.write_start_of_scan(&selectors)?;

        let mut predictions = vec![0i32; image.components.len()];
        let mut bit_writer = JpegBitWriter::new(writer.destination_mut());
        for mcu_y in 0..image.mcu_rows() {
            for mcu_x in 0..image.mcus_per_row() {
                for (index, component) in image.components.iter().enumerate() {
                    let (dc_table, ac_table) = self.tables(Self::table_slot(index));
                    let h = component.h_samp_factor as usize;
                    let v = component.v_samp_factor as usize;
                    for by in 0..v {
                        for bx in 0..h {
                            let x = mcu_x * h + bx;
                            let y = mcu_y * v + by;
                            match real_block(component, x, y) {
                                Some(block) => encode_block(
                                    &mut bit_writer,
                                    block,
                                    &mut predictions[index],
                                    dc_table,
                                    ac_table,
                                )?,
                                None => encode_dummy_block(&mut bit_writer, dc_table, ac_table)?,
                            }
                        }
                    }
                }
            }
        }
        bit_writer.flush();
        Ok(())
    }

    fn write_component_scan(
        &self,
        writer: &mut JpegStreamWriter,
        image: &CoefficientImage,
        index: usize,
    ) -> Result<(), CodecError> {
        let component = &image.components[index];
        let slot = Self::table_slot(index);
        writer.write_start_of_scan(&[(component.id, slot, slot)])?;

        let (dc_table, ac_table) = self.tables(slot);
        let mut prediction = 0i32;
        let mut bit_writer = JpegBitWriter::new(writer.destination_mut());
        for y in 0..component.height_in_blocks {
            for x in 0..component.width_in_blocks {
                let block = component.block(x, y).ok_or(CodecError::InvalidData)?;
                encode_block(&mut bit_writer, block, &mut prediction, dc_table, ac_table)?;
            }
        }
        bit_writer.flush();
        Ok(())
    }
}

/// The block at (x, y) when it covers image samples; `None` for MCU padding.
fn real_block(component: &ComponentCoefficients, x: usize, y: usize) -> Option<&CoefficientBlock> {
    if x >= component.width_in_blocks || y >= component.height_in_blocks {
        return None;
    }
    component.block(x, y)
}

fn write_magnitude(bit_writer: &mut JpegBitWriter, value: i32, category: u8) {
    let (bits, length) = magnitude_bits(value, category);
    bit_writer.write_bits(bits, length);
}

fn encode_block(
    bit_writer: &mut JpegBitWriter,
    block: &CoefficientBlock,
    prediction: &mut i32,
    dc_table: &HuffmanTable,
    ac_table: &HuffmanTable,
) -> Result<(), CodecError> {
    // DC
    let dc_val = block[0] as i32;
    let diff = dc_val - *prediction;
    *prediction = dc_val;

    let dc_category = category(diff);
    bit_writer.write_code(dc_table.code_for(dc_category)?);
    write_magnitude(bit_writer, diff, dc_category);

    // AC
    let mut run = 0u8;
    for &natural in &ZIGZAG_ORDER[1..] {
        let ac_val = block[natural] as i32;
        if ac_val == 0 {
            run += 1;
            continue;
        }
        while run > 15 {
            bit_writer.write_code(ac_table.code_for(0xF0)?);
            run -= 16;
        }
        let ac_category = category(ac_val);
        if ac_category > 15 {
            return Err(CodecError::UnencodableCoefficient);
        }
        bit_writer.write_code(ac_table.code_for((run << 4) | ac_category)?);
        write_magnitude(bit_writer, ac_val, ac_category);
        run = 0;
    }
    if run > 0 {
        bit_writer.write_code(ac_table.code_for(0x00)?);
    }
    Ok(())
}

/// Padding block: same DC as the previous block and no AC energy.
fn encode_dummy_block(
    bit_writer: &mut JpegBitWriter,
    dc_table: &HuffmanTable,
    ac_table: &HuffmanTable,
) -> Result<(), CodecError> {
    bit_writer.write_code(dc_table.code_for(0)?);
    bit_writer.write_code(ac_table.code_for(0x00)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jpeg_stream_reader::{FrameComponent, QuantizationTable};
    use crate::jpeg1::decoder::Jpeg1Decoder;

    fn sample_image(width: u16, height: u16, sampling: &[(u8, u8)]) -> CoefficientImage {
        let components: Vec<FrameComponent> = sampling
            .iter()
            .enumerate()
            .map(|(i, &(h, v))| FrameComponent {
                id: i as u8 + 1,
                h_samp_factor: h,
                v_samp_factor: v,
                quant_table_dest: (i > 0) as u8,
            })
            .collect();
        let mut image = CoefficientImage::with_components(width, height, &components).unwrap();
        image.quantization_tables[0] = Some(QuantizationTable { values: [3; 64] });
        image.quantization_tables[1] = Some(QuantizationTable { values: [5; 64] });
        for (ci, component) in image.components.iter_mut().enumerate() {
            for y in 0..component.height_in_blocks {
                for x in 0..component.width_in_blocks {
                    let block = component.block_mut(x, y).unwrap();
                    let seed = (ci * 97 + y * 13 + x * 7) as i16;
                    block[0] = seed * 4 - 200;
                    block[1] = seed % 9 - 4;
                    block[8] = -(seed % 5);
                    block[27] = seed % 3;
                    block[63] = if (x + y) % 4 == 0 { 1 } else { 0 };
                }
            }
        }
        image
    }

    fn assert_real_blocks_equal(a: &CoefficientImage, b: &CoefficientImage) {
        assert_eq!((a.width, a.height), (b.width, b.height));
        for (ca, cb) in a.components.iter().zip(&b.components) {
            for y in 0..ca.height_in_blocks {
                for x in 0..ca.width_in_blocks {
                    assert_eq!(ca.block(x, y), cb.block(x, y), "block ({x}, {y})");
                }
            }
        }
    }

    #[test]
    fn test_encode_decode_roundtrip_420() {
        let image = sample_image(37, 21, &[(2, 2), (1, 1), (1, 1)]);
        let encoded = Jpeg1Encoder::new().encode(&image, &[]).unwrap();
        assert_eq!(&encoded[..2], &[0xFF, 0xD8]);
        assert_eq!(&encoded[encoded.len() - 2..], &[0xFF, 0xD9]);

        let decoded = Jpeg1Decoder::new(&encoded).read_coefficients().unwrap();
        assert_real_blocks_equal(&image, &decoded);
        assert_eq!(decoded.quantization_tables[1].unwrap().values, [5; 64]);
    }

    #[test]
    fn test_dummy_blocks_repeat_previous_dc() {
        // 4:2:2 at 8 pixels wide: the second luma block of the MCU is padding.
        let narrow = sample_image(8, 8, &[(2, 1), (1, 1), (1, 1)]);
        let encoded = Jpeg1Encoder::new().encode(&narrow, &[]).unwrap();
        let decoded = Jpeg1Decoder::new(&encoded).read_coefficients().unwrap();
        let luma = &decoded.components[0];
        assert_eq!(luma.width_in_blocks, 1);
        let real = luma.block(0, 0).unwrap();
        let dummy = luma.block(1, 0).unwrap();
        assert_eq!(dummy[0], real[0]);
        assert!(dummy[1..].iter().all(|&c| c == 0));
    }

    #[test]
    fn test_grayscale_single_scan() {
        let image = sample_image(20, 12, &[(1, 1)]);
        let encoded = Jpeg1Encoder::new().encode(&image, &[]).unwrap();
        let scans = encoded.windows(2).filter(|w| *w == [0xFF, 0xDA]).count();
        assert_eq!(scans, 1);
        let decoded = Jpeg1Decoder::new(&encoded).read_coefficients().unwrap();
        assert_real_blocks_equal(&image, &decoded);
    }

    #[test]
    fn test_large_mcu_uses_component_scans() {
        let image = sample_image(40, 40, &[(2, 2), (2, 2), (2, 2)]);
        let encoded = Jpeg1Encoder::new().encode(&image, &[]).unwrap();
        let scans = encoded.windows(2).filter(|w| *w == [0xFF, 0xDA]).count();
        assert_eq!(scans, 3);
        let decoded = Jpeg1Decoder::new(&encoded).read_coefficients().unwrap();
        assert_real_blocks_equal(&image, &decoded);
    }

    #[test]
    fn test_markers_follow_start_of_image() {
        let image = sample_image(8, 8, &[(1, 1)]);
        let markers = vec![
            MarkerSegment {
                marker: 0xE1,
                data: b"Exif\0\0stub".to_vec(),
            },
            MarkerSegment {
                marker: 0xFE,
                data: b"note".to_vec(),
            },
        ];
        let encoded = Jpeg1Encoder::new().encode(&image, &markers).unwrap();
        assert_eq!(&encoded[2..6], &[0xFF, 0xE1, 0x00, 0x0C]);
        assert_eq!(&encoded[6..16], b"Exif\0\0stub");
        assert_eq!(&encoded[16..20], &[0xFF, 0xFE, 0x00, 0x06]);

        let mut decoder = Jpeg1Decoder::new(&encoded);
        decoder.save_markers(true);
        decoder.read_coefficients().unwrap();
        assert_eq!(decoder.markers(), markers.as_slice());
    }

    #[test]
    fn test_sixteen_bit_tables_use_extended_frame() {
        let mut image = sample_image(8, 8, &[(1, 1)]);
        image.quantization_tables[0] = Some(QuantizationTable { values: [400; 64] });
        let encoded = Jpeg1Encoder::new().encode(&image, &[]).unwrap();
        assert!(encoded.windows(2).any(|w| w == [0xFF, 0xC1]));
        let decoded = Jpeg1Decoder::new(&encoded).read_coefficients().unwrap();
        assert_eq!(decoded.quantization_tables[0].unwrap().values, [400; 64]);
    }

    #[test]
    fn test_oversized_coefficient_is_unencodable() {
        let mut image = sample_image(8, 8, &[(1, 1)]);
        image.components[0].block_mut(0, 0).unwrap()[5] = 4000;
        assert_eq!(
            Jpeg1Encoder::new().encode(&image, &[]).unwrap_err(),
            CodecError::UnencodableCoefficient
        );
    }
}
