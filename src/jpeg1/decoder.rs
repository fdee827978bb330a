//! JPEG coefficient decoder.
//!
//! Reads the quantized DCT coefficients of baseline, extended sequential and
//! progressive Huffman-coded streams without dequantizing or running an IDCT.

use crate::error::CodecError;
use crate::jpeg_marker_code::JpegMarkerCode;
use crate::jpeg_stream_reader::{FrameHeader, JpegStreamReader, JpegStreamReaderState, MarkerSegment, ScanHeader};
use crate::jpeg1::coefficients::{CoefficientBlock, CoefficientImage, ZIGZAG_ORDER};
use crate::jpeg1::huffman::{HuffmanTable, JpegBitReader};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanKind {
    Sequential,
    DcFirst,
    DcRefine,
    AcFirst,
    AcRefine,
}

/// Entropy decoding state that restart markers reset.
struct ScanState {
    predictions: [i32; 4],
    eobrun: u32,
}

impl ScanState {
    fn new() -> Self {
        Self {
            predictions: [0; 4],
            eobrun: 0,
        }
    }

    fn reset(&mut self) {
        *self = Self::new();
    }
}

type ScanTables<'t> = (Option<&'t HuffmanTable>, Option<&'t HuffmanTable>);

pub struct Jpeg1Decoder<'a> {
    reader: JpegStreamReader<'a>,
}

impl<'a> Jpeg1Decoder<'a> {
    pub fn new(source: &'a [u8]) -> Self {
        Self {
            reader: JpegStreamReader::new(source),
        }
    }

    /// Keep APPn/COM segments so they can be copied into re-encoded output.
    pub fn save_markers(&mut self, save: bool) {
        self.reader.save_markers(save);
    }

    pub fn read_header(&mut self) -> Result<FrameHeader, CodecError> {
        self.reader.read_header().cloned()
    }

    pub fn markers(&self) -> &[MarkerSegment] {
        self.reader.markers()
    }

    pub fn take_markers(&mut self) -> Vec<MarkerSegment> {
        self.reader.take_markers()
    }

    /// Decodes every scan into quantized coefficient arrays.
    pub fn read_coefficients(&mut self) -> Result<CoefficientImage, CodecError> {
        let frame = self.read_header()?;
        match frame.marker {
            JpegMarkerCode::StartOfFrameBaseline
            | JpegMarkerCode::StartOfFrameExtendedSequential
            | JpegMarkerCode::StartOfFrameProgressive => {}
            _ => return Err(CodecError::EncodingNotSupported),
        }
        if frame.precision != 8 {
            return Err(CodecError::ParameterValueNotSupported);
        }

        let mut image = CoefficientImage::new(&frame)?;
        let progressive = frame.is_progressive();

        while self.reader.state() == JpegStreamReaderState::StartOfScan {
            let scan = self.reader.read_scan_header()?;
            let kind = classify_scan(&scan, progressive)?;
            self.latch_quantization_tables(&mut image, &scan);

            let data = self.reader.remaining_data();
            let consumed = self.decode_scan(&mut image, &scan, kind, data)?;
            self.reader.advance(consumed);

            if !self.reader.next_scan()? {
                break;
            }
        }

        for component in &frame.components {
            let slot = component.quant_table_dest as usize;
            if image.quantization_tables[slot].is_none() {
                image.quantization_tables[slot] =
                    Some(self.reader.quantization_tables[slot].ok_or(CodecError::MissingQuantizationTable)?);
            }
        }
        Ok(image)
    }

    /// Tables are captured when a component first appears in a scan; later
    /// DQT segments may redefine a slot for other components.
    fn latch_quantization_tables(&self, image: &mut CoefficientImage, scan: &ScanHeader) {
        for scan_component in &scan.components {
            let slot = image.components[scan_component.component_index].quant_table_dest as usize;
            if image.quantization_tables[slot].is_none() {
                image.quantization_tables[slot] = self.reader.quantization_tables[slot];
            }
        }
    }

    fn decode_scan(
        &self,
        image: &mut CoefficientImage,
        scan: &ScanHeader,
        kind: ScanKind,
        data: &[u8],
    ) -> Result<usize, CodecError> {
        let mut tables: Vec<ScanTables> = Vec::with_capacity(scan.components.len());
        for scan_component in &scan.components {
            let dc = self.reader.huffman_tables_dc[scan_component.dc_table_dest as usize].as_ref();
            let ac = self.reader.huffman_tables_ac[scan_component.ac_table_dest as usize].as_ref();
            let needs_dc = matches!(kind, ScanKind::Sequential | ScanKind::DcFirst);
            let needs_ac = matches!(kind, ScanKind::Sequential | ScanKind::AcFirst | ScanKind::AcRefine);
            if (needs_dc && dc.is_none()) || (needs_ac && ac.is_none()) {
                return Err(CodecError::MissingHuffmanTable);
            }
            tables.push((dc, ac));
        }

        let single = scan.components.len() == 1;
        let (mcus_x, mcus_y) = if single {
            let component = &image.components[scan.components[0].component_index];
            (component.width_in_blocks, component.height_in_blocks)
        } else {
            (image.mcus_per_row(), image.mcu_rows())
        };

        let mut bit_reader = JpegBitReader::new(data);
        let mut state = ScanState::new();
        let restart_interval = self.reader.restart_interval as usize;
        let mut next_restart = 0u8;
        let mut mcu_count = 0usize;

        for mcu_y in 0..mcus_y {
            for mcu_x in 0..mcus_x {
                if restart_interval > 0 && mcu_count > 0 && mcu_count % restart_interval == 0 {
                    bit_reader.process_restart(next_restart)?;
                    next_restart = (next_restart + 1) & 7;
                    state.reset();
                }

                for (i, scan_component) in scan.components.iter().enumerate() {
                    let component = &mut image.components[scan_component.component_index];
                    let (h, v) = if single {
                        (1, 1)
                    } else {
                        (component.h_samp_factor as usize, component.v_samp_factor as usize)
                    };
                    for by in 0..v {
                        for bx in 0..h {
                            let block = component
                                .block_mut(mcu_x * h + bx, mcu_y * v + by)
                                .ok_or(CodecError::InvalidData)?;
                            decode_block(kind, &mut bit_reader, tables[i], &mut state, i, scan, block)?;
                        }
                    }
                }
                mcu_count += 1;
            }
        }
        Ok(bit_reader.position())
    }
}

fn classify_scan(scan: &ScanHeader, progressive: bool) -> Result<ScanKind, CodecError> {
    if !progressive {
        if scan.ss != 0 || scan.se != 63 || scan.ah != 0 || scan.al != 0 {
            log::warn!(
                "ignoring progression parameters Ss={} Se={} Ah={} Al={} in sequential scan",
                scan.ss,
                scan.se,
                scan.ah,
                scan.al
            );
        }
        return Ok(ScanKind::Sequential);
    }

    let valid_band = if scan.ss == 0 {
        scan.se == 0
    } else {
        scan.se >= scan.ss && scan.se <= 63 && scan.components.len() == 1
    };
    let valid_approximation = scan.al <= 13 && (scan.ah == 0 || scan.al + 1 == scan.ah);
    if !valid_band || !valid_approximation {
        return Err(CodecError::InvalidScanParameters);
    }

    Ok(match (scan.ss == 0, scan.ah == 0) {
        (true, true) => ScanKind::DcFirst,
        (true, false) => ScanKind::DcRefine,
        (false, true) => ScanKind::AcFirst,
        (false, false) => ScanKind::AcRefine,
    })
}

fn to_coefficient(value: i32) -> Result<i16, CodecError> {
    i16::try_from(value).map_err(|_| CodecError::CoefficientOutOfRange)
}

fn decode_block(
    kind: ScanKind,
    reader: &mut JpegBitReader,
    (dc_table, ac_table): ScanTables,
    state: &mut ScanState,
    scan_index: usize,
    scan: &ScanHeader,
    block: &mut CoefficientBlock,
) -> Result<(), CodecError> {
    let require_dc = || dc_table.ok_or(CodecError::MissingHuffmanTable);
    let require_ac = || ac_table.ok_or(CodecError::MissingHuffmanTable);
    match kind {
        ScanKind::Sequential => {
            decode_dc(reader, require_dc()?, &mut state.predictions[scan_index], 0, block)?;
            decode_ac_sequential(reader, require_ac()?, block)
        }
        ScanKind::DcFirst => decode_dc(reader, require_dc()?, &mut state.predictions[scan_index], scan.al, block),
        ScanKind::DcRefine => {
            if reader.read_bit()? {
                block[0] |= 1 << scan.al;
            }
            Ok(())
        }
        ScanKind::AcFirst => decode_ac_first(reader, require_ac()?, &mut state.eobrun, scan, block),
        ScanKind::AcRefine => decode_ac_refine(reader, require_ac()?, &mut state.eobrun, scan, block),
    }
}

fn decode_dc(
    reader: &mut JpegBitReader,
    table: &HuffmanTable,
    prediction: &mut i32,
    al: u8,
    block: &mut CoefficientBlock,
) -> Result<(), CodecError> {
    let category = table.decode(reader)?;
    let diff = reader.receive_extend(category)?;
    *prediction += diff;
    block[0] = to_coefficient(*prediction << al)?;
    Ok(())
}

fn decode_ac_sequential(
    reader: &mut JpegBitReader,
    table: &HuffmanTable,
    block: &mut CoefficientBlock,
) -> Result<(), CodecError> {
    let mut k = 1;
    while k < 64 {
        let symbol = table.decode(reader)?;
        let run = (symbol >> 4) as usize;
        let category = symbol & 0x0F;
        if category == 0 {
            if run != 15 {
                break; // EOB
            }
            k += 16; // ZRL
            continue;
        }
        k += run;
        if k >= 64 {
            return Err(CodecError::InvalidData);
        }
        block[ZIGZAG_ORDER[k]] = to_coefficient(reader.receive_extend(category)?)?;
        k += 1;
    }
    Ok(())
}

fn decode_ac_first(
    reader: &mut JpegBitReader,
    table: &HuffmanTable,
    eobrun: &mut u32,
    scan: &ScanHeader,
    block: &mut CoefficientBlock,
) -> Result<(), CodecError> {
    if *eobrun > 0 {
        *eobrun -= 1;
        return Ok(());
    }
    let mut k = scan.ss as usize;
    let se = scan.se as usize;
    while k <= se {
        let symbol = table.decode(reader)?;
        let run = (symbol >> 4) as u32;
        let category = symbol & 0x0F;
        if category != 0 {
            k += run as usize;
            if k > se {
                return Err(CodecError::InvalidData);
            }
            let value = reader.receive_extend(category)?;
            block[ZIGZAG_ORDER[k]] = to_coefficient(value << scan.al)?;
        } else if run == 15 {
            k += 15;
        } else {
            *eobrun = (1 << run) - 1;
            if run > 0 {
                *eobrun += reader.read_bits(run as u8)? as u32;
            }
            break;
        }
        k += 1;
    }
    Ok(())
}

/// Adds one correction bit to a coefficient that is already nonzero.
fn refine_coefficient(reader: &mut JpegBitReader, coefficient: &mut i16, p1: i16) -> Result<(), CodecError> {
    if reader.read_bit()? && (*coefficient & p1) == 0 {
        *coefficient += if *coefficient >= 0 { p1 } else { -p1 };
    }
    Ok(())
}

/// Successive approximation refinement of AC coefficients (G.1.2.3).
fn decode_ac_refine(
    reader: &mut JpegBitReader,
    table: &HuffmanTable,
    eobrun: &mut u32,
    scan: &ScanHeader,
    block: &mut CoefficientBlock,
) -> Result<(), CodecError> {
    let p1: i16 = 1 << scan.al;
    let m1: i16 = -p1;
    let se = scan.se as usize;
    let mut k = scan.ss as usize;

    if *eobrun == 0 {
        while k <= se {
            let symbol = table.decode(reader)?;
            let mut run = (symbol >> 4) as i32;
            let category = symbol & 0x0F;
            let mut value = 0i16;
            if category != 0 {
                if category != 1 {
                    log::debug!("refinement scan coded a magnitude of {category} bits");
                }
                value = if reader.read_bit()? { p1 } else { m1 };
            } else if run != 15 {
                *eobrun = 1 << run;
                if run > 0 {
                    *eobrun += reader.read_bits(run as u8)? as u32;
                }
                break;
            }

            while k <= se {
                let coefficient = &mut block[ZIGZAG_ORDER[k]];
                if *coefficient != 0 {
                    refine_coefficient(reader, coefficient, p1)?;
                } else {
                    if run == 0 {
                        break;
                    }
                    run -= 1;
                }
                k += 1;
            }
            if value != 0 {
                if k > se {
                    return Err(CodecError::InvalidData);
                }
                block[ZIGZAG_ORDER[k]] = value;
            }
            k += 1;
        }
    }

    if *eobrun > 0 {
        while k <= se {
            let coefficient = &mut block[ZIGZAG_ORDER[k]];
            if *coefficient != 0 {
                refine_coefficient(reader, coefficient, p1)?;
            }
            k += 1;
        }
        *eobrun -= 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jpeg_stream_reader::{FrameComponent, QuantizationTable};
    use crate::jpeg_stream_writer::JpegStreamWriter;
    use crate::jpeg1::huffman::{
        JpegBitWriter, STD_DC_VALUES, STD_LUMINANCE_AC_LENGTHS, STD_LUMINANCE_AC_VALUES,
        STD_LUMINANCE_DC_LENGTHS, category, magnitude_bits,
    };

    fn write_tables(writer: &mut JpegStreamWriter) {
        writer
            .write_dqt(0, &QuantizationTable { values: [2; 64] })
            .unwrap();
        writer
            .write_dht(0, 0, &STD_LUMINANCE_DC_LENGTHS, &STD_DC_VALUES)
            .unwrap();
        writer
            .write_dht(1, 0, &STD_LUMINANCE_AC_LENGTHS, &STD_LUMINANCE_AC_VALUES)
            .unwrap();
    }

    fn write_sos(writer: &mut JpegStreamWriter, ss: u8, se: u8, ah: u8, al: u8) {
        writer.write_marker(JpegMarkerCode::StartOfScan);
        writer.write_u16(8);
        writer.write_byte(1);
        writer.write_byte(1);
        writer.write_byte(0x00);
        writer.write_byte(ss);
        writer.write_byte(se);
        writer.write_byte((ah << 4) | al);
    }

    fn write_value(bits: &mut JpegBitWriter, value: i32) -> u8 {
        let c = category(value);
        let (v, len) = magnitude_bits(value, c);
        bits.write_bits(v, len);
        c
    }

    /// One 8x8 grayscale block coded as DC first (Al=1), AC band 1..=63, then
    /// DC refinement.
    fn progressive_stream(dc: i32, ac: &[(usize, i32)]) -> Vec<u8> {
        let dc_table = HuffmanTable::standard_luminance_dc();
        let ac_table = HuffmanTable::standard_luminance_ac();
        let mut writer = JpegStreamWriter::new();
        writer.write_start_of_image();
        write_tables(&mut writer);
        writer
            .write_start_of_frame(
                JpegMarkerCode::StartOfFrameProgressive,
                8,
                8,
                &[FrameComponent {
                    id: 1,
                    h_samp_factor: 1,
                    v_samp_factor: 1,
                    quant_table_dest: 0,
                }],
            )
            .unwrap();

        write_sos(&mut writer, 0, 0, 0, 1);
        {
            let mut bits = JpegBitWriter::new(writer.destination_mut());
            let shifted = dc >> 1;
            let c = category(shifted);
            bits.write_code(dc_table.code_for(c).unwrap());
            write_value(&mut bits, shifted);
            bits.flush();
        }

        write_sos(&mut writer, 1, 63, 0, 0);
        {
            let mut bits = JpegBitWriter::new(writer.destination_mut());
            let mut last = 0usize;
            for &(k, value) in ac {
                let run = k - last - 1;
                let c = category(value);
                bits.write_code(ac_table.code_for(((run as u8) << 4) | c).unwrap());
                write_value(&mut bits, value);
                last = k;
            }
            if last < 63 {
                bits.write_code(ac_table.code_for(0x00).unwrap());
            }
            bits.flush();
        }

        write_sos(&mut writer, 0, 0, 1, 0);
        {
            let mut bits = JpegBitWriter::new(writer.destination_mut());
            bits.write_bits((dc & 1) as u16, 1);
            bits.flush();
        }
        writer.write_end_of_image();
        writer.finish()
    }

    #[test]
    fn test_progressive_scans() {
        let data = progressive_stream(-5, &[(1, 3), (2, -1), (9, 12)]);
        let mut decoder = Jpeg1Decoder::new(&data);
        let image = decoder.read_coefficients().unwrap();
        let block = image.components[0].block(0, 0).unwrap();
        assert_eq!(block[0], -5);
        assert_eq!(block[ZIGZAG_ORDER[1]], 3);
        assert_eq!(block[ZIGZAG_ORDER[2]], -1);
        assert_eq!(block[ZIGZAG_ORDER[9]], 12);
        assert_eq!(block.iter().filter(|&&c| c != 0).count(), 4);
        assert_eq!(image.quantization_tables[0].unwrap().values, [2; 64]);
    }

    #[test]
    fn test_truncated_scan_fails() {
        let data = progressive_stream(100, &[(1, 50), (5, -40), (30, 7)]);
        let sos = data
            .windows(2)
            .position(|w| w == [0xFF, 0xDA])
            .unwrap();
        let mut decoder = Jpeg1Decoder::new(&data[..sos + 11]);
        assert_eq!(decoder.read_coefficients().unwrap_err(), CodecError::NeedMoreData);
    }

    #[test]
    fn test_lossless_process_rejected() {
        let data = [
            0xFF, 0xD8, 0xFF, 0xC3, 0x00, 0x0B, 8, 0x00, 8, 0x00, 8, 1, 1, 0x11, 0, 0xFF, 0xDA,
        ];
        let mut decoder = Jpeg1Decoder::new(&data);
        assert_eq!(decoder.read_coefficients().unwrap_err(), CodecError::EncodingNotSupported);
    }

    #[test]
    fn test_invalid_progression_rejected() {
        let scan = ScanHeader {
            components: vec![],
            ss: 0,
            se: 5,
            ah: 0,
            al: 0,
        };
        assert_eq!(classify_scan(&scan, true), Err(CodecError::InvalidScanParameters));
        assert_eq!(classify_scan(&scan, false), Ok(ScanKind::Sequential));
    }
}
