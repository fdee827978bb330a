//! Segment-level JPEG reader on top of [`MemorySource`].
//!
//! Parses the frame header, table definitions and scan headers. Entropy-coded
//! data is left to the decoder, which hands back how many bytes it consumed.

use crate::error::CodecError;
use crate::jpeg_marker_code::{JPEG_MARKER_START_BYTE, JpegMarkerCode};
use crate::jpeg1::huffman::HuffmanTable;
use crate::memory_source::MemorySource;

/// One component as declared in the SOFn segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameComponent {
    pub id: u8,
    pub h_samp_factor: u8,
    pub v_samp_factor: u8,
    pub quant_table_dest: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub marker: JpegMarkerCode,
    pub precision: u8,
    pub height: u16,
    pub width: u16,
    pub components: Vec<FrameComponent>,
}

impl FrameHeader {
    pub fn is_progressive(&self) -> bool {
        self.marker == JpegMarkerCode::StartOfFrameProgressive
    }

    pub fn max_h_samp_factor(&self) -> u8 {
        self.components.iter().map(|c| c.h_samp_factor).max().unwrap_or(1)
    }

    pub fn max_v_samp_factor(&self) -> u8 {
        self.components.iter().map(|c| c.v_samp_factor).max().unwrap_or(1)
    }

    /// MCU columns of an interleaved scan.
    pub fn mcus_per_row(&self) -> usize {
        let mcu_width = self.max_h_samp_factor() as usize * 8;
        (self.width as usize).div_ceil(mcu_width)
    }

    /// MCU rows of an interleaved scan.
    pub fn mcu_rows(&self) -> usize {
        let mcu_height = self.max_v_samp_factor() as usize * 8;
        (self.height as usize).div_ceil(mcu_height)
    }

    pub fn component_index(&self, id: u8) -> Option<usize> {
        self.components.iter().position(|c| c.id == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanComponent {
    pub component_index: usize,
    pub dc_table_dest: u8,
    pub ac_table_dest: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanHeader {
    pub components: Vec<ScanComponent>,
    /// Start of spectral selection.
    pub ss: u8,
    /// End of spectral selection.
    pub se: u8,
    /// Successive approximation bit position high.
    pub ah: u8,
    /// Successive approximation bit position low.
    pub al: u8,
}

/// Quantization table values in zigzag order, as stored in DQT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantizationTable {
    pub values: [u16; 64],
}

impl QuantizationTable {
    /// True when every entry fits an 8-bit DQT entry.
    pub fn is_8bit(&self) -> bool {
        self.values.iter().all(|&v| v <= 0xFF)
    }
}

/// An APPn or COM segment: marker byte plus payload without the length field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerSegment {
    pub marker: u8,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JpegStreamReaderState {
    BeforeStartOfImage,
    HeaderSection,
    /// The SOS marker has been consumed; its segment is next.
    StartOfScan,
    ScanSection,
    EndOfImage,
}

pub struct JpegStreamReader<'a> {
    source: MemorySource<'a>,
    state: JpegStreamReaderState,
    frame: Option<FrameHeader>,
    pub quantization_tables: [Option<QuantizationTable>; 4],
    pub huffman_tables_dc: [Option<HuffmanTable>; 4],
    pub huffman_tables_ac: [Option<HuffmanTable>; 4],
    pub restart_interval: u16,
    save_markers: bool,
    markers: Vec<MarkerSegment>,
}

impl<'a> JpegStreamReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        let mut source = MemorySource::new(data);
        source.init();
        Self {
            source,
            state: JpegStreamReaderState::BeforeStartOfImage,
            frame: None,
            quantization_tables: [None; 4],
            huffman_tables_dc: [const { None }; 4],
            huffman_tables_ac: [const { None }; 4],
            restart_interval: 0,
            save_markers: false,
            markers: Vec::new(),
        }
    }

    /// Keep APPn and COM segments instead of skipping them.
    pub fn save_markers(&mut self, save: bool) {
        self.save_markers = save;
    }

    pub fn markers(&self) -> &[MarkerSegment] {
        &self.markers
    }

    pub fn take_markers(&mut self) -> Vec<MarkerSegment> {
        std::mem::take(&mut self.markers)
    }

    pub fn state(&self) -> JpegStreamReaderState {
        self.state
    }

    pub fn remaining_data(&self) -> &'a [u8] {
        self.source.remaining()
    }

    pub fn advance(&mut self, count: usize) {
        self.source.skip_input_data(count);
    }

    /// Reads everything up to the first SOS marker and returns the frame.
    pub fn read_header(&mut self) -> Result<&FrameHeader, CodecError> {
        if self.state == JpegStreamReaderState::BeforeStartOfImage {
            self.read_start_of_image()?;
        }
        if self.state == JpegStreamReaderState::HeaderSection {
            self.read_tables_until_scan()?;
        }
        if self.state == JpegStreamReaderState::EndOfImage {
            return Err(CodecError::StartOfFrameMarkerNotFound);
        }
        self.frame.as_ref().ok_or(CodecError::StartOfFrameMarkerNotFound)
    }

    fn read_start_of_image(&mut self) -> Result<(), CodecError> {
        let first = self.source.read_u8()?;
        let second = self.source.read_u8()?;
        if first != JPEG_MARKER_START_BYTE || second != u8::from(JpegMarkerCode::StartOfImage) {
            return Err(CodecError::StartOfImageMarkerNotFound);
        }
        self.state = JpegStreamReaderState::HeaderSection;
        Ok(())
    }

    /// Reads the next marker, skipping fill bytes. Bytes that do not start a
    /// marker are skipped as garbage when `resync` is set.
    fn read_marker(&mut self, resync: bool) -> Result<u8, CodecError> {
        let mut skipped = 0usize;
        loop {
            let byte = self.source.read_u8()?;
            if byte != JPEG_MARKER_START_BYTE {
                if !resync {
                    return Err(CodecError::JpegMarkerStartByteNotFound);
                }
                skipped += 1;
                continue;
            }
            let mut code = self.source.read_u8()?;
            while code == JPEG_MARKER_START_BYTE {
                code = self.source.read_u8()?;
            }
            // FF00 is stuffed entropy data, not a marker.
            if code == 0x00 && resync {
                skipped += 2;
                continue;
            }
            if skipped > 0 {
                log::debug!("skipped {skipped} bytes of garbage before marker");
            }
            return Ok(code);
        }
    }

    fn read_tables_until_scan(&mut self) -> Result<(), CodecError> {
        loop {
            let code = self.read_marker(false)?;
            if self.handle_marker(code)? {
                return Ok(());
            }
        }
    }

    /// Processes one marker between scans. Returns `true` when the reader
    /// stopped at SOS or EOI.
    fn handle_marker(&mut self, code: u8) -> Result<bool, CodecError> {
        let Ok(marker) = JpegMarkerCode::try_from(code) else {
            log::debug!("skipping unknown marker 0x{code:02X}");
            self.skip_segment()?;
            return Ok(false);
        };
        match marker {
            JpegMarkerCode::StartOfScan => {
                if self.frame.is_none() {
                    return Err(CodecError::StartOfFrameMarkerNotFound);
                }
                self.state = JpegStreamReaderState::StartOfScan;
                Ok(true)
            }
            JpegMarkerCode::EndOfImage => {
                self.state = JpegStreamReaderState::EndOfImage;
                Ok(true)
            }
            JpegMarkerCode::StartOfImage => Err(CodecError::InvalidData),
            m if m.is_start_of_frame() => {
                if self.frame.is_some() {
                    return Err(CodecError::DuplicateStartOfFrameMarker);
                }
                self.read_start_of_frame_segment(m)?;
                Ok(false)
            }
            JpegMarkerCode::DefineQuantizationTable => {
                self.read_dqt_segment()?;
                Ok(false)
            }
            JpegMarkerCode::DefineHuffmanTable => {
                self.read_dht_segment()?;
                Ok(false)
            }
            JpegMarkerCode::DefineRestartInterval => {
                self.read_dri_segment()?;
                Ok(false)
            }
            JpegMarkerCode::DefineNumberOfLines => Err(CodecError::EncodingNotSupported),
            m if m.is_restart() => {
                log::debug!("ignoring stray restart marker 0x{code:02X}");
                Ok(false)
            }
            m if m.is_ancillary() && self.save_markers => {
                let data = self.read_segment_payload()?;
                self.markers.push(MarkerSegment { marker: code, data });
                Ok(false)
            }
            _ => {
                self.skip_segment()?;
                Ok(false)
            }
        }
    }

    fn read_segment_length(&mut self) -> Result<usize, CodecError> {
        let length = self.source.read_u16()? as usize;
        if length < 2 {
            return Err(CodecError::InvalidMarkerSegmentSize);
        }
        Ok(length - 2)
    }

    fn read_segment_payload(&mut self) -> Result<Vec<u8>, CodecError> {
        let length = self.read_segment_length()?;
        Ok(self.source.read_bytes(length)?.to_vec())
    }

    pub fn skip_segment(&mut self) -> Result<(), CodecError> {
        let length = self.read_segment_length()?;
        self.source.read_bytes(length)?;
        Ok(())
    }

    fn read_start_of_frame_segment(&mut self, marker: JpegMarkerCode) -> Result<(), CodecError> {
        let payload = self.read_segment_payload()?;
        let mut segment = MemorySource::new(&payload);
        let precision = segment.read_u8()?;
        let height = segment.read_u16()?;
        let width = segment.read_u16()?;
        let component_count = segment.read_u8()? as usize;

        if width == 0 {
            return Err(CodecError::InvalidParameterWidth);
        }
        if height == 0 {
            // Height deferred to a DNL segment.
            return Err(CodecError::InvalidParameterHeight);
        }
        if component_count == 0 || component_count > 4 {
            return Err(CodecError::InvalidParameterComponentCount);
        }
        if payload.len() != 6 + component_count * 3 {
            return Err(CodecError::InvalidMarkerSegmentSize);
        }

        let mut components = Vec::with_capacity(component_count);
        for _ in 0..component_count {
            let id = segment.read_u8()?;
            let sampling = segment.read_u8()?;
            let quant_table_dest = segment.read_u8()?;
            let h_samp_factor = sampling >> 4;
            let v_samp_factor = sampling & 0x0F;
            if !(1..=4).contains(&h_samp_factor) || !(1..=4).contains(&v_samp_factor) {
                return Err(CodecError::InvalidSamplingFactor);
            }
            if quant_table_dest > 3 {
                return Err(CodecError::ParameterValueNotSupported);
            }
            components.push(FrameComponent {
                id,
                h_samp_factor,
                v_samp_factor,
                quant_table_dest,
            });
        }

        self.frame = Some(FrameHeader {
            marker,
            precision,
            height,
            width,
            components,
        });
        Ok(())
    }

    pub fn read_dqt_segment(&mut self) -> Result<(), CodecError> {
        let payload = self.read_segment_payload()?;
        let mut segment = MemorySource::new(&payload);
        while !segment.remaining().is_empty() {
            let pq_tq = segment.read_u8()?;
            let precision = pq_tq >> 4;
            let id = (pq_tq & 0x0F) as usize;
            if id >= 4 || precision > 1 {
                return Err(CodecError::ParameterValueNotSupported);
            }
            let mut values = [0u16; 64];
            for value in values.iter_mut() {
                *value = if precision == 0 {
                    segment.read_u8().map(u16::from)
                } else {
                    segment.read_u16()
                }
                .map_err(|_| CodecError::InvalidMarkerSegmentSize)?;
            }
            self.quantization_tables[id] = Some(QuantizationTable { values });
        }
        Ok(())
    }

    pub fn read_dht_segment(&mut self) -> Result<(), CodecError> {
        let payload = self.read_segment_payload()?;
        let mut segment = MemorySource::new(&payload);
        while !segment.remaining().is_empty() {
            let tc_th = segment.read_u8()?;
            let class = tc_th >> 4;
            let id = (tc_th & 0x0F) as usize;
            if id >= 4 || class > 1 {
                return Err(CodecError::InvalidHuffmanTable);
            }

            let mut lengths = [0u8; 16];
            for length in lengths.iter_mut() {
                *length = segment
                    .read_u8()
                    .map_err(|_| CodecError::InvalidMarkerSegmentSize)?;
            }
            let total_values: usize = lengths.iter().map(|&n| n as usize).sum();
            let values = segment
                .read_bytes(total_values)
                .map_err(|_| CodecError::InvalidMarkerSegmentSize)?;

            let table = HuffmanTable::build_from_dht(&lengths, values)?;
            if class == 0 {
                self.huffman_tables_dc[id] = Some(table);
            } else {
                self.huffman_tables_ac[id] = Some(table);
            }
        }
        Ok(())
    }

    pub fn read_dri_segment(&mut self) -> Result<(), CodecError> {
        let length = self.read_segment_length()?;
        if length != 2 {
            return Err(CodecError::InvalidMarkerSegmentSize);
        }
        self.restart_interval = self.source.read_u16()?;
        Ok(())
    }

    /// Parses the SOS segment whose marker was just consumed.
    pub fn read_scan_header(&mut self) -> Result<ScanHeader, CodecError> {
        if self.state != JpegStreamReaderState::StartOfScan {
            return Err(CodecError::InvalidData);
        }
        let payload = self.read_segment_payload()?;
        let frame = self.frame.as_ref().ok_or(CodecError::StartOfFrameMarkerNotFound)?;
        let mut segment = MemorySource::new(&payload);

        let component_count = segment.read_u8()? as usize;
        if component_count == 0 || component_count > 4 || payload.len() != 4 + component_count * 2 {
            return Err(CodecError::InvalidScanParameters);
        }

        let mut components = Vec::with_capacity(component_count);
        for _ in 0..component_count {
            let id = segment.read_u8()?;
            let selector = segment.read_u8()?;
            let component_index = frame.component_index(id).ok_or(CodecError::UnknownComponentId)?;
            let dc_table_dest = selector >> 4;
            let ac_table_dest = selector & 0x0F;
            if dc_table_dest > 3 || ac_table_dest > 3 {
                return Err(CodecError::MissingHuffmanTable);
            }
            components.push(ScanComponent {
                component_index,
                dc_table_dest,
                ac_table_dest,
            });
        }
        let ss = segment.read_u8()?;
        let se = segment.read_u8()?;
        let ah_al = segment.read_u8()?;

        self.state = JpegStreamReaderState::ScanSection;
        Ok(ScanHeader {
            components,
            ss,
            se,
            ah: ah_al >> 4,
            al: ah_al & 0x0F,
        })
    }

    /// After a scan's entropy data, reads tables up to the next SOS.
    /// Returns `false` at EOI or when the data ends without one.
    pub fn next_scan(&mut self) -> Result<bool, CodecError> {
        self.state = JpegStreamReaderState::HeaderSection;
        loop {
            let code = match self.read_marker(true) {
                Ok(code) => code,
                Err(CodecError::NeedMoreData) => {
                    log::warn!("JPEG data ends without an end of image marker");
                    self.state = JpegStreamReaderState::EndOfImage;
                    return Ok(false);
                }
                Err(e) => return Err(e),
            };
            if self.handle_marker(code)? {
                return Ok(self.state == JpegStreamReaderState::StartOfScan);
            }
        }
    }
}
