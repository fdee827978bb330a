//! JPEG Codestream Writer utilities.
//!
//! This module provides the `JpegStreamWriter` which emits markers and
//! segments (SOI, EOI, DQT, SOF, DHT, SOS, APPn/COM) into a growable
//! [`MemoryDestination`].

use crate::error::CodecError;
use crate::jpeg_marker_code::{JPEG_MARKER_START_BYTE, JpegMarkerCode};
use crate::jpeg_stream_reader::{FrameComponent, MarkerSegment, QuantizationTable};
use crate::memory_destination::MemoryDestination;

/// Largest payload that fits a 16-bit segment length.
const MAX_SEGMENT_PAYLOAD: usize = 0xFFFF - 2;

pub struct JpegStreamWriter {
    destination: MemoryDestination,
}

impl Default for JpegStreamWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl JpegStreamWriter {
    pub fn new() -> Self {
        let mut destination = MemoryDestination::new();
        destination.init();
        Self { destination }
    }

    pub fn len(&self) -> usize {
        self.destination.len()
    }

    pub fn is_empty(&self) -> bool {
        self.destination.is_empty()
    }

    pub fn destination_mut(&mut self) -> &mut MemoryDestination {
        &mut self.destination
    }

    pub fn write_byte(&mut self, value: u8) {
        self.destination.write_u8(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.destination.write_bytes(&value.to_be_bytes());
    }

    pub fn write_marker(&mut self, marker: JpegMarkerCode) {
        self.write_byte(JPEG_MARKER_START_BYTE);
        self.write_byte(marker.into());
    }

    pub fn write_start_of_image(&mut self) {
        self.write_marker(JpegMarkerCode::StartOfImage)
    }

    pub fn write_end_of_image(&mut self) {
        self.write_marker(JpegMarkerCode::EndOfImage)
    }

    fn write_segment_length(&mut self, payload_len: usize) -> Result<(), CodecError> {
        if payload_len > MAX_SEGMENT_PAYLOAD {
            return Err(CodecError::MarkerSegmentTooLarge);
        }
        self.write_u16((payload_len + 2) as u16);
        Ok(())
    }

    /// Writes a saved APPn/COM segment verbatim.
    pub fn write_marker_segment(&mut self, segment: &MarkerSegment) -> Result<(), CodecError> {
        self.write_segment(segment.marker, &segment.data)
    }

    pub fn write_segment(&mut self, marker: u8, payload: &[u8]) -> Result<(), CodecError> {
        self.write_byte(JPEG_MARKER_START_BYTE);
        self.write_byte(marker);
        self.write_segment_length(payload.len())?;
        self.destination.write_bytes(payload);
        Ok(())
    }

    /// Copies already-encoded bytes (entropy data, trailing markers) verbatim.
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.destination.write_bytes(bytes);
    }

    /// Writes a DQT segment; 16-bit precision is used only when needed.
    pub fn write_dqt(&mut self, table_id: u8, table: &QuantizationTable) -> Result<(), CodecError> {
        self.write_marker(JpegMarkerCode::DefineQuantizationTable);
        if table.is_8bit() {
            self.write_segment_length(1 + 64)?;
            self.write_byte(table_id & 0x0F);
            for &val in &table.values {
                self.write_byte(val as u8);
            }
        } else {
            self.write_segment_length(1 + 128)?;
            self.write_byte(0x10 | (table_id & 0x0F));
            for &val in &table.values {
                self.write_u16(val);
            }
        }
        Ok(())
    }

    pub fn write_dht(
        &mut self,
        table_class: u8,
        table_id: u8,
        lengths: &[u8; 16],
        values: &[u8],
    ) -> Result<(), CodecError> {
        self.write_marker(JpegMarkerCode::DefineHuffmanTable);
        self.write_segment_length(1 + 16 + values.len())?;
        self.write_byte(((table_class & 1) << 4) | (table_id & 0x0F));
        for &len in lengths {
            self.write_byte(len);
        }
        self.destination.write_bytes(values);
        Ok(())
    }

    pub fn write_start_of_frame(
        &mut self,
        marker: JpegMarkerCode,
        width: u16,
        height: u16,
        components: &[FrameComponent],
    ) -> Result<(), CodecError> {
        self.write_marker(marker);
        self.write_segment_length(6 + components.len() * 3)?;
        self.write_byte(8);
        self.write_u16(height);
        self.write_u16(width);
        self.write_byte(components.len() as u8);
        for component in components {
            self.write_byte(component.id);
            self.write_byte((component.h_samp_factor << 4) | (component.v_samp_factor & 0x0F));
            self.write_byte(component.quant_table_dest);
        }
        Ok(())
    }

    /// Writes a sequential SOS header. `components` holds (id, DC table, AC table).
    pub fn write_start_of_scan(&mut self, components: &[(u8, u8, u8)]) -> Result<(), CodecError> {
        self.write_marker(JpegMarkerCode::StartOfScan);
        self.write_segment_length(1 + components.len() * 2 + 3)?;
        self.write_byte(components.len() as u8);
        for &(id, dc_table, ac_table) in components {
            self.write_byte(id);
            self.write_byte((dc_table << 4) | (ac_table & 0x0F));
        }
        self.write_byte(0); // Ss
        self.write_byte(63); // Se
        self.write_byte(0); // Ah/Al
        Ok(())
    }

    /// Terminates the destination and returns the written bytes.
    pub fn finish(self) -> Vec<u8> {
        self.destination.into_inner()
    }
}
