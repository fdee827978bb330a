//! Marker-segment view of a JPEG byte stream.
//!
//! Only the header section is split into segments; everything from the first
//! SOS marker onward is carried as an opaque body. This is enough to find and
//! replace the EXIF APP1 and COM segments without touching image data.

use crate::error::CodecError;
use crate::jpeg_marker_code::{EXIF_IDENTIFIER, JPEG_MARKER_START_BYTE, JpegMarkerCode};
use crate::jpeg_stream_writer::JpegStreamWriter;
use crate::memory_source::MemorySource;

const APP0: u8 = 0xE0;
const APP1: u8 = 0xE1;
const COM: u8 = 0xFE;

/// One header segment; `start` is the offset of its 0xFF byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentSpan {
    pub marker: u8,
    start: usize,
    payload_start: usize,
    end: usize,
}

impl SegmentSpan {
    fn is_application(&self) -> bool {
        (0xE0..=0xEF).contains(&self.marker)
    }

    fn is_exif(&self, data: &[u8]) -> bool {
        self.marker == APP1 && data[self.payload_start..self.end].starts_with(EXIF_IDENTIFIER)
    }
}

/// What to do with a segment kind when rewriting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentEdit<'e> {
    Keep,
    Remove,
    /// New payload, without the length field.
    Replace(&'e [u8]),
}

#[derive(Debug)]
pub struct JpegContainer<'a> {
    data: &'a [u8],
    segments: Vec<SegmentSpan>,
    body_start: usize,
}

impl<'a> JpegContainer<'a> {
    /// Splits the header section of `data` into segments.
    pub fn parse(data: &'a [u8]) -> Result<Self, CodecError> {
        let mut source = MemorySource::new(data);
        source.init();
        if source.read_u8()? != JPEG_MARKER_START_BYTE
            || source.read_u8()? != u8::from(JpegMarkerCode::StartOfImage)
        {
            return Err(CodecError::StartOfImageMarkerNotFound);
        }

        let mut segments = Vec::new();
        loop {
            let start = source.position();
            if source.read_u8()? != JPEG_MARKER_START_BYTE {
                return Err(CodecError::JpegMarkerStartByteNotFound);
            }
            let mut code = source.read_u8()?;
            while code == JPEG_MARKER_START_BYTE {
                code = source.read_u8()?;
            }
            if code == u8::from(JpegMarkerCode::StartOfScan) || code == u8::from(JpegMarkerCode::EndOfImage) {
                source.term();
                return Ok(Self {
                    data,
                    segments,
                    body_start: start,
                });
            }
            let standalone = JpegMarkerCode::try_from(code).is_ok_and(|m| !m.has_length()) || code == 0x01;
            if standalone {
                continue;
            }
            let length = source.read_u16()? as usize;
            if length < 2 {
                return Err(CodecError::InvalidMarkerSegmentSize);
            }
            let payload_start = source.position();
            source.read_bytes(length - 2)?;
            segments.push(SegmentSpan {
                marker: code,
                start,
                payload_start,
                end: source.position(),
            });
        }
    }

    pub fn segments(&self) -> &[SegmentSpan] {
        &self.segments
    }

    pub fn payload(&self, segment: &SegmentSpan) -> &'a [u8] {
        &self.data[segment.payload_start..segment.end]
    }

    /// TIFF payload of the first EXIF APP1 segment, identifier stripped.
    pub fn exif_payload(&self) -> Option<&'a [u8]> {
        self.segments
            .iter()
            .find(|s| s.is_exif(self.data))
            .map(|s| &self.payload(s)[EXIF_IDENTIFIER.len()..])
    }

    /// Raw bytes of the first COM segment.
    pub fn comment(&self) -> Option<&'a [u8]> {
        self.segments.iter().find(|s| s.marker == COM).map(|s| self.payload(s))
    }

    /// Rewrites the stream with the EXIF and COM segments edited.
    ///
    /// A replacement takes the place of the first existing segment of its kind
    /// and drops the rest. A new EXIF segment goes after the leading APP0
    /// segments; a new comment goes after the last APPn or COM segment.
    pub fn rewrite(&self, exif: SegmentEdit<'_>, comment: SegmentEdit<'_>) -> Result<Vec<u8>, CodecError> {
        let has_exif = self.segments.iter().any(|s| s.is_exif(self.data));
        let has_comment = self.segments.iter().any(|s| s.marker == COM);
        let exif_anchor = (!has_exif).then(|| self.segments.iter().take_while(|s| s.marker == APP0).count());
        let comment_anchor = (!has_comment).then(|| {
            self.segments
                .iter()
                .rposition(|s| s.is_application() || s.marker == COM)
                .map_or(0, |i| i + 1)
        });

        let mut writer = JpegStreamWriter::new();
        writer.write_start_of_image();
        let mut exif_done = false;
        let mut comment_done = false;

        for index in 0..=self.segments.len() {
            if exif_anchor == Some(index) {
                if let SegmentEdit::Replace(payload) = exif {
                    write_exif(&mut writer, payload)?;
                }
            }
            if comment_anchor == Some(index) {
                if let SegmentEdit::Replace(payload) = comment {
                    writer.write_segment(COM, payload)?;
                }
            }
            let Some(segment) = self.segments.get(index) else {
                break;
            };

            let (edit, done) = if segment.is_exif(self.data) {
                (exif, &mut exif_done)
            } else if segment.marker == COM {
                (comment, &mut comment_done)
            } else {
                writer.write_raw(&self.data[segment.start..segment.end]);
                continue;
            };
            match edit {
                SegmentEdit::Keep => writer.write_raw(&self.data[segment.start..segment.end]),
                SegmentEdit::Remove => {}
                SegmentEdit::Replace(payload) if !*done => {
                    if segment.marker == COM {
                        writer.write_segment(COM, payload)?;
                    } else {
                        write_exif(&mut writer, payload)?;
                    }
                    *done = true;
                }
                SegmentEdit::Replace(_) => {}
            }
        }

        writer.write_raw(&self.data[self.body_start..]);
        Ok(writer.finish())
    }
}

fn write_exif(writer: &mut JpegStreamWriter, tiff: &[u8]) -> Result<(), CodecError> {
    let mut payload = Vec::with_capacity(EXIF_IDENTIFIER.len() + tiff.len());
    payload.extend_from_slice(EXIF_IDENTIFIER);
    payload.extend_from_slice(tiff);
    writer.write_segment(APP1, &payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(marker: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![0xFF, marker];
        out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    fn exif(tiff: &[u8]) -> Vec<u8> {
        let mut payload = EXIF_IDENTIFIER.to_vec();
        payload.extend_from_slice(tiff);
        segment(APP1, &payload)
    }

    /// SOI, the given segments, then a fake SOS plus entropy data and EOI.
    fn stream(segments: &[Vec<u8>]) -> Vec<u8> {
        let mut out = vec![0xFF, 0xD8];
        for s in segments {
            out.extend_from_slice(s);
        }
        out.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x02, 0x12, 0xFF, 0x00, 0x34, 0xFF, 0xD9]);
        out
    }

    fn markers(data: &[u8]) -> Vec<u8> {
        JpegContainer::parse(data)
            .unwrap()
            .segments()
            .iter()
            .map(|s| s.marker)
            .collect()
    }

    #[test]
    fn test_parse_finds_exif_and_comment() {
        let data = stream(&[segment(APP0, b"JFIF\0"), exif(b"II*\0"), segment(COM, b"hello")]);
        let container = JpegContainer::parse(&data).unwrap();
        assert_eq!(container.segments().len(), 3);
        assert_eq!(container.exif_payload(), Some(&b"II*\0"[..]));
        assert_eq!(container.comment(), Some(&b"hello"[..]));
    }

    #[test]
    fn test_non_exif_app1_is_not_exif() {
        let data = stream(&[segment(APP1, b"http://ns.adobe.com/xap/1.0/\0<x/>")]);
        let container = JpegContainer::parse(&data).unwrap();
        assert_eq!(container.exif_payload(), None);
    }

    #[test]
    fn test_keep_is_byte_identical() {
        let data = stream(&[segment(APP0, b"JFIF\0"), exif(b"MM\0*"), segment(COM, b"c")]);
        let container = JpegContainer::parse(&data).unwrap();
        assert_eq!(container.rewrite(SegmentEdit::Keep, SegmentEdit::Keep).unwrap(), data);
    }

    #[test]
    fn test_replace_comment_in_place() {
        let data = stream(&[segment(COM, b"old"), segment(0xE2, b"icc")]);
        let container = JpegContainer::parse(&data).unwrap();
        let out = container.rewrite(SegmentEdit::Keep, SegmentEdit::Replace(b"new")).unwrap();
        assert_eq!(markers(&out), vec![COM, 0xE2]);
        assert_eq!(JpegContainer::parse(&out).unwrap().comment(), Some(&b"new"[..]));
    }

    #[test]
    fn test_new_comment_goes_after_last_application_segment() {
        let data = stream(&[segment(APP0, b"JFIF\0"), segment(0xE2, b"icc"), segment(0xDB, &[0; 65])]);
        let container = JpegContainer::parse(&data).unwrap();
        let out = container.rewrite(SegmentEdit::Keep, SegmentEdit::Replace(b"c")).unwrap();
        assert_eq!(markers(&out), vec![APP0, 0xE2, COM, 0xDB]);
    }

    #[test]
    fn test_new_exif_goes_after_app0() {
        let data = stream(&[segment(APP0, b"JFIF\0"), segment(0xDB, &[0; 65])]);
        let container = JpegContainer::parse(&data).unwrap();
        let out = container
            .rewrite(SegmentEdit::Replace(b"II*\0"), SegmentEdit::Replace(b"c"))
            .unwrap();
        assert_eq!(markers(&out), vec![APP0, APP1, COM, 0xDB]);
        let reparsed = JpegContainer::parse(&out).unwrap();
        assert_eq!(reparsed.exif_payload(), Some(&b"II*\0"[..]));
    }

    #[test]
    fn test_remove_drops_every_comment() {
        let data = stream(&[segment(COM, b"a"), exif(b"II*\0"), segment(COM, b"b")]);
        let container = JpegContainer::parse(&data).unwrap();
        let out = container.rewrite(SegmentEdit::Remove, SegmentEdit::Remove).unwrap();
        assert!(markers(&out).is_empty());
    }

    #[test]
    fn test_body_is_preserved() {
        let data = stream(&[segment(COM, b"a")]);
        let container = JpegContainer::parse(&data).unwrap();
        let out = container.rewrite(SegmentEdit::Keep, SegmentEdit::Remove).unwrap();
        assert!(out.ends_with(&[0xFF, 0xDA, 0x00, 0x02, 0x12, 0xFF, 0x00, 0x34, 0xFF, 0xD9]));
    }

    #[test]
    fn test_not_a_jpeg() {
        assert_eq!(
            JpegContainer::parse(b"GIF89a").unwrap_err(),
            CodecError::StartOfImageMarkerNotFound
        );
        assert_eq!(
            JpegContainer::parse(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00]).unwrap_err(),
            CodecError::NeedMoreData
        );
    }
}
