//! Structured metadata carried alongside the compressed image: the EXIF tag
//! tree, the free-text comment and the embedded EXIF thumbnail.
//!
//! The tree is read from the EXIF APP1 and COM segments and written back only
//! when something changed, so an untouched tree leaves the segments as they
//! were byte for byte.

use std::borrow::Cow;
use std::io::Cursor;

use exif::experimental::Writer;
use exif::{Context, Field, In, Tag, Value};
use image::DynamicImage;

use crate::container::{JpegContainer, SegmentEdit};
use crate::error::{JpegContentError, Result};
use crate::image_codec::{decode_jpeg, encode_jpeg};
use crate::orientation::Orientation;

/// Compression value for a JPEG-compressed thumbnail (old-style JPEG).
const THUMBNAIL_COMPRESSION_JPEG: u16 = 6;
const RESOLUTION_UNIT_INCH: u32 = 2;
const RESOLUTION_UNIT_CENTIMETER: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionAxis {
    X,
    Y,
}

#[derive(Debug, Default)]
pub struct MetadataTagTree {
    fields: Vec<Field>,
    little_endian: bool,
    thumbnail: Option<Vec<u8>>,
    comment: Option<Vec<u8>>,
    /// TIFF payload as found in the stream, written back while unmodified.
    original_exif: Option<Vec<u8>>,
    exif_modified: bool,
    comment_modified: bool,
}

impl MetadataTagTree {
    /// A tree with no tags and no comment.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Reads EXIF, comment and thumbnail from a JPEG stream without decoding
    /// any image data. An unreadable EXIF block is kept opaque rather than
    /// failing the whole parse.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let container =
            JpegContainer::parse(raw).map_err(|e| JpegContentError::CorruptMetadata(e.to_string()))?;
        let mut tree = Self {
            comment: container.comment().map(<[u8]>::to_vec),
            original_exif: container.exif_payload().map(<[u8]>::to_vec),
            ..Self::default()
        };

        if let Some(tiff) = &tree.original_exif {
            match exif::Reader::new().read_raw(tiff.clone()) {
                Ok(exif) => {
                    tree.little_endian = exif.little_endian();
                    tree.fields = exif
                        .fields()
                        .map(|f| Field {
                            tag: f.tag,
                            ifd_num: f.ifd_num,
                            value: f.value.clone(),
                        })
                        .collect();
                    tree.thumbnail = embedded_thumbnail(&exif);
                }
                Err(e) => log::warn!("EXIF block unreadable, keeping it as is: {e}"),
            }
        }
        Ok(tree)
    }

    fn field(&self, tag: Tag, ifd: In) -> Option<&Field> {
        self.fields.iter().find(|f| f.tag == tag && f.ifd_num == ifd)
    }

    fn set_field(&mut self, tag: Tag, ifd: In, value: Value) {
        match self.fields.iter_mut().find(|f| f.tag == tag && f.ifd_num == ifd) {
            Some(field) => field.value = value,
            None => self.fields.push(Field {
                tag,
                ifd_num: ifd,
                value,
            }),
        }
        self.exif_modified = true;
    }

    /// Looks up a tag by its `Exif.<Group>.<Name>` key.
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|f| field_key(f) == key).map(|f| &f.value)
    }

    /// Every tag as `(key, printable value)`, in stream order.
    pub fn entries(&self) -> Vec<(String, String)> {
        self.fields
            .iter()
            .map(|f| (field_key(f), f.display_value().to_string()))
            .collect()
    }

    /// Orientation tag, validated: it must be a SHORT in 1..=8, anything else
    /// reads as unavailable.
    pub fn orientation(&self) -> Orientation {
        let Some(field) = self.field(Tag::Orientation, In::PRIMARY) else {
            return Orientation::NotAvailable;
        };
        match &field.value {
            Value::Short(values) if !values.is_empty() => {
                let orientation = Orientation::from_exif(values[0] as u32);
                if orientation == Orientation::NotAvailable {
                    log::debug!("{} out of range: {}", field_key(field), values[0]);
                }
                orientation
            }
            other => {
                log::debug!("{} has unexpected value {other:?}", field_key(field));
                Orientation::NotAvailable
            }
        }
    }

    /// Sets the orientation tag to normal. A missing tag stays missing.
    pub fn reset_orientation(&mut self) {
        let Some(field) = self
            .fields
            .iter_mut()
            .find(|f| f.tag == Tag::Orientation && f.ifd_num == In::PRIMARY)
        else {
            return;
        };
        let normal = Orientation::Normal.exif_value();
        if !matches!(&field.value, Value::Short(v) if v.as_slice() == [normal]) {
            field.value = Value::Short(vec![normal]);
            self.exif_modified = true;
        }
    }

    /// Comment text; empty when there is none. Non UTF-8 bytes are replaced.
    pub fn comment(&self) -> String {
        self.comment
            .as_deref()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .unwrap_or_default()
    }

    /// Stores `text` as the comment. An empty string removes it.
    pub fn set_comment(&mut self, text: &str) {
        let new = (!text.is_empty()).then(|| text.as_bytes().to_vec());
        if new != self.comment {
            self.comment = new;
            self.comment_modified = true;
        }
    }

    pub fn thumbnail_bytes(&self) -> Option<&[u8]> {
        self.thumbnail.as_deref()
    }

    /// Decoded thumbnail, or `None` when absent or undecodable.
    pub fn thumbnail(&self) -> Option<DynamicImage> {
        let bytes = self.thumbnail.as_deref()?;
        decode_jpeg(bytes)
            .inspect_err(|e| log::debug!("embedded thumbnail: {e}"))
            .ok()
    }

    /// Replaces the thumbnail with `image` compressed at `quality`. An empty
    /// image removes the thumbnail.
    pub fn set_thumbnail(&mut self, image: &DynamicImage, quality: u8) -> Result<()> {
        if image.width() == 0 || image.height() == 0 {
            self.thumbnail = None;
            self.fields.retain(|f| f.ifd_num != In::THUMBNAIL);
            self.exif_modified = true;
            return Ok(());
        }
        let bytes = encode_jpeg(image, quality).map_err(JpegContentError::EncodeFailed)?;
        self.thumbnail = Some(bytes);
        self.set_field(
            Tag::Compression,
            In::THUMBNAIL,
            Value::Short(vec![THUMBNAIL_COMPRESSION_JPEG]),
        );
        Ok(())
    }

    /// Resolution normalized to dots per meter; 0 when the resolution or its
    /// unit is missing, or the unit is not absolute.
    pub fn dots_per_meter(&self, axis: ResolutionAxis) -> u32 {
        let tag = match axis {
            ResolutionAxis::X => Tag::XResolution,
            ResolutionAxis::Y => Tag::YResolution,
        };
        let Some(unit) = self
            .field(Tag::ResolutionUnit, In::PRIMARY)
            .and_then(|f| f.value.get_uint(0))
        else {
            return 0;
        };
        let resolution = match self.field(tag, In::PRIMARY).map(|f| &f.value) {
            Some(Value::Rational(values)) if !values.is_empty() && values[0].denom != 0 => values[0].to_f64(),
            Some(value @ (Value::Short(_) | Value::Long(_))) => value.get_uint(0).unwrap_or(0) as f64,
            _ => return 0,
        };
        match unit {
            RESOLUTION_UNIT_INCH => (resolution * 100.0 / 2.54) as u32,
            RESOLUTION_UNIT_CENTIMETER => (resolution * 100.0) as u32,
            _ => 0,
        }
    }

    /// Stamps the pixel dimensions of a replacement image.
    pub fn set_pixel_dimensions(&mut self, width: u32, height: u32) {
        self.set_field(Tag::PixelXDimension, In::PRIMARY, Value::Long(vec![width]));
        self.set_field(Tag::PixelYDimension, In::PRIMARY, Value::Long(vec![height]));
    }

    /// TIFF payload to store in the APP1 segment, if any.
    fn exif_payload(&self) -> Result<Option<Cow<'_, [u8]>>> {
        if !self.exif_modified {
            return Ok(self.original_exif.as_deref().map(Cow::Borrowed));
        }
        let mut fields: Vec<&Field> = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            if let Value::Unknown(..) = field.value {
                log::debug!("dropping {} on rewrite: value type not writable", field_key(field));
            } else {
                fields.push(field);
            }
        }
        if fields.is_empty() && self.thumbnail.is_none() {
            return Ok(None);
        }

        // IFD0 may not be empty, so a tree holding only a thumbnail gets the
        // mandatory resolution tags. Orientation is never added here.
        let required = if fields.iter().any(|f| f.ifd_num == In::PRIMARY) {
            Vec::new()
        } else {
            minimal_primary_fields()
        };
        fields.extend(required.iter());

        let mut writer = Writer::new();
        for field in &fields {
            writer.push_field(field);
        }
        if let Some(thumbnail) = &self.thumbnail {
            writer.set_jpeg(thumbnail, In::THUMBNAIL);
        }
        let mut cursor = Cursor::new(Vec::new());
        writer
            .write(&mut cursor, self.little_endian)
            .map_err(|e| JpegContentError::EncodeFailed(format!("EXIF: {e}")))?;
        Ok(Some(Cow::Owned(cursor.into_inner())))
    }

    /// Writes the tag tree and comment into `raw`, returning the new stream.
    /// Segments that already hold the wanted content are left alone.
    pub fn write_into(&self, raw: &[u8]) -> Result<Vec<u8>> {
        let container =
            JpegContainer::parse(raw).map_err(|e| JpegContentError::EncodeFailed(format!("metadata: {e}")))?;

        let exif = self.exif_payload()?;
        let exif_edit = match (exif.as_deref(), container.exif_payload()) {
            (Some(new), Some(old)) if new == old => SegmentEdit::Keep,
            (Some(new), _) => SegmentEdit::Replace(new),
            (None, Some(_)) => SegmentEdit::Remove,
            (None, None) => SegmentEdit::Keep,
        };
        let comment_edit = match (self.comment.as_deref(), container.comment()) {
            (Some(new), Some(old)) if new == old => SegmentEdit::Keep,
            (Some(new), _) => SegmentEdit::Replace(new),
            (None, Some(_)) => SegmentEdit::Remove,
            (None, None) => SegmentEdit::Keep,
        };

        if exif_edit == SegmentEdit::Keep && comment_edit == SegmentEdit::Keep {
            return Ok(raw.to_vec());
        }
        log::debug!("rewriting metadata segments: exif {exif_edit:?}, comment {comment_edit:?}");
        container
            .rewrite(exif_edit, comment_edit)
            .map_err(|e| JpegContentError::EncodeFailed(format!("metadata: {e}")))
    }
}

/// `Exif.<Group>.<Name>` key for a field.
pub fn field_key(field: &Field) -> String {
    let group = match field.tag.context() {
        Context::Tiff if field.ifd_num == In::THUMBNAIL => "Thumbnail",
        Context::Tiff => "Image",
        Context::Exif => "Photo",
        Context::Gps => "GPSInfo",
        Context::Interop => "Iop",
        #[allow(unreachable_patterns)]
        _ => "Unknown",
    };
    format!("Exif.{group}.{}", field.tag)
}

/// XResolution, YResolution and ResolutionUnit at 72 dpi.
fn minimal_primary_fields() -> Vec<Field> {
    let dpi = Value::Rational(vec![exif::Rational { num: 72, denom: 1 }]);
    vec![
        Field {
            tag: Tag::XResolution,
            ifd_num: In::PRIMARY,
            value: dpi.clone(),
        },
        Field {
            tag: Tag::YResolution,
            ifd_num: In::PRIMARY,
            value: dpi,
        },
        Field {
            tag: Tag::ResolutionUnit,
            ifd_num: In::PRIMARY,
            value: Value::Short(vec![RESOLUTION_UNIT_INCH as u16]),
        },
    ]
}

fn embedded_thumbnail(exif: &exif::Exif) -> Option<Vec<u8>> {
    let offset = exif
        .get_field(Tag::JPEGInterchangeFormat, In::THUMBNAIL)?
        .value
        .get_uint(0)? as usize;
    let length = exif
        .get_field(Tag::JPEGInterchangeFormatLength, In::THUMBNAIL)?
        .value
        .get_uint(0)? as usize;
    let bytes = exif.buf().get(offset..offset.checked_add(length)?);
    if bytes.is_none() {
        log::debug!("thumbnail range {offset}+{length} lies outside the EXIF block");
    }
    bytes.map(<[u8]>::to_vec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jpeg_marker_code::EXIF_IDENTIFIER;
    use exif::Rational;
    use image::RgbImage;

    fn field(tag: Tag, value: Value) -> Field {
        Field {
            tag,
            ifd_num: In::PRIMARY,
            value,
        }
    }

    fn tiff(fields: &[Field]) -> Vec<u8> {
        let mut writer = Writer::new();
        for f in fields {
            writer.push_field(f);
        }
        let mut cursor = Cursor::new(Vec::new());
        writer.write(&mut cursor, false).unwrap();
        cursor.into_inner()
    }

    fn segment(marker: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![0xFF, marker];
        out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    /// Header segments followed by a fake scan; enough for the container view.
    fn stream(exif: Option<&[u8]>, comment: Option<&[u8]>) -> Vec<u8> {
        let mut out = vec![0xFF, 0xD8];
        out.extend(segment(0xE0, b"JFIF\0\x01\x01\0\0\x01\0\x01\0\0"));
        if let Some(tiff) = exif {
            let mut payload = EXIF_IDENTIFIER.to_vec();
            payload.extend_from_slice(tiff);
            out.extend(segment(0xE1, &payload));
        }
        if let Some(text) = comment {
            out.extend(segment(0xFE, text));
        }
        out.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x02, 0x55, 0xFF, 0xD9]);
        out
    }

    fn oriented(value: Value) -> MetadataTagTree {
        let data = stream(Some(&tiff(&[field(Tag::Orientation, value)])), None);
        MetadataTagTree::parse(&data).unwrap()
    }

    #[test]
    fn test_orientation_read() {
        assert_eq!(oriented(Value::Short(vec![6])).orientation(), Orientation::Rot90);
        assert_eq!(oriented(Value::Short(vec![9])).orientation(), Orientation::NotAvailable);
        assert_eq!(oriented(Value::Short(vec![0])).orientation(), Orientation::NotAvailable);
        assert_eq!(oriented(Value::Long(vec![6])).orientation(), Orientation::NotAvailable);
    }

    #[test]
    fn test_missing_orientation_is_unavailable() {
        let tree = MetadataTagTree::parse(&stream(None, None)).unwrap();
        assert_eq!(tree.orientation(), Orientation::NotAvailable);
        assert_eq!(tree.comment(), "");
    }

    #[test]
    fn test_reset_orientation_only_when_present() {
        let mut tree = oriented(Value::Short(vec![8]));
        tree.reset_orientation();
        assert_eq!(tree.orientation(), Orientation::Normal);
        assert!(tree.exif_modified);

        let mut absent = MetadataTagTree::parse(&stream(None, None)).unwrap();
        absent.reset_orientation();
        assert_eq!(absent.orientation(), Orientation::NotAvailable);
        assert!(!absent.exif_modified);
    }

    #[test]
    fn test_unmodified_write_is_identity() {
        let data = stream(
            Some(&tiff(&[field(Tag::Orientation, Value::Short(vec![3]))])),
            Some(b"a comment"),
        );
        let tree = MetadataTagTree::parse(&data).unwrap();
        assert_eq!(tree.write_into(&data).unwrap(), data);
    }

    #[test]
    fn test_reset_orientation_survives_write() {
        let data = stream(
            Some(&tiff(&[
                field(Tag::Orientation, Value::Short(vec![6])),
                field(Tag::Make, Value::Ascii(vec![b"Acme".to_vec()])),
            ])),
            None,
        );
        let mut tree = MetadataTagTree::parse(&data).unwrap();
        tree.reset_orientation();
        let written = tree.write_into(&data).unwrap();
        let reread = MetadataTagTree::parse(&written).unwrap();
        assert_eq!(reread.orientation(), Orientation::Normal);
        assert!(reread.value("Exif.Image.Make").is_some());
    }

    #[test]
    fn test_comment_set_and_remove() {
        let data = stream(None, Some(b"old"));
        let mut tree = MetadataTagTree::parse(&data).unwrap();
        assert_eq!(tree.comment(), "old");

        tree.set_comment("caf\u{e9}");
        let written = tree.write_into(&data).unwrap();
        assert_eq!(MetadataTagTree::parse(&written).unwrap().comment(), "caf\u{e9}");

        tree.set_comment("");
        let removed = tree.write_into(&written).unwrap();
        let reread = MetadataTagTree::parse(&removed).unwrap();
        assert_eq!(reread.comment(), "");
        assert!(JpegContainer::parse(&removed).unwrap().comment().is_none());
    }

    #[test]
    fn test_setting_same_comment_is_not_a_change() {
        let data = stream(None, Some(b"same"));
        let mut tree = MetadataTagTree::parse(&data).unwrap();
        tree.set_comment("same");
        assert!(!tree.comment_modified);
        assert_eq!(tree.write_into(&data).unwrap(), data);
    }

    #[test]
    fn test_dots_per_meter() {
        let inches = tiff(&[
            field(Tag::XResolution, Value::Rational(vec![Rational { num: 72, denom: 1 }])),
            field(Tag::YResolution, Value::Rational(vec![Rational { num: 300, denom: 1 }])),
            field(Tag::ResolutionUnit, Value::Short(vec![2])),
        ]);
        let tree = MetadataTagTree::parse(&stream(Some(&inches), None)).unwrap();
        assert_eq!(tree.dots_per_meter(ResolutionAxis::X), 2834);
        assert_eq!(tree.dots_per_meter(ResolutionAxis::Y), 11811);

        let centimeters = tiff(&[
            field(Tag::XResolution, Value::Rational(vec![Rational { num: 40, denom: 1 }])),
            field(Tag::ResolutionUnit, Value::Short(vec![3])),
        ]);
        let tree = MetadataTagTree::parse(&stream(Some(&centimeters), None)).unwrap();
        assert_eq!(tree.dots_per_meter(ResolutionAxis::X), 4000);
        assert_eq!(tree.dots_per_meter(ResolutionAxis::Y), 0);
    }

    #[test]
    fn test_dots_per_meter_needs_unit() {
        let no_unit = tiff(&[field(
            Tag::XResolution,
            Value::Rational(vec![Rational { num: 72, denom: 1 }]),
        )]);
        let tree = MetadataTagTree::parse(&stream(Some(&no_unit), None)).unwrap();
        assert_eq!(tree.dots_per_meter(ResolutionAxis::X), 0);
    }

    #[test]
    fn test_dots_per_meter_without_absolute_unit() {
        let relative = tiff(&[
            field(Tag::XResolution, Value::Rational(vec![Rational { num: 72, denom: 1 }])),
            field(Tag::ResolutionUnit, Value::Short(vec![1])),
        ]);
        let tree = MetadataTagTree::parse(&stream(Some(&relative), None)).unwrap();
        assert_eq!(tree.dots_per_meter(ResolutionAxis::X), 0);
    }

    #[test]
    fn test_dots_per_meter_keeps_fraction() {
        let fractional = tiff(&[
            field(Tag::XResolution, Value::Rational(vec![Rational { num: 301, denom: 2 }])),
            field(Tag::ResolutionUnit, Value::Short(vec![3])),
        ]);
        let tree = MetadataTagTree::parse(&stream(Some(&fractional), None)).unwrap();
        assert_eq!(tree.dots_per_meter(ResolutionAxis::X), 15050);
    }

    #[test]
    fn test_thumbnail_without_exif() {
        let data = stream(None, None);
        let mut tree = MetadataTagTree::parse(&data).unwrap();
        let thumb = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, image::Rgb([0, 90, 180])));
        tree.set_thumbnail(&thumb, 75).unwrap();
        let written = tree.write_into(&data).unwrap();

        let reread = MetadataTagTree::parse(&written).unwrap();
        let decoded = reread.thumbnail().unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 8));
        assert_eq!(reread.orientation(), Orientation::NotAvailable);
        assert_eq!(reread.dots_per_meter(ResolutionAxis::X), 2834);
    }

    #[test]
    fn test_thumbnail_roundtrip() {
        let data = stream(
            Some(&tiff(&[field(Tag::Orientation, Value::Short(vec![1]))])),
            None,
        );
        let mut tree = MetadataTagTree::parse(&data).unwrap();
        assert!(tree.thumbnail().is_none());

        let thumb = DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 16, image::Rgb([200, 10, 10])));
        tree.set_thumbnail(&thumb, 75).unwrap();
        let written = tree.write_into(&data).unwrap();

        let reread = MetadataTagTree::parse(&written).unwrap();
        let decoded = reread.thumbnail().unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 16));
        assert_eq!(reread.orientation(), Orientation::Normal);
        assert!(reread.value("Exif.Thumbnail.Compression").is_some());
    }

    #[test]
    fn test_pixel_dimensions_create_exif() {
        let data = stream(None, None);
        let mut tree = MetadataTagTree::parse(&data).unwrap();
        tree.set_pixel_dimensions(640, 480);
        let written = tree.write_into(&data).unwrap();
        let reread = MetadataTagTree::parse(&written).unwrap();
        assert_eq!(
            reread.value("Exif.Photo.PixelXDimension").and_then(|v| v.get_uint(0)),
            Some(640)
        );
        assert_eq!(
            reread.value("Exif.Photo.PixelYDimension").and_then(|v| v.get_uint(0)),
            Some(480)
        );
    }

    #[test]
    fn test_unrecognized_container() {
        assert!(matches!(
            MetadataTagTree::parse(b"\x89PNG\r\n"),
            Err(JpegContentError::CorruptMetadata(_))
        ));
    }

    #[test]
    fn test_unreadable_exif_is_kept() {
        let data = stream(Some(b"not a tiff header"), None);
        let tree = MetadataTagTree::parse(&data).unwrap();
        assert_eq!(tree.orientation(), Orientation::NotAvailable);
        assert_eq!(tree.write_into(&data).unwrap(), data);
    }
}
