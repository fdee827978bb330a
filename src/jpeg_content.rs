//! [`JpegContent`]: a JPEG file held in memory together with its metadata,
//! edited losslessly and written back on save.
//!
//! Edits are cheap until [`JpegContent::save`]: transforms are composed into
//! one pending matrix, metadata changes stay in the tag tree. Save stages the
//! new stream in a separate buffer and only replaces the held bytes once
//! every step succeeded, then reloads from the result.

use std::borrow::Cow;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use image::DynamicImage;

use crate::config::JpegContentOptions;
use crate::error::{JpegContentError, Result};
use crate::image_codec::encode_jpeg;
use crate::jpeg1::TransformCode;
use crate::metadata::{MetadataTagTree, ResolutionAxis};
use crate::orientation::{Orientation, TransformMatrix, find_transform};
use crate::size_probe::{PixelSize, display_size, probe_encoded_size};
use crate::transform_engine::transform_jpeg;

#[derive(Debug, Default)]
pub struct JpegContent {
    options: JpegContentOptions,
    raw_data: Vec<u8>,
    metadata: MetadataTagTree,
    encoded_size: PixelSize,
    pending_transform: TransformMatrix,
    /// Replacement pixels; when set they take precedence over `raw_data`.
    pending_image: Option<DynamicImage>,
}

impl JpegContent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: JpegContentOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn options(&self) -> &JpegContentOptions {
        &self.options
    }

    fn clear(&mut self) {
        *self = Self::with_options(self.options);
    }

    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) => {
                self.clear();
                return Err(e.into());
            }
        };
        log::debug!("loaded {} bytes from {}", data.len(), path.display());
        self.load_from_data(&data)
    }

    /// Takes a copy of `data`. On failure the instance is left empty.
    pub fn load_from_data(&mut self, data: &[u8]) -> Result<()> {
        match self.parse(data) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.clear();
                Err(e)
            }
        }
    }

    fn parse(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Err(JpegContentError::NoData);
        }
        let encoded_size = probe_encoded_size(data)?;
        let metadata = MetadataTagTree::parse(data).unwrap_or_else(|e| {
            log::warn!("{e}; continuing without metadata");
            MetadataTagTree::empty()
        });

        self.raw_data = data.to_vec();
        self.metadata = metadata;
        self.encoded_size = encoded_size;
        self.pending_transform = TransformMatrix::IDENTITY;
        self.pending_image = None;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.raw_data.is_empty() && self.pending_image.is_none()
    }

    /// The bytes as loaded or last saved. Pending edits are not included.
    pub fn raw_data(&self) -> &[u8] {
        &self.raw_data
    }

    pub fn metadata(&self) -> &MetadataTagTree {
        &self.metadata
    }

    pub fn orientation(&self) -> Orientation {
        self.metadata.orientation()
    }

    pub fn reset_orientation(&mut self) {
        self.metadata.reset_orientation();
    }

    /// Encoded size, transposed when the orientation tag turns the image by a
    /// quarter unless disabled in the options. Pending transforms are not
    /// reflected until they are saved.
    pub fn size(&self) -> PixelSize {
        if self.options.apply_exif_orientation {
            display_size(self.encoded_size, self.orientation())
        } else {
            self.encoded_size
        }
    }

    pub fn comment(&self) -> String {
        self.metadata.comment()
    }

    pub fn set_comment(&mut self, text: &str) {
        self.metadata.set_comment(text);
    }

    /// Queues `orientation` after any transform already pending.
    pub fn transform(&mut self, orientation: Orientation) {
        self.pending_transform = self.pending_transform.then(&orientation.matrix());
    }

    pub fn pending_transform(&self) -> &TransformMatrix {
        &self.pending_transform
    }

    /// Single transform code equivalent to everything queued so far.
    pub fn resolve_pending_transform(&self) -> Result<TransformCode> {
        find_transform(&self.pending_transform).ok_or(JpegContentError::UnresolvedTransform)
    }

    /// Rotates or flips the image upright according to its orientation tag
    /// and marks it as normally oriented.
    pub fn apply_orientation(&mut self) {
        let orientation = self.orientation();
        if orientation.is_identity() {
            return;
        }
        self.transform(orientation);
        self.reset_orientation();
    }

    pub fn thumbnail(&self) -> Option<DynamicImage> {
        self.metadata.thumbnail()
    }

    /// The thumbnail is not kept in sync with transforms; set it again after
    /// rotating if it should match.
    pub fn set_thumbnail(&mut self, image: &DynamicImage) -> Result<()> {
        self.metadata.set_thumbnail(image, self.options.thumbnail_quality)
    }

    pub fn dots_per_meter_x(&self) -> u32 {
        self.metadata.dots_per_meter(ResolutionAxis::X)
    }

    pub fn dots_per_meter_y(&self) -> u32 {
        self.metadata.dots_per_meter(ResolutionAxis::Y)
    }

    /// Replaces the pixel content. The image is compressed on the next save;
    /// pending transforms are dropped and the orientation tag is reset.
    pub fn set_image(&mut self, image: DynamicImage) {
        self.raw_data.clear();
        self.encoded_size = PixelSize::new(image.width(), image.height());
        self.metadata.set_pixel_dimensions(image.width(), image.height());
        self.metadata.reset_orientation();
        self.pending_transform = TransformMatrix::IDENTITY;
        self.pending_image = Some(image);
    }

    /// Builds the stream `save` would write without touching any state.
    fn prepare_output(&self) -> Result<Vec<u8>> {
        let encoded;
        let base: &[u8] = match &self.pending_image {
            Some(image) => {
                encoded = encode_jpeg(image, self.options.quality).map_err(JpegContentError::EncodeFailed)?;
                &encoded
            }
            None => &self.raw_data,
        };
        if base.is_empty() {
            return Err(JpegContentError::NoData);
        }

        let code = self.resolve_pending_transform().unwrap_or_else(|e| {
            log::warn!("{e}: {:?}, saving untransformed", self.pending_transform);
            TransformCode::None
        });
        let transformed = if code == TransformCode::None {
            Cow::Borrowed(base)
        } else {
            log::debug!("applying {code:?} before save");
            Cow::Owned(transform_jpeg(base, code)?)
        };

        self.metadata.write_into(&transformed)
    }

    /// Writes the edited stream to `writer` and reloads from it. On error
    /// nothing held by the instance changes.
    pub fn save<W: Write>(&mut self, writer: &mut W) -> Result<()> {
        let output = self.prepare_output()?;
        self.commit(&output, writer)
    }

    pub fn save_to_path(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let output = self.prepare_output()?;
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        self.commit(&output, &mut writer)
    }

    /// Writes `output` and replaces the held state with the reloaded result.
    fn commit<W: Write>(&mut self, output: &[u8], writer: &mut W) -> Result<()> {
        writer.write_all(output)?;
        writer.flush()?;
        let mut reloaded = Self::with_options(self.options);
        reloaded
            .parse(output)
            .inspect_err(|e| log::error!("written stream could not be reloaded: {e}"))?;
        *self = reloaded;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jpeg1::Jpeg1Encoder;
    use crate::jpeg1::coefficients::CoefficientImage;
    use crate::jpeg_stream_reader::{FrameComponent, MarkerSegment, QuantizationTable};

    /// Coefficient-built 32x16 grayscale stream with a comment.
    fn sample() -> Vec<u8> {
        let component = FrameComponent {
            id: 1,
            h_samp_factor: 1,
            v_samp_factor: 1,
            quant_table_dest: 0,
        };
        let mut image = CoefficientImage::with_components(32, 16, &[component]).unwrap();
        image.quantization_tables[0] = Some(QuantizationTable { values: [4; 64] });
        if let Some(block) = image.components[0].block_mut(3, 1) {
            block[0] = 20;
        }
        let comment = MarkerSegment {
            marker: 0xFE,
            data: b"hello".to_vec(),
        };
        Jpeg1Encoder::new().encode(&image, &[comment]).unwrap()
    }

    #[test]
    fn test_empty_instance() {
        let mut content = JpegContent::new();
        assert!(content.is_empty());
        assert_eq!(content.orientation(), Orientation::NotAvailable);
        assert_eq!(content.size(), PixelSize::default());
        assert!(matches!(
            content.save(&mut Vec::new()),
            Err(JpegContentError::NoData)
        ));
    }

    #[test]
    fn test_load_empty_data() {
        let mut content = JpegContent::new();
        assert!(matches!(content.load_from_data(&[]), Err(JpegContentError::NoData)));
    }

    #[test]
    fn test_failed_load_clears_previous_state() {
        let mut content = JpegContent::new();
        content.load_from_data(&sample()).unwrap();
        assert!(content.load_from_data(b"garbage").is_err());
        assert!(content.is_empty());
        assert_eq!(content.comment(), "");
    }

    #[test]
    fn test_size_follows_saved_stream_only() {
        let mut content = JpegContent::new();
        content.load_from_data(&sample()).unwrap();
        assert_eq!(content.size(), PixelSize::new(32, 16));
        content.transform(Orientation::Rot90);
        assert_eq!(content.size(), PixelSize::new(32, 16));
        assert_eq!(content.raw_data(), sample().as_slice());
        content.save(&mut Vec::new()).unwrap();
        assert_eq!(content.size(), PixelSize::new(16, 32));
    }

    #[test]
    fn test_failed_write_keeps_state() {
        struct FullDisk;
        impl Write for FullDisk {
            fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::other("disk full"))
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut content = JpegContent::new();
        content.load_from_data(&sample()).unwrap();
        content.transform(Orientation::Rot90);
        content.set_comment("pending");
        assert!(matches!(content.save(&mut FullDisk), Err(JpegContentError::Io(_))));
        assert_eq!(content.raw_data(), sample().as_slice());
        assert!(!content.pending_transform().is_identity());
        assert_eq!(content.comment(), "pending");
    }

    #[test]
    fn test_reload_failure_keeps_state() {
        let mut content = JpegContent::new();
        content.load_from_data(&sample()).unwrap();
        content.transform(Orientation::HFlip);
        let mut out = Vec::new();
        assert!(content.commit(b"not a jpeg", &mut out).is_err());
        assert_eq!(out, b"not a jpeg");
        assert_eq!(content.raw_data(), sample().as_slice());
        assert!(!content.pending_transform().is_identity());
        assert_eq!(content.comment(), "hello");
    }

    #[test]
    fn test_save_applies_transform_and_reloads() {
        let mut content = JpegContent::new();
        content.load_from_data(&sample()).unwrap();
        content.transform(Orientation::Rot270);
        let mut out = Vec::new();
        content.save(&mut out).unwrap();
        assert_eq!(content.raw_data(), out.as_slice());
        assert_eq!(content.size(), PixelSize::new(16, 32));
        assert!(content.pending_transform().is_identity());
        assert_eq!(content.comment(), "hello");
    }

    #[test]
    fn test_comment_only_save() {
        let mut content = JpegContent::new();
        content.load_from_data(&sample()).unwrap();
        content.set_comment("changed");
        let mut out = Vec::new();
        content.save(&mut out).unwrap();
        assert_eq!(content.comment(), "changed");
    }

    #[test]
    fn test_unresolved_transform_is_reported() {
        let mut content = JpegContent::new();
        content.pending_transform = TransformMatrix::linear(2.0, 0.0, 0.0, 1.0);
        assert!(matches!(
            content.resolve_pending_transform(),
            Err(JpegContentError::UnresolvedTransform)
        ));
    }

    #[test]
    fn test_set_image_then_save() {
        let mut content = JpegContent::new();
        content.load_from_data(&sample()).unwrap();
        content.transform(Orientation::Rot90);
        content.set_image(DynamicImage::new_rgb8(24, 8));
        assert!(content.pending_transform().is_identity());
        assert_eq!(content.size(), PixelSize::new(24, 8));

        let mut out = Vec::new();
        content.save(&mut out).unwrap();
        assert_eq!(content.size(), PixelSize::new(24, 8));
        assert_eq!(content.comment(), "hello");
    }
}
