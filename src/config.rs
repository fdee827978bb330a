/// Options for a [`crate::JpegContent`] instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JpegContentOptions {
    /// Report `size()` in display orientation. When off, the encoded size is
    /// reported as is.
    pub apply_exif_orientation: bool,
    /// Quality used when a replacement image has to be compressed on save.
    pub quality: u8,
    /// Quality used for embedded thumbnails.
    pub thumbnail_quality: u8,
}

impl Default for JpegContentOptions {
    fn default() -> Self {
        Self {
            apply_exif_orientation: true,
            quality: 90,
            thumbnail_quality: 75,
        }
    }
}

impl JpegContentOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply_exif_orientation(mut self, apply: bool) -> Self {
        self.apply_exif_orientation = apply;
        self
    }

    pub fn quality(mut self, quality: u8) -> Self {
        self.quality = quality.clamp(1, 100);
        self
    }

    pub fn thumbnail_quality(mut self, quality: u8) -> Self {
        self.thumbnail_quality = quality.clamp(1, 100);
        self
    }
}
