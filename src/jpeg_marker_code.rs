use num_enum::{IntoPrimitive, TryFromPrimitive};

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum JpegMarkerCode {
    /// SOF0: Baseline DCT, Huffman coding.
    StartOfFrameBaseline = 0xC0,
    /// SOF1: Extended sequential DCT, Huffman coding.
    StartOfFrameExtendedSequential = 0xC1,
    /// SOF2: Progressive DCT, Huffman coding.
    StartOfFrameProgressive = 0xC2,
    /// SOF3: Lossless (sequential), Huffman coding.
    StartOfFrameLossless = 0xC3,
    /// DHT: Defines one or more Huffman tables.
    DefineHuffmanTable = 0xC4,
    /// SOF5: Differential sequential DCT, Huffman coding.
    StartOfFrameDifferentialSequential = 0xC5,
    /// SOF6: Differential progressive DCT, Huffman coding.
    StartOfFrameDifferentialProgressive = 0xC6,
    /// SOF7: Differential lossless, Huffman coding.
    StartOfFrameDifferentialLossless = 0xC7,
    /// JPG: Reserved for JPEG extensions.
    JpegExtension = 0xC8,
    /// SOF9: Extended sequential DCT, arithmetic coding.
    StartOfFrameArithmeticSequential = 0xC9,
    /// SOF10: Progressive DCT, arithmetic coding.
    StartOfFrameArithmeticProgressive = 0xCA,
    /// SOF11: Lossless (sequential), arithmetic coding.
    StartOfFrameArithmeticLossless = 0xCB,
    /// DAC: Defines arithmetic coding conditioning.
    DefineArithmeticConditioning = 0xCC,
    /// SOF13: Differential sequential DCT, arithmetic coding.
    StartOfFrameArithmeticDifferentialSequential = 0xCD,
    /// SOF14: Differential progressive DCT, arithmetic coding.
    StartOfFrameArithmeticDifferentialProgressive = 0xCE,
    /// SOF15: Differential lossless, arithmetic coding.
    StartOfFrameArithmeticDifferentialLossless = 0xCF,

    /// RST0..RST7: Restart markers inside entropy coded data.
    Restart0 = 0xD0,
    Restart1 = 0xD1,
    Restart2 = 0xD2,
    Restart3 = 0xD3,
    Restart4 = 0xD4,
    Restart5 = 0xD5,
    Restart6 = 0xD6,
    Restart7 = 0xD7,

    /// SOI: Marks the start of an image.
    StartOfImage = 0xD8,

    /// EOI: Marks the end of an image.
    EndOfImage = 0xD9,

    /// SOS: Marks the start of scan.
    StartOfScan = 0xDA,

    /// DQT: Defines one or more quantization tables.
    DefineQuantizationTable = 0xDB,

    /// DNL: Defines the number of lines in a scan.
    DefineNumberOfLines = 0xDC,

    /// DRI: Defines the restart interval used in succeeding scans.
    DefineRestartInterval = 0xDD,

    /// APP0: Application data 0: used for JFIF header.
    ApplicationData0 = 0xE0,
    /// APP1: Application data 1: used for EXIF or XMP header.
    ApplicationData1 = 0xE1,
    /// APP2: Application data 2: used for ICC profile.
    ApplicationData2 = 0xE2,
    /// APP3: Application data 3: used for meta info
    ApplicationData3 = 0xE3,
    /// APP4: Application data 4.
    ApplicationData4 = 0xE4,
    /// APP5: Application data 5.
    ApplicationData5 = 0xE5,
    /// APP6: Application data 6.
    ApplicationData6 = 0xE6,
    /// APP7: Application data 7.
    ApplicationData7 = 0xE7,
    /// APP8: Application data 8.
    ApplicationData8 = 0xE8,
    /// APP9: Application data 9.
    ApplicationData9 = 0xE9,
    /// APP10: Application data 10.
    ApplicationData10 = 0xEA,
    /// APP11: Application data 11.
    ApplicationData11 = 0xEB,
    /// APP12: Application data 12: used for Picture info.
    ApplicationData12 = 0xEC,
    /// APP13: Application data 13: used by PhotoShop IRB and IPTC
    ApplicationData13 = 0xED,
    /// APP14: Application data 14: used by Adobe
    ApplicationData14 = 0xEE,
    /// APP15: Application data 15.
    ApplicationData15 = 0xEF,

    /// COM: Comment block.
    Comment = 0xFE,
}

impl JpegMarkerCode {
    /// APPn and COM segments: everything the lossless path copies verbatim.
    pub fn is_ancillary(self) -> bool {
        let code = u8::from(self);
        (0xE0..=0xEF).contains(&code) || self == JpegMarkerCode::Comment
    }

    pub fn is_restart(self) -> bool {
        (0xD0..=0xD7).contains(&u8::from(self))
    }

    pub fn is_start_of_frame(self) -> bool {
        let code = u8::from(self);
        (0xC0..=0xCF).contains(&code)
            && !matches!(
                self,
                JpegMarkerCode::DefineHuffmanTable
                    | JpegMarkerCode::JpegExtension
                    | JpegMarkerCode::DefineArithmeticConditioning
            )
    }

    /// Markers that stand alone without a length field.
    pub fn has_length(self) -> bool {
        !(self.is_restart()
            || self == JpegMarkerCode::StartOfImage
            || self == JpegMarkerCode::EndOfImage)
    }
}

pub const JPEG_MARKER_START_BYTE: u8 = 0xFF;
pub const JPEG_RESTART_MARKER_BASE: u8 = 0xD0;
pub const JPEG_RESTART_MARKER_RANGE: u8 = 8;

/// Identifier that prefixes the TIFF payload of an EXIF APP1 segment.
pub const EXIF_IDENTIFIER: &[u8; 6] = b"Exif\0\0";
