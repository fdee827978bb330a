use thiserror::Error;

/// Low-level failures raised while parsing, entropy decoding or entropy encoding a JPEG stream.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    #[error("Need more data")]
    NeedMoreData = 1,
    #[error("Invalid data")]
    InvalidData = 2,
    #[error("JPEG marker start byte not found")]
    JpegMarkerStartByteNotFound = 3,
    #[error("Start of image marker not found")]
    StartOfImageMarkerNotFound = 4,
    #[error("Invalid marker segment size")]
    InvalidMarkerSegmentSize = 5,
    #[error("Duplicate start of frame marker")]
    DuplicateStartOfFrameMarker = 6,
    #[error("Start of frame marker not found")]
    StartOfFrameMarkerNotFound = 7,
    #[error("Encoding process not supported")]
    EncodingNotSupported = 8,
    #[error("Parameter value not supported")]
    ParameterValueNotSupported = 9,
    #[error("Invalid parameter width")]
    InvalidParameterWidth = 10,
    #[error("Invalid parameter height")]
    InvalidParameterHeight = 11,
    #[error("Invalid parameter component count")]
    InvalidParameterComponentCount = 12,
    #[error("Invalid sampling factor")]
    InvalidSamplingFactor = 13,
    #[error("Unknown component ID")]
    UnknownComponentId = 14,
    #[error("Invalid scan parameters")]
    InvalidScanParameters = 15,
    #[error("Missing Huffman table")]
    MissingHuffmanTable = 16,
    #[error("Invalid Huffman table")]
    InvalidHuffmanTable = 17,
    #[error("Invalid Huffman code")]
    InvalidHuffmanCode = 18,
    #[error("Missing quantization table")]
    MissingQuantizationTable = 19,
    #[error("Coefficient out of range")]
    CoefficientOutOfRange = 20,

    // Encoder side
    #[error("Coefficient cannot be encoded with the selected Huffman table")]
    UnencodableCoefficient = 100,
    #[error("Marker segment too large")]
    MarkerSegmentTooLarge = 101,
}

impl CodecError {
    /// True when the failure happened while producing output rather than reading input.
    pub fn is_encoding_error(self) -> bool {
        matches!(
            self,
            CodecError::UnencodableCoefficient | CodecError::MarkerSegmentTooLarge
        )
    }
}

/// Errors surfaced by [`crate::JpegContent`] and the modules it composes.
#[derive(Error, Debug)]
pub enum JpegContentError {
    #[error("No data to process")]
    NoData,
    #[error("Corrupt JPEG header: {0}")]
    CorruptHeader(CodecError),
    #[error("Corrupt metadata: {0}")]
    CorruptMetadata(String),
    #[error("JPEG decoding failed: {0}")]
    DecodeFailed(String),
    #[error("JPEG encoding failed: {0}")]
    EncodeFailed(String),
    #[error("No transformation matches the pending transformation matrix")]
    UnresolvedTransform,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, JpegContentError>;
