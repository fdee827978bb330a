//! Lossless JPEG rotation and flipping with EXIF orientation, comment and
//! thumbnail handling.
//!
//! [`JpegContent`] is the entry point: load a JPEG, queue orientation changes
//! and metadata edits, save. Rotations are done on quantized DCT coefficients
//! so no generation loss is introduced.

pub mod config;
pub mod container;
pub mod error;
pub mod error_trap;
pub mod image_codec;
pub mod jpeg1;
pub mod jpeg_content;
pub mod jpeg_marker_code;
pub mod jpeg_stream_reader;
pub mod jpeg_stream_writer;
pub mod memory_destination;
pub mod memory_source;
pub mod metadata;
pub mod orientation;
pub mod size_probe;
pub mod transform_engine;

pub use config::JpegContentOptions;
pub use error::{CodecError, JpegContentError, Result};
pub use jpeg_content::JpegContent;
pub use jpeg1::TransformCode;
pub use metadata::{MetadataTagTree, ResolutionAxis};
pub use orientation::{Orientation, TransformMatrix};
pub use size_probe::PixelSize;
pub use transform_engine::transform_jpeg;
