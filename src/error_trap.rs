//! Recoverable checkpoint around codec entry points.
//!
//! A trap is armed for exactly one top-level operation and consumed by
//! [`ErrorTrap::run`]. Codec failures, whether returned as [`CodecError`] or
//! raised as a panic on malformed input, come back as
//! [`JpegContentError::DecodeFailed`] or [`JpegContentError::EncodeFailed`]
//! after the message has been logged.

use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::error::{CodecError, JpegContentError, Result};

#[derive(Debug)]
pub struct ErrorTrap {
    operation: &'static str,
}

impl ErrorTrap {
    pub fn new(operation: &'static str) -> Self {
        Self { operation }
    }

    pub fn run<T, F>(self, codec_call: F) -> Result<T>
    where
        F: FnOnce() -> std::result::Result<T, CodecError>,
    {
        match catch_unwind(AssertUnwindSafe(codec_call)) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => {
                let message = format!("{}: {}", self.operation, error);
                log::error!("{message}");
                if error.is_encoding_error() {
                    Err(JpegContentError::EncodeFailed(message))
                } else {
                    Err(JpegContentError::DecodeFailed(message))
                }
            }
            Err(payload) => {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown codec failure".to_string());
                let message = format!("{}: {}", self.operation, reason);
                log::error!("{message}");
                Err(JpegContentError::DecodeFailed(message))
            }
        }
    }
}
