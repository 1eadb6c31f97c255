//! Error types for the photo-pass-core library.
//!
//! Variants are grouped the way failures surface to the user: input
//! validation, decoding, geometry, the remote service, encoding and the
//! edit session itself. None of them is fatal to a session.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur within the photo-pass-core library.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors (invalid environment values).
    #[error("Configuration error: {0}")]
    Config(String),

    /// The uploaded file has a MIME type we do not accept.
    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),

    /// The uploaded file exceeds the configured size limit.
    #[error("File too large: {size} bytes (maximum {max} bytes)")]
    FileTooLarge { size: u64, max: u64 },

    /// An operation parameter is outside its accepted range.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The image bytes could not be decoded.
    #[error("Failed to decode image: {0}")]
    Decode(String),

    /// A width or height of zero reached a geometry calculation.
    #[error("Invalid dimensions: {width}x{height}")]
    InvalidDimension { width: u32, height: u32 },

    /// The source raster is empty or its buffer does not match its size.
    #[error("Source image is empty or malformed")]
    InvalidImage,

    /// The remote service rejected the request (HTTP 4xx).
    #[error("{detail}")]
    Remote { status: u16, detail: String },

    /// The remote service failed or could not be reached.
    #[error("Remote service failure: {0}")]
    RemoteServer(String),

    /// The remote round trip exceeded the configured bound.
    #[error("Remote request timed out after {0:?}")]
    Timeout(Duration),

    /// A remote operation was requested before the image was uploaded.
    #[error("Image has not been uploaded to the processing service")]
    NotUploaded,

    /// Encoding the raster failed.
    #[error("Failed to encode image: {0}")]
    Encode(String),

    /// Another edit is still in flight on this session.
    #[error("Another edit is already in progress")]
    Busy,

    /// The session holds no image to operate on.
    #[error("No image loaded")]
    NoImage,

    /// Standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an invalid parameter error with the given message.
    pub fn parameter(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// Creates a decode error with the given message.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Creates an encode error with the given message.
    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    /// Creates a remote server error with the given message.
    pub fn remote(msg: impl Into<String>) -> Self {
        Self::RemoteServer(msg.into())
    }

    /// Returns true for failures that may succeed on a later attempt.
    ///
    /// Client errors (4xx) are never retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RemoteServer(_) | Self::Timeout(_))
    }

    /// Text for the transient notification shown to the user.
    ///
    /// Client errors from the service carry their `detail` verbatim; server
    /// and network failures collapse into a generic message.
    pub fn user_message(&self) -> String {
        match self {
            Self::Remote { detail, .. } => detail.clone(),
            Self::RemoteServer(_) | Self::Timeout(_) => {
                "The image service is unavailable. Please try again.".to_string()
            }
            Self::UnsupportedType(_) => {
                "Invalid file type. Please upload a valid image (JPEG, PNG, WebP).".to_string()
            }
            Self::FileTooLarge { max, .. } => format!(
                "File too large. Please upload a valid image (JPEG, PNG, WebP) under {}.",
                crate::upload::format_file_size(*max)
            ),
            other => other.to_string(),
        }
    }
}

/// A convenient alias for Result with [`AppError`].
pub type Result<T> = std::result::Result<T, AppError>;
