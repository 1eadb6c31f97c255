//! Uploaded files and the checks they pass before any decode or network work.

use crate::error::{AppError, Result};
use std::path::Path;

/// MIME types accepted for upload.
pub const ACCEPTED_TYPES: &[&str] = &["image/jpeg", "image/jpg", "image/png", "image/webp"];

/// Default upload limit: 10 MB.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// A file as chosen by the user.
#[derive(Clone, PartialEq, Eq)]
pub struct Upload {
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            bytes,
        }
    }

    /// Reads a file from disk, deriving its MIME type from the extension.
    ///
    /// Type and size are checked against `max_bytes` from the file's
    /// metadata before anything is read. Unknown extensions get
    /// `application/octet-stream`, which [`validate_upload`] rejects.
    pub fn from_path(path: &Path, max_bytes: u64) -> Result<Self> {
        let mime = mime_from_path(path).unwrap_or("application/octet-stream");
        validate_upload(mime, std::fs::metadata(path)?.len(), max_bytes)?;

        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let upload = Self::new(name, mime, bytes);
        // the file may have grown since the metadata was read
        upload.validate(max_bytes)?;
        Ok(upload)
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Runs [`validate_upload`] on this file.
    pub fn validate(&self, max_bytes: u64) -> Result<()> {
        validate_upload(&self.mime, self.size(), max_bytes)
    }
}

impl std::fmt::Debug for Upload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upload")
            .field("name", &self.name)
            .field("mime", &self.mime)
            .field("size", &self.bytes.len())
            .finish()
    }
}

/// MIME type for a path's extension.
pub fn mime_from_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "pdf" => Some("application/pdf"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

/// Rejects files with an unaccepted MIME type or over `max_bytes`.
pub fn validate_upload(mime: &str, size: u64, max_bytes: u64) -> Result<()> {
    if !ACCEPTED_TYPES.contains(&mime) {
        return Err(AppError::UnsupportedType(mime.to_string()));
    }
    if size > max_bytes {
        return Err(AppError::FileTooLarge {
            size,
            max: max_bytes,
        });
    }
    Ok(())
}

/// Human readable byte count, e.g. "1.5 MB".
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let exp = ((bytes as f64).ln() / 1024f64.ln()).floor() as usize;
    let exp = exp.min(UNITS.len() - 1);
    let value = bytes as f64 / 1024f64.powi(exp as i32);
    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[exp])
}
