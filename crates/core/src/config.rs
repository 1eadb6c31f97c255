use crate::encoder::DEFAULT_JPEG_QUALITY;
use crate::error::{AppError, Result};
use crate::session::EditMode;
use crate::upload::DEFAULT_MAX_UPLOAD_BYTES;
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Which [`crate::transform::ImageTransform`] carries out edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Local,
    Remote,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Backend::Local => "local",
            Backend::Remote => "remote",
        })
    }
}

impl FromStr for Backend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Backend::Local),
            "remote" => Ok(Backend::Remote),
            other => Err(AppError::config(format!("unknown backend '{other}'"))),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    /// Base URL of the image processing service, always ending in `/`.
    pub api_url: Url,
    /// Upper bound on one remote round trip.
    pub timeout: Duration,
    pub max_upload_bytes: u64,
    pub jpeg_quality: f32,
    pub backend: Backend,
    pub edit_mode: EditMode,
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load .env file if it exists, ignore if it doesn't
        let _ = dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_url = lookup("PHOTO_PASS_API_URL");
        let mut config = Self {
            api_url: parse_base_url(api_url.as_deref().unwrap_or(DEFAULT_API_URL))?,
            timeout: DEFAULT_TIMEOUT,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            backend: Backend::default(),
            edit_mode: EditMode::default(),
        };

        if let Some(raw) = lookup("PHOTO_PASS_TIMEOUT_SECS") {
            let secs: u64 = parse_number("PHOTO_PASS_TIMEOUT_SECS", &raw)?;
            if secs == 0 {
                return Err(AppError::config("PHOTO_PASS_TIMEOUT_SECS must be positive"));
            }
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(raw) = lookup("PHOTO_PASS_MAX_UPLOAD_MB") {
            let mb: u64 = parse_number("PHOTO_PASS_MAX_UPLOAD_MB", &raw)?;
            config.max_upload_bytes = mb.checked_mul(1024 * 1024).ok_or_else(|| {
                AppError::config(format!("PHOTO_PASS_MAX_UPLOAD_MB is too large: {mb}"))
            })?;
        }
        if let Some(raw) = lookup("PHOTO_PASS_JPEG_QUALITY") {
            let quality: f32 = parse_number("PHOTO_PASS_JPEG_QUALITY", &raw)?;
            config.jpeg_quality = quality.clamp(0.0, 1.0);
        }
        if let Some(raw) = lookup("PHOTO_PASS_BACKEND") {
            config.backend = raw.parse()?;
        }
        if let Some(raw) = lookup("PHOTO_PASS_EDIT_MODE") {
            config.edit_mode = raw.parse()?;
        }

        Ok(config)
    }
}

/// Parses a base URL and makes sure relative joins append to its path.
pub fn parse_base_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw.trim())
        .map_err(|e| AppError::config(format!("Invalid API URL '{raw}': {e}")))?;
    if url.cannot_be_a_base() {
        return Err(AppError::config(format!("API URL '{raw}' cannot be a base")));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn parse_number<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::config(format!("{key} has invalid value '{raw}'")))
}
