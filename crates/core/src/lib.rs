//! Photo Pass Core Library
//!
//! This library provides the core functionality for the Photo Pass
//! passport/visa photo editor: fitting photos to standard canvas sizes,
//! replacing backgrounds, cosmetic filters and export.
//!
//! # Overview
//!
//! A photo goes through one [`EditSession`]. Each edit is carried out by an
//! [`ImageTransform`], either in-process or through the remote image
//! processing service. The library handles:
//!
//! - **Geometry**: aspect-fill rectangles via [`geometry`]
//! - **Compositing**: background fill plus clipped draw via [`compositor`]
//! - **Background removal**: the luminance/saturation heuristic in [`background`]
//! - **Filters**: brightness, contrast, blur, crop, rotate and friends in [`filters`]
//! - **Remote service**: upload, transforms, list and delete via [`remote`]
//! - **Export**: JPEG/PNG encoding and data URLs via [`encoder`]
//!
//! # Quick Start
//!
//! ```ignore
//! use photo_pass_core::{Edit, PhotoPass, Preset, Upload};
//!
//! let app = PhotoPass::new()?;
//! let mut session = app.new_session();
//!
//! session.load(Upload::from_path(path, app.config().max_upload_bytes)?, app.transform()).await?;
//! session.apply(app.transform(), Edit::Preset(Preset::UsPassport)).await?;
//! std::fs::write(session.download_filename_today(), session.export()?)?;
//! ```
//!
//! # Module Structure
//!
//! - [`background`]: Background removal heuristic
//! - [`compositor`]: Canvas compositing
//! - [`config`]: Configuration loading and management
//! - [`encoder`]: Encoding, decoding and output formats
//! - [`error`]: Error types and result aliases
//! - [`filters`]: Cosmetic and geometric filters
//! - [`geometry`]: Aspect-fill calculation
//! - [`presets`]: Sizes, background colors and presets
//! - [`raster`]: In-memory RGBA raster
//! - [`remote`]: Image processing service client
//! - [`session`]: Edit session state machine
//! - [`settings`]: Persisted user preferences
//! - [`transform`]: The interchangeable transform capability
//! - [`upload`]: Upload validation

pub mod background;
pub mod compositor;
pub mod config;
pub mod encoder;
pub mod error;
pub mod filters;
pub mod geometry;
pub mod presets;
pub mod raster;
pub mod remote;
pub mod session;
pub mod settings;
pub mod transform;
pub mod upload;

// Re-export primary types for convenience
pub use config::{Backend, Config};
pub use encoder::{FormatKind, OutputFormat};
pub use error::{AppError, Result};
pub use filters::{Filter, FlipDirection};
pub use presets::{BackgroundColor, PhotoSize, Preset, Rgb};
pub use raster::RasterImage;
pub use remote::{RemoteClient, RemoteTransform};
pub use session::{Edit, EditMode, EditSession, SessionState};
pub use settings::Settings;
pub use transform::{ImageTransform, LocalTransform, Operation};
pub use upload::Upload;

/// Main entry point for the Photo Pass editor.
///
/// Holds the configuration and the transform selected by
/// [`Config::backend`], and hands out sessions wired to both.
pub struct PhotoPass {
    config: Config,
    transform: Box<dyn ImageTransform>,
}

impl PhotoPass {
    /// Creates an instance from the environment (including `.env` files).
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration value is invalid or the HTTP
    /// client cannot be built.
    pub fn new() -> Result<Self> {
        Self::with_config(Config::load()?)
    }

    /// Creates an instance with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote backend is selected and the HTTP client
    /// cannot be built.
    pub fn with_config(config: Config) -> Result<Self> {
        let transform = build_transform(&config)?;
        log::debug!("Using {} transform", transform.name());
        Ok(Self { config, transform })
    }

    /// The transform every session edit should go through.
    pub fn transform(&self) -> &dyn ImageTransform {
        self.transform.as_ref()
    }

    /// A fresh, empty session using the configured limits and edit mode.
    pub fn new_session(&self) -> EditSession {
        EditSession::new(&self.config)
    }

    /// A client for the service's list/delete endpoints.
    pub fn remote_client(&self) -> Result<RemoteClient> {
        RemoteClient::new(&self.config)
    }

    /// Returns a reference to the current configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns a mutable reference to the configuration.
    ///
    /// Changing the backend here does not swap the transform; build a new
    /// instance with [`PhotoPass::with_config`] instead.
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }
}

fn build_transform(config: &Config) -> Result<Box<dyn ImageTransform>> {
    Ok(match config.backend {
        Backend::Local => Box::new(LocalTransform),
        Backend::Remote => Box::new(RemoteTransform::new(RemoteClient::new(config)?)),
    })
}

/// Initializes the library by loading environment variables.
///
/// Call this once at application startup before reading configuration.
pub fn init() {
    let _ = dotenvy::dotenv();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_selects_transform() {
        let mut config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(PhotoPass::with_config(config.clone()).unwrap().transform().name(), "local");

        config.backend = Backend::Remote;
        assert_eq!(PhotoPass::with_config(config).unwrap().transform().name(), "remote");
    }

    #[test]
    fn sessions_inherit_configured_mode() {
        let mut config = Config::from_lookup(|_| None).unwrap();
        config.edit_mode = EditMode::NonDestructive;
        let app = PhotoPass::with_config(config).unwrap();
        assert_eq!(app.new_session().mode(), EditMode::NonDestructive);
    }
}
