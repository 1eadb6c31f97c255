//! The edit session: one photo, its processed output and the selections
//! that produced it.
//!
//! The session is a plain owned struct. Edits run in two halves so the
//! caller decides how to await the transform:
//!
//! ```text
//! begin(edit) -> PendingEdit -> transform.apply(..) -> commit(pending, result)
//! ```
//!
//! `begin` raises the processing flag, so a second edit fails with
//! [`AppError::Busy`] until the first is committed. `commit` applies the
//! result together with every selection change, or nothing at all.
//!
//! State machine:
//! `Empty -> Uploaded -> {Sized, BackgroundSet} -> Styled`, where `Styled`
//! means both a size and a background are selected. A preset moves straight
//! to `Styled`. Loading another photo returns to `Uploaded`; removing the
//! photo returns to `Empty`.

use crate::config::Config;
use crate::encoder::{self, DEFAULT_JPEG_QUALITY, FormatKind, OutputFormat};
use crate::error::{AppError, Result};
use crate::filters::Filter;
use crate::presets::{BackgroundColor, PhotoSize, Preset};
use crate::raster::RasterImage;
use crate::transform::{ImageTransform, Operation, TransformInput};
use crate::upload::{DEFAULT_MAX_UPLOAD_BYTES, Upload};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which raster an edit builds on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EditMode {
    /// Each edit applies on top of the last processed output.
    #[default]
    Compounding,
    /// Each edit re-derives from the original upload.
    NonDestructive,
}

impl fmt::Display for EditMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EditMode::Compounding => "compounding",
            EditMode::NonDestructive => "non-destructive",
        })
    }
}

impl FromStr for EditMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "compounding" => Ok(EditMode::Compounding),
            "non-destructive" | "nondestructive" => Ok(EditMode::NonDestructive),
            other => Err(AppError::config(format!("unknown edit mode '{other}'"))),
        }
    }
}

/// A user action on a loaded photo.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Edit {
    Preset(Preset),
    Size(PhotoSize),
    Background(BackgroundColor),
    RemoveBackground,
    Filter(Filter),
}

impl fmt::Display for Edit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edit::Preset(preset) => write!(f, "preset {preset}"),
            Edit::Size(size) => write!(f, "size {size}"),
            Edit::Background(background) => write!(f, "background {background}"),
            Edit::RemoveBackground => f.write_str("background removal"),
            Edit::Filter(filter) => write!(f, "{filter}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Empty,
    Uploaded,
    Sized,
    BackgroundSet,
    /// Both a size and a background are selected.
    Styled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BaseRaster {
    Source,
    Processed,
    Cutout,
}

/// An edit that has passed `begin` and holds the processing flag.
///
/// Hand it back to [`EditSession::commit`] with the transform result, even
/// when the transform failed.
#[derive(Debug)]
#[must_use = "a pending edit keeps the session busy until committed"]
pub struct PendingEdit {
    edit: Edit,
    operation: Operation,
    base: BaseRaster,
}

impl PendingEdit {
    pub fn edit(&self) -> Edit {
        self.edit
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }
}

#[derive(Debug)]
struct Source {
    upload: Upload,
    raster: RasterImage,
    remote_name: Option<String>,
}

#[derive(Debug)]
pub struct EditSession {
    source: Option<Source>,
    processed: Option<RasterImage>,
    /// Output of the last background removal, kept so later background
    /// colors composite onto it instead of the original.
    cutout: Option<RasterImage>,
    size: Option<PhotoSize>,
    background: Option<BackgroundColor>,
    preset: Option<Preset>,
    format: FormatKind,
    jpeg_quality: f32,
    mode: EditMode,
    max_upload_bytes: u64,
    processing: bool,
}

impl Default for EditSession {
    fn default() -> Self {
        Self {
            source: None,
            processed: None,
            cutout: None,
            size: None,
            background: None,
            preset: None,
            format: FormatKind::default(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            mode: EditMode::default(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            processing: false,
        }
    }
}

impl EditSession {
    pub fn new(config: &Config) -> Self {
        Self {
            jpeg_quality: config.jpeg_quality,
            mode: config.edit_mode,
            max_upload_bytes: config.max_upload_bytes,
            ..Self::default()
        }
    }

    pub fn state(&self) -> SessionState {
        if self.source.is_none() {
            return SessionState::Empty;
        }
        match (self.size, self.background) {
            (Some(_), Some(_)) => SessionState::Styled,
            (Some(_), None) => SessionState::Sized,
            (None, Some(_)) => SessionState::BackgroundSet,
            (None, None) => SessionState::Uploaded,
        }
    }

    pub fn is_processing(&self) -> bool {
        self.processing
    }

    pub fn mode(&self) -> EditMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: EditMode) {
        self.mode = mode;
    }

    pub fn format(&self) -> FormatKind {
        self.format
    }

    pub fn set_format(&mut self, format: FormatKind) {
        self.format = format;
    }

    pub fn set_jpeg_quality(&mut self, quality: f32) {
        self.jpeg_quality = quality;
    }

    pub fn output_format(&self) -> OutputFormat {
        self.format.with_quality(self.jpeg_quality)
    }

    pub fn selected_size(&self) -> Option<PhotoSize> {
        self.size
    }

    pub fn selected_background(&self) -> Option<BackgroundColor> {
        self.background
    }

    pub fn selected_preset(&self) -> Option<Preset> {
        self.preset
    }

    pub fn background_removed(&self) -> bool {
        self.cutout.is_some()
    }

    pub fn upload(&self) -> Option<&Upload> {
        self.source.as_ref().map(|s| &s.upload)
    }

    pub fn source(&self) -> Option<&RasterImage> {
        self.source.as_ref().map(|s| &s.raster)
    }

    pub fn processed(&self) -> Option<&RasterImage> {
        self.processed.as_ref()
    }

    pub fn remote_name(&self) -> Option<&str> {
        self.source.as_ref().and_then(|s| s.remote_name.as_deref())
    }

    /// The raster shown to the user: processed output if any, else the
    /// original.
    pub fn current(&self) -> Option<&RasterImage> {
        self.processed.as_ref().or_else(|| self.source())
    }

    /// Validates, decodes and registers `upload`, then resets every
    /// selection.
    ///
    /// Validation and decoding run before `transform.prepare`, so a rejected
    /// file never reaches the network. On failure the previous photo stays
    /// loaded.
    pub async fn load(&mut self, upload: Upload, transform: &dyn ImageTransform) -> Result<()> {
        if self.processing {
            return Err(AppError::Busy);
        }
        upload.validate(self.max_upload_bytes)?;
        let raster = encoder::decode(&upload.bytes)?;

        self.processing = true;
        let prepared = transform.prepare(&upload).await;
        self.processing = false;
        let remote_name = prepared?;

        log::info!(
            "Loaded {} ({}x{}, {})",
            upload.name,
            raster.width(),
            raster.height(),
            transform.name()
        );
        self.source = Some(Source {
            upload,
            raster,
            remote_name,
        });
        self.reset_edits();
        Ok(())
    }

    /// Replaces the current photo, discarding all processed state.
    pub async fn change_photo(
        &mut self,
        upload: Upload,
        transform: &dyn ImageTransform,
    ) -> Result<()> {
        self.load(upload, transform).await
    }

    /// Drops the photo and everything derived from it.
    pub fn remove(&mut self) -> Result<()> {
        if self.processing {
            return Err(AppError::Busy);
        }
        self.source = None;
        self.reset_edits();
        Ok(())
    }

    fn reset_edits(&mut self) {
        self.processed = None;
        self.cutout = None;
        self.size = None;
        self.background = None;
        self.preset = None;
    }

    /// Starts `edit`, choosing the operation and the raster it builds on.
    ///
    /// # Errors
    ///
    /// [`AppError::Busy`] while another edit is pending,
    /// [`AppError::NoImage`] with nothing loaded, and
    /// [`AppError::InvalidParameter`] for out-of-range filter values.
    pub fn begin(&mut self, edit: Edit) -> Result<PendingEdit> {
        if self.processing {
            return Err(AppError::Busy);
        }
        if self.source.is_none() {
            return Err(AppError::NoImage);
        }
        if let Edit::Filter(filter) = edit {
            filter.validate()?;
        }

        let size = self.size.unwrap_or(PhotoSize::DEFAULT_CANVAS);
        let background = self.background.unwrap_or(BackgroundColor::DEFAULT);
        let operation = match edit {
            Edit::Preset(preset) => Operation::Fit {
                size: preset.size(),
                background: preset.background(),
            },
            Edit::Size(size) => Operation::Fit { size, background },
            Edit::Background(background) => Operation::Fit { size, background },
            Edit::RemoveBackground => Operation::RemoveBackground { size, background },
            Edit::Filter(filter) => Operation::Filter(filter),
        };

        let base = match (edit, self.mode) {
            (Edit::Background(_), _) if self.cutout.is_some() => BaseRaster::Cutout,
            (Edit::Background(_), _) | (_, EditMode::NonDestructive) => BaseRaster::Source,
            (_, EditMode::Compounding) if self.processed.is_some() => BaseRaster::Processed,
            _ => BaseRaster::Source,
        };

        self.processing = true;
        log::debug!("begin {operation} on {base:?}");
        Ok(PendingEdit {
            edit,
            operation,
            base,
        })
    }

    /// What `pending` runs against.
    pub fn input(&self, pending: &PendingEdit) -> Result<TransformInput<'_>> {
        let source = self.source.as_ref().ok_or(AppError::NoImage)?;
        let base = match pending.base {
            BaseRaster::Source => &source.raster,
            BaseRaster::Processed => self.processed.as_ref().unwrap_or(&source.raster),
            BaseRaster::Cutout => self.cutout.as_ref().unwrap_or(&source.raster),
        };
        Ok(TransformInput {
            base,
            remote_name: source.remote_name.as_deref(),
        })
    }

    /// Finishes `pending`. On success the new raster and all selection
    /// changes land together; on failure nothing changes.
    pub fn commit(&mut self, pending: PendingEdit, result: Result<RasterImage>) -> Result<()> {
        self.processing = false;
        let raster = match result {
            Ok(raster) => raster,
            Err(err) => {
                log::warn!("{} failed, keeping previous image: {err}", pending.operation);
                return Err(err);
            }
        };
        if self.source.is_none() {
            return Err(AppError::NoImage);
        }

        match pending.edit {
            Edit::Preset(preset) => {
                self.preset = Some(preset);
                self.size = Some(preset.size());
                self.background = Some(preset.background());
                self.cutout = None;
            }
            Edit::Size(size) => {
                self.preset = None;
                self.size = Some(size);
                self.cutout = None;
            }
            Edit::Background(background) => {
                self.preset = None;
                self.background = Some(background);
            }
            Edit::RemoveBackground => {
                if self.size.is_none() {
                    self.size = Some(PhotoSize::DEFAULT_CANVAS);
                }
                self.cutout = Some(raster.clone());
            }
            Edit::Filter(_) => {
                self.cutout = None;
                if let Some(size) = self.size
                    && raster.dimensions() != size.dimensions()
                {
                    log::warn!(
                        "{} changed the image to {}x{}; clearing size {size}",
                        pending.operation,
                        raster.width(),
                        raster.height()
                    );
                    self.size = None;
                    self.preset = None;
                }
            }
        }

        self.processed = Some(raster);
        Ok(())
    }

    /// Runs `edit` through `transform` from start to finish.
    pub async fn apply(&mut self, transform: &dyn ImageTransform, edit: Edit) -> Result<()> {
        let pending = self.begin(edit)?;
        let result = match self.input(&pending) {
            Ok(input) => transform.apply(input, pending.operation()).await,
            Err(err) => Err(err),
        };
        self.commit(pending, result)
    }

    /// Suggested download name, e.g. `uk-visa-light-blue-bg-2025-01-31.jpeg`.
    pub fn download_filename(&self, date: NaiveDate) -> String {
        let stem = self
            .preset
            .map(Preset::name)
            .or_else(|| self.size.map(PhotoSize::name))
            .unwrap_or("passport-photo");
        let mut name = slug(stem);
        if let Some(background) = self.background {
            name.push('-');
            name.push_str(&slug(background.name()));
            name.push_str("-bg");
        }
        format!(
            "{name}-{}.{}",
            date.format("%Y-%m-%d"),
            self.format.extension()
        )
    }

    /// [`Self::download_filename`] for the current UTC date.
    pub fn download_filename_today(&self) -> String {
        self.download_filename(Utc::now().date_naive())
    }

    /// Encodes the current raster in the selected format.
    pub fn export(&self) -> Result<Vec<u8>> {
        let raster = self.current().ok_or(AppError::NoImage)?;
        encoder::encode(raster, self.output_format())
    }
}

fn slug(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::LocalTransform;
    use futures::future::{self, BoxFuture};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn png_upload(width: u32, height: u32, rgba: [u8; 4]) -> Upload {
        let raster = RasterImage::filled(width, height, rgba);
        let bytes = encoder::encode(&raster, OutputFormat::Png).unwrap();
        Upload::new("me.png", "image/png", bytes)
    }

    async fn loaded(width: u32, height: u32) -> EditSession {
        let mut session = EditSession::default();
        session
            .load(png_upload(width, height, [40, 60, 80, 255]), &LocalTransform)
            .await
            .unwrap();
        session
    }

    /// Counts calls and fails every edit.
    #[derive(Default)]
    struct FailingTransform {
        prepared: AtomicUsize,
    }

    impl ImageTransform for FailingTransform {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn prepare<'a>(&'a self, _upload: &'a Upload) -> BoxFuture<'a, Result<Option<String>>> {
            self.prepared.fetch_add(1, Ordering::SeqCst);
            Box::pin(future::ready(Ok(Some("stored.png".to_string()))))
        }

        fn apply<'a>(
            &'a self,
            _input: TransformInput<'a>,
            _op: &'a Operation,
        ) -> BoxFuture<'a, Result<RasterImage>> {
            Box::pin(future::ready(Err(AppError::Remote {
                status: 400,
                detail: "Unsupported file format".to_string(),
            })))
        }
    }

    #[tokio::test]
    async fn preset_pins_size_and_background_together() {
        let mut session = loaded(800, 600).await;
        session
            .apply(&LocalTransform, Edit::Preset(Preset::UsPassport))
            .await
            .unwrap();

        assert_eq!(session.selected_size(), Some(PhotoSize::UsVisa));
        assert_eq!(session.selected_background(), Some(BackgroundColor::White));
        assert_eq!(session.selected_preset(), Some(Preset::UsPassport));
        assert_eq!(session.state(), SessionState::Styled);
        assert_eq!(session.processed().unwrap().dimensions(), (600, 600));
    }

    #[tokio::test]
    async fn size_selection_produces_exact_dimensions() {
        let mut session = loaded(800, 600).await;
        session
            .apply(&LocalTransform, Edit::Size(PhotoSize::SchengenVisa))
            .await
            .unwrap();
        assert_eq!(session.state(), SessionState::Sized);
        assert_eq!(session.processed().unwrap().dimensions(), (531, 413));

        session
            .apply(&LocalTransform, Edit::Size(PhotoSize::UkVisa))
            .await
            .unwrap();
        assert_eq!(session.processed().unwrap().dimensions(), (413, 531));
    }

    #[tokio::test]
    async fn failed_edit_keeps_prior_state() {
        let mut session = loaded(800, 600).await;
        session
            .apply(&LocalTransform, Edit::Preset(Preset::UkVisa))
            .await
            .unwrap();
        let before = session.processed().cloned();

        let err = session
            .apply(&FailingTransform::default(), Edit::Background(BackgroundColor::LightRed))
            .await
            .unwrap_err();

        assert_eq!(err.user_message(), "Unsupported file format");
        assert_eq!(session.selected_background(), Some(BackgroundColor::LightBlue));
        assert_eq!(session.selected_preset(), Some(Preset::UkVisa));
        assert_eq!(session.processed().cloned(), before);
        assert!(!session.is_processing());
    }

    #[tokio::test]
    async fn second_edit_is_rejected_while_one_is_pending() {
        let mut session = loaded(10, 10).await;
        let pending = session.begin(Edit::Filter(Filter::Grayscale)).unwrap();

        assert!(matches!(
            session.begin(Edit::Size(PhotoSize::Passport)),
            Err(AppError::Busy)
        ));
        assert!(matches!(session.remove(), Err(AppError::Busy)));

        let result = LocalTransform
            .apply(session.input(&pending).unwrap(), pending.operation())
            .await;
        session.commit(pending, result).unwrap();
        assert!(session.begin(Edit::Size(PhotoSize::Passport)).is_ok());
    }

    #[test]
    fn edits_need_an_image() {
        let mut session = EditSession::default();
        assert!(matches!(
            session.begin(Edit::RemoveBackground),
            Err(AppError::NoImage)
        ));
        assert!(matches!(session.export(), Err(AppError::NoImage)));
        assert_eq!(session.state(), SessionState::Empty);
    }

    #[tokio::test]
    async fn invalid_file_type_never_reaches_prepare() {
        let transform = FailingTransform::default();
        let mut session = EditSession::default();
        let pdf = Upload::new("scan.pdf", "application/pdf", b"%PDF-1.7".to_vec());

        let err = session.load(pdf, &transform).await.unwrap_err();
        assert!(matches!(err, AppError::UnsupportedType(_)));
        assert_eq!(transform.prepared.load(Ordering::SeqCst), 0);
        assert_eq!(session.state(), SessionState::Empty);
    }

    #[tokio::test]
    async fn corrupt_image_never_reaches_prepare() {
        let transform = FailingTransform::default();
        let mut session = EditSession::default();
        let junk = Upload::new("me.png", "image/png", b"not a png".to_vec());

        assert!(matches!(
            session.load(junk, &transform).await,
            Err(AppError::Decode(_))
        ));
        assert_eq!(transform.prepared.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn load_keeps_server_name_and_resets_selections() {
        let transform = FailingTransform::default();
        let mut session = loaded(20, 20).await;
        session
            .apply(&LocalTransform, Edit::Preset(Preset::CanadaVisa))
            .await
            .unwrap();

        session
            .change_photo(png_upload(30, 40, [1, 2, 3, 255]), &transform)
            .await
            .unwrap();

        assert_eq!(session.state(), SessionState::Uploaded);
        assert_eq!(session.remote_name(), Some("stored.png"));
        assert!(session.processed().is_none());
        assert_eq!(session.current().unwrap().dimensions(), (30, 40));
    }

    #[tokio::test]
    async fn remove_returns_to_empty() {
        let mut session = loaded(20, 20).await;
        session.remove().unwrap();
        assert_eq!(session.state(), SessionState::Empty);
        assert!(session.current().is_none());
    }

    #[tokio::test]
    async fn compounding_builds_on_processed_output() {
        let mut session = loaded(8, 8).await;
        session
            .apply(&LocalTransform, Edit::Filter(Filter::Brightness(0.5)))
            .await
            .unwrap();
        session
            .apply(&LocalTransform, Edit::Filter(Filter::Brightness(0.5)))
            .await
            .unwrap();
        assert_eq!(session.processed().unwrap().pixel(0, 0), Some([10, 15, 20, 255]));
    }

    #[tokio::test]
    async fn non_destructive_rederives_from_source() {
        let mut session = loaded(8, 8).await;
        session.set_mode(EditMode::NonDestructive);
        session
            .apply(&LocalTransform, Edit::Filter(Filter::Brightness(0.5)))
            .await
            .unwrap();
        session
            .apply(&LocalTransform, Edit::Filter(Filter::Brightness(0.5)))
            .await
            .unwrap();
        assert_eq!(session.processed().unwrap().pixel(0, 0), Some([20, 30, 40, 255]));
    }

    #[tokio::test]
    async fn resize_away_from_selected_size_clears_it() {
        let mut session = loaded(800, 600).await;
        session
            .apply(&LocalTransform, Edit::Preset(Preset::GeneralPassport))
            .await
            .unwrap();
        session
            .apply(
                &LocalTransform,
                Edit::Filter(Filter::Resize {
                    width: 300,
                    height: 200,
                }),
            )
            .await
            .unwrap();

        assert_eq!(session.selected_size(), None);
        assert_eq!(session.selected_preset(), None);
        assert_eq!(session.selected_background(), Some(BackgroundColor::LightGray));
        assert_eq!(session.state(), SessionState::BackgroundSet);
    }

    #[tokio::test]
    async fn background_color_composites_onto_cutout() {
        let mut session = EditSession::default();
        session
            .load(png_upload(10, 10, [250, 248, 245, 255]), &LocalTransform)
            .await
            .unwrap();
        session
            .apply(&LocalTransform, Edit::RemoveBackground)
            .await
            .unwrap();
        assert!(session.background_removed());
        assert_eq!(session.processed().unwrap().pixel(0, 0), Some([250, 248, 245, 0]));

        session
            .apply(&LocalTransform, Edit::Background(BackgroundColor::LightBlue))
            .await
            .unwrap();
        assert!(session.background_removed());
        assert_eq!(session.processed().unwrap().pixel(5, 5), Some([0xdb, 0xea, 0xfe, 255]));

        session
            .apply(&LocalTransform, Edit::Background(BackgroundColor::LightRed))
            .await
            .unwrap();
        assert_eq!(session.processed().unwrap().pixel(5, 5), Some([0xfe, 0xe2, 0xe2, 255]));
    }

    #[tokio::test]
    async fn out_of_range_filter_fails_before_processing() {
        let mut session = loaded(4, 4).await;
        assert!(matches!(
            session.begin(Edit::Filter(Filter::Blur(0))),
            Err(AppError::InvalidParameter(_))
        ));
        assert!(!session.is_processing());
    }

    #[tokio::test]
    async fn download_names() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        let mut session = loaded(800, 600).await;
        assert_eq!(session.download_filename(date), "passport-photo-2025-03-09.jpeg");

        session
            .apply(&LocalTransform, Edit::Preset(Preset::UkVisa))
            .await
            .unwrap();
        assert_eq!(
            session.download_filename(date),
            "uk-visa-light-blue-bg-2025-03-09.jpeg"
        );

        session
            .apply(&LocalTransform, Edit::Size(PhotoSize::Passport))
            .await
            .unwrap();
        session.set_format(FormatKind::Png);
        assert_eq!(
            session.download_filename(date),
            "passport-size-light-blue-bg-2025-03-09.png"
        );
    }

    #[tokio::test]
    async fn export_uses_selected_format() {
        let mut session = loaded(800, 600).await;
        session
            .apply(&LocalTransform, Edit::RemoveBackground)
            .await
            .unwrap();
        session.set_format(FormatKind::Png);

        let bytes = session.export().unwrap();
        let decoded = encoder::decode(&bytes).unwrap();
        assert_eq!(&decoded, session.processed().unwrap());
    }

    #[test]
    fn edit_mode_parsing() {
        assert_eq!("Non-Destructive".parse::<EditMode>().unwrap(), EditMode::NonDestructive);
        assert_eq!(EditMode::default().to_string(), "compounding");
        assert!("undo".parse::<EditMode>().is_err());
    }
}
