//! The image transform capability and its in-process implementation.
//!
//! An [`ImageTransform`] turns a base raster plus an [`Operation`] into a new
//! raster. The edit session only talks to this trait, so the local pipeline
//! and the remote service ([`crate::remote::RemoteTransform`]) are
//! interchangeable.

use crate::background;
use crate::compositor::{self, Fill};
use crate::error::Result;
use crate::filters::Filter;
use crate::geometry;
use crate::presets::{BackgroundColor, PhotoSize};
use crate::raster::RasterImage;
use crate::upload::Upload;
use futures::future::{self, BoxFuture};
use std::fmt;
use std::time::Instant;

/// A single edit request, independent of how it is carried out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operation {
    /// Aspect-fill onto a `size` canvas filled with `background`.
    Fit {
        size: PhotoSize,
        background: BackgroundColor,
    },
    /// Aspect-fill onto a `size` canvas and clear the background.
    ///
    /// The local pipeline leaves cleared pixels transparent. Strategies that
    /// cannot produce alpha fill them with `background` instead.
    RemoveBackground {
        size: PhotoSize,
        background: BackgroundColor,
    },
    /// One filter from [`Filter`].
    Filter(Filter),
}

impl Operation {
    /// The canvas size this operation produces, if it pins one.
    pub fn target_size(&self) -> Option<PhotoSize> {
        match self {
            Operation::Fit { size, .. } | Operation::RemoveBackground { size, .. } => Some(*size),
            Operation::Filter(_) => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Fit { size, background } => write!(f, "fit {size} on {background}"),
            Operation::RemoveBackground { size, .. } => write!(f, "remove background at {size}"),
            Operation::Filter(filter) => write!(f, "{filter}"),
        }
    }
}

/// What an operation runs against.
#[derive(Debug, Clone, Copy)]
pub struct TransformInput<'a> {
    /// The raster the edit builds on.
    pub base: &'a RasterImage,
    /// Server-side name of the original upload, when one exists.
    pub remote_name: Option<&'a str>,
}

/// Something that can carry out [`Operation`]s.
pub trait ImageTransform: Send + Sync {
    /// Short name for logs and the CLI.
    fn name(&self) -> &'static str;

    /// Registers a freshly loaded upload. Returns the server-side name for
    /// strategies that keep a copy of the original.
    fn prepare<'a>(&'a self, upload: &'a Upload) -> BoxFuture<'a, Result<Option<String>>>;

    /// Runs `op` and returns the new raster.
    fn apply<'a>(
        &'a self,
        input: TransformInput<'a>,
        op: &'a Operation,
    ) -> BoxFuture<'a, Result<RasterImage>>;
}

/// Aspect-fills `image` onto a `size` canvas.
pub fn fit(image: &RasterImage, size: PhotoSize, fill: Fill) -> Result<RasterImage> {
    let (width, height) = size.dimensions();
    let rect = geometry::cover_rect(image.width(), image.height(), width, height)?;
    compositor::composite(image, &rect, width, height, fill)
}

/// Runs `op` in-process.
pub fn run_local(base: &RasterImage, op: &Operation) -> Result<RasterImage> {
    match *op {
        Operation::Fit { size, background } => fit(base, size, Fill::Solid(background.rgb())),
        Operation::RemoveBackground { size, .. } => {
            let fitted = fit(base, size, Fill::Transparent)?;
            Ok(background::remove_background(fitted))
        }
        Operation::Filter(filter) => filter.apply(base),
    }
}

/// The in-process pipeline: geometry, compositor, heuristic and filters.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalTransform;

impl ImageTransform for LocalTransform {
    fn name(&self) -> &'static str {
        "local"
    }

    fn prepare<'a>(&'a self, _upload: &'a Upload) -> BoxFuture<'a, Result<Option<String>>> {
        Box::pin(future::ready(Ok(None)))
    }

    fn apply<'a>(
        &'a self,
        input: TransformInput<'a>,
        op: &'a Operation,
    ) -> BoxFuture<'a, Result<RasterImage>> {
        Box::pin(async move {
            let start = Instant::now();
            let result = run_local(input.base, op)?;
            log::info!("{op} completed in {:.2?}", start.elapsed());
            Ok(result)
        })
    }
}
