mod logger;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use photo_pass_core::{
    AppError, Backend, BackgroundColor, Config, Edit, EditMode, Filter, FormatKind, PhotoPass,
    PhotoSize, Preset, RemoteClient, Settings, Upload, init, upload::format_file_size,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Passport and visa photo editor", long_about = None)]
struct Args {
    /// Log progress (overridden by PHOTO_PASS_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the supported output sizes
    Sizes,
    /// List the background colors
    Backgrounds,
    /// List the presets (size + background)
    Presets,
    /// Fit, recolor and filter a photo, then save it
    Edit(EditArgs),
    /// List images stored on the processing service
    List,
    /// Delete an image stored on the processing service
    Delete {
        /// Server-side filename, as shown by `list`
        filename: String,
    },
}

#[derive(clap::Args, Debug)]
struct EditArgs {
    /// Photo to edit (JPEG, PNG or WebP)
    input: PathBuf,

    /// Preset pinning size and background, e.g. usPassport
    #[arg(short, long)]
    preset: Option<Preset>,

    /// Output size, e.g. ukVisa
    #[arg(short, long)]
    size: Option<PhotoSize>,

    /// Background color, e.g. lightBlue
    #[arg(short, long)]
    background: Option<BackgroundColor>,

    /// Clear light, low-saturation background pixels
    #[arg(long)]
    remove_background: bool,

    /// Filter to apply after sizing, e.g. brightness=1.2, blur=3,
    /// crop=0,0,400,400, flip=horizontal (repeatable, applied in order)
    #[arg(short = 'f', long = "filter")]
    filters: Vec<Filter>,

    /// Output format: jpeg or png
    #[arg(long)]
    format: Option<FormatKind>,

    /// JPEG quality between 0 and 1
    #[arg(short, long)]
    quality: Option<f32>,

    /// Where edits run: local or remote
    #[arg(long)]
    backend: Option<Backend>,

    /// compounding or non-destructive
    #[arg(long)]
    mode: Option<EditMode>,

    /// Output file or directory (defaults to a generated name here)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init();
    let args = Args::parse();
    logger::init(args.verbose);

    let config = Config::load().context("Failed to load configuration")?;

    match args.command {
        Command::Sizes => print_sizes(),
        Command::Backgrounds => print_backgrounds(),
        Command::Presets => print_presets(&Settings::load()),
        Command::Edit(edit) => run_edit(config, edit).await?,
        Command::List => run_list(&config).await?,
        Command::Delete { filename } => run_delete(&config, &filename).await?,
    }

    Ok(())
}

async fn run_edit(mut config: Config, args: EditArgs) -> Result<()> {
    let mut settings = Settings::load();
    if let Some(backend) = args.backend.or(settings.backend) {
        config.backend = backend;
    }
    if let Some(mode) = args.mode {
        config.edit_mode = mode;
    }
    if let Some(quality) = args.quality {
        config.jpeg_quality = quality;
    }
    let remote = config.backend == Backend::Remote;

    let app = PhotoPass::with_config(config).context("Failed to set up image transform")?;
    let mut session = app.new_session();
    session.set_format(args.format.unwrap_or(settings.format));

    let upload = match Upload::from_path(&args.input, app.config().max_upload_bytes) {
        Ok(upload) => upload,
        Err(AppError::Io(e)) => {
            return Err(e).with_context(|| format!("Failed to read {}", args.input.display()));
        }
        Err(e) => return Err(notify(e)),
    };

    let spinner = start_spinner(remote, format!("Uploading {}...", upload.name))?;
    let loaded = session.load(upload, app.transform()).await;
    finish(spinner);
    loaded.map_err(notify)?;

    for edit in planned_edits(&args) {
        let spinner = start_spinner(remote, format!("Applying {edit}..."))?;
        let applied = session.apply(app.transform(), edit).await;
        finish(spinner);
        applied.map_err(notify)?;
    }

    let bytes = session.export().map_err(notify)?;
    let path = output_path(args.output.as_deref(), &session.download_filename_today());
    fs::write(&path, &bytes).with_context(|| format!("Failed to write {}", path.display()))?;

    if let Some((width, height)) = session.current().map(|r| r.dimensions()) {
        println!(
            "Saved {} ({width}x{height}, {})",
            path.display(),
            format_file_size(bytes.len() as u64)
        );
    }

    if args.preset.is_some() {
        settings.last_preset = args.preset;
    }
    settings.format = session.format();
    if let Err(e) = settings.save() {
        log::warn!("Failed to save settings: {e}");
    }

    Ok(())
}

/// Edits in the order a user would make them: size first, then the
/// background, then filters.
fn planned_edits(args: &EditArgs) -> Vec<Edit> {
    let mut edits = Vec::new();
    if let Some(preset) = args.preset {
        edits.push(Edit::Preset(preset));
    }
    if let Some(size) = args.size {
        edits.push(Edit::Size(size));
    }
    if args.remove_background {
        edits.push(Edit::RemoveBackground);
    }
    if let Some(background) = args.background {
        edits.push(Edit::Background(background));
    }
    edits.extend(args.filters.iter().copied().map(Edit::Filter));
    edits
}

fn output_path(output: Option<&Path>, suggested: &str) -> PathBuf {
    match output {
        Some(path) if path.is_dir() => path.join(suggested),
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(suggested),
    }
}

async fn run_list(config: &Config) -> Result<()> {
    let client = RemoteClient::new(config)?;
    let spinner = start_spinner(true, format!("Listing images on {}...", client.base_url()))?;
    let listed = client.list_images().await;
    finish(spinner);
    let images = listed.map_err(notify)?;

    if images.is_empty() {
        println!("No images stored");
        return Ok(());
    }
    for image in images {
        println!("{:<44} {:>10}", image.filename, format_file_size(image.size));
    }
    Ok(())
}

async fn run_delete(config: &Config, filename: &str) -> Result<()> {
    let client = RemoteClient::new(config)?;
    let spinner = start_spinner(true, format!("Deleting {filename}..."))?;
    let deleted = client.delete_image(filename).await;
    finish(spinner);
    println!("{}", deleted.map_err(notify)?);
    Ok(())
}

fn print_sizes() {
    for size in PhotoSize::ALL {
        let (width, height) = size.dimensions();
        println!(
            "{:<14} {:<15} {:>9}  {}",
            size.key(),
            size.name(),
            format!("{width}x{height}"),
            size.display_size()
        );
    }
}

fn print_backgrounds() {
    for background in BackgroundColor::ALL {
        println!(
            "{:<10} {:<11} {}",
            background.key(),
            background.name(),
            background.rgb()
        );
    }
}

fn print_presets(settings: &Settings) {
    for preset in Preset::ALL {
        let marker = if settings.last_preset == Some(preset) { "*" } else { " " };
        println!(
            "{marker} {} {:<16} {:<17} {}",
            preset.icon(),
            preset.key(),
            preset.name(),
            preset.description()
        );
    }
}

/// Spinner shown while waiting on the processing service.
fn start_spinner(enabled: bool, message: String) -> Result<Option<ProgressBar>> {
    if !enabled {
        return Ok(None);
    }
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
            .template("{spinner:.green} {msg}")?,
    );
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    Ok(Some(spinner))
}

fn finish(spinner: Option<ProgressBar>) {
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
}

/// Leads with the user-facing message and keeps the full error as cause.
fn notify(err: AppError) -> anyhow::Error {
    let message = err.user_message();
    anyhow::Error::new(err).context(message)
}
