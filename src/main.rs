use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use dicom_stack_viewer::{
    DicomFrameDecoder, EnhancementFilters, FileResolver, QualityMode, RenderOutcome, SeriesLoader,
    StackViewer, Surface, Toolkit, ViewerConfig, ViewportPatch, WindowLevel,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dicom-stack-viewer", about = "Inspect and render stacks of DICOM images")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Viewer configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show series metadata and files that failed to parse
    Info(InfoArgs),
    /// Render one frame of a series to PNG
    Render(RenderArgs),
    /// Play a series and write every rendered frame
    Cine(CineArgs),
}

#[derive(Args)]
struct InfoArgs {
    /// Directory of .dcm files
    dir: PathBuf,
}

#[derive(Clone, Copy, ValueEnum)]
enum QualityArg {
    /// Nearest-neighbour, no enhancement filters
    Standard,
    /// Supersampled bilinear with enhancement filters
    High,
}

impl From<QualityArg> for QualityMode {
    fn from(arg: QualityArg) -> Self {
        match arg {
            QualityArg::Standard => QualityMode::Standard,
            QualityArg::High => QualityMode::High,
        }
    }
}

#[derive(Args)]
struct ViewArgs {
    /// Output width in pixels
    #[arg(long, default_value = "512")]
    width: u32,

    /// Output height in pixels
    #[arg(long, default_value = "512")]
    height: u32,

    /// Zoom factor on top of fit-to-surface
    #[arg(long, default_value = "1.0")]
    zoom: f32,

    /// Clockwise rotation in degrees
    #[arg(long, default_value = "0.0", allow_hyphen_values = true)]
    rotate: f32,

    #[arg(long)]
    flip_h: bool,

    #[arg(long)]
    flip_v: bool,

    #[arg(long)]
    invert: bool,

    /// Window width (requires --level)
    #[arg(long, requires = "level")]
    window: Option<f32>,

    /// Window center (requires --window)
    #[arg(long, requires = "window", allow_hyphen_values = true)]
    level: Option<f32>,

    /// Named window preset, e.g. "Lung" (conflicts with --window)
    #[arg(long, conflicts_with = "window")]
    preset: Option<String>,

    #[arg(long, value_enum)]
    quality: Option<QualityArg>,

    /// Contrast in percent (0-200)
    #[arg(long)]
    contrast: Option<f32>,

    /// Brightness in percent (0-200)
    #[arg(long)]
    brightness: Option<f32>,

    /// Saturation in percent (0-200)
    #[arg(long)]
    saturation: Option<f32>,

    /// Sharpness in percent (0-100)
    #[arg(long)]
    sharpness: Option<f32>,
}

#[derive(Args)]
struct RenderArgs {
    /// Directory of .dcm files
    dir: PathBuf,

    /// Zero-based frame index (clamped to the series)
    #[arg(short, long, default_value = "0")]
    index: usize,

    /// Output PNG file
    #[arg(short, long, default_value = "frame.png")]
    output: PathBuf,

    #[command(flatten)]
    view: ViewArgs,
}

#[derive(Args)]
struct CineArgs {
    /// Directory of .dcm files
    dir: PathBuf,

    /// Output directory for the rendered frames
    #[arg(short, long, default_value = "cine")]
    output: PathBuf,

    /// Frame interval in milliseconds (defaults to the configured interval)
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Number of frames to write, starting at the current frame; defaults to one full loop
    #[arg(long)]
    frames: Option<usize>,

    #[command(flatten)]
    view: ViewArgs,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match &cli.config {
        Some(path) => ViewerConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ViewerConfig::default(),
    };

    match &cli.command {
        Commands::Info(args) => info(args, config).await,
        Commands::Render(args) => render(args, config).await,
        Commands::Cine(args) => cine(args, config).await,
    }
}

async fn open(
    dir: &Path,
    config: ViewerConfig,
    surface: Surface,
) -> Result<(Toolkit, StackViewer)> {
    let mut toolkit = Toolkit::new(config.toolkit.threads);
    toolkit.init()?;
    let mut viewer = StackViewer::mount(&toolkit, surface, config)?;

    let sources = SeriesLoader::sources_from_directory(dir)
        .with_context(|| format!("No DICOM files in {}", dir.display()))?;
    viewer
        .load_series(&sources, &FileResolver, &DicomFrameDecoder)
        .await
        .with_context(|| format!("Failed to load series from {}", dir.display()))?;
    Ok((toolkit, viewer))
}

async fn info(args: &InfoArgs, config: ViewerConfig) -> Result<()> {
    let (mut toolkit, mut viewer) = open(&args.dir, config, Surface::new(1, 1)).await?;
    let Some(info) = viewer.series_info() else {
        bail!("No series loaded");
    };
    let unknown = || "-".to_string();

    println!("Patient:     {}", info.patient_name.clone().unwrap_or_else(unknown));
    println!("Patient ID:  {}", info.patient_id.clone().unwrap_or_else(unknown));
    println!("Study UID:   {}", info.study_instance_uid.clone().unwrap_or_else(unknown));
    println!("Series UID:  {}", info.series_instance_uid.clone().unwrap_or_else(unknown));
    println!("Modality:    {}", info.modality.clone().unwrap_or_else(unknown));
    println!("Description: {}", info.series_description.clone().unwrap_or_else(unknown));
    println!("Frames:      {}", info.frame_count);
    println!("Dimensions:  {}x{}", info.columns, info.rows);
    if let Some((row, column)) = info.pixel_spacing {
        println!("Spacing:     {row} x {column} mm");
    }
    println!("Sorted by:   {:?}", info.sort_by);
    if let Some(window) = viewer.window_level() {
        println!("Window:      W {} / L {}", window.width, window.center);
    }

    if let Some(report) = viewer.load_report() {
        if report.warning_count() > 0 {
            println!("Skipped:     {} file(s)", report.warning_count());
            for failure in &report.failures {
                println!("  {}: {}", failure.source, failure.error);
            }
        }
    }

    viewer.unmount()?;
    toolkit.teardown();
    Ok(())
}

fn apply_view(viewer: &mut StackViewer, view: &ViewArgs) -> Result<()> {
    viewer.mutate_viewport(
        ViewportPatch::default()
            .scale(view.zoom)
            .rotation(view.rotate)
            .flip_horizontal(view.flip_h)
            .flip_vertical(view.flip_v)
            .invert(view.invert),
    )?;

    if let (Some(width), Some(center)) = (view.window, view.level) {
        viewer.seed_window_level(WindowLevel::new(width, center))?;
    } else if let Some(preset) = &view.preset {
        viewer.apply_preset(preset)?;
    }

    if let Some(quality) = view.quality {
        viewer.set_quality(quality.into());
    }
    let current = *viewer.filters();
    viewer.set_filters(EnhancementFilters {
        contrast: view.contrast.unwrap_or(current.contrast),
        brightness: view.brightness.unwrap_or(current.brightness),
        saturation: view.saturation.unwrap_or(current.saturation),
        sharpness: view.sharpness.unwrap_or(current.sharpness),
    });
    Ok(())
}

/// Decode whatever the current frame needs and draw it.
async fn draw(viewer: &mut StackViewer) -> Result<RenderOutcome> {
    for job in viewer.pending_decodes() {
        let outcome = job.run_blocking().await;
        viewer.complete_decode(outcome);
    }
    Ok(viewer.render()?)
}

fn save(viewer: &StackViewer, outcome: &RenderOutcome, path: &Path) -> Result<()> {
    match outcome {
        RenderOutcome::Rendered(_) => {
            let Some(image) = viewer.frame_buffer() else {
                bail!("Viewer has no rendering context");
            };
            image
                .save(path)
                .with_context(|| format!("Failed to write {}", path.display()))
        }
        RenderOutcome::Failed { index, message, .. } => {
            bail!("Frame {} could not be decoded: {message}", index + 1)
        }
        RenderOutcome::Loading { index, .. } => bail!("Frame {} is still loading", index + 1),
    }
}

async fn render(args: &RenderArgs, config: ViewerConfig) -> Result<()> {
    let surface = Surface::new(args.view.width, args.view.height);
    let (mut toolkit, mut viewer) = open(&args.dir, config, surface).await?;
    apply_view(&mut viewer, &args.view)?;
    viewer.goto(args.index)?;

    let outcome = draw(&mut viewer).await?;
    save(&viewer, &outcome, &args.output)?;
    println!("{}", viewer.snapshot().overlay_text());
    println!("Saved to {}", args.output.display());

    viewer.unmount()?;
    toolkit.teardown();
    Ok(())
}

/// The first frame is always written, so at least one file comes out.
fn frames_to_write(total: usize, requested: Option<usize>) -> usize {
    requested.unwrap_or(total).max(1)
}

async fn cine(args: &CineArgs, config: ViewerConfig) -> Result<()> {
    let surface = Surface::new(args.view.width, args.view.height);
    let (mut toolkit, mut viewer) = open(&args.dir, config, surface).await?;
    apply_view(&mut viewer, &args.view)?;
    if let Some(interval_ms) = args.interval_ms {
        viewer.set_playback_interval(interval_ms)?;
    }
    fs::create_dir_all(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;

    let total = viewer.catalog().map_or(0, |catalog| catalog.len());
    let count = frames_to_write(total, args.frames);

    let outcome = draw(&mut viewer).await?;
    save(&viewer, &outcome, &args.output.join("frame_0000.png"))?;

    let mut written = 1;
    viewer.play()?;
    while written < count {
        if viewer.next_playback_frame().await.is_none() {
            break;
        }
        let outcome = draw(&mut viewer).await?;
        save(&viewer, &outcome, &args.output.join(format!("frame_{written:04}.png")))?;
        println!("{}", viewer.snapshot().overlay_text());
        written += 1;
    }
    viewer.stop_playback();

    println!("Wrote {written} frame(s) to {}", args.output.display());
    viewer.unmount()?;
    toolkit.teardown();
    Ok(())
}
