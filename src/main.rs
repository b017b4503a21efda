use caption_band::compress::DownscaleCompressor;
use caption_band::export::DirectorySink;
use caption_band::imaging::{CropRect, FontRenderer, RustBackend, is_supported_image};
use caption_band::item::SourceFile;
use caption_band::registry::ItemId;
use caption_band::schedule::CaptionSide;
use caption_band::session::CaptionSession;
use caption_band::{config, output};
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "caption-band")]
#[command(about = "Add caption bands to a batch of photos")]
#[command(long_about = "\
Add caption bands to a batch of photos

Every image gets a black band underneath with up to two captions: a shared
caption on the left (--caption) and a per-image caption on the right
(--right). Output files are named after the right caption:

  --right IMG_0042.jpg=\"Hello, World!\"   →   Hello_World.jpg

Images without a right caption are written as captioned-<name>.jpg.
Crops are applied before rotations, in source pixel coordinates.

Run 'caption-band gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Config file (defaults are used when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log scheduling and encode decisions
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct RenderArgs {
    /// Image files or directories of images
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output directory
    #[arg(long, default_value = "captioned")]
    out: PathBuf,

    /// Caption on the left of every image
    #[arg(long, default_value = "")]
    caption: String,

    /// Right caption for one image
    #[arg(long = "right", value_name = "FILE=TEXT", value_parser = parse_assignment)]
    right: Vec<(String, String)>,

    /// Rotate one image clockwise by 90, 180 or 270 degrees
    #[arg(long = "rotate", value_name = "FILE=DEGREES", value_parser = parse_rotation)]
    rotate: Vec<(String, u32)>,

    /// Crop one image to a rectangle in source pixels
    #[arg(long = "crop", value_name = "FILE=X,Y,W,H", value_parser = parse_crop)]
    crop: Vec<(String, CropRect)>,

    /// Keep large sources at full size
    #[arg(long)]
    no_compress: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Caption images and write the results to a directory
    Render(RenderArgs),
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Render(args) => {
            let config = config::load_config(cli.config.as_deref())?;
            init_thread_pool(&config.processing);
            render(&config, args)?;
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

fn render(config: &config::CaptionConfig, args: RenderArgs) -> Result<(), Box<dyn std::error::Error>> {
    let sources = read_sources(&collect_inputs(&args.inputs))?;

    let backend = Arc::new(RustBackend::new());
    let renderer = Arc::new(FontRenderer::load(config.caption.font.as_deref())?);
    let mut session = CaptionSession::new(backend.clone(), renderer, config.session_settings());
    if !args.no_compress
        && let Some(settings) = config.compression_settings()
    {
        session = session.with_compressor(Arc::new(DownscaleCompressor::new(backend, settings)));
    }

    let ingest = session.add_images(sources);
    output::print_ingest_output(&ingest);
    println!();

    let mut by_name: HashMap<&str, ItemId> = HashMap::new();
    for added in &ingest.added {
        by_name.entry(added.filename.as_str()).or_insert(added.id);
    }
    let lookup = |name: &str| {
        let id = by_name.get(name).copied();
        if id.is_none() {
            tracing::warn!(file = name, "no loaded image with this name");
        }
        id
    };

    for (name, rect) in &args.crop {
        if let Some(id) = lookup(name)
            && !session.apply_crop_rect(id, *rect)?
        {
            tracing::warn!(file = %name, ?rect, "crop has no area, ignored");
        }
    }
    for (name, degrees) in &args.rotate {
        if let Some(id) = lookup(name) {
            for _ in 0..degrees / 90 {
                session.rotate(id)?;
            }
        }
    }
    for (name, text) in &args.right {
        if let Some(id) = lookup(name) {
            session.set_caption(id, CaptionSide::Right, text.as_str())?;
        }
    }
    if !args.caption.is_empty() {
        session.set_batch_caption(args.caption.as_str());
    }

    let ticks = session.run_until_idle();
    tracing::debug!(
        composited = ticks.composited.len(),
        discarded = ticks.discarded,
        failed = ticks.failed.len(),
        "rendering finished"
    );

    let report = session.export(DirectorySink::new(&args.out)?)?;
    output::print_export_output(&report);
    Ok(())
}

/// Install the stderr log subscriber.
fn init_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(false)
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores. Users can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

/// Expand directories into the supported images they contain, sorted by
/// path. Files named explicitly are kept as given.
fn collect_inputs(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(input)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file() && is_supported_image(e.path()))
                .map(|e| e.into_path())
                .collect();
            files.append(&mut found);
        } else {
            files.push(input.clone());
        }
    }
    files
}

fn read_sources(paths: &[PathBuf]) -> std::io::Result<Vec<SourceFile>> {
    paths
        .iter()
        .map(|path| Ok(SourceFile::new(display_name(path), std::fs::read(path)?)))
        .collect()
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn parse_assignment(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(file, value)| (file.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected FILE=VALUE, got {s:?}"))
}

fn parse_rotation(s: &str) -> Result<(String, u32), String> {
    let (file, degrees) = parse_assignment(s)?;
    match degrees.trim().parse::<u32>() {
        Ok(d @ (0 | 90 | 180 | 270)) => Ok((file, d)),
        _ => Err(format!("rotation must be 0, 90, 180 or 270, got {degrees:?}")),
    }
}

fn parse_crop(s: &str) -> Result<(String, CropRect), String> {
    let (file, rect) = parse_assignment(s)?;
    let parts: Vec<u32> = rect
        .split(',')
        .map(|p| p.trim().parse::<u32>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("bad crop {rect:?}: {e}"))?;
    match parts[..] {
        [x, y, w, h] => Ok((file, CropRect::new(x, y, w, h))),
        _ => Err(format!("crop needs X,Y,W,H, got {rect:?}")),
    }
}
