use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;

use psd_export::io::{load_image_source, read_exr_sources};
use psd_export::progress::ConsoleProgress;
use psd_export::utils::{human_size, layer_name_from_path, load_export_config, ConsoleLogger, ExportConfig, LoggingExt, StderrConsole};
use psd_export::{encode_document, Document, PixelSource, RasterSource};

const EXIT_USAGE: i32 = 2;
const EXIT_READ: i32 = 3;
const EXIT_ENCODE: i32 = 4;

/// Stack EXR layers and raster images into a layered PSD
#[derive(Parser, Debug)]
#[command(name = "exr2psd", version, about)]
struct Args {
    /// Input files, bottom layer first; .exr files contribute all their layers
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output path (default: first input with a .psd extension)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON export config (default: psd_export.json next to the executable)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bits per sample: 1, 8 or 16
    #[arg(long)]
    depth: Option<u16>,

    /// Keep out-of-range source values instead of clamping to [0, 1]
    #[arg(long)]
    no_clamp: bool,

    /// Sources store the bottom row first
    #[arg(long)]
    flip_vertical: bool,

    /// Print debug messages
    #[arg(short, long)]
    verbose: bool,
}

/// Error tagged with the process exit code and a log context
struct Failure {
    code: i32,
    context: &'static str,
    error: anyhow::Error,
}

trait OrExit<T> {
    fn or_exit(self, code: i32, context: &'static str) -> Result<T, Failure>;
}

impl<T, E: Into<anyhow::Error>> OrExit<T> for Result<T, E> {
    fn or_exit(self, code: i32, context: &'static str) -> Result<T, Failure> {
        self.map_err(|e| Failure { code, context, error: e.into() })
    }
}

fn default_out_path(input: &Path) -> PathBuf {
    let mut out = input.to_path_buf();
    out.set_extension("psd");
    out
}

fn is_exr(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("exr"))
}

/// Config file values with command line flags on top
fn resolve_config(args: &Args) -> anyhow::Result<ExportConfig> {
    let mut config = load_export_config(args.config.as_deref())?;
    if let Some(depth) = args.depth {
        config.depth = depth;
    }
    if args.no_clamp {
        config.clamp_input = false;
    }
    if args.flip_vertical {
        config.flip_vertical = true;
    }
    config.validate().context("Invalid export settings")?;
    Ok(config)
}

fn read_sources(path: &Path, console: &StderrConsole) -> anyhow::Result<Vec<(String, RasterSource)>> {
    if is_exr(path) {
        let progress = ConsoleProgress::new();
        let sources = read_exr_sources(path, Some(&progress))?;
        for (name, src) in &sources {
            console
                .log_debug(format!("layer '{}' {}x{} at ({}, {})", name, src.width, src.height, src.origin.0, src.origin.1))
                .with_context("exr")
                .send();
        }
        return Ok(sources);
    }
    console.log_debug(format!("reading {}", path.display())).with_context("image").send();
    let source = load_image_source(path)?;
    Ok(vec![(layer_name_from_path(path), source)])
}

fn run(args: &Args, console: &StderrConsole) -> Result<PathBuf, Failure> {
    let config = resolve_config(args).or_exit(EXIT_USAGE, "config")?;

    for input in &args.inputs {
        if !input.exists() {
            return Err(anyhow::anyhow!("input file not found: {}", input.display())).or_exit(EXIT_USAGE, "input");
        }
    }

    let mut sources: Vec<(String, RasterSource)> = Vec::new();
    for input in &args.inputs {
        let loaded = read_sources(input, console).or_exit(EXIT_READ, "read")?;
        console.log_info_ctx("read", format!("{}: {} layer(s)", input.display(), loaded.len()));
        sources.extend(loaded);
    }

    let sources: Vec<(String, RasterSource)> = sources
        .into_iter()
        .map(|(name, mut src)| {
            if config.flip_vertical {
                src = src.flip_vertical();
            }
            if config.clamp_input {
                src = src.clamp_unit();
            }
            (name, src)
        })
        .collect();

    let mut doc = Document::from_sources(sources.iter().map(|(name, src)| (name.as_str(), src as &dyn PixelSource)));
    config.apply(&mut doc).or_exit(EXIT_USAGE, "config")?;
    for name in config.unmatched_overrides(&doc) {
        console.log_warning(format!("override '{}' matches no layer", name)).with_context("config").send();
    }
    console.log_debug(format!("canvas {}x{}, {} layer(s), {}-bit", doc.width, doc.height, doc.layers.len(), doc.depth.bits()))
        .with_context("encode")
        .send();

    doc.build_colors().or_exit(EXIT_ENCODE, "composite")?;
    let bytes = encode_document(&doc).or_exit(EXIT_ENCODE, "encode")?;

    let output = args.output.clone().unwrap_or_else(|| default_out_path(&args.inputs[0]));
    fs::write(&output, &bytes)
        .with_context(|| format!("Failed to write PSD: {}", output.display()))
        .or_exit(EXIT_ENCODE, "write")?;

    console.log_debug(format!("{} written", human_size(bytes.len() as u64))).with_context("write").send();
    Ok(output)
}

fn main() {
    let args = Args::parse();
    let console = StderrConsole::new(args.verbose);

    if let Err(e) = rayon::ThreadPoolBuilder::new()
        .num_threads(num_cpus::get().saturating_sub(1).max(1))
        .build_global()
    {
        console.log_warning(format!("thread pool: {}", e)).with_context("init").send();
    }

    match run(&args, &console) {
        Ok(output) => {
            console.log_success_ctx("write", format!("OK: {}", output.display()));
        }
        Err(failure) => {
            console.log_error_ctx(failure.context, format!("{:#}", failure.error));
            std::process::exit(failure.code);
        }
    }
}
