//! sepiatone: tone one image through the pipeline and write the result.
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin sepiatone -- [OPTIONS] <LOCATION>
//! ```
//!
//! `LOCATION` is a URL (`file:///photos/landscape.png`) or a path to an
//! existing file. Set `RUST_LOG=debug` to see per-stage timings.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use sepiatone_io::{Dimensions, FilterSpec, Pipeline, RuntimeConfig, Url};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

/// Apply a sepia tone to an image.
///
/// Retrieval and decoding run on background workers; filtering and
/// delivery run on a dedicated delivery thread.
#[derive(Parser)]
#[command(name = "sepiatone", version)]
struct Cli {
    /// Image location: a URL or a path to an existing file.
    location: String,

    /// Where to write the filtered PNG. Defaults to `<stem>-sepia.png`
    /// in the current directory.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Blend between the original (0.0) and full sepia (1.0).
    #[arg(long, default_value_t = FilterSpec::DEFAULT_INTENSITY)]
    intensity: f32,

    /// Background worker threads.
    #[arg(long, default_value_t = RuntimeConfig::DEFAULT_BACKGROUND_WORKERS)]
    workers: usize,

    /// Refuse to read files larger than this many bytes (0 = no limit).
    #[arg(long)]
    max_bytes: Option<u64>,

    /// Full runtime config as a JSON string.
    ///
    /// When provided, `--workers` and `--max-bytes` are ignored.
    #[arg(long)]
    config_json: Option<String>,

    /// Print the outcome as JSON instead of a human-readable line.
    #[arg(long)]
    json: bool,
}

/// Machine-readable outcome printed with `--json`.
#[derive(Serialize)]
struct Summary<'a> {
    location: &'a str,
    output: &'a Path,
    dimensions: Dimensions,
    filter: FilterSpec,
}

/// Build a [`RuntimeConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and the
/// individual flags are ignored.
fn config_from_cli(cli: &Cli) -> Result<RuntimeConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    Ok(RuntimeConfig {
        background_workers: cli.workers,
        max_bytes: match cli.max_bytes {
            Some(0) => None,
            Some(limit) => Some(limit),
            None => RuntimeConfig::DEFAULT_MAX_BYTES,
        },
    })
}

/// Turn an existing filesystem path into a `file:` URL; leave anything
/// else untouched for the pipeline to validate.
fn resolve_location(raw: &str) -> String {
    let path = Path::new(raw);
    if Url::parse(raw).is_err()
        && path.exists()
        && let Ok(absolute) = std::path::absolute(path)
        && let Ok(url) = Url::from_file_path(absolute)
    {
        return url.to_string();
    }
    raw.to_owned()
}

/// `<stem>-sepia.png`, from the last path segment of the location.
fn default_output(location: &str) -> PathBuf {
    let stem = Url::parse(location)
        .ok()
        .and_then(|url| {
            url.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_owned))
        })
        .and_then(|name| {
            Path::new(&name)
                .file_stem()
                .and_then(|s| s.to_str())
                .map(str::to_owned)
        })
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "image".to_owned());
    PathBuf::from(format!("{stem}-sepia.png"))
}

/// `\n  caused by: ...` for every source below `err`.
fn cause_chain(err: &dyn Error) -> String {
    std::iter::successors(err.source(), |&cause| cause.source())
        .map(|cause| format!("\n  caused by: {cause}"))
        .collect()
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let pipeline = match Pipeline::new(&config) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error starting pipeline: {e}");
            return ExitCode::FAILURE;
        }
    };

    let location = resolve_location(&cli.location);
    let filter = FilterSpec::sepia(cli.intensity);
    let outcome = pipeline.submit(&location, filter).wait();

    let image = match outcome {
        Ok(image) => image,
        Err(e) => {
            if cli.json {
                match serde_json::to_string_pretty(&e) {
                    Ok(json) => println!("{json}"),
                    Err(ser) => eprintln!("Error serializing error: {ser}"),
                }
            }
            eprintln!("Pipeline error: {e}{}", cause_chain(&e));
            return ExitCode::FAILURE;
        }
    };

    let output = cli.output.clone().unwrap_or_else(|| default_output(&location));
    let dimensions = image.dimensions();
    let Dimensions { width, height } = dimensions;
    if let Err(e) = image
        .into_pixels()
        .save_with_format(&output, image::ImageFormat::Png)
    {
        eprintln!("Error writing {}: {e}", output.display());
        return ExitCode::FAILURE;
    }
    tracing::info!(output = %output.display(), width, height, "wrote filtered image");

    if cli.json {
        let summary = Summary {
            location: &location,
            output: &output,
            dimensions,
            filter,
        };
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error serializing summary: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        println!(
            "{} -> {} ({width}x{height}, {:?} at {})",
            location,
            output.display(),
            filter.kind,
            filter.intensity,
        );
    }

    ExitCode::SUCCESS
}
