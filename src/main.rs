use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use numlabel::{Frame, LabellerConfig, LogSink, MostFrequentSink, Pipeline, ResultSink};

#[derive(Parser)]
#[command(name = "numlabel")]
#[command(about = "Classify image frames into numeric labels with a detector/recognizer cascade")]
struct Cli {
    /// Path to the TOML config
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Images or directories of images to classify
    #[arg(value_name = "IMAGE", required = true)]
    inputs: Vec<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Save every processed frame to the configured debug directories
    #[arg(long)]
    save_debug_frames: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let mut config = LabellerConfig::from_file(&args.config)
        .with_context(|| format!("Failed to load config {}", args.config.display()))?;
    if args.save_debug_frames {
        config.save_debug_frames = true;
        config.validate()?;
    }

    let sink: Box<dyn ResultSink> = match config.result_aggregation_window_size {
        0 => Box::new(LogSink),
        window => Box::new(MostFrequentSink::new(window)),
    };

    let pipeline = Pipeline::init(&config, sink).context("Failed to start pipeline")?;

    for path in collect_images(&args.inputs)? {
        let img = match image::open(&path) {
            Ok(img) => img,
            Err(e) => {
                warn!("skipping {}: {e}", path.display());
                continue;
            }
        };
        let frame = Frame::from_image(img)
            .with_context(|| format!("Invalid frame {}", path.display()))?;
        pipeline
            .submit(frame)
            .map_err(|e| anyhow::anyhow!("Failed to submit {}: {}", path.display(), e))?;
    }

    let report = pipeline.close();
    info!(
        "submitted {}, labelled {}, noise {}, malformed {}, failed {}",
        report.submitted, report.accepted, report.no_number, report.malformed, report.failed
    );

    Ok(())
}

/// Expand directories into their image files, sorted by name.
fn collect_images(inputs: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut entries: Vec<PathBuf> = std::fs::read_dir(input)
                .with_context(|| format!("Failed to read directory {}", input.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| is_image(p))
                .collect();
            entries.sort();
            images.extend(entries);
        } else {
            images.push(input.clone());
        }
    }
    Ok(images)
}

fn is_image(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()).as_deref(),
        Some("png" | "jpg" | "jpeg" | "bmp")
    )
}
