//! detect_image - one-shot PPE detection over a local image file.

use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use sitewatch::config::AppConfig;
use sitewatch::labels::Bucket;
use sitewatch::pipeline;
use sitewatch::provision;
use sitewatch::report::Report;

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Image file to run detection on (jpg, jpeg, png).
    image: PathBuf,
    /// Scratch directory override for this run.
    #[arg(long)]
    scratch_dir: Option<PathBuf>,
    /// Weights root to scan for model candidates.
    #[arg(long, env = "SITEWATCH_WEIGHTS_ROOT")]
    weights_root: Option<PathBuf>,
    /// Detector backend (tract|stub).
    #[arg(long)]
    backend: Option<String>,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let mut cfg = AppConfig::load()?;
    if let Some(dir) = args.scratch_dir {
        cfg.scratch_dir = dir;
    }
    if let Some(root) = args.weights_root {
        cfg.weights_root = root;
    }
    if let Some(backend) = args.backend.as_deref() {
        cfg.detect.backend = backend.parse()?;
    }

    let detector = {
        let _stage = ui.stage("Load model");
        provision::get_detector(&cfg)?
    };

    let decoded = {
        let _stage = ui.stage("Read image");
        image::open(&args.image)
            .with_context(|| format!("failed to read image {}", args.image.display()))?
            .to_rgb8()
    };
    let original_name = args
        .image
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload.jpg")
        .to_string();

    let outcome = {
        let _stage = ui.stage("Detect");
        pipeline::run_detection(&cfg, detector.as_ref(), &decoded, &original_name)?
    };

    let report = Report::build(&outcome.detections);

    if let Some(path) = &outcome.annotated_path {
        println!("annotated image: {}", path.display());
    }

    if report.is_empty() {
        println!("No objects detected.");
        return Ok(());
    }

    for bucket in Bucket::ORDER {
        let entries = report.entries(bucket);
        if entries.is_empty() {
            continue;
        }
        println!();
        println!("{}:", bucket.title());
        for entry in entries {
            println!("  {}", entry.text());
        }
    }

    println!();
    println!("Summary:");
    for line in report.summary() {
        println!("  {}", line.text());
    }

    Ok(())
}
