//! Upload-to-report detection pipeline.
//!
//! One linear pass per request: persist the upload to scratch, run the
//! detector over the persisted artifact, save the annotated image into a
//! fresh scratch directory, extract the detection rows, and best-effort
//! delete the input artifact. The annotated output directory is left to
//! environment cleanup.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use image::RgbImage;

use crate::config::AppConfig;
use crate::detect::{Detection, DetectionOutput, Detector};
use crate::scratch;

pub struct PipelineOutcome {
    /// Absent when the results directory ended up empty; the caller skips
    /// the annotated-image display in that case.
    pub annotated_path: Option<PathBuf>,
    pub results_dir: PathBuf,
    pub detections: Vec<Detection>,
}

pub fn run_detection(
    cfg: &AppConfig,
    detector: &dyn Detector,
    image: &RgbImage,
    original_name: &str,
) -> Result<PipelineOutcome> {
    fs::create_dir_all(&cfg.scratch_dir).with_context(|| {
        format!(
            "failed to create scratch directory {}",
            cfg.scratch_dir.display()
        )
    })?;

    let input_path = scratch::upload_path(&cfg.scratch_dir, original_name);
    image
        .save(&input_path)
        .with_context(|| format!("failed to persist upload to {}", input_path.display()))?;

    // The detector runs over the persisted artifact, not the in-memory buffer.
    let persisted = image::open(&input_path)
        .with_context(|| format!("failed to reopen persisted upload {}", input_path.display()))?
        .to_rgb8();
    let detections = detector.detect(&persisted)?;
    log::info!("{}: {} detection(s)", original_name, detections.len());

    let results_dir = scratch::results_dir(&cfg.scratch_dir);
    fs::create_dir_all(&results_dir).with_context(|| {
        format!("failed to create results directory {}", results_dir.display())
    })?;

    let output = DetectionOutput::new(persisted, detections);
    output.save_annotated(&results_dir)?;

    // The save may drop more than one artifact into the directory; the
    // newest file is taken as the annotated image.
    let annotated_path = scratch::latest_file(&results_dir)?;

    let detections = output.into_detections();
    if let Err(err) = fs::remove_file(&input_path) {
        log::debug!("scratch cleanup failed for {}: {}", input_path.display(), err);
    }

    Ok(PipelineOutcome {
        annotated_path,
        results_dir,
        detections,
    })
}
