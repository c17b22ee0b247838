//! Weights resolution and the process-wide memoized detector.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use anyhow::{anyhow, Result};

use crate::config::{AppConfig, BackendKind};
use crate::detect::{Detector, StubDetector};
#[cfg(feature = "backend-tract")]
use crate::detect::TractDetector;

/// Candidate weight files, highest priority first: trained weights, a
/// root-level fallback, then the small demo model.
pub const WEIGHT_CANDIDATES: [&str; 3] = ["weights/best.onnx", "best.onnx", "yolov5s.onnx"];

/// Operator guidance surfaced when no candidate exists.
pub const MISSING_WEIGHTS_HELP: &str = "no weights found: add trained weights at \
weights/best.onnx or keep yolov5s.onnx in the weights root";

/// First existing candidate under `root`, in priority order.
pub fn locate_weights(root: &Path) -> Option<PathBuf> {
    WEIGHT_CANDIDATES
        .iter()
        .map(|candidate| root.join(candidate))
        .find(|path| path.is_file())
}

static DETECTOR: OnceLock<Arc<dyn Detector>> = OnceLock::new();
static INIT: Mutex<()> = Mutex::new(());

/// Returns the process-wide detector, constructing it on first use.
///
/// Loading a model is expensive; construction happens at most once per
/// process and every later call returns the same instance. A failed
/// construction leaves the slot empty.
pub fn get_detector(cfg: &AppConfig) -> Result<Arc<dyn Detector>> {
    if let Some(detector) = DETECTOR.get() {
        return Ok(detector.clone());
    }

    let _guard = INIT
        .lock()
        .map_err(|_| anyhow!("detector init lock poisoned"))?;
    if let Some(detector) = DETECTOR.get() {
        return Ok(detector.clone());
    }

    let detector = build_detector(cfg)?;
    let _ = DETECTOR.set(detector.clone());
    Ok(detector)
}

fn build_detector(cfg: &AppConfig) -> Result<Arc<dyn Detector>> {
    match cfg.detect.backend {
        BackendKind::Stub => {
            log::info!("using stub detector backend");
            Ok(Arc::new(StubDetector::new()))
        }
        #[cfg(feature = "backend-tract")]
        BackendKind::Tract => {
            let weights =
                locate_weights(&cfg.weights_root).ok_or_else(|| anyhow!(MISSING_WEIGHTS_HELP))?;
            log::info!("loading detection model from {}", weights.display());
            let detector = TractDetector::load(
                &weights,
                cfg.detect.input_size,
                cfg.detect.confidence_threshold,
                cfg.detect.nms_threshold,
            )?;
            log::info!("detection model ready");
            Ok(Arc::new(detector))
        }
        #[cfg(not(feature = "backend-tract"))]
        BackendKind::Tract => Err(anyhow!(
            "tract backend not compiled in (enable the backend-tract feature)"
        )),
    }
}
