use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::RgbImage;

use crate::annotate;

/// One recognized object instance. Immutable, scoped to a single request.
#[derive(Clone, Debug)]
pub struct Detection {
    /// Class name from the model vocabulary (or a synthesized `class_<id>`).
    pub label: String,
    /// Confidence in [0, 1].
    pub confidence: f32,
    /// `[x_min, y_min, x_max, y_max]` in original-image pixel coordinates.
    pub bbox: [f32; 4],
}

/// Bundles a decoded image with its detections.
///
/// Exactly two capabilities are exposed: the structured detection rows and
/// an annotated copy written to a directory of the caller's choosing.
pub struct DetectionOutput {
    image: RgbImage,
    detections: Vec<Detection>,
}

impl DetectionOutput {
    pub fn new(image: RgbImage, detections: Vec<Detection>) -> Self {
        Self { image, detections }
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    pub fn into_detections(self) -> Vec<Detection> {
        self.detections
    }

    /// Draws the bounding boxes onto a copy of the image and writes it into
    /// `dir` as `annotated.jpg`. Returns the path written.
    pub fn save_annotated(&self, dir: &Path) -> Result<PathBuf> {
        let mut copy = self.image.clone();
        annotate::draw_detections(&mut copy, &self.detections);
        let path = dir.join("annotated.jpg");
        copy.save(&path)
            .with_context(|| format!("failed to write annotated image to {}", path.display()))?;
        Ok(path)
    }
}
