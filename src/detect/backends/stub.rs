use anyhow::Result;
use image::RgbImage;
use sha2::{Digest, Sha256};

use crate::detect::{Detection, Detector};
use crate::labels;

/// Stub detector for tests and smoke runs. No weights file required.
///
/// By default it derives one deterministic detection from a digest of the
/// pixel data, so repeated runs over the same image agree. Tests that need
/// specific labels use `with_detections`.
#[derive(Debug)]
pub struct StubDetector {
    canned: Option<Vec<Detection>>,
}

impl StubDetector {
    pub fn new() -> Self {
        Self { canned: None }
    }

    /// Always return the given detections, regardless of input.
    pub fn with_detections(detections: Vec<Detection>) -> Self {
        Self {
            canned: Some(detections),
        }
    }
}

impl Default for StubDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for StubDetector {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>> {
        if let Some(canned) = &self.canned {
            return Ok(canned.clone());
        }

        let digest: [u8; 32] = Sha256::digest(image.as_raw()).into();
        let class_id = digest[0] as usize % labels::MODEL_LABELS.len();
        let confidence = 0.5 + f32::from(digest[1]) / 512.0;
        let width = image.width() as f32;
        let height = image.height() as f32;

        Ok(vec![Detection {
            label: labels::label_for_class(class_id),
            confidence,
            bbox: [width * 0.25, height * 0.25, width * 0.75, height * 0.75],
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_is_deterministic_per_image() {
        let detector = StubDetector::new();
        let image = RgbImage::from_pixel(32, 32, image::Rgb([10, 20, 30]));

        let first = detector.detect(&image).unwrap();
        let second = detector.detect(&image).unwrap();

        assert_eq!(first.len(), 1);
        assert_eq!(first[0].label, second[0].label);
        assert!(first[0].confidence >= 0.5 && first[0].confidence < 1.0);
    }

    #[test]
    fn canned_detections_pass_through() {
        let detector = StubDetector::with_detections(vec![Detection {
            label: "NO-Mask".to_string(),
            confidence: 0.72,
            bbox: [0.0, 0.0, 4.0, 4.0],
        }]);
        let image = RgbImage::new(8, 8);

        let out = detector.detect(&image).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].label, "NO-Mask");
    }
}
