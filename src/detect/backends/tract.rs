#![cfg(feature = "backend-tract")]

use std::cmp::Ordering;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::{imageops, Rgb, RgbImage};
use tract_onnx::prelude::*;

use crate::detect::{Detection, Detector};
use crate::labels;

/// Letterbox fill, matching the gray padding the model was trained with.
const PAD_COLOR: Rgb<u8> = Rgb([114, 114, 114]);

/// Tract-based detector for YOLO-family ONNX exports.
///
/// Loads a local model file and performs inference on RGB images. The model
/// output is expected as `[1, rows, 5 + classes]` rows of
/// `cx, cy, w, h, objectness, class scores...` in letterboxed input pixels.
pub struct TractDetector {
    plan: TypedSimplePlan<TypedModel>,
    input_size: u32,
    confidence_threshold: f32,
    nms_threshold: f32,
}

impl TractDetector {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn load(
        model_path: &Path,
        input_size: u32,
        confidence_threshold: f32,
        nms_threshold: f32,
    ) -> Result<Self> {
        let side = input_size as usize;
        let plan = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            plan,
            input_size,
            confidence_threshold,
            nms_threshold,
        })
    }

    fn build_input(&self, canvas: &RgbImage) -> Tensor {
        let side = self.input_size as usize;
        let pixels = canvas.as_raw();
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, side, side),
            |(_, channel, y, x)| {
                let idx = (y * side + x) * 3 + channel;
                f32::from(pixels[idx]) / 255.0
            },
        );
        input.into_tensor()
    }
}

impl std::fmt::Debug for TractDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TractDetector")
            .field("input_size", &self.input_size)
            .field("confidence_threshold", &self.confidence_threshold)
            .field("nms_threshold", &self.nms_threshold)
            .finish_non_exhaustive()
    }
}

impl Detector for TractDetector {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>> {
        let (canvas, transform) = letterbox(image, self.input_size);
        let input = self.build_input(&canvas);

        let outputs = self
            .plan
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;

        let shape = view.shape();
        if shape.len() != 3 || shape[0] != 1 || shape[2] < 6 {
            return Err(anyhow!("unexpected model output shape {:?}", shape));
        }
        let num_classes = shape[2] - 5;

        let mut candidates = Vec::new();
        let rows = view.index_axis(tract_ndarray::Axis(0), 0);
        for row in rows.outer_iter() {
            let objectness = row[4];
            if objectness < self.confidence_threshold {
                continue;
            }

            let mut best_class = 0usize;
            let mut best_score = 0.0f32;
            for class_id in 0..num_classes {
                let score = row[5 + class_id];
                if score > best_score {
                    best_score = score;
                    best_class = class_id;
                }
            }

            let confidence = objectness * best_score;
            if confidence < self.confidence_threshold {
                continue;
            }

            let bbox = transform.to_original(
                [row[0], row[1], row[2], row[3]],
                image.width() as f32,
                image.height() as f32,
            );
            candidates.push(Detection {
                label: labels::label_for_class(best_class),
                confidence,
                bbox,
            });
        }

        Ok(non_max_suppression(candidates, self.nms_threshold))
    }
}

/// Maps letterboxed-input coordinates back to original-image pixels.
#[derive(Clone, Copy, Debug)]
struct LetterboxTransform {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl LetterboxTransform {
    /// `cxcywh` is in letterboxed input pixels; the result is
    /// `[x_min, y_min, x_max, y_max]` clamped to the original image.
    fn to_original(&self, cxcywh: [f32; 4], width: f32, height: f32) -> [f32; 4] {
        let [cx, cy, w, h] = cxcywh;
        let x_min = (cx - w / 2.0 - self.pad_x) / self.scale;
        let y_min = (cy - h / 2.0 - self.pad_y) / self.scale;
        let x_max = (cx + w / 2.0 - self.pad_x) / self.scale;
        let y_max = (cy + h / 2.0 - self.pad_y) / self.scale;
        [
            x_min.clamp(0.0, width),
            y_min.clamp(0.0, height),
            x_max.clamp(0.0, width),
            y_max.clamp(0.0, height),
        ]
    }
}

/// Aspect-preserving resize onto a square gray canvas.
fn letterbox(image: &RgbImage, size: u32) -> (RgbImage, LetterboxTransform) {
    let (width, height) = image.dimensions();
    let scale = (size as f32 / width as f32).min(size as f32 / height as f32);
    let scaled_w = ((width as f32 * scale).round() as u32).clamp(1, size);
    let scaled_h = ((height as f32 * scale).round() as u32).clamp(1, size);

    let resized = imageops::resize(image, scaled_w, scaled_h, imageops::FilterType::Triangle);
    let pad_x = (size - scaled_w) / 2;
    let pad_y = (size - scaled_h) / 2;

    let mut canvas = RgbImage::from_pixel(size, size, PAD_COLOR);
    imageops::replace(&mut canvas, &resized, i64::from(pad_x), i64::from(pad_y));

    (
        canvas,
        LetterboxTransform {
            scale,
            pad_x: pad_x as f32,
            pad_y: pad_y as f32,
        },
    )
}

/// Greedy per-class NMS: keep the highest-confidence box, drop same-label
/// boxes overlapping it beyond the threshold.
fn non_max_suppression(mut candidates: Vec<Detection>, threshold: f32) -> Vec<Detection> {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });

    let mut kept: Vec<Detection> = Vec::new();
    'candidates: for candidate in candidates {
        for survivor in &kept {
            if survivor.label == candidate.label
                && iou(&survivor.bbox, &candidate.bbox) >= threshold
            {
                continue 'candidates;
            }
        }
        kept.push(candidate);
    }
    kept
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    let union = area_a + area_b - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(label: &str, confidence: f32, bbox: [f32; 4]) -> Detection {
        Detection {
            label: label.to_string(),
            confidence,
            bbox,
        }
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let b = [0.0, 0.0, 10.0, 10.0];
        assert!((iou(&b, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        assert_eq!(iou(&[0.0, 0.0, 5.0, 5.0], &[6.0, 6.0, 9.0, 9.0]), 0.0);
    }

    #[test]
    fn nms_drops_overlapping_same_label_boxes() {
        let kept = non_max_suppression(
            vec![
                det("Person", 0.6, [0.0, 0.0, 10.0, 10.0]),
                det("Person", 0.9, [1.0, 1.0, 11.0, 11.0]),
            ],
            0.45,
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].confidence, 0.9);
    }

    #[test]
    fn nms_keeps_overlapping_boxes_of_different_labels() {
        let kept = non_max_suppression(
            vec![
                det("Person", 0.9, [0.0, 0.0, 10.0, 10.0]),
                det("NO-Hardhat", 0.8, [0.0, 0.0, 10.0, 10.0]),
            ],
            0.45,
        );
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn letterbox_maps_corners_back_to_the_original() {
        let image = RgbImage::new(200, 100);
        let (canvas, transform) = letterbox(&image, 100);
        assert_eq!(canvas.dimensions(), (100, 100));

        // Whole-canvas box (minus padding) maps back to the full image.
        let bbox = transform.to_original([50.0, 50.0, 100.0, 50.0], 200.0, 100.0);
        assert!((bbox[0] - 0.0).abs() < 1e-3);
        assert!((bbox[1] - 0.0).abs() < 1e-3);
        assert!((bbox[2] - 200.0).abs() < 1e-3);
        assert!((bbox[3] - 100.0).abs() < 1e-3);
    }
}
