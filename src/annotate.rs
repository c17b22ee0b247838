//! Bounding-box overlay rendering.
//!
//! Boxes are drawn in the same per-label colors the report uses. No text
//! overlay: label and confidence live in the rendered report next to the
//! image.
// TODO: label text overlay needs a bundled font before it can be drawn here.

use image::{Rgb, RgbImage};

use crate::detect::Detection;
use crate::labels;

const BORDER_THICKNESS: i32 = 2;

/// Draws every detection's bounding box onto the image in its label color.
pub fn draw_detections(image: &mut RgbImage, detections: &[Detection]) {
    for detection in detections {
        let color = labels::color_for(&detection.label).rgb();
        draw_box(image, detection.bbox, color);
    }
}

fn draw_box(image: &mut RgbImage, bbox: [f32; 4], color: [u8; 3]) {
    let width = image.width() as i32;
    let height = image.height() as i32;

    let x_min = (bbox[0].floor() as i32).clamp(0, width - 1);
    let y_min = (bbox[1].floor() as i32).clamp(0, height - 1);
    let x_max = (bbox[2].ceil() as i32).clamp(0, width - 1);
    let y_max = (bbox[3].ceil() as i32).clamp(0, height - 1);

    if x_min >= x_max || y_min >= y_max {
        return;
    }

    for inset in 0..BORDER_THICKNESS {
        let left = (x_min + inset).min(width - 1);
        let top = (y_min + inset).min(height - 1);
        let right = (x_max - inset).max(0);
        let bottom = (y_max - inset).max(0);

        for x in left..=right {
            image.put_pixel(x as u32, top as u32, Rgb(color));
            image.put_pixel(x as u32, bottom as u32, Rgb(color));
        }
        for y in top..=bottom {
            image.put_pixel(left as u32, y as u32, Rgb(color));
            image.put_pixel(right as u32, y as u32, Rgb(color));
        }
    }
}
