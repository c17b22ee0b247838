use anyhow::Result;
use image::RgbImage;

use crate::detect::Detection;

/// Object detector over a decoded RGB image.
///
/// `detect` takes `&self`: the provisioned instance is constructed once and
/// then shared read-only across concurrent sessions.
pub trait Detector: Send + Sync + std::fmt::Debug {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection. An empty result is a normal outcome, not an error.
    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>>;
}
