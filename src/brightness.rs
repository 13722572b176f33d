//! Average-luma brightness classification.
//!
//! Picks a default text color with enough contrast against the dominant tone
//! of an image. The image is first drawn onto a small fixed-size surface so the
//! cost and the result do not depend on the source resolution.

use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};
use tracing::debug;

use crate::spec::ColorMode;

/// Edge length of the square analysis surface.
pub const DEFAULT_SURFACE_SIZE: u32 = 100;

/// Average luma (percent) below which an image counts as dark.
const DARK_IMAGE_THRESHOLD: f32 = 50.0;

/// Classifies images as needing a light or a dark overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrightnessAnalyzer {
    surface_size: u32,
}

impl Default for BrightnessAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_SURFACE_SIZE)
    }
}

impl BrightnessAnalyzer {
    /// Analyzer drawing onto a `surface_size` x `surface_size` surface.
    /// A size of zero is raised to one.
    #[must_use]
    pub fn new(surface_size: u32) -> Self {
        Self {
            surface_size: surface_size.max(1),
        }
    }

    /// Average luma of `image` in percent, or `None` for a zero-area image.
    #[must_use]
    pub fn average_luma(&self, image: &DynamicImage) -> Option<f32> {
        if image.width() == 0 || image.height() == 0 {
            return None;
        }
        let surface = imageops::resize(
            &image.to_rgb8(),
            self.surface_size,
            self.surface_size,
            FilterType::Triangle,
        );
        mean_luma(&surface).map(|l| l * 100.0)
    }

    /// Light for dark images (average luma below 50%), Dark otherwise.
    ///
    /// A zero-area image yields [`ColorMode::Light`].
    #[must_use]
    pub fn analyze(&self, image: &DynamicImage) -> ColorMode {
        let Some(luma) = self.average_luma(image) else {
            debug!("zero-area image, defaulting to light overlay");
            return ColorMode::Light;
        };
        let mode = if luma < DARK_IMAGE_THRESHOLD {
            ColorMode::Light
        } else {
            ColorMode::Dark
        };
        debug!(luma, ?mode, "brightness analyzed");
        mode
    }
}

/// Mean of `0.299*R + 0.587*G + 0.114*B` over all pixels, in `[0, 1]`.
fn mean_luma(img: &RgbImage) -> Option<f32> {
    let count = img.width() as usize * img.height() as usize;
    if count == 0 {
        return None;
    }
    let sum: f64 = img
        .pixels()
        .map(|px| {
            let lum =
                0.299 * f32::from(px[0]) + 0.587 * f32::from(px[1]) + 0.114 * f32::from(px[2]);
            f64::from(lum / 255.0)
        })
        .sum();
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    Some((sum / count as f64) as f32)
}
