//! Percentage-to-pixel geometry for watermark placement.
//!
//! All placement parameters of a [`WatermarkSpec`] are percentages, so the same
//! spec lands at the same relative spot on every image of a batch. This module
//! turns them into absolute pixel values for one concrete image.

use std::f32::consts::PI;

use crate::spec::WatermarkSpec;

/// Pixel-space placement of a watermark on one image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    /// Anchor X in pixels: the watermark's visual center.
    pub anchor_x: f32,
    /// Anchor Y in pixels.
    pub anchor_y: f32,
    /// Text em size in pixels.
    pub font_size_px: f32,
    /// Logo `(width, height)` in pixels, when a logo with a non-empty native
    /// size was supplied.
    pub logo_size_px: Option<(f32, f32)>,
    /// Clockwise rotation about the anchor, radians, in `[0, 2π)`.
    pub rotation_rad: f32,
}

/// Resolve a spec against a source image of `width` x `height` pixels.
///
/// `logo_native` is the native `(width, height)` of the loaded logo, if any.
#[must_use]
pub fn resolve(
    width: u32,
    height: u32,
    spec: &WatermarkSpec,
    logo_native: Option<(u32, u32)>,
) -> Geometry {
    #[allow(clippy::cast_precision_loss)]
    let (w, h) = (width as f32, height as f32);
    let (anchor_x, anchor_y) = anchor(w, h, spec);

    Geometry {
        anchor_x,
        anchor_y,
        font_size_px: spec.font_size_pct / 100.0 * w,
        logo_size_px: logo_native.and_then(|(nw, nh)| logo_size(w, spec.logo_size_pct, nw, nh)),
        rotation_rad: rotation_rad(spec.rotation_deg),
    }
}

fn anchor(width: f32, height: f32, spec: &WatermarkSpec) -> (f32, f32) {
    (
        spec.position_x_pct / 100.0 * width,
        spec.position_y_pct / 100.0 * height,
    )
}

/// Logo extent: width is a percentage of the image width, height follows the
/// native aspect ratio. `None` for a zero-sized logo.
#[must_use]
pub fn logo_size(image_width: f32, logo_size_pct: f32, native_w: u32, native_h: u32) -> Option<(f32, f32)> {
    if native_w == 0 || native_h == 0 {
        return None;
    }
    let width = logo_size_pct / 100.0 * image_width;
    #[allow(clippy::cast_precision_loss)]
    let height = width * (native_h as f32 / native_w as f32);
    Some((width, height))
}

/// Degrees to radians, normalized to one turn so that 360° is exactly 0.
#[must_use]
pub fn rotation_rad(degrees: f32) -> f32 {
    degrees.rem_euclid(360.0) * PI / 180.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn anchor_is_percentage_of_dimensions() {
        let spec = WatermarkSpec::default().with_position(25.0, 75.0);
        let g = resolve(800, 600, &spec, None);
        assert!(close(g.anchor_x, 200.0));
        assert!(close(g.anchor_y, 450.0));
        assert!(g.logo_size_px.is_none());
    }

    #[test]
    fn placement_is_resolution_independent() {
        let spec = WatermarkSpec::default().with_position(37.0, 81.0).with_font_size(12.0);
        let small = resolve(640, 480, &spec, None);
        let large = resolve(4032, 3024, &spec, None);

        assert!(close(small.anchor_x / 640.0, large.anchor_x / 4032.0));
        assert!(close(small.anchor_y / 480.0, large.anchor_y / 3024.0));
        assert!(close(small.font_size_px / 640.0, large.font_size_px / 4032.0));
    }

    #[test]
    fn font_size_follows_width() {
        let spec = WatermarkSpec::default().with_font_size(14.0);
        let g = resolve(1000, 500, &spec, None);
        assert!(close(g.font_size_px, 140.0));
    }

    #[test]
    fn logo_keeps_native_aspect_ratio() {
        for pct in [5.0_f32, 12.5, 25.0, 33.0, 50.0] {
            let spec = WatermarkSpec::default().with_logo_size(pct);
            let g = resolve(1234, 777, &spec, Some((300, 170)));
            let (w, h) = g.logo_size_px.unwrap();
            assert!(((h / w) - 170.0 / 300.0).abs() < 1e-5, "pct {pct}: {w}x{h}");
        }
    }

    #[test]
    fn logo_quarter_width_on_800x600() {
        let spec = WatermarkSpec::default().with_logo_size(25.0);
        let g = resolve(800, 600, &spec, Some((200, 100)));
        assert_eq!(g.logo_size_px, Some((200.0, 100.0)));
        assert!(close(g.anchor_x, 400.0));
        assert!(close(g.anchor_y, 300.0));
    }

    #[test]
    fn zero_sized_logo_has_no_extent() {
        assert!(logo_size(800.0, 25.0, 0, 10).is_none());
        assert!(logo_size(800.0, 25.0, 10, 0).is_none());
    }

    #[test]
    fn full_turn_is_exactly_zero() {
        assert!(rotation_rad(360.0).abs() < f32::EPSILON);
        assert!(rotation_rad(0.0).abs() < f32::EPSILON);
        assert!(close(rotation_rad(-90.0), 1.5 * PI));
        assert!(close(rotation_rad(90.0), 0.5 * PI));
    }
}
