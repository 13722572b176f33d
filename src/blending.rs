//! Alpha compositing of watermark layers.
//!
//! A [`Layer`] is a small RGBA raster positioned relative to an anchor point.
//! [`composite`] draws it onto a target with a rotation about the anchor and a
//! global alpha, using the Porter-Duff "over" operator:
//!
//! `out = src * alpha + dst * (1 - alpha)`
//!
//! Every destination pixel is mapped back into layer space and sampled
//! bilinearly. Transform and alpha live only for the duration of one call, so
//! nothing carries over between composites on the same target.

use image::{Rgba, RgbaImage};

/// A raster to be composited, positioned in anchor-local coordinates.
#[derive(Clone)]
pub struct Layer {
    /// Layer pixels (straight alpha).
    pub image: RgbaImage,
    /// Local X of the layer's left edge, relative to the anchor.
    pub origin_x: f32,
    /// Local Y of the layer's top edge, relative to the anchor.
    pub origin_y: f32,
}

impl std::fmt::Debug for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Layer")
            .field("dimensions", &(self.image.width(), self.image.height()))
            .field("origin", &(self.origin_x, self.origin_y))
            .finish()
    }
}

impl Layer {
    /// A layer whose geometric center sits on the anchor.
    #[must_use]
    pub fn centered(image: RgbaImage) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let (w, h) = (image.width() as f32, image.height() as f32);
        Self {
            image,
            origin_x: -w / 2.0,
            origin_y: -h / 2.0,
        }
    }
}

/// Where and how a layer is drawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    /// Anchor X in target pixels.
    pub anchor_x: f32,
    /// Anchor Y in target pixels.
    pub anchor_y: f32,
    /// Clockwise rotation about the anchor, radians.
    pub rotation_rad: f32,
    /// Global alpha in `[0, 1]`.
    pub opacity: f32,
}

/// Extra margin around [`visible_region`] covering the bilinear footprint.
const SAMPLE_PADDING: f32 = 2.0;

/// An axis-aligned rectangle in anchor-local layer coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalRect {
    /// Left edge.
    pub min_x: f32,
    /// Top edge.
    pub min_y: f32,
    /// Right edge.
    pub max_x: f32,
    /// Bottom edge.
    pub max_y: f32,
}

impl LocalRect {
    /// Whether the two rectangles overlap.
    #[must_use]
    pub fn intersects(&self, other: &LocalRect) -> bool {
        self.min_x < other.max_x
            && other.min_x < self.max_x
            && self.min_y < other.max_y
            && other.min_y < self.max_y
    }
}

/// The part of anchor-local space that [`composite`] can sample when drawing
/// onto a `width` x `height` target with `placement`.
///
/// Layer content outside this rectangle never reaches the target, so layers
/// can be rasterized clipped to it without changing the result.
#[must_use]
pub fn visible_region(width: u32, height: u32, placement: &Placement) -> LocalRect {
    let (sin, cos) = placement.rotation_rad.sin_cos();
    #[allow(clippy::cast_precision_loss)]
    let (w, h) = (width as f32, height as f32);

    let mut rect = LocalRect {
        min_x: f32::INFINITY,
        min_y: f32::INFINITY,
        max_x: f32::NEG_INFINITY,
        max_y: f32::NEG_INFINITY,
    };
    for (tx, ty) in [(0.0, 0.0), (w, 0.0), (0.0, h), (w, h)] {
        let dx = tx - placement.anchor_x;
        let dy = ty - placement.anchor_y;
        let lx = dx * cos + dy * sin;
        let ly = -dx * sin + dy * cos;
        rect.min_x = rect.min_x.min(lx);
        rect.min_y = rect.min_y.min(ly);
        rect.max_x = rect.max_x.max(lx);
        rect.max_y = rect.max_y.max(ly);
    }

    LocalRect {
        min_x: rect.min_x - SAMPLE_PADDING,
        min_y: rect.min_y - SAMPLE_PADDING,
        max_x: rect.max_x + SAMPLE_PADDING,
        max_y: rect.max_y + SAMPLE_PADDING,
    }
}

/// Composite `layer` onto `target`.
///
/// Pixels the layer does not cover are left bit-for-bit unchanged.
pub fn composite(target: &mut RgbaImage, layer: &Layer, placement: &Placement) {
    let opacity = placement.opacity.clamp(0.0, 1.0);
    if opacity <= 0.0 || layer.image.width() == 0 || layer.image.height() == 0 {
        return;
    }
    let Some((x0, y0, x1, y1)) = clip_bounds(target, layer, placement) else {
        return;
    };

    let (sin, cos) = placement.rotation_rad.sin_cos();

    for y in y0..y1 {
        for x in x0..x1 {
            #[allow(clippy::cast_precision_loss)]
            let dx = x as f32 + 0.5 - placement.anchor_x;
            #[allow(clippy::cast_precision_loss)]
            let dy = y as f32 + 0.5 - placement.anchor_y;

            // inverse rotation back into layer space
            let lx = dx * cos + dy * sin;
            let ly = -dx * sin + dy * cos;

            let src = sample_premultiplied(
                &layer.image,
                lx - layer.origin_x - 0.5,
                ly - layer.origin_y - 0.5,
            );
            if src[3] <= 0.0 {
                continue;
            }

            let px = target.get_pixel_mut(x, y);
            *px = blend_over(*px, src, opacity);
        }
    }
}

/// Target-space pixel range `[x0, x1) x [y0, y1)` covered by the rotated layer.
fn clip_bounds(target: &RgbaImage, layer: &Layer, placement: &Placement) -> Option<(u32, u32, u32, u32)> {
    let (sin, cos) = placement.rotation_rad.sin_cos();
    #[allow(clippy::cast_precision_loss)]
    let (w, h) = (layer.image.width() as f32, layer.image.height() as f32);
    let (ox, oy) = (layer.origin_x, layer.origin_y);

    let corners = [(ox, oy), (ox + w, oy), (ox, oy + h), (ox + w, oy + h)];
    let mut min_x = f32::INFINITY;
    let mut min_y = f32::INFINITY;
    let mut max_x = f32::NEG_INFINITY;
    let mut max_y = f32::NEG_INFINITY;
    for (cx, cy) in corners {
        let tx = placement.anchor_x + cx * cos - cy * sin;
        let ty = placement.anchor_y + cx * sin + cy * cos;
        min_x = min_x.min(tx);
        min_y = min_y.min(ty);
        max_x = max_x.max(tx);
        max_y = max_y.max(ty);
    }

    #[allow(clippy::cast_precision_loss)]
    let (tw, th) = (target.width() as f32, target.height() as f32);
    let x0 = min_x.floor().max(0.0);
    let y0 = min_y.floor().max(0.0);
    let x1 = max_x.ceil().min(tw);
    let y1 = max_y.ceil().min(th);
    if !(x0 < x1 && y0 < y1) {
        return None;
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Some((x0 as u32, y0 as u32, x1 as u32, y1 as u32))
}

/// Bilinear sample at continuous pixel coordinates `(u, v)`, where integer
/// coordinates hit pixel centers. Returns premultiplied RGBA in `[0, 1]`.
/// Outside the image is transparent.
fn sample_premultiplied(img: &RgbaImage, u: f32, v: f32) -> [f32; 4] {
    let u0 = u.floor();
    let v0 = v.floor();
    let fx = u - u0;
    let fy = v - v0;

    #[allow(clippy::cast_possible_truncation)]
    let (x0, y0) = (u0 as i64, v0 as i64);

    let mut out = [0.0_f32; 4];
    for (xi, yi, weight) in [
        (x0, y0, (1.0 - fx) * (1.0 - fy)),
        (x0 + 1, y0, fx * (1.0 - fy)),
        (x0, y0 + 1, (1.0 - fx) * fy),
        (x0 + 1, y0 + 1, fx * fy),
    ] {
        if weight <= 0.0 {
            continue;
        }
        let texel = fetch_premultiplied(img, xi, yi);
        for (acc, t) in out.iter_mut().zip(texel) {
            *acc += t * weight;
        }
    }
    out
}

fn fetch_premultiplied(img: &RgbaImage, x: i64, y: i64) -> [f32; 4] {
    if x < 0 || y < 0 || x >= i64::from(img.width()) || y >= i64::from(img.height()) {
        return [0.0; 4];
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let px = img.get_pixel(x as u32, y as u32);
    let a = f32::from(px[3]) / 255.0;
    [
        f32::from(px[0]) / 255.0 * a,
        f32::from(px[1]) / 255.0 * a,
        f32::from(px[2]) / 255.0 * a,
        a,
    ]
}

/// "Over" blend of a premultiplied source, scaled by `opacity`, onto a
/// straight-alpha destination pixel.
fn blend_over(dst: Rgba<u8>, src: [f32; 4], opacity: f32) -> Rgba<u8> {
    let src_a = src[3] * opacity;
    let dst_a = f32::from(dst[3]) / 255.0;
    let out_a = src_a + dst_a * (1.0 - src_a);
    if out_a <= f32::EPSILON {
        return Rgba([0, 0, 0, 0]);
    }

    let channel = |i: usize| -> u8 {
        let d = f32::from(dst[i]) / 255.0;
        let c = (src[i] * opacity + d * dst_a * (1.0 - src_a)) / out_a;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        {
            (c * 255.0).round().clamp(0.0, 255.0) as u8
        }
    };

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let alpha = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgba([channel(0), channel(1), channel(2), alpha])
}
