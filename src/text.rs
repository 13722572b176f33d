//! Text watermark rasterization.
//!
//! Fonts are registered by family name in a [`FontBook`]. A spec's font family
//! is a CSS-like list (`"Inter, Arial, sans-serif"`); the first registered
//! family in the list is used, otherwise the book's fallback face. This mirrors
//! a canvas silently falling back to its default font.
//!
//! Text is laid out on a single line with kerning, centered horizontally on the
//! anchor and vertically on the middle of the ascent/descent box.

use std::collections::HashMap;
use std::path::Path;

use ab_glyph::{point, Font, FontArc, OutlinedGlyph, PxScale, ScaleFont};
use image::{Rgba, RgbaImage};

use crate::blending::{Layer, LocalRect};
use crate::error::{Error, Result};
use crate::spec::Color;

/// Family name of the embedded face.
pub const DEFAULT_FAMILY: &str = "sans-serif";

/// Embedded bold sans face (DejaVu Sans Bold).
const EMBEDDED_FONT_DATA: &[u8] = include_bytes!("../assets/fonts/DejaVuSans-Bold.ttf");

/// Registry of font faces keyed by lowercase family name.
#[derive(Clone, Default)]
pub struct FontBook {
    faces: HashMap<String, FontArc>,
    fallback: Option<FontArc>,
}

impl std::fmt::Debug for FontBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut families: Vec<&str> = self.families().collect();
        families.sort_unstable();
        f.debug_struct("FontBook")
            .field("families", &families)
            .field("has_fallback", &self.fallback.is_some())
            .finish()
    }
}

fn normalize_family(name: &str) -> String {
    name.trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .to_lowercase()
}

impl FontBook {
    /// An empty book. Text cannot be drawn until a face is registered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A book holding the embedded face as [`DEFAULT_FAMILY`] and fallback.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FontLoad`] if the embedded font cannot be parsed.
    pub fn with_default() -> Result<Self> {
        let face = FontArc::try_from_slice(EMBEDDED_FONT_DATA)
            .map_err(|e| Error::FontLoad(format!("embedded font: {e}")))?;
        let mut book = Self::new();
        book.register(DEFAULT_FAMILY, face);
        Ok(book)
    }

    /// Register `face` under `family`. The first face registered becomes the
    /// fallback.
    pub fn register(&mut self, family: &str, face: FontArc) {
        if self.fallback.is_none() {
            self.fallback = Some(face.clone());
        }
        self.faces.insert(normalize_family(family), face);
    }

    /// Parse and register TrueType/OpenType font data.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FontLoad`] if the data is not a valid font.
    pub fn register_bytes(&mut self, family: &str, data: Vec<u8>) -> Result<()> {
        let face = FontArc::try_from_vec(data)
            .map_err(|e| Error::FontLoad(format!("{family}: {e}")))?;
        self.register(family, face);
        Ok(())
    }

    /// Read, parse and register a font file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read, or
    /// [`Error::FontLoad`] if it is not a valid font.
    pub fn register_file(&mut self, family: &str, path: &Path) -> Result<()> {
        let data = std::fs::read(path)?;
        self.register_bytes(family, data)
    }

    /// Pick the face for a CSS-like family list.
    #[must_use]
    pub fn resolve(&self, family_list: &str) -> Option<&FontArc> {
        family_list
            .split(',')
            .map(normalize_family)
            .find_map(|name| self.faces.get(&name))
            .or(self.fallback.as_ref())
    }

    /// Registered family names.
    pub fn families(&self) -> impl Iterator<Item = &str> {
        self.faces.keys().map(String::as_str)
    }

    /// Whether no face is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fallback.is_none()
    }
}

/// The ab_glyph scale for an em size in pixels.
///
/// `PxScale` measures ascent-to-descent height, while font sizes are em sizes,
/// so the two differ by `height / units_per_em`.
fn em_scale(font: &FontArc, em_px: f32) -> PxScale {
    match font.units_per_em() {
        Some(upem) if upem > 0.0 => PxScale::from(em_px * font.height_unscaled() / upem),
        _ => PxScale::from(em_px),
    }
}

/// Width of the advance box and ascent-to-descent height of `text`, in pixels.
#[must_use]
pub fn measure_text(font: &FontArc, text: &str, em_px: f32) -> (f32, f32) {
    let scaled = font.as_scaled(em_scale(font, em_px));
    let mut width = 0.0_f32;
    let mut prev = None;
    for c in text.chars().filter(|c| !c.is_control()) {
        let id = scaled.glyph_id(c);
        if let Some(p) = prev {
            width += scaled.kern(p, id);
        }
        width += scaled.h_advance(id);
        prev = Some(id);
    }
    (width, scaled.ascent() - scaled.descent())
}

fn layout(font: &FontArc, text: &str, em_px: f32) -> Vec<OutlinedGlyph> {
    let scale = em_scale(font, em_px);
    let scaled = font.as_scaled(scale);
    let (width, _) = measure_text(font, text, em_px);

    // anchor at the horizontal center and the vertical middle of the em box
    let baseline = (scaled.ascent() + scaled.descent()) / 2.0;
    let mut caret = -width / 2.0;
    let mut prev = None;
    let mut outlined = Vec::new();

    for c in text.chars().filter(|c| !c.is_control()) {
        let id = scaled.glyph_id(c);
        if let Some(p) = prev {
            caret += scaled.kern(p, id);
        }
        let glyph = id.with_scale_and_position(scale, point(caret, baseline));
        if let Some(g) = font.outline_glyph(glyph) {
            outlined.push(g);
        }
        caret += scaled.h_advance(id);
        prev = Some(id);
    }
    outlined
}

/// Rasterize `text` filled with `color` into an anchor-centered layer.
///
/// With `visible`, only the part of the text inside that anchor-local
/// rectangle is rasterized, so the layer never outgrows the target it is
/// drawn on. Returns `None` when nothing visible results (e.g. only
/// whitespace, or text entirely off the target).
#[must_use]
pub fn rasterize_text(
    font: &FontArc,
    text: &str,
    em_px: f32,
    color: Color,
    visible: Option<&LocalRect>,
) -> Option<Layer> {
    if em_px <= 0.0 {
        return None;
    }
    let glyphs: Vec<OutlinedGlyph> = layout(font, text, em_px)
        .into_iter()
        .filter(|g| {
            let b = g.px_bounds();
            let bounds = LocalRect {
                min_x: b.min.x,
                min_y: b.min.y,
                max_x: b.max.x,
                max_y: b.max.y,
            };
            visible.is_none_or(|v| v.intersects(&bounds))
        })
        .collect();

    let mut min_x = f32::INFINITY;
    let mut min_y = f32::INFINITY;
    let mut max_x = f32::NEG_INFINITY;
    let mut max_y = f32::NEG_INFINITY;
    for g in &glyphs {
        let b = g.px_bounds();
        min_x = min_x.min(b.min.x);
        min_y = min_y.min(b.min.y);
        max_x = max_x.max(b.max.x);
        max_y = max_y.max(b.max.y);
    }
    if let Some(v) = visible {
        min_x = min_x.max(v.min_x.floor());
        min_y = min_y.max(v.min_y.floor());
        max_x = max_x.min(v.max_x.ceil());
        max_y = max_y.min(v.max_y.ceil());
    }
    if !(min_x < max_x && min_y < max_y) {
        return None;
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let (width, height) = ((max_x - min_x).ceil() as u32, (max_y - min_y).ceil() as u32);
    let mut coverage = vec![0.0_f32; width as usize * height as usize];

    for g in &glyphs {
        let b = g.px_bounds();
        // glyph bounds and the clip edges are whole pixels, offsets may be negative
        #[allow(clippy::cast_possible_truncation)]
        let (ox, oy) = ((b.min.x - min_x) as i64, (b.min.y - min_y) as i64);
        g.draw(|x, y, c| {
            let (px, py) = (ox + i64::from(x), oy + i64::from(y));
            if px >= 0 && py >= 0 && px < i64::from(width) && py < i64::from(height) {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let cell = &mut coverage[py as usize * width as usize + px as usize];
                *cell = (*cell + c).min(1.0);
            }
        });
    }

    let image = RgbaImage::from_fn(width, height, |x, y| {
        let c = coverage[y as usize * width as usize + x as usize];
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let alpha = (c * 255.0).round().clamp(0.0, 255.0) as u8;
        Rgba([color.r, color.g, color.b, alpha])
    });

    Some(Layer {
        image,
        origin_x: min_x,
        origin_y: min_y,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blending::{visible_region, Placement};

    fn book() -> FontBook {
        FontBook::with_default().unwrap()
    }

    #[test]
    fn embedded_font_loads() {
        let book = book();
        assert!(!book.is_empty());
        assert_eq!(book.families().collect::<Vec<_>>(), vec![DEFAULT_FAMILY]);
    }

    #[test]
    fn empty_book_resolves_nothing() {
        assert!(FontBook::new().resolve("sans-serif").is_none());
        assert!(FontBook::new().is_empty());
    }

    #[test]
    fn unknown_family_falls_back() {
        let book = book();
        assert!(book.resolve("'Comic Neue', Papyrus").is_some());
        assert!(book.resolve(" \"Sans-Serif\" ").is_some());
    }

    #[test]
    fn invalid_font_bytes_are_rejected() {
        let mut book = FontBook::new();
        let err = book.register_bytes("broken", vec![0, 1, 2, 3]).unwrap_err();
        assert!(matches!(err, Error::FontLoad(_)));
        assert!(book.is_empty());
    }

    #[test]
    fn layer_is_centered_on_anchor() {
        let book = book();
        let font = book.resolve(DEFAULT_FAMILY).unwrap();
        let layer = rasterize_text(font, "HHHH", 64.0, Color::white(), None).unwrap();

        #[allow(clippy::cast_precision_loss)]
        let (w, h) = (layer.image.width() as f32, layer.image.height() as f32);
        let center_x = layer.origin_x + w / 2.0;
        let center_y = layer.origin_y + h / 2.0;
        assert!(center_x.abs() <= 4.0, "horizontal center {center_x}");
        // capitals sit above the em middle, so only bound the vertical offset
        assert!(center_y.abs() <= 64.0 * 0.3, "vertical center {center_y}");
        assert!(layer.image.pixels().any(|p| p[3] == 255));
        assert!(layer.image.pixels().all(|p| p[0] == 255 && p[1] == 255 && p[2] == 255));
    }

    #[test]
    fn em_size_controls_extent() {
        let book = book();
        let font = book.resolve(DEFAULT_FAMILY).unwrap();
        let (w_small, _) = measure_text(font, "Sample", 20.0);
        let (w_large, h_large) = measure_text(font, "Sample", 40.0);
        assert!((w_large / w_small - 2.0).abs() < 0.05);
        assert!(h_large > 40.0 && h_large < 60.0, "height {h_large}");
    }

    #[test]
    fn long_caption_layer_is_bounded_by_target() {
        let book = book();
        let font = book.resolve(DEFAULT_FAMILY).unwrap();
        let caption = "Confidential draft, do not distribute outside the studio";
        let em = 0.30 * 6000.0;

        for rotation_rad in [0.0, -std::f32::consts::FRAC_PI_4] {
            let placement = Placement {
                anchor_x: 600.0,
                anchor_y: 400.0,
                rotation_rad,
                opacity: 0.5,
            };
            let visible = visible_region(1200, 800, &placement);
            let layer =
                rasterize_text(font, caption, em, Color::white(), Some(&visible)).unwrap();
            let (w, h) = layer.image.dimensions();
            assert!(w <= 1200 + 800 + 6 && h <= 1200 + 800 + 6, "layer {w}x{h}");
        }

        let (full_width, _) = measure_text(font, caption, em);
        assert!(full_width > 20_000.0);
    }

    #[test]
    fn text_entirely_off_target_has_no_layer() {
        let book = book();
        let font = book.resolve(DEFAULT_FAMILY).unwrap();
        let placement = Placement {
            anchor_x: -5000.0,
            anchor_y: 50.0,
            rotation_rad: 0.0,
            opacity: 1.0,
        };
        let visible = visible_region(100, 100, &placement);
        assert!(rasterize_text(font, "Hi", 40.0, Color::white(), Some(&visible)).is_none());
    }

    #[test]
    fn whitespace_only_text_has_no_layer() {
        let book = book();
        let font = book.resolve(DEFAULT_FAMILY).unwrap();
        assert!(rasterize_text(font, "   ", 32.0, Color::white(), None).is_none());
        assert!(rasterize_text(font, "A", 0.0, Color::white(), None).is_none());
    }
}
