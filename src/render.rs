//! Watermark renderer.
//!
//! Produces a fresh composited raster from a source image and a spec. The
//! source is never modified, and rendering reads no shared mutable state, so
//! identical inputs always give identical bytes.

use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbaImage};
use tracing::debug;

use crate::blending::{self, Layer, LocalRect, Placement};
use crate::error::{Error, Result};
use crate::geometry::{self, Geometry};
use crate::spec::{WatermarkKind, WatermarkSpec};
use crate::text::{self, FontBook};

/// A decoded logo bitmap.
#[derive(Clone, PartialEq)]
pub struct Logo {
    image: RgbaImage,
}

impl std::fmt::Debug for Logo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logo")
            .field("native_size", &self.native_size())
            .finish()
    }
}

impl Logo {
    /// Wrap an already decoded bitmap.
    #[must_use]
    pub fn new(image: RgbaImage) -> Self {
        Self { image }
    }

    /// Decode a logo from encoded bytes, sniffing the format.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the bytes are not a supported image.
    pub fn decode(name: &str, bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes).map_err(|source| Error::Decode {
            name: name.to_string(),
            source,
        })?;
        Ok(Self::from(image))
    }

    /// Native `(width, height)` in pixels.
    #[must_use]
    pub fn native_size(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// The logo pixels.
    #[must_use]
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }
}

impl From<DynamicImage> for Logo {
    fn from(image: DynamicImage) -> Self {
        Self::new(image.to_rgba8())
    }
}

/// Composites watermarks onto images.
#[derive(Debug, Clone)]
pub struct Renderer {
    fonts: FontBook,
}

impl Renderer {
    /// A renderer drawing text with `fonts`.
    #[must_use]
    pub fn new(fonts: FontBook) -> Self {
        Self { fonts }
    }

    /// A renderer with only the embedded font.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FontLoad`] if the embedded font cannot be parsed.
    pub fn with_default_fonts() -> Result<Self> {
        Ok(Self::new(FontBook::with_default()?))
    }

    /// The font registry.
    #[must_use]
    pub fn fonts(&self) -> &FontBook {
        &self.fonts
    }

    /// Mutable access to the font registry.
    pub fn fonts_mut(&mut self) -> &mut FontBook {
        &mut self.fonts
    }

    /// Render `spec` over `source`.
    ///
    /// The output always has the source's dimensions. A spec that draws
    /// nothing (blank text, or logo mode without a loaded logo) returns an
    /// unchanged copy of the source.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoFont`] when text must be drawn and the font book is
    /// empty.
    pub fn render(
        &self,
        source: &RgbaImage,
        spec: &WatermarkSpec,
        logo: Option<&Logo>,
    ) -> Result<RgbaImage> {
        let mut output = source.clone();
        let geometry = geometry::resolve(
            source.width(),
            source.height(),
            spec,
            logo.map(Logo::native_size),
        );

        let placement = Placement {
            anchor_x: geometry.anchor_x,
            anchor_y: geometry.anchor_y,
            rotation_rad: geometry.rotation_rad,
            opacity: spec.alpha(),
        };

        let layer = match spec.kind {
            WatermarkKind::Text => {
                let visible = blending::visible_region(source.width(), source.height(), &placement);
                self.text_layer(spec, &geometry, &visible)?
            }
            WatermarkKind::Logo => logo.and_then(|l| logo_layer(l, &geometry)),
        };
        let Some(layer) = layer else {
            debug!(kind = ?spec.kind, "nothing to draw, returning base image");
            return Ok(output);
        };

        debug!(
            anchor_x = geometry.anchor_x,
            anchor_y = geometry.anchor_y,
            rotation_rad = geometry.rotation_rad,
            ?layer,
            "compositing watermark"
        );
        blending::composite(&mut output, &layer, &placement);
        Ok(output)
    }

    fn text_layer(
        &self,
        spec: &WatermarkSpec,
        geometry: &Geometry,
        visible: &LocalRect,
    ) -> Result<Option<Layer>> {
        if !spec.draws_text() {
            return Ok(None);
        }
        let font = self.fonts.resolve(&spec.font_family).ok_or(Error::NoFont)?;
        Ok(text::rasterize_text(
            font,
            &spec.text,
            geometry.font_size_px,
            spec.fill_color(),
            Some(visible),
        ))
    }
}

/// The logo scaled to its resolved extent, centered on the anchor.
fn logo_layer(logo: &Logo, geometry: &Geometry) -> Option<Layer> {
    let (w, h) = geometry.logo_size_px?;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let (w, h) = (w.round().max(1.0) as u32, h.round().max(1.0) as u32);
    let scaled = if (w, h) == logo.native_size() {
        logo.image().clone()
    } else {
        imageops::resize(logo.image(), w, h, FilterType::Triangle)
    };
    Some(Layer::centered(scaled))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn renderer() -> Renderer {
        Renderer::with_default_fonts().unwrap()
    }

    fn gradient(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| {
            #[allow(clippy::cast_possible_truncation)]
            Rgba([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8, 255])
        })
    }

    fn changed_pixels(a: &RgbaImage, b: &RgbaImage) -> usize {
        a.pixels().zip(b.pixels()).filter(|(p, q)| p != q).count()
    }

    #[test]
    fn blank_text_is_identity() {
        let source = gradient(120, 80);
        for text in ["", "   ", "\t"] {
            let spec = WatermarkSpec::default().with_text(text).with_opacity(100.0);
            let out = renderer().render(&source, &spec, None).unwrap();
            assert_eq!(out, source, "text {text:?}");
        }
    }

    #[test]
    fn logo_mode_without_logo_is_identity() {
        let source = gradient(64, 64);
        let spec = WatermarkSpec::default().with_kind(WatermarkKind::Logo);
        assert_eq!(renderer().render(&source, &spec, None).unwrap(), source);
    }

    #[test]
    fn text_without_fonts_is_an_error() {
        let source = gradient(64, 64);
        let err = Renderer::new(FontBook::new())
            .render(&source, &WatermarkSpec::default(), None)
            .unwrap_err();
        assert!(matches!(err, Error::NoFont));

        // blank text never needs a font
        let blank = WatermarkSpec::default().with_text("");
        assert!(Renderer::new(FontBook::new()).render(&source, &blank, None).is_ok());
    }

    #[test]
    fn text_changes_pixels_near_anchor_only() {
        let source = RgbaImage::from_pixel(400, 200, Rgba([20, 20, 20, 255]));
        let spec = WatermarkSpec::default()
            .with_text("Hi")
            .with_rotation(0.0)
            .with_opacity(100.0)
            .with_position(25.0, 50.0);
        let out = renderer().render(&source, &spec, None).unwrap();

        assert_eq!(out.dimensions(), source.dimensions());
        assert!(changed_pixels(&out, &source) > 100);
        // far right half untouched
        for y in 0..200 {
            for x in 250..400 {
                assert_eq!(out.get_pixel(x, y), source.get_pixel(x, y));
            }
        }
    }

    #[test]
    fn caption_wider_than_image_is_clipped_to_it() {
        let source = RgbaImage::from_pixel(1200, 800, Rgba([0, 0, 0, 255]));
        let spec = WatermarkSpec::default()
            .with_text("Confidential draft, do not distribute outside the studio")
            .with_font_size(30.0)
            .with_opacity(100.0);
        let out = renderer().render(&source, &spec, None).unwrap();
        assert_eq!(out.dimensions(), (1200, 800));
        assert!(changed_pixels(&out, &source) > 10_000);
    }

    #[test]
    fn rendering_is_deterministic() {
        let source = gradient(300, 200);
        let spec = WatermarkSpec::default().with_rotation(33.0).with_opacity(60.0);
        let r = renderer();
        let a = r.render(&source, &spec, None).unwrap();
        let b = r.render(&source, &spec, None).unwrap();
        assert_eq!(a.as_raw(), b.as_raw());
    }

    #[test]
    fn full_turn_matches_no_rotation() {
        let source = gradient(300, 200);
        let mut turned = WatermarkSpec::default().with_opacity(80.0);
        turned.rotation_deg = 360.0;
        let straight = turned.clone().with_rotation(0.0);
        let r = renderer();
        assert_eq!(
            r.render(&source, &turned, None).unwrap(),
            r.render(&source, &straight, None).unwrap()
        );
    }

    #[test]
    fn source_is_not_mutated() {
        let source = gradient(100, 100);
        let copy = source.clone();
        let _ = renderer()
            .render(&source, &WatermarkSpec::default().with_opacity(100.0), None)
            .unwrap();
        assert_eq!(source, copy);
    }

    #[test]
    fn logo_is_scaled_and_centered() {
        let source = RgbaImage::from_pixel(800, 600, Rgba([255, 255, 255, 255]));
        let logo = Logo::new(RgbaImage::from_pixel(200, 100, Rgba([200, 0, 0, 255])));
        let spec = WatermarkSpec::default()
            .with_kind(WatermarkKind::Logo)
            .with_logo_size(25.0)
            .with_rotation(0.0)
            .with_opacity(100.0);
        let out = renderer().render(&source, &spec, Some(&logo)).unwrap();

        let red = Rgba([200, 0, 0, 255]);
        let white = Rgba([255, 255, 255, 255]);
        assert_eq!(*out.get_pixel(300, 250), red);
        assert_eq!(*out.get_pixel(499, 349), red);
        assert_eq!(*out.get_pixel(400, 300), red);
        assert_eq!(*out.get_pixel(299, 250), white);
        assert_eq!(*out.get_pixel(500, 349), white);
        assert_eq!(*out.get_pixel(300, 249), white);
        assert_eq!(*out.get_pixel(300, 350), white);
        assert_eq!(changed_pixels(&out, &source), 200 * 100);
    }

    #[test]
    fn logo_opacity_blends_with_base() {
        let source = RgbaImage::from_pixel(100, 100, Rgba([0, 0, 0, 255]));
        let logo = Logo::new(RgbaImage::from_pixel(10, 10, Rgba([255, 255, 255, 255])));
        let spec = WatermarkSpec::default()
            .with_kind(WatermarkKind::Logo)
            .with_logo_size(10.0)
            .with_rotation(0.0)
            .with_opacity(50.0);
        let out = renderer().render(&source, &spec, Some(&logo)).unwrap();
        assert_eq!(*out.get_pixel(50, 50), Rgba([128, 128, 128, 255]));
    }

    #[test]
    fn logo_decode_failure_is_reported() {
        let err = Logo::decode("logo.png", b"definitely not a png").unwrap_err();
        assert!(matches!(err, Error::Decode { ref name, .. } if name == "logo.png"));
    }
}
