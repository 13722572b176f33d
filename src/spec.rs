//! Watermark settings: the value type describing one watermark.
//!
//! A [`WatermarkSpec`] is resolution-independent. Sizes and positions are
//! percentages of the source image, so one spec applies consistently across
//! images of different pixel dimensions.
//!
//! Every numeric field has a valid range. Values outside it are clamped at the
//! point of entry ([`WatermarkSpec::sanitized`] and the `with_*` setters), so
//! the renderer never observes an invalid spec.
//!
//! Specs serialize to the JSON settings payload used by settings panels:
//!
//! ```
//! use imagemark::WatermarkSpec;
//!
//! let spec = WatermarkSpec::from_json(r#"{"type":"text","text":"Draft","opacity":250}"#).unwrap();
//! assert_eq!(spec.text, "Draft");
//! assert!((spec.opacity_pct - 100.0).abs() < f32::EPSILON);
//! ```

use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Valid range for [`WatermarkSpec::font_size_pct`].
pub const FONT_SIZE_RANGE: RangeInclusive<f32> = 5.0..=30.0;
/// Valid range for [`WatermarkSpec::opacity_pct`].
pub const OPACITY_RANGE: RangeInclusive<f32> = 1.0..=100.0;
/// Valid range for [`WatermarkSpec::rotation_deg`].
pub const ROTATION_RANGE: RangeInclusive<f32> = -180.0..=180.0;
/// Valid range for the anchor position percentages.
pub const POSITION_RANGE: RangeInclusive<f32> = 0.0..=100.0;
/// Valid range for [`WatermarkSpec::logo_size_pct`].
pub const LOGO_SIZE_RANGE: RangeInclusive<f32> = 5.0..=50.0;

/// Preset id recorded once the anchor has been moved by hand.
pub const CUSTOM_PRESET: &str = "custom";

/// Fill used by [`ColorMode::Light`].
pub const LIGHT_FILL: Color = Color::new(0xD1, 0xD5, 0xDB);
/// Fill used by [`ColorMode::Dark`].
pub const DARK_FILL: Color = Color::new(0x37, 0x41, 0x51);

/// What a watermark draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatermarkKind {
    /// A line of text.
    #[default]
    Text,
    /// A user-supplied logo bitmap.
    #[serde(rename = "image")]
    Logo,
}

/// How the text fill color is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    /// Light gray, for dark images.
    #[default]
    Light,
    /// Dark gray, for light images.
    Dark,
    /// The spec's custom color.
    Custom,
}

/// An opaque RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl Color {
    /// Create a color from its channels.
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// White.
    #[must_use]
    pub const fn white() -> Self {
        Self::new(255, 255, 255)
    }

    /// Parse a `#RGB` or `#RRGGBB` hex string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidColor`] for any other shape or a non-hex digit.
    pub fn from_hex(hex: &str) -> Result<Self> {
        let invalid = || Error::InvalidColor(hex.to_string());
        let digits = hex.trim().strip_prefix('#').ok_or_else(invalid)?;
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }

        let channel = |s: &str| u8::from_str_radix(s, 16).map_err(|_| invalid());
        match digits.len() {
            3 => Ok(Self::new(
                channel(&digits[0..1])? * 17,
                channel(&digits[1..2])? * 17,
                channel(&digits[2..3])? * 17,
            )),
            6 => Ok(Self::new(
                channel(&digits[0..2])?,
                channel(&digits[2..4])?,
                channel(&digits[4..6])?,
            )),
            _ => Err(invalid()),
        }
    }

    /// Lowercase `#rrggbb` form.
    #[must_use]
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl TryFrom<String> for Color {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::from_hex(&value)
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_hex()
    }
}

/// A named anchor position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionPreset {
    /// Stable id stored in [`WatermarkSpec::position_preset`].
    pub id: &'static str,
    /// Display name.
    pub name: &'static str,
    /// Anchor X, percent of width.
    pub x: f32,
    /// Anchor Y, percent of height.
    pub y: f32,
}

impl PositionPreset {
    /// Look up a preset by id.
    #[must_use]
    pub fn find(id: &str) -> Option<&'static PositionPreset> {
        POSITION_PRESETS.iter().find(|p| p.id == id)
    }
}

const fn preset(id: &'static str, name: &'static str, x: f32, y: f32) -> PositionPreset {
    PositionPreset { id, name, x, y }
}

/// The 3x3 grid of anchor presets.
pub const POSITION_PRESETS: [PositionPreset; 9] = [
    preset("top-left", "Top Left", 10.0, 10.0),
    preset("top-center", "Top Center", 50.0, 10.0),
    preset("top-right", "Top Right", 90.0, 10.0),
    preset("center-left", "Center Left", 10.0, 50.0),
    preset("center", "Center", 50.0, 50.0),
    preset("center-right", "Center Right", 90.0, 50.0),
    preset("bottom-left", "Bottom Left", 10.0, 90.0),
    preset("bottom-center", "Bottom Center", 50.0, 90.0),
    preset("bottom-right", "Bottom Right", 90.0, 90.0),
];

/// The complete set of parameters describing one watermark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WatermarkSpec {
    /// Text or logo.
    #[serde(rename = "type")]
    pub kind: WatermarkKind,
    /// Text to draw in text mode.
    pub text: String,
    /// CSS-like font family list, e.g. `"Inter, sans-serif"`.
    #[serde(rename = "font")]
    pub font_family: String,
    /// Em size of the text, percent of image width.
    #[serde(rename = "fontSize")]
    pub font_size_pct: f32,
    /// How the text fill is chosen.
    #[serde(rename = "fontMode")]
    pub color_mode: ColorMode,
    /// Fill used when `color_mode` is [`ColorMode::Custom`].
    pub custom_color: Color,
    /// Opacity in percent.
    #[serde(rename = "opacity")]
    pub opacity_pct: f32,
    /// Clockwise rotation about the anchor, degrees.
    #[serde(rename = "rotation")]
    pub rotation_deg: f32,
    /// Anchor X, percent of width.
    #[serde(rename = "positionX")]
    pub position_x_pct: f32,
    /// Anchor Y, percent of height.
    #[serde(rename = "positionY")]
    pub position_y_pct: f32,
    /// Id of the preset the anchor came from, or [`CUSTOM_PRESET`].
    pub position_preset: String,
    /// Logo width, percent of image width.
    #[serde(rename = "imageSize")]
    pub logo_size_pct: f32,
}

impl Default for WatermarkSpec {
    fn default() -> Self {
        Self {
            kind: WatermarkKind::Text,
            text: "Sample".to_string(),
            font_family: "sans-serif".to_string(),
            font_size_pct: 14.0,
            color_mode: ColorMode::Light,
            custom_color: Color::white(),
            opacity_pct: 10.0,
            rotation_deg: -45.0,
            position_x_pct: 50.0,
            position_y_pct: 50.0,
            position_preset: "center".to_string(),
            logo_size_pct: 25.0,
        }
    }
}

fn clamp_to(value: f32, range: &RangeInclusive<f32>, fallback: f32) -> f32 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(*range.start(), *range.end())
    }
}

impl WatermarkSpec {
    /// Parse a JSON settings payload. Missing fields take their defaults and
    /// numeric fields are clamped into range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Settings`] if the payload is not valid JSON for a spec,
    /// including a malformed `customColor`.
    pub fn from_json(json: &str) -> Result<Self> {
        let spec: Self = serde_json::from_str(json)?;
        Ok(spec.sanitized())
    }

    /// Serialize to the JSON settings payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Settings`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Clamp every numeric field into its valid range. NaN takes the default.
    #[must_use]
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        self.font_size_pct = clamp_to(self.font_size_pct, &FONT_SIZE_RANGE, defaults.font_size_pct);
        self.opacity_pct = clamp_to(self.opacity_pct, &OPACITY_RANGE, defaults.opacity_pct);
        self.rotation_deg = clamp_to(self.rotation_deg, &ROTATION_RANGE, defaults.rotation_deg);
        self.position_x_pct = clamp_to(self.position_x_pct, &POSITION_RANGE, defaults.position_x_pct);
        self.position_y_pct = clamp_to(self.position_y_pct, &POSITION_RANGE, defaults.position_y_pct);
        self.logo_size_pct = clamp_to(self.logo_size_pct, &LOGO_SIZE_RANGE, defaults.logo_size_pct);
        self
    }

    /// Whether this spec draws text: text kind with non-blank text.
    #[must_use]
    pub fn draws_text(&self) -> bool {
        self.kind == WatermarkKind::Text && !self.text.trim().is_empty()
    }

    /// The text fill color implied by the color mode.
    #[must_use]
    pub fn fill_color(&self) -> Color {
        match self.color_mode {
            ColorMode::Light => LIGHT_FILL,
            ColorMode::Dark => DARK_FILL,
            ColorMode::Custom => self.custom_color,
        }
    }

    /// Global alpha in `(0, 1]`.
    #[must_use]
    pub fn alpha(&self) -> f32 {
        clamp_to(self.opacity_pct, &OPACITY_RANGE, 10.0) / 100.0
    }

    /// Switch between text and logo.
    #[must_use]
    pub fn with_kind(mut self, kind: WatermarkKind) -> Self {
        self.kind = kind;
        self
    }

    /// Replace the text.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Replace the font family list.
    #[must_use]
    pub fn with_font_family(mut self, family: impl Into<String>) -> Self {
        self.font_family = family.into();
        self
    }

    /// Set the font size, clamped to [`FONT_SIZE_RANGE`].
    #[must_use]
    pub fn with_font_size(mut self, pct: f32) -> Self {
        self.font_size_pct = clamp_to(pct, &FONT_SIZE_RANGE, self.font_size_pct);
        self
    }

    /// Set the color mode.
    #[must_use]
    pub fn with_color_mode(mut self, mode: ColorMode) -> Self {
        self.color_mode = mode;
        self
    }

    /// Set the custom color and switch to [`ColorMode::Custom`].
    #[must_use]
    pub fn with_custom_color(mut self, color: Color) -> Self {
        self.custom_color = color;
        self.color_mode = ColorMode::Custom;
        self
    }

    /// Set the opacity, clamped to [`OPACITY_RANGE`].
    #[must_use]
    pub fn with_opacity(mut self, pct: f32) -> Self {
        self.opacity_pct = clamp_to(pct, &OPACITY_RANGE, self.opacity_pct);
        self
    }

    /// Set the rotation, clamped to [`ROTATION_RANGE`].
    #[must_use]
    pub fn with_rotation(mut self, deg: f32) -> Self {
        self.rotation_deg = clamp_to(deg, &ROTATION_RANGE, self.rotation_deg);
        self
    }

    /// Move the anchor by hand. The preset becomes [`CUSTOM_PRESET`].
    #[must_use]
    pub fn with_position(mut self, x_pct: f32, y_pct: f32) -> Self {
        self.position_x_pct = clamp_to(x_pct, &POSITION_RANGE, self.position_x_pct);
        self.position_y_pct = clamp_to(y_pct, &POSITION_RANGE, self.position_y_pct);
        self.position_preset = CUSTOM_PRESET.to_string();
        self
    }

    /// Move the anchor to a preset.
    #[must_use]
    pub fn with_preset(mut self, preset: &PositionPreset) -> Self {
        self.position_x_pct = preset.x;
        self.position_y_pct = preset.y;
        self.position_preset = preset.id.to_string();
        self
    }

    /// Set the logo size, clamped to [`LOGO_SIZE_RANGE`].
    #[must_use]
    pub fn with_logo_size(mut self, pct: f32) -> Self {
        self.logo_size_pct = clamp_to(pct, &LOGO_SIZE_RANGE, self.logo_size_pct);
        self
    }
}
