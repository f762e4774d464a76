// ============================================================================
// COLLAGE MODEL: transforms, colors and the per-session configuration
// ============================================================================

use std::fmt;
use std::sync::Arc;

use egui::Vec2;
use image::Rgba;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CollageError;

/// Fixed internal canvas resolution (logical units == output pixels).
pub const CANVAS_WIDTH: u32 = 900;
pub const CANVAS_HEIGHT: u32 = 1200;

/// Scale range the sanitized transform is clamped into.
pub const MIN_SCALE: f32 = 0.1;
pub const MAX_SCALE: f32 = 3.0;

// ----------------------------------------------------------------------------
//  Transform
// ----------------------------------------------------------------------------

/// Offset from the layer's natural center, uniform magnification, and rotation
/// (degrees) about the layer's own center.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub x: f32,
    pub y: f32,
    pub scale: f32,
    pub rotation: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform { x: 0.0, y: 0.0, scale: 1.0, rotation: 0.0 };

    pub fn offset(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    pub fn set_offset(&mut self, offset: Vec2) {
        self.x = offset.x;
        self.y = offset.y;
    }

    /// Copy safe to feed into the renderer and hit tester.
    ///
    /// Non-finite components fall back to identity, scale is clamped to
    /// `[MIN_SCALE, MAX_SCALE]` and rotation is folded into (-180, 180].
    pub fn sanitized(&self) -> Transform {
        let finite_or = |v: f32, fallback: f32| if v.is_finite() { v } else { fallback };
        Transform {
            x: finite_or(self.x, 0.0),
            y: finite_or(self.y, 0.0),
            scale: finite_or(self.scale, 1.0).clamp(MIN_SCALE, MAX_SCALE),
            rotation: normalize_degrees(finite_or(self.rotation, 0.0)),
        }
    }
}

fn normalize_degrees(deg: f32) -> f32 {
    let r = deg.rem_euclid(360.0);
    if r > 180.0 { r - 360.0 } else { r }
}

// ----------------------------------------------------------------------------
//  Color
// ----------------------------------------------------------------------------

/// Opaque RGB color; serialized as a `#rrggbb` string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgb(0xff, 0xff, 0xff);
    pub const BLACK: Color = Color::rgb(0x00, 0x00, 0x00);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#rrggbb` or `#rgb` (leading `#` optional, case-insensitive).
    pub fn from_hex(s: &str) -> Result<Self, CollageError> {
        let invalid = || CollageError::InvalidColor(s.to_string());
        let hex = s.trim();
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let channel = |digits: &str| u8::from_str_radix(digits, 16).map_err(|_| invalid());
        match hex.len() {
            6 => Ok(Color::rgb(channel(&hex[0..2])?, channel(&hex[2..4])?, channel(&hex[4..6])?)),
            3 => {
                // #abc is shorthand for #aabbcc
                let r = channel(&hex[0..1])?;
                let g = channel(&hex[1..2])?;
                let b = channel(&hex[2..3])?;
                Ok(Color::rgb(r * 17, g * 17, b * 17))
            }
            _ => Err(invalid()),
        }
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    pub fn to_rgba(&self) -> Rgba<u8> {
        Rgba([self.r, self.g, self.b, 255])
    }

    pub fn with_alpha(&self, alpha: f32) -> Rgba<u8> {
        let a = (alpha.clamp(0.0, 1.0) * 255.0).round() as u8;
        Rgba([self.r, self.g, self.b, a])
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Color::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

// ----------------------------------------------------------------------------
//  Image resources and configuration
// ----------------------------------------------------------------------------

/// Raw, still-encoded image bytes as handed over by the file picker.
#[derive(Clone)]
pub struct ImageResource {
    /// Display label, usually the picked file name.
    pub label: String,
    pub bytes: Arc<[u8]>,
}

impl ImageResource {
    pub fn new(label: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self { label: label.into(), bytes: bytes.into() }
    }
}

impl fmt::Debug for ImageResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageResource")
            .field("label", &self.label)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// Everything the user controls about one collage.
///
/// Owned by the session; the compositor only ever reads it. The two image
/// resources are the still-encoded selections; their decoded bitmaps live in
/// the session's loader.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CollageConfiguration {
    /// Primary (large) label, e.g. the name in kanji.
    pub name: String,
    /// Phonetic reading drawn above the name.
    pub furigana: String,
    pub bg_color1: Color,
    pub bg_color2: Color,
    #[serde(skip)]
    pub primary_image: Option<ImageResource>,
    #[serde(skip)]
    pub secondary_image: Option<ImageResource>,
    pub primary_transform: Transform,
    pub secondary_transform: Transform,
}

impl Default for CollageConfiguration {
    fn default() -> Self {
        Self {
            name: "なまえ".to_string(),
            furigana: "ふりがな".to_string(),
            bg_color1: Color::WHITE,
            bg_color2: Color::rgb(0xfe, 0xcd, 0xd3),
            primary_image: None,
            secondary_image: None,
            primary_transform: Transform::IDENTITY,
            secondary_transform: Transform::IDENTITY,
        }
    }
}
