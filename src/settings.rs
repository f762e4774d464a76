//! Render settings: the fixed look of the collage that users don't edit.
//!
//! Stored as a flat `key = value` text file, one setting per line.  Unknown
//! keys are ignored and malformed values keep their default, so an old or
//! hand-edited file never prevents rendering.

use std::path::Path;

use crate::error::CollageError;
use crate::model::Color;

// Ranges every value is held to before it reaches the renderer.
pub const MAX_PRIMARY_MARGIN: f32 = 440.0;
pub const MAX_SHADOW_OFFSET: f32 = 1200.0;
pub const MAX_SHADOW_BLUR: f32 = 100.0;
pub const MAX_TEXT_SIZE: f32 = 600.0;
pub const MAX_STROKE_WIDTH: f32 = 64.0;
pub const TEXT_TOP_RANGE: (f32, f32) = (-600.0, 1800.0);

/// Font families tried in order when loading label fonts from the system.
const DEFAULT_FAMILIES: &[&str] = &[
    "Noto Sans CJK JP",
    "Noto Sans JP",
    "Hiragino Sans",
    "Hiragino Kaku Gothic ProN",
    "Yu Gothic",
    "Meiryo",
    "Source Han Sans JP",
    "IPAexGothic",
];

/// Appearance of one text line.
#[derive(Clone, Debug, PartialEq)]
pub struct TextStyle {
    /// Family fallback list, first available wins.
    pub families: Vec<String>,
    /// CSS-style weight (400 = regular, 700 = bold, 900 = black).
    pub weight: u16,
    /// Em size in canvas units.
    pub size: f32,
    /// Top edge of the em box (text is top-anchored).
    pub top: f32,
    pub stroke_width: f32,
    pub stroke_color: Color,
    pub fill_color: Color,
}

/// Drop shadow behind the primary image. Offsets are in canvas units and are
/// not affected by the layer transform.
#[derive(Clone, Debug, PartialEq)]
pub struct ShadowStyle {
    pub offset_x: f32,
    pub offset_y: f32,
    /// Blur extent; the Gaussian sigma is half of this.
    pub blur: f32,
    pub color: Color,
    pub opacity: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RenderSettings {
    /// Clear space kept around the primary image at scale 1.
    pub primary_margin: f32,
    /// Opacity of the grayscale pattern layer inside the band.
    pub pattern_opacity: f32,
    pub shadow: ShadowStyle,
    pub furigana: TextStyle,
    pub name: TextStyle,
}

impl Default for RenderSettings {
    fn default() -> Self {
        let families: Vec<String> = DEFAULT_FAMILIES.iter().map(|s| s.to_string()).collect();
        Self {
            primary_margin: 80.0,
            pattern_opacity: 0.5,
            shadow: ShadowStyle {
                offset_x: 5.0,
                offset_y: 10.0,
                blur: 20.0,
                color: Color::BLACK,
                opacity: 0.3,
            },
            furigana: TextStyle {
                families: families.clone(),
                weight: 700,
                size: 36.0,
                top: 70.0,
                stroke_width: 8.0,
                stroke_color: Color::WHITE,
                fill_color: Color::rgb(0x33, 0x33, 0x33),
            },
            name: TextStyle {
                families,
                weight: 900,
                size: 100.0,
                top: 115.0,
                stroke_width: 16.0,
                stroke_color: Color::WHITE,
                fill_color: Color::rgb(0x11, 0x11, 0x11),
            },
        }
    }
}

impl RenderSettings {
    /// Read settings from a file on disk.
    pub fn load_from(path: &Path) -> Result<Self, CollageError> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    /// Parse `key = value` lines on top of the defaults.
    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let key = key.trim();
            let val = val.trim();

            if let Some(rest) = key.strip_prefix("furigana.") {
                apply_text_key(&mut s.furigana, rest, val);
                continue;
            }
            if let Some(rest) = key.strip_prefix("name.") {
                apply_text_key(&mut s.name, rest, val);
                continue;
            }
            match key {
                "primary_margin" => set_f32(&mut s.primary_margin, val),
                "pattern_opacity" => set_f32(&mut s.pattern_opacity, val),
                "shadow.offset_x" => set_f32(&mut s.shadow.offset_x, val),
                "shadow.offset_y" => set_f32(&mut s.shadow.offset_y, val),
                "shadow.blur" => set_f32(&mut s.shadow.blur, val),
                "shadow.color" => set_color(&mut s.shadow.color, val),
                "shadow.opacity" => set_f32(&mut s.shadow.opacity, val),
                _ => {}
            }
        }
        s.clamp_ranges();
        s
    }

    /// Pull every numeric setting into the range the renderer handles.
    /// Non-finite values fall back to the default.
    pub fn clamp_ranges(&mut self) {
        let d = Self::default();
        self.primary_margin = clamp_or(self.primary_margin, 0.0, MAX_PRIMARY_MARGIN, d.primary_margin);
        self.pattern_opacity = clamp_or(self.pattern_opacity, 0.0, 1.0, d.pattern_opacity);
        let sh = &mut self.shadow;
        sh.offset_x = clamp_or(sh.offset_x, -MAX_SHADOW_OFFSET, MAX_SHADOW_OFFSET, d.shadow.offset_x);
        sh.offset_y = clamp_or(sh.offset_y, -MAX_SHADOW_OFFSET, MAX_SHADOW_OFFSET, d.shadow.offset_y);
        sh.blur = clamp_or(sh.blur, 0.0, MAX_SHADOW_BLUR, d.shadow.blur);
        sh.opacity = clamp_or(sh.opacity, 0.0, 1.0, d.shadow.opacity);
        clamp_text(&mut self.furigana, &d.furigana);
        clamp_text(&mut self.name, &d.name);
    }

    /// Serialize to the same format `parse` reads.
    pub fn to_config_string(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("primary_margin = {}\n", self.primary_margin));
        out.push_str(&format!("pattern_opacity = {}\n", self.pattern_opacity));
        out.push_str(&format!("shadow.offset_x = {}\n", self.shadow.offset_x));
        out.push_str(&format!("shadow.offset_y = {}\n", self.shadow.offset_y));
        out.push_str(&format!("shadow.blur = {}\n", self.shadow.blur));
        out.push_str(&format!("shadow.color = {}\n", self.shadow.color));
        out.push_str(&format!("shadow.opacity = {}\n", self.shadow.opacity));
        for (prefix, style) in [("furigana", &self.furigana), ("name", &self.name)] {
            out.push_str(&format!("{}.families = {}\n", prefix, style.families.join(", ")));
            out.push_str(&format!("{}.weight = {}\n", prefix, style.weight));
            out.push_str(&format!("{}.size = {}\n", prefix, style.size));
            out.push_str(&format!("{}.top = {}\n", prefix, style.top));
            out.push_str(&format!("{}.stroke_width = {}\n", prefix, style.stroke_width));
            out.push_str(&format!("{}.stroke_color = {}\n", prefix, style.stroke_color));
            out.push_str(&format!("{}.fill_color = {}\n", prefix, style.fill_color));
        }
        out
    }
}

fn clamp_or(v: f32, lo: f32, hi: f32, fallback: f32) -> f32 {
    if v.is_finite() { v.clamp(lo, hi) } else { fallback }
}

fn clamp_text(style: &mut TextStyle, default: &TextStyle) {
    style.size = clamp_or(style.size, 0.0, MAX_TEXT_SIZE, default.size);
    style.top = clamp_or(style.top, TEXT_TOP_RANGE.0, TEXT_TOP_RANGE.1, default.top);
    style.stroke_width = clamp_or(style.stroke_width, 0.0, MAX_STROKE_WIDTH, default.stroke_width);
}

fn apply_text_key(style: &mut TextStyle, key: &str, val: &str) {
    match key {
        "families" => {
            let families: Vec<String> = val
                .split(',')
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty())
                .collect();
            if !families.is_empty() {
                style.families = families;
            }
        }
        "weight" => {
            if let Ok(w) = val.parse::<u16>() {
                style.weight = w.clamp(100, 1000);
            }
        }
        "size" => set_positive(&mut style.size, val),
        "top" => set_f32(&mut style.top, val),
        "stroke_width" => set_f32(&mut style.stroke_width, val),
        "stroke_color" => set_color(&mut style.stroke_color, val),
        "fill_color" => set_color(&mut style.fill_color, val),
        _ => {}
    }
}

fn set_f32(slot: &mut f32, val: &str) {
    if let Ok(v) = val.parse::<f32>()
        && v.is_finite()
    {
        *slot = v;
    }
}

fn set_positive(slot: &mut f32, val: &str) {
    if let Ok(v) = val.parse::<f32>()
        && v.is_finite()
        && v > 0.0
    {
        *slot = v;
    }
}

fn set_color(slot: &mut Color, val: &str) {
    if let Ok(c) = Color::from_hex(val) {
        *slot = c;
    }
}
