// ============================================================================
// TEXT: label fonts, single-line layout and stroked glyph rasterization
// ============================================================================

use ab_glyph::{Font, FontArc, FontVec, Glyph, PxScale, ScaleFont, point};
use image::{Rgba, RgbaImage};

use crate::canvas::{BlendMode, PixelRect, paint_region};
use crate::error::CollageError;
use crate::model::Color;
use crate::ops::filters::{Plane, dilate};
use crate::settings::{MAX_STROKE_WIDTH, MAX_TEXT_SIZE, RenderSettings, TextStyle};

/// The two label fonts.  Either may be missing, in which case that line is
/// not drawn.
#[derive(Clone, Default)]
pub struct FontSet {
    pub furigana: Option<FontArc>,
    pub name: Option<FontArc>,
}

impl std::fmt::Debug for FontSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontSet")
            .field("furigana", &self.furigana.is_some())
            .field("name", &self.name.is_some())
            .finish()
    }
}

impl FontSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Look both fonts up in the installed system fonts.  Failures are logged
    /// and leave that slot empty.
    pub fn load_system(settings: &RenderSettings) -> Self {
        let load = |label: &str, style: &TextStyle| match load_first_available(&style.families, style.weight) {
            Ok(font) => Some(font),
            Err(e) => {
                log_warn!("No {} font available ({}); that line will not be drawn", label, e);
                None
            }
        };
        Self {
            furigana: load("furigana", &settings.furigana),
            name: load("name", &settings.name),
        }
    }

    /// Use caller-supplied font data (TTF/OTF) for both lines.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, CollageError> {
        let font = FontArc::try_from_vec(data).map_err(|e| CollageError::Font(e.to_string()))?;
        Ok(Self { furigana: Some(font.clone()), name: Some(font) })
    }
}

/// First family in `families` that resolves on this system.
pub fn load_first_available(families: &[String], weight: u16) -> Result<FontArc, CollageError> {
    let mut last_err = CollageError::Font("empty family list".to_string());
    for family in families {
        match load_system_font(family, weight) {
            Ok(font) => {
                log_info!("Loaded font '{}' (weight {})", family, weight);
                return Ok(font);
            }
            Err(e) => last_err = e,
        }
    }
    Err(last_err)
}

/// Load a font by family name and CSS weight (400 = regular, 700 = bold)
/// from the system.  Faces inside `.ttc` collections are loaded by index.
pub fn load_system_font(family: &str, weight: u16) -> Result<FontArc, CollageError> {
    use font_kit::family_name::FamilyName;
    use font_kit::handle::Handle;
    use font_kit::properties::{Properties, Weight};
    use font_kit::source::SystemSource;

    let mut props = Properties::new();
    props.weight = Weight(weight as f32);

    let handle = SystemSource::new()
        .select_best_match(&[FamilyName::Title(family.to_string())], &props)
        .map_err(|_| CollageError::Font(format!("family '{}' not installed", family)))?;

    let (bytes, index) = match handle {
        Handle::Path { path, font_index } => (std::fs::read(&path)?, font_index),
        Handle::Memory { bytes, font_index } => ((*bytes).clone(), font_index),
    };
    let font = FontVec::try_from_vec_and_index(bytes, index)
        .map_err(|e| CollageError::Font(format!("'{}': {}", family, e)))?;
    Ok(FontArc::new(font))
}

/// ab_glyph scales by ascent-to-descent height; label sizes are em sizes.
pub fn em_to_px_scale(font: &FontArc, em: f32) -> PxScale {
    let upem = font.units_per_em().unwrap_or(1000.0);
    PxScale::from(em * font.height_unscaled() / upem)
}

/// Lay out one line left-aligned at x = 0 on the given baseline, with kerning.
/// Returns the glyphs and the total advance width.
pub fn layout_line(font: &FontArc, text: &str, scale: PxScale, baseline: f32) -> (Vec<Glyph>, f32) {
    let scaled = font.as_scaled(scale);
    let mut glyphs = Vec::new();
    let mut cursor_x = 0.0f32;
    let mut last = None;

    for ch in text.chars() {
        if ch.is_control() {
            continue;
        }
        let id = font.glyph_id(ch);
        if let Some(prev) = last {
            cursor_x += scaled.kern(prev, id);
        }
        glyphs.push(id.with_scale_and_position(scale, point(cursor_x, baseline)));
        cursor_x += scaled.h_advance(id);
        last = Some(id);
    }
    (glyphs, cursor_x)
}

/// Glyph coverage in canvas space: `coverage` pixel `(0,0)` is canvas pixel
/// `(origin_x, origin_y)`.
#[derive(Clone, Debug)]
pub struct TextMask {
    pub origin_x: i32,
    pub origin_y: i32,
    pub coverage: Plane,
}

impl TextMask {
    fn canvas_region(&self) -> PixelRect {
        PixelRect::covering(
            self.origin_x as f32,
            self.origin_y as f32,
            (self.origin_x + self.coverage.width as i32) as f32,
            (self.origin_y + self.coverage.height as i32) as f32,
        )
    }

    /// Coverage at a canvas pixel, zero outside the mask.
    #[inline]
    pub fn at(&self, x: u32, y: u32) -> f32 {
        let mx = x as i64 - self.origin_x as i64;
        let my = y as i64 - self.origin_y as i64;
        if mx < 0 || my < 0 || mx >= self.coverage.width as i64 || my >= self.coverage.height as i64 {
            return 0.0;
        }
        self.coverage.get(mx as usize, my as usize)
    }
}

/// Rasterize `text` horizontally centered on `center_x` with the top of the
/// line at `top`.  `pad` pixels of empty border are kept around the glyphs
/// so the mask can be dilated without clipping.  `None` when nothing inks.
pub fn rasterize_line(font: &FontArc, text: &str, em: f32, top: f32, center_x: f32, pad: u32) -> Option<TextMask> {
    let scale = em_to_px_scale(font, em);
    let baseline = top + font.as_scaled(scale).ascent();
    let (glyphs, width) = layout_line(font, text, scale, baseline);
    let shift = center_x - width * 0.5;

    let outlined: Vec<_> = glyphs
        .into_iter()
        .filter_map(|mut g| {
            g.position.x += shift;
            font.outline_glyph(g)
        })
        .collect();
    if outlined.is_empty() {
        return None;
    }

    let (mut min_x, mut min_y, mut max_x, mut max_y) = (f32::MAX, f32::MAX, f32::MIN, f32::MIN);
    for o in &outlined {
        let b = o.px_bounds();
        min_x = min_x.min(b.min.x);
        min_y = min_y.min(b.min.y);
        max_x = max_x.max(b.max.x);
        max_y = max_y.max(b.max.y);
    }

    let origin_x = min_x.floor() as i32 - pad as i32;
    let origin_y = min_y.floor() as i32 - pad as i32;
    let w = (max_x.ceil() as i32 - origin_x + pad as i32).max(0) as usize;
    let h = (max_y.ceil() as i32 - origin_y + pad as i32).max(0) as usize;
    let mut coverage = Plane::new(w, h);

    for o in &outlined {
        let b = o.px_bounds();
        let gx = b.min.x as i32 - origin_x;
        let gy = b.min.y as i32 - origin_y;
        o.draw(|px, py, cov| {
            let x = gx + px as i32;
            let y = gy + py as i32;
            if x < 0 || y < 0 || x as usize >= w || y as usize >= h {
                return;
            }
            let cell = &mut coverage.data[y as usize * w + x as usize];
            *cell = (*cell + cov).min(1.0);
        });
    }

    Some(TextMask { origin_x, origin_y, coverage })
}

/// Composite a coverage mask onto the canvas in a solid color.
pub fn paint_mask(canvas: &mut RgbaImage, mask: &TextMask, color: Color) {
    let region = mask.canvas_region();
    paint_region(canvas, region, BlendMode::Normal, |x, y| {
        let a = (mask.at(x, y).clamp(0.0, 1.0) * 255.0).round() as u8;
        Rgba([color.r, color.g, color.b, a])
    });
}

/// Draw one label: outline in the stroke color first, then the fill on top.
/// Blank strings draw nothing.  Returns whether anything was drawn.
pub fn draw_label(canvas: &mut RgbaImage, font: &FontArc, text: &str, style: &TextStyle, center_x: f32) -> bool {
    let text = text.trim();
    if text.is_empty() || !(style.size.is_finite() && style.size > 0.0) {
        return false;
    }
    let size = style.size.min(MAX_TEXT_SIZE);
    let half_stroke = if style.stroke_width.is_finite() { style.stroke_width.clamp(0.0, MAX_STROKE_WIDTH) * 0.5 } else { 0.0 };
    let pad = half_stroke.ceil() as u32 + 2;
    let Some(fill) = rasterize_line(font, text, size, style.top, center_x, pad) else {
        return false;
    };

    if half_stroke > 0.0 {
        let outline = TextMask {
            origin_x: fill.origin_x,
            origin_y: fill.origin_y,
            coverage: dilate(&fill.coverage, half_stroke),
        };
        paint_mask(canvas, &outline, style.stroke_color);
    }
    paint_mask(canvas, &fill, style.fill_color);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::new_surface;

    const FIXTURE_FONT: &[u8] = include_bytes!("../../tests/fixtures/DejaVuSans-Bold.ttf");

    fn fixture_font() -> FontArc {
        FontArc::try_from_slice(FIXTURE_FONT).unwrap()
    }

    fn dot_mask(origin_x: i32, origin_y: i32) -> TextMask {
        let mut coverage = Plane::new(5, 5);
        coverage.data[2 * 5 + 2] = 1.0;
        TextMask { origin_x, origin_y, coverage }
    }

    #[test]
    fn garbage_font_bytes_are_rejected() {
        let err = FontSet::from_bytes(b"not a font".to_vec()).unwrap_err();
        assert!(matches!(err, CollageError::Font(_)));
    }

    #[test]
    fn empty_family_list_is_a_font_error() {
        assert!(matches!(load_first_available(&[], 400), Err(CollageError::Font(_))));
    }

    #[test]
    fn empty_font_set_has_no_fonts() {
        let set = FontSet::empty();
        assert!(set.furigana.is_none() && set.name.is_none());
        assert_eq!(format!("{:?}", set), "FontSet { furigana: false, name: false }");
    }

    #[test]
    fn em_size_maps_to_ascent_descent_scale() {
        let font = fixture_font();
        // 2048 units per em, ascent 1901, descent -483.
        let scale = em_to_px_scale(&font, 100.0);
        assert!((scale.y - 100.0 * 2384.0 / 2048.0).abs() < 1e-3);
        assert!((font.as_scaled(scale).ascent() - 100.0 * 1901.0 / 2048.0).abs() < 1e-3);
    }

    #[test]
    fn layout_advances_left_to_right() {
        let font = fixture_font();
        let (glyphs, width) = layout_line(&font, "HIH\u{7}", em_to_px_scale(&font, 100.0), 50.0);
        // The bell character is dropped.
        assert_eq!(glyphs.len(), 3);
        assert!(glyphs.windows(2).all(|g| g[0].position.x < g[1].position.x));
        assert!(glyphs.iter().all(|g| g.position.y == 50.0));
        // Advances 1714 + 762 + 1714 units.
        assert!((width - 4190.0 * 100.0 / 2048.0).abs() < 1.0, "{}", width);
    }

    #[test]
    fn line_is_top_anchored_and_centered() {
        let font = fixture_font();
        let mask = rasterize_line(&font, "HIH", 100.0, 115.0, 450.0, 0).unwrap();
        // Cap height 1493 of 2048 units: ink from about y = 134.9 down to the baseline at 207.8.
        assert!((mask.origin_y - 134).abs() <= 1, "{}", mask.origin_y);
        let bottom = mask.origin_y + mask.coverage.height as i32;
        assert!((bottom - 208).abs() <= 1, "{}", bottom);
        let center = mask.origin_x as f32 + mask.coverage.width as f32 / 2.0;
        assert!((center - 450.0).abs() <= 1.5, "{}", center);
    }

    #[test]
    fn blank_or_sizeless_labels_draw_nothing() {
        let font = fixture_font();
        let style = RenderSettings::default().name;
        let mut canvas = new_surface(Color::WHITE);
        assert!(!draw_label(&mut canvas, &font, "  \t ", &style, 450.0));
        let sizeless = TextStyle { size: f32::NAN, ..style.clone() };
        assert!(!draw_label(&mut canvas, &font, "HIH", &sizeless, 450.0));
        assert_eq!(canvas, new_surface(Color::WHITE));
    }

    #[test]
    fn real_glyphs_get_a_halo() {
        let font = fixture_font();
        let style = RenderSettings::default().name;
        let mut canvas = new_surface(Color::rgb(0, 0, 255));
        assert!(draw_label(&mut canvas, &font, "HIH", &style, 450.0));

        // Across the middle of the first H stem: blue, white rim, dark fill.
        let row: Vec<Rgba<u8>> = (300..460).map(|x| *canvas.get_pixel(x, 170)).collect();
        let first_white = row.iter().position(|p| p[0] > 250 && p[1] > 250 && p[2] > 250).unwrap();
        let first_dark = row.iter().position(|p| p[0] < 40 && p[1] < 40 && p[2] < 40).unwrap();
        assert!(first_white < first_dark);
        // The rim is half the 16-unit stroke wide.
        assert!((6..=10).contains(&(first_dark - first_white)), "{} {}", first_white, first_dark);
    }

    #[test]
    fn mask_lookup_is_offset_and_bounded() {
        let mask = dot_mask(10, 20);
        assert_eq!(mask.at(12, 22), 1.0);
        assert_eq!(mask.at(11, 22), 0.0);
        assert_eq!(mask.at(0, 0), 0.0);
        assert_eq!(mask.at(500, 500), 0.0);
    }

    #[test]
    fn stroke_then_fill_leaves_halo() {
        let mut canvas = new_surface(Color::rgb(0, 0, 255));
        let fill = dot_mask(10, 10);
        let outline = TextMask { coverage: dilate(&fill.coverage, 1.0), ..fill.clone() };
        paint_mask(&mut canvas, &outline, Color::WHITE);
        paint_mask(&mut canvas, &fill, Color::BLACK);
        assert_eq!(*canvas.get_pixel(12, 12), Rgba([0, 0, 0, 255]));
        assert_eq!(*canvas.get_pixel(13, 12), Rgba([255, 255, 255, 255]));
        assert_eq!(*canvas.get_pixel(10, 10), Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn mask_partly_off_canvas_is_clipped() {
        let mut canvas = new_surface(Color::WHITE);
        let mask = dot_mask(-2, -2);
        paint_mask(&mut canvas, &mask, Color::BLACK);
        assert_eq!(*canvas.get_pixel(0, 0), Rgba([0, 0, 0, 255]));
    }
}
