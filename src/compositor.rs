// ============================================================================
// COMPOSITOR: the ordered render pipeline
// ============================================================================
//
// Every call starts from a blank surface and runs the same five steps:
//
//   1. background fill          bg_color1 over the whole canvas
//   2. accent band              bg_color2 inside a rotated rectangle
//   3. pattern layer            secondary image, cover-fitted to the band and
//                               clipped to it; grayscale, half opacity, multiply
//   4. portrait layer           primary image, contain-fitted inside the margin,
//                               with a drop shadow beneath it
//   5. labels                   furigana, then name; stroke first, then fill
//
// Nothing here mutates its inputs, so the same configuration and images
// always produce byte-identical output.

use image::RgbaImage;

use crate::canvas::{BlendMode, PixelRect, new_surface, paint_region};
use crate::io::DecodedImage;
use crate::model::{CANVAS_HEIGHT, CANVAS_WIDTH, CollageConfiguration, Color, Transform};
use crate::ops::effects::{
    DropShadow, EffectChain, VisualEffect, composite_layer, composite_shadow, shadow_alpha,
};
use crate::ops::hit_test::primary_base_scale;
use crate::ops::text::{FontSet, draw_label};
use crate::ops::transform::{Affine, cover_scale, render_transformed};
use crate::settings::RenderSettings;

// Band geometry, in canvas units.
const BAND_ORIGIN_X: f32 = -100.0;
const BAND_ORIGIN_Y: f32 = 850.0;
const BAND_ANGLE: f32 = -10.0;
const BAND_WIDTH: f32 = 1400.0;
const BAND_TOP: f32 = -200.0;
const BAND_HEIGHT: f32 = 300.0;

/// Where the pattern is centered, in the band's own frame.
const PATTERN_ANCHOR_X: f32 = BAND_WIDTH / 2.0;
const PATTERN_ANCHOR_Y: f32 = BAND_TOP + BAND_HEIGHT / 2.0;

// ---------------------------------------------------------------------------
//  Band
// ---------------------------------------------------------------------------

/// The tilted accent strip.  Its rectangle `[0, 1400] × [-200, 100]` lives in
/// a frame translated to `(-100, 850)` and rotated by -10°.
#[derive(Clone, Copy, Debug)]
pub struct Band {
    pub frame: Affine,
    to_local: Affine,
}

impl Default for Band {
    fn default() -> Self {
        let frame = Affine::IDENTITY.translate(BAND_ORIGIN_X, BAND_ORIGIN_Y).rotate(BAND_ANGLE);
        // A pure rotation plus translation always inverts.
        let to_local = frame.invert().unwrap_or(Affine::IDENTITY);
        Self { frame, to_local }
    }
}

impl Band {
    /// Canvas pixels the band can touch.
    pub fn region(&self) -> PixelRect {
        let (min_x, min_y, max_x, max_y) = self.frame.map_rect_bounds(0.0, BAND_TOP, BAND_WIDTH, BAND_HEIGHT);
        PixelRect::covering(min_x, min_y, max_x, max_y)
    }

    /// Anti-aliased band coverage of canvas pixel `(x, y)`: the distance of the
    /// pixel center to the nearest band edge, clamped to one pixel of ramp.
    #[inline]
    pub fn coverage(&self, x: u32, y: u32) -> f32 {
        let (lx, ly) = self.to_local.apply(x as f32 + 0.5, y as f32 + 0.5);
        let cov_x = (lx.min(BAND_WIDTH - lx) + 0.5).clamp(0.0, 1.0);
        let cov_y = ((ly - BAND_TOP).min(BAND_TOP + BAND_HEIGHT - ly) + 0.5).clamp(0.0, 1.0);
        cov_x * cov_y
    }
}

// ---------------------------------------------------------------------------
//  Compositor
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default)]
pub struct Compositor {
    settings: RenderSettings,
    fonts: FontSet,
    band: Band,
}

impl Compositor {
    pub fn new(mut settings: RenderSettings, fonts: FontSet) -> Self {
        settings.clamp_ranges();
        Self { settings, fonts, band: Band::default() }
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn fonts(&self) -> &FontSet {
        &self.fonts
    }

    /// Render the full collage.  Absent images skip their layer.
    pub fn render(
        &self,
        config: &CollageConfiguration,
        primary: Option<&DecodedImage>,
        secondary: Option<&DecodedImage>,
    ) -> RgbaImage {
        let mut canvas = new_surface(config.bg_color1);

        self.draw_band(&mut canvas, config.bg_color2);
        if let Some(image) = secondary {
            self.draw_pattern(&mut canvas, image, &config.secondary_transform);
        }
        if let Some(image) = primary {
            self.draw_portrait(&mut canvas, image, &config.primary_transform);
        }
        self.draw_labels(&mut canvas, config);

        canvas
    }

    fn draw_band(&self, canvas: &mut RgbaImage, color: Color) {
        let band = &self.band;
        paint_region(canvas, band.region(), BlendMode::Normal, |x, y| {
            color.with_alpha(band.coverage(x, y))
        });
    }

    /// Full-canvas matrix of the pattern layer (image space → canvas).
    pub fn pattern_matrix(&self, image_w: u32, image_h: u32, transform: &Transform) -> Affine {
        let (iw, ih) = (image_w as f32, image_h as f32);
        let t = transform.sanitized();
        let cover = cover_scale(BAND_WIDTH, BAND_HEIGHT, iw, ih);
        self.band
            .frame
            .translate(PATTERN_ANCHOR_X + t.x, PATTERN_ANCHOR_Y + t.y)
            .rotate(t.rotation)
            .scale(t.scale * cover)
            .translate(-iw / 2.0, -ih / 2.0)
    }

    fn draw_pattern(&self, canvas: &mut RgbaImage, image: &DecodedImage, transform: &Transform) {
        let (iw, ih) = (image.width(), image.height());
        let t = transform.sanitized();
        let m = self.pattern_matrix(iw, ih, &t);

        let (min_x, min_y, max_x, max_y) = m.map_rect_bounds(0.0, 0.0, iw as f32, ih as f32);
        let region = PixelRect::covering(min_x, min_y, max_x, max_y).intersect(&self.band.region());
        if region.is_empty() {
            return;
        }

        let display_scale = t.scale * cover_scale(BAND_WIDTH, BAND_HEIGHT, iw as f32, ih as f32);
        let source = image.level_for_scale(display_scale);
        let layer = render_transformed(source, iw as f32, ih as f32, &m, region);

        let chain = EffectChain::from_effects(&[
            VisualEffect::Grayscale,
            VisualEffect::Opacity(self.settings.pattern_opacity),
            VisualEffect::MultiplyBlend,
        ]);
        let band = &self.band;
        composite_layer(canvas, &layer, region, &chain, |x, y| band.coverage(x, y));
    }

    /// Full-canvas matrix of the portrait layer, or `None` for an image
    /// without area.
    pub fn portrait_matrix(&self, image_w: u32, image_h: u32, transform: &Transform) -> Option<Affine> {
        let base = primary_base_scale(image_w, image_h, CANVAS_WIDTH, CANVAS_HEIGHT, self.settings.primary_margin)?;
        let t = transform.sanitized();
        Some(
            Affine::IDENTITY
                .translate(CANVAS_WIDTH as f32 / 2.0 + t.x, CANVAS_HEIGHT as f32 / 2.0 + t.y)
                .rotate(t.rotation)
                .scale(base * t.scale)
                .translate(-(image_w as f32) / 2.0, -(image_h as f32) / 2.0),
        )
    }

    fn draw_portrait(&self, canvas: &mut RgbaImage, image: &DecodedImage, transform: &Transform) {
        let (iw, ih) = (image.width(), image.height());
        let t = transform.sanitized();
        let Some(m) = self.portrait_matrix(iw, ih, &t) else { return };

        let display_scale = m.a.hypot(m.b);
        let source = image.level_for_scale(display_scale);
        let (min_x, min_y, max_x, max_y) = m.map_rect_bounds(0.0, 0.0, iw as f32, ih as f32);

        // The shadow is built from its own frame, which reaches past the
        // canvas so off-canvas parts of the portrait still cast onto it.
        let shadow = DropShadow::from_style(&self.settings.shadow);
        if shadow.is_visible()
            && let Some(frame) = shadow.frame(min_x, min_y, max_x, max_y)
        {
            let silhouette = render_transformed(source, iw as f32, ih as f32, &frame.source_matrix(&m), frame.source_rect());
            let coverage = shadow_alpha(&silhouette, &shadow);
            composite_shadow(canvas, &coverage, &frame, &shadow);
        }

        let region = PixelRect::covering(min_x, min_y, max_x, max_y);
        if region.is_empty() {
            return;
        }
        let layer = render_transformed(source, iw as f32, ih as f32, &m, region);
        composite_layer(canvas, &layer, region, &EffectChain::default(), |_, _| 1.0);
    }

    fn draw_labels(&self, canvas: &mut RgbaImage, config: &CollageConfiguration) {
        let center_x = CANVAS_WIDTH as f32 / 2.0;
        if let Some(font) = &self.fonts.furigana {
            draw_label(canvas, font, &config.furigana, &self.settings.furigana, center_x);
        }
        if let Some(font) = &self.fonts.name {
            draw_label(canvas, font, &config.name, &self.settings.name, center_x);
        }
    }
}
