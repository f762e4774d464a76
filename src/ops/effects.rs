// ============================================================================
// EFFECTS: per-layer visual effects and drop shadow
// ============================================================================
//
// Layers are rendered into region-sized straight-alpha buffers (see
// `ops::transform::render_transformed`) and then composited onto the canvas
// through the helpers here.  Effects are a small closed set, resolved into a
// fixed order regardless of how they were listed:
//
//   1. grayscale      (BT.709 luma)
//   2. opacity        (multiplies alpha, repeated entries multiply together)
//   3. blend mode     (how the result meets the pixels beneath)

use image::{Rgba, RgbaImage};

use crate::canvas::{BlendMode, PixelRect, paint_region};
use crate::ops::filters::{Plane, gaussian_blur};
use crate::ops::transform::Affine;
use crate::settings::{MAX_SHADOW_BLUR, MAX_SHADOW_OFFSET, ShadowStyle};

/// One named visual effect applied to a whole layer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum VisualEffect {
    Grayscale,
    Opacity(f32),
    MultiplyBlend,
}

/// A set of [`VisualEffect`]s resolved into the fixed application order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EffectChain {
    pub grayscale: bool,
    pub opacity: f32,
    pub blend: BlendMode,
}

impl Default for EffectChain {
    fn default() -> Self {
        Self { grayscale: false, opacity: 1.0, blend: BlendMode::Normal }
    }
}

impl EffectChain {
    pub fn from_effects(effects: &[VisualEffect]) -> Self {
        let mut chain = Self::default();
        for effect in effects {
            match *effect {
                VisualEffect::Grayscale => chain.grayscale = true,
                VisualEffect::Opacity(o) => {
                    let o = if o.is_finite() { o.clamp(0.0, 1.0) } else { 1.0 };
                    chain.opacity *= o;
                }
                VisualEffect::MultiplyBlend => chain.blend = BlendMode::Multiply,
            }
        }
        chain
    }

    /// Steps 1 and 2 on a single straight-alpha pixel.  The blend mode is
    /// applied later, at composite time.
    #[inline]
    pub fn apply(&self, px: Rgba<u8>) -> Rgba<u8> {
        let mut out = if self.grayscale { grayscale_pixel(px) } else { px };
        if self.opacity < 1.0 {
            out[3] = (out[3] as f32 * self.opacity).round() as u8;
        }
        out
    }
}

/// Rec. 709 luma, alpha untouched.
#[inline]
pub fn grayscale_pixel(px: Rgba<u8>) -> Rgba<u8> {
    let l = 0.2126 * px[0] as f32 + 0.7152 * px[1] as f32 + 0.0722 * px[2] as f32;
    let l = l.round().clamp(0.0, 255.0) as u8;
    Rgba([l, l, l, px[3]])
}

/// Composite a region-sized layer buffer onto `canvas`.
///
/// `layer` pixel `(0,0)` corresponds to canvas pixel `(region.x0, region.y0)`.
/// `clip(x, y)` returns the clip coverage in `[0,1]` at a canvas pixel.
pub fn composite_layer<C>(
    canvas: &mut RgbaImage,
    layer: &RgbaImage,
    region: PixelRect,
    chain: &EffectChain,
    clip: C,
) where
    C: Fn(u32, u32) -> f32 + Sync,
{
    if layer.width() != region.width() || layer.height() != region.height() {
        return;
    }
    paint_region(canvas, region, chain.blend, |x, y| {
        let px = *layer.get_pixel(x - region.x0, y - region.y0);
        if px[3] == 0 {
            return px;
        }
        let mut px = chain.apply(px);
        let cov = clip(x, y);
        if cov < 1.0 {
            px[3] = (px[3] as f32 * cov.max(0.0)).round() as u8;
        }
        px
    });
}

// ---------------------------------------------------------------------------
//  Drop shadow
// ---------------------------------------------------------------------------

/// Drop shadow resolved to pixel units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DropShadow {
    pub offset_x: i32,
    pub offset_y: i32,
    pub sigma: f32,
    /// Shadow color with its opacity folded into alpha.
    pub color: Rgba<u8>,
}

impl DropShadow {
    /// The blur extent is treated like a CSS blur length: sigma is half of it.
    pub fn from_style(style: &ShadowStyle) -> Self {
        let bounded = |v: f32, hi: f32| if v.is_finite() { v.clamp(-hi, hi) } else { 0.0 };
        Self {
            offset_x: bounded(style.offset_x, MAX_SHADOW_OFFSET).round() as i32,
            offset_y: bounded(style.offset_y, MAX_SHADOW_OFFSET).round() as i32,
            sigma: bounded(style.blur, MAX_SHADOW_BLUR).max(0.0) / 2.0,
            color: style.color.with_alpha(style.opacity),
        }
    }

    /// Distance past which the blur no longer spreads coverage, plus one pixel.
    pub fn blur_reach(&self) -> u32 {
        let sigma = if self.sigma.is_finite() { self.sigma.clamp(0.0, MAX_SHADOW_BLUR) } else { 0.0 };
        (sigma * 3.0).ceil() as u32 + 1
    }

    pub fn is_visible(&self) -> bool {
        self.color[3] > 0
    }

    /// Where the shadow of a layer with canvas bounds `(min_x, min_y, max_x, max_y)`
    /// lands, and the frame its coverage is computed in.  `None` when the
    /// shadow misses the canvas.
    pub fn frame(&self, min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Option<ShadowFrame> {
        let reach = self.blur_reach();
        let r = reach as f32;
        let (ox, oy) = (self.offset_x as f32, self.offset_y as f32);
        let region = PixelRect::covering(min_x + ox - r, min_y + oy - r, max_x + ox + r, max_y + oy + r);
        if region.is_empty() {
            return None;
        }
        let reach_i = reach as i32;
        Some(ShadowFrame {
            region,
            source_x: (region.x0 as i32).saturating_sub(reach_i).saturating_sub(self.offset_x),
            source_y: (region.y0 as i32).saturating_sub(reach_i).saturating_sub(self.offset_y),
            width: region.width().saturating_add(reach.saturating_mul(2)),
            height: region.height().saturating_add(reach.saturating_mul(2)),
            reach,
        })
    }
}

/// Geometry of one shadow pass.
///
/// The layer is rendered into a `width × height` frame whose top-left sits at
/// canvas position `(source_x, source_y)`.  That frame is `region` grown by the
/// blur reach and moved back by the shadow offset, so the frame's alpha placed
/// at `region`'s origin minus the reach is already the offset silhouette, and
/// the blur never reads past the frame edge for a pixel inside `region`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShadowFrame {
    /// Canvas pixels the shadow may touch.
    pub region: PixelRect,
    pub source_x: i32,
    pub source_y: i32,
    pub width: u32,
    pub height: u32,
    reach: u32,
}

impl ShadowFrame {
    /// Map from canvas space into frame space, composed after `to_canvas`.
    pub fn source_matrix(&self, to_canvas: &Affine) -> Affine {
        Affine::translation(-(self.source_x as f32), -(self.source_y as f32)).then(to_canvas)
    }

    /// The whole frame as a pixel rect in its own coordinates.
    pub fn source_rect(&self) -> PixelRect {
        PixelRect { x0: 0, y0: 0, x1: self.width, y1: self.height }
    }
}

/// Shadow coverage from a layer rendered over a [`ShadowFrame`]'s source
/// frame: the layer's alpha, blurred.  Same dimensions as `layer`.
pub fn shadow_alpha(layer: &RgbaImage, shadow: &DropShadow) -> Plane {
    let plane = Plane {
        width: layer.width() as usize,
        height: layer.height() as usize,
        data: layer.pixels().map(|p| p[3] as f32 / 255.0).collect(),
    };
    gaussian_blur(&plane, shadow.sigma)
}

/// Paint a shadow coverage plane (as produced by [`shadow_alpha`]) onto the canvas.
pub fn composite_shadow(canvas: &mut RgbaImage, coverage: &Plane, frame: &ShadowFrame, shadow: &DropShadow) {
    if coverage.width != frame.width as usize || coverage.height != frame.height as usize {
        return;
    }
    let region = frame.region;
    let reach = frame.reach;
    let base_alpha = shadow.color[3] as f32;
    paint_region(canvas, region, BlendMode::Normal, |x, y| {
        let cov = coverage.get((x - region.x0 + reach) as usize, (y - region.y0 + reach) as usize);
        let a = (cov.clamp(0.0, 1.0) * base_alpha).round() as u8;
        Rgba([shadow.color[0], shadow.color[1], shadow.color[2], a])
    });
}
