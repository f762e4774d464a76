// ============================================================================
// CANVAS: screen/canvas coordinate mapping, pixel regions and blending
// ============================================================================

use egui::{Pos2, Rect};
use image::{Rgba, RgbaImage};
use rayon::prelude::*;

use crate::model::{CANVAS_HEIGHT, CANVAS_WIDTH, Color};

// ---------------------------------------------------------------------------
//  Coordinate mapping
// ---------------------------------------------------------------------------

/// Converts a pointer position in display (screen) space to canvas space.
///
/// `bounds` is where the canvas element is currently displayed; its size may
/// differ from the fixed internal resolution when the element is scaled for
/// layout.  Returns the origin when the surface is not mounted (or has
/// collapsed to zero area).
pub fn to_canvas_space(pointer: Pos2, bounds: Option<Rect>, canvas_w: u32, canvas_h: u32) -> Pos2 {
    let Some(bounds) = bounds else { return Pos2::ZERO };
    if bounds.width() <= 0.0 || bounds.height() <= 0.0 {
        return Pos2::ZERO;
    }
    let scale_x = canvas_w as f32 / bounds.width();
    let scale_y = canvas_h as f32 / bounds.height();
    Pos2::new(
        (pointer.x - bounds.min.x) * scale_x,
        (pointer.y - bounds.min.y) * scale_y,
    )
}

// ---------------------------------------------------------------------------
//  Pixel regions
// ---------------------------------------------------------------------------

/// Half-open pixel rectangle `[x0, x1) × [y0, y1)` inside the canvas.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelRect {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl PixelRect {
    pub const EMPTY: PixelRect = PixelRect { x0: 0, y0: 0, x1: 0, y1: 0 };

    /// Smallest pixel rect covering the float bounds, clipped to the canvas.
    pub fn covering(min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Self {
        if !(min_x.is_finite() && min_y.is_finite() && max_x.is_finite() && max_y.is_finite()) {
            return Self::EMPTY;
        }
        let clip = |v: f32, hi: u32| v.clamp(0.0, hi as f32) as u32;
        let r = PixelRect {
            x0: clip(min_x.floor(), CANVAS_WIDTH),
            y0: clip(min_y.floor(), CANVAS_HEIGHT),
            x1: clip(max_x.ceil(), CANVAS_WIDTH),
            y1: clip(max_y.ceil(), CANVAS_HEIGHT),
        };
        if r.is_empty() { Self::EMPTY } else { r }
    }

    pub fn is_empty(&self) -> bool {
        self.x0 >= self.x1 || self.y0 >= self.y1
    }

    pub fn width(&self) -> u32 {
        self.x1.saturating_sub(self.x0)
    }

    pub fn height(&self) -> u32 {
        self.y1.saturating_sub(self.y0)
    }

    pub fn intersect(&self, other: &PixelRect) -> Self {
        let r = PixelRect {
            x0: self.x0.max(other.x0),
            y0: self.y0.max(other.y0),
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
        };
        if r.is_empty() { Self::EMPTY } else { r }
    }
}

// ---------------------------------------------------------------------------
//  Surface painting
// ---------------------------------------------------------------------------

/// A fresh canvas-sized surface flooded with `color`.
pub fn new_surface(color: Color) -> RgbaImage {
    RgbaImage::from_pixel(CANVAS_WIDTH, CANVAS_HEIGHT, color.to_rgba())
}

/// Blend a source pixel produced by `shader(x, y)` onto every pixel of
/// `region`, row-parallel.  The shader returns straight-alpha RGBA with any
/// coverage or opacity already folded into alpha.
pub fn paint_region<F>(surface: &mut RgbaImage, region: PixelRect, mode: BlendMode, shader: F)
where
    F: Fn(u32, u32) -> Rgba<u8> + Sync,
{
    let region = region_within(surface, region);
    if region.is_empty() {
        return;
    }
    let row_bytes = surface.width() as usize * 4;
    let raw: &mut [u8] = surface;

    raw.par_chunks_mut(row_bytes)
        .enumerate()
        .skip(region.y0 as usize)
        .take(region.height() as usize)
        .for_each(|(y, row)| {
            for x in region.x0..region.x1 {
                let top = shader(x, y as u32);
                if top[3] == 0 {
                    continue;
                }
                let pi = x as usize * 4;
                let base = Rgba([row[pi], row[pi + 1], row[pi + 2], row[pi + 3]]);
                let out = blend_pixel(base, top, mode, 1.0);
                row[pi..pi + 4].copy_from_slice(&out.0);
            }
        });
}

fn region_within(surface: &RgbaImage, r: PixelRect) -> PixelRect {
    let clipped = PixelRect {
        x0: r.x0.min(surface.width()),
        y0: r.y0.min(surface.height()),
        x1: r.x1.min(surface.width()),
        y1: r.y1.min(surface.height()),
    };
    if clipped.is_empty() { PixelRect::EMPTY } else { clipped }
}

// ---------------------------------------------------------------------------
//  Blending
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
}

/// Source-over composite of `top` onto `base` with the given blend mode.
pub fn blend_pixel(base: Rgba<u8>, top: Rgba<u8>, mode: BlendMode, opacity: f32) -> Rgba<u8> {
    // Fast path: fully transparent top pixel, nothing to blend
    if top[3] == 0 {
        return base;
    }

    // Fast path: Normal blend, full opacity, fully opaque top pixel, just overwrite
    if matches!(mode, BlendMode::Normal) && opacity >= 1.0 && top[3] == 255 {
        return top;
    }

    let opacity = opacity.clamp(0.0, 1.0);

    let base_r = base[0] as f32 / 255.0;
    let base_g = base[1] as f32 / 255.0;
    let base_b = base[2] as f32 / 255.0;
    let base_a = base[3] as f32 / 255.0;

    let top_r = top[0] as f32 / 255.0;
    let top_g = top[1] as f32 / 255.0;
    let top_b = top[2] as f32 / 255.0;
    let top_a = (top[3] as f32 / 255.0) * opacity;

    // Separable blend against the backdrop; where the backdrop is transparent
    // the source color shows through unchanged.
    let (r, g, b) = match mode {
        BlendMode::Normal => (top_r, top_g, top_b),
        BlendMode::Multiply => (
            mix(top_r, base_r * top_r, base_a),
            mix(top_g, base_g * top_g, base_a),
            mix(top_b, base_b * top_b, base_a),
        ),
    };

    let out_a = top_a + base_a * (1.0 - top_a);
    if out_a == 0.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let out_r = (r * top_a + base_r * base_a * (1.0 - top_a)) / out_a;
    let out_g = (g * top_a + base_g * base_a * (1.0 - top_a)) / out_a;
    let out_b = (b * top_a + base_b * base_a * (1.0 - top_a)) / out_a;

    Rgba([
        (out_r * 255.0).round().clamp(0.0, 255.0) as u8,
        (out_g * 255.0).round().clamp(0.0, 255.0) as u8,
        (out_b * 255.0).round().clamp(0.0, 255.0) as u8,
        (out_a * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}

#[inline]
fn mix(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

#[cfg(test)]
mod tests {
    use super::*;
    use egui::Vec2;

    #[test]
    fn unmounted_surface_maps_to_origin() {
        assert_eq!(to_canvas_space(Pos2::new(120.0, 40.0), None, 900, 1200), Pos2::ZERO);
        let collapsed = Rect::from_min_size(Pos2::new(10.0, 10.0), Vec2::ZERO);
        assert_eq!(to_canvas_space(Pos2::new(10.0, 10.0), Some(collapsed), 900, 1200), Pos2::ZERO);
    }

    #[test]
    fn half_size_display_doubles_deltas() {
        let bounds = Rect::from_min_size(Pos2::new(100.0, 50.0), Vec2::new(450.0, 600.0));
        let a = to_canvas_space(Pos2::new(200.0, 150.0), Some(bounds), 900, 1200);
        let b = to_canvas_space(Pos2::new(210.0, 160.0), Some(bounds), 900, 1200);
        assert_eq!(a, Pos2::new(200.0, 200.0));
        assert_eq!(b - a, Vec2::new(20.0, 20.0));
    }

    #[test]
    fn covering_clips_to_canvas() {
        let r = PixelRect::covering(-20.5, 10.2, 950.0, 30.0);
        assert_eq!(r, PixelRect { x0: 0, y0: 10, x1: CANVAS_WIDTH, y1: 30 });
        assert!(PixelRect::covering(1000.0, 0.0, 1100.0, 10.0).is_empty());
        assert!(PixelRect::covering(f32::NAN, 0.0, 10.0, 10.0).is_empty());
    }

    #[test]
    fn intersect_clips_or_empties() {
        let r = PixelRect { x0: 10, y0: 10, x1: 20, y1: 20 };
        assert_eq!(
            r.intersect(&PixelRect { x0: 15, y0: 0, x1: 40, y1: 12 }),
            PixelRect { x0: 15, y0: 10, x1: 20, y1: 12 }
        );
        assert!(r.intersect(&PixelRect { x0: 30, y0: 30, x1: 40, y1: 40 }).is_empty());
    }

    #[test]
    fn multiply_darkens_opaque_backdrop() {
        let base = Rgba([200, 100, 50, 255]);
        let top = Rgba([128, 128, 128, 255]);
        let out = blend_pixel(base, top, BlendMode::Multiply, 1.0);
        assert_eq!(out, Rgba([100, 50, 25, 255]));
    }

    #[test]
    fn half_opacity_normal_is_midpoint() {
        let out = blend_pixel(Rgba([0, 0, 0, 255]), Rgba([255, 255, 255, 255]), BlendMode::Normal, 0.5);
        assert_eq!(out, Rgba([128, 128, 128, 255]));
    }

    #[test]
    fn paint_region_touches_only_region() {
        let mut surface = new_surface(Color::WHITE);
        let region = PixelRect { x0: 2, y0: 3, x1: 5, y1: 4 };
        paint_region(&mut surface, region, BlendMode::Normal, |_, _| Rgba([0, 0, 0, 255]));
        assert_eq!(*surface.get_pixel(2, 3), Rgba([0, 0, 0, 255]));
        assert_eq!(*surface.get_pixel(4, 3), Rgba([0, 0, 0, 255]));
        assert_eq!(*surface.get_pixel(5, 3), Rgba([255, 255, 255, 255]));
        assert_eq!(*surface.get_pixel(2, 4), Rgba([255, 255, 255, 255]));
    }
}
