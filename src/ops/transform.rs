// ============================================================================
// TRANSFORM OPERATIONS: 2D affine frames and resampled image drawing
// ============================================================================

use image::{Rgba, RgbaImage};
use rayon::prelude::*;

use crate::canvas::PixelRect;

/// 2D affine matrix using the canvas convention:
/// `x' = a·x + c·y + e`, `y' = b·x + d·y + f`.
///
/// The builder methods (`translate`, `rotate`, `scale`) append to the current
/// frame the same way a 2D drawing context does, so
/// `IDENTITY.translate(..).rotate(..)` rotates first and translates last when
/// applied to a point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Affine {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl Default for Affine {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Affine {
    pub const IDENTITY: Affine = Affine { a: 1.0, b: 0.0, c: 0.0, d: 1.0, e: 0.0, f: 0.0 };

    pub fn translation(tx: f32, ty: f32) -> Self {
        Affine { e: tx, f: ty, ..Self::IDENTITY }
    }

    /// Clockwise on screen for positive degrees (y axis points down).
    pub fn rotation_degrees(deg: f32) -> Self {
        let (s, c) = deg.to_radians().sin_cos();
        Affine { a: c, b: s, c: -s, d: c, e: 0.0, f: 0.0 }
    }

    pub fn scaling(s: f32) -> Self {
        Affine { a: s, d: s, ..Self::IDENTITY }
    }

    /// `self ∘ rhs`: applies `rhs` first, then `self`.
    pub fn then(&self, rhs: &Affine) -> Affine {
        Affine {
            a: self.a * rhs.a + self.c * rhs.b,
            b: self.b * rhs.a + self.d * rhs.b,
            c: self.a * rhs.c + self.c * rhs.d,
            d: self.b * rhs.c + self.d * rhs.d,
            e: self.a * rhs.e + self.c * rhs.f + self.e,
            f: self.b * rhs.e + self.d * rhs.f + self.f,
        }
    }

    pub fn translate(&self, tx: f32, ty: f32) -> Affine {
        self.then(&Affine::translation(tx, ty))
    }

    pub fn rotate(&self, deg: f32) -> Affine {
        self.then(&Affine::rotation_degrees(deg))
    }

    pub fn scale(&self, s: f32) -> Affine {
        self.then(&Affine::scaling(s))
    }

    #[inline]
    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (self.a * x + self.c * y + self.e, self.b * x + self.d * y + self.f)
    }

    /// Inverse matrix, or `None` when the frame is degenerate.
    pub fn invert(&self) -> Option<Affine> {
        let det = self.a * self.d - self.b * self.c;
        if !det.is_finite() || det.abs() < 1e-12 {
            return None;
        }
        let inv = 1.0 / det;
        Some(Affine {
            a: self.d * inv,
            b: -self.b * inv,
            c: -self.c * inv,
            d: self.a * inv,
            e: (self.c * self.f - self.d * self.e) * inv,
            f: (self.b * self.e - self.a * self.f) * inv,
        })
    }

    /// Axis-aligned bounds `(min_x, min_y, max_x, max_y)` of the rectangle
    /// `[x, x+w] × [y, y+h]` after mapping.
    pub fn map_rect_bounds(&self, x: f32, y: f32, w: f32, h: f32) -> (f32, f32, f32, f32) {
        let corners = [
            self.apply(x, y),
            self.apply(x + w, y),
            self.apply(x, y + h),
            self.apply(x + w, y + h),
        ];
        corners.iter().fold(
            (f32::MAX, f32::MAX, f32::MIN, f32::MIN),
            |(min_x, min_y, max_x, max_y), &(px, py)| {
                (min_x.min(px), min_y.min(py), max_x.max(px), max_y.max(py))
            },
        )
    }
}

/// Largest uniform scale that fits `img` inside `avail` (aspect preserved).
pub fn contain_scale(avail_w: f32, avail_h: f32, img_w: f32, img_h: f32) -> f32 {
    (avail_w / img_w).min(avail_h / img_h)
}

/// Smallest uniform scale at which `img` fully covers `area` (overflow cropped).
pub fn cover_scale(area_w: f32, area_h: f32, img_w: f32, img_h: f32) -> f32 {
    (area_w / img_w).max(area_h / img_h)
}

/// Resample `src` through `to_canvas` into a straight-alpha buffer the size of
/// `region` (pixel `(0,0)` of the result is canvas pixel `(region.x0, region.y0)`).
///
/// `to_canvas` maps *logical* source coordinates `[0, logical_w] × [0, logical_h]`
/// to the canvas; `src` may be a reduced level of detail of that logical image,
/// sample positions are rescaled accordingly.  Pixels outside the source are
/// transparent.
pub fn render_transformed(
    src: &RgbaImage,
    logical_w: f32,
    logical_h: f32,
    to_canvas: &Affine,
    region: PixelRect,
) -> RgbaImage {
    let out_w = region.width();
    let out_h = region.height();
    let mut dst = RgbaImage::new(out_w, out_h);
    if out_w == 0 || out_h == 0 || src.width() == 0 || src.height() == 0 {
        return dst;
    }
    let Some(inv) = to_canvas.invert() else { return dst };

    let level_x = src.width() as f32 / logical_w;
    let level_y = src.height() as f32 / logical_h;
    let row_bytes = out_w as usize * 4;
    let dst_raw: &mut [u8] = &mut dst;

    dst_raw.par_chunks_mut(row_bytes).enumerate().for_each(|(dy, row)| {
        let cy = (region.y0 as usize + dy) as f32 + 0.5;
        for dx in 0..out_w as usize {
            let cx = (region.x0 as usize + dx) as f32 + 0.5;
            let (u, v) = inv.apply(cx, cy);
            let px = sample_bilinear(src, u * level_x, v * level_y);
            if px[3] == 0 {
                continue;
            }
            row[dx * 4..dx * 4 + 4].copy_from_slice(&px.0);
        }
    });
    dst
}

/// Bilinear sample at continuous source position `(x, y)`; pixel `i` spans
/// `[i, i+1)` with its center at `i + 0.5`.  Interpolates premultiplied so
/// transparent neighbours don't darken edges.
pub fn sample_bilinear(img: &RgbaImage, x: f32, y: f32) -> Rgba<u8> {
    let sx = x - 0.5;
    let sy = y - 0.5;
    if !sx.is_finite() || !sy.is_finite() {
        return Rgba([0, 0, 0, 0]);
    }
    let w = img.width() as i32;
    let h = img.height() as i32;
    let x0 = sx.floor() as i32;
    let y0 = sy.floor() as i32;
    if x0 < -1 || y0 < -1 || x0 >= w || y0 >= h {
        return Rgba([0, 0, 0, 0]);
    }
    let fx = sx - x0 as f32;
    let fy = sy - y0 as f32;

    let tap = |tx: i32, ty: i32| -> [f32; 4] {
        if tx < 0 || ty < 0 || tx >= w || ty >= h {
            [0.0; 4]
        } else {
            let p = img.get_pixel(tx as u32, ty as u32);
            let a = p[3] as f32 / 255.0;
            [p[0] as f32 * a, p[1] as f32 * a, p[2] as f32 * a, p[3] as f32]
        }
    };

    let tl = tap(x0, y0);
    let tr = tap(x0 + 1, y0);
    let bl = tap(x0, y0 + 1);
    let br = tap(x0 + 1, y0 + 1);

    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    let mut acc = [0.0f32; 4];
    for c in 0..4 {
        let top = lerp(tl[c], tr[c], fx);
        let bot = lerp(bl[c], br[c], fx);
        acc[c] = lerp(top, bot, fy);
    }

    let alpha = acc[3].round().clamp(0.0, 255.0);
    if alpha <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }
    let unpremul = 255.0 / acc[3];
    Rgba([
        (acc[0] * unpremul).round().clamp(0.0, 255.0) as u8,
        (acc[1] * unpremul).round().clamp(0.0, 255.0) as u8,
        (acc[2] * unpremul).round().clamp(0.0, 255.0) as u8,
        alpha as u8,
    ])
}
