// ============================================================================
// FILTERS: separable Gaussian blur and morphological dilation on coverage maps
// ============================================================================
//
// Both filters run on single-channel f32 planes (alpha / glyph coverage),
// row-parallel via rayon.  Out-of-range taps clamp to the nearest edge.

use rayon::prelude::*;

/// Row-major single-channel plane.
#[derive(Clone, Debug, PartialEq)]
pub struct Plane {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
}

impl Plane {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height, data: vec![0.0; width * height] }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }
}

/// Build a 1-D Gaussian kernel truncated at ceil(3*sigma).
fn build_gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = (sigma * 3.0).ceil() as usize;
    if radius == 0 {
        return vec![1.0];
    }
    let len = radius * 2 + 1;
    let mut kernel = vec![0.0f32; len];
    let s2 = 2.0 * sigma * sigma;
    let mut sum = 0.0f32;
    for (i, k) in kernel.iter_mut().enumerate() {
        let x = i as f32 - radius as f32;
        let v = (-x * x / s2).exp();
        *k = v;
        sum += v;
    }
    let inv = 1.0 / sum;
    for v in &mut kernel {
        *v *= inv;
    }
    kernel
}

/// Gaussian blur of a plane.  Sigmas below half a pixel return a copy, sigmas
/// wider than the plane are capped to its longest side.
pub fn gaussian_blur(src: &Plane, sigma: f32) -> Plane {
    let w = src.width;
    let h = src.height;
    if w == 0 || h == 0 || !sigma.is_finite() || sigma < 0.5 {
        return src.clone();
    }
    let sigma = sigma.min(w.max(h) as f32);

    let kernel = build_gaussian_kernel(sigma);
    let radius = kernel.len() / 2;

    // --- Horizontal pass (parallel by row) ---
    let mut buf_h = vec![0.0f32; w * h];
    buf_h.par_chunks_mut(w).enumerate().for_each(|(y, row_out)| {
        let row_in = &src.data[y * w..(y + 1) * w];
        for (x, out) in row_out.iter_mut().enumerate() {
            let mut acc = 0.0f32;
            for (ki, &kv) in kernel.iter().enumerate() {
                let sx = (x as isize + ki as isize - radius as isize).clamp(0, w as isize - 1) as usize;
                acc += row_in[sx] * kv;
            }
            *out = acc;
        }
    });

    // --- Vertical pass (parallel by row) ---
    let mut buf_v = vec![0.0f32; w * h];
    buf_v.par_chunks_mut(w).enumerate().for_each(|(y, row_out)| {
        for (x, out) in row_out.iter_mut().enumerate() {
            let mut acc = 0.0f32;
            for (ki, &kv) in kernel.iter().enumerate() {
                let sy = (y as isize + ki as isize - radius as isize).clamp(0, h as isize - 1) as usize;
                acc += buf_h[sy * w + x] * kv;
            }
            *out = acc;
        }
    });

    Plane { width: w, height: h, data: buf_v }
}

/// Grow a coverage plane by `radius` pixels using a disk-shaped max filter.
///
/// Coverage is kept in full out to `radius` and ramps to zero over the next
/// pixel: a tap at distance `d` contributes `coverage · clamp(radius + 1 − d, 0, 1)`.
pub fn dilate(src: &Plane, radius: f32) -> Plane {
    let w = src.width;
    let h = src.height;
    if w == 0 || h == 0 || !radius.is_finite() || radius <= 0.0 {
        return src.clone();
    }

    let reach = (radius + 1.0).ceil() as isize;
    let mut taps: Vec<(isize, isize, f32)> = Vec::new();
    for dy in -reach..=reach {
        for dx in -reach..=reach {
            let d = ((dx * dx + dy * dy) as f32).sqrt();
            let weight = (radius + 1.0 - d).clamp(0.0, 1.0);
            if weight > 0.0 {
                taps.push((dx, dy, weight));
            }
        }
    }

    let mut out = vec![0.0f32; w * h];
    out.par_chunks_mut(w).enumerate().for_each(|(y, row_out)| {
        for (x, cell) in row_out.iter_mut().enumerate() {
            let mut best = 0.0f32;
            for &(dx, dy, weight) in &taps {
                let sx = x as isize + dx;
                let sy = y as isize + dy;
                if sx < 0 || sy < 0 || sx >= w as isize || sy >= h as isize {
                    continue;
                }
                let v = src.data[sy as usize * w + sx as usize] * weight;
                if v > best {
                    best = v;
                    if best >= 1.0 {
                        break;
                    }
                }
            }
            *cell = best;
        }
    });

    Plane { width: w, height: h, data: out }
}
