//! Gaussian image pyramid with per-level gradients.
//!
//! Level 0 is the input frame. Each subsequent level applies a separable
//! 5-tap binomial low-pass (`[1, 4, 6, 4, 1] / 16`, replicated borders) and
//! keeps every second pixel, so level `k` is `width >> k` by `height >> k` and
//! a level-0 coordinate `p` maps to `p * 2^-k`.
//!
//! Gradients are 3x3 Scharr responses normalized by 1/32, i.e. intensity change
//! per pixel at that level.

use image::Luma;
use log::{debug, trace};

use crate::error::{FlowError, Result};
use crate::img::image_utils::clamped_luma;
use crate::img::Frame;

const BINOMIAL_5TAP: [f32; 5] = [0.0625, 0.25, 0.375, 0.25, 0.0625];

#[derive(Debug, Clone)]
pub struct PyramidLevel {
    pub octave: usize,
    pub scale: f32,
    pub image: Frame,
    pub grad_x: Frame,
    pub grad_y: Frame,
}

impl PyramidLevel {
    fn new(octave: usize, image: Frame) -> Self {
        let (grad_x, grad_y) = scharr_gradients(&image);
        Self {
            octave,
            scale: 1.0 / (1u32 << octave) as f32,
            image,
            grad_x,
            grad_y,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

#[derive(Debug, Clone)]
pub struct Pyramid {
    levels: Vec<PyramidLevel>,
}

impl Pyramid {
    pub fn levels(&self) -> &[PyramidLevel] {
        &self.levels
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn base(&self) -> &PyramidLevel {
        &self.levels[0]
    }
}

/// Builds a pyramid with `levels` levels (level 0 included).
///
/// Both frame dimensions must be at least `2^levels` so the coarsest level
/// keeps a usable extent.
pub fn build_pyramid(base: &Frame, levels: usize) -> Result<Pyramid> {
    if levels == 0 {
        return Err(FlowError::InvalidConfig(
            "pyramid must contain at least one level".into(),
        ));
    }
    let (width, height) = base.dimensions();
    let min_extent = 1u64 << levels.min(63);
    if (width as u64) < min_extent || (height as u64) < min_extent {
        return Err(FlowError::InvalidDimensions {
            width,
            height,
            levels,
        });
    }

    debug!("Building pyramid with {levels} levels from {width}x{height} frame");

    let mut out = Vec::with_capacity(levels);
    out.push(PyramidLevel::new(0, base.clone()));

    for octave in 1..levels {
        trace!("Processing octave {octave}");
        let prev = &out[octave - 1].image;
        let next = downsample(prev);
        out.push(PyramidLevel::new(octave, next));
    }

    Ok(Pyramid { levels: out })
}

/// Blurs with the binomial kernel and keeps even pixels.
pub fn downsample(src: &Frame) -> Frame {
    let blurred = blur_binomial(src);
    let (w, h) = src.dimensions();
    Frame::from_fn((w >> 1).max(1), (h >> 1).max(1), |x, y| {
        *blurred.get_pixel((2 * x).min(w - 1), (2 * y).min(h - 1))
    })
}

/// Separable 5-tap binomial blur with replicated borders.
pub fn blur_binomial(src: &Frame) -> Frame {
    let (w, h) = src.dimensions();
    let horizontal = Frame::from_fn(w, h, |x, y| {
        let v = BINOMIAL_5TAP
            .iter()
            .enumerate()
            .map(|(k, tap)| tap * clamped_luma(src, x as i64 + k as i64 - 2, y as i64))
            .sum::<f32>();
        Luma([v])
    });
    Frame::from_fn(w, h, |x, y| {
        let v = BINOMIAL_5TAP
            .iter()
            .enumerate()
            .map(|(k, tap)| tap * clamped_luma(&horizontal, x as i64, y as i64 + k as i64 - 2))
            .sum::<f32>();
        Luma([v])
    })
}

/// Normalized Scharr derivatives `(d/dx, d/dy)` with replicated borders.
pub fn scharr_gradients(src: &Frame) -> (Frame, Frame) {
    let (w, h) = src.dimensions();
    let at = |x: u32, y: u32, dx: i64, dy: i64| clamped_luma(src, x as i64 + dx, y as i64 + dy);
    let grad_x = Frame::from_fn(w, h, |x, y| {
        let v = 3.0 * (at(x, y, 1, -1) - at(x, y, -1, -1))
            + 10.0 * (at(x, y, 1, 0) - at(x, y, -1, 0))
            + 3.0 * (at(x, y, 1, 1) - at(x, y, -1, 1));
        Luma([v / 32.0])
    });
    let grad_y = Frame::from_fn(w, h, |x, y| {
        let v = 3.0 * (at(x, y, -1, 1) - at(x, y, -1, -1))
            + 10.0 * (at(x, y, 0, 1) - at(x, y, 0, -1))
            + 3.0 * (at(x, y, 1, 1) - at(x, y, 1, -1));
        Luma([v / 32.0])
    });
    (grad_x, grad_y)
}
