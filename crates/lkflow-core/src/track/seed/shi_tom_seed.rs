use crate::error::{FlowError, Result};
use crate::img::pyramid::scharr_gradients;
use crate::img::Frame;
use crate::track::seed::utils::radius_nms;
use crate::track::seed::{FeatureSeed, FeatureSeederTrait};
use log::debug;
use nalgebra::Vector2;
use rayon::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShiTomasiConfig {
    /// Upper bound on the number of returned corners.
    pub max_corners: usize,
    /// Fraction of the strongest response a corner must exceed.
    pub quality_level: f32,
    /// Minimum Euclidean distance between returned corners (pixels).
    pub min_distance: f32,
    /// Side of the structure-tensor neighbourhood (pixels).
    pub block_size: usize,
}

impl Default for ShiTomasiConfig {
    fn default() -> Self {
        Self {
            max_corners: 100,
            quality_level: 0.3,
            min_distance: 7.0,
            block_size: 7,
        }
    }
}

impl ShiTomasiConfig {
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(FlowError::InvalidConfig("block_size must be >= 1".into()));
        }
        if !(0.0..=1.0).contains(&self.quality_level) {
            return Err(FlowError::InvalidConfig(format!(
                "quality_level {} outside [0, 1]",
                self.quality_level
            )));
        }
        if !(self.min_distance >= 0.0) {
            return Err(FlowError::InvalidConfig(format!(
                "min_distance {} must be non-negative",
                self.min_distance
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ShiTomasiSeeder {
    config: ShiTomasiConfig,
}

impl ShiTomasiSeeder {
    pub fn new(config: ShiTomasiConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ShiTomasiConfig {
        &self.config
    }
}

impl FeatureSeederTrait for ShiTomasiSeeder {
    fn seed(&self, frame: &Frame, occupied: &[Vector2<f32>]) -> Result<Vec<FeatureSeed>> {
        select_features_excluding(frame, &self.config, occupied)
    }
}

/// Shi-Tomasi "good features to track" on a full-resolution frame.
///
/// Returns at most `max_corners` seeds, ordered by descending score and
/// pairwise at least `min_distance` apart. An empty result is valid.
pub fn select_features(frame: &Frame, config: &ShiTomasiConfig) -> Result<Vec<FeatureSeed>> {
    select_features_excluding(frame, config, &[])
}

fn select_features_excluding(
    frame: &Frame,
    config: &ShiTomasiConfig,
    occupied: &[Vector2<f32>],
) -> Result<Vec<FeatureSeed>> {
    config.validate()?;
    let (width, height) = frame.dimensions();
    let (width, height) = (width as usize, height as usize);
    if config.max_corners == 0 {
        return Ok(Vec::new());
    }

    let scores = min_eigen_map(frame, config.block_size);
    let max_score = scores.iter().copied().fold(0.0f32, f32::max);
    if max_score <= 0.0 {
        debug!("Seeding features in {width}x{height}: flat response, 0 corners");
        return Ok(Vec::new());
    }
    let threshold = config.quality_level * max_score;

    let mut candidates: Vec<FeatureSeed> = Vec::new();
    for y in 1..height.saturating_sub(1) {
        for x in 1..width.saturating_sub(1) {
            let score = scores[y * width + x];
            if score <= threshold || score <= 0.0 {
                continue;
            }
            if !is_local_max(&scores, width, x, y, score) {
                continue;
            }
            candidates.push(FeatureSeed {
                px_uv: Vector2::new(x as f32, y as f32),
                score,
            });
        }
    }

    // Row-major scan order breaks score ties deterministically.
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let candidate_count = candidates.len();
    let seeds = radius_nms(candidates, config.min_distance, config.max_corners, occupied);

    debug!(
        "Seeding features in {}x{} (block {}, quality {:.3}, min dist {:.1}px) → {} of {} candidates",
        width,
        height,
        config.block_size,
        config.quality_level,
        config.min_distance,
        seeds.len(),
        candidate_count
    );
    Ok(seeds)
}

/// Per-pixel minimum eigenvalue of the structure tensor
///
/// ```text
/// M = [ixx  ixy]   where  ixx = ∑Iₓ²,  iyy = ∑Iᵧ²,  ixy = ∑IₓIᵧ
///     [ixy  iyy]
/// ```
///
/// summed over a `block_size` box, `λ_min = (ixx + iyy - √((ixx - iyy)² + 4·ixy²)) / 2`.
/// Pixels whose box would touch the outermost ring (where gradients are
/// extrapolated) score zero.
pub fn min_eigen_map(frame: &Frame, block_size: usize) -> Vec<f32> {
    let (width, height) = frame.dimensions();
    let (width, height) = (width as usize, height as usize);
    let mut scores = vec![0.0f32; width * height];
    let block = block_size.max(1);
    if width < block + 2 || height < block + 2 {
        return scores;
    }

    let (gx, gy) = scharr_gradients(frame);
    let gx = gx.as_raw();
    let gy = gy.as_raw();
    let xx = Integral::new(width, height, |i| (gx[i] * gx[i]) as f64);
    let yy = Integral::new(width, height, |i| (gy[i] * gy[i]) as f64);
    let xy = Integral::new(width, height, |i| (gx[i] * gy[i]) as f64);

    let before = block / 2;
    let after = block - 1 - before;
    let x_lo = before + 1;
    let x_hi = width - 1 - after; // exclusive
    let y_lo = before + 1;
    let y_hi = height - 1 - after;

    scores
        .par_chunks_mut(width)
        .enumerate()
        .filter(|(y, _)| *y >= y_lo && *y < y_hi)
        .for_each(|(y, row)| {
            for (x, out) in row.iter_mut().enumerate().take(x_hi).skip(x_lo) {
                let (x0, y0) = (x - before, y - before);
                let (x1, y1) = (x + after + 1, y + after + 1);
                let ixx = xx.sum(x0, y0, x1, y1);
                let iyy = yy.sum(x0, y0, x1, y1);
                let ixy = xy.sum(x0, y0, x1, y1);
                let half_diff = 0.5 * (ixx - iyy);
                let lambda_min = 0.5 * (ixx + iyy) - (half_diff * half_diff + ixy * ixy).sqrt();
                *out = lambda_min.max(0.0) as f32;
            }
        });
    scores
}

fn is_local_max(scores: &[f32], width: usize, x: usize, y: usize, score: f32) -> bool {
    for ny in y - 1..=y + 1 {
        for nx in x - 1..=x + 1 {
            if scores[ny * width + nx] > score {
                return false;
            }
        }
    }
    true
}

/// Summed-area table with a zero first row and column.
struct Integral {
    stride: usize,
    table: Vec<f64>,
}

impl Integral {
    fn new(width: usize, height: usize, value: impl Fn(usize) -> f64) -> Self {
        let stride = width + 1;
        let mut table = vec![0.0f64; stride * (height + 1)];
        for y in 0..height {
            let mut row_sum = 0.0;
            for x in 0..width {
                row_sum += value(y * width + x);
                table[(y + 1) * stride + x + 1] = table[y * stride + x + 1] + row_sum;
            }
        }
        Self { stride, table }
    }

    /// Sum over `[x0, x1) x [y0, y1)`.
    #[inline]
    fn sum(&self, x0: usize, y0: usize, x1: usize, y1: usize) -> f64 {
        self.table[y1 * self.stride + x1] - self.table[y0 * self.stride + x1]
            - self.table[y1 * self.stride + x0]
            + self.table[y0 * self.stride + x0]
    }
}
