use crate::error::{FlowError, Result};
use crate::img::image_utils::bilinear_sample_luma;
use crate::img::pyramid::{Pyramid, PyramidLevel};
use nalgebra::Vector2;
use rayon::prelude::*;
use tracing::{debug, debug_span, trace};

/// Two consecutive updates whose sum is shorter than this are treated as an
/// oscillation around the optimum.
const OSCILLATION_NORM: f32 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LucasKanadeConfig {
    /// Side of the square integration window (pixels). Even sizes round up to
    /// the next odd window.
    pub window_size: usize,
    /// Coarsest pyramid level used (0 = no pyramid).
    pub max_level: usize,
    /// Gauss-Newton iterations per level.
    pub max_iterations: usize,
    /// Update norm (pixels) below which a level is considered converged.
    pub epsilon: f32,
    /// Minimum eigenvalue of the gradient matrix, per window sample, below which
    /// the system is treated as singular.
    pub min_eigen_threshold: f32,
    /// Largest mean absolute intensity residual accepted at level 0.
    pub max_residual: f32,
}

impl Default for LucasKanadeConfig {
    fn default() -> Self {
        Self {
            window_size: 15,
            max_level: 2,
            max_iterations: 10,
            epsilon: 0.03,
            min_eigen_threshold: 1e-6,
            max_residual: 0.15,
        }
    }
}

impl LucasKanadeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.window_size < 3 {
            return Err(FlowError::InvalidConfig(format!(
                "window_size {} must be at least 3",
                self.window_size
            )));
        }
        if self.max_iterations == 0 {
            return Err(FlowError::InvalidConfig(
                "max_iterations must be at least 1".into(),
            ));
        }
        if !(self.epsilon >= 0.0) || !(self.min_eigen_threshold >= 0.0) {
            return Err(FlowError::InvalidConfig(
                "epsilon and min_eigen_threshold must be non-negative".into(),
            ));
        }
        if !(self.max_residual > 0.0) {
            return Err(FlowError::InvalidConfig(
                "max_residual must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Number of pyramid levels the tracker expects.
    pub fn pyramid_levels(&self) -> usize {
        self.max_level + 1
    }

    pub fn window_radius(&self) -> usize {
        self.window_size / 2
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackStatus {
    Active,
    Lost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOutcome {
    /// The level-0 update fell below epsilon.
    Converged,
    /// Iterations ran out at level 0, but the estimate is usable.
    IterationLimit,
    /// The gradient matrix was near singular (textureless window).
    Singular,
    /// The window left the image or too few samples remained valid.
    OutOfBounds,
    /// The final window mismatch exceeded the configured bound.
    HighResidual,
    /// The estimate became non-finite.
    Diverged,
}

impl TrackOutcome {
    pub fn status(&self) -> TrackStatus {
        match self {
            TrackOutcome::Converged | TrackOutcome::IterationLimit => TrackStatus::Active,
            _ => TrackStatus::Lost,
        }
    }

    pub fn is_tracked(&self) -> bool {
        self.status() == TrackStatus::Active
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TrackObservation {
    /// The position of the feature in the previous frame.
    pub initial_px_uv: Vector2<f32>,
    /// The refined position in the next frame. Equals `initial_px_uv` when lost
    /// before any refinement.
    pub refined_px_uv: Vector2<f32>,
    /// Gauss-Newton iterations summed over all levels.
    pub iterations: u32,
    /// Mean absolute intensity mismatch over the level-0 window.
    pub residual: f32,
    /// Normalized minimum eigenvalue of the last solved system.
    pub min_eigenvalue: f32,
    pub outcome: TrackOutcome,
}

impl TrackObservation {
    fn lost(initial_px_uv: Vector2<f32>, outcome: TrackOutcome, iterations: u32) -> Self {
        Self {
            initial_px_uv,
            refined_px_uv: initial_px_uv,
            iterations,
            residual: f32::INFINITY,
            min_eigenvalue: 0.0,
            outcome,
        }
    }

    pub fn displacement(&self) -> Vector2<f32> {
        self.refined_px_uv - self.initial_px_uv
    }

    pub fn status(&self) -> TrackStatus {
        self.outcome.status()
    }
}

#[derive(Debug, Clone, Copy)]
struct TemplateSample {
    offset: Vector2<f32>,
    intensity: f32,
    grad_x: f32,
    grad_y: f32,
}

#[derive(Debug, Clone, Copy)]
struct LevelStats {
    iterations: u32,
    converged: bool,
    min_eigenvalue: f32,
}

/// Pyramidal Lucas-Kanade point tracker.
#[derive(Debug, Clone)]
pub struct LKTracker {
    config: LucasKanadeConfig,
}

impl LKTracker {
    pub fn new(config: LucasKanadeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LucasKanadeConfig {
        &self.config
    }

    /// Tracks `points` (level-0 pixels) from `prev` into `next`.
    ///
    /// One observation per input point, in input order. Per-point failures are
    /// reported through [`TrackOutcome`]; only configuration and pyramid shape
    /// problems return an error.
    pub fn track(
        &self,
        prev: &Pyramid,
        next: &Pyramid,
        points: &[Vector2<f32>],
    ) -> Result<Vec<TrackObservation>> {
        self.config.validate()?;
        let top = self.coarsest_level(prev, next)?;
        let _span = debug_span!("track", points = points.len(), top).entered();

        let observations: Vec<TrackObservation> = points
            .par_iter()
            .map(|&point| self.track_point(prev, next, point, top))
            .collect();

        let tracked = observations
            .iter()
            .filter(|obs| obs.outcome.is_tracked())
            .count();
        debug!("Tracked {tracked}/{} points", points.len());
        Ok(observations)
    }

    /// Highest usable level given both pyramids and `max_level`.
    fn coarsest_level(&self, prev: &Pyramid, next: &Pyramid) -> Result<usize> {
        if prev.is_empty() || next.is_empty() {
            return Err(FlowError::PyramidMismatch("empty pyramid".into()));
        }
        let available = prev.len().min(next.len());
        for (a, b) in prev.levels().iter().zip(next.levels()).take(available) {
            if a.image.dimensions() != b.image.dimensions() {
                return Err(FlowError::PyramidMismatch(format!(
                    "level {} is {}x{} in the previous pyramid but {}x{} in the next",
                    a.octave,
                    a.width(),
                    a.height(),
                    b.width(),
                    b.height()
                )));
            }
        }
        let top = self.config.max_level.min(available - 1);
        if top < self.config.max_level {
            debug!(
                "Pyramids provide {available} levels, clamping max_level {} to {top}",
                self.config.max_level
            );
        }
        Ok(top)
    }

    fn track_point(
        &self,
        prev: &Pyramid,
        next: &Pyramid,
        origin: Vector2<f32>,
        top: usize,
    ) -> TrackObservation {
        if !origin.x.is_finite() || !origin.y.is_finite() {
            return TrackObservation::lost(origin, TrackOutcome::Diverged, 0);
        }

        let mut flow = Vector2::zeros();
        let mut iterations = 0u32;
        let mut finest = LevelStats {
            iterations: 0,
            converged: false,
            min_eigenvalue: 0.0,
        };

        for octave in (0..=top).rev() {
            if octave < top {
                flow *= 2.0;
            }
            let prev_level = &prev.levels()[octave];
            let next_level = &next.levels()[octave];
            let center = origin * prev_level.scale;
            let guess = flow;
            match self.track_level(prev_level, next_level, center, &mut flow) {
                Ok(stats) => {
                    iterations += stats.iterations;
                    finest = stats;
                }
                // Texture finer than a coarse level blurs away there; carry the
                // current estimate down and let the finer levels decide.
                Err(TrackOutcome::Singular | TrackOutcome::OutOfBounds) if octave > 0 => {
                    trace!("Skipping level {octave} for point ({}, {})", origin.x, origin.y);
                    flow = guess;
                }
                Err(outcome) => return TrackObservation::lost(origin, outcome, iterations),
            }
        }

        let refined = origin + flow;
        if !refined.x.is_finite() || !refined.y.is_finite() {
            return TrackObservation::lost(origin, TrackOutcome::Diverged, iterations);
        }

        let base_prev = prev.base();
        let base_next = next.base();
        let max_x = (base_next.width() - 1) as f32;
        let max_y = (base_next.height() - 1) as f32;
        if refined.x < 0.0 || refined.y < 0.0 || refined.x > max_x || refined.y > max_y {
            return TrackObservation::lost(origin, TrackOutcome::OutOfBounds, iterations);
        }
        let Some(residual) = self.window_residual(base_prev, base_next, origin, flow) else {
            return TrackObservation::lost(origin, TrackOutcome::OutOfBounds, iterations);
        };

        let outcome = if residual > self.config.max_residual {
            TrackOutcome::HighResidual
        } else if finest.converged {
            TrackOutcome::Converged
        } else {
            TrackOutcome::IterationLimit
        };
        TrackObservation {
            initial_px_uv: origin,
            refined_px_uv: refined,
            iterations,
            residual,
            min_eigenvalue: finest.min_eigenvalue,
            outcome,
        }
    }

    /// Gauss-Newton refinement of `flow` at one level.
    ///
    /// Solves `G·η = b` with `G = Σ ∇I ∇Iᵀ` over the template window and
    /// `b = Σ (I(p) - J(p + flow)) ∇I`, then `flow += η` until `|η| <= epsilon`.
    /// Window samples falling outside either image are left out of both sums.
    fn track_level(
        &self,
        prev: &PyramidLevel,
        next: &PyramidLevel,
        center: Vector2<f32>,
        flow: &mut Vector2<f32>,
    ) -> std::result::Result<LevelStats, TrackOutcome> {
        let radius = self.config.window_radius() as i32;
        let reach = radius as f32;
        let max_x = (prev.width() - 1) as f32;
        let max_y = (prev.height() - 1) as f32;
        if center.x < -reach || center.y < -reach || center.x > max_x + reach || center.y > max_y + reach
        {
            return Err(TrackOutcome::OutOfBounds);
        }

        let template = self.extract_template(prev, center, radius);
        let side = (2 * radius + 1) as usize;
        let min_samples = (side * side / 4).max(4);
        if template.len() < min_samples {
            return Err(TrackOutcome::OutOfBounds);
        }

        let mut stats = LevelStats {
            iterations: 0,
            converged: false,
            min_eigenvalue: 0.0,
        };
        let mut last_delta: Option<Vector2<f32>> = None;

        while (stats.iterations as usize) < self.config.max_iterations {
            stats.iterations += 1;
            let target = center + *flow;

            let mut gxx = 0.0f32;
            let mut gxy = 0.0f32;
            let mut gyy = 0.0f32;
            let mut bx = 0.0f32;
            let mut by = 0.0f32;
            let mut count = 0usize;

            for sample in &template {
                let q = target + sample.offset;
                let Some(intensity_next) = bilinear_sample_luma(&next.image, q.x, q.y) else {
                    continue;
                };
                let mismatch = sample.intensity - intensity_next;
                gxx += sample.grad_x * sample.grad_x;
                gxy += sample.grad_x * sample.grad_y;
                gyy += sample.grad_y * sample.grad_y;
                bx += sample.grad_x * mismatch;
                by += sample.grad_y * mismatch;
                count += 1;
            }

            if count < min_samples {
                return Err(TrackOutcome::OutOfBounds);
            }

            let n = count as f32;
            let half_diff = 0.5 * (gxx - gyy);
            let lambda_min =
                (0.5 * (gxx + gyy) - (half_diff * half_diff + gxy * gxy).sqrt()) / n;
            stats.min_eigenvalue = lambda_min;
            if !lambda_min.is_finite() || lambda_min < self.config.min_eigen_threshold {
                return Err(TrackOutcome::Singular);
            }

            let determinant = gxx * gyy - gxy * gxy;
            if !(determinant > 0.0) {
                return Err(TrackOutcome::Singular);
            }
            let delta = Vector2::new(gyy * bx - gxy * by, gxx * by - gxy * bx) / determinant;
            if !delta.x.is_finite() || !delta.y.is_finite() {
                return Err(TrackOutcome::Diverged);
            }

            *flow += delta;

            if delta.norm() <= self.config.epsilon {
                stats.converged = true;
                break;
            }
            if let Some(previous) = last_delta {
                if (delta + previous).norm() < OSCILLATION_NORM {
                    *flow -= delta * 0.5;
                    stats.converged = true;
                    break;
                }
            }
            last_delta = Some(delta);
        }

        Ok(stats)
    }

    fn extract_template(
        &self,
        level: &PyramidLevel,
        center: Vector2<f32>,
        radius: i32,
    ) -> Vec<TemplateSample> {
        let side = (2 * radius + 1) as usize;
        let mut template = Vec::with_capacity(side * side);
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                let offset = Vector2::new(dx as f32, dy as f32);
                let p = center + offset;
                let (Some(intensity), Some(grad_x), Some(grad_y)) = (
                    bilinear_sample_luma(&level.image, p.x, p.y),
                    bilinear_sample_luma(&level.grad_x, p.x, p.y),
                    bilinear_sample_luma(&level.grad_y, p.x, p.y),
                ) else {
                    continue;
                };
                template.push(TemplateSample {
                    offset,
                    intensity,
                    grad_x,
                    grad_y,
                });
            }
        }
        template
    }

    /// Mean absolute mismatch between the level-0 windows at `origin` and
    /// `origin + flow`, over samples inside both frames.
    fn window_residual(
        &self,
        prev: &PyramidLevel,
        next: &PyramidLevel,
        origin: Vector2<f32>,
        flow: Vector2<f32>,
    ) -> Option<f32> {
        let radius = self.config.window_radius() as i32;
        let mut sum = 0.0f32;
        let mut count = 0usize;
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                let p = origin + Vector2::new(dx as f32, dy as f32);
                let q = p + flow;
                if let (Some(a), Some(b)) = (
                    bilinear_sample_luma(&prev.image, p.x, p.y),
                    bilinear_sample_luma(&next.image, q.x, q.y),
                ) {
                    sum += (a - b).abs();
                    count += 1;
                }
            }
        }
        (count > 0).then(|| sum / count as f32)
    }
}
