//! Dense flow fields built from a grid of pyramidal Lucas-Kanade tracks.
//!
//! Grid nodes sit at `step / 2 + i * step` along each axis. Nodes whose track is
//! lost borrow the mean of their valid 4-neighbours (repeated until every node
//! has a value, or zero when nothing tracked), and every pixel receives the
//! bilinear interpolation of the surrounding nodes.

pub mod hsv;

pub use hsv::encode_hsv;

use crate::error::{FlowError, Result};
use crate::img::Pyramid;
use crate::track::LKTracker;
use log::debug;
use nalgebra::Vector2;

#[derive(Debug, Clone, PartialEq)]
pub struct FlowField {
    width: u32,
    height: u32,
    vectors: Vec<Vector2<f32>>,
}

impl FlowField {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            vectors: vec![Vector2::zeros(); (width as usize) * (height as usize)],
        }
    }

    pub fn from_vectors(width: u32, height: u32, vectors: Vec<Vector2<f32>>) -> Result<Self> {
        let expected = (width as usize) * (height as usize);
        if vectors.len() != expected {
            return Err(FlowError::BufferSize {
                expected,
                actual: vectors.len(),
            });
        }
        Ok(Self {
            width,
            height,
            vectors,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn vectors(&self) -> &[Vector2<f32>] {
        &self.vectors
    }

    pub fn get(&self, x: u32, y: u32) -> Vector2<f32> {
        self.vectors[self.index(x, y)]
    }

    pub fn set(&mut self, x: u32, y: u32, value: Vector2<f32>) {
        let idx = self.index(x, y);
        self.vectors[idx] = value;
    }

    fn index(&self, x: u32, y: u32) -> usize {
        assert!(x < self.width && y < self.height, "flow index out of range");
        (y as usize) * (self.width as usize) + x as usize
    }

    /// Per-pixel magnitude and angle, the angle in `[0, 2π)` measured from +x
    /// towards +y (image rows grow downwards).
    pub fn magnitude_angle(&self) -> (Vec<f32>, Vec<f32>) {
        self.vectors
            .iter()
            .map(|v| {
                let angle = v.y.atan2(v.x).rem_euclid(std::f32::consts::TAU);
                (v.norm(), angle)
            })
            .unzip()
    }

    pub fn mean_magnitude(&self) -> f32 {
        if self.vectors.is_empty() {
            return 0.0;
        }
        self.vectors.iter().map(|v| v.norm()).sum::<f32>() / self.vectors.len() as f32
    }

    pub fn mean_vector(&self) -> Vector2<f32> {
        if self.vectors.is_empty() {
            return Vector2::zeros();
        }
        self.vectors.iter().sum::<Vector2<f32>>() / self.vectors.len() as f32
    }
}

/// Computes a per-pixel flow field between two pyramids.
pub fn dense_flow(
    prev: &Pyramid,
    next: &Pyramid,
    tracker: &LKTracker,
    grid_step: usize,
) -> Result<FlowField> {
    if grid_step == 0 {
        return Err(FlowError::InvalidConfig("grid_step must be at least 1".into()));
    }
    if prev.is_empty() {
        return Err(FlowError::PyramidMismatch("empty pyramid".into()));
    }
    let (width, height) = prev.base().image.dimensions();

    let xs = grid_positions(width, grid_step);
    let ys = grid_positions(height, grid_step);
    let nodes: Vec<Vector2<f32>> = ys
        .iter()
        .flat_map(|&y| xs.iter().map(move |&x| Vector2::new(x, y)))
        .collect();

    let observations = tracker.track(prev, next, &nodes)?;
    let mut grid: Vec<Option<Vector2<f32>>> = observations
        .iter()
        .map(|obs| obs.outcome.is_tracked().then(|| obs.displacement()))
        .collect();
    let tracked = grid.iter().filter(|v| v.is_some()).count();
    debug!(
        "Dense flow grid {}x{} (step {grid_step}): {tracked}/{} nodes tracked",
        xs.len(),
        ys.len(),
        grid.len()
    );

    fill_lost_nodes(&mut grid, xs.len(), ys.len());
    let grid: Vec<Vector2<f32>> = grid
        .into_iter()
        .map(|v| v.unwrap_or_else(Vector2::zeros))
        .collect();

    let mut field = FlowField::new(width, height);
    for y in 0..height {
        let (y0, y1, ty) = bracket(y as f32, grid_step, ys.len());
        for x in 0..width {
            let (x0, x1, tx) = bracket(x as f32, grid_step, xs.len());
            let at = |gx: usize, gy: usize| grid[gy * xs.len() + gx];
            let top = at(x0, y0) * (1.0 - tx) + at(x1, y0) * tx;
            let bottom = at(x0, y1) * (1.0 - tx) + at(x1, y1) * tx;
            field.set(x, y, top * (1.0 - ty) + bottom * ty);
        }
    }
    Ok(field)
}

fn grid_positions(extent: u32, step: usize) -> Vec<f32> {
    let half = step / 2;
    let positions: Vec<f32> = (half..extent as usize)
        .step_by(step)
        .map(|p| p as f32)
        .collect();
    if positions.is_empty() {
        vec![(extent.saturating_sub(1) / 2) as f32]
    } else {
        positions
    }
}

/// Neighbouring node indices and interpolation weight for a pixel coordinate.
fn bracket(coord: f32, step: usize, count: usize) -> (usize, usize, f32) {
    let half = (step / 2) as f32;
    let t = ((coord - half) / step as f32).clamp(0.0, (count - 1) as f32);
    let i0 = t.floor() as usize;
    let i1 = (i0 + 1).min(count - 1);
    (i0, i1, t - i0 as f32)
}

fn fill_lost_nodes(grid: &mut [Option<Vector2<f32>>], nx: usize, ny: usize) {
    if grid.iter().all(Option::is_none) {
        return;
    }
    while grid.iter().any(Option::is_none) {
        let snapshot = grid.to_vec();
        for gy in 0..ny {
            for gx in 0..nx {
                let idx = gy * nx + gx;
                if snapshot[idx].is_some() {
                    continue;
                }
                let mut sum = Vector2::zeros();
                let mut count = 0;
                let neighbours = [
                    (gx > 0).then(|| idx - 1),
                    (gx + 1 < nx).then(|| idx + 1),
                    (gy > 0).then(|| idx - nx),
                    (gy + 1 < ny).then(|| idx + nx),
                ];
                for n in neighbours.into_iter().flatten() {
                    if let Some(v) = snapshot[n] {
                        sum += v;
                        count += 1;
                    }
                }
                if count > 0 {
                    grid[idx] = Some(sum / count as f32);
                }
            }
        }
    }
}
