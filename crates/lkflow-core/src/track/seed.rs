use crate::error::Result;
use crate::img::Frame;
use nalgebra::Vector2;

pub mod shi_tom_seed;
pub use shi_tom_seed::{select_features, ShiTomasiConfig, ShiTomasiSeeder};

pub mod utils;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureSeed {
    /// Level-0 pixel position (pixel centres on integer coordinates).
    pub px_uv: Vector2<f32>,
    /// Minimum eigenvalue of the structure tensor at `px_uv`.
    pub score: f32,
}

pub trait FeatureSeederTrait {
    /// Selects features in `frame`, keeping clear of the `occupied` positions.
    fn seed(&self, frame: &Frame, occupied: &[Vector2<f32>]) -> Result<Vec<FeatureSeed>>;
}
