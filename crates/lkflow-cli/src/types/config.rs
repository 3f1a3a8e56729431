use std::path::Path;

use lkflow_core::track::{LucasKanadeConfig, ShiTomasiConfig};
use lkflow_engine::{EngineConfig, EngineError, ReseedPolicy, TrackConfig};
use serde::{Deserialize, Serialize};

use crate::errors::{ProcessingError, Result};

/// Tunables read from the optional YAML file. Every key has a default, so a
/// partial or empty file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Upper bound on corners selected per seeding pass
    pub max_corners: usize,
    /// Fraction of the strongest corner response a corner must exceed
    pub quality_level: f32,
    /// Minimum spacing between selected corners (pixels)
    pub min_distance: f32,
    /// Structure-tensor neighbourhood side (pixels)
    pub block_size: usize,
    /// Tracking window side (pixels)
    pub window_size: usize,
    /// Coarsest pyramid level
    pub max_level: usize,
    pub max_iterations: usize,
    pub epsilon: f32,
    pub min_eigen_threshold: f32,
    pub max_residual: f32,
    /// Forward-backward round-trip bound (pixels), disabled when absent
    pub max_forward_backward_error: Option<f32>,
    pub target_tracks: usize,
    pub reseed: ReseedMode,
    /// Dense grid spacing (pixels)
    pub grid_step: usize,
    /// Trail thickness in overlays (pixels)
    pub trail_thickness: u32,
    /// Radius of the marker drawn on each active point
    pub marker_radius: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReseedMode {
    #[default]
    Never,
    BelowTarget,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        let selection = ShiTomasiConfig::default();
        let tracking = LucasKanadeConfig::default();
        Self {
            max_corners: selection.max_corners,
            quality_level: selection.quality_level,
            min_distance: selection.min_distance,
            block_size: selection.block_size,
            window_size: tracking.window_size,
            max_level: tracking.max_level,
            max_iterations: tracking.max_iterations,
            epsilon: tracking.epsilon,
            min_eigen_threshold: tracking.min_eigen_threshold,
            max_residual: tracking.max_residual,
            max_forward_backward_error: None,
            target_tracks: 100,
            reseed: ReseedMode::Never,
            grid_step: 8,
            trail_thickness: 2,
            marker_radius: 5,
        }
    }
}

impl ProcessingConfig {
    /// Loads and validates a YAML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let config: Self = if contents.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(contents)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.trail_thickness == 0 {
            return Err(ProcessingError::InvalidConfig(
                "trail_thickness must be at least 1".into(),
            ));
        }
        if self.marker_radius < 0 {
            return Err(ProcessingError::InvalidConfig(
                "marker_radius must be non-negative".into(),
            ));
        }
        match self.engine_config().validate() {
            Ok(()) => Ok(()),
            Err(EngineError::Flow(err)) => Err(ProcessingError::InvalidConfig(err.to_string())),
            Err(other) => Err(other.into()),
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            selection: ShiTomasiConfig {
                max_corners: self.max_corners,
                quality_level: self.quality_level,
                min_distance: self.min_distance,
                block_size: self.block_size,
            },
            tracking: LucasKanadeConfig {
                window_size: self.window_size,
                max_level: self.max_level,
                max_iterations: self.max_iterations,
                epsilon: self.epsilon,
                min_eigen_threshold: self.min_eigen_threshold,
                max_residual: self.max_residual,
            },
            tracks: TrackConfig {
                min_distance: self.min_distance,
                max_forward_backward_error: self.max_forward_backward_error,
                target_tracks: self.target_tracks,
            },
            reseed: match self.reseed {
                ReseedMode::Never => ReseedPolicy::Never,
                ReseedMode::BelowTarget => ReseedPolicy::BelowTarget,
            },
            grid_step: self.grid_step,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn empty_file_uses_defaults() {
        let config = ProcessingConfig::from_yaml_str("").unwrap();
        assert_eq!(config, ProcessingConfig::default());
        assert_eq!(config.max_corners, 100);
        assert_eq!(config.window_size, 15);
        assert_eq!(config.max_level, 2);
        assert_eq!(config.epsilon, 0.03);
    }

    #[test]
    fn partial_file_overrides_selected_keys() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "max_corners: 250").unwrap();
        writeln!(file, "reseed: below_target").unwrap();
        writeln!(file, "max_forward_backward_error: 1.5").unwrap();
        file.flush().unwrap();

        let config = ProcessingConfig::load(file.path()).unwrap();
        assert_eq!(config.max_corners, 250);
        assert_eq!(config.reseed, ReseedMode::BelowTarget);
        assert_eq!(config.quality_level, 0.3);

        let engine = config.engine_config();
        assert_eq!(engine.selection.max_corners, 250);
        assert_eq!(engine.reseed, ReseedPolicy::BelowTarget);
        assert_eq!(engine.tracks.max_forward_backward_error, Some(1.5));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = ProcessingConfig::from_yaml_str("window_size: 1").unwrap_err();
        assert!(matches!(err, ProcessingError::InvalidConfig(_)));
        let err = ProcessingConfig::from_yaml_str("quality_level: 2.0").unwrap_err();
        assert!(matches!(err, ProcessingError::InvalidConfig(_)));
        let err = ProcessingConfig::from_yaml_str("no_such_key: 3").unwrap_err();
        assert!(matches!(err, ProcessingError::YamlError(_)));
    }
}
