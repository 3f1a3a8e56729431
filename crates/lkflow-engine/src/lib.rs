pub mod dense;
pub mod runner;
pub mod sparse;
pub mod track_manager;
pub mod types;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use lkflow_core::flow::FlowField;
use lkflow_core::img::Frame;
use lkflow_core::track::{LucasKanadeConfig, ShiTomasiConfig};
use lkflow_core::FlowError;
use thiserror::Error;

pub use dense::DenseFlowEngine;
pub use runner::RunLimits;
pub use sparse::SparseFlowEngine;
pub use track_manager::{
    AdvanceReport, AdvanceStats, FlowTracker, ReplenishReport, TrackConfig, TrackManager,
    TrackPoint,
};
pub use types::{FrameReport, RunSummary, StopReason, TrackSnapshot, TrackingMetrics};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error("frame source failed: {0}")]
    Source(#[source] BoxError),

    #[error("sink failed: {0}")]
    Sink(#[source] BoxError),
}

/// Error raised by a caller-supplied source or sink.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type Result<T> = std::result::Result<T, EngineError>;

/// When the sparse engine selects new features after the first frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReseedPolicy {
    /// Only the first frame is seeded.
    #[default]
    Never,
    /// Top up whenever fewer than `target_tracks` points are active.
    BelowTarget,
}

/// Processing constants grouped into a configuration structure.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub selection: ShiTomasiConfig,
    pub tracking: LucasKanadeConfig,
    pub tracks: TrackConfig,
    pub reseed: ReseedPolicy,
    /// Grid spacing of the dense engine (pixels).
    pub grid_step: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let selection = ShiTomasiConfig::default();
        Self {
            tracks: TrackConfig {
                min_distance: selection.min_distance,
                target_tracks: selection.max_corners,
                ..TrackConfig::default()
            },
            selection,
            tracking: LucasKanadeConfig::default(),
            reseed: ReseedPolicy::Never,
            grid_step: 8,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        self.selection.validate()?;
        self.tracking.validate()?;
        if self.grid_step == 0 {
            return Err(FlowError::InvalidConfig("grid_step must be at least 1".into()).into());
        }
        if let Some(bound) = self.tracks.max_forward_backward_error {
            if !(bound > 0.0) {
                return Err(FlowError::InvalidConfig(format!(
                    "max_forward_backward_error {bound} must be positive"
                ))
                .into());
            }
        }
        Ok(())
    }
}

/// Shared cancellation flag, checked between frames.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Supplies frames in capture order; `None` ends the sequence.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Receives the Track Set snapshot of every processed frame.
pub trait TrackSink {
    fn consume(&mut self, frame: &Frame, report: &FrameReport) -> Result<()>;
}

/// Receives the flow field of every processed frame pair.
pub trait FlowSink {
    fn consume(&mut self, frame: &Frame, flow: &FlowField) -> Result<()>;
}

/// Adapts any in-memory frame iterator into a [`FrameSource`].
pub struct IterSource<I>(pub I);

impl<I> FrameSource for IterSource<I>
where
    I: Iterator<Item = Frame>,
{
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        Ok(self.0.next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tracks.target_tracks, 100);
        assert_eq!(config.tracks.min_distance, 7.0);
        assert_eq!(config.reseed, ReseedPolicy::Never);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut config = EngineConfig {
            grid_step: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(EngineError::Flow(FlowError::InvalidConfig(_)))
        ));
        config.grid_step = 8;
        config.tracks.max_forward_backward_error = Some(-1.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
