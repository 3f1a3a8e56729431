use serde::{Deserialize, Serialize};

use crate::track_manager::{AdvanceStats, TrackPoint};

/// Serializable copy of one track point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSnapshot {
    pub id: u64,
    pub position: [f32; 2],
    pub previous: [f32; 2],
    pub age: u32,
    pub residual: f32,
    pub score: f32,
}

impl From<&TrackPoint> for TrackSnapshot {
    fn from(track: &TrackPoint) -> Self {
        Self {
            id: track.id,
            position: [track.position.x, track.position.y],
            previous: [track.previous.x, track.previous.y],
            age: track.age,
            residual: track.residual,
            score: track.score,
        }
    }
}

/// Tracking metrics for one processed frame
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingMetrics {
    pub active_tracks: usize,
    pub seeded: usize,
    pub suppressed: usize,
    pub average_residual: Option<f64>,
    pub advance: AdvanceStats,
}

/// Track Set snapshot handed to sinks after every frame.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameReport {
    pub frame_index: u64,
    /// Active points in discovery order.
    pub tracks: Vec<TrackSnapshot>,
    /// Points dropped on this frame.
    pub lost: Vec<TrackSnapshot>,
    pub tracking: TrackingMetrics,
}

impl FrameReport {
    pub fn active_count(&self) -> usize {
        self.tracks.len()
    }
}

/// Why a run loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    SourceExhausted,
    FrameLimit,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub frames_processed: u64,
    pub stop_reason: StopReason,
    pub elapsed_secs: f64,
}
