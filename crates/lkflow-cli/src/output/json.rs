use std::path::Path;

use lkflow_engine::StopReason;
use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// Complete processing output in JSON format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingOutput {
    pub metadata: Metadata,
    pub frame_stats: Vec<FrameStat>,
    pub summary: Summary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub session_name: String,
    pub input_dir: String,
    pub algorithm: String,
    pub frame_count: usize,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameStat {
    pub frame: u64,
    pub active_tracks: usize,
    pub lost_tracks: usize,
    pub seeded: usize,
    pub average_residual: Option<f64>,
    pub mean_flow_magnitude: Option<f64>,
    pub processing_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub total_frames: u64,
    pub stop_reason: StopReason,
    pub tracks_created: usize,
    pub tracks_lost: usize,
    pub average_processing_ms: f64,
    pub elapsed_secs: f64,
}

impl ProcessingOutput {
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), self)?;
        Ok(())
    }
}
