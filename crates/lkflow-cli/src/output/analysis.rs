use lkflow_engine::RunSummary;

use crate::output::{FrameStat, Metadata, ProcessingOutput, Summary};
use crate::types::{Algorithm, SessionData};

/// Collects statistics during processing
pub struct AnalysisCollector {
    session: SessionData,
    algorithm: Algorithm,
    frame_stats: Vec<FrameStat>,
    processing_times: Vec<f64>,
    tracks_created: usize,
    tracks_lost: usize,
}

impl AnalysisCollector {
    pub fn new(session: SessionData, algorithm: Algorithm) -> Self {
        Self {
            session,
            algorithm,
            frame_stats: Vec::new(),
            processing_times: Vec::new(),
            tracks_created: 0,
            tracks_lost: 0,
        }
    }

    pub fn add_frame_stat(&mut self, stat: FrameStat) {
        self.tracks_created += stat.seeded;
        self.tracks_lost += stat.lost_tracks;
        self.processing_times.push(stat.processing_ms);
        self.frame_stats.push(stat);
    }

    pub fn finalize(self, run: &RunSummary, dimensions: Option<(u32, u32)>) -> ProcessingOutput {
        let AnalysisCollector {
            session,
            algorithm,
            frame_stats,
            processing_times,
            tracks_created,
            tracks_lost,
        } = self;

        let average_processing_ms = if processing_times.is_empty() {
            0.0
        } else {
            processing_times.iter().sum::<f64>() / processing_times.len() as f64
        };

        ProcessingOutput {
            metadata: Metadata {
                session_name: session.name.clone(),
                input_dir: session.input_dir.display().to_string(),
                algorithm: algorithm.name().to_string(),
                frame_count: session.frame_count(),
                width: dimensions.map(|d| d.0),
                height: dimensions.map(|d| d.1),
            },
            frame_stats,
            summary: Summary {
                total_frames: run.frames_processed,
                stop_reason: run.stop_reason,
                tracks_created,
                tracks_lost,
                average_processing_ms,
                elapsed_secs: run.elapsed_secs,
            },
        }
    }
}
