use lkflow_core::img::{build_pyramid, Frame, Pyramid};
use lkflow_core::track::{FeatureSeederTrait, LKTracker, ShiTomasiConfig, ShiTomasiSeeder};
use log::{debug, info};
use tracing::debug_span;

use crate::runner::drive;
use crate::track_manager::TrackManager;
use crate::types::{FrameReport, RunSummary, TrackSnapshot, TrackingMetrics};
use crate::{EngineConfig, FrameSource, ReseedPolicy, Result, RunLimits, TrackSink};

/// Frame-sequential sparse tracker: seeds Shi-Tomasi corners, follows them
/// with pyramidal Lucas-Kanade and keeps only the latest pyramid.
pub struct SparseFlowEngine {
    config: EngineConfig,
    manager: TrackManager<LKTracker>,
    prev_pyramid: Option<Pyramid>,
    frame_index: u64,
}

impl SparseFlowEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let manager = TrackManager::new(LKTracker::new(config.tracking), config.tracks.clone());
        Ok(Self {
            config,
            manager,
            prev_pyramid: None,
            frame_index: 0,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn manager(&self) -> &TrackManager<LKTracker> {
        &self.manager
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn process_frame(&mut self, frame: &Frame) -> Result<FrameReport> {
        let _span = debug_span!("sparse_frame", index = self.frame_index).entered();
        let pyramid = build_pyramid(frame, self.config.tracking.pyramid_levels())?;

        let mut report = FrameReport {
            frame_index: self.frame_index,
            ..FrameReport::default()
        };

        match self.prev_pyramid.as_ref() {
            None => {
                self.seed(frame, self.config.selection.max_corners, &mut report.tracking)?;
            }
            Some(prev) => {
                let advance = self.manager.advance(prev, &pyramid)?;
                report.tracking.advance = advance.stats;
                report.lost = advance.lost.iter().map(TrackSnapshot::from).collect();

                if self.config.reseed == ReseedPolicy::BelowTarget
                    && self.manager.need_more_features()
                {
                    let budget = self.config.tracks.target_tracks - self.manager.alive_count();
                    self.seed(frame, budget, &mut report.tracking)?;
                }
            }
        }

        report.tracks = self.manager.tracks().map(TrackSnapshot::from).collect();
        report.tracking.active_tracks = report.tracks.len();
        if !report.tracks.is_empty() && self.frame_index > 0 {
            let sum: f64 = report.tracks.iter().map(|t| t.residual as f64).sum();
            report.tracking.average_residual = Some(sum / report.tracks.len() as f64);
        }

        debug!(
            "Frame {}: {} active, {} lost, {} seeded",
            self.frame_index,
            report.tracking.active_tracks,
            report.lost.len(),
            report.tracking.seeded
        );

        self.prev_pyramid = Some(pyramid);
        self.frame_index += 1;
        Ok(report)
    }

    /// Selects up to `budget` corners away from the active points and hands
    /// them to the manager.
    fn seed(&mut self, frame: &Frame, budget: usize, metrics: &mut TrackingMetrics) -> Result<()> {
        let seeder = ShiTomasiSeeder::new(ShiTomasiConfig {
            max_corners: budget,
            ..self.config.selection
        });
        let occupied = self.manager.active_points();
        let seeds = seeder.seed(frame, &occupied)?;
        let replenished = self.manager.replenish(&seeds);
        metrics.seeded = replenished.admitted.len();
        metrics.suppressed = replenished.suppressed.len();
        if self.frame_index == 0 {
            info!("Seeded {} features on the first frame", metrics.seeded);
        }
        Ok(())
    }

    /// Runs the engine over `source`, passing every snapshot to `sink`.
    pub fn run<S, K>(&mut self, source: &mut S, sink: &mut K, limits: &RunLimits) -> Result<RunSummary>
    where
        S: FrameSource + ?Sized,
        K: TrackSink + ?Sized,
    {
        drive(source, limits, |_, frame| {
            let report = self.process_frame(frame)?;
            sink.consume(frame, &report)
        })
    }
}
