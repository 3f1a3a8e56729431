pub mod errors;
pub mod output;
pub mod providers;
pub mod types;

use std::path::{Path, PathBuf};
use std::time::Instant;

use image::{DynamicImage, RgbImage};
use lkflow_core::flow::FlowField;
use lkflow_core::img::{frame_to_gray, Frame};
use lkflow_engine::{
    DenseFlowEngine, EngineError, FlowSink, FrameReport, RunLimits, SparseFlowEngine, TrackSink,
};
use log::{debug, info};
use tracing::info_span;

use crate::errors::{ProcessingError, Result};
use crate::output::{
    AnalysisCollector, FlowImageWriter, FrameStat, ProcessingOutput, TrackOverlayRenderer,
};
use crate::providers::{ColourFrame, ImageSequenceSource};
use crate::types::{Algorithm, ProcessingConfig, SessionData};

pub const REPORT_FILE: &str = "report.json";

/// Runs an engine over a recorded image sequence and writes its outputs
pub struct FlowProcessor {
    config: ProcessingConfig,
}

impl FlowProcessor {
    pub fn new(config: ProcessingConfig) -> Self {
        Self { config }
    }

    /// Processes every frame of `input_dir`. When `output_dir` is set, per-frame
    /// images and `report.json` are written there.
    pub fn process_session<P: AsRef<Path>>(
        &self,
        algorithm: Algorithm,
        input_dir: P,
        output_dir: Option<&Path>,
        limits: &RunLimits,
    ) -> Result<ProcessingOutput> {
        let session = SessionData::discover(input_dir)?;
        let _span = info_span!("session", name = %session.name, %algorithm).entered();
        info!(
            "Processing session {} ({} frames) with {}",
            session.name,
            session.frame_count(),
            algorithm
        );
        if let Some(dir) = output_dir {
            std::fs::create_dir_all(dir)?;
        }

        let engine_config = self.config.engine_config();
        let mut source = ImageSequenceSource::new(&session);
        let mut analysis = AnalysisCollector::new(session.clone(), algorithm);
        let output_dir = output_dir.map(Path::to_path_buf);

        let run = match algorithm {
            Algorithm::LucasKanade => {
                let mut engine = SparseFlowEngine::new(engine_config)?;
                let mut sink = OverlaySink {
                    renderer: TrackOverlayRenderer::new(
                        self.config.trail_thickness,
                        self.config.marker_radius,
                    ),
                    colour: source.colour_frame(),
                    output_dir,
                    analysis: &mut analysis,
                    last: Instant::now(),
                };
                engine
                    .run(&mut source, &mut sink, limits)
                    .map_err(engine_failure)?
            }
            Algorithm::LucasKanadeDense => {
                let mut engine = DenseFlowEngine::new(&engine_config)?;
                let mut sink = HsvSink {
                    writer: FlowImageWriter,
                    output_dir,
                    analysis: &mut analysis,
                    last: Instant::now(),
                    next_frame: 1,
                };
                engine
                    .run(&mut source, &mut sink, limits)
                    .map_err(engine_failure)?
            }
        };

        let output = analysis.finalize(&run, source.dimensions());
        info!(
            "Processing complete: {} frames, {} tracks created, {:.2}ms average",
            output.summary.total_frames,
            output.summary.tracks_created,
            output.summary.average_processing_ms
        );
        Ok(output)
    }

    /// Processes a session and writes `report.json` into `output_dir`.
    pub fn process_to_dir<P: AsRef<Path>>(
        &self,
        algorithm: Algorithm,
        input_dir: P,
        output_dir: &Path,
        limits: &RunLimits,
    ) -> Result<ProcessingOutput> {
        let output = self.process_session(algorithm, input_dir, Some(output_dir), limits)?;
        output.write_json(output_dir.join(REPORT_FILE))?;
        Ok(output)
    }
}

fn frame_path(dir: &Path, index: u64) -> PathBuf {
    dir.join(format!("frame_{index:04}.png"))
}

fn sink_error(err: ProcessingError) -> EngineError {
    EngineError::Sink(Box::new(err))
}

/// Recovers the CLI error a source or sink raised inside the engine loop.
fn engine_failure(err: EngineError) -> ProcessingError {
    match err {
        EngineError::Source(inner) => inner
            .downcast::<ProcessingError>()
            .map(|typed| *typed)
            .unwrap_or_else(|inner| EngineError::Source(inner).into()),
        EngineError::Sink(inner) => inner
            .downcast::<ProcessingError>()
            .map(|typed| *typed)
            .unwrap_or_else(|inner| EngineError::Sink(inner).into()),
        other => other.into(),
    }
}

struct OverlaySink<'a> {
    renderer: TrackOverlayRenderer,
    colour: ColourFrame,
    output_dir: Option<PathBuf>,
    analysis: &'a mut AnalysisCollector,
    last: Instant,
}

impl TrackSink for OverlaySink<'_> {
    fn consume(&mut self, frame: &Frame, report: &FrameReport) -> lkflow_engine::Result<()> {
        let processing_ms = self.last.elapsed().as_secs_f64() * 1000.0;
        if let Some(dir) = &self.output_dir {
            let path = frame_path(dir, report.frame_index);
            let fallback: RgbImage;
            let colour = self.colour.borrow();
            let base = match colour.as_ref() {
                Some(image) => image,
                None => {
                    fallback = DynamicImage::ImageLuma8(frame_to_gray(frame)).to_rgb8();
                    &fallback
                }
            };
            self.renderer
                .render_to(base, report, &path)
                .map_err(sink_error)?;
            debug!("Wrote {}", path.display());
        }
        self.analysis.add_frame_stat(FrameStat {
            frame: report.frame_index,
            active_tracks: report.active_count(),
            lost_tracks: report.lost.len(),
            seeded: report.tracking.seeded,
            average_residual: report.tracking.average_residual,
            mean_flow_magnitude: None,
            processing_ms,
        });
        info!(
            "Frame {}: {} active, {} lost ({:.2}ms)",
            report.frame_index,
            report.active_count(),
            report.lost.len(),
            processing_ms
        );
        self.last = Instant::now();
        Ok(())
    }
}

struct HsvSink<'a> {
    writer: FlowImageWriter,
    output_dir: Option<PathBuf>,
    analysis: &'a mut AnalysisCollector,
    last: Instant,
    /// Index of the later frame of the pair the next field belongs to.
    next_frame: u64,
}

impl FlowSink for HsvSink<'_> {
    fn consume(&mut self, _frame: &Frame, flow: &FlowField) -> lkflow_engine::Result<()> {
        let processing_ms = self.last.elapsed().as_secs_f64() * 1000.0;
        let index = self.next_frame;
        self.next_frame += 1;
        if let Some(dir) = &self.output_dir {
            let path = frame_path(dir, index);
            self.writer.write(flow, &path).map_err(sink_error)?;
            debug!("Wrote {}", path.display());
        }
        let magnitude = flow.mean_magnitude() as f64;
        self.analysis.add_frame_stat(FrameStat {
            frame: index,
            mean_flow_magnitude: Some(magnitude),
            processing_ms,
            ..FrameStat::default()
        });
        info!("Frame {index}: mean flow {magnitude:.3}px ({processing_ms:.2}ms)");
        self.last = Instant::now();
        Ok(())
    }
}
