use lkflow_core::flow::{dense_flow, FlowField};
use lkflow_core::img::{build_pyramid, Frame, Pyramid};
use lkflow_core::track::LKTracker;
use log::debug;
use tracing::debug_span;

use crate::runner::drive;
use crate::types::RunSummary;
use crate::{EngineConfig, FlowSink, FrameSource, Result, RunLimits};

/// Frame-sequential dense flow: one field per consecutive frame pair.
pub struct DenseFlowEngine {
    tracker: LKTracker,
    grid_step: usize,
    levels: usize,
    prev_pyramid: Option<Pyramid>,
    frame_index: u64,
}

impl DenseFlowEngine {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            tracker: LKTracker::new(config.tracking),
            grid_step: config.grid_step,
            levels: config.tracking.pyramid_levels(),
            prev_pyramid: None,
            frame_index: 0,
        })
    }

    /// Returns `None` for the first frame, which only primes the engine.
    pub fn process_frame(&mut self, frame: &Frame) -> Result<Option<FlowField>> {
        let _span = debug_span!("dense_frame", index = self.frame_index).entered();
        let pyramid = build_pyramid(frame, self.levels)?;
        let field = match self.prev_pyramid.as_ref() {
            Some(prev) => {
                let field = dense_flow(prev, &pyramid, &self.tracker, self.grid_step)?;
                debug!(
                    "Frame {}: mean flow magnitude {:.3}px",
                    self.frame_index,
                    field.mean_magnitude()
                );
                Some(field)
            }
            None => None,
        };
        self.prev_pyramid = Some(pyramid);
        self.frame_index += 1;
        Ok(field)
    }

    pub fn run<S, K>(&mut self, source: &mut S, sink: &mut K, limits: &RunLimits) -> Result<RunSummary>
    where
        S: FrameSource + ?Sized,
        K: FlowSink + ?Sized,
    {
        drive(source, limits, |_, frame| match self.process_frame(frame)? {
            Some(field) => sink.consume(frame, &field),
            None => Ok(()),
        })
    }
}
