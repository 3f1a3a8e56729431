use std::time::Instant;

use log::{debug, info};

use crate::types::{RunSummary, StopReason};
use crate::{CancelToken, FrameSource, Result};
use lkflow_core::img::Frame;

/// Stop conditions of a frame loop, checked between frames.
#[derive(Debug, Clone, Default)]
pub struct RunLimits {
    pub max_frames: Option<u64>,
    pub cancel: CancelToken,
}

impl RunLimits {
    pub fn frames(max_frames: u64) -> Self {
        Self {
            max_frames: Some(max_frames),
            cancel: CancelToken::new(),
        }
    }
}

/// Pulls frames from `source` and hands each to `step` until a limit is hit.
pub(crate) fn drive<S, F>(source: &mut S, limits: &RunLimits, mut step: F) -> Result<RunSummary>
where
    S: FrameSource + ?Sized,
    F: FnMut(u64, &Frame) -> Result<()>,
{
    let start = Instant::now();
    let mut processed = 0u64;

    let stop_reason = loop {
        if limits.cancel.is_cancelled() {
            break StopReason::Cancelled;
        }
        if limits.max_frames.is_some_and(|max| processed >= max) {
            break StopReason::FrameLimit;
        }
        let Some(frame) = source.next_frame()? else {
            break StopReason::SourceExhausted;
        };
        let frame_start = Instant::now();
        step(processed, &frame)?;
        debug!(
            "Frame {processed} processed in {:.2}ms",
            frame_start.elapsed().as_secs_f64() * 1000.0
        );
        processed += 1;
    };

    let elapsed = start.elapsed().as_secs_f64();
    info!("Run stopped ({stop_reason:?}) after {processed} frames in {elapsed:.2}s");
    Ok(RunSummary {
        frames_processed: processed,
        stop_reason,
        elapsed_secs: elapsed,
    })
}
