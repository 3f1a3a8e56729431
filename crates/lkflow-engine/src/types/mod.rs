pub mod snapshot;

pub use snapshot::{FrameReport, RunSummary, StopReason, TrackSnapshot, TrackingMetrics};
