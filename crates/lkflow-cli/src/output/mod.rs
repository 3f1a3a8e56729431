pub mod analysis;
pub mod json;
pub mod render;

pub use analysis::AnalysisCollector;
pub use json::{FrameStat, Metadata, ProcessingOutput, Summary};
pub use render::{FlowImageWriter, TrackOverlayRenderer};
