pub mod error;
pub mod flow;
pub mod img;
pub mod track;

pub use error::{FlowError, Result};
pub use flow::{dense_flow, encode_hsv, FlowField};
pub use img::{build_pyramid, Frame, Pyramid, PyramidLevel};
pub use track::{
    select_features, FeatureSeed, LKTracker, LucasKanadeConfig, ShiTomasiConfig,
    TrackObservation, TrackOutcome, TrackStatus,
};
