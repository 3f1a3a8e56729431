pub mod health;
pub mod lk;
pub mod seed;

pub use health::{ForwardBackwardMetrics, TrackHealth};
pub use lk::{LKTracker, LucasKanadeConfig, TrackObservation, TrackOutcome, TrackStatus};
pub use seed::{
    select_features, FeatureSeed, FeatureSeederTrait, ShiTomasiConfig, ShiTomasiSeeder,
};
