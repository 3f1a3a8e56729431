use nalgebra::Vector2;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ForwardBackwardMetrics {
    /// Displacement of the forward track (pixels).
    pub displacement: f32,
    /// Distance between the origin and the back-tracked position, if back-tracking succeeded.
    pub round_trip_error: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackHealth {
    pub valid: bool,
    pub metrics: ForwardBackwardMetrics,
}

impl TrackHealth {
    /// Forward-backward consistency: a track is healthy when tracking the
    /// forward result back lands within `max_round_trip` of where it started.
    /// A failed backward track (`None`) is unhealthy.
    pub fn evaluate(
        origin: Vector2<f32>,
        forward: Vector2<f32>,
        backward: Option<Vector2<f32>>,
        max_round_trip: f32,
    ) -> Self {
        let displacement = (forward - origin).norm();
        let round_trip_error = backward.map(|b| (b - origin).norm());
        let valid = round_trip_error
            .map(|err| err <= max_round_trip)
            .unwrap_or(false);
        Self {
            valid,
            metrics: ForwardBackwardMetrics {
                displacement,
                round_trip_error,
            },
        }
    }
}
