use std::collections::BTreeMap;

use lkflow_core::img::Pyramid;
use lkflow_core::track::{
    FeatureSeed, LKTracker, TrackHealth, TrackObservation, TrackOutcome, TrackStatus,
};
use lkflow_core::FlowError;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct TrackPoint {
    pub id: u64,
    pub position: Vector2<f32>,
    /// Position in the previous frame (equal to `position` on the frame the
    /// point was admitted).
    pub previous: Vector2<f32>,
    pub status: TrackStatus,
    /// Frames survived since admission.
    pub age: u32,
    /// Residual of the last tracking step.
    pub residual: f32,
    /// Corner strength at selection.
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct TrackConfig {
    /// Minimum spacing between active points after a replenish pass (pixels).
    pub min_distance: f32,
    /// Forward-backward round-trip bound (pixels); `None` disables the check.
    pub max_forward_backward_error: Option<f32>,
    pub target_tracks: usize,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            min_distance: 7.0,
            max_forward_backward_error: None,
            target_tracks: 100,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvanceStats {
    pub advanced: usize,
    pub lost: usize,
    pub singular: usize,
    pub out_of_bounds: usize,
    pub high_residual: usize,
    pub fb_fail: usize,
}

#[derive(Debug, Default, Clone)]
pub struct AdvanceReport {
    pub stats: AdvanceStats,
    /// Points dropped during this step, with `status == Lost`.
    pub lost: Vec<TrackPoint>,
}

#[derive(Debug, Default, Clone)]
pub struct ReplenishReport {
    pub admitted: Vec<u64>,
    /// Younger points removed for crowding an older one.
    pub suppressed: Vec<TrackPoint>,
}

/// Batch point tracker between two pyramids.
pub trait FlowTracker: Send + Sync {
    fn track(
        &self,
        prev: &Pyramid,
        next: &Pyramid,
        points: &[Vector2<f32>],
    ) -> Result<Vec<TrackObservation>, FlowError>;
}

impl FlowTracker for LKTracker {
    fn track(
        &self,
        prev: &Pyramid,
        next: &Pyramid,
        points: &[Vector2<f32>],
    ) -> Result<Vec<TrackObservation>, FlowError> {
        LKTracker::track(self, prev, next, points)
    }
}

/// Live set of tracked points. Iteration follows id order, which is the order
/// points were discovered in.
pub struct TrackManager<T: FlowTracker> {
    tracks: BTreeMap<u64, TrackPoint>,
    next_id: u64,
    tracker: T,
    config: TrackConfig,
}

impl<T: FlowTracker> TrackManager<T> {
    pub fn new(tracker: T, config: TrackConfig) -> Self {
        Self {
            tracks: BTreeMap::new(),
            next_id: 1,
            tracker,
            config,
        }
    }

    pub fn config(&self) -> &TrackConfig {
        &self.config
    }

    pub fn tracks(&self) -> impl Iterator<Item = &TrackPoint> {
        self.tracks.values()
    }

    pub fn get(&self, id: u64) -> Option<&TrackPoint> {
        self.tracks.get(&id)
    }

    pub fn active_points(&self) -> Vec<Vector2<f32>> {
        self.tracks.values().map(|t| t.position).collect()
    }

    pub fn alive_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn need_more_features(&self) -> bool {
        self.alive_count() < self.config.target_tracks
    }

    /// Tracks every active point from `prev` into `next` and drops the ones
    /// that fail.
    pub fn advance(&mut self, prev: &Pyramid, next: &Pyramid) -> Result<AdvanceReport, FlowError> {
        let mut report = AdvanceReport::default();
        if self.tracks.is_empty() {
            return Ok(report);
        }

        let ids: Vec<u64> = self.tracks.keys().copied().collect();
        let origins = self.active_points();
        let forward = self.tracker.track(prev, next, &origins)?;

        let backward = match self.config.max_forward_backward_error {
            Some(_) => {
                let refined: Vec<Vector2<f32>> = forward.iter().map(|o| o.refined_px_uv).collect();
                Some(self.tracker.track(next, prev, &refined)?)
            }
            None => None,
        };

        for (idx, (id, obs)) in ids.iter().zip(&forward).enumerate() {
            let verdict = match obs.outcome {
                TrackOutcome::Converged | TrackOutcome::IterationLimit => None,
                TrackOutcome::Singular => {
                    report.stats.singular += 1;
                    Some("singular gradient matrix")
                }
                TrackOutcome::OutOfBounds | TrackOutcome::Diverged => {
                    report.stats.out_of_bounds += 1;
                    Some("left the frame")
                }
                TrackOutcome::HighResidual => {
                    report.stats.high_residual += 1;
                    Some("residual above bound")
                }
            };

            let verdict = verdict.or_else(|| {
                let (Some(max_error), Some(backward)) =
                    (self.config.max_forward_backward_error, backward.as_ref())
                else {
                    return None;
                };
                let back = &backward[idx];
                let back_px = back.outcome.is_tracked().then_some(back.refined_px_uv);
                let health =
                    TrackHealth::evaluate(obs.initial_px_uv, obs.refined_px_uv, back_px, max_error);
                if health.valid {
                    None
                } else {
                    report.stats.fb_fail += 1;
                    Some("forward-backward check failed")
                }
            });

            if let Some(reason) = verdict {
                if let Some(mut track) = self.tracks.remove(id) {
                    debug!("Track {id} lost: {reason} ({:?})", obs.outcome);
                    track.status = TrackStatus::Lost;
                    report.lost.push(track);
                }
                report.stats.lost += 1;
                continue;
            }

            if let Some(track) = self.tracks.get_mut(id) {
                track.previous = track.position;
                track.position = obs.refined_px_uv;
                track.residual = obs.residual;
                track.age = track.age.saturating_add(1);
                report.stats.advanced += 1;
            }
        }

        info!(
            "Advanced {} tracks, lost {} (singular {}, out of bounds {}, residual {}, fb {})",
            report.stats.advanced,
            report.stats.lost,
            report.stats.singular,
            report.stats.out_of_bounds,
            report.stats.high_residual,
            report.stats.fb_fail
        );
        Ok(report)
    }

    /// Suppresses crowded points, then admits `seeds` that keep clear of every
    /// active point. Admitted points get fresh ids in seed order.
    pub fn replenish(&mut self, seeds: &[FeatureSeed]) -> ReplenishReport {
        let mut report = ReplenishReport::default();
        let r2 = self.config.min_distance * self.config.min_distance;

        let mut kept: Vec<Vector2<f32>> = Vec::with_capacity(self.tracks.len());
        let mut crowded = Vec::new();
        for track in self.tracks.values() {
            if kept.iter().any(|k| (k - track.position).norm_squared() < r2) {
                crowded.push(track.id);
            } else {
                kept.push(track.position);
            }
        }
        for id in crowded {
            if let Some(mut track) = self.tracks.remove(&id) {
                debug!("Track {id} suppressed: converged onto an older track");
                track.status = TrackStatus::Lost;
                report.suppressed.push(track);
            }
        }

        for seed in seeds {
            if kept.iter().any(|k| (k - seed.px_uv).norm_squared() < r2) {
                continue;
            }
            let id = self.admit(seed);
            kept.push(seed.px_uv);
            report.admitted.push(id);
        }

        if !report.admitted.is_empty() || !report.suppressed.is_empty() {
            info!(
                "Replenished {} tracks, suppressed {}, now {} active",
                report.admitted.len(),
                report.suppressed.len(),
                self.alive_count()
            );
        }
        report
    }

    fn admit(&mut self, seed: &FeatureSeed) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.tracks.insert(
            id,
            TrackPoint {
                id,
                position: seed.px_uv,
                previous: seed.px_uv,
                status: TrackStatus::Active,
                age: 0,
                residual: 0.0,
                score: seed.score,
            },
        );
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use lkflow_core::img::{build_pyramid, Frame};

    /// Moves every point by `shift`, loses points right of `lose_beyond_x` and
    /// drifts backward tracks by `back_drift`. The pyramid with the darker base
    /// is the earlier frame.
    struct ScriptedTracker {
        shift: Vector2<f32>,
        lose_beyond_x: f32,
        back_drift: Vector2<f32>,
    }

    impl FlowTracker for ScriptedTracker {
        fn track(
            &self,
            prev: &Pyramid,
            next: &Pyramid,
            points: &[Vector2<f32>],
        ) -> Result<Vec<TrackObservation>, FlowError> {
            let forward =
                prev.base().image.get_pixel(0, 0).0[0] < next.base().image.get_pixel(0, 0).0[0];
            Ok(points
                .iter()
                .map(|&p| {
                    let (refined, outcome) = if forward {
                        let outcome = if p.x > self.lose_beyond_x {
                            TrackOutcome::OutOfBounds
                        } else {
                            TrackOutcome::Converged
                        };
                        (p + self.shift, outcome)
                    } else {
                        (p - self.shift + self.back_drift, TrackOutcome::Converged)
                    };
                    TrackObservation {
                        initial_px_uv: p,
                        refined_px_uv: refined,
                        iterations: 1,
                        residual: 0.01,
                        min_eigenvalue: 1.0,
                        outcome,
                    }
                })
                .collect())
        }
    }

    fn pyramids() -> (Pyramid, Pyramid) {
        let a = build_pyramid(&Frame::from_pixel(8, 8, Luma([0.0])), 1).unwrap();
        let b = build_pyramid(&Frame::from_pixel(8, 8, Luma([1.0])), 1).unwrap();
        (a, b)
    }

    fn seed(x: f32, y: f32) -> FeatureSeed {
        FeatureSeed {
            px_uv: Vector2::new(x, y),
            score: 1.0,
        }
    }

    fn manager(fb: Option<f32>, back_drift: Vector2<f32>) -> TrackManager<ScriptedTracker> {
        TrackManager::new(
            ScriptedTracker {
                shift: Vector2::new(1.0, 2.0),
                lose_beyond_x: 50.0,
                back_drift,
            },
            TrackConfig {
                min_distance: 5.0,
                max_forward_backward_error: fb,
                target_tracks: 3,
            },
        )
    }

    #[test]
    fn ids_are_monotonic_and_lost_points_leave() {
        let (a, b) = pyramids();
        let mut tm = manager(None, Vector2::zeros());
        let first = tm.replenish(&[seed(10.0, 10.0), seed(60.0, 10.0)]);
        assert_eq!(first.admitted, vec![1, 2]);

        let report = tm.advance(&a, &b).unwrap();
        assert_eq!(report.stats.advanced, 1);
        assert_eq!(report.stats.out_of_bounds, 1);
        assert_eq!(report.lost.len(), 1);
        assert_eq!(report.lost[0].id, 2);
        assert_eq!(report.lost[0].status, TrackStatus::Lost);
        assert!(tm.get(2).is_none());

        let kept = tm.get(1).unwrap();
        assert_eq!(kept.position, Vector2::new(11.0, 12.0));
        assert_eq!(kept.previous, Vector2::new(10.0, 10.0));
        assert_eq!(kept.age, 1);

        let again = tm.replenish(&[seed(60.0, 10.0)]);
        assert_eq!(again.admitted, vec![3]);
        let ids: Vec<u64> = tm.tracks().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn replenish_keeps_spacing() {
        let mut tm = manager(None, Vector2::zeros());
        tm.replenish(&[seed(10.0, 10.0)]);
        let report = tm.replenish(&[seed(12.0, 10.0), seed(20.0, 10.0), seed(22.0, 11.0)]);
        assert_eq!(report.admitted, vec![2]);
        assert_eq!(tm.alive_count(), 2);
        assert!(tm.need_more_features());
    }

    #[test]
    fn younger_point_converging_onto_older_is_suppressed() {
        let (a, b) = pyramids();
        let mut tm = manager(None, Vector2::zeros());
        tm.replenish(&[seed(10.0, 10.0), seed(20.0, 10.0)]);
        tm.advance(&a, &b).unwrap();
        // Force the younger point next to the older one.
        if let Some(track) = tm.tracks.get_mut(&2) {
            track.position = Vector2::new(12.0, 12.0);
        }
        let report = tm.replenish(&[]);
        assert_eq!(report.suppressed.len(), 1);
        assert_eq!(report.suppressed[0].id, 2);
        assert_eq!(tm.alive_count(), 1);
    }

    #[test]
    fn forward_backward_check_drops_drifting_tracks() {
        let (a, b) = pyramids();
        let mut strict = manager(Some(0.5), Vector2::new(1.0, 0.0));
        strict.replenish(&[seed(10.0, 10.0)]);
        let report = strict.advance(&a, &b).unwrap();
        assert_eq!(report.stats.fb_fail, 1);
        assert_eq!(strict.alive_count(), 0);

        let mut lenient = manager(Some(2.0), Vector2::new(1.0, 0.0));
        lenient.replenish(&[seed(10.0, 10.0)]);
        let report = lenient.advance(&a, &b).unwrap();
        assert_eq!(report.stats.advanced, 1);
        assert_eq!(report.stats.fb_fail, 0);
    }

    #[test]
    fn empty_manager_advances_trivially() {
        let (a, b) = pyramids();
        let mut tm = manager(None, Vector2::zeros());
        let report = tm.advance(&a, &b).unwrap();
        assert_eq!(report.stats, AdvanceStats::default());
        assert!(tm.need_more_features());
    }
}
