use super::FeatureSeed;
use nalgebra::Vector2;

/// Greedy minimum-distance suppression over seeds sorted by descending score.
///
/// A seed is dropped when it lies strictly closer than `min_distance` to an
/// already accepted seed or to one of the `occupied` positions. Stops after
/// `max_keep` seeds.
pub fn radius_nms(
    seeds: Vec<FeatureSeed>,
    min_distance: f32,
    max_keep: usize,
    occupied: &[Vector2<f32>],
) -> Vec<FeatureSeed> {
    let r2 = min_distance * min_distance;
    let mut kept: Vec<FeatureSeed> = Vec::with_capacity(max_keep.min(seeds.len()));
    if max_keep == 0 {
        return kept;
    }
    'outer: for s in seeds {
        if min_distance > 0.0 {
            for k in kept.iter().map(|k| &k.px_uv).chain(occupied.iter()) {
                if (s.px_uv - k).norm_squared() < r2 {
                    continue 'outer;
                }
            }
        }
        kept.push(s);
        if kept.len() == max_keep {
            break;
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(x: f32, y: f32, score: f32) -> FeatureSeed {
        FeatureSeed {
            px_uv: Vector2::new(x, y),
            score,
        }
    }

    #[test]
    fn keeps_strongest_and_suppresses_neighbours() {
        let seeds = vec![seed(10.0, 10.0, 9.0), seed(12.0, 10.0, 8.0), seed(17.0, 10.0, 7.0)];
        let kept = radius_nms(seeds, 7.0, 10, &[]);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].px_uv, Vector2::new(10.0, 10.0));
        assert_eq!(kept[1].px_uv, Vector2::new(17.0, 10.0));
    }

    #[test]
    fn respects_occupied_positions_and_cap() {
        let seeds = vec![seed(0.0, 0.0, 3.0), seed(20.0, 0.0, 2.0), seed(40.0, 0.0, 1.0)];
        let kept = radius_nms(seeds.clone(), 5.0, 10, &[Vector2::new(1.0, 1.0)]);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].px_uv.x, 20.0);

        let capped = radius_nms(seeds, 5.0, 1, &[]);
        assert_eq!(capped.len(), 1);
    }
}
