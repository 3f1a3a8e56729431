use image::Luma;
use lkflow_core::{
    build_pyramid, select_features, FeatureSeed, Frame, LKTracker, LucasKanadeConfig,
    ShiTomasiConfig, TrackOutcome,
};
use nalgebra::Vector2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const CANVAS: u32 = 96;
const SIZE: u32 = 64;

/// Smoothed random texture large enough to crop shifted windows from.
fn noise_canvas(seed: u64) -> Frame {
    let mut rng = StdRng::seed_from_u64(seed);
    let raw = Frame::from_fn(CANVAS, CANVAS, |_, _| Luma([rng.gen::<f32>()]));
    let kernel = [1.0f32, 2.0, 1.0];
    Frame::from_fn(CANVAS, CANVAS, |x, y| {
        let mut acc = 0.0;
        for (j, ky) in kernel.iter().enumerate() {
            for (i, kx) in kernel.iter().enumerate() {
                let sx = (x as i64 + i as i64 - 1).clamp(0, CANVAS as i64 - 1) as u32;
                let sy = (y as i64 + j as i64 - 1).clamp(0, CANVAS as i64 - 1) as u32;
                acc += kx * ky * raw.get_pixel(sx, sy).0[0];
            }
        }
        Luma([acc / 16.0])
    })
}

/// Window of `canvas` whose content appears moved by `(dx, dy)` relative to
/// the window at the origin offset.
fn crop_shifted(canvas: &Frame, dx: i64, dy: i64) -> Frame {
    let origin = 16i64;
    Frame::from_fn(SIZE, SIZE, |x, y| {
        let sx = (origin + x as i64 - dx) as u32;
        let sy = (origin + y as i64 - dy) as u32;
        *canvas.get_pixel(sx, sy)
    })
}

fn selection_config() -> ShiTomasiConfig {
    ShiTomasiConfig {
        max_corners: 100,
        quality_level: 0.01,
        min_distance: 3.0,
        block_size: 5,
    }
}

#[test]
fn features_on_noise_follow_global_translation() {
    let canvas = noise_canvas(7);
    let prev = crop_shifted(&canvas, 0, 0);
    let next = crop_shifted(&canvas, 3, -2);

    let seeds = select_features(&prev, &selection_config()).unwrap();
    assert_eq!(seeds.len(), 100);

    let config = LucasKanadeConfig::default();
    let prev_pyr = build_pyramid(&prev, config.pyramid_levels()).unwrap();
    let next_pyr = build_pyramid(&next, config.pyramid_levels()).unwrap();
    let points: Vec<Vector2<f32>> = seeds.iter().map(|s| s.px_uv).collect();
    let observations = LKTracker::new(config)
        .track(&prev_pyr, &next_pyr, &points)
        .unwrap();

    assert_eq!(observations.len(), points.len());
    let expected = Vector2::new(3.0, -2.0);
    let active: Vec<_> = observations
        .iter()
        .filter(|o| o.outcome.is_tracked())
        .collect();
    assert!(
        active.len() * 100 >= observations.len() * 95,
        "{} of {} active",
        active.len(),
        observations.len()
    );
    let mean_error = active
        .iter()
        .map(|o| (o.displacement() - expected).norm())
        .sum::<f32>()
        / active.len() as f32;
    assert!(mean_error < 0.5, "mean error {mean_error}");
}

#[test]
fn identical_frames_keep_every_feature_in_place() {
    let frame = crop_shifted(&noise_canvas(11), 0, 0);
    let seeds = select_features(&frame, &selection_config()).unwrap();
    let config = LucasKanadeConfig::default();
    let pyr = build_pyramid(&frame, config.pyramid_levels()).unwrap();
    let points: Vec<Vector2<f32>> = seeds.iter().map(|s| s.px_uv).collect();
    let observations = LKTracker::new(config).track(&pyr, &pyr, &points).unwrap();
    for obs in observations {
        assert_eq!(obs.outcome, TrackOutcome::Converged);
        assert!(obs.displacement().norm() < 1e-3);
    }
}

/// Checkerboard with 2px cells: textured at full resolution, flat once the
/// pyramid blurs and decimates it.
fn fine_checkerboard(size: u32) -> Frame {
    Frame::from_fn(size, size, |x, y| Luma([((x / 2 + y / 2) % 2) as f32]))
}

#[test]
fn fine_texture_is_tracked_in_place_across_the_pyramid() {
    let frame = fine_checkerboard(SIZE);
    let seeds = select_features(&frame, &ShiTomasiConfig::default()).unwrap();
    assert!(!seeds.is_empty());

    let config = LucasKanadeConfig {
        max_level: 2,
        ..LucasKanadeConfig::default()
    };
    let pyr = build_pyramid(&frame, config.pyramid_levels()).unwrap();
    let points: Vec<Vector2<f32>> = seeds.iter().map(|s| s.px_uv).collect();
    let observations = LKTracker::new(config).track(&pyr, &pyr, &points).unwrap();
    assert_eq!(observations.len(), points.len());
    for obs in observations {
        assert!(obs.outcome.is_tracked(), "{obs:?}");
        assert!(obs.displacement().norm() <= config.epsilon, "{obs:?}");
    }
}

#[test]
fn selection_respects_spacing_and_budget() {
    let frame = crop_shifted(&noise_canvas(3), 0, 0);
    for (max_corners, min_distance) in [(10usize, 4.0f32), (50, 6.0), (200, 2.0)] {
        let config = ShiTomasiConfig {
            max_corners,
            min_distance,
            ..selection_config()
        };
        let seeds: Vec<FeatureSeed> = select_features(&frame, &config).unwrap();
        assert!(seeds.len() <= max_corners);
        for (i, a) in seeds.iter().enumerate() {
            for b in &seeds[i + 1..] {
                assert!((a.px_uv - b.px_uv).norm() >= min_distance);
            }
        }
    }
}

#[test]
fn pyramid_levels_halve_for_arbitrary_sizes() {
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..8 {
        let w = rng.gen_range(16..120);
        let h = rng.gen_range(16..120);
        let frame = Frame::from_pixel(w, h, Luma([0.5]));
        let pyramid = build_pyramid(&frame, 4).unwrap();
        for (k, level) in pyramid.levels().iter().enumerate() {
            assert_eq!((level.width(), level.height()), (w >> k, h >> k));
        }
    }
}
