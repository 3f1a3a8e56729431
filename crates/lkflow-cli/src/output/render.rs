use std::path::Path;

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};
use lkflow_core::flow::{encode_hsv, FlowField};
use lkflow_engine::FrameReport;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::errors::Result;

/// Draws track trails and markers over the colour frame. Trails accumulate
/// across frames on a separate layer that is added onto every output.
pub struct TrackOverlayRenderer {
    trails: Option<RgbImage>,
    thickness: u32,
    marker_radius: i32,
}

impl TrackOverlayRenderer {
    pub fn new(thickness: u32, marker_radius: i32) -> Self {
        Self {
            trails: None,
            thickness: thickness.max(1),
            marker_radius,
        }
    }

    pub fn render(&mut self, frame: &RgbImage, report: &FrameReport) -> RgbImage {
        let (width, height) = frame.dimensions();
        let trails = self
            .trails
            .get_or_insert_with(|| RgbImage::new(width, height));

        for track in report.tracks.iter().filter(|t| t.age > 0) {
            let colour = track_colour(track.id);
            let from = (track.previous[0], track.previous[1]);
            let to = (track.position[0], track.position[1]);
            for oy in 0..self.thickness {
                for ox in 0..self.thickness {
                    let (dx, dy) = (ox as f32, oy as f32);
                    draw_line_segment_mut(trails, (from.0 + dx, from.1 + dy), (to.0 + dx, to.1 + dy), colour);
                }
            }
        }

        let mut out = RgbImage::from_fn(width, height, |x, y| {
            let base = frame.get_pixel(x, y).0;
            let trail = trails.get_pixel(x, y).0;
            Rgb([0, 1, 2].map(|c| base[c].saturating_add(trail[c])))
        });

        for track in &report.tracks {
            let centre = (
                track.position[0].round() as i32,
                track.position[1].round() as i32,
            );
            draw_filled_circle_mut(&mut out, centre, self.marker_radius, track_colour(track.id));
        }
        out
    }

    pub fn render_to<P: AsRef<Path>>(
        &mut self,
        frame: &RgbImage,
        report: &FrameReport,
        path: P,
    ) -> Result<()> {
        self.render(frame, report).save(path)?;
        Ok(())
    }
}

/// Stable pseudo-random colour per track id.
pub fn track_colour(id: u64) -> Rgb<u8> {
    let mut rng = StdRng::seed_from_u64(id);
    Rgb([rng.gen(), rng.gen(), rng.gen()])
}

/// Writes HSV-encoded flow fields as PNG images.
#[derive(Debug, Default, Clone, Copy)]
pub struct FlowImageWriter;

impl FlowImageWriter {
    pub fn write<P: AsRef<Path>>(&self, field: &FlowField, path: P) -> Result<()> {
        encode_hsv(field).save(path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lkflow_engine::TrackSnapshot;

    fn report(tracks: Vec<TrackSnapshot>) -> FrameReport {
        FrameReport {
            tracks,
            ..FrameReport::default()
        }
    }

    fn snapshot(id: u64, previous: [f32; 2], position: [f32; 2], age: u32) -> TrackSnapshot {
        TrackSnapshot {
            id,
            position,
            previous,
            age,
            residual: 0.0,
            score: 1.0,
        }
    }

    #[test]
    fn colours_are_stable_per_id() {
        assert_eq!(track_colour(7), track_colour(7));
        assert_ne!(track_colour(7), track_colour(8));
    }

    #[test]
    fn markers_and_trails_are_drawn() {
        let frame = RgbImage::new(32, 32);
        let mut renderer = TrackOverlayRenderer::new(2, 3);
        let colour = track_colour(1);

        let first = renderer.render(&frame, &report(vec![snapshot(1, [5.0, 5.0], [5.0, 5.0], 0)]));
        assert_eq!(*first.get_pixel(5, 5), colour);
        assert_eq!(*first.get_pixel(20, 5), Rgb([0, 0, 0]));

        let second = renderer.render(
            &frame,
            &report(vec![snapshot(1, [5.0, 5.0], [25.0, 5.0], 1)]),
        );
        // Trail midpoint, away from both markers.
        assert_eq!(*second.get_pixel(15, 5), colour);
        assert_eq!(*second.get_pixel(25, 5), colour);

        // Trails persist once the track is gone.
        let third = renderer.render(&frame, &report(vec![]));
        assert_eq!(*third.get_pixel(15, 5), colour);
        assert_eq!(*third.get_pixel(5, 20), Rgb([0, 0, 0]));
    }

    #[test]
    fn colour_frame_shows_through_and_saturates_under_trails() {
        let frame = RgbImage::from_pixel(16, 16, Rgb([10, 120, 250]));
        let mut renderer = TrackOverlayRenderer::new(1, 1);
        renderer.render(&frame, &report(vec![snapshot(3, [2.0, 8.0], [2.0, 8.0], 0)]));
        let out = renderer.render(
            &frame,
            &report(vec![snapshot(3, [2.0, 8.0], [13.0, 8.0], 1)]),
        );

        assert_eq!(*out.get_pixel(8, 2), Rgb([10, 120, 250]));
        let colour = track_colour(3).0;
        let expected = [0, 1, 2].map(|c| frame.get_pixel(0, 0).0[c].saturating_add(colour[c]));
        assert_eq!(out.get_pixel(7, 8).0, expected);
    }

    #[test]
    fn flow_images_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flow.png");
        FlowImageWriter.write(&FlowField::new(6, 4), &path).unwrap();
        let decoded = image::open(&path).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (6, 4));
    }
}
