use image::{Rgb, RgbImage};

use super::FlowField;

/// Colour-codes a flow field: hue follows the flow angle, saturation is full
/// and value is the magnitude min-max normalized over the field.
///
/// A field whose magnitudes are all equal (including all zero) renders black.
pub fn encode_hsv(field: &FlowField) -> RgbImage {
    let (magnitudes, angles) = field.magnitude_angle();
    let (lo, hi) = magnitudes
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &m| {
            (lo.min(m), hi.max(m))
        });
    let range = hi - lo;
    let width = field.width() as usize;

    RgbImage::from_fn(field.width(), field.height(), |x, y| {
        let idx = y as usize * width + x as usize;
        let value = if range > f32::EPSILON {
            (magnitudes[idx] - lo) / range
        } else {
            0.0
        };
        hsv_to_rgb(angles[idx].to_degrees(), 1.0, value)
    })
}

fn hsv_to_rgb(hue_deg: f32, saturation: f32, value: f32) -> Rgb<u8> {
    let h = hue_deg.rem_euclid(360.0) / 60.0;
    let c = value * saturation;
    let x = c * (1.0 - (h % 2.0 - 1.0).abs());
    let m = value - c;
    let (r, g, b) = match h as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let to_u8 = |v: f32| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgb([to_u8(r), to_u8(g), to_u8(b)])
}
