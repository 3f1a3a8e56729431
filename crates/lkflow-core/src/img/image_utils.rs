use image::{GenericImageView, Luma};

/// Bilinear sample of a single-channel image at a sub-pixel position.
///
/// Pixel centres sit on integer coordinates. Returns `None` when the position
/// lies outside `[0, width - 1] x [0, height - 1]`, so callers never read past
/// the buffer.
pub fn bilinear_sample_luma<T, I>(img: &I, x: f32, y: f32) -> Option<f32>
where
    I: GenericImageView<Pixel = Luma<T>>,
    T: Copy + Into<f32> + image::Primitive,
{
    if !x.is_finite() || !y.is_finite() || x < 0.0 || y < 0.0 {
        return None;
    }
    let w = img.width();
    let h = img.height();
    if w == 0 || h == 0 || x > (w - 1) as f32 || y > (h - 1) as f32 {
        return None;
    }

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);

    let dx = x - x0 as f32;
    let dy = y - y0 as f32;

    let p00: f32 = img.get_pixel(x0, y0).0[0].into();
    let p10: f32 = img.get_pixel(x1, y0).0[0].into();
    let p01: f32 = img.get_pixel(x0, y1).0[0].into();
    let p11: f32 = img.get_pixel(x1, y1).0[0].into();

    let top = p00 + dx * (p10 - p00);
    let bot = p01 + dx * (p11 - p01);
    Some(top + dy * (bot - top))
}

/// Reads a sample with replicated borders.
#[inline]
pub fn clamped_luma<I>(img: &I, x: i64, y: i64) -> f32
where
    I: GenericImageView<Pixel = Luma<f32>>,
{
    let cx = x.clamp(0, img.width() as i64 - 1) as u32;
    let cy = y.clamp(0, img.height() as i64 - 1) as u32;
    img.get_pixel(cx, cy).0[0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::img::Frame;
    use approx::assert_relative_eq;

    fn ramp() -> Frame {
        Frame::from_fn(4, 4, |x, y| Luma([x as f32 + 10.0 * y as f32]))
    }

    #[test]
    fn bilinear_interpolates_between_centres() {
        let img = ramp();
        assert_relative_eq!(bilinear_sample_luma(&img, 1.5, 2.25).unwrap(), 24.0);
        assert_relative_eq!(bilinear_sample_luma(&img, 3.0, 3.0).unwrap(), 33.0);
    }

    #[test]
    fn bilinear_rejects_outside_positions() {
        let img = ramp();
        assert!(bilinear_sample_luma(&img, -0.01, 1.0).is_none());
        assert!(bilinear_sample_luma(&img, 1.0, 3.01).is_none());
        assert!(bilinear_sample_luma(&img, f32::NAN, 1.0).is_none());
    }

    #[test]
    fn clamped_read_replicates_border() {
        let img = ramp();
        assert_relative_eq!(clamped_luma(&img, -3, 1), 10.0);
        assert_relative_eq!(clamped_luma(&img, 7, 9), 33.0);
    }
}
