use image::{GrayImage, ImageBuffer, Luma};

use crate::error::{FlowError, Result};

/// Single-channel intensity image with samples normalized to `[0, 1]`.
pub type Frame = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Converts an 8-bit grayscale image into a normalized [`Frame`].
pub fn frame_from_gray(gray: &GrayImage) -> Frame {
    let (width, height) = gray.dimensions();
    ImageBuffer::from_fn(width, height, |x, y| {
        Luma([gray.get_pixel(x, y).0[0] as f32 / 255.0])
    })
}

/// Wraps a row-major buffer of normalized intensities.
pub fn frame_from_raw(width: u32, height: u32, data: Vec<f32>) -> Result<Frame> {
    let expected = (width as usize) * (height as usize);
    let actual = data.len();
    if actual != expected {
        return Err(FlowError::BufferSize { expected, actual });
    }
    ImageBuffer::from_raw(width, height, data).ok_or(FlowError::BufferSize { expected, actual })
}

/// Quantizes a frame back to 8 bits, clamping out-of-range samples.
pub fn frame_to_gray(frame: &Frame) -> GrayImage {
    let (width, height) = frame.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        let v = frame.get_pixel(x, y).0[0];
        Luma([(v.clamp(0.0, 1.0) * 255.0).round() as u8])
    })
}
