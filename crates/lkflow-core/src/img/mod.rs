pub mod frame;
pub mod image_utils;
pub mod pyramid;

pub use frame::{frame_from_gray, frame_from_raw, frame_to_gray, Frame};
pub use image_utils::bilinear_sample_luma;
pub use pyramid::{build_pyramid, Pyramid, PyramidLevel};
