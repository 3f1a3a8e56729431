pub mod sequence;

pub use sequence::{ColourFrame, ImageSequenceSource};
