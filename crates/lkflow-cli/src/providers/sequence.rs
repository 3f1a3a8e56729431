use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use image::{GenericImageView, RgbImage};
use lkflow_core::img::{frame_from_gray, Frame};
use lkflow_engine::{EngineError, FrameSource};
use log::debug;

use crate::errors::{ProcessingError, Result};
use crate::types::SessionData;

/// Colour copy of the frame most recently handed to the engine.
pub type ColourFrame = Rc<RefCell<Option<RgbImage>>>;

/// Frame source that decodes an image sequence one file at a time. The engine
/// receives a normalized grayscale frame; the colour image stays available
/// through [`ImageSequenceSource::colour_frame`] for rendering.
pub struct ImageSequenceSource {
    frames: Vec<PathBuf>,
    next: usize,
    dimensions: Option<(u32, u32)>,
    colour: ColourFrame,
}

impl ImageSequenceSource {
    pub fn new(session: &SessionData) -> Self {
        Self {
            frames: session.frames.clone(),
            next: 0,
            dimensions: None,
            colour: ColourFrame::default(),
        }
    }

    /// Path of the frame most recently returned.
    pub fn current_path(&self) -> Option<&PathBuf> {
        self.next.checked_sub(1).and_then(|i| self.frames.get(i))
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.dimensions
    }

    /// Shared handle to the colour image of the current frame.
    pub fn colour_frame(&self) -> ColourFrame {
        Rc::clone(&self.colour)
    }

    fn decode_next(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.frames.get(self.next) else {
            return Ok(None);
        };
        let image = image::open(path).map_err(|source| ProcessingError::ImageDecoding {
            path: path.display().to_string(),
            source,
        })?;
        let (width, height) = image.dimensions();

        match self.dimensions {
            None => self.dimensions = Some((width, height)),
            Some((expected_width, expected_height))
                if (expected_width, expected_height) != (width, height) =>
            {
                return Err(ProcessingError::FrameSizeChanged {
                    path: path.display().to_string(),
                    width,
                    height,
                    expected_width,
                    expected_height,
                });
            }
            Some(_) => {}
        }

        debug!("Decoded {} ({width}x{height})", path.display());
        let frame = frame_from_gray(&image.to_luma8());
        *self.colour.borrow_mut() = Some(image.to_rgb8());
        self.next += 1;
        Ok(Some(frame))
    }
}

impl FrameSource for ImageSequenceSource {
    fn next_frame(&mut self) -> std::result::Result<Option<Frame>, EngineError> {
        self.decode_next()
            .map_err(|err| EngineError::Source(Box::new(err)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb};

    fn write_frame(dir: &std::path::Path, name: &str, w: u32, h: u32, value: u8) {
        GrayImage::from_pixel(w, h, Luma([value]))
            .save(dir.join(name))
            .unwrap();
    }

    fn source_error(err: EngineError) -> ProcessingError {
        match err {
            EngineError::Source(inner) => *inner.downcast::<ProcessingError>().unwrap(),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn yields_frames_in_order_then_none() {
        let dir = tempfile::tempdir().unwrap();
        write_frame(dir.path(), "0001.png", 8, 6, 0);
        write_frame(dir.path(), "0002.png", 8, 6, 255);
        let session = SessionData::discover(dir.path()).unwrap();
        let mut source = ImageSequenceSource::new(&session);

        let first = source.next_frame().unwrap().unwrap();
        assert_eq!(first.dimensions(), (8, 6));
        assert_eq!(first.get_pixel(0, 0).0[0], 0.0);
        let second = source.next_frame().unwrap().unwrap();
        assert_eq!(second.get_pixel(3, 3).0[0], 1.0);
        assert!(source.current_path().unwrap().ends_with("0002.png"));
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn colour_image_is_kept_alongside_the_frame() {
        let dir = tempfile::tempdir().unwrap();
        RgbImage::from_pixel(5, 4, Rgb([200, 20, 40]))
            .save(dir.path().join("0001.png"))
            .unwrap();
        let session = SessionData::discover(dir.path()).unwrap();
        let mut source = ImageSequenceSource::new(&session);
        let colour = source.colour_frame();
        assert!(colour.borrow().is_none());

        let frame = source.next_frame().unwrap().unwrap();
        assert_eq!(frame.dimensions(), (5, 4));
        let kept = colour.borrow();
        assert_eq!(*kept.as_ref().unwrap().get_pixel(2, 2), Rgb([200, 20, 40]));
    }

    #[test]
    fn size_changes_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        write_frame(dir.path(), "0001.png", 8, 6, 10);
        write_frame(dir.path(), "0002.png", 6, 8, 10);
        let session = SessionData::discover(dir.path()).unwrap();
        let mut source = ImageSequenceSource::new(&session);
        assert!(source.next_frame().unwrap().is_some());
        let err = source_error(source.next_frame().unwrap_err());
        assert!(matches!(
            err,
            ProcessingError::FrameSizeChanged {
                width: 6,
                height: 8,
                expected_width: 8,
                expected_height: 6,
                ..
            }
        ));
    }

    #[test]
    fn undecodable_files_keep_the_image_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("0001.png"), b"not a png").unwrap();
        let session = SessionData::discover(dir.path()).unwrap();
        let mut source = ImageSequenceSource::new(&session);
        let err = source_error(source.next_frame().unwrap_err());
        match err {
            ProcessingError::ImageDecoding { path, .. } => assert!(path.ends_with("0001.png")),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
