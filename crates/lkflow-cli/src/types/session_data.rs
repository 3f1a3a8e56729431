use std::path::{Path, PathBuf};

use crate::errors::{ProcessingError, Result};

const FRAME_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// An image-sequence session: the frames of one directory in file-name order.
#[derive(Debug, Clone)]
pub struct SessionData {
    pub input_dir: PathBuf,
    pub frames: Vec<PathBuf>,
    /// Session name (derived from the directory name)
    pub name: String,
}

impl SessionData {
    pub fn discover<P: AsRef<Path>>(input_dir: P) -> Result<Self> {
        let input_dir = input_dir.as_ref().to_path_buf();
        if !input_dir.is_dir() {
            return Err(ProcessingError::InputNotFound(
                input_dir.display().to_string(),
            ));
        }

        let mut frames = Vec::new();
        for entry in std::fs::read_dir(&input_dir)? {
            let path = entry?.path();
            let is_frame = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if is_frame && path.is_file() {
                frames.push(path);
            }
        }
        if frames.is_empty() {
            return Err(ProcessingError::NoFrames(input_dir.display().to_string()));
        }
        frames.sort();

        let name = input_dir
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("unnamed_session")
            .to_string();

        Ok(Self {
            input_dir,
            frames,
            name,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.png", "a.PNG", "c.jpg", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        let session = SessionData::discover(dir.path()).unwrap();
        let names: Vec<_> = session
            .frames
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.PNG", "b.png", "c.jpg"]);
    }

    #[test]
    fn missing_or_empty_inputs_fail() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            SessionData::discover(dir.path()),
            Err(ProcessingError::NoFrames(_))
        ));
        assert!(matches!(
            SessionData::discover(dir.path().join("missing")),
            Err(ProcessingError::InputNotFound(_))
        ));
    }
}
