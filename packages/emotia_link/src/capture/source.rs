use std::path::{Path, PathBuf};

use image::DynamicImage;
use tracing::info;

use crate::error::{LinkError, Result};

const FRAME_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// A local video source, already acquired.
///
/// Acquisition happens when the source is constructed and fails the whole
/// capture flow if it does; there is no fallback source.
pub trait FrameSource: Send {
    /// Sample the current frame.
    fn next_frame(&mut self) -> Result<DynamicImage>;
}

/// Replays the image files of a directory in name order, looping forever.
#[derive(Debug)]
pub struct ImageDirSource {
    frames: Vec<PathBuf>,
    cursor: usize,
}

impl ImageDirSource {
    pub fn acquire(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir)
            .map_err(|e| LinkError::CaptureUnavailable(format!("{}: {}", dir.display(), e)))?;

        let mut frames: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| is_frame(path))
            .collect();
        frames.sort();

        if frames.is_empty() {
            return Err(LinkError::CaptureUnavailable(format!(
                "no frames in {}",
                dir.display()
            )));
        }

        info!(count = frames.len(), dir = %dir.display(), "frame source acquired");
        Ok(Self { frames, cursor: 0 })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FrameSource for ImageDirSource {
    fn next_frame(&mut self) -> Result<DynamicImage> {
        let path = &self.frames[self.cursor];
        self.cursor = (self.cursor + 1) % self.frames.len();
        image::open(path).map_err(|e| LinkError::Encode(format!("{}: {}", path.display(), e)))
    }
}

fn is_frame(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, RgbImage};

    fn write_frame(dir: &Path, name: &str, width: u32) {
        RgbImage::new(width, 10).save(dir.join(name)).unwrap();
    }

    #[test]
    fn cycles_frames_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        write_frame(dir.path(), "b.png", 20);
        write_frame(dir.path(), "a.png", 10);
        std::fs::write(dir.path().join("notes.txt"), "not a frame").unwrap();

        let mut source = ImageDirSource::acquire(dir.path()).unwrap();
        assert_eq!(source.len(), 2);
        let widths: Vec<u32> = (0..3)
            .map(|_| source.next_frame().unwrap().dimensions().0)
            .collect();
        assert_eq!(widths, vec![10, 20, 10]);
    }

    #[test]
    fn missing_dir_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = ImageDirSource::acquire(dir.path().join("camera")).unwrap_err();
        assert!(matches!(err, LinkError::CaptureUnavailable(_)));
    }

    #[test]
    fn empty_dir_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("readme.md"), "").unwrap();
        let err = ImageDirSource::acquire(dir.path()).unwrap_err();
        assert!(matches!(err, LinkError::CaptureUnavailable(_)));
        assert!(err.notice().starts_with("Camera unavailable"));
    }

    #[test]
    fn unreadable_frame_is_an_error_not_a_panic() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.jpg"), b"not a jpeg").unwrap();
        let mut source = ImageDirSource::acquire(dir.path()).unwrap();
        assert!(source.next_frame().is_err());
        assert!(source.next_frame().is_err());
    }
}
