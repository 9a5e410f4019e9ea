use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{debug, warn};

use crate::frame::Frame;

/// Which directory a processed frame lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugBucket {
    Noise,
    Number,
}

/// Saves processed frames as JPEG files for offline inspection.
///
/// Files are named after the frame index, e.g. `noise/17.jpg`.
/// Write failures are logged and swallowed.
#[derive(Debug, Clone)]
pub struct DebugFrameWriter {
    noise_dir: PathBuf,
    number_dir: PathBuf,
}

impl DebugFrameWriter {
    pub fn new(noise_dir: impl Into<PathBuf>, number_dir: impl Into<PathBuf>) -> Self {
        Self {
            noise_dir: noise_dir.into(),
            number_dir: number_dir.into(),
        }
    }

    pub fn path_for(&self, bucket: DebugBucket, index: u64) -> PathBuf {
        let dir = match bucket {
            DebugBucket::Noise => &self.noise_dir,
            DebugBucket::Number => &self.number_dir,
        };
        dir.join(format!("{index}.jpg"))
    }

    pub fn save(&self, bucket: DebugBucket, index: u64, frame: &Frame) {
        let path = self.path_for(bucket, index);
        match write_frame(&path, frame) {
            Ok(()) => debug!("saved debug frame {}", path.display()),
            Err(e) => warn!("failed to save debug frame {}: {e:#}", path.display()),
        }
    }
}

fn write_frame(path: &Path, frame: &Frame) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    frame
        .to_image()
        .save(path)
        .map_err(|e| anyhow::anyhow!("Failed to save debug image: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::ChannelLayout;

    #[test]
    fn test_save_creates_bucket_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let writer = DebugFrameWriter::new(dir.path().join("noise"), dir.path().join("num"));
        let frame = Frame::new(8, 8, ChannelLayout::Gray, vec![90; 64]).unwrap();

        writer.save(DebugBucket::Number, 3, &frame);

        let saved = dir.path().join("num").join("3.jpg");
        assert!(saved.exists());
        assert_eq!(image::open(saved).unwrap().width(), 8);
        assert!(!dir.path().join("noise").exists());
    }

    #[test]
    fn test_save_failure_is_swallowed() {
        let dir = tempfile::TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        // Parent is a regular file, so the directory cannot be created.
        let writer = DebugFrameWriter::new(blocker.join("noise"), blocker.join("num"));
        let frame = Frame::new(2, 2, ChannelLayout::Gray, vec![0; 4]).unwrap();

        writer.save(DebugBucket::Noise, 0, &frame);
        assert!(!writer.path_for(DebugBucket::Noise, 0).exists());
    }
}
