//! Still camera and image storage collaborators for intruder photos.

use crate::error::{Result, SystemError};
use crate::security::data::ImageHandle;
use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Produces one raw encoded frame per call.
pub trait FrameGrabber: Send + Sync {
    fn grab(&self) -> Result<Vec<u8>>;
}

/// Persists captured frames and hands back an opaque handle.
pub trait ImageSink: Send + Sync {
    /// Store an encoded frame taken at `taken_at`.
    fn store(&self, frame: &[u8], taken_at: DateTime<Local>) -> Result<ImageHandle>;

    /// Record that a capture was attempted at `taken_at` but produced no image.
    fn store_placeholder(&self, taken_at: DateTime<Local>) -> Result<ImageHandle>;
}

/// Camera backed by the `rpicam-still` tool, reading JPEG data from stdout.
#[derive(Debug, Clone)]
pub struct StillCamera {
    program: String,
}

impl Default for StillCamera {
    fn default() -> Self {
        Self {
            program: "rpicam-still".to_string(),
        }
    }
}

impl StillCamera {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl FrameGrabber for StillCamera {
    fn grab(&self) -> Result<Vec<u8>> {
        let output = Command::new(&self.program)
            .args(["--nopreview", "-t", "1", "-e", "jpg", "-o", "-"])
            .output()
            .map_err(|e| {
                SystemError::capture_error(format!("Failed to run {}: {}", self.program, e))
            })?;

        if !output.status.success() {
            return Err(SystemError::capture_error(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        if output.stdout.is_empty() {
            return Err(SystemError::capture_error(format!(
                "{} produced an empty frame",
                self.program
            )));
        }

        Ok(output.stdout)
    }
}

/// Writes `intruder_<timestamp>.jpg` files (and `.txt` placeholders) into a directory.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    /// Create the sink, making `dir` if it doesn't exist yet.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, taken_at: DateTime<Local>, extension: &str) -> PathBuf {
        self.dir.join(format!(
            "intruder_{}.{}",
            taken_at.format("%Y%m%d_%H%M%S"),
            extension
        ))
    }
}

impl ImageSink for DirectorySink {
    fn store(&self, frame: &[u8], taken_at: DateTime<Local>) -> Result<ImageHandle> {
        let path = self.path_for(taken_at, "jpg");
        fs::write(&path, frame)?;
        tracing::info!("Image captured: {}", path.display());
        Ok(ImageHandle::Image(path))
    }

    fn store_placeholder(&self, taken_at: DateTime<Local>) -> Result<ImageHandle> {
        let path = self.path_for(taken_at, "txt");
        fs::write(
            &path,
            format!("Security photo placeholder at {}", taken_at.to_rfc3339()),
        )?;
        Ok(ImageHandle::Placeholder(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    #[test]
    fn test_directory_sink_writes_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(dir.path().join("captured")).unwrap();

        let handle = sink.store(b"\xff\xd8jpeg", sample_time()).unwrap();
        let ImageHandle::Image(path) = handle else {
            panic!("expected an image handle, got {:?}", handle);
        };
        assert!(path.ends_with("intruder_20240309_140507.jpg"));
        assert_eq!(fs::read(&path).unwrap(), b"\xff\xd8jpeg");
    }

    #[test]
    fn test_directory_sink_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(dir.path()).unwrap();

        let handle = sink.store_placeholder(sample_time()).unwrap();
        let ImageHandle::Placeholder(path) = handle else {
            panic!("expected a placeholder handle, got {:?}", handle);
        };
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("txt"));
        let body = fs::read_to_string(&path).unwrap();
        assert!(body.starts_with("Security photo placeholder at 2024-03-09T14:05:07"));
    }

    #[test]
    fn test_missing_camera_program_is_capture_error() {
        let camera = StillCamera::new("definitely-not-a-camera-binary");
        let err = camera.grab().unwrap_err();
        assert!(matches!(err, SystemError::Capture(_)));
    }
}
