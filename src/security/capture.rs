//! Rate-limited intruder photo capture.

use crate::hardware::camera::{FrameGrabber, ImageSink};
use crate::security::data::{CaptureRecord, ImageHandle};
use chrono::{DateTime, Local};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Default minimum interval between two captures.
pub const DEFAULT_CAPTURE_COOLDOWN: Duration = Duration::from_secs(10);

/// Allows at most one capture per cooldown window.
///
/// Capture failures never reach the caller: a failed grab or store falls back
/// to a placeholder record, and the cooldown is consumed either way.
pub struct CaptureThrottle {
    camera: Arc<dyn FrameGrabber>,
    sink: Arc<dyn ImageSink>,
    cooldown: Duration,
    enabled: bool,
    last_capture: Option<Instant>,
}

impl CaptureThrottle {
    pub fn new(camera: Arc<dyn FrameGrabber>, sink: Arc<dyn ImageSink>) -> Self {
        Self {
            camera,
            sink,
            cooldown: DEFAULT_CAPTURE_COOLDOWN,
            enabled: true,
            last_capture: None,
        }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn last_capture(&self) -> Option<Instant> {
        self.last_capture
    }

    fn cooldown_elapsed(&self, now: Instant) -> bool {
        match self.last_capture {
            Some(last) => now.saturating_duration_since(last) >= self.cooldown,
            None => true,
        }
    }

    /// Capture a photo unless disabled or still cooling down.
    pub async fn maybe_capture(&mut self, now: Instant) -> Option<CaptureRecord> {
        if !self.enabled || !self.cooldown_elapsed(now) {
            return None;
        }
        self.last_capture = Some(now);

        let taken_at = Local::now();
        let camera = Arc::clone(&self.camera);
        let sink = Arc::clone(&self.sink);
        let handle = tokio::task::spawn_blocking(move || {
            capture_or_placeholder(camera.as_ref(), sink.as_ref(), taken_at)
        })
        .await
        .unwrap_or_else(|e| {
            warn!("Capture task failed: {}", e);
            ImageHandle::Unavailable
        });

        Some(CaptureRecord { taken_at, handle })
    }
}

fn capture_or_placeholder(
    camera: &dyn FrameGrabber,
    sink: &dyn ImageSink,
    taken_at: DateTime<Local>,
) -> ImageHandle {
    let stored = camera
        .grab()
        .and_then(|frame| sink.store(&frame, taken_at));

    match stored {
        Ok(handle) => handle,
        Err(e) => {
            warn!("Camera capture failed: {}", e);
            sink.store_placeholder(taken_at).unwrap_or_else(|e| {
                debug!("Placeholder write failed: {}", e);
                ImageHandle::Unavailable
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, SystemError};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeCamera {
        fail: bool,
        grabs: AtomicUsize,
    }

    impl FrameGrabber for FakeCamera {
        fn grab(&self) -> Result<Vec<u8>> {
            self.grabs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(SystemError::capture_error("lens cap on"))
            } else {
                Ok(vec![0xff, 0xd8])
            }
        }
    }

    struct FakeSink {
        placeholder_fails: bool,
    }

    impl ImageSink for FakeSink {
        fn store(&self, _frame: &[u8], _taken_at: DateTime<Local>) -> Result<ImageHandle> {
            Ok(ImageHandle::Image(PathBuf::from("intruder.jpg")))
        }

        fn store_placeholder(&self, _taken_at: DateTime<Local>) -> Result<ImageHandle> {
            if self.placeholder_fails {
                Err(SystemError::capture_error("disk full"))
            } else {
                Ok(ImageHandle::Placeholder(PathBuf::from("intruder.txt")))
            }
        }
    }

    fn throttle(camera: Arc<FakeCamera>, placeholder_fails: bool) -> CaptureThrottle {
        CaptureThrottle::new(camera, Arc::new(FakeSink { placeholder_fails }))
    }

    #[tokio::test]
    async fn test_cooldown_suppresses_second_trigger() {
        let camera = Arc::new(FakeCamera::default());
        let mut throttle = throttle(camera.clone(), false);
        let t0 = Instant::now();

        let first = throttle.maybe_capture(t0).await;
        let second = throttle.maybe_capture(t0 + Duration::from_secs(3)).await;
        let third = throttle.maybe_capture(t0 + Duration::from_secs(11)).await;

        assert!(first.is_some());
        assert!(second.is_none());
        assert!(third.is_some());
        assert_eq!(camera.grabs.load(Ordering::SeqCst), 2);
        assert_eq!(throttle.last_capture(), Some(t0 + Duration::from_secs(11)));
    }

    #[tokio::test]
    async fn test_failed_capture_writes_placeholder_and_consumes_cooldown() {
        let camera = Arc::new(FakeCamera {
            fail: true,
            ..Default::default()
        });
        let mut throttle = throttle(camera.clone(), false);
        let t0 = Instant::now();

        let record = throttle.maybe_capture(t0).await.expect("record expected");
        assert_eq!(record.handle, ImageHandle::Placeholder(PathBuf::from("intruder.txt")));
        assert!(throttle.maybe_capture(t0 + Duration::from_secs(5)).await.is_none());
    }

    #[tokio::test]
    async fn test_total_failure_yields_sentinel() {
        let camera = Arc::new(FakeCamera {
            fail: true,
            ..Default::default()
        });
        let mut throttle = throttle(camera, true);

        let record = throttle.maybe_capture(Instant::now()).await.expect("record expected");
        assert_eq!(record.handle, ImageHandle::Unavailable);
    }

    #[tokio::test]
    async fn test_disabled_never_captures() {
        let camera = Arc::new(FakeCamera::default());
        let mut throttle = throttle(camera.clone(), false).with_enabled(false);

        assert!(throttle.maybe_capture(Instant::now()).await.is_none());
        assert_eq!(camera.grabs.load(Ordering::SeqCst), 0);
        assert_eq!(throttle.last_capture(), None);
    }
}
