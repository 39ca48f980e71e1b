use super::device::{CaptureDevice, CaptureStream};
use crate::error::DeviceError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

#[derive(Default)]
struct StreamCounters {
    live: AtomicUsize,
    peak: AtomicUsize,
    opened: AtomicUsize,
    stopped: AtomicUsize,
    frames: AtomicUsize,
}

/// Synthetic camera producing small JPEG-framed payloads
#[derive(Clone, Default)]
pub struct MockCaptureDevice {
    open_failure: Arc<Mutex<Option<DeviceError>>>,
    grab_failure: Arc<Mutex<Option<DeviceError>>>,
    counters: Arc<StreamCounters>,
}

impl MockCaptureDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `open` calls fail with `error`
    pub fn fail_open(&self, error: Option<DeviceError>) {
        *self.open_failure.lock() = error;
    }

    /// Make subsequent frame grabs fail with `error`
    pub fn fail_grab(&self, error: Option<DeviceError>) {
        *self.grab_failure.lock() = error;
    }

    /// Streams opened and not yet stopped
    pub fn live_streams(&self) -> usize {
        self.counters.live.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously live streams seen
    pub fn peak_streams(&self) -> usize {
        self.counters.peak.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    pub fn stopped(&self) -> usize {
        self.counters.stopped.load(Ordering::SeqCst)
    }

    pub fn frames(&self) -> usize {
        self.counters.frames.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptureDevice for MockCaptureDevice {
    fn name(&self) -> &str {
        "mock"
    }

    async fn open(&self) -> Result<Box<dyn CaptureStream>, DeviceError> {
        if let Some(error) = self.open_failure.lock().clone() {
            debug!("Mock camera refusing to open: {}", error);
            return Err(error);
        }

        let live = self.counters.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak.fetch_max(live, Ordering::SeqCst);
        self.counters.opened.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(MockStream {
            grab_failure: Arc::clone(&self.grab_failure),
            counters: Arc::clone(&self.counters),
            stopped: false,
        }))
    }
}

struct MockStream {
    grab_failure: Arc<Mutex<Option<DeviceError>>>,
    counters: Arc<StreamCounters>,
    stopped: bool,
}

#[async_trait]
impl CaptureStream for MockStream {
    async fn grab(&mut self) -> Result<Vec<u8>, DeviceError> {
        if self.stopped {
            return Err(DeviceError::NotAcquired);
        }
        if let Some(error) = self.grab_failure.lock().clone() {
            return Err(error);
        }

        let frame_id = self.counters.frames.fetch_add(1, Ordering::SeqCst);

        // SOI + JFIF APP0 header, a patterned body, EOI
        let mut data = vec![
            0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46, 0x00, 0x01, 0x01, 0x01,
            0x00, 0x48, 0x00, 0x48, 0x00, 0x00,
        ];
        let pattern_size = 256 + (frame_id % 128);
        data.extend(std::iter::repeat((frame_id % 256) as u8).take(pattern_size));
        data.extend_from_slice(&[0xFF, 0xD9]);

        trace!("Generated mock frame {} ({} bytes)", frame_id, data.len());
        Ok(data)
    }

    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.counters.live.fetch_sub(1, Ordering::SeqCst);
        self.counters.stopped.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for MockStream {
    fn drop(&mut self) {
        self.stop();
    }
}
