use super::device::{CaptureDevice, CaptureStream};
use crate::error::DeviceError;
use crate::events::{EventBus, KioskEvent};
use crate::model::CaptureResult;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};

/// Proof of a live acquisition. Becomes stale once the stream it names is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamLease {
    generation: u64,
}

impl StreamLease {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

struct HeldStream {
    generation: u64,
    stream: Box<dyn CaptureStream>,
}

/// Sole owner of the capture hardware.
///
/// At most one stream is held at a time. `release` drops the stream handle itself,
/// so a released lease can never read from the hardware again.
pub struct CaptureDeviceManager {
    device: Arc<dyn CaptureDevice>,
    held: Mutex<Option<HeldStream>>,
    next_generation: AtomicU64,
    warmup_frames: u32,
    event_bus: Option<EventBus>,
}

impl CaptureDeviceManager {
    pub fn new(device: Arc<dyn CaptureDevice>) -> Self {
        Self {
            device,
            held: Mutex::new(None),
            next_generation: AtomicU64::new(1),
            warmup_frames: 0,
            event_bus: None,
        }
    }

    /// Discard this many frames after opening while exposure settles
    pub fn with_warmup_frames(mut self, frames: u32) -> Self {
        self.warmup_frames = frames;
        self
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn device_name(&self) -> &str {
        self.device.name()
    }

    /// Open the device. Fails with `AlreadyAcquired` while another stream is held.
    pub async fn acquire(&self) -> Result<StreamLease, DeviceError> {
        let mut held = self.held.lock().await;
        if held.is_some() {
            warn!("Capture stream requested while one is already held");
            return Err(DeviceError::AlreadyAcquired);
        }

        let mut stream = self.device.open().await?;
        for _ in 0..self.warmup_frames {
            if let Err(e) = stream.grab().await {
                stream.stop();
                return Err(e);
            }
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        *held = Some(HeldStream { generation, stream });
        drop(held);

        info!(
            "Acquired capture stream {} on {}",
            generation,
            self.device.name()
        );
        self.publish(true);
        Ok(StreamLease { generation })
    }

    /// Capture one frame from the stream named by `lease`
    pub async fn capture(&self, lease: &StreamLease) -> Result<CaptureResult, DeviceError> {
        let mut held = self.held.lock().await;
        match held.as_mut() {
            Some(current) if current.generation == lease.generation => {
                let bytes = current.stream.grab().await?;
                trace!("Captured {} byte frame", bytes.len());
                Ok(CaptureResult::new(bytes, Utc::now()))
            }
            _ => Err(DeviceError::NotAcquired),
        }
    }

    /// Release the stream named by `lease`. Stale or repeated releases are no-ops.
    pub async fn release(&self, lease: &StreamLease) {
        let taken = {
            let mut held = self.held.lock().await;
            match held.as_ref() {
                Some(current) if current.generation == lease.generation => held.take(),
                _ => None,
            }
        };
        match taken {
            Some(held) => self.stop(held),
            None => debug!("Release of stream {} was a no-op", lease.generation),
        }
    }

    /// Release whatever stream is held, if any. Used on session close and teardown.
    pub async fn release_any(&self) -> bool {
        let taken = self.held.lock().await.take();
        match taken {
            Some(held) => {
                self.stop(held);
                true
            }
            None => false,
        }
    }

    /// Whether a stream is currently held
    pub async fn is_active(&self) -> bool {
        self.held.lock().await.is_some()
    }

    /// Whether `lease` still names the held stream
    pub async fn is_current(&self, lease: &StreamLease) -> bool {
        matches!(self.held.lock().await.as_ref(), Some(h) if h.generation == lease.generation)
    }

    fn stop(&self, mut held: HeldStream) {
        held.stream.stop();
        info!("Released capture stream {}", held.generation);
        self.publish(false);
    }

    fn publish(&self, active: bool) {
        if let Some(bus) = &self.event_bus {
            bus.publish(KioskEvent::DeviceStatusChanged { active });
        }
    }
}
