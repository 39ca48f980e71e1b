mod device;
#[cfg(all(target_os = "linux", feature = "camera"))]
mod gst;
mod manager;
mod mock;

pub use device::{CaptureDevice, CaptureStream};
#[cfg(all(target_os = "linux", feature = "camera"))]
pub use gst::GstCaptureDevice;
pub use manager::{CaptureDeviceManager, StreamLease};
pub use mock::MockCaptureDevice;

use crate::config::CameraConfig;
use crate::error::{PunchclockError, Result};
use std::sync::Arc;

/// Build the capture device named by `config.backend`
pub fn build_device(config: &CameraConfig) -> Result<Arc<dyn CaptureDevice>> {
    match config.backend.as_str() {
        "mock" => Ok(Arc::new(MockCaptureDevice::new())),
        #[cfg(all(target_os = "linux", feature = "camera"))]
        "gstreamer" => Ok(Arc::new(GstCaptureDevice::new(config.clone())?)),
        #[cfg(not(all(target_os = "linux", feature = "camera")))]
        "gstreamer" => Err(PunchclockError::system(
            "GStreamer backend requires the `camera` feature on Linux",
        )),
        other => Err(PunchclockError::system(format!(
            "Unknown camera backend '{}'",
            other
        ))),
    }
}
