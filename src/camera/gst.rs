use super::device::{CaptureDevice, CaptureStream};
use crate::config::CameraConfig;
use crate::error::DeviceError;
use async_trait::async_trait;
use gstreamer::prelude::*;
use gstreamer::Pipeline;
use gstreamer_app::AppSink;
use tracing::{debug, info, warn};

const SAMPLE_TIMEOUT_SECONDS: u64 = 2;

/// V4L2 camera driven through a GStreamer MJPEG pipeline
pub struct GstCaptureDevice {
    config: CameraConfig,
    name: String,
}

impl GstCaptureDevice {
    pub fn new(config: CameraConfig) -> Result<Self, DeviceError> {
        gstreamer::init().map_err(|e| DeviceError::Unavailable {
            details: format!("Failed to initialize GStreamer: {}", e),
        })?;

        let name = format!("/dev/video{}", config.index);
        info!(
            "GStreamer capture device {} ({}x{} @ {}fps)",
            name, config.resolution.0, config.resolution.1, config.fps
        );
        Ok(Self { config, name })
    }

    fn pipeline_description(&self) -> String {
        let (width, height) = self.config.resolution;
        format!(
            "v4l2src device=/dev/video{} io-mode=mmap do-timestamp=true ! \
             image/jpeg,width={},height={},framerate={}/1 ! \
             queue max-size-buffers=2 leaky=downstream ! \
             appsink name=sink sync=false max-buffers=1 drop=true enable-last-sample=false emit-signals=false",
            self.config.index, width, height, self.config.fps
        )
    }
}

/// Permission problems surface from v4l2src as open failures with an errno string
fn classify(details: String) -> DeviceError {
    let lowered = details.to_lowercase();
    if lowered.contains("permission denied") || lowered.contains("not authorized") {
        DeviceError::PermissionDenied
    } else {
        DeviceError::Unavailable { details }
    }
}

fn bus_error(pipeline: &Pipeline) -> Option<String> {
    let bus = pipeline.bus()?;
    let message = bus.timed_pop_filtered(
        gstreamer::ClockTime::from_mseconds(500),
        &[gstreamer::MessageType::Error],
    )?;
    match message.view() {
        gstreamer::MessageView::Error(err) => Some(err.error().to_string()),
        _ => None,
    }
}

#[async_trait]
impl CaptureDevice for GstCaptureDevice {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open(&self) -> Result<Box<dyn CaptureStream>, DeviceError> {
        let description = self.pipeline_description();
        debug!("Creating GStreamer pipeline: {}", description);

        let pipeline = gstreamer::parse::launch(&description)
            .map_err(|e| DeviceError::Unavailable {
                details: format!("Failed to create pipeline: {}", e),
            })?
            .downcast::<Pipeline>()
            .map_err(|_| DeviceError::Unavailable {
                details: "Failed to downcast to Pipeline".to_string(),
            })?;

        let sink = pipeline
            .by_name("sink")
            .and_then(|element| element.downcast::<AppSink>().ok())
            .ok_or_else(|| DeviceError::Unavailable {
                details: "Pipeline has no appsink".to_string(),
            })?;

        if let Err(e) = pipeline.set_state(gstreamer::State::Playing) {
            let details = bus_error(&pipeline).unwrap_or_else(|| e.to_string());
            let _ = pipeline.set_state(gstreamer::State::Null);
            return Err(classify(details));
        }

        Ok(Box::new(GstStream {
            pipeline: Some(pipeline),
            sink,
        }))
    }
}

struct GstStream {
    pipeline: Option<Pipeline>,
    sink: AppSink,
}

#[async_trait]
impl CaptureStream for GstStream {
    async fn grab(&mut self) -> Result<Vec<u8>, DeviceError> {
        if self.pipeline.is_none() {
            return Err(DeviceError::NotAcquired);
        }

        let sink = self.sink.clone();
        let sample = tokio::task::spawn_blocking(move || {
            sink.try_pull_sample(gstreamer::ClockTime::from_seconds(SAMPLE_TIMEOUT_SECONDS))
        })
        .await
        .map_err(|e| DeviceError::CaptureFailed {
            details: format!("Sample task failed: {}", e),
        })?
        .ok_or_else(|| DeviceError::CaptureFailed {
            details: "No sample within timeout".to_string(),
        })?;

        let buffer = sample.buffer().ok_or_else(|| DeviceError::CaptureFailed {
            details: "No buffer in sample".to_string(),
        })?;
        let map = buffer
            .map_readable()
            .map_err(|e| DeviceError::CaptureFailed {
                details: format!("Failed to map buffer: {}", e),
            })?;

        Ok(map.as_slice().to_vec())
    }

    fn stop(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            if let Err(e) = pipeline.set_state(gstreamer::State::Null) {
                warn!("Failed to stop GStreamer pipeline: {}", e);
            }
        }
    }
}

impl Drop for GstStream {
    fn drop(&mut self) {
        self.stop();
    }
}
