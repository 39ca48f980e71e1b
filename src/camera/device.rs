use crate::error::DeviceError;
use async_trait::async_trait;

/// A physical or simulated camera that can open capture streams
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Open a new stream. Hardware errors must already be mapped to `DeviceError`.
    async fn open(&self) -> Result<Box<dyn CaptureStream>, DeviceError>;
}

/// An open capture stream holding the hardware
#[async_trait]
pub trait CaptureStream: Send {
    /// Pull one encoded (JPEG) frame
    async fn grab(&mut self) -> Result<Vec<u8>, DeviceError>;

    /// Stop the stream and free the hardware. Must tolerate repeated calls.
    fn stop(&mut self);
}
