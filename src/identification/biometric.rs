use super::matcher::FaceMatcher;
use super::race::IdentificationRace;
use crate::camera::{CaptureDeviceManager, StreamLease};
use crate::config::IdentificationConfig;
use crate::error::{DeviceError, MatcherError};
use crate::model::IdentityCandidate;
use crate::services::{DirectoryService, FaceEncoder};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Load the tenant's templates and build a matcher from the valid ones
pub async fn load_matcher(
    directory: &dyn DirectoryService,
    tenant: &str,
    threshold: f32,
) -> Result<FaceMatcher, MatcherError> {
    let templates = directory
        .load_enrolled_templates(tenant)
        .await
        .map_err(MatcherError::LoadFailed)?;
    FaceMatcher::from_enrolled(templates, threshold)
}

/// How a biometric scan ended
#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    /// A face matched and this scan won the race
    Matched(IdentityCandidate),
    /// No match before the ceiling
    TimedOut,
    /// The race was resolved elsewhere or abandoned
    Cancelled,
    /// The capture device could not be opened
    DeviceFailed(DeviceError),
}

/// Timing for a biometric scan
#[derive(Debug, Clone, Copy)]
pub struct ScanSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

impl ScanSettings {
    pub fn from_config(config: &IdentificationConfig) -> Self {
        Self {
            interval: config.scan_interval(),
            timeout: config.scan_timeout(),
        }
    }
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(15),
        }
    }
}

/// Periodic frame sampling against the face matcher
pub struct BiometricScan {
    settings: ScanSettings,
    devices: Arc<CaptureDeviceManager>,
    encoder: Arc<dyn FaceEncoder>,
    matcher: Arc<FaceMatcher>,
}

impl BiometricScan {
    pub fn new(
        settings: ScanSettings,
        devices: Arc<CaptureDeviceManager>,
        encoder: Arc<dyn FaceEncoder>,
        matcher: Arc<FaceMatcher>,
    ) -> Self {
        Self {
            settings,
            devices,
            encoder,
            matcher,
        }
    }

    /// Run until a match, the ceiling, or cancellation. The stream is released on every exit.
    pub async fn run(self, race: IdentificationRace) -> ScanOutcome {
        if race.is_cancelled() {
            return ScanOutcome::Cancelled;
        }

        let lease = match self.devices.acquire().await {
            Ok(lease) => lease,
            Err(e) => {
                warn!("Biometric scan could not open the camera: {}", e);
                return ScanOutcome::DeviceFailed(e);
            }
        };

        info!(
            "Biometric scan started (every {:?}, ceiling {:?})",
            self.settings.interval, self.settings.timeout
        );

        let deadline = Instant::now() + self.settings.timeout;
        let mut ticker = interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let outcome = loop {
            tokio::select! {
                biased;
                _ = race.cancelled() => break ScanOutcome::Cancelled,
                _ = sleep_until(deadline) => {
                    info!("Biometric scan found no match within {:?}", self.settings.timeout);
                    break ScanOutcome::TimedOut;
                }
                _ = ticker.tick() => {
                    if let Some(candidate) = self.sample(&lease).await {
                        if race.try_resolve() {
                            info!(
                                "Biometric match: {} (confidence {:.2})",
                                candidate.employee_id,
                                candidate.confidence.unwrap_or_default()
                            );
                            break ScanOutcome::Matched(candidate);
                        }
                        break ScanOutcome::Cancelled;
                    }
                }
            }
        };

        self.devices.release(&lease).await;
        outcome
    }

    async fn sample(&self, lease: &StreamLease) -> Option<IdentityCandidate> {
        let frame = match self.devices.capture(lease).await {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Biometric frame capture failed: {}", e);
                return None;
            }
        };

        let descriptor = match self.encoder.describe(&frame).await {
            Ok(Some(descriptor)) => descriptor,
            Ok(None) => {
                debug!("No face in frame");
                return None;
            }
            Err(e) => {
                warn!("Face encoder failed: {}", e);
                return None;
            }
        };

        self.matcher
            .best_match(&descriptor)
            .map(|found| found.into_candidate())
    }
}
