//! Kiosk liveness heartbeats

use crate::services::KioskRegistry;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Heartbeat counters
#[derive(Debug, Default)]
pub struct PresenceStats {
    sent: AtomicU64,
    failed: AtomicU64,
}

impl PresenceStats {
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Best-effort outbound interface address.
///
/// Connecting a UDP socket only selects a route; no packet is sent.
pub async fn local_address() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").await.ok()?;
    socket.connect("8.8.8.8:80").await.ok()?;
    let ip = socket.local_addr().ok()?.ip();
    (!ip.is_unspecified()).then_some(ip)
}

/// Periodic liveness reports to the kiosk registry.
///
/// Independent of session state: started once the kiosk identity is known and kept
/// running until the process shuts down. Failures are logged and never propagate.
pub struct PresenceReporter {
    registry: Arc<dyn KioskRegistry>,
    kiosk_id: uuid::Uuid,
    interval: Duration,
    stats: Arc<PresenceStats>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl PresenceReporter {
    pub fn new(registry: Arc<dyn KioskRegistry>, kiosk_id: uuid::Uuid, interval: Duration) -> Self {
        Self {
            registry,
            kiosk_id,
            interval,
            stats: Arc::new(PresenceStats::default()),
            cancel: CancellationToken::new(),
            handle: None,
        }
    }

    pub fn kiosk_id(&self) -> uuid::Uuid {
        self.kiosk_id
    }

    pub fn stats(&self) -> Arc<PresenceStats> {
        Arc::clone(&self.stats)
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Send the first report immediately, then one per interval. No-op if already running.
    pub fn start(&mut self) {
        if self.is_running() {
            debug!("Presence reporter already running");
            return;
        }

        let registry = Arc::clone(&self.registry);
        let kiosk_id = self.kiosk_id;
        let period = self.interval;
        let stats = Arc::clone(&self.stats);
        let cancel = self.cancel.clone();

        info!(
            "Starting presence reporter for kiosk {} (every {:?})",
            kiosk_id, period
        );

        self.handle = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let ip = local_address().await;
                        match registry.report_heartbeat(kiosk_id, ip).await {
                            Ok(()) => {
                                stats.sent.fetch_add(1, Ordering::Relaxed);
                                debug!("Heartbeat sent for kiosk {} ({:?})", kiosk_id, ip);
                            }
                            Err(e) => {
                                stats.failed.fetch_add(1, Ordering::Relaxed);
                                warn!("Heartbeat for kiosk {} failed: {}", kiosk_id, e);
                            }
                        }
                    }
                }
            }

            info!("Presence reporter stopped");
        }));
    }

    /// Stop reporting and wait for the task to exit
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!("Presence reporter task failed: {}", e);
                }
            }
        }
    }
}

impl Drop for PresenceReporter {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
