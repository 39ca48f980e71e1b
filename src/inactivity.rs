//! Session inactivity countdown

use crate::events::{EventBus, KioskEvent};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Countdown that closes the session when no input arrives in time.
///
/// Owned by the session controller. Each `restart` aborts the previous countdown and
/// arms a new one tagged with the caller's transition epoch.
pub struct InactivitySupervisor {
    timeout: Duration,
    event_bus: EventBus,
    timer: Option<JoinHandle<()>>,
    armed_epoch: Option<u64>,
}

impl InactivitySupervisor {
    pub fn new(timeout: Duration, event_bus: EventBus) -> Self {
        Self {
            timeout,
            event_bus,
            timer: None,
            armed_epoch: None,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Change the timeout; applies from the next `restart`
    pub fn set_timeout(&mut self, timeout: Duration) {
        if timeout != self.timeout {
            info!(
                "Inactivity timeout changed from {:?} to {:?}",
                self.timeout, timeout
            );
            self.timeout = timeout;
        }
    }

    /// (Re)arm the countdown. `on_elapsed` runs with `epoch` once the timeout passes
    /// without another `restart` or `stop`.
    pub fn restart<F>(&mut self, epoch: u64, on_elapsed: F)
    where
        F: FnOnce(u64) + Send + 'static,
    {
        self.stop();

        let deadline = Instant::now() + self.timeout;
        let event_bus = self.event_bus.clone();

        self.timer = Some(tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(1));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = sleep_until(deadline) => break,
                    _ = ticker.tick() => {
                        let remaining = deadline.saturating_duration_since(Instant::now());
                        event_bus.publish(KioskEvent::InactivityCountdown {
                            remaining_seconds: ceil_seconds(remaining),
                        });
                    }
                }
            }

            debug!("Inactivity timeout elapsed (epoch {})", epoch);
            on_elapsed(epoch);
        }));
        self.armed_epoch = Some(epoch);
    }

    /// Disarm the countdown
    pub fn stop(&mut self) {
        if let Some(handle) = self.timer.take() {
            handle.abort();
        }
        self.armed_epoch = None;
    }

    pub fn is_armed(&self) -> bool {
        self.timer
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Epoch of the countdown most recently armed, if still armed
    pub fn armed_epoch(&self) -> Option<u64> {
        self.armed_epoch.filter(|_| self.is_armed())
    }
}

impl Drop for InactivitySupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn ceil_seconds(remaining: Duration) -> u32 {
    let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
    u32::try_from(secs).unwrap_or(u32::MAX)
}
