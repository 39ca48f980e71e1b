use crate::error::PunchclockError;
use crate::model::{EmployeeSummary, PunchAction};
use crate::session::SessionView;
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Severity of an operator-facing notice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Events published by the session controller for the host shell
#[derive(Debug, Clone)]
pub enum KioskEvent {
    /// The session moved to a new state
    StateChanged { view: SessionView },
    /// Operator-facing message
    Notice { level: NoticeLevel, message: String },
    /// Results of the latest manual search
    SearchResults {
        query: String,
        results: Vec<EmployeeSummary>,
    },
    /// Seconds until the session closes for inactivity
    InactivityCountdown { remaining_seconds: u32 },
    /// Seconds until PIN entry unlocks
    LockoutCountdown { remaining_seconds: u64 },
    /// Minutes until BreakEnd becomes available
    BreakCountdown { remaining_minutes: i64 },
    /// A punch was durably recorded
    PunchCommitted {
        employee_id: String,
        action: PunchAction,
        photo_ref: String,
        timestamp: SystemTime,
    },
    /// The session refused to open
    SessionRefused { reason: String },
    /// The capture device was acquired or released
    DeviceStatusChanged { active: bool },
}

impl KioskEvent {
    pub fn notice<S: Into<String>>(level: NoticeLevel, message: S) -> Self {
        KioskEvent::Notice {
            level,
            message: message.into(),
        }
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            KioskEvent::StateChanged { view } => format!("State changed to {}", view.state),
            KioskEvent::Notice { level, message } => format!("{:?}: {}", level, message),
            KioskEvent::SearchResults { query, results } => {
                format!("Search '{}' returned {} results", query, results.len())
            }
            KioskEvent::InactivityCountdown { remaining_seconds } => {
                format!("Session closes in {}s", remaining_seconds)
            }
            KioskEvent::LockoutCountdown { remaining_seconds } => {
                format!("PIN entry locked for {}s", remaining_seconds)
            }
            KioskEvent::BreakCountdown { remaining_minutes } => {
                format!("Break can end in {}m", remaining_minutes)
            }
            KioskEvent::PunchCommitted {
                employee_id,
                action,
                ..
            } => format!("Punch {} committed for {}", action, employee_id),
            KioskEvent::SessionRefused { reason } => format!("Session refused: {}", reason),
            KioskEvent::DeviceStatusChanged { active } => {
                format!("Camera {}", if *active { "active" } else { "released" })
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            KioskEvent::StateChanged { .. } => "state_changed",
            KioskEvent::Notice { .. } => "notice",
            KioskEvent::SearchResults { .. } => "search_results",
            KioskEvent::InactivityCountdown { .. } => "inactivity_countdown",
            KioskEvent::LockoutCountdown { .. } => "lockout_countdown",
            KioskEvent::BreakCountdown { .. } => "break_countdown",
            KioskEvent::PunchCommitted { .. } => "punch_committed",
            KioskEvent::SessionRefused { .. } => "session_refused",
            KioskEvent::DeviceStatusChanged { .. } => "device_status_changed",
        }
    }
}

/// Broadcast bus from the controller to any number of view bindings
pub struct EventBus {
    sender: broadcast::Sender<KioskEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<KioskEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers. Having no subscribers is not an error.
    pub fn publish(&self, event: KioskEvent) -> usize {
        match &event {
            KioskEvent::Notice {
                level: NoticeLevel::Error,
                message,
            } => {
                warn!("Operator notice: {}", message);
            }
            KioskEvent::SessionRefused { reason } => {
                error!("Session refused: {}", reason);
            }
            KioskEvent::PunchCommitted {
                employee_id,
                action,
                ..
            } => {
                info!("Punch {} committed for employee {}", action, employee_id);
            }
            KioskEvent::InactivityCountdown { .. }
            | KioskEvent::LockoutCountdown { .. }
            | KioskEvent::BreakCountdown { .. } => {}
            _ => {
                debug!("Event: {}", event.description());
            }
        }

        self.sender.send(event).unwrap_or(0)
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Accept all events
    All,
    /// Accept only specific event types
    EventTypes(Vec<&'static str>),
    /// Custom filter function
    Custom(fn(&KioskEvent) -> bool),
}

impl EventFilter {
    /// Check if an event passes this filter
    pub fn matches(&self, event: &KioskEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
            EventFilter::Custom(filter_fn) => filter_fn(event),
        }
    }
}

/// Event receiver with filtering
pub struct EventReceiver {
    receiver: broadcast::Receiver<KioskEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    pub fn new(receiver: broadcast::Receiver<KioskEvent>, filter: EventFilter, name: String) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Receive the next filtered event. Lagging skips ahead instead of failing.
    pub async fn recv(&mut self) -> Result<KioskEvent, PunchclockError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(PunchclockError::component(
                        self.name.clone(),
                        "event bus closed".to_string(),
                    ));
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Option<KioskEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Some(event);
                    }
                }
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                }
                Err(_) => return None,
            }
        }
    }

    /// Drain everything currently queued that passes the filter
    pub fn drain(&mut self) -> Vec<KioskEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.try_recv() {
            events.push(event);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_event_bus_basic_operations() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        let delivered = event_bus.publish(KioskEvent::LockoutCountdown {
            remaining_seconds: 30,
        });
        assert_eq!(delivered, 1);

        match receiver.recv().await.unwrap() {
            KioskEvent::LockoutCountdown { remaining_seconds } => {
                assert_eq!(remaining_seconds, 30);
            }
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let event_bus = EventBus::new(4);
        assert_eq!(event_bus.subscriber_count(), 0);
        assert_eq!(
            event_bus.publish(KioskEvent::DeviceStatusChanged { active: true }),
            0
        );
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let event_bus = EventBus::new(10);
        let filter = EventFilter::EventTypes(vec!["notice"]);
        let mut receiver = EventReceiver::new(event_bus.subscribe(), filter, "test".to_string());

        event_bus.publish(KioskEvent::DeviceStatusChanged { active: false });
        event_bus.publish(KioskEvent::notice(NoticeLevel::Info, "hello"));

        let event = timeout(Duration::from_millis(100), receiver.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            KioskEvent::Notice { message, .. } => assert_eq!(message, "hello"),
            other => panic!("Unexpected event: {:?}", other),
        }
        assert!(receiver.try_recv().is_none());
    }

    #[test]
    fn test_custom_filter() {
        let filter = EventFilter::Custom(|event| {
            matches!(event, KioskEvent::DeviceStatusChanged { active: true })
        });
        assert!(filter.matches(&KioskEvent::DeviceStatusChanged { active: true }));
        assert!(!filter.matches(&KioskEvent::DeviceStatusChanged { active: false }));
    }
}
