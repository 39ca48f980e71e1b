use super::{ComponentState, KioskApp};
use crate::error::{PunchclockError, Result};
use crate::events::{EventBus, EventFilter, EventReceiver, KioskEvent, NoticeLevel};
use crate::session::{KioskInput, SessionController};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

impl KioskApp {
    /// Register all components as stopped
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing punchclock components");

        let mut states = self.component_states.lock().await;
        states.insert("controller".to_string(), ComponentState::Stopped);
        states.insert("view".to_string(), ComponentState::Stopped);
        if self.keyboard_enabled {
            states.insert("keyboard".to_string(), ComponentState::Stopped);
        }
        drop(states);

        info!("All components initialized successfully");
        Ok(())
    }

    /// Start the view binding, the session controller and the console
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting punchclock");

        // View first so it sees the controller's first events
        self.set_component_state("view", ComponentState::Starting)
            .await;
        self.view_task = Some(spawn_view_logger(
            &self.event_bus,
            self.cancellation_token.clone(),
        ));
        self.set_component_state("view", ComponentState::Running)
            .await;

        self.set_component_state("controller", ComponentState::Starting)
            .await;
        let inputs = self.input_rx.take().ok_or_else(|| {
            PunchclockError::component("controller", "session controller already started")
        })?;
        let controller = SessionController::new(
            self.config.clone(),
            self.services.clone(),
            self.devices(),
            self.event_bus.clone(),
        );
        self.controller_task = Some(tokio::spawn(
            controller.run(inputs, self.cancellation_token.clone()),
        ));
        self.set_component_state("controller", ComponentState::Running)
            .await;
        info!("Session controller started");

        if self.open_on_start {
            self.input_tx.send(KioskInput::Open).await.map_err(|_| {
                PunchclockError::component("controller", "session input channel closed")
            })?;
        }

        if self.keyboard_enabled {
            if let Some(keyboard_handler) = &self.keyboard_handler {
                self.set_component_state("keyboard", ComponentState::Starting)
                    .await;

                keyboard_handler.start().await.map_err(|e| {
                    error!("Failed to start keyboard console: {}", e);
                    e
                })?;

                self.set_component_state("keyboard", ComponentState::Running)
                    .await;
            }
        }

        info!("Punchclock started successfully");
        Ok(())
    }
}

/// Headless view binding: renders every published event to the log
fn spawn_view_logger(event_bus: &EventBus, cancel: CancellationToken) -> JoinHandle<()> {
    // Countdowns tick every second; only the final stretch is worth rendering
    let filter = EventFilter::Custom(|event| match event {
        KioskEvent::InactivityCountdown { remaining_seconds } => *remaining_seconds <= 10,
        KioskEvent::LockoutCountdown { .. } | KioskEvent::BreakCountdown { .. } => false,
        _ => true,
    });
    let mut events = EventReceiver::new(event_bus.subscribe(), filter, "view".to_string());

    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                received = events.recv() => match received {
                    Ok(event) => event,
                    Err(_) => break,
                },
            };
            render(&event);
        }
        debug!("View binding stopped");
    })
}

fn render(event: &KioskEvent) {
    match event {
        KioskEvent::StateChanged { view } => match serde_json::to_string(view) {
            Ok(json) => info!(view = %json, "Session {}", view.state),
            Err(e) => warn!("Could not render session view: {}", e),
        },
        KioskEvent::Notice { level, message } => match level {
            NoticeLevel::Info => info!("Notice: {}", message),
            NoticeLevel::Warning | NoticeLevel::Error => warn!("Notice: {}", message),
        },
        KioskEvent::SearchResults { query, results } => {
            info!("Search {:?}: {} result(s)", query, results.len());
            for summary in results {
                info!(
                    "  {} {} {}",
                    summary.employee_id,
                    summary.display_name,
                    summary.employee_number.as_deref().unwrap_or("-")
                );
            }
        }
        KioskEvent::InactivityCountdown { remaining_seconds } => {
            info!("Session closes in {}s", remaining_seconds);
        }
        other => debug!("{}", other.description()),
    }
}
