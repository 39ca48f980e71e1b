use super::types::{ComponentState, ShutdownReason};
use crate::camera::{build_device, CaptureDeviceManager};
use crate::config::PunchclockConfig;
use crate::error::Result;
use crate::events::EventBus;
use crate::keyboard_input::KeyboardInputHandler;
use crate::services::Services;
use crate::session::KioskInput;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

const INPUT_CHANNEL_CAPACITY: usize = 64;

/// Process-level coordinator: owns the capture device, the session controller task and
/// the host shell bindings around it
pub struct KioskApp {
    pub(super) config: PunchclockConfig,
    pub(super) services: Services,
    pub(super) event_bus: EventBus,
    pub(super) devices: Arc<CaptureDeviceManager>,

    // Session input
    pub(super) input_tx: mpsc::Sender<KioskInput>,
    pub(super) input_rx: Option<mpsc::Receiver<KioskInput>>,

    // Components
    pub(super) controller_task: Option<JoinHandle<()>>,
    pub(super) view_task: Option<JoinHandle<()>>,
    pub(super) keyboard_handler: Option<KeyboardInputHandler>,
    pub(super) keyboard_enabled: bool,
    pub(super) open_on_start: bool,

    // Lifecycle management
    pub(super) component_states: Arc<Mutex<HashMap<String, ComponentState>>>,
    pub(super) shutdown_sender: Option<oneshot::Sender<ShutdownReason>>,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
}

impl KioskApp {
    /// Create the app, opening nothing yet. Fails only if the camera backend is unknown.
    pub fn new(config: PunchclockConfig, services: Services) -> Result<Self> {
        let event_bus = EventBus::default();
        let device = build_device(&config.camera)?;
        let devices = Arc::new(
            CaptureDeviceManager::new(device)
                .with_warmup_frames(config.camera.warmup_frames)
                .with_event_bus(event_bus.clone()),
        );
        info!("Capture device: {}", devices.device_name());

        let (input_tx, input_rx) = mpsc::channel(INPUT_CHANNEL_CAPACITY);
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();
        let cancellation_token = CancellationToken::new();

        let keyboard_handler = Some(KeyboardInputHandler::new(
            input_tx.clone(),
            cancellation_token.clone(),
        ));

        Ok(Self {
            config,
            services,
            event_bus,
            devices,
            input_tx,
            input_rx: Some(input_rx),
            controller_task: None,
            view_task: None,
            keyboard_handler,
            keyboard_enabled: false,
            open_on_start: false,
            component_states: Arc::new(Mutex::new(HashMap::new())),
            shutdown_sender: Some(shutdown_sender),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token,
        })
    }

    /// Enable or disable the terminal console
    pub fn set_keyboard_enabled(&mut self, enabled: bool) {
        self.keyboard_enabled = enabled;
    }

    /// Open a session as soon as the controller starts
    pub fn set_open_on_start(&mut self, open: bool) {
        self.open_on_start = open;
    }

    /// Sender for operator inputs, for host shells other than the console
    pub fn inputs(&self) -> mpsc::Sender<KioskInput> {
        self.input_tx.clone()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn devices(&self) -> Arc<CaptureDeviceManager> {
        Arc::clone(&self.devices)
    }

    /// Cancelled when any component requests shutdown
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }
}
