pub mod app;
pub mod camera;
pub mod commit;
pub mod config;
pub mod error;
pub mod events;
pub mod identification;
pub mod inactivity;
pub mod keyboard_input;
pub mod lockout;
pub mod model;
pub mod presence;
pub mod services;
pub mod session;

pub use app::{ComponentState, KioskApp, ShutdownReason};
pub use camera::{CaptureDevice, CaptureDeviceManager, MockCaptureDevice, StreamLease};
pub use commit::{CommitReceipt, PunchCommitter};
pub use config::PunchclockConfig;
pub use error::{ErrorCategory, PunchclockError, Result};
pub use events::{EventBus, EventFilter, EventReceiver, KioskEvent, NoticeLevel};
pub use identification::{FaceMatcher, IdentificationRace};
pub use inactivity::InactivitySupervisor;
pub use lockout::{LockoutPolicy, LockoutState};
pub use presence::PresenceReporter;
pub use services::Services;
pub use session::{KioskInput, SessionController, SessionState, SessionView};
