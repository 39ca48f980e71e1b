//! Kiosk session state machine and the pieces it is built from

mod actions;
mod controller;
mod input;
mod pin;
mod state;

pub use actions::{available_actions, break_remaining, is_enabled, ActionOption};
pub use controller::{report, SessionController};
pub use input::KioskInput;
pub use pin::{hash_pin, verify_pin};
pub use state::{SessionState, SessionStateKind, SessionView};

#[cfg(test)]
mod tests;
