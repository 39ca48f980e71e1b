use super::actions::ActionOption;
use crate::model::{CaptureResult, EmployeeSnapshot, IdentityCandidate, PunchAction, WeekStats};
use serde::Serialize;
use std::fmt;

/// Lifecycle state of one kiosk session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    /// Biometric scan and/or manual search are running
    Identifying,
    /// Waiting for the PIN of a manually selected employee
    Authenticating {
        candidate: IdentityCandidate,
        snapshot: EmployeeSnapshot,
    },
    /// Action menu for an authorized employee
    Authorized { snapshot: EmployeeSnapshot },
    /// Taking and confirming the photo for `action`
    Capturing {
        snapshot: EmployeeSnapshot,
        action: PunchAction,
        photo: Option<CaptureResult>,
    },
}

impl SessionState {
    pub fn kind(&self) -> SessionStateKind {
        match self {
            SessionState::Idle => SessionStateKind::Idle,
            SessionState::Identifying => SessionStateKind::Identifying,
            SessionState::Authenticating { .. } => SessionStateKind::Authenticating,
            SessionState::Authorized { .. } => SessionStateKind::Authorized,
            SessionState::Capturing { .. } => SessionStateKind::Capturing,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, SessionState::Idle)
    }

    pub fn snapshot(&self) -> Option<&EmployeeSnapshot> {
        match self {
            SessionState::Authenticating { snapshot, .. }
            | SessionState::Authorized { snapshot }
            | SessionState::Capturing { snapshot, .. } => Some(snapshot),
            SessionState::Idle | SessionState::Identifying => None,
        }
    }

    pub fn employee_id(&self) -> Option<&str> {
        self.snapshot().map(|s| s.employee_id.as_str())
    }
}

/// Tag of a `SessionState`, for views and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SessionStateKind {
    Idle,
    Identifying,
    Authenticating,
    Authorized,
    Capturing,
}

impl fmt::Display for SessionStateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionStateKind::Idle => "idle",
            SessionStateKind::Identifying => "identifying",
            SessionStateKind::Authenticating => "authenticating",
            SessionStateKind::Authorized => "authorized",
            SessionStateKind::Capturing => "capturing",
        };
        f.write_str(name)
    }
}

/// Render-ready snapshot of the session for the host shell
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub state: SessionStateKind,
    pub employee_id: Option<String>,
    pub employee_name: Option<String>,
    pub department: Option<String>,
    pub on_break: bool,
    pub week_stats: Option<WeekStats>,
    pub actions: Vec<ActionOption>,
    pub pending_action: Option<PunchAction>,
    pub photo_pending: bool,
    pub lockout_remaining_seconds: Option<u64>,
    pub biometric_active: bool,
    pub manual_entry_enabled: bool,
}

impl SessionView {
    pub fn idle() -> Self {
        Self {
            state: SessionStateKind::Idle,
            employee_id: None,
            employee_name: None,
            department: None,
            on_break: false,
            week_stats: None,
            actions: Vec::new(),
            pending_action: None,
            photo_pending: false,
            lockout_remaining_seconds: None,
            biometric_active: false,
            manual_entry_enabled: false,
        }
    }
}
