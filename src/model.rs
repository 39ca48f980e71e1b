//! Domain types shared by the controller and its collaborators

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Registry entry for this terminal, loaded once per session open
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KioskIdentity {
    pub kiosk_id: Option<Uuid>,
    pub display_name: String,
    /// Dealership the kiosk belongs to; scopes template loads
    pub tenant: String,
    pub biometric_enabled: bool,
    pub manual_entry_enabled: bool,
    pub inactivity_timeout_seconds: u32,
}

/// Enrolled face template as stored by the directory service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrolledTemplate {
    pub employee_id: String,
    pub display_name: String,
    pub descriptor: Vec<f32>,
}

/// Row returned by a manual directory search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployeeSummary {
    pub employee_id: String,
    pub display_name: String,
    pub employee_number: Option<String>,
    pub department: Option<String>,
}

/// How a candidate was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentificationMethod {
    Biometric,
    Manual,
}

/// Result of either identification path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityCandidate {
    pub employee_id: String,
    pub display_name: String,
    pub confidence: Option<f32>,
    pub method: IdentificationMethod,
}

impl IdentityCandidate {
    pub fn manual(summary: &EmployeeSummary) -> Self {
        Self {
            employee_id: summary.employee_id.clone(),
            display_name: summary.display_name.clone(),
            confidence: None,
            method: IdentificationMethod::Manual,
        }
    }
}

/// Open time entry as reported by the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenTimeEntry {
    pub id: String,
    pub clock_in: DateTime<Utc>,
    pub break_start: Option<DateTime<Utc>>,
}

impl OpenTimeEntry {
    pub fn on_break(&self) -> bool {
        self.break_start.is_some()
    }
}

/// Worked time for the current week, computed by the backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeekStats {
    pub worked_minutes: u32,
    pub break_minutes: u32,
    pub shifts: u32,
}

/// Authoritative employee state, refetched on entry into Authorized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployeeSnapshot {
    pub employee_id: String,
    pub display_name: String,
    /// Lowercase hex SHA-256 of the PIN
    pub pin_hash: String,
    pub department: Option<String>,
    pub current_entry: Option<OpenTimeEntry>,
    pub week_stats: WeekStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PunchAction {
    ClockIn,
    ClockOut,
    BreakStart,
    BreakEnd,
}

impl PunchAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PunchAction::ClockIn => "clock_in",
            PunchAction::ClockOut => "clock_out",
            PunchAction::BreakStart => "break_start",
            PunchAction::BreakEnd => "break_end",
        }
    }
}

impl fmt::Display for PunchAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Photo taken for a punch; lives only until its commit completes or is abandoned
#[derive(Clone, PartialEq)]
pub struct CaptureResult {
    pub image_bytes: Arc<Vec<u8>>,
    pub captured_at: DateTime<Utc>,
}

impl CaptureResult {
    pub fn new(image_bytes: Vec<u8>, captured_at: DateTime<Utc>) -> Self {
        Self {
            image_bytes: Arc::new(image_bytes),
            captured_at,
        }
    }

    pub fn len(&self) -> usize {
        self.image_bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.image_bytes.is_empty()
    }
}

impl fmt::Debug for CaptureResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureResult")
            .field("bytes", &self.image_bytes.len())
            .field("captured_at", &self.captured_at)
            .finish()
    }
}

/// Metadata stored alongside an uploaded punch photo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoMetadata {
    pub employee_id: String,
    pub kiosk_id: Uuid,
    pub action: PunchAction,
    pub captured_at: DateTime<Utc>,
}

impl PhotoMetadata {
    /// Object key under which the photo is stored
    pub fn object_key(&self) -> String {
        format!(
            "{}/{}/{}-{}.jpg",
            self.kiosk_id,
            self.employee_id,
            self.captured_at.format("%Y%m%dT%H%M%S%.3fZ"),
            self.action
        )
    }
}

/// Request handed to the punch ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PunchRequest {
    pub employee_id: String,
    pub action: PunchAction,
    pub photo_ref: String,
    pub kiosk_id: Uuid,
    pub timestamp: DateTime<Utc>,
}
