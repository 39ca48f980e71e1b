use crate::model::PunchAction;
use std::fmt;

/// Operator input delivered by the host shell
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KioskInput {
    /// Open a session from idle
    Open,
    /// Close the session and return to idle
    Close,
    /// Any user interaction that should keep the session alive
    Activity,
    /// Manual search text changed
    SearchChanged(String),
    /// Pick an employee from the latest search results
    SelectCandidate(String),
    SubmitPin(String),
    /// Leave PIN entry or photo capture
    Back,
    /// Re-arm a biometric scan that ended without a match
    RestartBiometric,
    SelectAction(PunchAction),
    TakePhoto,
    /// Discard the captured photo
    Retake,
    ConfirmPunch,
    /// Abandon the pending punch
    Cancel,
    /// Re-read the registry entry and apply the new inactivity timeout
    ReloadKioskConfig,
}

impl KioskInput {
    pub fn name(&self) -> &'static str {
        match self {
            KioskInput::Open => "open",
            KioskInput::Close => "close",
            KioskInput::Activity => "activity",
            KioskInput::SearchChanged(_) => "search",
            KioskInput::SelectCandidate(_) => "select_candidate",
            KioskInput::SubmitPin(_) => "submit_pin",
            KioskInput::Back => "back",
            KioskInput::RestartBiometric => "restart_biometric",
            KioskInput::SelectAction(_) => "select_action",
            KioskInput::TakePhoto => "take_photo",
            KioskInput::Retake => "retake",
            KioskInput::ConfirmPunch => "confirm_punch",
            KioskInput::Cancel => "cancel",
            KioskInput::ReloadKioskConfig => "reload_kiosk_config",
        }
    }
}

impl fmt::Display for KioskInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Never log PIN digits
            KioskInput::SubmitPin(_) => f.write_str("submit_pin(****)"),
            KioskInput::SearchChanged(query) => write!(f, "search({:?})", query),
            KioskInput::SelectCandidate(id) => write!(f, "select_candidate({})", id),
            KioskInput::SelectAction(action) => write!(f, "select_action({})", action),
            other => f.write_str(other.name()),
        }
    }
}
