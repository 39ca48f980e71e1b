//! Punch actions offered for an employee's current entry

use crate::model::{OpenTimeEntry, PunchAction};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// One entry of the action menu
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionOption {
    pub action: PunchAction,
    pub enabled: bool,
    /// Whole minutes until a disabled action becomes available
    pub remaining_minutes: Option<i64>,
}

impl ActionOption {
    fn enabled(action: PunchAction) -> Self {
        Self {
            action,
            enabled: true,
            remaining_minutes: None,
        }
    }

    /// Menu label, e.g. "break_end (20m remaining)"
    pub fn label(&self) -> String {
        match self.remaining_minutes {
            Some(minutes) if !self.enabled => format!("{} ({}m remaining)", self.action, minutes),
            _ => self.action.to_string(),
        }
    }
}

/// Time left before a break may end, `None` when not on break or already eligible
pub fn break_remaining(
    entry: Option<&OpenTimeEntry>,
    now: DateTime<Utc>,
    minimum_break: Duration,
) -> Option<Duration> {
    let started = entry?.break_start?;
    let remaining = minimum_break - (now - started);
    (remaining > Duration::zero()).then_some(remaining)
}

fn ceil_minutes(duration: Duration) -> i64 {
    (duration.num_milliseconds() + 59_999) / 60_000
}

/// Menu for the given entry state
///
/// | entry                         | offered                          |
/// |-------------------------------|----------------------------------|
/// | none                          | ClockIn                          |
/// | open, not on break            | BreakStart, ClockOut             |
/// | on break, under the minimum   | BreakEnd (disabled), ClockOut    |
/// | on break, minimum reached     | BreakEnd, ClockOut               |
pub fn available_actions(
    entry: Option<&OpenTimeEntry>,
    now: DateTime<Utc>,
    minimum_break: Duration,
) -> Vec<ActionOption> {
    let Some(open) = entry else {
        return vec![ActionOption::enabled(PunchAction::ClockIn)];
    };

    if !open.on_break() {
        return vec![
            ActionOption::enabled(PunchAction::BreakStart),
            ActionOption::enabled(PunchAction::ClockOut),
        ];
    }

    let break_end = match break_remaining(entry, now, minimum_break) {
        Some(remaining) => ActionOption {
            action: PunchAction::BreakEnd,
            enabled: false,
            remaining_minutes: Some(ceil_minutes(remaining)),
        },
        None => ActionOption::enabled(PunchAction::BreakEnd),
    };

    vec![break_end, ActionOption::enabled(PunchAction::ClockOut)]
}

/// Whether `action` is offered and enabled
pub fn is_enabled(options: &[ActionOption], action: PunchAction) -> bool {
    options.iter().any(|o| o.action == action && o.enabled)
}
