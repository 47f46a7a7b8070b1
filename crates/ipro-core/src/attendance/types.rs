use std::fmt;
use std::str::FromStr;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::UserId;

/// Declared location context of an attendance event.
///
/// Serialized as the display label, which is what the backend stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkMode {
    #[serde(rename = "Office")]
    Office,
    #[serde(rename = "Work from home")]
    WorkFromHome,
    #[serde(rename = "Client")]
    Client,
}

impl WorkMode {
    pub const ALL: [WorkMode; 3] = [WorkMode::Office, WorkMode::WorkFromHome, WorkMode::Client];

    pub fn id(self) -> &'static str {
        match self {
            WorkMode::Office => "OFFICE",
            WorkMode::WorkFromHome => "WFH",
            WorkMode::Client => "CLIENT",
        }
    }

    /// Display label and wire value.
    pub fn label(self) -> &'static str {
        match self {
            WorkMode::Office => "Office",
            WorkMode::WorkFromHome => "Work from home",
            WorkMode::Client => "Client",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            WorkMode::Office => "office-building",
            WorkMode::WorkFromHome => "home",
            WorkMode::Client => "account-group",
        }
    }

    /// Exact match on the wire label.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.label() == label)
    }

    /// Whether actions in this mode are gated by the office geofence.
    pub fn requires_geofence(self) -> bool {
        self == WorkMode::Office
    }
}

impl fmt::Display for WorkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for WorkMode {
    type Err = String;

    /// Accepts the id, the label, or a kebab-case label (`work-from-home`),
    /// case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', " ");
        Self::ALL
            .into_iter()
            .find(|m| m.id().eq_ignore_ascii_case(&wanted) || m.label().to_ascii_lowercase() == wanted)
            .ok_or_else(|| {
                format!("unknown work mode '{s}' (expected one of: office, wfh, client)")
            })
    }
}

/// One recorded check-in or check-out.
///
/// Decoding is lenient: missing fields fall back to defaults so a partially
/// filled record does not hide the rest of the day.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AttendanceEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    /// Time of day, `HH:mm:ss`.
    pub time: String,
    /// true = check-in, false = check-out.
    pub curr_status: bool,
    /// Raw work-mode label as stored by the backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl AttendanceEvent {
    pub fn is_check_in(&self) -> bool {
        self.curr_status
    }

    /// The work mode, if the label is one this client knows.
    pub fn mode(&self) -> Option<WorkMode> {
        self.work_mode.as_deref().and_then(WorkMode::from_label)
    }

    pub fn time_of_day(&self) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(self.time.trim(), "%H:%M:%S").ok()
    }

    /// `hh:mm AM/PM`, or the raw value if it does not parse.
    pub fn display_time(&self) -> String {
        self.time_of_day()
            .map_or_else(|| self.time.clone(), |t| t.format("%I:%M %p").to_string())
    }
}

/// Body of `POST /checkInOutController/checkInOut`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInOutRequest {
    pub user_id: UserId,
    pub location: String,
    pub work_mode: WorkMode,
    pub curr_status: bool,
    pub remarks: String,
}

/// The next attendance action available to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    CheckIn,
    CheckOut,
}

impl Action {
    /// `currStatus` value submitted for this action.
    pub fn curr_status(self) -> bool {
        self == Action::CheckIn
    }

    pub fn label(self) -> &'static str {
        match self {
            Action::CheckIn => "Check In",
            Action::CheckOut => "Check Out",
        }
    }

    pub fn past_tense(self) -> &'static str {
        match self {
            Action::CheckIn => "Checked In",
            Action::CheckOut => "Checked Out",
        }
    }
}

/// Where the user stands for today.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttendanceState {
    /// No work assignment for today; no action is offered.
    Unassigned { message: String },
    CheckedOut,
    /// `work_mode` is the mode of the latest check-in, when known.
    CheckedIn { work_mode: Option<WorkMode> },
}

impl AttendanceState {
    pub fn next_action(&self) -> Option<Action> {
        match self {
            AttendanceState::Unassigned { .. } => None,
            AttendanceState::CheckedOut => Some(Action::CheckIn),
            AttendanceState::CheckedIn { .. } => Some(Action::CheckOut),
        }
    }

    pub fn is_checked_in(&self) -> bool {
        matches!(self, AttendanceState::CheckedIn { .. })
    }
}

/// Mode of the last event when it is a check-in, otherwise none.
pub fn active_work_mode(events: &[AttendanceEvent]) -> Option<WorkMode> {
    events
        .last()
        .filter(|e| e.is_check_in())
        .and_then(AttendanceEvent::mode)
}
