//! Today's attendance: activity timeline, current status, check-in/check-out.

mod controller;
mod service;
mod types;

pub use controller::{ActionOutcome, AttendanceController, STATUS_FETCH_FAILED, Snapshot};
pub use service::{AttendanceService, DEFAULT_UNASSIGNED_MESSAGE};
pub use types::{
    Action, AttendanceEvent, AttendanceState, CheckInOutRequest, WorkMode, active_work_mode,
};
