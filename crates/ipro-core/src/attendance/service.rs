use chrono::NaiveDate;
use serde_json::Value;

use super::types::{AttendanceEvent, AttendanceState, CheckInOutRequest};
use crate::auth::UserId;
use crate::error::{Error, Result};
use crate::http::ApiClient;

const ACTIVITY_PATH: &str = "/checkInOutController/getUserLoginData";
const STATUS_PATH: &str = "/checkInOutController/checkEmployeeLastStatusOfToday";
const SUBMIT_PATH: &str = "/checkInOutController/checkInOut";

/// Shown when the backend reports no assignment without its own message.
pub const DEFAULT_UNASSIGNED_MESSAGE: &str =
    "Work location not assigned for today. Please contact your resource manager.";

/// Thin wrapper over the attendance endpoints.
#[derive(Clone)]
pub struct AttendanceService {
    api: ApiClient,
}

impl AttendanceService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Events recorded for `user_id` on `date`, in chronological order.
    ///
    /// A 404 means nothing was recorded and yields an empty list.
    ///
    /// # Errors
    /// Returns any other transport, status, or decode error.
    pub async fn get_today_activity(
        &self,
        user_id: &UserId,
        date: NaiveDate,
    ) -> Result<Vec<AttendanceEvent>> {
        let user_id = user_id.to_string();
        let date = date.format("%Y-%m-%d").to_string();
        let result: Result<Option<Vec<AttendanceEvent>>> = self
            .api
            .get_json(ACTIVITY_PATH, &[("userId", user_id.as_str()), ("date", date.as_str())])
            .await;

        match result {
            Ok(events) => Ok(events.unwrap_or_default()),
            Err(e) if e.is_not_found() => {
                tracing::debug!(user_id = %user_id, date = %date, "no activity recorded");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Today's check-in status for `user_id`.
    ///
    /// The endpoint answers `false` when the user is checked out; any other
    /// value means checked in. A 404 means no work assignment for today. The
    /// returned [`AttendanceState::CheckedIn`] never carries a work mode; that
    /// comes from the activity list.
    ///
    /// # Errors
    /// Returns any non-404 transport, status, or decode error.
    pub async fn get_current_status(&self, user_id: &UserId) -> Result<AttendanceState> {
        let path = format!("{STATUS_PATH}/{user_id}");
        match self.api.get_json::<Value>(&path, &[]).await {
            Ok(Value::Bool(false)) => Ok(AttendanceState::CheckedOut),
            Ok(_) => Ok(AttendanceState::CheckedIn { work_mode: None }),
            Err(Error::Http {
                status: 404,
                message,
            }) => Ok(AttendanceState::Unassigned {
                message: message.unwrap_or_else(|| DEFAULT_UNASSIGNED_MESSAGE.to_string()),
            }),
            Err(e) => Err(e),
        }
    }

    /// Records a check-in or check-out. Any 2xx answer counts as recorded.
    ///
    /// # Errors
    /// Returns the transport or status error of the submission.
    pub async fn submit(&self, request: &CheckInOutRequest) -> Result<()> {
        self.api.post_unit(SUBMIT_PATH, request).await
    }
}
