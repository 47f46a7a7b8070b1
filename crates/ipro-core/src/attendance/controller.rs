use std::sync::Mutex;

use chrono::{Local, NaiveDate};

use super::service::AttendanceService;
use super::types::{
    Action, AttendanceEvent, AttendanceState, CheckInOutRequest, WorkMode, active_work_mode,
};
use crate::auth::UserId;
use crate::error::{Error, Result};
use crate::geofence::{GeofenceViolation, OFFICE_GEOFENCE};
use crate::location::LocationProvider;

/// Shown when the status fetch fails for a reason other than 404.
pub const STATUS_FETCH_FAILED: &str = "Failed to fetch latest attendance status.";

/// Everything the home screen renders for today.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub date: NaiveDate,
    pub activities: Vec<AttendanceEvent>,
    pub state: AttendanceState,
    /// Degradation notice from the last refresh.
    pub notice: Option<String>,
}

impl Snapshot {
    pub fn active_work_mode(&self) -> Option<WorkMode> {
        match self.state {
            AttendanceState::CheckedIn { work_mode } => work_mode,
            _ => None,
        }
    }

    pub fn next_action(&self) -> Option<Action> {
        self.state.next_action()
    }

    /// Mode the selection dialog starts on: the active mode when checking out.
    pub fn preselected_mode(&self) -> Option<WorkMode> {
        match self.next_action() {
            Some(Action::CheckOut) => self.active_work_mode(),
            _ => None,
        }
    }
}

/// Result of a submitted action, with the refreshed snapshot.
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub action: Action,
    pub work_mode: WorkMode,
    pub snapshot: Snapshot,
}

impl ActionOutcome {
    /// "Successfully Checked In!" / "Successfully Checked Out!"
    pub fn message(&self) -> String {
        format!("Successfully {}!", self.action.past_tense())
    }
}

/// Drives today's attendance for one user.
///
/// Holds the last refreshed [`Snapshot`]; actions are decided against it and
/// followed by a fresh refresh. Only one action runs at a time.
pub struct AttendanceController<L> {
    service: AttendanceService,
    location: L,
    location_label: String,
    user_id: UserId,
    snapshot: Mutex<Option<Snapshot>>,
    in_flight: tokio::sync::Mutex<()>,
}

impl<L: LocationProvider> AttendanceController<L> {
    pub fn new(
        service: AttendanceService,
        location: L,
        location_label: impl Into<String>,
        user_id: UserId,
    ) -> Self {
        Self {
            service,
            location,
            location_label: location_label.into(),
            user_id,
            snapshot: Mutex::new(None),
            in_flight: tokio::sync::Mutex::new(()),
        }
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// The last refreshed snapshot, if any.
    pub fn snapshot(&self) -> Option<Snapshot> {
        self.snapshot.lock().ok().and_then(|s| s.clone())
    }

    fn store(&self, snapshot: &Snapshot) {
        if let Ok(mut slot) = self.snapshot.lock() {
            *slot = Some(snapshot.clone());
        }
    }

    /// Fetches today's activity and status concurrently.
    ///
    /// Never fails: a failed activity fetch yields an empty timeline, a failed
    /// status fetch yields [`AttendanceState::CheckedOut`] with a notice.
    pub async fn refresh(&self) -> Snapshot {
        let date = Local::now().date_naive();
        let (activity, status) = tokio::join!(
            self.service.get_today_activity(&self.user_id, date),
            self.service.get_current_status(&self.user_id),
        );

        let activities = activity.unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to fetch today's activity");
            Vec::new()
        });

        let mut notice = None;
        let state = match status {
            Ok(AttendanceState::CheckedIn { .. }) => AttendanceState::CheckedIn {
                work_mode: active_work_mode(&activities),
            },
            Ok(state) => state,
            Err(e) => {
                tracing::error!(error = %e, "failed to fetch attendance status");
                notice = Some(STATUS_FETCH_FAILED.to_string());
                AttendanceState::CheckedOut
            }
        };

        let snapshot = Snapshot {
            date,
            activities,
            state,
            notice,
        };
        self.store(&snapshot);
        snapshot
    }

    /// Checks in or out (whichever the current state allows) in `mode`.
    ///
    /// Office mode requires the current position to be inside the office
    /// geofence. Checking out requires the same mode as the active check-in.
    ///
    /// # Errors
    /// - [`Error::ActionInProgress`] if another action is running
    /// - [`Error::Unassigned`] if there is no assignment for today
    /// - [`Error::WorkModeMismatch`], [`Error::Location`], [`Error::Geofence`]
    ///   when rejected before submission
    /// - [`Error::SubmissionFailed`] if the backend rejects the submission
    pub async fn check(&self, mode: WorkMode, remarks: &str) -> Result<ActionOutcome> {
        let _guard = self.in_flight.try_lock().map_err(|e| {
            tracing::debug!(error = %e, "attendance action rejected");
            Error::ActionInProgress
        })?;

        let current = match self.snapshot() {
            Some(snapshot) => snapshot,
            None => self.refresh().await,
        };

        let action = match &current.state {
            AttendanceState::Unassigned { message } => {
                return Err(Error::Unassigned(message.clone()));
            }
            AttendanceState::CheckedOut => Action::CheckIn,
            AttendanceState::CheckedIn { work_mode } => {
                if *work_mode != Some(mode) {
                    tracing::info!(
                        selected = %mode,
                        active = ?work_mode,
                        "check-out work mode does not match check-in"
                    );
                    return Err(Error::WorkModeMismatch);
                }
                Action::CheckOut
            }
        };

        if mode.requires_geofence() {
            self.ensure_at_office(action).await?;
        }

        let request = CheckInOutRequest {
            user_id: self.user_id.clone(),
            location: self.location_label.clone(),
            work_mode: mode,
            curr_status: action.curr_status(),
            remarks: remarks.to_string(),
        };
        self.service.submit(&request).await.map_err(|e| {
            tracing::error!(error = %e, action = action.label(), "attendance submission failed");
            Error::SubmissionFailed(Box::new(e))
        })?;
        tracing::info!(action = action.label(), work_mode = %mode, "attendance recorded");

        let snapshot = self.refresh().await;
        Ok(ActionOutcome {
            action,
            work_mode: mode,
            snapshot,
        })
    }

    async fn ensure_at_office(&self, action: Action) -> Result<()> {
        let position = self.location.current_position().await?;
        let distance = OFFICE_GEOFENCE.distance_from(&position);
        tracing::debug!(%position, distance_m = distance, "office geofence check");

        if OFFICE_GEOFENCE.contains(&position) {
            return Ok(());
        }
        let distance_m = distance.round() as u32;
        Err(Error::Geofence(match action {
            Action::CheckIn => GeofenceViolation::CheckIn { distance_m },
            Action::CheckOut => GeofenceViolation::CheckOut { distance_m },
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::geofence::{Coordinates, EARTH_RADIUS_M};
    use crate::http::ApiClient;
    use crate::location::{FixedLocation, NoLocation};
    use crate::storage::CredentialStore;

    const ACTIVITY: &str = "/checkInOutController/getUserLoginData";
    const STATUS: &str = "/checkInOutController/checkEmployeeLastStatusOfToday/42";
    const SUBMIT: &str = "/checkInOutController/checkInOut";

    fn north_of_office(meters: f64) -> Coordinates {
        let c = OFFICE_GEOFENCE.center;
        Coordinates::new(c.latitude + (meters / EARTH_RADIUS_M).to_degrees(), c.longitude)
    }

    fn controller<L: LocationProvider>(server: &MockServer, location: L) -> AttendanceController<L> {
        let credentials = CredentialStore::in_memory();
        credentials.save_session_token("backend-jwt").unwrap();
        let api = ApiClient::new(server.uri(), Some(Duration::from_secs(5)), credentials).unwrap();
        AttendanceController::new(
            AttendanceService::new(api),
            location,
            "Chennai",
            UserId::Number(42),
        )
    }

    async fn mount_day(server: &MockServer, activity: serde_json::Value, status: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path(ACTIVITY))
            .respond_with(ResponseTemplate::new(200).set_body_json(activity))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(STATUS))
            .respond_with(status)
            .mount(server)
            .await;
    }

    async fn expect_no_submission(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path(SUBMIT))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(server)
            .await;
    }

    fn checked_in_office() -> serde_json::Value {
        json!([{"currStatus": true, "workMode": "Office", "time": "09:00:00"}])
    }

    #[tokio::test]
    async fn test_checked_in_office_checks_out_with_false() {
        let server = MockServer::start().await;
        mount_day(&server, checked_in_office(), ResponseTemplate::new(200).set_body_json(json!(true))).await;
        Mock::given(method("POST"))
            .and(path(SUBMIT))
            .and(body_partial_json(json!({
                "userId": 42,
                "workMode": "Office",
                "currStatus": false,
                "location": "Chennai"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let ctl = controller(&server, FixedLocation(north_of_office(20.0)));
        let snapshot = ctl.refresh().await;
        assert_eq!(snapshot.active_work_mode(), Some(WorkMode::Office));
        assert_eq!(snapshot.next_action(), Some(Action::CheckOut));
        assert_eq!(snapshot.preselected_mode(), Some(WorkMode::Office));

        let outcome = ctl.check(WorkMode::Office, "").await.unwrap();
        assert_eq!(outcome.action, Action::CheckOut);
        assert_eq!(outcome.message(), "Successfully Checked Out!");
    }

    #[tokio::test]
    async fn test_checked_out_checks_in_with_true() {
        let server = MockServer::start().await;
        mount_day(&server, json!([]), ResponseTemplate::new(200).set_body_json(json!(false))).await;
        Mock::given(method("POST"))
            .and(path(SUBMIT))
            .and(body_partial_json(json!({"workMode": "Work from home", "currStatus": true, "remarks": "fever"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        // Non-office modes never consult the position.
        let ctl = controller(&server, NoLocation);
        let outcome = ctl.check(WorkMode::WorkFromHome, "fever").await.unwrap();
        assert_eq!(outcome.action, Action::CheckIn);
        assert_eq!(outcome.message(), "Successfully Checked In!");
    }

    #[tokio::test]
    async fn test_checkout_mode_mismatch_is_rejected_before_submission() {
        let server = MockServer::start().await;
        mount_day(&server, checked_in_office(), ResponseTemplate::new(200).set_body_json(json!(true))).await;
        expect_no_submission(&server).await;

        let ctl = controller(&server, NoLocation);
        ctl.refresh().await;
        let err = ctl.check(WorkMode::Client, "").await.unwrap_err();
        assert!(matches!(err, Error::WorkModeMismatch));
        assert_eq!(
            err.to_string(),
            "Location mismatch. Please check out using the same work mode."
        );
    }

    #[tokio::test]
    async fn test_checkout_without_known_active_mode_always_mismatches() {
        let server = MockServer::start().await;
        // Status says checked in but the timeline ends with a check-out.
        mount_day(
            &server,
            json!([{"currStatus": false, "workMode": "Office", "time": "18:00:00"}]),
            ResponseTemplate::new(200).set_body_json(json!(true)),
        )
        .await;
        expect_no_submission(&server).await;

        let ctl = controller(&server, NoLocation);
        for mode in WorkMode::ALL {
            let err = ctl.check(mode, "").await.unwrap_err();
            assert!(matches!(err, Error::WorkModeMismatch));
        }
    }

    #[tokio::test]
    async fn test_unassigned_day_hides_action() {
        let server = MockServer::start().await;
        mount_day(
            &server,
            json!([]),
            ResponseTemplate::new(404).set_body_json(json!({"message": "Work location not assigned"})),
        )
        .await;
        expect_no_submission(&server).await;

        let ctl = controller(&server, NoLocation);
        let snapshot = ctl.refresh().await;
        assert_eq!(snapshot.next_action(), None);
        assert_eq!(
            snapshot.state,
            AttendanceState::Unassigned {
                message: "Work location not assigned".to_string()
            }
        );

        let err = ctl.check(WorkMode::Client, "").await.unwrap_err();
        assert_eq!(err.to_string(), "Work location not assigned");
    }

    #[tokio::test]
    async fn test_office_check_in_outside_geofence_is_blocked() {
        let server = MockServer::start().await;
        mount_day(&server, json!([]), ResponseTemplate::new(200).set_body_json(json!(false))).await;
        expect_no_submission(&server).await;

        let ctl = controller(&server, FixedLocation(north_of_office(200.0)));
        let err = ctl.check(WorkMode::Office, "").await.unwrap_err();
        match err {
            Error::Geofence(violation @ GeofenceViolation::CheckIn { distance_m }) => {
                assert_eq!(distance_m, 200);
                assert_eq!(
                    violation.message(),
                    "You must be at the office location to check in as Office."
                );
            }
            other => panic!("expected check-in geofence violation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_office_check_out_outside_geofence_is_blocked() {
        let server = MockServer::start().await;
        mount_day(&server, checked_in_office(), ResponseTemplate::new(200).set_body_json(json!(true))).await;
        expect_no_submission(&server).await;

        let ctl = controller(&server, FixedLocation(north_of_office(500.0)));
        let err = ctl.check(WorkMode::Office, "").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Geofence(GeofenceViolation::CheckOut { .. })
        ));
        assert_eq!(
            err.to_string(),
            "Office check-out is not allowed outside the office location."
        );
    }

    #[tokio::test]
    async fn test_office_without_position_is_location_error() {
        let server = MockServer::start().await;
        mount_day(&server, json!([]), ResponseTemplate::new(200).set_body_json(json!(false))).await;
        expect_no_submission(&server).await;

        let ctl = controller(&server, NoLocation);
        let err = ctl.check(WorkMode::Office, "").await.unwrap_err();
        assert!(matches!(err, Error::Location(_)));
    }

    #[tokio::test]
    async fn test_plain_text_acknowledgment_counts_as_recorded() {
        let server = MockServer::start().await;
        let status_calls = Arc::new(AtomicUsize::new(0));
        let calls = Arc::clone(&status_calls);
        Mock::given(method("GET"))
            .and(path(ACTIVITY))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(STATUS))
            .respond_with(move |_: &wiremock::Request| {
                let checked_in = calls.fetch_add(1, Ordering::SeqCst) > 0;
                ResponseTemplate::new(200).set_body_json(json!(checked_in))
            })
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(SUBMIT))
            .respond_with(ResponseTemplate::new(200).set_body_string("Checked in successfully"))
            .expect(1)
            .mount(&server)
            .await;

        let ctl = controller(&server, NoLocation);
        let outcome = ctl.check(WorkMode::Client, "").await.unwrap();
        assert_eq!(outcome.message(), "Successfully Checked In!");
        assert!(outcome.snapshot.state.is_checked_in());
        assert_eq!(status_calls.load(Ordering::SeqCst), 2);
        assert_eq!(ctl.snapshot(), Some(outcome.snapshot));
    }

    #[tokio::test]
    async fn test_rejected_submission_keeps_prior_state() {
        let server = MockServer::start().await;
        mount_day(&server, json!([]), ResponseTemplate::new(200).set_body_json(json!(false))).await;
        Mock::given(method("POST"))
            .and(path(SUBMIT))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"message": "boom"})))
            .mount(&server)
            .await;

        let ctl = controller(&server, NoLocation);
        let before = ctl.refresh().await;
        let err = ctl.check(WorkMode::Client, "").await.unwrap_err();
        assert_eq!(err.to_string(), "Action failed. Please try again.");
        assert!(matches!(err, Error::SubmissionFailed(_)));
        assert_eq!(ctl.snapshot(), Some(before));
    }

    #[tokio::test]
    async fn test_status_failure_degrades_to_checked_out_with_notice() {
        let server = MockServer::start().await;
        mount_day(&server, checked_in_office(), ResponseTemplate::new(500)).await;

        let snapshot = controller(&server, NoLocation).refresh().await;
        assert_eq!(snapshot.state, AttendanceState::CheckedOut);
        assert_eq!(snapshot.notice.as_deref(), Some(STATUS_FETCH_FAILED));
        assert_eq!(snapshot.activities.len(), 1);
    }

    #[tokio::test]
    async fn test_activity_failure_degrades_to_empty_timeline() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(ACTIVITY))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(STATUS))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(false)))
            .mount(&server)
            .await;

        let snapshot = controller(&server, NoLocation).refresh().await;
        assert!(snapshot.activities.is_empty());
        assert_eq!(snapshot.state, AttendanceState::CheckedOut);
        assert_eq!(snapshot.notice, None);
    }

    /// Position source that counts calls and stalls until released.
    struct SlowLocation {
        calls: Arc<AtomicUsize>,
        release: Arc<tokio::sync::Notify>,
    }

    impl LocationProvider for SlowLocation {
        async fn current_position(&self) -> Result<Coordinates> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.release.notified().await;
            Ok(OFFICE_GEOFENCE.center)
        }
    }

    #[tokio::test]
    async fn test_second_action_while_first_in_flight_is_rejected() {
        let server = MockServer::start().await;
        mount_day(&server, json!([]), ResponseTemplate::new(200).set_body_json(json!(false))).await;
        Mock::given(method("POST"))
            .and(path_regex("^/checkInOutController/checkInOut$"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let calls = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(tokio::sync::Notify::new());
        let ctl = Arc::new(controller(
            &server,
            SlowLocation {
                calls: Arc::clone(&calls),
                release: Arc::clone(&release),
            },
        ));
        ctl.refresh().await;

        let first = tokio::spawn({
            let ctl = Arc::clone(&ctl);
            async move { ctl.check(WorkMode::Office, "").await }
        });
        while calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        let second = ctl.check(WorkMode::Office, "").await.unwrap_err();
        assert!(matches!(second, Error::ActionInProgress));

        release.notify_one();
        let outcome = first.await.unwrap().unwrap();
        assert_eq!(outcome.action, Action::CheckIn);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
