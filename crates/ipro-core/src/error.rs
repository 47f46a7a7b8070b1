//! Error taxonomy for the auth and attendance flows.

use thiserror::Error;

use crate::geofence::GeofenceViolation;

/// Errors surfaced by the flow controllers.
///
/// A 404 from the activity or status endpoints is not represented here: the
/// attendance service maps it to an empty timeline or an unassigned day.
#[derive(Debug, Error)]
pub enum Error {
    /// Identity provider login failed or was cancelled.
    #[error("Identity provider login failed: {0}")]
    Authentication(String),

    /// Backend rejected the provider token or returned a malformed response.
    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    /// The secure credential store could not be read or written.
    #[error("Secure storage not available: {0}")]
    SecureStorageUnavailable(String),

    /// No session token is available.
    #[error("Not logged in. Run `ipro login` first.")]
    NotAuthenticated,

    /// Transport-level failure (connect, timeout, TLS).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-success HTTP status. `message` is the server's `message` field, if any.
    #[error("HTTP {status}: {}", message.as_deref().unwrap_or("request failed"))]
    Http {
        status: u16,
        message: Option<String>,
    },

    /// Response body did not match the expected shape.
    #[error("Unexpected response from {endpoint}: {reason}")]
    Decode { endpoint: String, reason: String },

    /// Position could not be determined.
    #[error("Unable to fetch GPS location: {0}")]
    Location(String),

    /// Office-mode action attempted outside the office geofence.
    #[error("{0}")]
    Geofence(GeofenceViolation),

    /// Check-out work mode differs from the active check-in.
    #[error("Location mismatch. Please check out using the same work mode.")]
    WorkModeMismatch,

    /// Another attendance action is still running.
    #[error("An attendance action is already in progress")]
    ActionInProgress,

    /// No work assignment exists for today; nothing can be submitted.
    #[error("{0}")]
    Unassigned(String),

    /// The backend rejected a check-in/check-out submission.
    #[error("Action failed. Please try again.")]
    SubmissionFailed(#[source] Box<Error>),
}

impl Error {
    /// Returns the HTTP status for [`Error::Http`].
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
