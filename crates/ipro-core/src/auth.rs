//! Authentication flow: provider login, token exchange, profile, sign-out.
//!
//! Session lifecycle:
//!
//! ```text
//! LoggedOut -> Authenticating -> TokenExchanging -> Authenticated
//!     ^              |                  |                 |
//!     +--------------+------------------+-----------------+
//!          (failure: defensive sign-out)     (sign-out)
//! ```

use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{Error, Result};
use crate::http::ApiClient;
use crate::identity::IdentityProvider;
use crate::storage::CredentialStore;

const TOKEN_EXCHANGE_PATH: &str = "/auth/mobile/token-exchange";
const AUTHENTICATED_USER_PATH: &str = "/userMasterController/getAutenticatedUser";

/// Backend user identifier, kept in whatever JSON form the server uses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserId {
    Number(i64),
    Text(String),
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserId::Number(n) => write!(f, "{n}"),
            UserId::Text(s) => f.write_str(s),
        }
    }
}

/// The authenticated user's profile as returned by the backend.
///
/// Fields this client does not use are preserved in `extra` so the cached
/// copy matches the server object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserProfile {
    /// Name shown in greetings; falls back to "User".
    pub fn name(&self) -> &str {
        self.user_name
            .as_deref()
            .or(self.display_name.as_deref())
            .filter(|n| !n.trim().is_empty())
            .unwrap_or("User")
    }
}

/// Successful token exchange payload.
#[derive(Debug, Clone)]
pub struct TokenExchange {
    pub access_token: String,
    /// Remaining response fields.
    pub extra: Map<String, Value>,
}

/// Where the current session stands.
///
/// `TokenExchanging` lasts until the profile is fetched, even after the
/// session token is stored.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    LoggedOut,
    Authenticating,
    TokenExchanging,
    Authenticated(UserProfile),
}

impl SessionState {
    fn label(&self) -> &'static str {
        match self {
            SessionState::LoggedOut => "logged_out",
            SessionState::Authenticating => "authenticating",
            SessionState::TokenExchanging => "token_exchanging",
            SessionState::Authenticated(_) => "authenticated",
        }
    }
}

/// Orchestrates login, token exchange, profile fetch and sign-out.
pub struct AuthService {
    api: ApiClient,
    state: Mutex<SessionState>,
}

impl AuthService {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            state: Mutex::new(SessionState::LoggedOut),
        }
    }

    fn credentials(&self) -> &CredentialStore {
        self.api.credentials()
    }

    pub fn state(&self) -> SessionState {
        self.state
            .lock()
            .map_or(SessionState::LoggedOut, |s| s.clone())
    }

    fn transition(&self, next: SessionState) {
        if let Ok(mut state) = self.state.lock() {
            tracing::debug!(from = state.label(), to = next.label(), "session state");
            *state = next;
        }
    }

    /// Enters `state` for one login step, back to `LoggedOut` if it fails.
    async fn step<T>(
        &self,
        state: SessionState,
        work: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        self.transition(state);
        let result = work.await;
        if result.is_err() {
            self.transition(SessionState::LoggedOut);
        }
        result
    }

    /// Runs the identity provider login and returns its access token.
    ///
    /// # Errors
    /// Returns [`Error::Authentication`] if the provider fails or yields no token.
    pub async fn login(&self, provider: &impl IdentityProvider) -> Result<String> {
        self.step(SessionState::Authenticating, async {
            let token = provider.login().await.map_err(|e| match e {
                Error::Authentication(_) => e,
                other => Error::Authentication(other.to_string()),
            })?;
            if token.trim().is_empty() {
                return Err(Error::Authentication(
                    "No access token received from identity provider".to_string(),
                ));
            }
            Ok(token)
        })
        .await
    }

    /// Exchanges the provider token for a backend session token and stores it.
    ///
    /// # Errors
    /// Returns [`Error::TokenExchange`] if the backend rejects the token or
    /// answers without `accessToken`, and [`Error::SecureStorageUnavailable`]
    /// if the token cannot be stored.
    pub async fn exchange_token(&self, provider_token: &str) -> Result<TokenExchange> {
        self.step(SessionState::TokenExchanging, self.store_backend_token(provider_token))
            .await
    }

    async fn store_backend_token(&self, provider_token: &str) -> Result<TokenExchange> {
        let response: Value = self
            .api
            .post_public_json(TOKEN_EXCHANGE_PATH, &json!({ "azureToken": provider_token }))
            .await
            .map_err(|e| Error::TokenExchange(e.to_string()))?;

        let Value::Object(mut fields) = response else {
            return Err(Error::TokenExchange(
                "Invalid response from token exchange".to_string(),
            ));
        };
        let access_token = match fields.remove("accessToken") {
            Some(Value::String(token)) if !token.trim().is_empty() => token,
            _ => {
                return Err(Error::TokenExchange(
                    "Invalid response from token exchange".to_string(),
                ));
            }
        };

        self.credentials()
            .save_session_token(&access_token)
            .map_err(|e| Error::SecureStorageUnavailable(format!("{e:#}")))?;
        tracing::info!("backend session token stored");

        Ok(TokenExchange {
            access_token,
            extra: fields,
        })
    }

    /// Fetches the authenticated user's profile and caches it.
    ///
    /// Success moves the session to `Authenticated`.
    ///
    /// # Errors
    /// Returns [`Error::NotAuthenticated`] without a session token, or the
    /// backend/decode error.
    pub async fn get_authenticated_user(&self) -> Result<UserProfile> {
        let token = self.session_token().ok_or(Error::NotAuthenticated)?;

        let value: Value = self
            .api
            .get_json_with_token(AUTHENTICATED_USER_PATH, &token)
            .await?;
        if value.is_null() {
            return Err(Error::Decode {
                endpoint: AUTHENTICATED_USER_PATH.to_string(),
                reason: "Failed to fetch user profile".to_string(),
            });
        }
        let profile: UserProfile =
            serde_json::from_value(value.clone()).map_err(|e| Error::Decode {
                endpoint: AUTHENTICATED_USER_PATH.to_string(),
                reason: e.to_string(),
            })?;

        match serde_json::to_string(&value) {
            Ok(json) => {
                if let Err(e) = self.credentials().save_profile_json(&json) {
                    tracing::warn!(error = %format!("{e:#}"), "failed to cache user profile");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to serialize user profile"),
        }

        self.transition(SessionState::Authenticated(profile.clone()));
        Ok(profile)
    }

    /// Full login sequence. Any failure clears partial state via [`Self::sign_out`].
    ///
    /// # Errors
    /// Returns the first error of the login, exchange or profile step.
    pub async fn sign_in(&self, provider: &impl IdentityProvider) -> Result<UserProfile> {
        let result = async {
            let provider_token = self.login(provider).await?;
            self.exchange_token(&provider_token).await?;
            self.get_authenticated_user().await
        }
        .await;

        match result {
            Ok(profile) => {
                tracing::info!(user_id = %profile.user_id, "signed in");
                Ok(profile)
            }
            Err(e) => {
                tracing::error!(error = %e, "authentication flow failed");
                self.sign_out();
                Err(e)
            }
        }
    }

    /// Best-effort removal of the session token and cached profile.
    ///
    /// Both deletions are always attempted; failures are logged only.
    /// Returns whether a session token was removed.
    pub fn sign_out(&self) -> bool {
        let removed = match self.credentials().clear_session_token() {
            Ok(removed) => removed,
            Err(e) => {
                tracing::error!(error = %format!("{e:#}"), "failed to remove session token");
                false
            }
        };
        if let Err(e) = self.credentials().clear_profile() {
            tracing::error!(error = %format!("{e:#}"), "failed to remove cached profile");
        }
        self.transition(SessionState::LoggedOut);
        removed
    }

    fn session_token(&self) -> Option<String> {
        match self.credentials().session_token() {
            Ok(token) => token,
            Err(e) => {
                tracing::error!(error = %format!("{e:#}"), "error retrieving session token");
                None
            }
        }
    }

    /// Whether a session token is stored. Local check only.
    pub fn is_authenticated(&self) -> bool {
        self.session_token().is_some()
    }

    /// The cached profile, only while a session token exists.
    pub fn cached_profile(&self) -> Option<UserProfile> {
        if !self.is_authenticated() {
            return None;
        }
        let json = match self.credentials().profile_json() {
            Ok(json) => json?,
            Err(e) => {
                tracing::error!(error = %format!("{e:#}"), "failed to read cached profile");
                return None;
            }
        };
        match serde_json::from_str(&json) {
            Ok(profile) => Some(profile),
            Err(e) => {
                tracing::error!(error = %e, "error parsing cached user profile");
                None
            }
        }
    }

    /// Cached profile, falling back to a backend fetch.
    ///
    /// # Errors
    /// Returns [`Error::NotAuthenticated`] without a session token, or the
    /// fetch error.
    pub async fn current_user(&self) -> Result<UserProfile> {
        if let Some(profile) = self.cached_profile() {
            return Ok(profile);
        }
        self.get_authenticated_user().await
    }
}
