//! Pre-configured HTTP client for the attendance backend.
//!
//! Every request built through [`ApiClient`] reads the session token from the
//! credential store right before dispatch and sends it as a bearer
//! credential. A missing or unreadable token does not stop the request; the
//! backend answers with an authorization error instead. Single attempt, no
//! retry.

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::storage::CredentialStore;

/// Standard User-Agent header for ipro API requests.
pub const USER_AGENT: &str = concat!("ipro/", env!("CARGO_PKG_VERSION"));

/// Which credential to attach to a request.
enum Credential {
    /// Session token from the credential store, if any.
    Session,
    /// An explicit bearer token.
    Bearer(String),
    /// No credential at all.
    Anonymous,
}

/// HTTP client bound to one base URL and one credential store.
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
    credentials: CredentialStore,
}

impl ApiClient {
    /// Creates a client for `base_url`.
    ///
    /// # Errors
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        timeout: Option<Duration>,
        credentials: CredentialStore,
    ) -> Result<Self> {
        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self {
            base_url,
            http: builder.build()?,
            credentials,
        })
    }

    /// Creates a client from the `[api]` config section.
    ///
    /// # Errors
    /// Returns an error if the base URL is malformed or the client cannot be built.
    pub fn from_config(config: &ApiConfig, credentials: CredentialStore) -> anyhow::Result<Self> {
        let base_url = config.effective_base_url()?;
        Ok(Self::new(base_url, config.timeout(), credentials)?)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// GET with the session bearer token.
    ///
    /// # Errors
    /// Returns a transport, status, or decode error.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let builder = self.http.get(self.url(path)).query(query);
        self.execute(path, builder, Credential::Session).await
    }

    /// GET with an explicit bearer token.
    ///
    /// # Errors
    /// Returns a transport, status, or decode error.
    pub async fn get_json_with_token<T: DeserializeOwned>(
        &self,
        path: &str,
        token: &str,
    ) -> Result<T> {
        let builder = self.http.get(self.url(path));
        self.execute(path, builder, Credential::Bearer(token.to_string()))
            .await
    }

    /// POST a JSON body without any credential.
    ///
    /// # Errors
    /// Returns a transport, status, or decode error.
    pub async fn post_public_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let builder = self.http.post(self.url(path)).json(body);
        self.execute(path, builder, Credential::Anonymous).await
    }

    /// POST a JSON body with the session bearer token, ignoring the response body.
    ///
    /// Any 2xx status is success, whatever the body holds.
    ///
    /// # Errors
    /// Returns a transport or status error.
    pub async fn post_unit<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<()> {
        let builder = self.http.post(self.url(path)).json(body);
        self.send(path, builder, Credential::Session).await?;
        Ok(())
    }

    fn session_token(&self) -> Option<String> {
        match self.credentials.session_token() {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "session token unavailable, sending request without credential");
                None
            }
        }
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        builder: reqwest::RequestBuilder,
        credential: Credential,
    ) -> Result<T> {
        let body = self.send(endpoint, builder, credential).await?;
        decode_body(endpoint, &body)
    }

    /// Sends the request and returns the raw body of a 2xx response.
    async fn send(
        &self,
        endpoint: &str,
        builder: reqwest::RequestBuilder,
        credential: Credential,
    ) -> Result<String> {
        let token = match credential {
            Credential::Session => self.session_token(),
            Credential::Bearer(token) => Some(token),
            Credential::Anonymous => None,
        };
        let builder = match token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        };

        let response = builder.send().await.map_err(|e| {
            tracing::warn!(endpoint, error = %e, "request failed");
            Error::Network(e)
        })?;

        let status = response.status();
        let body = response.text().await?;
        tracing::debug!(endpoint, status = status.as_u16(), "response received");

        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
                message: server_message(&body),
            });
        }

        Ok(body)
    }
}

/// Extracts the `message` field from a JSON error body.
fn server_message(body: &str) -> Option<String> {
    let json: Value = serde_json::from_str(body).ok()?;
    json.get("message")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(ToString::to_string)
}

/// Decodes a success body; an empty body decodes as JSON `null`.
fn decode_body<T: DeserializeOwned>(endpoint: &str, body: &str) -> Result<T> {
    let text = if body.trim().is_empty() { "null" } else { body };
    serde_json::from_str(text).map_err(|e| Error::Decode {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })
}
