//! Organizational identity provider (Microsoft identity platform v2.0).
//!
//! Authorization code flow with PKCE. The interactive part (opening the
//! browser, receiving the redirect) lives in the front-end; this module
//! builds the authorization URL and redeems the code for tokens.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::config::IdentityConfig;
use crate::error::{Error, Result};
use crate::http::USER_AGENT;

/// Local OAuth callback path (port is dynamic).
pub const LOCAL_CALLBACK_PATH: &str = "/auth/callback";

/// Produces an identity-provider access token.
pub trait IdentityProvider: Send + Sync {
    /// Runs the provider login and returns its access token.
    ///
    /// # Errors
    /// Returns [`Error::Authentication`] when the user cancels or the
    /// provider fails.
    fn login(&self) -> impl Future<Output = Result<String>> + Send;
}

/// PKCE code verifier and challenge
pub struct Pkce {
    pub verifier: String,
    pub challenge: String,
}

/// Generate PKCE code verifier and challenge
pub fn generate_pkce() -> Pkce {
    // Use two UUIDs (16 bytes each) to get 32 random bytes
    let uuid1 = uuid::Uuid::new_v4();
    let uuid2 = uuid::Uuid::new_v4();
    let mut verifier_bytes = [0u8; 32];
    verifier_bytes[..16].copy_from_slice(uuid1.as_bytes());
    verifier_bytes[16..].copy_from_slice(uuid2.as_bytes());
    let verifier = URL_SAFE_NO_PAD.encode(verifier_bytes);

    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    let challenge = URL_SAFE_NO_PAD.encode(hasher.finalize());

    Pkce {
        verifier,
        challenge,
    }
}

/// Builds the redirect URI for a given localhost port.
pub fn build_redirect_uri(port: u16) -> String {
    format!("http://localhost:{port}{LOCAL_CALLBACK_PATH}")
}

/// Generates a random high localhost port for OAuth callbacks.
pub fn random_local_port() -> u16 {
    let id = uuid::Uuid::new_v4();
    let bytes = id.as_bytes();
    let raw = u16::from_le_bytes([bytes[0], bytes[1]]);
    49152 + (raw % 16384)
}

/// Parses a pasted authorization input into code + optional state.
///
/// Accepts a full redirect URL, a `code=...&state=...` query string, or a
/// bare code.
pub fn parse_authorization_input(input: &str) -> (Option<String>, Option<String>) {
    let value = input.trim();
    if value.is_empty() {
        return (None, None);
    }

    if let Ok(url) = url::Url::parse(value) {
        let code = url.query_pairs().find(|(k, _)| k == "code").map(|(_, v)| v);
        let state = url
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v);
        return (code.map(|v| v.to_string()), state.map(|v| v.to_string()));
    }

    if value.contains("code=") {
        let query = value.trim_start_matches('?');
        let params = url::form_urlencoded::parse(query.as_bytes()).collect::<Vec<_>>();
        let code = params.iter().find(|(k, _)| k == "code").map(|(_, v)| v);
        let state = params.iter().find(|(k, _)| k == "state").map(|(_, v)| v);
        return (
            code.map(std::string::ToString::to_string),
            state.map(std::string::ToString::to_string),
        );
    }

    (Some(value.to_string()), None)
}

/// Tokens returned by the provider's token endpoint.
#[derive(Debug, Deserialize)]
pub struct ProviderTokens {
    pub access_token: String,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Microsoft identity platform client for one app registration.
#[derive(Debug, Clone)]
pub struct MicrosoftIdentity {
    authority: String,
    client_id: String,
    scopes: Vec<String>,
    http: reqwest::Client,
}

impl MicrosoftIdentity {
    pub fn new(authority: impl Into<String>, client_id: impl Into<String>, scopes: Vec<String>) -> Self {
        Self {
            authority: authority.into().trim_end_matches('/').to_string(),
            client_id: client_id.into(),
            scopes,
            http: reqwest::Client::new(),
        }
    }

    /// Builds the client from the `[identity]` config section.
    ///
    /// # Errors
    /// Returns an error if the configured authority is malformed.
    pub fn from_config(config: &IdentityConfig) -> anyhow::Result<Self> {
        Ok(Self::new(
            config.effective_authority()?,
            config.client_id.clone(),
            config.scopes.clone(),
        ))
    }

    fn scope(&self) -> String {
        self.scopes.join(" ")
    }

    pub fn authorize_endpoint(&self) -> String {
        format!("{}/oauth2/v2.0/authorize", self.authority)
    }

    pub fn token_endpoint(&self) -> String {
        format!("{}/oauth2/v2.0/token", self.authority)
    }

    /// Build the authorization URL the user opens in a browser.
    pub fn build_auth_url(&self, pkce: &Pkce, state: &str, redirect_uri: &str) -> String {
        let scope = self.scope();
        let params = [
            ("client_id", self.client_id.as_str()),
            ("response_type", "code"),
            ("redirect_uri", redirect_uri),
            ("response_mode", "query"),
            ("scope", scope.as_str()),
            ("code_challenge", pkce.challenge.as_str()),
            ("code_challenge_method", "S256"),
            ("state", state),
            ("prompt", "select_account"),
        ];

        let query: String = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params)
            .finish();

        format!("{}?{query}", self.authorize_endpoint())
    }

    /// Exchange authorization code for tokens
    ///
    /// # Errors
    /// Returns [`Error::Authentication`] if the provider rejects the code or
    /// the response carries no access token.
    pub async fn exchange_code(
        &self,
        code: &str,
        pkce: &Pkce,
        redirect_uri: &str,
    ) -> Result<ProviderTokens> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "authorization_code")
            .append_pair("client_id", &self.client_id)
            .append_pair("scope", &self.scope())
            .append_pair("code", code)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("code_verifier", &pkce.verifier)
            .finish();

        let response = self
            .http
            .post(self.token_endpoint())
            .header("Content-Type", "application/x-www-form-urlencoded")
            .header("User-Agent", USER_AGENT)
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Authentication(format!("failed to reach identity provider: {e}")))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            Error::Authentication(format!("failed to read identity provider response: {e}"))
        })?;
        if !status.is_success() {
            return Err(Error::Authentication(format!(
                "token request failed (HTTP {status}): {}",
                provider_error_description(&text)
            )));
        }

        let tokens: ProviderTokens = serde_json::from_str(&text)
            .map_err(|e| Error::Authentication(format!("failed to parse token response: {e}")))?;
        if tokens.access_token.trim().is_empty() {
            return Err(Error::Authentication(
                "No access token received from identity provider".to_string(),
            ));
        }
        Ok(tokens)
    }
}

/// Prefers the OAuth `error_description` over the raw body.
fn provider_error_description(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            json.get("error_description")
                .or_else(|| json.get("error"))
                .and_then(serde_json::Value::as_str)
                .map(ToString::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn identity(authority: &str) -> MicrosoftIdentity {
        MicrosoftIdentity::new(
            authority,
            "client-123",
            vec!["openid".to_string(), "User.Read".to_string()],
        )
    }

    #[test]
    fn test_pkce_generation() {
        let pkce = generate_pkce();
        assert!(pkce.verifier.len() >= 40);
        assert!(!pkce.challenge.is_empty());
        assert_ne!(pkce.verifier, pkce.challenge);
    }

    #[test]
    fn test_auth_url_format() {
        let pkce = generate_pkce();
        let id = identity("https://login.microsoftonline.com/tenant/");
        let url = id.build_auth_url(&pkce, "st", &build_redirect_uri(50000));

        assert!(url.starts_with("https://login.microsoftonline.com/tenant/oauth2/v2.0/authorize?"));
        assert!(url.contains("client_id=client-123"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains("scope=openid+User.Read"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A50000%2Fauth%2Fcallback"));
    }

    #[test]
    fn test_random_local_port_is_high() {
        for _ in 0..32 {
            assert!(random_local_port() >= 49152);
        }
    }

    #[test]
    fn test_parse_authorization_input_variants() {
        assert_eq!(
            parse_authorization_input("http://localhost:5000/auth/callback?code=abc&state=xyz"),
            (Some("abc".to_string()), Some("xyz".to_string()))
        );
        assert_eq!(
            parse_authorization_input("?code=abc&state=xyz"),
            (Some("abc".to_string()), Some("xyz".to_string()))
        );
        assert_eq!(
            parse_authorization_input("  raw-code \n"),
            (Some("raw-code".to_string()), None)
        );
        assert_eq!(parse_authorization_input("   "), (None, None));
    }

    #[tokio::test]
    async fn test_exchange_code_returns_access_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant/oauth2/v2.0/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=the-code"))
            .and(body_string_contains("code_verifier="))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "azure-access",
                "token_type": "Bearer",
                "expires_in": 3599
            })))
            .expect(1)
            .mount(&server)
            .await;

        let id = identity(&format!("{}/tenant", server.uri()));
        let tokens = id
            .exchange_code("the-code", &generate_pkce(), "http://localhost:1/auth/callback")
            .await
            .unwrap();
        assert_eq!(tokens.access_token, "azure-access");
        assert_eq!(tokens.expires_in, Some(3599));
    }

    #[tokio::test]
    async fn test_exchange_code_surfaces_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant/oauth2/v2.0/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "AADSTS70008: code expired"
            })))
            .mount(&server)
            .await;

        let id = identity(&format!("{}/tenant", server.uri()));
        let err = id
            .exchange_code("old", &generate_pkce(), "http://localhost:1/auth/callback")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
        assert!(err.to_string().contains("AADSTS70008"));
    }

    /// Serves one request, answering with a body shorter than its length header.
    fn truncated_token_server() -> String {
        use std::io::{Read, Write};

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            loop {
                let n = stream.read(&mut buf).unwrap();
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request);
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .find_map(|l| l.to_ascii_lowercase().strip_prefix("content-length:").map(|v| v.trim().to_string()))
                        .and_then(|v| v.parse::<usize>().ok())
                        .unwrap_or(0);
                    if request.len() >= end + 4 + length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            stream
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 200\r\n\r\n{\"access_")
                .unwrap();
        });
        format!("http://{addr}/tenant")
    }

    #[tokio::test]
    async fn test_exchange_code_reports_unreadable_body() {
        let id = identity(&truncated_token_server());
        let err = id
            .exchange_code("the-code", &generate_pkce(), "http://localhost:1/auth/callback")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
        assert!(err.to_string().contains("failed to read identity provider response"));
    }
}
