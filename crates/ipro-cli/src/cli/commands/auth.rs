//! Login, logout and whoami.

use std::io::{self, BufRead, IsTerminal, Read, Write};
use std::net::TcpListener;
use std::time::Duration;

use anyhow::{Context, Result};
use ipro_core::config::{Config, IdentityConfig, paths};
use ipro_core::identity::{
    IdentityProvider, LOCAL_CALLBACK_PATH, MicrosoftIdentity, build_redirect_uri, generate_pkce,
    parse_authorization_input, random_local_port,
};
use ipro_core::storage::{CredentialStore, mask_token};

use super::{auth_service, confirm};

const CALLBACK_TIMEOUT: Duration = Duration::from_secs(120);
const CALLBACK_READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Interactive Microsoft login: browser + loopback callback, or pasted code.
struct BrowserLogin {
    identity: MicrosoftIdentity,
    callback_port: u16,
}

impl BrowserLogin {
    fn from_config(config: &IdentityConfig) -> Result<Self> {
        Ok(Self {
            identity: MicrosoftIdentity::from_config(config)?,
            callback_port: config.callback_port,
        })
    }

    async fn authorize(&self) -> Result<String> {
        let pkce = generate_pkce();
        let oauth_state = uuid::Uuid::new_v4().to_string();
        let port = match self.callback_port {
            0 => random_local_port(),
            port => port,
        };
        let redirect_uri = build_redirect_uri(port);
        let auth_url = self.identity.build_auth_url(&pkce, &oauth_state, &redirect_uri);

        println!("To sign in with your organization account:");
        println!();
        println!("  1. A browser window will open (or visit the URL below)");
        println!("  2. Sign in and approve access");
        println!("  3. If redirected to localhost, return here to continue");
        println!("  4. Otherwise, paste the authorization code or redirect URL");
        println!();
        println!("Authorization URL:");
        println!("  {auth_url}");
        println!();

        // best effort, skipped in tests
        if std::env::var("IPRO_NO_BROWSER").is_err() {
            let _ = open::that(&auth_url);
        }

        // Prefer local callback in interactive sessions, fall back to manual paste.
        let local_code = if io::stdin().is_terminal() {
            let expected_state = oauth_state.clone();
            tokio::task::spawn_blocking(move || wait_for_local_code(port, &expected_state))
                .await
                .unwrap_or_default()
        } else {
            None
        };

        let code = match local_code {
            Some(code) => code,
            None => {
                print!("Paste authorization code (or full redirect URL): ");
                io::stdout().flush()?;

                let mut input = String::new();
                io::stdin().lock().read_line(&mut input)?;
                let (code, provided_state) = parse_authorization_input(&input);
                if let Some(provided) = provided_state
                    && provided != oauth_state
                {
                    anyhow::bail!("State mismatch");
                }
                code.ok_or_else(|| anyhow::anyhow!("Authorization code cannot be empty"))?
            }
        };

        println!("Exchanging code for tokens...");
        let tokens = self
            .identity
            .exchange_code(&code, &pkce, &redirect_uri)
            .await?;
        Ok(tokens.access_token)
    }
}

impl IdentityProvider for BrowserLogin {
    async fn login(&self) -> ipro_core::Result<String> {
        self.authorize()
            .await
            .map_err(|e| ipro_core::Error::Authentication(format!("{e:#}")))
    }
}

pub async fn login(config: &Config, force: bool) -> Result<()> {
    let auth = auth_service(config)?;

    if auth.is_authenticated() && !force {
        match auth.cached_profile() {
            Some(profile) => println!("Already logged in as {}.", profile.name()),
            None => println!("Already logged in."),
        }
        if !confirm("Do you want to replace the existing session?")? {
            println!("Login cancelled.");
            return Ok(());
        }
    }

    let provider =
        BrowserLogin::from_config(&config.identity).context("configure identity provider")?;
    let profile = auth
        .sign_in(&provider)
        .await
        .context("Login failed. Please try again.")?;

    println!();
    tracing::info!(user_id = %profile.user_id, "login complete");
    println!("✓ Logged in as {} (user id: {})", profile.name(), profile.user_id);
    println!("  Session saved to: {}", paths::credentials_path().display());

    Ok(())
}

pub fn logout(config: &Config, yes: bool) -> Result<()> {
    if !yes && !confirm("Do you want to logout?")? {
        println!("Logout cancelled.");
        return Ok(());
    }

    let auth = auth_service(config)?;
    if auth.sign_out() {
        println!("✓ Logged out");
        println!(
            "  Credentials removed from: {}",
            paths::credentials_path().display()
        );
    } else {
        println!("Not logged in (no session found).");
    }

    Ok(())
}

pub async fn whoami(config: &Config) -> Result<()> {
    let auth = auth_service(config)?;
    let profile = auth.current_user().await?;

    println!("{}", profile.name());
    println!("  User id: {}", profile.user_id);
    if let Some(email) = profile.email.as_deref() {
        println!("  Email:   {email}");
    }
    if let Ok(Some(token)) = CredentialStore::from_home().session_token() {
        println!("  Session: {}", mask_token(&token));
    }

    Ok(())
}

fn wait_for_local_code(port: u16, expected_state: &str) -> Option<String> {
    let Ok(listener) = TcpListener::bind(format!("127.0.0.1:{port}")) else {
        return None;
    };
    let _ = listener.set_nonblocking(true);
    tracing::debug!(port, "waiting for OAuth callback");

    let (tx, rx) = std::sync::mpsc::channel::<Option<String>>();
    let expected_state = expected_state.to_string();
    std::thread::spawn(move || {
        let _ = tx.send(serve_callback(&listener, &expected_state, CALLBACK_TIMEOUT));
    });

    rx.recv_timeout(CALLBACK_TIMEOUT).ok().flatten()
}

/// Answers connections on a non-blocking `listener` until the callback
/// request arrives or `timeout` passes. Other requests get a 404.
fn serve_callback(
    listener: &TcpListener,
    expected_state: &str,
    timeout: Duration,
) -> Option<String> {
    let start = std::time::Instant::now();
    loop {
        match listener.accept() {
            Ok((mut stream, _)) => {
                let _ = stream.set_nonblocking(false);
                let _ = stream.set_read_timeout(Some(CALLBACK_READ_TIMEOUT));
                let mut buffer = [0u8; 4096];
                let Ok(n) = stream.read(&mut buffer) else {
                    // Preconnect that never sent a request.
                    continue;
                };
                let request = String::from_utf8_lossy(&buffer[..n]);
                match classify_request(&request, expected_state) {
                    CallbackRequest::Other => {
                        let _ = stream.write_all(not_found_response().as_bytes());
                    }
                    CallbackRequest::Rejected => {
                        let _ = stream.write_all(oauth_error_response().as_bytes());
                        return None;
                    }
                    CallbackRequest::Code(code) => {
                        let _ = stream.write_all(oauth_success_response().as_bytes());
                        return Some(code);
                    }
                }
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                if start.elapsed() > timeout {
                    return None;
                }
                std::thread::sleep(Duration::from_millis(100));
            }
            Err(_) => return None,
        }
    }
}

#[derive(Debug, PartialEq)]
enum CallbackRequest {
    /// Not the callback path (favicon, empty preconnect, ...).
    Other,
    /// The callback path, with a wrong state or no code.
    Rejected,
    Code(String),
}

/// Sorts a raw HTTP request by path, then checks `state` and pulls `code`.
fn classify_request(request: &str, expected_state: &str) -> CallbackRequest {
    let Some(url) = request_url(request) else {
        return CallbackRequest::Other;
    };
    if url.path() != LOCAL_CALLBACK_PATH {
        return CallbackRequest::Other;
    }
    let param = |name: &str| {
        url.query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.to_string())
    };
    if param("state").as_deref() != Some(expected_state) {
        return CallbackRequest::Rejected;
    }
    match param("code") {
        Some(code) if !code.is_empty() => CallbackRequest::Code(code),
        _ => CallbackRequest::Rejected,
    }
}

fn request_url(request: &str) -> Option<url::Url> {
    let mut parts = request.lines().next()?.split_whitespace();
    let _method = parts.next()?;
    let target = parts.next()?;
    url::Url::parse(&format!("http://localhost{target}")).ok()
}

fn not_found_response() -> String {
    "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
}

fn oauth_success_response() -> String {
    let body = "<html><body><h3>Signed in</h3><p>You can close this window and return to the terminal.</p></body></html>";
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    )
}

fn oauth_error_response() -> String {
    let body = "<html><body><h3>Sign-in failed</h3><p>Please return to the terminal and paste the code.</p></body></html>";
    format!(
        "HTTP/1.1 400 Bad Request\r\nContent-Type: text/html\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    )
}
