//! CLI command handlers.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use ipro_core::auth::AuthService;
use ipro_core::config::Config;
use ipro_core::http::ApiClient;
use ipro_core::storage::CredentialStore;

pub mod auth;
pub mod check;
pub mod config;
pub mod home;

/// Backend client over the credential files in `IPRO_HOME`.
fn api_client(config: &Config) -> Result<ApiClient> {
    ApiClient::from_config(&config.api, CredentialStore::from_home()).context("create API client")
}

fn auth_service(config: &Config) -> Result<AuthService> {
    Ok(AuthService::new(api_client(config)?))
}

/// Prints `question [y/N] ` and reads one line; only `y` confirms.
fn confirm(question: &str) -> Result<bool> {
    print!("{question} [y/N] ");
    io::stdout().flush()?;

    let mut response = String::new();
    io::stdin().lock().read_line(&mut response)?;
    Ok(response.trim().eq_ignore_ascii_case("y"))
}
