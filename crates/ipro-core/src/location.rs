//! Current-position lookup for geofenced actions.
//!
//! One outstanding request per user action, bounded by a timeout. On timeout
//! or error the action is abandoned; there is no retry.

use std::process::Stdio;
use std::time::Duration;

use crate::config::LocationConfig;
use crate::error::{Error, Result};
use crate::geofence::Coordinates;

/// Source of the device position.
pub trait LocationProvider: Send + Sync {
    /// Returns the current position.
    ///
    /// # Errors
    /// Returns [`Error::Location`] if no position can be obtained.
    fn current_position(&self) -> impl Future<Output = Result<Coordinates>> + Send;
}

/// A position given up front (e.g. from command-line flags).
#[derive(Debug, Clone, Copy)]
pub struct FixedLocation(pub Coordinates);

impl LocationProvider for FixedLocation {
    async fn current_position(&self) -> Result<Coordinates> {
        validate(self.0)
    }
}

/// No position source configured; every lookup fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLocation;

impl LocationProvider for NoLocation {
    async fn current_position(&self) -> Result<Coordinates> {
        Err(Error::Location(
            "no position source configured (pass --lat/--lon or set location.command)".to_string(),
        ))
    }
}

/// Runs a shell command that prints `lat,lon` on stdout.
#[derive(Debug, Clone)]
pub struct CommandLocation {
    command: String,
    timeout: Duration,
}

impl CommandLocation {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }
}

impl LocationProvider for CommandLocation {
    async fn current_position(&self) -> Result<Coordinates> {
        let child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .env("NO_COLOR", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Location(format!("failed to run '{}': {e}", self.command)))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|e| {
                tracing::warn!(command = %self.command, "position lookup timed out");
                Error::Location(format!(
                    "timed out after {} seconds ({e})",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| Error::Location(format!("failed to run '{}': {e}", self.command)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Location(format!(
                "'{}' exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_position(&stdout).and_then(validate)
    }
}

/// Position source chosen at runtime.
#[derive(Debug, Clone)]
pub enum ConfiguredLocation {
    Fixed(FixedLocation),
    Command(CommandLocation),
    Unavailable(NoLocation),
}

impl ConfiguredLocation {
    /// Explicit coordinates win over `location.command`.
    pub fn from_config(config: &LocationConfig, fixed: Option<Coordinates>) -> Self {
        if let Some(position) = fixed {
            return ConfiguredLocation::Fixed(FixedLocation(position));
        }
        match config.command.as_deref().map(str::trim) {
            Some(command) if !command.is_empty() => {
                ConfiguredLocation::Command(CommandLocation::new(command, config.timeout()))
            }
            _ => ConfiguredLocation::Unavailable(NoLocation),
        }
    }
}

impl LocationProvider for ConfiguredLocation {
    async fn current_position(&self) -> Result<Coordinates> {
        match self {
            ConfiguredLocation::Fixed(p) => p.current_position().await,
            ConfiguredLocation::Command(p) => p.current_position().await,
            ConfiguredLocation::Unavailable(p) => p.current_position().await,
        }
    }
}

/// Parses `lat,lon` (whitespace and a single line break tolerated).
pub fn parse_position(text: &str) -> Result<Coordinates> {
    let line = text.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    let (lat, lon) = line
        .split_once(',')
        .ok_or_else(|| Error::Location(format!("expected 'lat,lon', got '{line}'")))?;
    let latitude = lat
        .trim()
        .parse::<f64>()
        .map_err(|e| Error::Location(format!("invalid latitude '{}': {e}", lat.trim())))?;
    let longitude = lon
        .trim()
        .parse::<f64>()
        .map_err(|e| Error::Location(format!("invalid longitude '{}': {e}", lon.trim())))?;
    Ok(Coordinates::new(latitude, longitude))
}

fn validate(position: Coordinates) -> Result<Coordinates> {
    let lat_ok = position.latitude.is_finite() && position.latitude.abs() <= 90.0;
    let lon_ok = position.longitude.is_finite() && position.longitude.abs() <= 180.0;
    if lat_ok && lon_ok {
        Ok(position)
    } else {
        Err(Error::Location(format!("position out of range: {position}")))
    }
}
