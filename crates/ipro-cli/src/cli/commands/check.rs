//! Check-in / check-out with the work-mode selection dialog.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result, bail};
use ipro_core::attendance::{Action, WorkMode};
use ipro_core::config::Config;
use ipro_core::geofence::Coordinates;
use ipro_core::location::ConfiguredLocation;

use super::home::{controller, render_status, signed_in_user};

pub async fn run(
    config: &Config,
    mode: Option<WorkMode>,
    remarks: &str,
    position: Option<Coordinates>,
) -> Result<()> {
    let (api, profile) = signed_in_user(config).await?;
    let location = ConfiguredLocation::from_config(&config.location, position);
    let controller = controller(config, api, &profile, location);

    let snapshot = controller.refresh().await;
    println!("{}", render_status(&snapshot));
    println!();

    let Some(action) = snapshot.next_action() else {
        // Unassigned: the message was just printed.
        bail!("No attendance action is available today.");
    };

    let mode = match mode {
        Some(mode) => mode,
        None => select_work_mode(action, snapshot.preselected_mode())?,
    };

    tracing::debug!(action = action.label(), %mode, "attendance action requested");
    println!("{} as {mode}...", action.label());
    let outcome = controller
        .check(mode, remarks)
        .await
        .with_context(|| format!("{} as {mode} failed", action.label()))?;

    println!("✓ {}", outcome.message());
    println!("{}", render_status(&outcome.snapshot));
    Ok(())
}

/// Lists the work modes and reads a choice from stdin.
///
/// An empty answer takes the preselected mode when there is one.
fn select_work_mode(action: Action, preselected: Option<WorkMode>) -> Result<WorkMode> {
    println!("Select work mode to {}:", action.label().to_lowercase());
    for (i, mode) in WorkMode::ALL.iter().enumerate() {
        let marker = if Some(*mode) == preselected { "*" } else { " " };
        println!("  {marker} {}. {mode}", i + 1);
    }
    match preselected {
        Some(mode) => print!("Choice [{mode}]: "),
        None => print!("Choice: "),
    }
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().lock().read_line(&mut input)?;
    parse_choice(&input, preselected)
}

fn parse_choice(input: &str, preselected: Option<WorkMode>) -> Result<WorkMode> {
    let input = input.trim();
    if input.is_empty() {
        return preselected.ok_or_else(|| anyhow::anyhow!("No work mode selected"));
    }
    if let Ok(n) = input.parse::<usize>() {
        return n
            .checked_sub(1)
            .and_then(|i| WorkMode::ALL.get(i).copied())
            .ok_or_else(|| anyhow::anyhow!("Choice must be between 1 and {}", WorkMode::ALL.len()));
    }
    input.parse::<WorkMode>().map_err(anyhow::Error::msg)
}
