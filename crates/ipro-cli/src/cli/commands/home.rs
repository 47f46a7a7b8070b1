//! Home screen: greeting, clock, today's status and activity timeline.

use std::fmt::Display;
use std::io::{self, Write};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Local, TimeZone};
use comfy_table::{ContentArrangement, Table};
use ipro_core::attendance::{
    AttendanceController, AttendanceEvent, AttendanceService, AttendanceState, Snapshot,
};
use ipro_core::auth::{AuthService, UserProfile};
use ipro_core::config::Config;
use ipro_core::http::ApiClient;
use ipro_core::location::{LocationProvider, NoLocation};

use super::{api_client, auth_service};

const SHIFT: &str = "Shift: General (10:00 AM - 7:00 PM)";

/// `ipro` with no subcommand.
pub async fn landing(config: &Config) -> Result<()> {
    if auth_service(config)?.is_authenticated() {
        run(config, false).await
    } else {
        println!("Not logged in. Run `ipro login` to sign in.");
        Ok(())
    }
}

pub async fn run(config: &Config, watch: bool) -> Result<()> {
    let (api, profile) = signed_in_user(config).await?;
    let controller = controller(config, api, &profile, NoLocation);
    let snapshot = controller.refresh().await;

    let now = Local::now();
    println!("{}", render_header(&profile, &config.location.label, &now));
    println!();
    println!("{}", render_status(&snapshot));
    println!();
    println!("{}", render_timeline(&snapshot.activities));

    if watch {
        watch_clock().await?;
    }
    Ok(())
}

/// Backend client plus the current user, from cache or the backend.
pub(super) async fn signed_in_user(config: &Config) -> Result<(ApiClient, UserProfile)> {
    let api = api_client(config)?;
    let profile = AuthService::new(api.clone()).current_user().await?;
    Ok((api, profile))
}

pub(super) fn controller<L: LocationProvider>(
    config: &Config,
    api: ApiClient,
    profile: &UserProfile,
    location: L,
) -> AttendanceController<L> {
    AttendanceController::new(
        AttendanceService::new(api),
        location,
        config.location.label.clone(),
        profile.user_id.clone(),
    )
}

fn clock_line<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    now.format("%I : %M : %S %p").to_string()
}

fn render_header<Tz: TimeZone>(profile: &UserProfile, location: &str, now: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    [
        format!("Hello, {}", profile.name()),
        clock_line(now),
        now.format("%a, %b %d, %Y").to_string(),
        SHIFT.to_string(),
        format!("Location: {location}"),
    ]
    .join("\n")
}

pub(super) fn render_status(snapshot: &Snapshot) -> String {
    let mut lines = Vec::new();
    match &snapshot.state {
        AttendanceState::Unassigned { message } => lines.push(message.clone()),
        AttendanceState::CheckedOut => lines.push("Status: Checked out".to_string()),
        AttendanceState::CheckedIn { work_mode } => lines.push(match work_mode {
            Some(mode) => format!("Status: Checked in ({mode})"),
            None => "Status: Checked in".to_string(),
        }),
    }
    if let Some(action) = snapshot.next_action() {
        lines.push(format!("Next: {} (run `ipro check`)", action.label()));
    }
    if let Some(notice) = &snapshot.notice {
        lines.push(format!("Note: {notice}"));
    }
    lines.join("\n")
}

fn render_timeline(events: &[AttendanceEvent]) -> String {
    if events.is_empty() {
        return "No activity recorded today.".to_string();
    }

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(["Time", "Action", "Work mode", "Location", "Remarks"]);
    for event in events {
        table.add_row([
            event.display_time(),
            (if event.is_check_in() { "Check In" } else { "Check Out" }).to_string(),
            event.work_mode.clone().unwrap_or_default(),
            event.location.clone().unwrap_or_default(),
            event.remarks.clone().unwrap_or_default(),
        ]);
    }
    format!("Today's activity\n{table}")
}

/// Redraws the clock line once a second until Ctrl+C.
async fn watch_clock() -> Result<()> {
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    println!();
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                print!("\r{}", clock_line(&Local::now()));
                io::stdout().flush()?;
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                return Ok(());
            }
        }
    }
}
