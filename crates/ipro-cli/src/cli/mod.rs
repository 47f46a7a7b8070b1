//! CLI entry and dispatch.

use anyhow::{Context, Result};
use clap::Parser;
use ipro_core::attendance::WorkMode;
use ipro_core::config;
use ipro_core::geofence::Coordinates;
use ipro_core::logging;

mod commands;

#[derive(Parser)]
#[command(name = "ipro")]
#[command(version)]
#[command(about = "Attendance check-in/check-out from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Sign in with your organization account
    Login {
        /// Replace an existing session without asking
        #[arg(long)]
        force: bool,
    },

    /// Sign out and clear the stored session
    Logout {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Show the signed-in user
    Whoami,

    /// Show today's status and activity
    Home {
        /// Keep a live clock running until Ctrl+C
        #[arg(short, long)]
        watch: bool,
    },

    /// Check in or check out (whichever applies now)
    Check {
        /// Work mode: office, wfh, or client (asks when omitted)
        #[arg(short, long, value_name = "MODE")]
        mode: Option<WorkMode>,

        /// Remarks recorded with the event
        #[arg(short, long, default_value = "")]
        remarks: String,

        /// Current latitude (Office mode; overrides location.command)
        #[arg(long, requires = "lon", allow_negative_numbers = true)]
        lat: Option<f64>,

        /// Current longitude (Office mode; overrides location.command)
        #[arg(long, requires = "lat", allow_negative_numbers = true)]
        lon: Option<f64>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let _log_guard = match logging::init() {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: file logging disabled: {e:#}");
            None
        }
    };

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;
    rt.block_on(async move { dispatch(cli).await })
}

async fn dispatch(cli: Cli) -> Result<()> {
    let config = config::Config::load().context("load config")?;

    // no subcommand: home when signed in, login hint otherwise
    let Some(command) = cli.command else {
        return commands::home::landing(&config).await;
    };

    match command {
        Commands::Login { force } => commands::auth::login(&config, force).await,
        Commands::Logout { yes } => commands::auth::logout(&config, yes),
        Commands::Whoami => commands::auth::whoami(&config).await,
        Commands::Home { watch } => commands::home::run(&config, watch).await,
        Commands::Check {
            mode,
            remarks,
            lat,
            lon,
        } => {
            let position = lat.zip(lon).map(|(lat, lon)| Coordinates::new(lat, lon));
            commands::check::run(&config, mode, &remarks, position).await
        }
        Commands::Config { command } => match command {
            ConfigCommands::Path => {
                commands::config::path();
                Ok(())
            }
            ConfigCommands::Init => commands::config::init(),
        },
    }
}
