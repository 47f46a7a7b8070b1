//! `ipro config path` and `ipro config init`.

use anyhow::{Context, Result};
use ipro_core::config::{Config, paths};

/// Prints where the config lives, noting when it has not been created yet.
pub fn path() {
    let config_path = paths::config_path();
    println!("{}", config_path.display());
    if !config_path.exists() {
        eprintln!("(not created yet, run `ipro config init`; built-in defaults apply)");
    }
}

/// Writes the commented default config. Refuses to overwrite.
pub fn init() -> Result<()> {
    let config_path = paths::config_path();
    Config::init(&config_path)
        .with_context(|| format!("init config at {}", config_path.display()))?;
    println!("Created config at {}", config_path.display());
    println!("Set [api] base_url and [location] label for your office before logging in.");
    Ok(())
}
