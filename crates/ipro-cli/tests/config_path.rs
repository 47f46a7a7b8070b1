use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::tempdir;

#[test]
fn test_config_path_follows_ipro_home() {
    let dir = tempdir().unwrap();
    let expected = dir.path().join("config.toml");

    cargo_bin_cmd!("ipro")
        .env("IPRO_HOME", dir.path())
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(format!("{}\n", expected.display()))
        .stderr(predicate::str::contains("ipro config init"));

    fs::write(&expected, "").unwrap();
    cargo_bin_cmd!("ipro")
        .env("IPRO_HOME", dir.path())
        .args(["config", "path"])
        .assert()
        .success()
        .stderr(predicate::str::is_empty());
}

#[test]
fn test_config_init_creates_file() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("config.toml");

    assert!(!config_path.exists());

    cargo_bin_cmd!("ipro")
        .env("IPRO_HOME", dir.path())
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created config at"));

    assert!(config_path.exists());

    let contents = fs::read_to_string(&config_path).unwrap();
    let table: toml::Table = contents.parse().unwrap();
    assert_eq!(
        table["api"]["base_url"].as_str(),
        Some("https://ems-ma.ideassionlive.in/api")
    );
    assert_eq!(table["identity"]["callback_port"].as_integer(), Some(0));
    assert!(
        table["identity"]["authority"]
            .as_str()
            .unwrap()
            .starts_with("https://login.microsoftonline.com/")
    );
    assert_eq!(table["location"]["label"].as_str(), Some("Chennai"));
    assert_eq!(table["location"]["timeout_secs"].as_integer(), Some(15));
    // The position command is documented but left off.
    assert!(table["location"].get("command").is_none());
    assert!(contents.contains("# command ="));
}

#[test]
fn test_invalid_base_url_in_config_is_rejected() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("config.toml"),
        "[api]\nbase_url = \"not a url\"\n",
    )
    .unwrap();

    cargo_bin_cmd!("ipro")
        .env("IPRO_HOME", dir.path())
        .env_remove("IPRO_BASE_URL")
        .arg("whoami")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid API URL: not a url"));
}

#[test]
fn test_config_init_fails_if_exists() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("config.toml");

    fs::write(&config_path, "# existing config").unwrap();

    cargo_bin_cmd!("ipro")
        .env("IPRO_HOME", dir.path())
        .args(["config", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_malformed_config_is_reported() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("config.toml"), "[api\nbase_url = ").unwrap();

    cargo_bin_cmd!("ipro")
        .env("IPRO_HOME", dir.path())
        .arg("whoami")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse config"));
}

#[test]
fn test_config_help_shows_subcommands() {
    cargo_bin_cmd!("ipro")
        .args(["config", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("path"))
        .stdout(predicate::str::contains("init"));
}
