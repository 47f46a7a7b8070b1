use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

#[test]
fn test_help_shows_all_commands() {
    cargo_bin_cmd!("ipro")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("login"))
        .stdout(predicate::str::contains("logout"))
        .stdout(predicate::str::contains("home"))
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_check_help_shows_options() {
    cargo_bin_cmd!("ipro")
        .args(["check", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--mode"))
        .stdout(predicate::str::contains("--remarks"))
        .stdout(predicate::str::contains("--lat"))
        .stdout(predicate::str::contains("--lon"));
}

#[test]
fn test_check_rejects_unknown_mode() {
    cargo_bin_cmd!("ipro")
        .args(["check", "--mode", "beach"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown work mode"));
}

#[test]
fn test_check_lat_requires_lon() {
    cargo_bin_cmd!("ipro")
        .args(["check", "--lat", "13.05"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--lon"));
}

#[test]
fn test_version_flag() {
    cargo_bin_cmd!("ipro")
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}
