use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Helper to create a test command
fn warehousectl() -> Command {
    let mut cmd = Command::cargo_bin("warehousectl").unwrap();
    cmd.env_remove("WAREHOUSECTL_CONFIG_FILE")
        .env_remove("WAREHOUSECTL_SUBSCRIPTION")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_flag() {
    warehousectl()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("dedicated SQL pools"))
        .stdout(predicate::str::contains("EXAMPLES:"));
}

#[test]
fn test_help_short_flag() {
    warehousectl()
        .arg("-h")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"));
}

#[test]
fn test_version_flag() {
    warehousectl()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("warehousectl"))
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_version_command_json() {
    warehousectl()
        .args(["version", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"name\": \"warehousectl\""));
}

#[test]
fn test_no_args_shows_help() {
    warehousectl()
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_invalid_subcommand() {
    warehousectl()
        .arg("invalid-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

#[test]
fn test_scale_help_lists_flags() {
    warehousectl()
        .args(["scale", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--level"))
        .stdout(predicate::str::contains("--strategy"))
        .stdout(predicate::str::contains("--yes"));
}

#[test]
fn test_scale_rejects_unknown_strategy() {
    warehousectl()
        .args(["scale", "srv/dw1", "--strategy", "terraform"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_pause_requires_target() {
    warehousectl()
        .arg("pause")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("<TARGET>"));
}

#[test]
fn test_watch_help_lists_panel_commands() {
    warehousectl()
        .args(["watch", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("PANEL COMMANDS:"))
        .stdout(predicate::str::contains("scale <target> [level]"));
}

#[test]
fn test_completions_help() {
    warehousectl()
        .arg("completions")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Generate shell completions"))
        .stdout(predicate::str::contains("bash"))
        .stdout(predicate::str::contains("zsh"));
}

#[test]
fn test_completions_bash() {
    warehousectl()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("warehousectl"));
}

// === CONFIG COMMANDS ===

#[test]
fn test_config_path_with_config_file_flag() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");

    warehousectl()
        .arg("--config-file")
        .arg(&path)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains(path.to_string_lossy().to_string()));
}

#[test]
fn test_config_set_then_show() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");

    warehousectl()
        .arg("--config-file")
        .arg(&path)
        .args(["config", "set", "scale-strategy", "cli"])
        .assert()
        .success();

    warehousectl()
        .arg("--config-file")
        .arg(&path)
        .args(["config", "set", "credential.client_secret", "hunter2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hunter2").not());

    warehousectl()
        .arg("--config-file")
        .arg(&path)
        .args(["config", "show", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"scale_strategy\": \"cli\""))
        .stdout(predicate::str::contains("[redacted]"))
        .stdout(predicate::str::contains("hunter2").not());
}

#[test]
fn test_config_set_unknown_key_fails_with_diagnostic() {
    let dir = TempDir::new().unwrap();

    warehousectl()
        .arg("--config-file")
        .arg(dir.path().join("config.toml"))
        .args(["config", "set", "profile", "x"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("error"))
        .stderr(predicate::str::contains("profile"));
}

#[test]
fn test_config_set_rejects_bad_value() {
    let dir = TempDir::new().unwrap();

    warehousectl()
        .arg("--config-file")
        .arg(dir.path().join("config.toml"))
        .args(["config", "set", "poll-interval-secs", "0"])
        .assert()
        .failure()
        .code(1);
}

#[test]
fn test_corrupt_config_file_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[[[broken").unwrap();

    warehousectl()
        .arg("--config-file")
        .arg(&path)
        .args(["config", "show"])
        .assert()
        .failure();
}

#[test]
fn test_multiple_verbose_flags() {
    let dir = TempDir::new().unwrap();

    warehousectl()
        .arg("-vvv")
        .arg("--config-file")
        .arg(dir.path().join("config.toml"))
        .args(["config", "path"])
        .assert()
        .success();
}
