//! Loading and saving `config.toml` outside the happy path

use std::fs;
use std::path::Path;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serial_test::serial;
use tempfile::TempDir;
use warehousectl_core::config::{Config, ConfigError, CredentialKind, ScaleStrategy};

fn write_config(dir: &TempDir, content: &str) -> std::path::PathBuf {
    let path = dir.path().join("config.toml");
    fs::write(&path, content).unwrap();
    path
}

#[cfg(unix)]
fn running_as_root() -> bool {
    std::process::Command::new("id")
        .arg("-u")
        .output()
        .ok()
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .is_some_and(|uid| uid.trim() == "0")
}

#[test]
fn missing_file_gives_defaults() {
    let config =
        Config::load_from_path(Path::new("/nonexistent/warehousectl/config.toml")).unwrap();

    assert_eq!(config, Config::default());
    assert_eq!(config.poll_interval(), Duration::from_secs(60));
    assert_eq!(config.operation_timeout(), Duration::from_secs(1800));
    assert_eq!(config.endpoints.management, "https://management.azure.com");
}

#[test]
fn empty_file_gives_defaults() {
    let dir = TempDir::new().unwrap();
    let config = Config::load_from_path(&write_config(&dir, "")).unwrap();

    assert_eq!(config, Config::default());
}

#[test]
fn broken_toml_is_a_parse_error() {
    let dir = TempDir::new().unwrap();
    let result = Config::load_from_path(&write_config(&dir, "[[[broken"));

    assert!(matches!(result, Err(ConfigError::Parse(_))));
}

#[test]
fn unknown_scale_strategy_is_rejected() {
    let dir = TempDir::new().unwrap();
    let result = Config::load_from_path(&write_config(&dir, "scale_strategy = \"terraform\"\n"));

    assert!(matches!(result, Err(ConfigError::Parse(_))));
}

#[test]
fn poll_interval_of_wrong_type_is_rejected() {
    let dir = TempDir::new().unwrap();
    let result = Config::load_from_path(&write_config(&dir, "poll_interval_secs = \"soon\"\n"));

    assert!(matches!(result, Err(ConfigError::Parse(_))));
}

#[test]
fn unknown_keys_are_ignored() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
theme = "dark"
expand_subscriptions = true

[tools]
az = "/opt/az/bin/az"
terraform = "/usr/bin/terraform"
"#,
    );

    let config = Config::load_from_path(&path).unwrap();
    assert!(config.expand_subscriptions);
    assert_eq!(config.tools.az, "/opt/az/bin/az");
    assert_eq!(config.tools.pwsh, "pwsh");
}

#[test]
fn zero_poll_interval_waits_one_second() {
    let dir = TempDir::new().unwrap();
    let config = Config::load_from_path(&write_config(&dir, "poll_interval_secs = 0\n")).unwrap();

    assert_eq!(config.poll_interval(), Duration::from_secs(1));
}

#[test]
fn saved_config_loads_back_identically() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a").join("b").join("config.toml");

    let mut config = Config::default();
    config.set_value("scale-strategy", "cli").unwrap();
    config.set_value("credential.kind", "client-secret").unwrap();
    config.set_value("credential.tenant_id", "contoso.onmicrosoft.com").unwrap();
    config.set_value("endpoints.portal", "https://portal.azure.us").unwrap();
    config.save_to_path(&path).unwrap();

    let loaded = Config::load_from_path(&path).unwrap();
    assert_eq!(loaded, config);
    assert_eq!(loaded.scale_strategy, ScaleStrategy::Cli);
    assert_eq!(loaded.credential.kind, CredentialKind::ClientSecret);
}

#[test]
#[serial]
fn environment_references_are_expanded() {
    unsafe {
        std::env::set_var("WAREHOUSECTL_TEST_SP_SECRET", "from-env");
        std::env::remove_var("WAREHOUSECTL_TEST_TENANT");
    }
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[credential]
client_secret = "${WAREHOUSECTL_TEST_SP_SECRET}"
tenant_id = "${WAREHOUSECTL_TEST_TENANT:-contoso.onmicrosoft.com}"
client_id = "${WAREHOUSECTL_TEST_UNSET_CLIENT}"
"#,
    );

    let config = Config::load_from_path(&path).unwrap();
    assert_eq!(config.credential.client_secret.as_deref(), Some("from-env"));
    assert_eq!(
        config.credential.tenant_id.as_deref(),
        Some("contoso.onmicrosoft.com")
    );
    assert_eq!(
        config.credential.client_id.as_deref(),
        Some("${WAREHOUSECTL_TEST_UNSET_CLIENT}")
    );

    unsafe {
        std::env::remove_var("WAREHOUSECTL_TEST_SP_SECRET");
    }
}

#[test]
#[serial]
fn azure_environment_completes_service_principal() {
    unsafe {
        std::env::remove_var("AZURE_TENANT_ID");
        std::env::remove_var("AZURE_CLIENT_ID");
        std::env::set_var("AZURE_CLIENT_SECRET", "env-secret");
    }

    let mut config = Config::default();
    assert!(config.credential.resolve_client_secret().unwrap().is_none());

    config.credential.tenant_id = Some("tenant".to_string());
    config.credential.client_id = Some("app".to_string());
    config.credential.client_secret = Some("config-secret".to_string());
    let resolved = config.credential.resolve_client_secret().unwrap().unwrap();
    assert_eq!(resolved.tenant_id, "tenant");
    assert_eq!(resolved.client_id, "app");
    assert_eq!(resolved.client_secret, "env-secret");

    unsafe {
        std::env::remove_var("AZURE_CLIENT_SECRET");
    }
}

#[cfg(unix)]
#[test]
fn unreadable_file_is_a_read_error() {
    use std::os::unix::fs::PermissionsExt;

    if running_as_root() {
        eprintln!("skipping: root ignores file permissions");
        return;
    }

    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "expand_subscriptions = true\n");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o000)).unwrap();

    let result = Config::load_from_path(&path);
    fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

    match result {
        Err(ConfigError::Read { path: reported, .. }) => assert_eq!(reported, path),
        other => panic!("expected a read error, got {:?}", other),
    }
}

#[cfg(unix)]
#[test]
fn readonly_directory_is_a_write_error() {
    use std::os::unix::fs::PermissionsExt;

    if running_as_root() {
        eprintln!("skipping: root ignores file permissions");
        return;
    }

    let dir = TempDir::new().unwrap();
    let readonly = dir.path().join("readonly");
    fs::create_dir(&readonly).unwrap();
    fs::set_permissions(&readonly, fs::Permissions::from_mode(0o555)).unwrap();

    let result = Config::default().save_to_path(&readonly.join("config.toml"));
    fs::set_permissions(&readonly, fs::Permissions::from_mode(0o755)).unwrap();

    assert!(matches!(result, Err(ConfigError::Write { .. })));
}
