//! `config show|path|set|set-secret`

use crate::cli::{Cli, ConfigCommands};
use crate::connection::ConnectionManager;
use crate::error::{CliError, Result as CliResult};
use crate::output::{OutputFormat, print_output};
use colored::Colorize;
use tracing::debug;
use warehousectl_core::Config;
use warehousectl_core::config::{SecretBackend, StoredSecret};

/// Keyring entry name for the service principal secret
const CLIENT_SECRET_ENTRY: &str = "client-secret";

pub async fn handle_config_command(
    cmd: &ConfigCommands,
    cli: &Cli,
    conn_mgr: &mut ConnectionManager,
) -> CliResult<()> {
    match cmd {
        ConfigCommands::Show => show(cli, conn_mgr),
        ConfigCommands::Path => {
            println!("{}", conn_mgr.config_file()?.display());
            Ok(())
        }
        ConfigCommands::Set { key, value } => {
            conn_mgr.config.set_value(key, value)?;
            conn_mgr.save_config()?;
            let shown = if key.contains("secret") {
                "[redacted]"
            } else {
                value.as_str()
            };
            println!("{} {} = {}", "✓".green().bold(), key, shown);
            Ok(())
        }
        ConfigCommands::SetSecret { value } => set_secret(conn_mgr, value.as_deref()).await,
    }
}

/// Copy of `config` safe to print
fn redacted(config: &Config) -> Config {
    let mut config = config.clone();
    if let Some(secret) = &config.credential.client_secret
        && !StoredSecret::parse(secret).is_keyring()
    {
        config.credential.client_secret = Some("[redacted]".to_string());
    }
    config
}

fn show(cli: &Cli, conn_mgr: &ConnectionManager) -> CliResult<()> {
    print_output(
        redacted(&conn_mgr.config),
        OutputFormat::resolve(cli.output, OutputFormat::Yaml),
        cli.query.as_deref(),
    )?;
    Ok(())
}

async fn set_secret(conn_mgr: &mut ConnectionManager, value: Option<&str>) -> CliResult<()> {
    let secret = match value {
        Some(v) => v.to_string(),
        None => tokio::task::spawn_blocking(|| {
            dialoguer::Password::new()
                .with_prompt("Client secret")
                .interact()
        })
        .await
        .map_err(|e| CliError::InvalidInput {
            message: e.to_string(),
        })?
        .map_err(|e| CliError::InvalidInput {
            message: format!("Failed to read secret: {}", e),
        })?,
    };
    if secret.trim().is_empty() {
        return Err(CliError::InvalidInput {
            message: "client secret must not be empty".to_string(),
        });
    }

    let backend = SecretBackend::detect();
    let stored = backend.save(CLIENT_SECRET_ENTRY, secret.trim())?;
    debug!("Stored client secret in {}", backend);
    conn_mgr.config.credential.client_secret = Some(stored);
    conn_mgr.save_config()?;

    println!(
        "{} Client secret saved ({})",
        "✓".green().bold(),
        backend
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plaintext_secret_is_redacted() {
        let mut config = Config::default();
        config.credential.client_secret = Some("hunter2".to_string());
        assert_eq!(
            redacted(&config).credential.client_secret.as_deref(),
            Some("[redacted]")
        );
    }

    #[test]
    fn test_keyring_reference_is_shown() {
        let mut config = Config::default();
        config.credential.client_secret = Some("keyring:client-secret".to_string());
        assert_eq!(
            redacted(&config).credential.client_secret.as_deref(),
            Some("keyring:client-secret")
        );
    }
}
