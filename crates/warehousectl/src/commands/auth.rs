//! `auth status` and `auth login`

use crate::cli::{AuthCommands, Cli};
use crate::connection::ConnectionManager;
use crate::error::{CliError, Result as CliResult};
use crate::output::{OutputFormat, print_output};
use colored::Colorize;
use serde_json::json;
use tracing::info;
use warehousectl_core::auth::{AZURE_CLI_INSTALL_URL, AuthStatus, probe_cli};

pub async fn handle_auth_command(
    cmd: &AuthCommands,
    cli: &Cli,
    conn_mgr: &ConnectionManager,
) -> CliResult<()> {
    match cmd {
        AuthCommands::Status => status(cli, conn_mgr).await,
        AuthCommands::Login => login(conn_mgr).await,
    }
}

async fn status(cli: &Cli, conn_mgr: &ConnectionManager) -> CliResult<()> {
    let runner = conn_mgr.runner();
    let status = probe_cli(runner.as_ref(), &conn_mgr.config.tools.az).await;

    if cli.output != crate::cli::OutputFormat::Auto || cli.query.is_some() {
        let value = match &status {
            AuthStatus::Ready { user, tenant } => {
                json!({"status": "ready", "user": user, "tenant": tenant})
            }
            AuthStatus::NotLoggedIn { detail } => {
                json!({"status": "not-logged-in", "detail": detail})
            }
            AuthStatus::CliMissing { detail } => {
                json!({"status": "cli-missing", "detail": detail})
            }
        };
        print_output(
            value,
            OutputFormat::resolve(cli.output, OutputFormat::Json),
            cli.query.as_deref(),
        )?;
        return Ok(());
    }

    match status {
        AuthStatus::Ready { user, tenant } => {
            println!(
                "{} Signed in to Azure CLI as {} (tenant {})",
                "✓".green().bold(),
                user.as_deref().unwrap_or("unknown user"),
                tenant.as_deref().unwrap_or("unknown")
            );
            Ok(())
        }
        AuthStatus::NotLoggedIn { detail } => Err(CliError::NotLoggedIn { detail }),
        AuthStatus::CliMissing { detail } => Err(CliError::CliMissing { detail }),
    }
}

/// Run `az login` attached to the terminal
async fn login(conn_mgr: &ConnectionManager) -> CliResult<()> {
    let az = &conn_mgr.config.tools.az;
    info!("Running {} login", az);

    let status = tokio::process::Command::new(az)
        .arg("login")
        .status()
        .await
        .map_err(|e| CliError::CliMissing {
            detail: format!("{}: {} (see {})", az, e, AZURE_CLI_INSTALL_URL),
        })?;

    if status.success() {
        println!("{} Signed in", "✓".green().bold());
        Ok(())
    } else {
        Err(CliError::ExternalTool {
            message: format!("{} login exited with {}", az, status),
        })
    }
}
