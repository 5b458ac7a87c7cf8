use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::{generate, shells};
use tracing::{debug, info, trace};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use warehousectl_core::{Config, ScaleRequest};

mod cli;
mod commands;
mod connection;
mod error;
mod hooks;
mod output;
mod render;

use cli::{Cli, Commands};
use connection::ConnectionManager;
use error::CliError;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    let (config, config_path) = if let Some(config_file) = &cli.config_file {
        let path = std::path::PathBuf::from(config_file);
        debug!("Loading config from explicit path: {:?}", path);
        let config = Config::load_from_path(&path)?;
        (config, Some(path))
    } else {
        debug!("Loading config from default location");
        (Config::load()?, None)
    };
    let mut conn_mgr = ConnectionManager::with_config_path(config, config_path);

    if let Err(e) = execute_command(&cli, &mut conn_mgr).await {
        e.print_diagnostic();
        std::process::exit(1);
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::from_default_env()
    } else {
        let level = match verbose {
            0 => "warehousectl=warn,warehousectl_core=warn",
            1 => "warehousectl=info,warehousectl_core=info",
            2 => "warehousectl=debug,warehousectl_core=debug",
            _ => "warehousectl=trace,warehousectl_core=trace",
        };
        tracing_subscriber::EnvFilter::new(level)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_thread_names(false)
                .compact(),
        )
        .init();

    debug!("Tracing initialized with verbosity level: {}", verbose);
}

async fn execute_command(cli: &Cli, conn_mgr: &mut ConnectionManager) -> Result<(), CliError> {
    trace!("Executing command: {:?}", cli.command);
    info!("Command: {}", format_command(&cli.command));

    let start = std::time::Instant::now();
    let result = match &cli.command {
        Commands::Version => {
            debug!("Showing version information");
            match cli.output {
                cli::OutputFormat::Json | cli::OutputFormat::Yaml => {
                    let output_data = serde_json::json!({
                        "version": env!("CARGO_PKG_VERSION"),
                        "name": env!("CARGO_PKG_NAME"),
                    });
                    output::print_output(
                        &output_data,
                        output::OutputFormat::resolve(cli.output, output::OutputFormat::Json),
                        None,
                    )?;
                }
                _ => {
                    println!("warehousectl {}", env!("CARGO_PKG_VERSION"));
                }
            }
            Ok(())
        }
        Commands::Completions { shell } => {
            debug!("Generating completions for {:?}", shell);
            generate_completions(*shell);
            Ok(())
        }
        Commands::Tree { expand } => commands::warehouse::tree(cli, conn_mgr, *expand).await,
        Commands::List => commands::warehouse::list(cli, conn_mgr).await,
        Commands::Watch { interval, expand } => {
            commands::watch::run(cli, conn_mgr, *interval, *expand).await
        }
        Commands::Pause { target } => commands::warehouse::pause(cli, conn_mgr, target).await,
        Commands::Resume { target } => commands::warehouse::resume(cli, conn_mgr, target).await,
        Commands::Scale {
            target,
            level,
            strategy,
            yes,
        } => {
            let request = ScaleRequest {
                level: level.clone(),
                strategy: *strategy,
                assume_yes: *yes,
            };
            commands::warehouse::scale(cli, conn_mgr, target, request).await
        }
        Commands::Levels { target, strategy } => {
            commands::warehouse::levels(cli, conn_mgr, target, *strategy).await
        }
        Commands::Link { target } => commands::warehouse::link(cli, conn_mgr, target).await,
        Commands::Auth(cmd) => commands::auth::handle_auth_command(cmd, cli, conn_mgr).await,
        Commands::Config(cmd) => {
            commands::config::handle_config_command(cmd, cli, conn_mgr).await
        }
    };

    let duration = start.elapsed();
    match &result {
        Ok(_) => info!(
            "Command completed successfully in {:.3}s",
            duration.as_secs_f64()
        ),
        Err(e) => debug!("Command failed after {:.3}s: {}", duration.as_secs_f64(), e),
    }

    result
}

fn generate_completions(shell: cli::Shell) {
    let mut cmd = cli::Cli::command();
    let name = cmd.get_name().to_string();

    match shell {
        cli::Shell::Bash => generate(shells::Bash, &mut cmd, name, &mut std::io::stdout()),
        cli::Shell::Zsh => generate(shells::Zsh, &mut cmd, name, &mut std::io::stdout()),
        cli::Shell::Fish => generate(shells::Fish, &mut cmd, name, &mut std::io::stdout()),
        cli::Shell::PowerShell => {
            generate(shells::PowerShell, &mut cmd, name, &mut std::io::stdout())
        }
        cli::Shell::Elvish => generate(shells::Elvish, &mut cmd, name, &mut std::io::stdout()),
    }
}

/// One-line description of a command for logs, with secrets left out
fn format_command(command: &Commands) -> String {
    match command {
        Commands::Version => "version".to_string(),
        Commands::Completions { shell } => format!("completions {:?}", shell),
        Commands::Tree { expand } => format!("tree expand={}", expand),
        Commands::List => "list".to_string(),
        Commands::Watch { interval, expand } => {
            format!("watch interval={:?} expand={}", interval, expand)
        }
        Commands::Pause { target } => format!("pause {}", target),
        Commands::Resume { target } => format!("resume {}", target),
        Commands::Scale {
            target,
            level,
            strategy,
            yes,
        } => format!(
            "scale {} level={:?} strategy={:?} yes={}",
            target, level, strategy, yes
        ),
        Commands::Levels { target, .. } => format!("levels {}", target),
        Commands::Link { target } => format!("link {}", target),
        Commands::Auth(cmd) => format!("auth {:?}", cmd),
        Commands::Config(cmd) => {
            use cli::ConfigCommands::*;
            match cmd {
                Show => "config show".to_string(),
                Path => "config path".to_string(),
                Set { key, .. } if key.contains("secret") => {
                    format!("config set {} [value redacted]", key)
                }
                Set { key, value } => format!("config set {} {}", key, value),
                SetSecret { .. } => "config set-secret [value redacted]".to_string(),
            }
        }
    }
}
