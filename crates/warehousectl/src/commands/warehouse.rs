//! One-shot warehouse commands: tree, list, pause, resume, scale, levels, link

use crate::cli::{self, Cli};
use crate::connection::ConnectionManager;
use crate::error::{CliError, Result as CliResult};
use crate::hooks::ConsoleHooks;
use crate::output::{OutputFormat, print_output};
use crate::render;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;
use warehousectl_core::scale::{candidate_levels, static_levels};
use warehousectl_core::{Outcome, ScaleRequest, ScaleStrategy, Session, TreeNode, Warehouse};

async fn open(conn_mgr: &ConnectionManager) -> CliResult<Session> {
    conn_mgr
        .open_session(Arc::new(ConsoleHooks::new()), conn_mgr.settings())
        .await
}

fn emit<T: Serialize>(cli: &Cli, data: T, fallback: OutputFormat) -> CliResult<()> {
    print_output(
        data,
        OutputFormat::resolve(cli.output, fallback),
        cli.query.as_deref(),
    )
    .map_err(|e| CliError::OutputError {
        message: format!("{:#}", e),
    })
}

/// Text output unless a structured format or a query was requested
fn wants_text(cli: &Cli) -> bool {
    matches!(cli.output, cli::OutputFormat::Auto | cli::OutputFormat::Table) && cli.query.is_none()
}

pub async fn tree(cli: &Cli, conn_mgr: &ConnectionManager, expand: bool) -> CliResult<()> {
    let session = open(conn_mgr).await?;
    let branches =
        render::build_tree(session.tree(), expand, cli.subscription.as_deref()).await;
    if branches.is_empty()
        && let Some(name) = &cli.subscription
    {
        return Err(CliError::UnknownSubscription { name: name.clone() });
    }

    if wants_text(cli) {
        print!("{}", render::tree_text(&branches));
        Ok(())
    } else {
        emit(cli, &branches, OutputFormat::Json)
    }
}

pub async fn list(cli: &Cli, conn_mgr: &ConnectionManager) -> CliResult<()> {
    let session = open(conn_mgr).await?;
    let warehouses = session.warehouses(cli.subscription.as_deref()).await?;

    if wants_text(cli) {
        if warehouses.is_empty() {
            println!("No warehouses found");
        } else {
            println!(
                "{}",
                render::warehouse_table(&warehouses, &session.subscriptions())
            );
        }
        Ok(())
    } else {
        emit(cli, &warehouses, OutputFormat::Json)
    }
}

async fn resolve(cli: &Cli, session: &Session, target: &str) -> CliResult<Warehouse> {
    Ok(session
        .find_warehouse(target, cli.subscription.as_deref())
        .await?)
}

/// Handler errors have already been shown by the hooks
fn finish(result: warehousectl_core::Result<Outcome>) -> CliResult<()> {
    match result {
        Ok(Outcome::Completed) | Ok(Outcome::Cancelled) => Ok(()),
        Ok(Outcome::Rejected) => Err(CliError::Reported),
        Err(e) => {
            debug!("Operation failed: {}", e);
            Err(CliError::Reported)
        }
    }
}

pub async fn pause(cli: &Cli, conn_mgr: &ConnectionManager, target: &str) -> CliResult<()> {
    let session = open(conn_mgr).await?;
    let warehouse = resolve(cli, &session, target).await?;
    finish(session.pause(&TreeNode::Warehouse(warehouse)).await)
}

pub async fn resume(cli: &Cli, conn_mgr: &ConnectionManager, target: &str) -> CliResult<()> {
    let session = open(conn_mgr).await?;
    let warehouse = resolve(cli, &session, target).await?;
    finish(session.resume(&TreeNode::Warehouse(warehouse)).await)
}

pub async fn scale(
    cli: &Cli,
    conn_mgr: &ConnectionManager,
    target: &str,
    request: ScaleRequest,
) -> CliResult<()> {
    let session = open(conn_mgr).await?;
    let warehouse = resolve(cli, &session, target).await?;
    finish(session.scale(&TreeNode::Warehouse(warehouse), &request).await)
}

#[derive(Serialize)]
struct LevelRow {
    level: String,
    dwu: Option<u32>,
    current: bool,
}

pub async fn levels(
    cli: &Cli,
    conn_mgr: &ConnectionManager,
    target: &str,
    strategy: Option<ScaleStrategy>,
) -> CliResult<()> {
    let session = open(conn_mgr).await?;
    let warehouse = resolve(cli, &session, target).await?;

    let candidates = match strategy.unwrap_or(session.settings().scale_strategy) {
        ScaleStrategy::Api => {
            let client = session
                .tree()
                .client(&warehouse.subscription_id)
                .ok_or_else(|| CliError::UnknownSubscription {
                    name: warehouse.subscription_id.clone(),
                })?;
            candidate_levels(client, &warehouse).await
        }
        ScaleStrategy::Cli => static_levels(),
    };

    let rows: Vec<LevelRow> = candidates
        .iter()
        .map(|level| LevelRow {
            level: level.name().to_string(),
            dwu: level.dwu(),
            current: warehouse
                .performance_level
                .as_ref()
                .is_some_and(|c| c.name().eq_ignore_ascii_case(level.name())),
        })
        .collect();
    emit(cli, &rows, OutputFormat::Table)
}

#[derive(Serialize)]
struct PortalLink {
    warehouse: String,
    url: String,
}

pub async fn link(cli: &Cli, conn_mgr: &ConnectionManager, target: &str) -> CliResult<()> {
    let session = open(conn_mgr).await?;
    let warehouse = resolve(cli, &session, target).await?;
    let url = warehouse.portal_url(&conn_mgr.config.endpoints.portal);

    if cli.output == cli::OutputFormat::Auto && cli.query.is_none() {
        println!("{}", url);
        Ok(())
    } else {
        emit(
            cli,
            PortalLink {
                warehouse: warehouse.key().to_string(),
                url,
            },
            OutputFormat::Json,
        )
    }
}
