//! Pause, resume and scale handlers
//!
//! Every handler follows the same shape: check the node, find the
//! subscription's client, mark the warehouse pending, run the long-running
//! operation, then drop the pending mark and refresh. Failures are reported
//! through the session's hooks and returned; nothing is retried.

use crate::api::{DatabaseRef, SubscriptionClient};
use crate::config::ScaleStrategy;
use crate::error::{CoreError, Result};
use crate::model::{PendingStatus, PerformanceLevel, Warehouse};
use crate::scale::{candidate_levels, is_scale_down, resolve_level, static_levels};
use crate::session::Session;
use crate::tree::TreeNode;
use std::future::Future;
use tracing::{debug, info};

/// How a handler ended when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The remote operation finished
    Completed,
    /// The operator declined a prompt
    Cancelled,
    /// A precondition did not hold; nothing was sent
    Rejected,
}

/// Parameters of a scale request
#[derive(Debug, Clone, Default)]
pub struct ScaleRequest {
    /// Target level; the operator is asked to pick one when absent
    pub level: Option<String>,
    /// Overrides the session's configured strategy
    pub strategy: Option<ScaleStrategy>,
    /// Skip the confirmation prompt
    pub assume_yes: bool,
}

fn warehouse_of<'a>(session: &Session, node: &'a TreeNode) -> Result<&'a Warehouse> {
    match node {
        TreeNode::Warehouse(w) => Ok(w),
        TreeNode::Subscription(sub) => {
            let err = CoreError::NotAWarehouse(sub.display_name.clone());
            session.hooks().error(&err.to_string());
            Err(err)
        }
    }
}

fn client_for<'s>(session: &'s Session, warehouse: &Warehouse) -> Result<&'s SubscriptionClient> {
    session
        .tree()
        .client(&warehouse.subscription_id)
        .ok_or_else(|| {
            session
                .hooks()
                .error("Could not find SQL client for this subscription");
            CoreError::UnknownSubscription(warehouse.subscription_id.clone())
        })
}

/// Run `operation` with `pending` shown for the warehouse, then report
async fn run_pending<F>(
    session: &Session,
    warehouse: &Warehouse,
    pending: PendingStatus,
    verb: &str,
    success: String,
    operation: F,
) -> Result<Outcome>
where
    F: Future<Output = Result<()>>,
{
    let hooks = session.hooks();
    let tree = session.tree();
    let label = format!("{} {}", verb, warehouse.name);

    hooks.on_operation_start(&label);
    let result = {
        let _pending = tree.pending(warehouse.key(), pending);
        operation.await
    };
    tree.refresh();

    match result {
        Ok(()) => {
            info!("{}", success);
            hooks.on_operation_complete(&label);
            hooks.info(&success);
            Ok(Outcome::Completed)
        }
        Err(e) => {
            let message = format!("Failed to {} {}: {}", verb, warehouse.name, e);
            hooks.on_operation_failed(&label, &e.to_string());
            hooks.error(&message);
            if e.is_conflict() {
                hooks.warn(&format!(
                    "Another operation may still be running on {}; wait for it before retrying",
                    warehouse.name
                ));
            }
            Err(e)
        }
    }
}

pub async fn pause(session: &Session, node: &TreeNode) -> Result<Outcome> {
    let warehouse = warehouse_of(session, node)?;
    let client = client_for(session, warehouse)?;
    let db = DatabaseRef::from(warehouse);
    let progress = session.hooks().progress(&format!("pause {}", warehouse.name));

    run_pending(
        session,
        warehouse,
        PendingStatus::Pausing,
        "pause",
        format!("Paused {}", warehouse.name),
        client.api().pause(&db, progress),
    )
    .await
}

pub async fn resume(session: &Session, node: &TreeNode) -> Result<Outcome> {
    let warehouse = warehouse_of(session, node)?;
    let client = client_for(session, warehouse)?;
    let db = DatabaseRef::from(warehouse);
    let progress = session
        .hooks()
        .progress(&format!("resume {}", warehouse.name));

    run_pending(
        session,
        warehouse,
        PendingStatus::Resuming,
        "resume",
        format!("Resumed {}", warehouse.name),
        client.api().resume(&db, progress),
    )
    .await
}

fn pick_prompt(warehouse: &Warehouse) -> String {
    match &warehouse.performance_level {
        Some(level) => format!(
            "Select a performance level for {} (current: {})",
            warehouse.name, level
        ),
        None => format!("Select a performance level for {}", warehouse.name),
    }
}

fn confirm_prompt(warehouse: &Warehouse, level: &PerformanceLevel) -> String {
    let current = warehouse.performance_level.as_ref();
    if is_scale_down(current, level) {
        format!(
            "Scale {} DOWN from {} to {}? Active connections will be dropped, running queries cancelled, and capacity reduced.",
            warehouse.name,
            current.map(PerformanceLevel::name).unwrap_or("unknown"),
            level
        )
    } else {
        format!(
            "Scale {} to {}? Active connections will be dropped while the warehouse scales.",
            warehouse.name, level
        )
    }
}

pub async fn scale(session: &Session, node: &TreeNode, request: &ScaleRequest) -> Result<Outcome> {
    let hooks = session.hooks();
    let warehouse = session.tree().apply_overlay(warehouse_of(session, node)?.clone());

    if !warehouse.status.is_online() {
        hooks.warn(&format!(
            "{} must be online to scale (current status: {})",
            warehouse.name, warehouse.status
        ));
        return Ok(Outcome::Rejected);
    }

    let client = client_for(session, &warehouse)?;
    let strategy = request
        .strategy
        .unwrap_or(session.settings().scale_strategy);
    let candidates = match strategy {
        ScaleStrategy::Api => candidate_levels(client, &warehouse).await,
        ScaleStrategy::Cli => static_levels(),
    };

    let level = match &request.level {
        Some(requested) => match resolve_level(&candidates, requested) {
            Ok(level) => level,
            Err(e) => {
                hooks.error(&e.to_string());
                return Err(e);
            }
        },
        None => {
            let names: Vec<String> = candidates.iter().map(|l| l.name().to_string()).collect();
            match hooks.pick(&pick_prompt(&warehouse), &names).await {
                Some(index) if index < candidates.len() => candidates[index].clone(),
                _ => {
                    debug!("Scale of {} cancelled at level selection", warehouse.name);
                    return Ok(Outcome::Cancelled);
                }
            }
        }
    };

    if warehouse
        .performance_level
        .as_ref()
        .is_some_and(|current| current.name().eq_ignore_ascii_case(level.name()))
    {
        hooks.warn(&format!("{} is already at {}", warehouse.name, level));
        return Ok(Outcome::Rejected);
    }

    if !request.assume_yes && !hooks.confirm(&confirm_prompt(&warehouse, &level)).await {
        debug!("Scale of {} declined", warehouse.name);
        return Ok(Outcome::Cancelled);
    }

    let success = format!("Scaled {} to {}", warehouse.name, level);
    match strategy {
        ScaleStrategy::Api => {
            let db = DatabaseRef::from(&warehouse);
            let progress = hooks.progress(&format!("scale {}", warehouse.name));
            run_pending(
                session,
                &warehouse,
                PendingStatus::Scaling,
                "scale",
                success,
                client.api().update_sku(&db, &level, progress),
            )
            .await
        }
        ScaleStrategy::Cli => {
            run_pending(
                session,
                &warehouse,
                PendingStatus::Scaling,
                "scale",
                success,
                session.cli_scaler().scale(&warehouse, &level),
            )
            .await
        }
    }
}
