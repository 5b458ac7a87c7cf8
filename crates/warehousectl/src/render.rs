//! Terminal rendering of the warehouse tree and warehouse tables

use colored::Colorize;
use comfy_table::Table;
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use tracing::warn;
use warehousectl_core::tree::{Collapsible, NodeIcon};
use warehousectl_core::{
    ContextTag, StatusClass, Subscription, TreeNode, Warehouse, WarehouseTree,
};

/// A subscription node and, when expanded, its warehouses
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionBranch {
    pub subscription: String,
    pub id: String,
    pub expanded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warehouses: Option<Vec<WarehouseLeaf>>,
    /// Why the warehouses could not be listed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WarehouseLeaf {
    #[serde(flatten)]
    pub warehouse: Warehouse,
    pub context: ContextTag,
    #[serde(skip)]
    pub icon: NodeIcon,
}

fn matches_subscription(sub: &Subscription, wanted: Option<&str>) -> bool {
    wanted.is_none_or(|w| sub.id.eq_ignore_ascii_case(w) || sub.display_name.eq_ignore_ascii_case(w))
}

fn warehouse_leaves(tree: &WarehouseTree, children: Vec<TreeNode>) -> Vec<WarehouseLeaf> {
    children
        .into_iter()
        .filter_map(|child| {
            let display = tree.render(&child);
            match child {
                TreeNode::Warehouse(warehouse) => Some(WarehouseLeaf {
                    warehouse,
                    context: display.context,
                    icon: display.icon,
                }),
                TreeNode::Subscription(_) => None,
            }
        })
        .collect()
}

/// Walk the tree the way a tree view would: children are only loaded for
/// expanded subscriptions. A subscription whose children fail to load keeps
/// its node and carries the error; the other branches are unaffected.
pub async fn build_tree(
    tree: &WarehouseTree,
    expand_all: bool,
    subscription: Option<&str>,
) -> Vec<SubscriptionBranch> {
    let roots: Vec<TreeNode> = tree
        .roots()
        .into_iter()
        .filter(|node| match node {
            TreeNode::Subscription(sub) => matches_subscription(sub, subscription),
            TreeNode::Warehouse(_) => false,
        })
        .collect();

    join_all(roots.iter().map(|root| async move {
        let display = tree.render(root);
        let expanded = expand_all || display.collapsible == Collapsible::Expanded;
        let id = match root {
            TreeNode::Subscription(sub) => sub.id.clone(),
            TreeNode::Warehouse(w) => w.subscription_id.clone(),
        };
        let (warehouses, error) = if expanded {
            match tree.children(root).await {
                Ok(children) => (Some(warehouse_leaves(tree, children)), None),
                Err(e) => {
                    warn!("Could not list warehouses of {}: {}", id, e);
                    (None, Some(e.to_string()))
                }
            }
        } else {
            (None, None)
        };
        SubscriptionBranch {
            subscription: display.label,
            id,
            expanded,
            warehouses,
            error,
        }
    }))
    .await
}

fn status_text(warehouse: &Warehouse) -> String {
    let status = warehouse.status.as_str();
    match warehouse.status.class() {
        StatusClass::Resumed => status.green().to_string(),
        StatusClass::Paused => status.blue().to_string(),
        StatusClass::Pending => status.yellow().to_string(),
    }
}

fn icon_text(leaf: &WarehouseLeaf) -> String {
    match (leaf.icon, leaf.context) {
        (NodeIcon::Spinner, _) => "◌".yellow().to_string(),
        (_, ContextTag::WarehouseResumed) => "●".green().to_string(),
        (_, ContextTag::WarehousePaused) => "○".blue().to_string(),
        _ => "●".yellow().to_string(),
    }
}

fn pad(text: &str, width: usize) -> String {
    format!("{}{}", text, " ".repeat(width.saturating_sub(text.chars().count())))
}

/// Indented text form of the tree
pub fn tree_text(branches: &[SubscriptionBranch]) -> String {
    let leaves = || branches.iter().flat_map(|b| b.warehouses.iter().flatten());
    let name_width = leaves().map(|l| l.warehouse.name.len()).max().unwrap_or(0);
    let status_width = leaves()
        .map(|l| l.warehouse.status.as_str().len())
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    for branch in branches {
        let marker = if branch.expanded { "▾" } else { "▸" };
        out.push_str(&format!(
            "{} {} {}\n",
            marker,
            branch.subscription.bold(),
            format!("({})", branch.id).dimmed()
        ));

        if let Some(error) = &branch.error {
            out.push_str(&format!("    {} {}\n", "✗".red(), error.red()));
        }
        let Some(warehouses) = &branch.warehouses else {
            continue;
        };
        if warehouses.is_empty() {
            out.push_str(&format!("    {}\n", "no warehouses".dimmed()));
        }
        for leaf in warehouses {
            let w = &leaf.warehouse;
            // status is padded before colouring so escape codes do not skew columns
            let status = pad(w.status.as_str(), status_width);
            let status = status.replacen(w.status.as_str(), &status_text(w), 1);
            out.push_str(&format!(
                "  {} {}  {}  {}  {}\n",
                icon_text(leaf),
                pad(&w.name, name_width),
                status,
                pad(
                    w.performance_level.as_ref().map(|l| l.name()).unwrap_or("-"),
                    8
                ),
                format!("{}/{}", w.resource_group, w.server).dimmed()
            ));
        }
    }
    out
}

/// Table of warehouses for `list`
pub fn warehouse_table(warehouses: &[Warehouse], subscriptions: &[Subscription]) -> Table {
    let names: HashMap<&str, &str> = subscriptions
        .iter()
        .map(|s| (s.id.as_str(), s.display_name.as_str()))
        .collect();

    let mut table = Table::new();
    table.set_header(vec![
        "Subscription",
        "Resource Group",
        "Server",
        "Warehouse",
        "Status",
        "Level",
        "Location",
    ]);
    for w in warehouses {
        table.add_row(vec![
            names
                .get(w.subscription_id.as_str())
                .copied()
                .unwrap_or(w.subscription_id.as_str())
                .to_string(),
            w.resource_group.clone(),
            w.server.clone(),
            w.name.clone(),
            w.status.to_string(),
            w.performance_level
                .as_ref()
                .map(|l| l.name().to_string())
                .unwrap_or_else(|| "-".to_string()),
            w.location.clone().unwrap_or_else(|| "-".to_string()),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use warehousectl_core::api::SubscriptionClient;
    use warehousectl_core::testing::{FakeManagementApi, database, server, subscription};
    use warehousectl_core::{PendingStatus, WarehouseKey};

    fn tree(expand: bool) -> WarehouseTree {
        let api = Arc::new(FakeManagementApi::new());
        api.add_server("s1", server("srv", Some("rg1")));
        api.add_database("s1", "rg1", "srv", database("dw1", "DataWarehouse", "Online", "DW100c"));
        api.add_database("s1", "rg1", "srv", database("dw2", "DataWarehouse", "Paused", "DW500c"));
        let clients = vec![
            SubscriptionClient::new(subscription("s1", "Production"), api.clone()),
            SubscriptionClient::new(subscription("s2", "Staging"), api),
        ];
        WarehouseTree::new(clients, expand)
    }

    #[tokio::test]
    async fn test_collapsed_subscriptions_do_not_load_children() {
        let branches = build_tree(&tree(false), false, None).await;
        assert_eq!(branches.len(), 2);
        assert!(branches.iter().all(|b| !b.expanded && b.warehouses.is_none()));
    }

    #[tokio::test]
    async fn test_expanded_tree_carries_context_and_overlay() {
        let tree = tree(true);
        tree.set_pending(WarehouseKey::new("srv", "rg1", "dw2"), PendingStatus::Resuming);

        let branches = build_tree(&tree, false, Some("production")).await;
        assert_eq!(branches.len(), 1);
        let leaves = branches[0].warehouses.as_ref().unwrap();
        assert_eq!(leaves.len(), 2);
        assert_eq!(leaves[0].context, ContextTag::WarehouseResumed);
        assert_eq!(leaves[1].warehouse.status.as_str(), "Resuming");
        assert_eq!(leaves[1].context, ContextTag::WarehousePending);
        assert_eq!(leaves[1].icon, NodeIcon::Spinner);
    }

    #[tokio::test]
    async fn test_tree_text_lists_warehouses_under_subscriptions() {
        colored::control::set_override(false);
        let branches = build_tree(&tree(false), true, None).await;
        let text = tree_text(&branches);
        assert!(text.contains("▾ Production (s1)"));
        assert!(text.contains("dw1"));
        assert!(text.contains("DW500c"));
        assert!(text.contains("rg1/srv"));
        assert!(text.contains("▾ Staging (s2)"));
        assert!(text.contains("no warehouses"));
    }

    #[tokio::test]
    async fn test_failing_subscription_keeps_other_branches() {
        colored::control::set_override(false);
        let api = Arc::new(FakeManagementApi::new());
        api.add_server("s1", server("srv", Some("rg1")));
        api.add_database("s1", "rg1", "srv", database("dw1", "DataWarehouse", "Online", "DW100c"));
        api.fail_subscription("s2", 409, "MissingSubscriptionRegistration");
        let clients = vec![
            SubscriptionClient::new(subscription("s1", "Production"), api.clone()),
            SubscriptionClient::new(subscription("s2", "Staging"), api),
        ];
        let tree = WarehouseTree::new(clients, true);

        let branches = build_tree(&tree, false, None).await;
        assert_eq!(branches.len(), 2);
        assert_eq!(branches[0].warehouses.as_ref().unwrap().len(), 1);
        assert!(branches[0].error.is_none());
        assert!(branches[1].warehouses.is_none());
        assert!(branches[1].error.as_ref().unwrap().contains("MissingSubscriptionRegistration"));

        let text = tree_text(&branches);
        assert!(text.contains("dw1"));
        assert!(text.contains("✗ Subscription 's2' failed with MissingSubscriptionRegistration"));
        assert!(!text.contains("no warehouses"));
    }

    #[test]
    fn test_table_uses_subscription_display_names() {
        let mut w = warehousectl_core::testing::warehouse("dw1", "Paused");
        w.performance_level = Some(warehousectl_core::PerformanceLevel::new("DW200c"));
        let table = warehouse_table(&[w], &[subscription("s1", "Production")]).to_string();
        assert!(table.contains("Production"));
        assert!(table.contains("DW200c"));
        assert!(table.contains("Paused"));
    }
}
