//! Two-level warehouse tree with a pending-status overlay
//!
//! Roots are the loaded subscriptions; their children are enumerated live on
//! every expansion. While a pause, resume or scale is in flight the affected
//! warehouse shows the locally asserted status from [`PendingOverlay`] instead
//! of whatever the API last reported.
//!
//! Every visible change bumps a generation counter on a `watch` channel.
//! Renderers hold a receiver and redraw when it changes, so several changes
//! before the next redraw collapse into one.

use crate::api::SubscriptionClient;
use crate::enumerator::enumerate_subscription;
use crate::error::Result;
use crate::model::{PendingStatus, StatusClass, Subscription, Warehouse, WarehouseKey};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::watch;
use tracing::debug;

/// Broadcasts "the tree changed" to any number of renderers
#[derive(Debug)]
pub struct ChangeNotifier {
    tx: watch::Sender<u64>,
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeNotifier {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx }
    }

    pub fn notify(&self) {
        self.tx.send_modify(|generation| *generation = generation.wrapping_add(1));
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }

    pub fn generation(&self) -> u64 {
        *self.tx.borrow()
    }
}

/// Locally asserted statuses keyed by warehouse identity
#[derive(Debug, Default)]
pub struct PendingOverlay {
    entries: Mutex<HashMap<WarehouseKey, PendingStatus>>,
}

impl PendingOverlay {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<WarehouseKey, PendingStatus>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, key: &WarehouseKey) -> Option<PendingStatus> {
        self.lock().get(key).copied()
    }

    pub fn set(&self, key: WarehouseKey, status: PendingStatus) {
        self.lock().insert(key, status);
    }

    pub fn clear(&self, key: &WarehouseKey) -> Option<PendingStatus> {
        self.lock().remove(key)
    }

    /// Remove the entry only while it still holds `status`
    pub fn clear_if(&self, key: &WarehouseKey, status: PendingStatus) -> bool {
        let mut entries = self.lock();
        if entries.get(key) == Some(&status) {
            entries.remove(key);
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// A node of the warehouse tree
#[derive(Debug, Clone, PartialEq)]
pub enum TreeNode {
    Subscription(Subscription),
    Warehouse(Warehouse),
}

/// Tag that decides which actions a node offers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContextTag {
    Subscription,
    WarehouseResumed,
    WarehousePaused,
    WarehousePending,
}

impl ContextTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subscription => "subscription",
            Self::WarehouseResumed => "warehouse-resumed",
            Self::WarehousePaused => "warehouse-paused",
            Self::WarehousePending => "warehouse-pending",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeIcon {
    Subscription,
    Warehouse,
    Spinner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Collapsible {
    None,
    Collapsed,
    Expanded,
}

/// Display attributes of a tree node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeDisplay {
    pub label: String,
    pub description: Option<String>,
    pub tooltip: String,
    pub icon: NodeIcon,
    pub context: ContextTag,
    pub collapsible: Collapsible,
}

/// Display attributes for `node`
pub fn render(node: &TreeNode, expand_subscriptions: bool) -> NodeDisplay {
    match node {
        TreeNode::Subscription(sub) => NodeDisplay {
            label: sub.display_name.clone(),
            description: None,
            tooltip: format!("Subscription: {}\nId: {}", sub.display_name, sub.id),
            icon: NodeIcon::Subscription,
            context: ContextTag::Subscription,
            collapsible: if expand_subscriptions {
                Collapsible::Expanded
            } else {
                Collapsible::Collapsed
            },
        },
        TreeNode::Warehouse(w) => {
            let mut tooltip = format!(
                "Warehouse: {}\nStatus: {}\nServer: {}\nResource Group: {}\nSubscription: {}",
                w.name, w.status, w.server, w.resource_group, w.subscription_id
            );
            if let Some(dwu) = w.performance_level.as_ref().and_then(|l| l.dwu_label()) {
                tooltip.push_str(&format!("\nDWU: {}", dwu));
            }
            let context = match w.status.class() {
                StatusClass::Resumed => ContextTag::WarehouseResumed,
                StatusClass::Paused => ContextTag::WarehousePaused,
                StatusClass::Pending => ContextTag::WarehousePending,
            };
            NodeDisplay {
                label: w.name.clone(),
                description: Some(w.status.to_string()),
                tooltip,
                icon: if w.status.is_transitioning() {
                    NodeIcon::Spinner
                } else {
                    NodeIcon::Warehouse
                },
                context,
                collapsible: Collapsible::None,
            }
        }
    }
}

/// Clears its overlay entry when dropped, unless a later operation on the
/// same warehouse has replaced it
#[must_use = "the pending status is cleared as soon as the guard is dropped"]
pub struct PendingGuard<'a> {
    tree: &'a WarehouseTree,
    key: WarehouseKey,
    status: PendingStatus,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.tree.overlay.clear_if(&self.key, self.status) {
            debug!("Cleared pending status for {}", self.key);
        } else {
            debug!("Pending status for {} was replaced, leaving it", self.key);
        }
        self.tree.notifier.notify();
    }
}

/// Tree of subscriptions and their warehouses
pub struct WarehouseTree {
    clients: Vec<SubscriptionClient>,
    overlay: PendingOverlay,
    notifier: ChangeNotifier,
    expand_subscriptions: bool,
}

impl WarehouseTree {
    pub fn new(clients: Vec<SubscriptionClient>, expand_subscriptions: bool) -> Self {
        Self {
            clients,
            overlay: PendingOverlay::default(),
            notifier: ChangeNotifier::new(),
            expand_subscriptions,
        }
    }

    pub fn clients(&self) -> &[SubscriptionClient] {
        &self.clients
    }

    pub fn client(&self, subscription_id: &str) -> Option<&SubscriptionClient> {
        self.clients
            .iter()
            .find(|c| c.subscription().id == subscription_id)
    }

    pub fn overlay(&self) -> &PendingOverlay {
        &self.overlay
    }

    /// One node per loaded subscription, in load order
    pub fn roots(&self) -> Vec<TreeNode> {
        self.clients
            .iter()
            .map(|c| TreeNode::Subscription(c.subscription().clone()))
            .collect()
    }

    /// Live children of `node`; warehouses are leaves
    pub async fn children(&self, node: &TreeNode) -> Result<Vec<TreeNode>> {
        let TreeNode::Subscription(sub) = node else {
            return Ok(Vec::new());
        };
        let Some(client) = self.client(&sub.id) else {
            debug!("No client for subscription {}", sub.id);
            return Ok(Vec::new());
        };
        let warehouses = enumerate_subscription(client).await?;
        Ok(warehouses
            .into_iter()
            .map(|w| TreeNode::Warehouse(self.apply_overlay(w)))
            .collect())
    }

    pub fn render(&self, node: &TreeNode) -> NodeDisplay {
        render(node, self.expand_subscriptions)
    }

    /// Replace the reported status with the pending one, if any
    pub fn apply_overlay(&self, mut warehouse: Warehouse) -> Warehouse {
        if let Some(pending) = self.overlay.get(&warehouse.key()) {
            warehouse.status = pending.into();
        }
        warehouse
    }

    pub fn set_pending(&self, key: WarehouseKey, status: PendingStatus) {
        debug!("Pending {:?} for {}", status, key);
        self.overlay.set(key, status);
        self.notifier.notify();
    }

    pub fn clear_pending(&self, key: &WarehouseKey) {
        if self.overlay.clear(key).is_some() {
            debug!("Cleared pending status for {}", key);
        }
        self.notifier.notify();
    }

    /// Set a pending status that is cleared when the returned guard drops
    pub fn pending(&self, key: WarehouseKey, status: PendingStatus) -> PendingGuard<'_> {
        self.set_pending(key.clone(), status);
        PendingGuard {
            tree: self,
            key,
            status,
        }
    }

    pub fn refresh(&self) {
        self.notifier.notify();
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.notifier.subscribe()
    }

    pub fn generation(&self) -> u64 {
        self.notifier.generation()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PerformanceLevel, WarehouseStatus};
    use crate::testing::{FakeManagementApi, database, server, subscription, warehouse};
    use std::sync::Arc;

    #[test]
    fn test_context_tag_mapping() {
        let cases = [
            ("Online", ContextTag::WarehouseResumed),
            ("Available", ContextTag::WarehouseResumed),
            ("Resumed", ContextTag::WarehouseResumed),
            ("Paused", ContextTag::WarehousePaused),
            ("Pausing", ContextTag::WarehousePending),
            ("Scaling", ContextTag::WarehousePending),
            ("Restoring", ContextTag::WarehousePending),
        ];
        for (status, expected) in cases {
            let node = TreeNode::Warehouse(warehouse("dw1", status));
            assert_eq!(render(&node, false).context, expected, "status {status}");
        }
    }

    #[test]
    fn test_warehouse_display() {
        let mut w = warehouse("dw1", "Resuming");
        w.performance_level = Some(PerformanceLevel::new("DW500c"));
        let display = render(&TreeNode::Warehouse(w), false);

        assert_eq!(display.label, "dw1");
        assert_eq!(display.description.as_deref(), Some("Resuming"));
        assert_eq!(display.icon, NodeIcon::Spinner);
        assert_eq!(display.collapsible, Collapsible::None);
        assert_eq!(
            display.tooltip,
            "Warehouse: dw1\nStatus: Resuming\nServer: srv\nResource Group: rg1\nSubscription: s1\nDWU: 500c"
        );
    }

    #[test]
    fn test_tooltip_omits_dwu_for_other_skus() {
        let mut w = warehouse("dw1", "Online");
        w.performance_level = Some(PerformanceLevel::new("S0"));
        let display = render(&TreeNode::Warehouse(w), false);
        assert!(!display.tooltip.contains("DWU"));
        assert_eq!(display.icon, NodeIcon::Warehouse);
    }

    #[test]
    fn test_subscription_collapsible_follows_setting() {
        let node = TreeNode::Subscription(subscription("s1", "Sub One"));
        assert_eq!(render(&node, false).collapsible, Collapsible::Collapsed);
        assert_eq!(render(&node, true).collapsible, Collapsible::Expanded);
        assert_eq!(render(&node, true).context.as_str(), "subscription");
    }

    #[test]
    fn test_overlay_mutation_notifies() {
        let tree = WarehouseTree::new(Vec::new(), false);
        let rx = tree.subscribe();
        let key = WarehouseKey::new("srv", "rg1", "dw1");

        tree.set_pending(key.clone(), PendingStatus::Pausing);
        assert!(rx.has_changed().unwrap());
        assert_eq!(tree.overlay().get(&key), Some(PendingStatus::Pausing));

        let before = tree.generation();
        tree.clear_pending(&key);
        assert!(tree.generation() > before);
        assert!(tree.overlay().is_empty());
    }

    #[test]
    fn test_pending_guard_clears_on_drop() {
        let tree = WarehouseTree::new(Vec::new(), false);
        let key = WarehouseKey::new("srv", "rg1", "dw1");
        {
            let _guard = tree.pending(key.clone(), PendingStatus::Resuming);
            assert_eq!(tree.overlay().len(), 1);
        }
        assert!(tree.overlay().get(&key).is_none());
    }

    #[test]
    fn test_stale_guard_leaves_newer_status() {
        let tree = WarehouseTree::new(Vec::new(), false);
        let key = WarehouseKey::new("srv", "rg1", "dw1");

        let pausing = tree.pending(key.clone(), PendingStatus::Pausing);
        let resuming = tree.pending(key.clone(), PendingStatus::Resuming);
        drop(pausing);
        assert_eq!(tree.overlay().get(&key), Some(PendingStatus::Resuming));

        drop(resuming);
        assert!(tree.overlay().is_empty());
    }

    #[tokio::test]
    async fn test_children_apply_overlay() {
        let api = FakeManagementApi::new();
        api.add_subscription(subscription("s1", "Sub One"));
        api.add_server("s1", server("srv", Some("rg1")));
        api.add_database("s1", "rg1", "srv", database("dw1", "DataWarehouse", "Paused", "DW100c"));
        let client = SubscriptionClient::new(subscription("s1", "Sub One"), Arc::new(api));
        let tree = WarehouseTree::new(vec![client], false);

        let roots = tree.roots();
        assert_eq!(roots.len(), 1);

        let _guard = tree.pending(WarehouseKey::new("srv", "rg1", "dw1"), PendingStatus::Resuming);
        let children = tree.children(&roots[0]).await.unwrap();
        match &children[..] {
            [TreeNode::Warehouse(w)] => assert_eq!(w.status, WarehouseStatus::Resuming),
            other => panic!("unexpected children: {other:?}"),
        }
        assert!(tree.children(&children[0]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_children_of_unknown_subscription_is_empty() {
        let tree = WarehouseTree::new(Vec::new(), false);
        let node = TreeNode::Subscription(subscription("missing", "Missing"));
        assert!(tree.children(&node).await.unwrap().is_empty());
    }
}
