//! Periodic change detection
//!
//! Each tick re-enumerates every warehouse, compares the statuses with the
//! previous tick and fires one tree refresh when anything differs.

use crate::enumerator::enumerate_all;
use crate::error::Result;
use crate::model::{Warehouse, WarehouseKey, WarehouseStatus};
use crate::tree::WarehouseTree;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Last observed remote status per warehouse
pub type StateSnapshot = HashMap<WarehouseKey, WarehouseStatus>;

pub fn snapshot_of(warehouses: &[Warehouse]) -> StateSnapshot {
    warehouses
        .iter()
        .map(|w| (w.key(), w.status.clone()))
        .collect()
}

/// True when a key was added or removed or any status differs
pub fn snapshot_changed(previous: &StateSnapshot, current: &StateSnapshot) -> bool {
    previous.len() != current.len()
        || current
            .iter()
            .any(|(key, status)| previous.get(key) != Some(status))
}

pub struct Poller {
    tree: Arc<WarehouseTree>,
    last: Mutex<StateSnapshot>,
}

impl Poller {
    pub fn new(tree: Arc<WarehouseTree>) -> Self {
        Self {
            tree,
            last: Mutex::new(StateSnapshot::new()),
        }
    }

    /// Run one poll cycle and report whether a refresh was fired.
    ///
    /// On error the stored snapshot is left as it was.
    pub async fn tick(&self) -> Result<bool> {
        let warehouses = enumerate_all(self.tree.clients()).await?;
        let current = snapshot_of(&warehouses);

        let changed = {
            let mut last = self.last.lock().unwrap_or_else(|p| p.into_inner());
            let changed = snapshot_changed(&last, &current);
            *last = current;
            changed
        };

        if changed {
            debug!("Warehouse state changed, refreshing");
            self.tree.refresh();
        }
        Ok(changed)
    }

    pub fn snapshot(&self) -> StateSnapshot {
        self.last.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Tick every `period` until `shutdown` flips to true or its sender is dropped
    pub async fn run(self: Arc<Self>, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Polling warehouse state every {:?}", period);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        warn!("Warehouse poll failed: {}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("Poller stopped");
                        return;
                    }
                }
            }
        }
    }
}
