//! Session lifecycle
//!
//! A [`Session`] is created by [`Session::activate`], which loads the
//! subscriptions once and builds one scoped client per subscription. It owns
//! the tree, the poller and the presentation hooks. Polling runs only between
//! [`Session::start_polling`] and [`Session::stop`]; dropping the session
//! aborts the loop as well.

use crate::api::{ManagementApi, SubscriptionClient};
use crate::config::{Config, ScaleStrategy};
use crate::enumerator::enumerate_each;
use crate::error::{CoreError, Result};
use crate::hooks::OperatorHooks;
use crate::model::{Subscription, Warehouse};
use crate::operations::{self, Outcome, ScaleRequest};
use crate::poller::Poller;
use crate::runner::CommandRunner;
use crate::scale::CliScaler;
use crate::tree::{TreeNode, WarehouseTree};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Runtime settings taken from the configuration file
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub expand_subscriptions: bool,
    pub poll_interval: Duration,
    pub scale_strategy: ScaleStrategy,
    pub az: String,
    pub pwsh: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            expand_subscriptions: config.expand_subscriptions,
            poll_interval: config.poll_interval(),
            scale_strategy: config.scale_strategy,
            az: config.tools.az.clone(),
            pwsh: config.tools.pwsh.clone(),
        }
    }
}

struct PollingTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct Session {
    tree: Arc<WarehouseTree>,
    poller: Arc<Poller>,
    hooks: Arc<dyn OperatorHooks>,
    scaler: CliScaler,
    settings: SessionSettings,
    polling: Mutex<Option<PollingTask>>,
}

impl Session {
    /// Load subscriptions and build the per-subscription clients.
    ///
    /// Fails with [`CoreError::NoSubscriptions`] when the identity sees none.
    pub async fn activate(
        api: Arc<dyn ManagementApi>,
        hooks: Arc<dyn OperatorHooks>,
        runner: Arc<dyn CommandRunner>,
        settings: SessionSettings,
    ) -> Result<Self> {
        let subscriptions = api.list_subscriptions().await?;
        if subscriptions.is_empty() {
            return Err(CoreError::NoSubscriptions);
        }
        info!("Loaded {} subscription(s)", subscriptions.len());

        let clients = subscriptions
            .into_iter()
            .map(|s| SubscriptionClient::new(s, api.clone()))
            .collect();
        let tree = Arc::new(WarehouseTree::new(clients, settings.expand_subscriptions));
        let poller = Arc::new(Poller::new(tree.clone()));
        let scaler = CliScaler::new(runner, &settings.az, &settings.pwsh);

        Ok(Self {
            tree,
            poller,
            hooks,
            scaler,
            settings,
            polling: Mutex::new(None),
        })
    }

    pub fn tree(&self) -> &Arc<WarehouseTree> {
        &self.tree
    }

    pub fn poller(&self) -> &Arc<Poller> {
        &self.poller
    }

    pub fn hooks(&self) -> &dyn OperatorHooks {
        self.hooks.as_ref()
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub(crate) fn cli_scaler(&self) -> &CliScaler {
        &self.scaler
    }

    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.tree
            .clients()
            .iter()
            .map(|c| c.subscription().clone())
            .collect()
    }

    /// Start the poll loop; a second call while running does nothing
    pub fn start_polling(&self) {
        let mut polling = self.polling.lock().unwrap_or_else(|p| p.into_inner());
        if polling.is_some() {
            debug!("Polling already running");
            return;
        }
        let (shutdown, rx) = watch::channel(false);
        let handle = tokio::spawn(self.poller.clone().run(self.settings.poll_interval, rx));
        *polling = Some(PollingTask { shutdown, handle });
    }

    pub fn is_polling(&self) -> bool {
        self.polling
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .is_some()
    }

    /// Stop the poll loop and wait for it to exit
    pub async fn stop(&self) {
        let task = self
            .polling
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(task) = task {
            let _ = task.shutdown.send(true);
            if let Err(e) = task.handle.await {
                debug!("Poll task ended abnormally: {}", e);
            }
        }
    }

    fn clients_for(&self, subscription: Option<&str>) -> Result<Vec<SubscriptionClient>> {
        let clients = self.tree.clients();
        match subscription {
            None => Ok(clients.to_vec()),
            Some(wanted) => {
                let matched: Vec<_> = clients
                    .iter()
                    .filter(|c| {
                        let sub = c.subscription();
                        sub.id.eq_ignore_ascii_case(wanted)
                            || sub.display_name.eq_ignore_ascii_case(wanted)
                    })
                    .cloned()
                    .collect();
                if matched.is_empty() {
                    Err(CoreError::UnknownSubscription(wanted.to_string()))
                } else {
                    Ok(matched)
                }
            }
        }
    }

    /// Current warehouses with pending statuses applied.
    ///
    /// A subscription that cannot be listed is skipped with a warning; the
    /// call only fails when every subscription in scope fails.
    pub async fn warehouses(&self, subscription: Option<&str>) -> Result<Vec<Warehouse>> {
        let clients = self.clients_for(subscription)?;
        let mut warehouses = Vec::new();
        let mut listed = 0;
        let mut first_error = None;

        for (sub, result) in enumerate_each(&clients).await {
            match result {
                Ok(found) => {
                    listed += 1;
                    warehouses.extend(found);
                }
                Err(e) => {
                    warn!("Skipping subscription {}: {}", sub.id, e);
                    self.hooks
                        .warn(&format!("Skipping subscription {}: {}", sub.display_name, e));
                    first_error.get_or_insert(e);
                }
            }
        }

        if listed == 0
            && let Some(e) = first_error
        {
            return Err(e);
        }
        Ok(warehouses
            .into_iter()
            .map(|w| self.tree.apply_overlay(w))
            .collect())
    }

    /// Resolve `server/name` or `resourceGroup/server/name`
    pub async fn find_warehouse(
        &self,
        target: &str,
        subscription: Option<&str>,
    ) -> Result<Warehouse> {
        let parts: Vec<&str> = target.split('/').collect();
        let (resource_group, server, name) = match parts.as_slice() {
            [server, name] if !server.is_empty() && !name.is_empty() => (None, *server, *name),
            [rg, server, name] if !rg.is_empty() && !server.is_empty() && !name.is_empty() => {
                (Some(*rg), *server, *name)
            }
            _ => {
                return Err(CoreError::Validation(format!(
                    "Invalid warehouse '{}'. Use server/name or resource-group/server/name",
                    target
                )));
            }
        };

        let mut matches: Vec<Warehouse> = self
            .warehouses(subscription)
            .await?
            .into_iter()
            .filter(|w| {
                w.server.eq_ignore_ascii_case(server)
                    && w.name.eq_ignore_ascii_case(name)
                    && resource_group.is_none_or(|rg| w.resource_group.eq_ignore_ascii_case(rg))
            })
            .collect();

        match matches.len() {
            0 => Err(CoreError::WarehouseNotFound(target.to_string())),
            1 => Ok(matches.remove(0)),
            _ => Err(CoreError::AmbiguousWarehouse {
                target: target.to_string(),
                candidates: matches
                    .iter()
                    .map(|w| format!("{} ({})", w.key(), w.subscription_id))
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        }
    }

    pub async fn pause(&self, node: &TreeNode) -> Result<Outcome> {
        operations::pause(self, node).await
    }

    pub async fn resume(&self, node: &TreeNode) -> Result<Outcome> {
        operations::resume(self, node).await
    }

    pub async fn scale(&self, node: &TreeNode, request: &ScaleRequest) -> Result<Outcome> {
        operations::scale(self, node, request).await
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(task) = self
            .polling
            .get_mut()
            .unwrap_or_else(|p| p.into_inner())
            .take()
        {
            task.handle.abort();
        }
    }
}
