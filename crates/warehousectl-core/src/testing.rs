//! Test doubles and fixtures
//!
//! Available to this crate's tests and, with the `test-support` feature, to
//! downstream crates.

use crate::api::{DatabaseRecord, DatabaseRef, ManagementApi, ServerRecord, ServiceObjective};
use crate::error::{CoreError, Result};
use crate::hooks::OperatorHooks;
use crate::model::{PerformanceLevel, Subscription, Warehouse, WarehouseStatus};
use crate::progress::ProgressCallback;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::{Notify, watch};

pub fn subscription(id: &str, display_name: &str) -> Subscription {
    Subscription {
        id: id.to_string(),
        display_name: display_name.to_string(),
    }
}

/// Server record; `None` produces an id without a resource group segment
pub fn server(name: &str, resource_group: Option<&str>) -> ServerRecord {
    let id = match resource_group {
        Some(rg) => format!(
            "/subscriptions/00000000/resourceGroups/{}/providers/Microsoft.Sql/servers/{}",
            rg, name
        ),
        None => format!("/subscriptions/00000000/providers/Microsoft.Sql/servers/{}", name),
    };
    ServerRecord {
        id: Some(id),
        name: name.to_string(),
        location: Some("westeurope".to_string()),
    }
}

pub fn database(name: &str, tier: &str, status: &str, sku: &str) -> DatabaseRecord {
    DatabaseRecord {
        name: name.to_string(),
        sku_name: Some(sku.to_string()),
        sku_tier: Some(tier.to_string()),
        status: Some(status.to_string()),
        location: Some("westeurope".to_string()),
    }
}

/// Warehouse `srv`/`rg1` in subscription `s1`
pub fn warehouse(name: &str, status: &str) -> Warehouse {
    Warehouse {
        name: name.to_string(),
        server: "srv".to_string(),
        resource_group: "rg1".to_string(),
        subscription_id: "s1".to_string(),
        status: WarehouseStatus::parse(status),
        performance_level: None,
        location: None,
    }
}

/// A mutating call received by [`FakeManagementApi`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Pause(String),
    Resume(String),
    UpdateSku(String, String),
}

type DatabaseKey = (String, String, String);

#[derive(Default)]
struct FakeState {
    subscriptions: Vec<Subscription>,
    servers: HashMap<String, Vec<ServerRecord>>,
    databases: HashMap<DatabaseKey, Vec<DatabaseRecord>>,
    objectives: HashMap<String, Vec<ServiceObjective>>,
    listing_error: Option<String>,
    subscription_errors: HashMap<String, (u16, String)>,
    mutation_error: Option<String>,
    mutations: Vec<Call>,
    gate: Option<watch::Receiver<bool>>,
}

/// Keeps mutating calls waiting until released
pub struct OperationGate {
    tx: watch::Sender<bool>,
}

impl OperationGate {
    pub fn release(&self) {
        let _ = self.tx.send(true);
    }
}

/// In-memory [`ManagementApi`].
///
/// Mutations succeed by default and update the stored records the way the
/// service eventually would.
#[derive(Default)]
pub struct FakeManagementApi {
    state: Mutex<FakeState>,
    called: Notify,
}

impl FakeManagementApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn add_subscription(&self, subscription: Subscription) {
        self.state().subscriptions.push(subscription);
    }

    pub fn add_server(&self, subscription_id: &str, server: ServerRecord) {
        self.state()
            .servers
            .entry(subscription_id.to_string())
            .or_default()
            .push(server);
    }

    pub fn add_database(
        &self,
        subscription_id: &str,
        resource_group: &str,
        server: &str,
        database: DatabaseRecord,
    ) {
        self.state()
            .databases
            .entry((
                subscription_id.to_string(),
                resource_group.to_string(),
                server.to_string(),
            ))
            .or_default()
            .push(database);
    }

    /// Change the status of every database with this server, group and name
    pub fn set_status(&self, server: &str, resource_group: &str, name: &str, status: &str) {
        let mut state = self.state();
        for ((_, rg, srv), dbs) in state.databases.iter_mut() {
            if rg == resource_group && srv == server {
                for db in dbs.iter_mut().filter(|d| d.name == name) {
                    db.status = Some(status.to_string());
                }
            }
        }
    }

    pub fn set_service_objectives(&self, server: &str, names: &[&str]) {
        self.state().objectives.insert(
            server.to_string(),
            names
                .iter()
                .map(|n| ServiceObjective {
                    name: n.to_string(),
                    enabled: true,
                })
                .collect(),
        );
    }

    /// Make every listing call fail with `message`
    pub fn fail_listing(&self, message: &str) {
        self.state().listing_error = Some(message.to_string());
    }

    /// Make listings under one subscription fail with `status` and `code`
    pub fn fail_subscription(&self, subscription_id: &str, status: u16, code: &str) {
        self.state()
            .subscription_errors
            .insert(subscription_id.to_string(), (status, code.to_string()));
    }

    /// Make every mutating call fail with `message`
    pub fn fail_mutations(&self, message: &str) {
        self.state().mutation_error = Some(message.to_string());
    }

    /// Hold mutating calls until the returned gate is released
    pub fn hold_operations(&self) -> OperationGate {
        let (tx, rx) = watch::channel(false);
        self.state().gate = Some(rx);
        OperationGate { tx }
    }

    pub fn mutations(&self) -> Vec<Call> {
        self.state().mutations.clone()
    }

    /// Wait until `call` has been received
    pub async fn wait_for_call(&self, call: &Call) {
        loop {
            let notified = self.called.notified();
            if self.state().mutations.contains(call) {
                return;
            }
            notified.await;
        }
    }

    fn check_listing(&self) -> Result<()> {
        match &self.state().listing_error {
            Some(message) => Err(CoreError::Api {
                status: 503,
                code: Some("ServiceUnavailable".to_string()),
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }

    fn check_subscription(&self, subscription_id: &str) -> Result<()> {
        self.check_listing()?;
        match self.state().subscription_errors.get(subscription_id) {
            Some((status, code)) => Err(CoreError::Api {
                status: *status,
                code: Some(code.clone()),
                message: format!("Subscription '{}' failed with {}", subscription_id, code),
            }),
            None => Ok(()),
        }
    }

    async fn mutate(&self, call: Call, db: &DatabaseRef) -> Result<()> {
        let gate = {
            let mut state = self.state();
            state.mutations.push(call.clone());
            state.gate.clone()
        };
        self.called.notify_waiters();

        if let Some(mut gate) = gate {
            let _ = gate.wait_for(|open| *open).await;
        }

        let mut state = self.state();
        if let Some(message) = &state.mutation_error {
            return Err(CoreError::Api {
                status: 409,
                code: Some("Conflict".to_string()),
                message: message.clone(),
            });
        }
        let key = (
            db.subscription_id.clone(),
            db.resource_group.clone(),
            db.server.clone(),
        );
        let record = state
            .databases
            .get_mut(&key)
            .and_then(|dbs| dbs.iter_mut().find(|d| d.name == db.name))
            .ok_or_else(|| CoreError::WarehouseNotFound(db.name.clone()))?;
        match call {
            Call::Pause(_) => record.status = Some("Paused".to_string()),
            Call::Resume(_) => record.status = Some("Online".to_string()),
            Call::UpdateSku(_, level) => record.sku_name = Some(level),
        }
        Ok(())
    }
}

#[async_trait]
impl ManagementApi for FakeManagementApi {
    async fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        self.check_listing()?;
        Ok(self.state().subscriptions.clone())
    }

    async fn list_servers(&self, subscription_id: &str) -> Result<Vec<ServerRecord>> {
        self.check_subscription(subscription_id)?;
        Ok(self
            .state()
            .servers
            .get(subscription_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_databases(
        &self,
        subscription_id: &str,
        resource_group: &str,
        server: &str,
    ) -> Result<Vec<DatabaseRecord>> {
        self.check_subscription(subscription_id)?;
        let key = (
            subscription_id.to_string(),
            resource_group.to_string(),
            server.to_string(),
        );
        Ok(self.state().databases.get(&key).cloned().unwrap_or_default())
    }

    async fn pause(&self, db: &DatabaseRef, _on_progress: Option<ProgressCallback>) -> Result<()> {
        self.mutate(Call::Pause(db.name.clone()), db).await
    }

    async fn resume(
        &self,
        db: &DatabaseRef,
        _on_progress: Option<ProgressCallback>,
    ) -> Result<()> {
        self.mutate(Call::Resume(db.name.clone()), db).await
    }

    async fn update_sku(
        &self,
        db: &DatabaseRef,
        level: &PerformanceLevel,
        _on_progress: Option<ProgressCallback>,
    ) -> Result<()> {
        self.mutate(
            Call::UpdateSku(db.name.clone(), level.name().to_string()),
            db,
        )
        .await
    }

    async fn list_service_objectives(
        &self,
        _subscription_id: &str,
        _resource_group: &str,
        server: &str,
    ) -> Result<Vec<ServiceObjective>> {
        Ok(self
            .state()
            .objectives
            .get(server)
            .cloned()
            .unwrap_or_default())
    }
}

/// A call received by [`RecordingHooks`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookEvent {
    Info(String),
    Warn(String),
    Error(String),
    Confirm(String),
    Pick(String, Vec<String>),
    Started(String),
    Completed(String),
    Failed(String, String),
}

/// Hooks that record every call and answer prompts from canned values
pub struct RecordingHooks {
    events: Mutex<Vec<HookEvent>>,
    confirm: bool,
    pick: Option<usize>,
}

impl Default for RecordingHooks {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingHooks {
    /// Confirms every prompt and cancels every pick
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            confirm: true,
            pick: None,
        }
    }

    pub fn with_confirm(mut self, answer: bool) -> Self {
        self.confirm = answer;
        self
    }

    pub fn with_pick(mut self, answer: Option<usize>) -> Self {
        self.pick = answer;
        self
    }

    pub fn events(&self) -> Vec<HookEvent> {
        self.events.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn record(&self, event: HookEvent) {
        self.events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(event);
    }
}

#[async_trait]
impl OperatorHooks for RecordingHooks {
    fn info(&self, message: &str) {
        self.record(HookEvent::Info(message.to_string()));
    }

    fn warn(&self, message: &str) {
        self.record(HookEvent::Warn(message.to_string()));
    }

    fn error(&self, message: &str) {
        self.record(HookEvent::Error(message.to_string()));
    }

    async fn confirm(&self, prompt: &str) -> bool {
        self.record(HookEvent::Confirm(prompt.to_string()));
        self.confirm
    }

    async fn pick(&self, prompt: &str, items: &[String]) -> Option<usize> {
        self.record(HookEvent::Pick(prompt.to_string(), items.to_vec()));
        self.pick
    }

    fn on_operation_start(&self, operation: &str) {
        self.record(HookEvent::Started(operation.to_string()));
    }

    fn on_operation_complete(&self, operation: &str) {
        self.record(HookEvent::Completed(operation.to_string()));
    }

    fn on_operation_failed(&self, operation: &str, error: &str) {
        self.record(HookEvent::Failed(operation.to_string(), error.to_string()));
    }
}
