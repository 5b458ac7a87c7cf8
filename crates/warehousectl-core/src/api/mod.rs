//! Management API seam
//!
//! Everything the crate needs from the cloud provider goes through
//! [`ManagementApi`]. [`arm::ArmClient`] implements it against Azure Resource
//! Manager; tests use the in-memory fake from `crate::testing`.

pub mod arm;

use crate::error::Result;
use crate::model::{PerformanceLevel, Subscription, Warehouse};
use crate::progress::ProgressCallback;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use arm::ArmClient;

/// SKU tier of dedicated SQL pools
pub const WAREHOUSE_TIER: &str = "DataWarehouse";

/// A logical SQL server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRecord {
    /// ARM resource id; the resource group is derived from it
    pub id: Option<String>,
    pub name: String,
    pub location: Option<String>,
}

/// A database on a logical SQL server, any tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseRecord {
    pub name: String,
    pub sku_name: Option<String>,
    pub sku_tier: Option<String>,
    pub status: Option<String>,
    pub location: Option<String>,
}

impl DatabaseRecord {
    pub fn is_warehouse(&self) -> bool {
        self.sku_tier.as_deref() == Some(WAREHOUSE_TIER)
    }
}

/// A performance level offered by a server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceObjective {
    pub name: String,
    pub enabled: bool,
}

/// Fully qualified database address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DatabaseRef {
    pub subscription_id: String,
    pub resource_group: String,
    pub server: String,
    pub name: String,
}

impl From<&Warehouse> for DatabaseRef {
    fn from(w: &Warehouse) -> Self {
        Self {
            subscription_id: w.subscription_id.clone(),
            resource_group: w.resource_group.clone(),
            server: w.server.clone(),
            name: w.name.clone(),
        }
    }
}

/// Operations against the cloud provider's management plane.
///
/// The mutating calls return once the long-running operation has finished.
#[async_trait]
pub trait ManagementApi: Send + Sync {
    async fn list_subscriptions(&self) -> Result<Vec<Subscription>>;

    async fn list_servers(&self, subscription_id: &str) -> Result<Vec<ServerRecord>>;

    async fn list_databases(
        &self,
        subscription_id: &str,
        resource_group: &str,
        server: &str,
    ) -> Result<Vec<DatabaseRecord>>;

    async fn pause(&self, db: &DatabaseRef, on_progress: Option<ProgressCallback>) -> Result<()>;

    async fn resume(&self, db: &DatabaseRef, on_progress: Option<ProgressCallback>)
    -> Result<()>;

    async fn update_sku(
        &self,
        db: &DatabaseRef,
        level: &PerformanceLevel,
        on_progress: Option<ProgressCallback>,
    ) -> Result<()>;

    async fn list_service_objectives(
        &self,
        subscription_id: &str,
        resource_group: &str,
        server: &str,
    ) -> Result<Vec<ServiceObjective>>;
}

/// Management API handle bound to one subscription
#[derive(Clone)]
pub struct SubscriptionClient {
    subscription: Subscription,
    api: Arc<dyn ManagementApi>,
}

impl SubscriptionClient {
    pub fn new(subscription: Subscription, api: Arc<dyn ManagementApi>) -> Self {
        Self { subscription, api }
    }

    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    pub fn api(&self) -> &Arc<dyn ManagementApi> {
        &self.api
    }

    pub async fn list_servers(&self) -> Result<Vec<ServerRecord>> {
        self.api.list_servers(&self.subscription.id).await
    }

    pub async fn list_databases(
        &self,
        resource_group: &str,
        server: &str,
    ) -> Result<Vec<DatabaseRecord>> {
        self.api
            .list_databases(&self.subscription.id, resource_group, server)
            .await
    }

    pub async fn list_service_objectives(
        &self,
        resource_group: &str,
        server: &str,
    ) -> Result<Vec<ServiceObjective>> {
        self.api
            .list_service_objectives(&self.subscription.id, resource_group, server)
            .await
    }
}
