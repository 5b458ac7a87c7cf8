//! Subscription → server → warehouse enumeration

use crate::api::{DatabaseRecord, ServerRecord, SubscriptionClient};
use crate::error::Result;
use crate::model::{PerformanceLevel, Subscription, Warehouse, WarehouseStatus};
use futures::future::{join_all, try_join_all};
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

static RESOURCE_GROUP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)resourceGroups/([^/]+)").expect("resource group pattern is valid")
});

/// Resource group segment of an ARM resource id
pub fn resource_group_from_id(id: &str) -> Option<String> {
    RESOURCE_GROUP
        .captures(id)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn to_warehouse(
    db: DatabaseRecord,
    server: &str,
    resource_group: &str,
    subscription_id: &str,
) -> Warehouse {
    Warehouse {
        status: WarehouseStatus::parse(db.status.as_deref().unwrap_or_default()),
        performance_level: db.sku_name.map(PerformanceLevel::new),
        location: db.location,
        name: db.name,
        server: server.to_string(),
        resource_group: resource_group.to_string(),
        subscription_id: subscription_id.to_string(),
    }
}

async fn enumerate_server(
    client: &SubscriptionClient,
    server: ServerRecord,
) -> Result<Vec<Warehouse>> {
    let Some(resource_group) = server.id.as_deref().and_then(resource_group_from_id) else {
        debug!(
            "Skipping server '{}': no resource group in id {:?}",
            server.name, server.id
        );
        return Ok(Vec::new());
    };

    let databases = client.list_databases(&resource_group, &server.name).await?;
    let subscription_id = &client.subscription().id;
    Ok(databases
        .into_iter()
        .filter(DatabaseRecord::is_warehouse)
        .map(|db| to_warehouse(db, &server.name, &resource_group, subscription_id))
        .collect())
}

/// Warehouses of one subscription, in API order
pub async fn enumerate_subscription(client: &SubscriptionClient) -> Result<Vec<Warehouse>> {
    let servers = client.list_servers().await?;
    debug!(
        "Subscription {} has {} server(s)",
        client.subscription().id,
        servers.len()
    );
    let per_server = try_join_all(servers.into_iter().map(|s| enumerate_server(client, s))).await?;
    Ok(per_server.into_iter().flatten().collect())
}

/// Warehouses of every subscription, flattened in subscription order.
///
/// Fails as a whole when any subscription fails; see [`enumerate_each`] for
/// per-subscription results.
pub async fn enumerate_all(clients: &[SubscriptionClient]) -> Result<Vec<Warehouse>> {
    let per_sub = try_join_all(clients.iter().map(|c| enumerate_subscription(c))).await?;
    Ok(per_sub.into_iter().flatten().collect())
}

/// Warehouses of every subscription with one result per subscription, in
/// subscription order
pub async fn enumerate_each(
    clients: &[SubscriptionClient],
) -> Vec<(Subscription, Result<Vec<Warehouse>>)> {
    join_all(clients.iter().map(|c| async move {
        (c.subscription().clone(), enumerate_subscription(c).await)
    }))
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeManagementApi, database, server, subscription};
    use std::sync::Arc;

    #[test]
    fn test_resource_group_extraction() {
        assert_eq!(
            resource_group_from_id(
                "/subscriptions/s1/resourceGroups/rg1/providers/Microsoft.Sql/servers/srv"
            ),
            Some("rg1".to_string())
        );
        assert_eq!(
            resource_group_from_id("/subscriptions/s1/resourcegroups/RG-Two/providers/x"),
            Some("RG-Two".to_string())
        );
        assert_eq!(
            resource_group_from_id("resourceGroups/rg1/providers/Microsoft.Sql/servers/srv"),
            Some("rg1".to_string())
        );
        assert_eq!(
            resource_group_from_id("/subscriptions/s1/providers/Microsoft.Sql/servers/srv"),
            None
        );
    }

    #[tokio::test]
    async fn test_server_with_relative_id_is_enumerated() {
        let api = FakeManagementApi::new();
        let mut srv = server("srv", None);
        srv.id = Some("resourceGroups/rg1/providers/Microsoft.Sql/servers/srv".to_string());
        api.add_server("s1", srv);
        api.add_database("s1", "rg1", "srv", database("dw1", "DataWarehouse", "Online", "DW100c"));

        let client = SubscriptionClient::new(subscription("s1", "Sub One"), Arc::new(api));
        let found = enumerate_subscription(&client).await.unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].resource_group, "rg1");
    }

    #[tokio::test]
    async fn test_enumerate_keeps_only_warehouse_tier() {
        let api = FakeManagementApi::new();
        api.add_subscription(subscription("s1", "Sub One"));
        api.add_server("s1", server("srv", Some("rg1")));
        api.add_database("s1", "rg1", "srv", database("dw1", "DataWarehouse", "Online", "DW100c"));
        api.add_database("s1", "rg1", "srv", database("oltp", "Standard", "Online", "S0"));

        let client = SubscriptionClient::new(subscription("s1", "Sub One"), Arc::new(api));
        let found = enumerate_subscription(&client).await.unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "dw1");
        assert_eq!(found[0].resource_group, "rg1");
        assert_eq!(found[0].subscription_id, "s1");
        assert_eq!(found[0].status, WarehouseStatus::Online);
        assert_eq!(
            found[0].performance_level,
            Some(PerformanceLevel::new("DW100c"))
        );
    }

    #[tokio::test]
    async fn test_server_without_resource_group_is_skipped() {
        let api = FakeManagementApi::new();
        api.add_subscription(subscription("s1", "Sub One"));
        api.add_server("s1", server("broken", None));
        api.add_server("s1", server("srv", Some("rg1")));
        api.add_database("s1", "rg1", "srv", database("dw1", "DataWarehouse", "Paused", "DW200c"));

        let client = SubscriptionClient::new(subscription("s1", "Sub One"), Arc::new(api));
        let found = enumerate_subscription(&client).await.unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].server, "srv");
    }

    #[tokio::test]
    async fn test_enumerate_all_preserves_subscription_order() {
        let api = Arc::new(FakeManagementApi::new());
        for (id, rg) in [("s1", "rg1"), ("s2", "rg2")] {
            api.add_subscription(subscription(id, id));
            api.add_server(id, server("srv", Some(rg)));
            let dw = database(&format!("dw-{id}"), "DataWarehouse", "Online", "DW100c");
            api.add_database(id, rg, "srv", dw);
        }
        let clients: Vec<_> = ["s1", "s2"]
            .into_iter()
            .map(|id| SubscriptionClient::new(subscription(id, id), api.clone()))
            .collect();

        let names: Vec<_> = enumerate_all(&clients)
            .await
            .unwrap()
            .into_iter()
            .map(|w| w.name)
            .collect();
        assert_eq!(names, vec!["dw-s1", "dw-s2"]);
    }

    #[tokio::test]
    async fn test_enumerate_each_isolates_failing_subscription() {
        let api = Arc::new(FakeManagementApi::new());
        for (id, rg) in [("s1", "rg1"), ("s2", "rg2")] {
            api.add_server(id, server("srv", Some(rg)));
            let dw = database(&format!("dw-{id}"), "DataWarehouse", "Online", "DW100c");
            api.add_database(id, rg, "srv", dw);
        }
        api.fail_subscription("s2", 409, "MissingSubscriptionRegistration");
        let clients: Vec<_> = ["s1", "s2"]
            .into_iter()
            .map(|id| SubscriptionClient::new(subscription(id, id), api.clone()))
            .collect();

        let results = enumerate_each(&clients).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0.id, "s1");
        assert_eq!(results[0].1.as_ref().unwrap()[0].name, "dw-s1");
        assert_eq!(results[1].0.id, "s2");
        assert_eq!(results[1].1.as_ref().unwrap_err().status(), Some(409));

        assert!(enumerate_all(&clients).await.is_err());
    }

    #[tokio::test]
    async fn test_enumeration_error_propagates() {
        let api = FakeManagementApi::new();
        api.fail_listing("throttled");
        let client = SubscriptionClient::new(subscription("s1", "Sub One"), Arc::new(api));
        assert!(enumerate_subscription(&client).await.is_err());
    }
}
