//! Domain records: subscriptions, warehouses and their status

use serde::{Deserialize, Serialize};
use std::fmt;

/// An Azure subscription visible to the signed-in identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub display_name: String,
}

/// Identity of a warehouse: (server, resource group, name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WarehouseKey {
    pub server: String,
    pub resource_group: String,
    pub name: String,
}

impl WarehouseKey {
    pub fn new(
        server: impl Into<String>,
        resource_group: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            resource_group: resource_group.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for WarehouseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.resource_group, self.server, self.name)
    }
}

/// Warehouse status as reported by the management API.
///
/// Values the API may add later are kept verbatim in [`WarehouseStatus::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WarehouseStatus {
    Online,
    Available,
    Resumed,
    Paused,
    Pausing,
    Resuming,
    Scaling,
    Other(String),
}

impl WarehouseStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "Online" => Self::Online,
            "Available" => Self::Available,
            "Resumed" => Self::Resumed,
            "Paused" => Self::Paused,
            "Pausing" => Self::Pausing,
            "Resuming" => Self::Resuming,
            "Scaling" => Self::Scaling,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Online => "Online",
            Self::Available => "Available",
            Self::Resumed => "Resumed",
            Self::Paused => "Paused",
            Self::Pausing => "Pausing",
            Self::Resuming => "Resuming",
            Self::Scaling => "Scaling",
            Self::Other(raw) => raw,
        }
    }

    pub fn class(&self) -> StatusClass {
        match self {
            Self::Online | Self::Available | Self::Resumed => StatusClass::Resumed,
            Self::Paused => StatusClass::Paused,
            _ => StatusClass::Pending,
        }
    }

    /// True while a pause, resume or scale is in flight
    pub fn is_transitioning(&self) -> bool {
        matches!(self, Self::Pausing | Self::Resuming | Self::Scaling)
    }

    pub fn is_online(&self) -> bool {
        self.class() == StatusClass::Resumed
    }
}

impl fmt::Display for WarehouseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for WarehouseStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for WarehouseStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

/// Coarse status class that decides which actions are offered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Resumed,
    Paused,
    Pending,
}

/// Status asserted locally while an operation is in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PendingStatus {
    Pausing,
    Resuming,
    Scaling,
}

impl From<PendingStatus> for WarehouseStatus {
    fn from(pending: PendingStatus) -> Self {
        match pending {
            PendingStatus::Pausing => WarehouseStatus::Pausing,
            PendingStatus::Resuming => WarehouseStatus::Resuming,
            PendingStatus::Scaling => WarehouseStatus::Scaling,
        }
    }
}

/// A named service objective such as `DW100c`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PerformanceLevel(String);

impl PerformanceLevel {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// DWU label with the `DW` prefix stripped (`DW100c` -> `100c`)
    pub fn dwu_label(&self) -> Option<&str> {
        self.0.strip_prefix("DW").filter(|rest| !rest.is_empty())
    }

    /// Numeric DWU (`DW1000c` -> 1000)
    pub fn dwu(&self) -> Option<u32> {
        let label = self.dwu_label()?;
        let digits: String = label.chars().take_while(|c| c.is_ascii_digit()).collect();
        digits.parse().ok()
    }
}

impl fmt::Display for PerformanceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A data warehouse database on a logical SQL server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warehouse {
    pub name: String,
    pub server: String,
    pub resource_group: String,
    pub subscription_id: String,
    pub status: WarehouseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance_level: Option<PerformanceLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl Warehouse {
    pub fn key(&self) -> WarehouseKey {
        WarehouseKey::new(&self.server, &self.resource_group, &self.name)
    }

    /// ARM resource id of the database
    pub fn resource_id(&self) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Sql/servers/{}/databases/{}",
            self.subscription_id, self.resource_group, self.server, self.name
        )
    }

    /// Azure portal overview page of the database
    pub fn portal_url(&self, portal_base: &str) -> String {
        format!(
            "{}/#@/resource{}/overview",
            portal_base.trim_end_matches('/'),
            self.resource_id()
        )
    }
}
