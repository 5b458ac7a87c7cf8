//! # warehousectl-core
//!
//! Domain logic for viewing and operating Azure dedicated SQL pools
//! (databases in the `DataWarehouse` tier) across every subscription the
//! signed-in identity can see.
//!
//! ## Layers
//!
//! - [`api`] - the [`ManagementApi`] seam and its Azure Resource Manager client
//! - [`auth`] - bearer-token credentials (service principal, Azure CLI)
//! - [`enumerator`] - subscription → server → warehouse enumeration
//! - [`tree`] - two-level tree, pending overlay and change notifications
//! - [`poller`] - periodic diff of remote state
//! - [`operations`] - pause, resume and scale handlers
//! - [`scale`] - performance levels and the command-line scale path
//! - [`session`] - owns all of the above with a start/stop lifecycle
//! - [`config`] - TOML configuration with keyring-backed secrets
//!
//! Presentation is left to the caller through [`OperatorHooks`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use warehousectl_core::{
//!     ArmClient, Config, NoopHooks, ProcessRunner, Session, SessionSettings,
//!     auth::default_credential,
//! };
//!
//! # async fn run() -> warehousectl_core::Result<()> {
//! let config = Config::load()?;
//! let runner = Arc::new(ProcessRunner);
//! let credential = default_credential(&config, reqwest::Client::new(), runner.clone())?;
//! let api = ArmClient::builder()
//!     .base_url(&config.endpoints.management)
//!     .credential(credential)
//!     .build()?;
//!
//! let session = Session::activate(
//!     Arc::new(api),
//!     Arc::new(NoopHooks),
//!     runner,
//!     SessionSettings::from(&config),
//! )
//! .await?;
//! for warehouse in session.warehouses(None).await? {
//!     println!("{} {}", warehouse.key(), warehouse.status);
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod enumerator;
pub mod error;
pub mod hooks;
pub mod model;
pub mod operations;
pub mod poller;
pub mod progress;
pub mod runner;
pub mod scale;
pub mod session;
pub mod tree;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use api::{ArmClient, ManagementApi, SubscriptionClient};
pub use config::{Config, ConfigError, ScaleStrategy};
pub use error::{CoreError, Result};
pub use hooks::{NoopHooks, OperatorHooks};
pub use model::{
    PendingStatus, PerformanceLevel, StatusClass, Subscription, Warehouse, WarehouseKey,
    WarehouseStatus,
};
pub use operations::{Outcome, ScaleRequest};
pub use progress::{ProgressCallback, ProgressEvent};
pub use runner::{CommandOutput, CommandRunner, ProcessRunner};
pub use session::{Session, SessionSettings};
pub use tree::{ContextTag, NodeDisplay, TreeNode, WarehouseTree};
