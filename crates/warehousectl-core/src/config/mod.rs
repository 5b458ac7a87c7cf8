//! Configuration for warehousectl
//!
// Allow nested config module - this is intentional for the config subsystem
#![allow(clippy::module_inception)]
//!
//! - One TOML file at a platform-specific location
//! - Environment variable expansion in the file
//! - Secrets stored in the OS keyring (optional `secure-storage` feature)

pub mod config;
pub mod credential;
pub mod error;

pub use config::{
    ClientSecretCredentials, Config, CredentialConfig, CredentialKind, EndpointsConfig,
    ScaleStrategy, ToolsConfig,
};
pub use credential::{SecretBackend, StoredSecret};
pub use error::{ConfigError, Result};
