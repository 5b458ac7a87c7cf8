//! Configuration management for warehousectl
//!
//! Handles configuration loading from a TOML file with environment variable
//! expansion. Every key has a default so a missing file is a valid configuration.

#[cfg(target_os = "macos")]
use directories::BaseDirs;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::credential::StoredSecret;
use super::error::{ConfigError, Result};

/// Main configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    /// Whether subscription nodes start expanded in the tree
    #[serde(default)]
    pub expand_subscriptions: bool,
    /// Seconds between two polls of warehouse state
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Upper bound on waiting for a pause/resume/scale to finish
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_secs: u64,
    /// How scale mutations are issued
    #[serde(default)]
    pub scale_strategy: ScaleStrategy,
    #[serde(default)]
    pub credential: CredentialConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub endpoints: EndpointsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            expand_subscriptions: false,
            poll_interval_secs: default_poll_interval(),
            operation_timeout_secs: default_operation_timeout(),
            scale_strategy: ScaleStrategy::default(),
            credential: CredentialConfig::default(),
            tools: ToolsConfig::default(),
            endpoints: EndpointsConfig::default(),
        }
    }
}

/// Scale mutation path
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ScaleStrategy {
    /// Update the database SKU through the management API
    #[default]
    Api,
    /// Shell out to `az`, falling back to PowerShell
    Cli,
}

impl std::fmt::Display for ScaleStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScaleStrategy::Api => write!(f, "api"),
            ScaleStrategy::Cli => write!(f, "cli"),
        }
    }
}

/// Which credential source to use for management API tokens
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum CredentialKind {
    /// Client secret when configured, then the Azure CLI
    #[default]
    Default,
    /// Azure CLI only
    Cli,
    /// Service principal client secret only
    ClientSecret,
}

impl std::fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialKind::Default => write!(f, "default"),
            CredentialKind::Cli => write!(f, "cli"),
            CredentialKind::ClientSecret => write!(f, "client-secret"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct CredentialConfig {
    #[serde(default)]
    pub kind: CredentialKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Plaintext, `${ENV}` reference, or `keyring:<name>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

/// Service principal credentials after keyring and environment resolution
#[derive(Debug, Clone, PartialEq)]
pub struct ClientSecretCredentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

impl CredentialConfig {
    /// Resolve service principal credentials.
    ///
    /// `AZURE_TENANT_ID`, `AZURE_CLIENT_ID` and `AZURE_CLIENT_SECRET` override
    /// config values. Returns `None` when any of the three is missing.
    pub fn resolve_client_secret(&self) -> Result<Option<ClientSecretCredentials>> {
        let resolve = |value: &Option<String>, env_var: &str| -> Result<Option<String>> {
            if let Ok(from_env) = std::env::var(env_var) {
                return Ok(Some(from_env));
            }
            value
                .as_deref()
                .map(|v| StoredSecret::parse(v).reveal())
                .transpose()
        };

        let tenant_id = resolve(&self.tenant_id, "AZURE_TENANT_ID")?;
        let client_id = resolve(&self.client_id, "AZURE_CLIENT_ID")?;
        let client_secret = resolve(&self.client_secret, "AZURE_CLIENT_SECRET")?;

        match (tenant_id, client_id, client_secret) {
            (Some(tenant_id), Some(client_id), Some(client_secret)) => {
                Ok(Some(ClientSecretCredentials {
                    tenant_id,
                    client_id,
                    client_secret,
                }))
            }
            _ => Ok(None),
        }
    }
}

/// External command-line tools
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ToolsConfig {
    #[serde(default = "default_az")]
    pub az: String,
    #[serde(default = "default_pwsh")]
    pub pwsh: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            az: default_az(),
            pwsh: default_pwsh(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct EndpointsConfig {
    #[serde(default = "default_management")]
    pub management: String,
    #[serde(default = "default_authority")]
    pub authority: String,
    #[serde(default = "default_portal")]
    pub portal: String,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            management: default_management(),
            authority: default_authority(),
            portal: default_portal(),
        }
    }
}

impl Config {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// Load configuration from the standard location
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(config_path).map_err(|e| ConfigError::Read {
            path: config_path.to_path_buf(),
            source: e,
        })?;

        let expanded_content = Self::expand_env_vars(&content);

        let config: Config = toml::from_str(&expanded_content)?;

        Ok(config)
    }

    /// Save configuration to the standard location
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        self.save_to_path(&config_path)
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let content = toml::to_string_pretty(self)?;

        fs::write(config_path, content).map_err(|e| ConfigError::Write {
            path: config_path.to_path_buf(),
            source: e,
        })?;

        Ok(())
    }

    /// Set a single key from its string form, as used by `config set`
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let invalid = |expected: &str| ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            expected: expected.to_string(),
        };
        match key {
            "expand_subscriptions" | "expand-subscriptions" => {
                self.expand_subscriptions = value.parse().map_err(|_| invalid("true or false"))?;
            }
            "poll_interval_secs" | "poll-interval-secs" => {
                let secs: u64 = value.parse().map_err(|_| invalid("a positive integer"))?;
                if secs == 0 {
                    return Err(invalid("a positive integer"));
                }
                self.poll_interval_secs = secs;
            }
            "operation_timeout_secs" | "operation-timeout-secs" => {
                self.operation_timeout_secs =
                    value.parse().map_err(|_| invalid("an integer"))?;
            }
            "scale_strategy" | "scale-strategy" => {
                self.scale_strategy = match value {
                    "api" => ScaleStrategy::Api,
                    "cli" => ScaleStrategy::Cli,
                    _ => return Err(invalid("api or cli")),
                };
            }
            "credential.kind" => {
                self.credential.kind = match value {
                    "default" => CredentialKind::Default,
                    "cli" => CredentialKind::Cli,
                    "client-secret" => CredentialKind::ClientSecret,
                    _ => return Err(invalid("default, cli or client-secret")),
                };
            }
            "credential.tenant_id" => self.credential.tenant_id = Some(value.to_string()),
            "credential.client_id" => self.credential.client_id = Some(value.to_string()),
            "credential.client_secret" => {
                self.credential.client_secret = Some(value.to_string())
            }
            "tools.az" => self.tools.az = value.to_string(),
            "tools.pwsh" => self.tools.pwsh = value.to_string(),
            "endpoints.management" => self.endpoints.management = value.to_string(),
            "endpoints.authority" => self.endpoints.authority = value.to_string(),
            "endpoints.portal" => self.endpoints.portal = value.to_string(),
            _ => {
                return Err(ConfigError::UnknownKey {
                    key: key.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Get the path to the configuration file
    ///
    /// On macOS, this supports both the standard macOS path and Linux-style ~/.config path:
    /// 1. Check ~/.config/warehousectl/config.toml (Linux-style, preferred for consistency)
    /// 2. Fall back to ~/Library/Application Support/com.warehousectl.warehousectl/config.toml
    ///
    /// On Linux: ~/.config/warehousectl/config.toml
    /// On Windows: %APPDATA%\warehousectl\warehousectl\config.toml
    pub fn config_path() -> Result<PathBuf> {
        #[cfg(target_os = "macos")]
        {
            if let Some(base_dirs) = BaseDirs::new() {
                let linux_style_path = base_dirs
                    .home_dir()
                    .join(".config")
                    .join("warehousectl")
                    .join("config.toml");

                if linux_style_path.exists()
                    || linux_style_path
                        .parent()
                        .map(|p| p.exists())
                        .unwrap_or(false)
                {
                    return Ok(linux_style_path);
                }
            }
        }

        let proj_dirs = ProjectDirs::from("com", "warehousectl", "warehousectl")
            .ok_or(ConfigError::NoConfigDir)?;

        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    /// Expand environment variables in configuration content
    ///
    /// Supports ${VAR} and ${VAR:-default} syntax:
    /// ```toml
    /// [credential]
    /// client_secret = "${SP_SECRET}"
    /// tenant_id = "${AZURE_TENANT_ID:-contoso.onmicrosoft.com}"
    /// ```
    fn expand_env_vars(content: &str) -> String {
        // Unset variables are left as-is instead of failing the whole load
        let expanded =
            shellexpand::env_with_context_no_errors(content, |var| std::env::var(var).ok());
        expanded.to_string()
    }
}

fn default_poll_interval() -> u64 {
    60
}

fn default_operation_timeout() -> u64 {
    1800
}

fn default_az() -> String {
    if cfg!(windows) {
        "az.cmd".to_string()
    } else {
        "az".to_string()
    }
}

fn default_pwsh() -> String {
    "pwsh".to_string()
}

fn default_management() -> String {
    "https://management.azure.com".to_string()
}

fn default_authority() -> String {
    "https://login.microsoftonline.com".to_string()
}

fn default_portal() -> String {
    "https://portal.azure.com".to_string()
}
