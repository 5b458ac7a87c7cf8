//! Error types for warehousectl
//!
//! Core errors are mapped onto [`CliError`] so each class of failure can carry
//! its own tips when printed.

use colored::Colorize;
use thiserror::Error;
use warehousectl_core::auth::AZURE_CLI_INSTALL_URL;
use warehousectl_core::{ConfigError, CoreError};

/// Cargo-style diagnostic formatter for CLI errors.
///
/// Produces structured output like:
/// ```text
/// error: Azure CLI is not signed in
///   ERROR: Please run 'az login' to setup account.
///
///   tip: sign in and try again:
///       warehousectl auth login
/// ```
pub struct CliDiagnostic {
    message: String,
    detail: Option<String>,
    tips: Vec<(String, Vec<String>)>,
}

impl CliDiagnostic {
    pub fn error(message: &str) -> Self {
        Self {
            message: message.to_string(),
            detail: None,
            tips: Vec::new(),
        }
    }

    pub fn detail(mut self, text: &str) -> Self {
        self.detail = Some(text.to_string());
        self
    }

    /// Add a tip with optional example commands.
    pub fn tip(mut self, description: &str, commands: &[&str]) -> Self {
        self.tips.push((
            description.to_string(),
            commands.iter().map(|s| s.to_string()).collect(),
        ));
        self
    }

    /// Print the diagnostic to stderr with colored formatting.
    pub fn print(&self) {
        eprint!("{}{}", "error".red().bold(), ": ".bold());
        eprintln!("{}", self.message);

        if let Some(detail) = &self.detail {
            for line in detail.lines() {
                eprintln!("  {}", line);
            }
        }

        for (description, commands) in &self.tips {
            eprintln!();
            eprint!("  {}{}", "tip".yellow().bold(), ": ".bold());
            eprintln!("{}", description);
            for cmd in commands {
                eprintln!("      {}", cmd);
            }
        }
    }
}

/// Main error type for the warehousectl application
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Azure CLI is not installed")]
    CliMissing { detail: String },

    #[error("Azure CLI is not signed in")]
    NotLoggedIn { detail: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("No Azure subscriptions found")]
    NoSubscriptions,

    #[error("Subscription '{name}' not found")]
    UnknownSubscription { name: String },

    #[error("Warehouse '{target}' not found")]
    WarehouseNotFound { target: String },

    #[error("'{target}' matches more than one warehouse")]
    AmbiguousWarehouse { target: String, candidates: String },

    #[error("API error: {message}")]
    ApiError { message: String },

    #[error("Connection error: {message}")]
    ConnectionError { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Timeout: {message}")]
    Timeout { message: String },

    #[error("{message}")]
    ExternalTool { message: String },

    #[error("Output formatting error: {message}")]
    OutputError { message: String },

    /// Failure already shown through the presentation hooks
    #[error("command failed")]
    Reported,
}

/// Result type for warehousectl operations
pub type Result<T> = std::result::Result<T, CliError>;

impl CliError {
    /// Get helpful suggestions for resolving this error
    pub fn suggestions(&self) -> Vec<(String, Vec<String>)> {
        let tip = |text: &str, commands: &[&str]| {
            (
                text.to_string(),
                commands.iter().map(|c| c.to_string()).collect(),
            )
        };
        match self {
            CliError::CliMissing { .. } => vec![
                tip(
                    &format!("install the Azure CLI from {}", AZURE_CLI_INSTALL_URL),
                    &[],
                ),
                tip(
                    "or point warehousectl at an existing installation:",
                    &["warehousectl config set tools.az /path/to/az"],
                ),
            ],
            CliError::NotLoggedIn { .. } => {
                vec![tip("sign in and try again:", &["warehousectl auth login"])]
            }
            CliError::AuthenticationFailed { .. } => vec![
                tip("check the Azure CLI login:", &["warehousectl auth status"]),
                tip(
                    "or configure a service principal:",
                    &[
                        "warehousectl config set credential.kind client-secret",
                        "warehousectl config set-secret",
                    ],
                ),
            ],
            CliError::NoSubscriptions => vec![tip(
                "make sure the signed-in identity has access to at least one subscription:",
                &["az account list -o table"],
            )],
            CliError::UnknownSubscription { .. } => vec![tip(
                "use a subscription id or display name from:",
                &["warehousectl tree"],
            )],
            CliError::WarehouseNotFound { .. } => vec![tip(
                "targets are server/name or resource-group/server/name; list them with:",
                &["warehousectl list"],
            )],
            CliError::AmbiguousWarehouse { candidates, .. } => vec![tip(
                &format!(
                    "qualify the target with its resource group or --subscription. Candidates: {}",
                    candidates
                ),
                &[],
            )],
            CliError::ConnectionError { .. } => vec![
                tip("check network connectivity", &[]),
                tip(
                    "verify the management endpoint:",
                    &["warehousectl config show"],
                ),
            ],
            CliError::Config(_) => vec![tip(
                "check the configuration file:",
                &["warehousectl config path"],
            )],
            CliError::InvalidInput { .. } => vec![tip(
                "check the command syntax:",
                &["warehousectl <command> --help"],
            )],
            _ => vec![],
        }
    }

    fn detail(&self) -> Option<&str> {
        match self {
            CliError::CliMissing { detail } | CliError::NotLoggedIn { detail } => {
                Some(detail.as_str())
            }
            _ => None,
        }
    }

    /// Print a cargo-style diagnostic to stderr using colored formatting.
    pub fn print_diagnostic(&self) {
        if matches!(self, CliError::Reported) {
            return;
        }

        let mut diag = CliDiagnostic::error(&self.to_string());
        if let Some(detail) = self.detail() {
            diag = diag.detail(detail);
        }
        for (text, commands) in self.suggestions() {
            let commands: Vec<&str> = commands.iter().map(String::as_str).collect();
            diag = diag.tip(&text, &commands);
        }
        diag.print();
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Auth(message) => CliError::AuthenticationFailed { message },
            CoreError::NoSubscriptions => CliError::NoSubscriptions,
            CoreError::UnknownSubscription(name) => CliError::UnknownSubscription { name },
            CoreError::WarehouseNotFound(target) => CliError::WarehouseNotFound { target },
            CoreError::AmbiguousWarehouse { target, candidates } => {
                CliError::AmbiguousWarehouse { target, candidates }
            }
            CoreError::Validation(message) | CoreError::NotAWarehouse(message) => {
                CliError::InvalidInput { message }
            }
            CoreError::OperationTimeout(_) => CliError::Timeout {
                message: err.to_string(),
            },
            CoreError::ExternalTool(message) => CliError::ExternalTool { message },
            CoreError::Config(e) => CliError::Config(e.to_string()),
            CoreError::Http(e) if e.is_connect() || e.is_timeout() => CliError::ConnectionError {
                message: e.to_string(),
            },
            ref e if e.is_unauthorized() => CliError::AuthenticationFailed {
                message: e.to_string(),
            },
            other => CliError::ApiError {
                message: other.to_string(),
            },
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        CliError::Config(err.to_string())
    }
}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        CliError::OutputError {
            message: format!("{:#}", err),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::ExternalTool {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_map_to_cli_variants() {
        assert!(matches!(
            CliError::from(CoreError::NoSubscriptions),
            CliError::NoSubscriptions
        ));
        assert!(matches!(
            CliError::from(CoreError::WarehouseNotFound("srv/dw1".to_string())),
            CliError::WarehouseNotFound { target } if target == "srv/dw1"
        ));
        assert!(matches!(
            CliError::from(CoreError::Api {
                status: 401,
                code: Some("InvalidAuthenticationToken".to_string()),
                message: "expired".to_string(),
            }),
            CliError::AuthenticationFailed { .. }
        ));
        assert!(matches!(
            CliError::from(CoreError::Api {
                status: 409,
                code: None,
                message: "busy".to_string(),
            }),
            CliError::ApiError { message } if message == "busy"
        ));
    }

    #[test]
    fn test_login_suggestions_point_at_auth_login() {
        let err = CliError::NotLoggedIn {
            detail: "Please run 'az login'".to_string(),
        };
        let tips = err.suggestions();
        assert!(
            tips.iter()
                .any(|(_, cmds)| cmds.iter().any(|c| c == "warehousectl auth login"))
        );
        assert_eq!(err.detail(), Some("Please run 'az login'"));
    }

    #[test]
    fn test_missing_cli_mentions_install_url() {
        let err = CliError::CliMissing {
            detail: "No such file or directory".to_string(),
        };
        assert!(
            err.suggestions()
                .iter()
                .any(|(text, _)| text.contains(AZURE_CLI_INSTALL_URL))
        );
    }

    #[test]
    fn test_reported_has_no_suggestions() {
        assert!(CliError::Reported.suggestions().is_empty());
    }
}
