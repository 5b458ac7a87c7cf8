//! Unified error handling for warehousectl-core
//!
//! Every fallible operation in the core returns [`CoreError`], with helper
//! predicates so callers can branch on the class of failure without matching
//! on HTTP status codes themselves.
//!
//! # Example
//!
//! ```rust
//! use warehousectl_core::CoreError;
//!
//! fn handle_error(err: CoreError) {
//!     if err.is_not_found() {
//!         println!("Resource not found");
//!     } else if err.is_conflict() {
//!         println!("Another operation is still running");
//!     }
//! }
//!
//! let err = CoreError::Api {
//!     status: 404,
//!     code: Some("ResourceNotFound".to_string()),
//!     message: "Database 'dw1' not found".to_string(),
//! };
//! assert!(err.is_not_found());
//! ```

use std::time::Duration;
use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum CoreError {
    /// Error response from Azure Resource Manager
    #[error("{message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// Transport-level HTTP failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body could not be decoded
    #[error("Invalid response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Credential could not produce a token
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The signed-in identity sees no subscriptions
    #[error("No Azure subscriptions found")]
    NoSubscriptions,

    /// No client was created for the subscription
    #[error("Could not find SQL client for subscription '{0}'")]
    UnknownSubscription(String),

    /// A command was invoked on a node that is not a warehouse
    #[error("'{0}' is not a warehouse")]
    NotAWarehouse(String),

    /// Target lookup found nothing
    #[error("Warehouse '{0}' not found")]
    WarehouseNotFound(String),

    /// Target lookup matched more than one warehouse
    #[error("'{target}' matches more than one warehouse: {candidates}")]
    AmbiguousWarehouse { target: String, candidates: String },

    /// Long-running operation ended in a failed or cancelled state
    #[error("{0}")]
    OperationFailed(String),

    /// Long-running operation did not finish in time
    #[error("Operation timed out after {0:?}")]
    OperationTimeout(Duration),

    /// Invalid input
    #[error("Validation error: {0}")]
    Validation(String),

    /// External command-line tool failed or could not be started
    #[error("{0}")]
    ExternalTool(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// HTTP status behind this error, if there was a response
    pub fn status(&self) -> Option<u16> {
        match self {
            CoreError::Api { status, .. } => Some(*status),
            CoreError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Returns true if this is a "not found" error (404)
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::WarehouseNotFound(_)) || self.status() == Some(404)
    }

    /// Returns true if this is an authentication/authorization error (401/403)
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, CoreError::Auth(_)) || matches!(self.status(), Some(401) | Some(403))
    }

    /// Returns true if this is a timeout error
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        match self {
            CoreError::OperationTimeout(_) => true,
            CoreError::Http(e) => e.is_timeout(),
            _ => false,
        }
    }

    /// Returns true if this is a conflict error (409), typically another
    /// operation already running on the same database
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        self.status() == Some(409)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16) -> CoreError {
        CoreError::Api {
            status,
            code: None,
            message: "boom".to_string(),
        }
    }

    #[test]
    fn test_api_error_predicates() {
        assert!(api(404).is_not_found());
        assert!(api(401).is_unauthorized());
        assert!(api(403).is_unauthorized());
        assert!(api(409).is_conflict());
        assert!(!api(503).is_conflict());
        assert_eq!(api(409).status(), Some(409));
        assert_eq!(CoreError::NoSubscriptions.status(), None);
    }

    #[test]
    fn test_operation_timeout() {
        let err = CoreError::OperationTimeout(Duration::from_secs(600));
        assert!(err.is_timeout());
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn test_api_error_displays_message_only() {
        let err = CoreError::Api {
            status: 409,
            code: Some("Conflict".to_string()),
            message: "Another operation is in progress".to_string(),
        };
        assert_eq!(err.to_string(), "Another operation is in progress");
    }

    #[test]
    fn test_unknown_subscription_message() {
        let err = CoreError::UnknownSubscription("sub-1".to_string());
        assert!(err.to_string().contains("Could not find SQL client"));
    }
}
