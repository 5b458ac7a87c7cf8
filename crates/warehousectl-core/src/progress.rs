//! Progress reporting for long-running management operations
//!
//! Pause, resume and SKU updates answer `202 Accepted` and must be polled until
//! they reach a terminal state. The poller in [`crate::api::arm`] reports each
//! step through an optional callback so the CLI can drive a spinner.

use std::time::Duration;

/// Progress events emitted while waiting on a long-running operation
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// The operation was accepted
    Started { operation: String },
    /// One polling iteration with the reported status
    Polling {
        operation: String,
        status: String,
        elapsed: Duration,
    },
    /// Terminal success
    Completed { operation: String },
    /// Terminal failure
    Failed { operation: String, error: String },
}

/// Callback type for progress updates
pub type ProgressCallback = Box<dyn Fn(ProgressEvent) + Send + Sync>;

pub(crate) fn emit(callback: &Option<ProgressCallback>, event: ProgressEvent) {
    if let Some(cb) = callback {
        cb(event);
    }
}

/// Terminal state of an operation status string, if any
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OperationState {
    Running,
    Succeeded,
    Failed,
    Canceled,
}

impl OperationState {
    pub(crate) fn from_status(status: &str) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "succeeded" | "success" | "completed" => Self::Succeeded,
            "failed" | "error" => Self::Failed,
            "canceled" | "cancelled" => Self::Canceled,
            _ => Self::Running,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_operation_state_parsing() {
        assert_eq!(OperationState::from_status("Succeeded"), OperationState::Succeeded);
        assert_eq!(OperationState::from_status("Failed"), OperationState::Failed);
        assert_eq!(OperationState::from_status("Canceled"), OperationState::Canceled);
        assert_eq!(OperationState::from_status("InProgress"), OperationState::Running);
        assert_eq!(OperationState::from_status(""), OperationState::Running);
    }

    #[test]
    fn test_emit_calls_callback() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let cb: Option<ProgressCallback> = Some(Box::new(move |e| sink.lock().unwrap().push(e)));

        emit(
            &cb,
            ProgressEvent::Started {
                operation: "pause dw1".to_string(),
            },
        );
        emit(&None, ProgressEvent::Completed {
            operation: "ignored".to_string(),
        });

        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
