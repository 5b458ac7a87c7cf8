//! Presentation hooks
//!
//! The core never prints, prompts or draws. Handlers report through
//! [`OperatorHooks`] and the front end decides what that looks like: the CLI
//! implements it with coloured messages, dialoguer prompts and indicatif
//! spinners, tests record the calls.

use crate::progress::ProgressCallback;
use async_trait::async_trait;

/// Presentation layer for notifications, prompts and operation progress
#[async_trait]
pub trait OperatorHooks: Send + Sync {
    fn info(&self, message: &str);

    fn warn(&self, message: &str);

    fn error(&self, message: &str);

    /// Ask a yes/no question; `false` means declined or dismissed
    async fn confirm(&self, prompt: &str) -> bool;

    /// Let the operator choose one of `items`; `None` means cancelled
    async fn pick(&self, prompt: &str, items: &[String]) -> Option<usize>;

    fn on_operation_start(&self, _operation: &str) {}

    fn on_operation_complete(&self, _operation: &str) {}

    fn on_operation_failed(&self, _operation: &str, _error: &str) {}

    /// Callback receiving polling updates for a long-running operation
    fn progress(&self, _operation: &str) -> Option<ProgressCallback> {
        None
    }
}

/// Hooks that discard notifications and decline every prompt
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

#[async_trait]
impl OperatorHooks for NoopHooks {
    fn info(&self, _message: &str) {}

    fn warn(&self, _message: &str) {}

    fn error(&self, _message: &str) {}

    async fn confirm(&self, _prompt: &str) -> bool {
        false
    }

    async fn pick(&self, _prompt: &str, _items: &[String]) -> Option<usize> {
        None
    }
}
