//! Terminal implementations of the presentation hooks
//!
//! [`ConsoleHooks`] serves one-shot commands: coloured messages, dialoguer
//! prompts and one indicatif spinner per running operation.
//!
//! [`PanelHooks`] serves the `watch` panel. The panel owns stdin, so prompts
//! are queued and answered by the next line the operator types, and messages
//! are kept in a short log that the panel draws under the tree.

use colored::Colorize;
use dialoguer::{Confirm, Select};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::{HashMap, VecDeque};
use std::io::IsTerminal;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, oneshot};
use tracing::debug;
use warehousectl_core::{OperatorHooks, ProgressCallback, ProgressEvent};

type Spinners = Arc<Mutex<HashMap<String, ProgressBar>>>;

pub struct ConsoleHooks {
    spinners: Spinners,
    interactive: bool,
}

impl Default for ConsoleHooks {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleHooks {
    pub fn new() -> Self {
        Self {
            spinners: Arc::new(Mutex::new(HashMap::new())),
            interactive: std::io::stdin().is_terminal(),
        }
    }

    fn spinners(&self) -> std::sync::MutexGuard<'_, HashMap<String, ProgressBar>> {
        self.spinners.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn finish(&self, operation: &str) {
        if let Some(pb) = self.spinners().remove(operation) {
            pb.finish_and_clear();
        }
    }
}

#[async_trait::async_trait]
impl OperatorHooks for ConsoleHooks {
    fn info(&self, message: &str) {
        println!("{} {}", "✓".green().bold(), message);
    }

    fn warn(&self, message: &str) {
        eprintln!("{}{} {}", "warning".yellow().bold(), ":".bold(), message);
    }

    fn error(&self, message: &str) {
        eprintln!("{}{} {}", "error".red().bold(), ":".bold(), message);
    }

    async fn confirm(&self, prompt: &str) -> bool {
        if !self.interactive {
            self.warn(&format!("{} Use --yes to skip confirmation.", prompt));
            return false;
        }
        let prompt = prompt.to_string();
        tokio::task::spawn_blocking(move || {
            Confirm::new()
                .with_prompt(prompt)
                .default(false)
                .interact()
                .unwrap_or(false)
        })
        .await
        .unwrap_or(false)
    }

    async fn pick(&self, prompt: &str, items: &[String]) -> Option<usize> {
        if !self.interactive {
            self.warn(&format!("{}: pass --level when not running in a terminal", prompt));
            return None;
        }
        let prompt = prompt.to_string();
        let items = items.to_vec();
        tokio::task::spawn_blocking(move || {
            Select::new()
                .with_prompt(prompt)
                .items(&items)
                .default(0)
                .interact_opt()
                .ok()
                .flatten()
        })
        .await
        .ok()
        .flatten()
    }

    fn on_operation_start(&self, operation: &str) {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) =
            ProgressStyle::default_spinner().template("{spinner:.green} {msg} [{elapsed_precise}]")
        {
            pb.set_style(style);
        }
        pb.set_message(format!("Waiting for {}", operation));
        pb.enable_steady_tick(Duration::from_millis(120));
        self.spinners().insert(operation.to_string(), pb);
    }

    fn on_operation_complete(&self, operation: &str) {
        self.finish(operation);
    }

    fn on_operation_failed(&self, operation: &str, _error: &str) {
        self.finish(operation);
    }

    fn progress(&self, operation: &str) -> Option<ProgressCallback> {
        let spinners = self.spinners.clone();
        let operation = operation.to_string();
        Some(Box::new(move |event: ProgressEvent| {
            let spinners = spinners.lock().unwrap_or_else(|p| p.into_inner());
            let Some(pb) = spinners.get(&operation) else {
                return;
            };
            match event {
                ProgressEvent::Started { .. } => {
                    pb.set_message(format!("{}: accepted", operation));
                }
                ProgressEvent::Polling { status, .. } => {
                    pb.set_message(format!("{}: {}", operation, status));
                }
                ProgressEvent::Completed { .. } | ProgressEvent::Failed { .. } => {}
            }
        }))
    }
}

/// Number of messages the panel keeps
const LOG_CAPACITY: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warn,
    Error,
}

struct QueuedPrompt {
    text: String,
    reply: oneshot::Sender<String>,
}

#[derive(Default)]
struct PanelState {
    log: VecDeque<(Severity, String)>,
    running: HashMap<String, String>,
    prompts: VecDeque<QueuedPrompt>,
}

/// Snapshot of what the panel shows below the tree
#[derive(Debug, Clone, Default)]
pub struct PanelStatus {
    pub log: Vec<(Severity, String)>,
    pub running: Vec<(String, String)>,
    pub prompt: Option<String>,
}

#[derive(Default)]
struct PanelShared {
    state: Mutex<PanelState>,
    updated: Notify,
}

impl PanelShared {
    fn state(&self) -> std::sync::MutexGuard<'_, PanelState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn set_running(&self, operation: &str, status: Option<String>) {
        {
            let mut state = self.state();
            match status {
                Some(status) => {
                    state.running.insert(operation.to_string(), status);
                }
                None => {
                    state.running.remove(operation);
                }
            }
        }
        self.updated.notify_one();
    }
}

#[derive(Clone, Default)]
pub struct PanelHooks {
    shared: Arc<PanelShared>,
}

impl PanelHooks {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, severity: Severity, message: &str) {
        {
            let mut state = self.shared.state();
            if state.log.len() == LOG_CAPACITY {
                state.log.pop_front();
            }
            state.log.push_back((severity, message.to_string()));
        }
        self.shared.updated.notify_one();
    }

    /// Resolves when anything shown by [`PanelHooks::status`] changed
    pub async fn updated(&self) {
        self.shared.updated.notified().await;
    }

    pub fn status(&self) -> PanelStatus {
        let state = self.shared.state();
        let mut running: Vec<_> = state
            .running
            .iter()
            .map(|(op, status)| (op.clone(), status.clone()))
            .collect();
        running.sort();
        PanelStatus {
            log: state.log.iter().cloned().collect(),
            running,
            prompt: state.prompts.front().map(|p| p.text.clone()),
        }
    }

    /// Hand `line` to the oldest waiting prompt; false when none is waiting
    pub fn answer(&self, line: &str) -> bool {
        let prompt = self.shared.state().prompts.pop_front();
        match prompt {
            Some(prompt) => {
                if prompt.reply.send(line.trim().to_string()).is_err() {
                    debug!("Prompt '{}' was abandoned", prompt.text);
                }
                self.shared.updated.notify_one();
                true
            }
            None => false,
        }
    }

    /// Drop every waiting prompt; their askers see a declined answer
    pub fn cancel_prompts(&self) {
        self.shared.state().prompts.clear();
    }

    async fn ask(&self, text: String) -> Option<String> {
        let (reply, rx) = oneshot::channel();
        self.shared
            .state()
            .prompts
            .push_back(QueuedPrompt { text, reply });
        self.shared.updated.notify_one();
        rx.await.ok()
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes")
}

/// 1-based choice typed by the operator
fn parse_choice(answer: &str, len: usize) -> Option<usize> {
    answer
        .parse::<usize>()
        .ok()
        .filter(|n| (1..=len).contains(n))
        .map(|n| n - 1)
}

#[async_trait::async_trait]
impl OperatorHooks for PanelHooks {
    fn info(&self, message: &str) {
        self.push(Severity::Info, message);
    }

    fn warn(&self, message: &str) {
        self.push(Severity::Warn, message);
    }

    fn error(&self, message: &str) {
        self.push(Severity::Error, message);
    }

    async fn confirm(&self, prompt: &str) -> bool {
        self.ask(format!("{} [y/N]", prompt))
            .await
            .is_some_and(|answer| is_yes(&answer))
    }

    async fn pick(&self, prompt: &str, items: &[String]) -> Option<usize> {
        let choices = items
            .iter()
            .enumerate()
            .map(|(i, item)| format!("{}) {}", i + 1, item))
            .collect::<Vec<_>>()
            .join("  ");
        let answer = self
            .ask(format!("{}\n  {}\n  number, or empty to cancel:", prompt, choices))
            .await?;
        parse_choice(&answer, items.len())
    }

    fn on_operation_start(&self, operation: &str) {
        self.shared
            .set_running(operation, Some("started".to_string()));
    }

    fn on_operation_complete(&self, operation: &str) {
        self.shared.set_running(operation, None);
    }

    fn on_operation_failed(&self, operation: &str, _error: &str) {
        self.shared.set_running(operation, None);
    }

    fn progress(&self, operation: &str) -> Option<ProgressCallback> {
        let shared = self.shared.clone();
        let operation = operation.to_string();
        Some(Box::new(move |event: ProgressEvent| {
            if let ProgressEvent::Polling {
                status, elapsed, ..
            } = event
            {
                shared.set_running(
                    &operation,
                    Some(format!("{} ({}s)", status, elapsed.as_secs())),
                );
            }
        }))
    }
}
