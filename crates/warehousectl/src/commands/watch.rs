//! Interactive panel
//!
//! Draws the tree, redraws whenever the tree fires a change notification or
//! the hooks have something new to show, and reads operator commands from
//! stdin. Commands run as their own tasks so polling and drawing go on while
//! a pause, resume or scale is in flight.

use crate::cli::Cli;
use crate::connection::ConnectionManager;
use crate::error::Result as CliResult;
use crate::hooks::{PanelHooks, PanelStatus, Severity};
use crate::render::{self, SubscriptionBranch};
use chrono::{DateTime, Local};
use colored::Colorize;
use dialoguer::console::Term;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use warehousectl_core::{OperatorHooks, ScaleRequest, Session, TreeNode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelCommand {
    Refresh,
    ToggleExpand,
    Quit,
    Help,
    Pause(String),
    Resume(String),
    Scale {
        target: String,
        level: Option<String>,
    },
}

pub fn parse_panel_command(line: &str) -> Result<PanelCommand, String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    match words.as_slice() {
        [] | ["r"] | ["refresh"] => Ok(PanelCommand::Refresh),
        ["e"] | ["expand"] => Ok(PanelCommand::ToggleExpand),
        ["q"] | ["quit"] | ["exit"] => Ok(PanelCommand::Quit),
        ["h"] | ["help"] | ["?"] => Ok(PanelCommand::Help),
        ["pause", target] => Ok(PanelCommand::Pause(target.to_string())),
        ["resume", target] => Ok(PanelCommand::Resume(target.to_string())),
        ["scale", target] => Ok(PanelCommand::Scale {
            target: target.to_string(),
            level: None,
        }),
        ["scale", target, level] => Ok(PanelCommand::Scale {
            target: target.to_string(),
            level: Some(level.to_string()),
        }),
        ["pause" | "resume" | "scale", ..] => {
            Err(format!("Usage: {} <server/name> (see 'help')", words[0]))
        }
        _ => Err(format!("Unknown command '{}' (see 'help')", line.trim())),
    }
}

const HELP: &str = "r refresh | e expand/collapse | pause <target> | resume <target> | scale <target> [level] | q quit";

fn screen(
    branches: &[SubscriptionBranch],
    status: &PanelStatus,
    interval: Duration,
    updated: Option<DateTime<Local>>,
    show_help: bool,
) -> String {
    let updated = updated
        .map(|t| format!("updated {}", t.format("%H:%M:%S")))
        .unwrap_or_else(|| "loading".to_string());
    let mut out = format!(
        "{}  {}\n\n",
        "warehousectl watch".bold(),
        format!(
            "polling every {}s | {} | h for help",
            interval.as_secs(),
            updated
        )
        .dimmed()
    );
    out.push_str(&render::tree_text(branches));

    if !status.running.is_empty() {
        out.push('\n');
        for (operation, state) in &status.running {
            out.push_str(&format!("  {} {}: {}\n", "◌".yellow(), operation, state));
        }
    }

    if !status.log.is_empty() {
        out.push('\n');
        for (severity, message) in &status.log {
            let tag = match severity {
                Severity::Info => "info".green(),
                Severity::Warn => "warning".yellow(),
                Severity::Error => "error".red(),
            };
            out.push_str(&format!("  {}: {}\n", tag.bold(), message));
        }
    }

    if show_help {
        out.push_str(&format!("\n  {}\n", HELP.dimmed()));
    }

    out.push('\n');
    match &status.prompt {
        Some(prompt) => out.push_str(&format!("{} ", prompt.cyan().bold())),
        None => out.push_str("> "),
    }
    out
}

fn draw(term: &Term, text: &str) {
    if let Err(e) = term.clear_screen() {
        debug!("Could not clear screen: {}", e);
    }
    print!("{}", text);
    if let Err(e) = term.flush() {
        debug!("Could not flush terminal: {}", e);
    }
}

fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to read stdin: {}", e);
                    break;
                }
            }
        }
    });
    rx
}

fn spawn_operation(session: &Arc<Session>, subscription: Option<String>, command: PanelCommand) {
    let session = session.clone();
    tokio::spawn(async move {
        let target = match &command {
            PanelCommand::Pause(t) | PanelCommand::Resume(t) => t.clone(),
            PanelCommand::Scale { target, .. } => target.clone(),
            _ => return,
        };
        let node = match session
            .find_warehouse(&target, subscription.as_deref())
            .await
        {
            Ok(w) => TreeNode::Warehouse(w),
            Err(e) => {
                session.hooks().error(&e.to_string());
                return;
            }
        };
        let result = match command {
            PanelCommand::Pause(_) => session.pause(&node).await,
            PanelCommand::Resume(_) => session.resume(&node).await,
            PanelCommand::Scale { level, .. } => {
                let request = ScaleRequest {
                    level,
                    ..Default::default()
                };
                session.scale(&node, &request).await
            }
            _ => return,
        };
        match result {
            Ok(outcome) => debug!("{} finished: {:?}", target, outcome),
            Err(e) => debug!("{} failed: {}", target, e),
        }
    });
}

pub async fn run(
    cli: &Cli,
    conn_mgr: &ConnectionManager,
    interval: Option<u64>,
    expand: bool,
) -> CliResult<()> {
    let hooks = PanelHooks::new();
    let mut settings = conn_mgr.settings();
    if let Some(secs) = interval {
        settings.poll_interval = Duration::from_secs(secs.max(1));
    }
    let poll_interval = settings.poll_interval;
    let session = Arc::new(
        conn_mgr
            .open_session(Arc::new(hooks.clone()), settings)
            .await?,
    );
    let subscription = cli.subscription.clone();

    let term = Term::stdout();
    let mut lines = spawn_stdin_reader();
    let mut changes = session.tree().subscribe();
    let mut expand_all = expand;
    let mut show_help = false;
    let mut branches: Vec<SubscriptionBranch> = Vec::new();
    let mut updated = None;
    let mut reload = true;

    session.start_polling();

    loop {
        if reload {
            branches =
                render::build_tree(session.tree(), expand_all, subscription.as_deref()).await;
            updated = Some(Local::now());
            reload = false;
        }
        let status = hooks.status();
        draw(
            &term,
            &screen(&branches, &status, poll_interval, updated, show_help),
        );

        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                changes.borrow_and_update();
                reload = true;
            }
            _ = hooks.updated() => {}
            line = lines.recv() => {
                let Some(line) = line else {
                    break;
                };
                if hooks.answer(&line) {
                    continue;
                }
                match parse_panel_command(&line) {
                    Ok(PanelCommand::Quit) => break,
                    Ok(PanelCommand::Refresh) => reload = true,
                    Ok(PanelCommand::Help) => show_help = !show_help,
                    Ok(PanelCommand::ToggleExpand) => {
                        expand_all = !expand_all;
                        reload = true;
                    }
                    Ok(command) => spawn_operation(&session, subscription.clone(), command),
                    Err(message) => hooks.warn(&message),
                }
            }
        }
    }

    hooks.cancel_prompts();
    session.stop().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_panel_commands() {
        assert_eq!(parse_panel_command(""), Ok(PanelCommand::Refresh));
        assert_eq!(parse_panel_command(" r "), Ok(PanelCommand::Refresh));
        assert_eq!(parse_panel_command("q"), Ok(PanelCommand::Quit));
        assert_eq!(parse_panel_command("expand"), Ok(PanelCommand::ToggleExpand));
        assert_eq!(
            parse_panel_command("pause srv/dw1"),
            Ok(PanelCommand::Pause("srv/dw1".to_string()))
        );
        assert_eq!(
            parse_panel_command("resume rg1/srv/dw1"),
            Ok(PanelCommand::Resume("rg1/srv/dw1".to_string()))
        );
        assert_eq!(
            parse_panel_command("scale srv/dw1 DW500c"),
            Ok(PanelCommand::Scale {
                target: "srv/dw1".to_string(),
                level: Some("DW500c".to_string()),
            })
        );
    }

    #[test]
    fn test_parse_panel_command_errors() {
        assert!(parse_panel_command("pause").unwrap_err().starts_with("Usage: pause"));
        assert!(
            parse_panel_command("delete srv/dw1")
                .unwrap_err()
                .contains("Unknown command")
        );
    }

    #[test]
    fn test_screen_shows_prompt_and_messages() {
        colored::control::set_override(false);
        let hooks = PanelHooks::new();
        hooks.error("Failed to pause dw1: Conflict");
        let mut status = hooks.status();
        status.prompt = Some("Scale dw1 to DW500c? [y/N]".to_string());

        let text = screen(&[], &status, Duration::from_secs(60), None, false);
        assert!(text.contains("polling every 60s | loading"));
        assert!(text.contains("error: Failed to pause dw1: Conflict"));
        assert!(text.ends_with("Scale dw1 to DW500c? [y/N] "));
    }

    #[test]
    fn test_screen_shows_refresh_time() {
        colored::control::set_override(false);
        let at = Local::now();
        let text = screen(
            &[],
            &PanelHooks::new().status(),
            Duration::from_secs(30),
            Some(at),
            true,
        );
        assert!(text.contains(&format!("updated {}", at.format("%H:%M:%S"))));
        assert!(text.contains("scale <target> [level]"));
        assert!(text.ends_with("> "));
    }
}
