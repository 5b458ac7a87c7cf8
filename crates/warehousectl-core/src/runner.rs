//! Running external command-line tools
//!
//! The Azure CLI and PowerShell are reached through [`CommandRunner`] so the
//! credential, the login probe and the scale fallback can be tested without
//! the tools installed.

use async_trait::async_trait;
use tracing::{debug, trace};

/// Captured result of a finished process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when the process was killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Best single-line description of a failure
    pub fn failure_message(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        match self.code {
            Some(code) => format!("exited with status {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Executes a program to completion and captures its output.
///
/// An `Err` means the program could not be started at all (typically not
/// installed); a non-zero exit is an `Ok` with the code set.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> std::io::Result<CommandOutput>;
}

/// Runs programs with `tokio::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, program: &str, args: &[String]) -> std::io::Result<CommandOutput> {
        debug!("Running {} with {} argument(s)", program, args.len());
        trace!("Arguments: {:?}", args);

        let output = tokio::process::Command::new(program)
            .args(args)
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        let result = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!("{} exited with {:?}", program, result.code);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_message_prefers_stderr() {
        let out = CommandOutput {
            code: Some(1),
            stdout: "ignored".to_string(),
            stderr: "ERROR: bad things\n".to_string(),
        };
        assert_eq!(out.failure_message(), "ERROR: bad things");
        assert!(!out.success());
    }

    #[test]
    fn test_failure_message_falls_back_to_code() {
        let out = CommandOutput {
            code: Some(3),
            ..Default::default()
        };
        assert_eq!(out.failure_message(), "exited with status 3");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_runner_missing_program() {
        let err = ProcessRunner
            .run("warehousectl-definitely-not-installed", &[])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }
}
