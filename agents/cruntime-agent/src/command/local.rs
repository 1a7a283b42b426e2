//! Local command runner backed by `tokio::process`.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use super::{finish, Cmd, CommandError, CommandRunner, RunResult};

/// Runs commands on the local host.
#[derive(Debug, Clone, Default)]
pub struct LocalRunner {
    timeout: Option<Duration>,
}

impl LocalRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort commands that run longer than `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

#[async_trait]
impl CommandRunner for LocalRunner {
    async fn run(&self, cmd: &Cmd) -> Result<RunResult, CommandError> {
        let line = cmd.to_string();
        debug!(command = %line, "Running command");

        let mut command = Command::new(cmd.program());
        command
            .args(cmd.get_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, command.output())
                .await
                .map_err(|_| CommandError::Timeout {
                    command: line.clone(),
                    timeout,
                })?,
            None => command.output().await,
        }
        .map_err(|source| CommandError::Spawn {
            command: line.clone(),
            source,
        })?;

        finish(line, &output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_captures_stdout() {
        let runner = LocalRunner::new();
        let result = runner.run(&Cmd::new("echo").arg("hello")).await.unwrap();
        assert_eq!(result.stdout.trim(), "hello");
        assert!(result.success());
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_failed() {
        let runner = LocalRunner::new();
        let err = runner
            .run(&Cmd::shell("echo oops >&2; exit 3"))
            .await
            .unwrap_err();
        let result = err.result().expect("failed result");
        assert_eq!(result.exit_code, Some(3));
        assert_eq!(result.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let runner = LocalRunner::new();
        let err = runner
            .run(&Cmd::new("/nonexistent/definitely-not-here"))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_timeout() {
        let runner = LocalRunner::with_timeout(Duration::from_millis(50));
        let err = runner.run(&Cmd::new("sleep").arg("5")).await.unwrap_err();
        assert!(matches!(err, CommandError::Timeout { .. }));
    }
}
