//! Scripted command runner for tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use super::{Cmd, CommandError, CommandRunner, RunResult};

#[derive(Debug, Clone)]
struct Rule {
    pattern: String,
    stdout: String,
    stderr: String,
    exit_code: i32,
}

/// Deterministic in-memory runner.
///
/// Responses are chosen by substring match against the rendered command
/// line; the most recently registered matching rule wins. Commands with no
/// matching rule succeed with empty output. Every invocation is recorded.
#[derive(Debug, Clone, Default)]
pub struct FakeRunner {
    rules: Arc<Mutex<Vec<Rule>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Succeed with `stdout` for commands containing `pattern`.
    pub fn on(&self, pattern: &str, stdout: &str) -> &Self {
        self.push(pattern, stdout, "", 0)
    }

    /// Fail with exit status 1 and `stderr` for commands containing `pattern`.
    pub fn fail(&self, pattern: &str, stderr: &str) -> &Self {
        self.push(pattern, "", stderr, 1)
    }

    /// Fail with explicit output and exit code.
    pub fn fail_with(&self, pattern: &str, stdout: &str, stderr: &str, exit_code: i32) -> &Self {
        self.push(pattern, stdout, stderr, exit_code)
    }

    fn push(&self, pattern: &str, stdout: &str, stderr: &str, exit_code: i32) -> &Self {
        self.rules.lock().push(Rule {
            pattern: pattern.to_string(),
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            exit_code,
        });
        self
    }

    /// Snapshot of every command line received.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Recorded command lines containing `pattern`.
    pub fn calls_matching(&self, pattern: &str) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|line| line.contains(pattern))
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, cmd: &Cmd) -> Result<RunResult, CommandError> {
        let line = cmd.to_string();
        self.calls.lock().push(line.clone());

        let rule = self
            .rules
            .lock()
            .iter()
            .rev()
            .find(|rule| line.contains(&rule.pattern))
            .cloned();

        let result = match rule {
            Some(rule) => RunResult {
                command: line,
                stdout: rule.stdout,
                stderr: rule.stderr,
                exit_code: Some(rule.exit_code),
            },
            None => RunResult {
                command: line,
                exit_code: Some(0),
                ..Default::default()
            },
        };

        if result.success() {
            Ok(result)
        } else {
            Err(CommandError::Failed(result))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_latest_rule_wins() {
        let runner = FakeRunner::new();
        runner.on("uname", "5.4.0\n");
        runner.on("uname -r", "6.1.0\n");

        let result = runner.run(&Cmd::new("uname").arg("-r")).await.unwrap();
        assert_eq!(result.stdout, "6.1.0\n");
        assert_eq!(runner.calls(), vec!["uname -r"]);
    }

    #[tokio::test]
    async fn test_unmatched_succeeds_empty() {
        let runner = FakeRunner::new();
        let result = runner.run(&Cmd::sudo(["true"])).await.unwrap();
        assert!(result.stdout.is_empty());
    }

    #[tokio::test]
    async fn test_fail_rule() {
        let runner = FakeRunner::new();
        runner.fail("crictl pull", "manifest unknown");
        let err = runner
            .run(&Cmd::sudo(["crictl", "pull", "img:v1"]))
            .await
            .unwrap_err();
        assert_eq!(err.result().unwrap().stderr, "manifest unknown");
        assert_eq!(runner.calls_matching("pull").len(), 1);
    }

    #[tokio::test]
    async fn test_clones_share_log_across_tasks() {
        let runner = FakeRunner::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let runner = runner.clone();
                tokio::spawn(async move {
                    runner.run(&Cmd::new("echo").arg(i.to_string())).await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(runner.calls_matching("echo").len(), 8);
        runner.clear_calls();
        assert!(runner.calls().is_empty());
    }
}
