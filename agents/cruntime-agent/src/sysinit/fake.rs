//! In-memory service manager for tests.

use async_trait::async_trait;
use std::collections::HashSet;
use parking_lot::Mutex;
use std::sync::Arc;

use super::ServiceManager;
use crate::command::{CommandError, RunResult};

#[derive(Debug, Default)]
struct Inner {
    active: HashSet<String>,
    failing: HashSet<(String, String)>,
    calls: Vec<String>,
}

/// Tracks which services are running and records every call as
/// `"<op> <service>"`.
#[derive(Debug, Clone, Default)]
pub struct FakeServices {
    inner: Arc<Mutex<Inner>>,
}

impl FakeServices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark services as already running.
    pub fn with_active(self, services: &[&str]) -> Self {
        {
            let mut inner = self.inner.lock();
            inner.active.extend(services.iter().map(|s| s.to_string()));
        }
        self
    }

    /// Make `op` ("start", "restart", "stop", "force_stop") fail for `service`.
    pub fn fail_on(&self, op: &str, service: &str) {
        self.inner
            .lock()
            .failing
            .insert((op.to_string(), service.to_string()));
    }

    pub fn is_active(&self, service: &str) -> bool {
        self.inner.lock().active.contains(service)
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().calls.clone()
    }

    fn record(&self, op: &str, service: &str) -> Result<(), CommandError> {
        let mut inner = self.inner.lock();
        inner.calls.push(format!("{} {}", op, service));
        if inner.failing.contains(&(op.to_string(), service.to_string())) {
            return Err(CommandError::Failed(RunResult {
                command: format!("systemctl {} {}", op, service),
                stderr: format!("{} {} failed", op, service),
                exit_code: Some(1),
                ..Default::default()
            }));
        }
        match op {
            "start" | "restart" => {
                inner.active.insert(service.to_string());
            }
            _ => {
                inner.active.remove(service);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ServiceManager for FakeServices {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn active(&self, service: &str) -> bool {
        self.is_active(service)
    }

    async fn start(&self, service: &str) -> Result<(), CommandError> {
        self.record("start", service)
    }

    async fn restart(&self, service: &str) -> Result<(), CommandError> {
        self.record("restart", service)
    }

    async fn stop(&self, service: &str) -> Result<(), CommandError> {
        self.record("stop", service)
    }

    async fn force_stop(&self, service: &str) -> Result<(), CommandError> {
        self.record("force_stop", service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_state_follows_calls() {
        let services = FakeServices::new().with_active(&["docker"]);
        let shared = services.clone();

        shared.force_stop("docker").await.unwrap();
        shared.restart("porto").await.unwrap();
        assert!(!services.is_active("docker"));
        assert!(services.active("porto").await);
        assert_eq!(services.calls(), vec!["force_stop docker", "restart porto"]);
    }

    #[tokio::test]
    async fn test_injected_failure_leaves_state() {
        let services = FakeServices::new().with_active(&["crio"]);
        services.fail_on("force_stop", "crio");

        assert!(services.force_stop("crio").await.is_err());
        assert!(services.is_active("crio"));
    }
}
