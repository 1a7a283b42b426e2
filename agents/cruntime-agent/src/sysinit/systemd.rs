//! systemd implementation of [`ServiceManager`].

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use super::ServiceManager;
use crate::command::{Cmd, CommandError, CommandRunner};

/// Output fragments `systemctl stop` prints for units that do not exist.
const MISSING_UNIT_MARKERS: [&str; 2] = ["not loaded", "no such file or directory"];

/// Controls services with `systemctl`, through a [`CommandRunner`] so it
/// works on remote nodes as well.
pub struct Systemd {
    runner: Arc<dyn CommandRunner>,
}

impl Systemd {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    async fn systemctl(&self, args: &[&str]) -> Result<(), CommandError> {
        let cmd = Cmd::sudo(["systemctl"]).args(args.iter().copied());
        self.runner.run(&cmd).await.map(|_| ())
    }

    async fn daemon_reload(&self) -> Result<(), CommandError> {
        self.systemctl(&["daemon-reload"]).await
    }
}

#[async_trait]
impl ServiceManager for Systemd {
    fn name(&self) -> &'static str {
        "systemd"
    }

    async fn active(&self, service: &str) -> bool {
        self.systemctl(&["is-active", "--quiet", "service", service])
            .await
            .is_ok()
    }

    async fn start(&self, service: &str) -> Result<(), CommandError> {
        self.daemon_reload().await?;
        self.systemctl(&["start", service]).await?;
        info!(service = %service, "Service started");
        Ok(())
    }

    async fn restart(&self, service: &str) -> Result<(), CommandError> {
        self.daemon_reload().await?;
        self.systemctl(&["restart", service]).await?;
        info!(service = %service, "Service restarted");
        Ok(())
    }

    async fn stop(&self, service: &str) -> Result<(), CommandError> {
        self.systemctl(&["stop", service]).await?;
        info!(service = %service, "Service stopped");
        Ok(())
    }

    async fn force_stop(&self, service: &str) -> Result<(), CommandError> {
        match self.systemctl(&["stop", "-f", service]).await {
            Ok(()) => {
                info!(service = %service, "Service force-stopped");
                Ok(())
            }
            Err(CommandError::Failed(result)) => {
                let output = result.output();
                if MISSING_UNIT_MARKERS.iter().any(|m| output.contains(m)) {
                    debug!(service = %service, "Service not installed, nothing to stop");
                    Ok(())
                } else {
                    Err(CommandError::Failed(result))
                }
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::FakeRunner;

    fn systemd(runner: &FakeRunner) -> Systemd {
        Systemd::new(Arc::new(runner.clone()))
    }

    #[tokio::test]
    async fn test_active_reflects_exit_status() {
        let runner = FakeRunner::new();
        runner.fail_with("is-active --quiet service docker", "", "", 3);

        let init = systemd(&runner);
        assert!(!init.active("docker").await);
        assert!(init.active("porto").await);
    }

    #[tokio::test]
    async fn test_restart_reloads_units_first() {
        let runner = FakeRunner::new();
        systemd(&runner).restart("porto").await.unwrap();
        assert_eq!(
            runner.calls(),
            vec!["sudo systemctl daemon-reload", "sudo systemctl restart porto"]
        );
    }

    #[tokio::test]
    async fn test_force_stop_tolerates_missing_unit() {
        let runner = FakeRunner::new();
        runner.fail(
            "systemctl stop -f porto",
            "Failed to stop porto.service: Unit porto.service not loaded.",
        );
        assert!(systemd(&runner).force_stop("porto").await.is_ok());
    }

    #[tokio::test]
    async fn test_force_stop_reports_other_failures() {
        let runner = FakeRunner::new();
        runner.fail("systemctl stop -f porto", "Access denied");
        assert!(systemd(&runner).force_stop("porto").await.is_err());
    }
}
