//! Service Control
//!
//! Start, stop and query host services. The runtime adapter uses this to
//! drive its own daemon and to shut down peer runtimes.

#[cfg(test)]
pub mod fake;
pub mod systemd;

use async_trait::async_trait;

use crate::command::CommandError;

#[cfg(test)]
pub use fake::FakeServices;
pub use systemd::Systemd;

/// Init-system operations on a named service.
#[async_trait]
pub trait ServiceManager: Send + Sync {
    /// Init system name, e.g. "systemd"
    fn name(&self) -> &'static str;

    /// Whether the service is currently running. Never mutates state.
    async fn active(&self, service: &str) -> bool;

    async fn start(&self, service: &str) -> Result<(), CommandError>;

    async fn restart(&self, service: &str) -> Result<(), CommandError>;

    async fn stop(&self, service: &str) -> Result<(), CommandError>;

    /// Stop the service without waiting for dependents. Succeeds when the
    /// service is already stopped or not installed.
    async fn force_stop(&self, service: &str) -> Result<(), CommandError>;
}
