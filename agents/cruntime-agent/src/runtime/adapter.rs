//! Runtime Adapter Trait
//!
//! Defines the common interface for all container runtime adapters.

use async_trait::async_trait;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use super::error::Result;

/// Lifecycle state of the managed runtime service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuntimeState {
    Unknown,
    Disabled,
    Enabled,
}

impl fmt::Display for RuntimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeState::Unknown => write!(f, "unknown"),
            RuntimeState::Disabled => write!(f, "disabled"),
            RuntimeState::Enabled => write!(f, "enabled"),
        }
    }
}

/// Cgroup driver the kubelet must be configured with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CgroupDriver {
    Cgroupfs,
    Systemd,
}

impl fmt::Display for CgroupDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CgroupDriver::Cgroupfs => write!(f, "cgroupfs"),
            CgroupDriver::Systemd => write!(f, "systemd"),
        }
    }
}

impl std::str::FromStr for CgroupDriver {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "cgroupfs" => Ok(CgroupDriver::Cgroupfs),
            "systemd" => Ok(CgroupDriver::Systemd),
            other => Err(format!("unknown cgroup driver {:?}", other)),
        }
    }
}

/// Options for [`RuntimeAdapter::enable`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnableOptions {
    /// Stop every other known runtime on the host (best effort)
    pub disable_others: bool,
    pub cgroup_driver: CgroupDriver,
    /// Run inside a user namespace
    pub rootless: bool,
}

impl Default for EnableOptions {
    fn default() -> Self {
        Self {
            disable_others: true,
            cgroup_driver: CgroupDriver::Systemd,
            rootless: false,
        }
    }
}

/// A non-fatal problem encountered by a best-effort step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advisory {
    /// Which step raised it
    pub step: String,
    pub message: String,
}

impl Advisory {
    pub fn new(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.step, self.message)
    }
}

/// Successful outcome of [`RuntimeAdapter::enable`].
///
/// Fatal failures are returned as errors; anything collected here did not
/// stop the runtime from being enabled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnableReport {
    pub warnings: Vec<Advisory>,
}

impl EnableReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Outcome of [`RuntimeAdapter::preload`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreloadOutcome {
    /// Every required image was already cached; nothing was pulled
    AlreadyPreloaded,
    /// This many images were pulled
    Pulled(usize),
}

/// The slice of cluster configuration the runtime needs for preloading
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterConfig {
    pub kubernetes_version: Version,
    pub image_repository: Option<String>,
}

/// Image information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListImage {
    pub id: String,
    pub repo_tags: Vec<String>,
    pub repo_digests: Vec<String>,
    pub size: String,
}

impl ListImage {
    /// First 13 characters of the ID without its `sha256:` prefix.
    pub fn short_id(&self) -> String {
        self.id
            .trim_start_matches("sha256:")
            .chars()
            .take(13)
            .collect()
    }
}

/// Image listing options
#[derive(Debug, Clone, Default)]
pub struct ListImagesOptions {}

/// Container state filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    #[default]
    All,
    Running,
    Paused,
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerState::All => write!(f, "all"),
            ContainerState::Running => write!(f, "running"),
            ContainerState::Paused => write!(f, "paused"),
        }
    }
}

/// Container listing options
#[derive(Debug, Clone, Default)]
pub struct ListContainersOptions {
    pub state: ContainerState,
    /// Container name filter
    pub name: Option<String>,
    /// Restrict to these Kubernetes namespaces
    pub namespaces: Vec<String>,
}

/// Image build request
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub src: String,
    pub file: String,
    pub tag: String,
    pub push: bool,
    pub env: Vec<String>,
    pub opts: Vec<String>,
}

/// Runtime adapter trait - common interface for all container runtimes
///
/// Every mutating verb converges: calling it again with the same arguments
/// leaves the host in the same state, so callers may retry freely.
#[async_trait]
pub trait RuntimeAdapter: Send + Sync {
    /// Human readable runtime name
    fn name(&self) -> &'static str;

    /// Version reported by the runtime binary
    async fn version(&self) -> Result<String>;

    /// CRI socket the runtime listens on
    fn socket_path(&self) -> &str;

    /// Whether the runtime service is running
    async fn active(&self) -> bool;

    /// Lifecycle state derived from [`active`](Self::active)
    async fn state(&self) -> RuntimeState {
        if self.active().await {
            RuntimeState::Enabled
        } else {
            RuntimeState::Disabled
        }
    }

    /// Check the runtime can be used on this host
    async fn available(&self) -> Result<()>;

    /// Idempotently enable the runtime
    async fn enable(&self, options: &EnableOptions) -> Result<EnableReport>;

    /// Idempotently disable the runtime
    async fn disable(&self) -> Result<()>;

    /// Restart the runtime service
    async fn restart(&self) -> Result<()>;

    /// Whether an image with `name` (and `sha`, when non-empty) is cached
    async fn image_exists(&self, name: &str, sha: &str) -> bool;

    async fn list_images(&self, options: &ListImagesOptions) -> Result<Vec<ListImage>>;

    /// Load an image archive
    async fn load_image(&self, path: &Path) -> Result<()>;

    async fn pull_image(&self, name: &str) -> Result<()>;

    /// Save an image to an archive
    async fn save_image(&self, name: &str, path: &Path) -> Result<()>;

    async fn remove_image(&self, name: &str) -> Result<()>;

    async fn tag_image(&self, source: &str, target: &str) -> Result<()>;

    async fn build_image(&self, options: &BuildOptions) -> Result<()>;

    async fn push_image(&self, name: &str) -> Result<()>;

    /// Cgroup driver used by the runtime
    fn cgroup_driver(&self) -> Result<CgroupDriver>;

    /// Flags the kubelet needs to talk to this runtime
    fn kubelet_options(&self) -> BTreeMap<String, String>;

    /// IDs of containers matching `options`
    async fn list_containers(&self, options: &ListContainersOptions) -> Result<Vec<String>>;

    async fn pause_containers(&self, ids: &[String]) -> Result<()>;

    async fn unpause_containers(&self, ids: &[String]) -> Result<()>;

    /// Forcibly remove containers
    async fn kill_containers(&self, ids: &[String]) -> Result<()>;

    async fn stop_containers(&self, ids: &[String]) -> Result<()>;

    /// Shell command that prints a container's log; not executed
    async fn container_log_cmd(&self, id: &str, len: usize, follow: bool) -> String;

    /// Shell command that prints the runtime's own log; not executed
    fn system_log_cmd(&self, len: usize) -> String;

    /// Make sure every image the cluster needs is cached
    async fn preload(&self, cluster: &ClusterConfig) -> Result<PreloadOutcome>;

    /// Whether all `images` are already cached
    async fn images_preloaded(&self, images: &[String]) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(id: &str) -> ListImage {
        ListImage {
            id: id.to_string(),
            repo_tags: vec![],
            repo_digests: vec![],
            size: "0".to_string(),
        }
    }

    #[test]
    fn test_short_id() {
        assert_eq!(image("sha256:0123456789abcdef").short_id(), "0123456789abc");
        assert_eq!(image("abc").short_id(), "abc");
        assert_eq!(image("ééééééééééééééé").short_id(), "ééééééééééééé");
    }

    #[test]
    fn test_cgroup_driver_round_trips_through_str() {
        assert_eq!("systemd".parse::<CgroupDriver>().unwrap(), CgroupDriver::Systemd);
        assert_eq!(CgroupDriver::Cgroupfs.to_string(), "cgroupfs");
        assert!("cgroupv3".parse::<CgroupDriver>().is_err());
    }

    #[test]
    fn test_enable_report() {
        let mut report = EnableReport::default();
        assert!(report.is_clean());
        report.warnings.push(Advisory::new("disable others", "docker: busy"));
        assert!(!report.is_clean());
        assert_eq!(report.warnings[0].to_string(), "disable others: docker: busy");
    }
}
