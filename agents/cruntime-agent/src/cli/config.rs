//! Configuration module
//!
//! Handles loading and validating runtime configuration from TOML files.

use anyhow::{bail, Context, Result};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::command::{CommandRunner, LocalRunner, SshRunner, SshTarget};
use crate::runtime::adapter::{CgroupDriver, ClusterConfig, EnableOptions};
use crate::runtime::RuntimeConfig;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Container runtime settings
    #[serde(default)]
    pub runtime: RuntimeSettings,

    /// Where host commands run
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeSettings {
    /// Runtime name (porto)
    #[serde(default = "default_runtime_name")]
    pub name: String,

    /// CRI socket override
    #[serde(default)]
    pub socket: Option<String>,

    /// Kubernetes release the node runs
    #[serde(default = "default_kubernetes_version")]
    pub kubernetes_version: String,

    /// Registry mirror for control-plane images
    #[serde(default)]
    pub image_repository: Option<String>,

    #[serde(default)]
    pub insecure_registries: Vec<String>,

    #[serde(default = "default_cgroup_driver")]
    pub cgroup_driver: CgroupDriver,

    /// Run the runtime inside a user namespace
    #[serde(default)]
    pub rootless: bool,

    /// Stop other runtimes when enabling
    #[serde(default = "default_true")]
    pub disable_others: bool,

    /// Services of other runtimes that may be running on the host
    #[serde(default = "default_peer_services")]
    pub peer_services: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorKind {
    Local,
    Ssh,
}

/// Command executor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_executor_kind")]
    pub kind: ExecutorKind,

    /// Per-command timeout in seconds (0 = none)
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Remote node, required when kind = "ssh"
    #[serde(default)]
    pub ssh: Option<SshTarget>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, json, compact)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_runtime_name() -> String {
    "porto".to_string()
}

fn default_kubernetes_version() -> String {
    "1.30.0".to_string()
}

fn default_cgroup_driver() -> CgroupDriver {
    CgroupDriver::Systemd
}

fn default_peer_services() -> Vec<String> {
    ["docker", "containerd", "crio"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_executor_kind() -> ExecutorKind {
    ExecutorKind::Local
}

fn default_command_timeout() -> u64 {
    600
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            name: default_runtime_name(),
            socket: None,
            kubernetes_version: default_kubernetes_version(),
            image_repository: None,
            insecure_registries: Vec::new(),
            cgroup_driver: default_cgroup_driver(),
            rootless: false,
            disable_others: default_true(),
            peer_services: default_peer_services(),
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            kind: default_executor_kind(),
            command_timeout_secs: default_command_timeout(),
            ssh: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load the file if it exists, defaults otherwise
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default_config())
        }
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            runtime: RuntimeSettings::default(),
            executor: ExecutorConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .context("Failed to serialize configuration")?;

        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Kubernetes version as semver; a leading `v` is accepted
    pub fn kubernetes_version(&self) -> Result<Version> {
        let raw = self.runtime.kubernetes_version.trim();
        Version::parse(raw.trim_start_matches('v'))
            .with_context(|| format!("Invalid kubernetes_version: {:?}", raw))
    }

    /// Settings for constructing the runtime adapter
    pub fn runtime_config(&self) -> Result<RuntimeConfig> {
        Ok(RuntimeConfig {
            name: self.runtime.name.clone(),
            socket: self.runtime.socket.clone().filter(|s| !s.is_empty()),
            kubernetes_version: self.kubernetes_version()?,
            image_repository: self.runtime.image_repository.clone().filter(|r| !r.is_empty()),
            insecure_registries: self.runtime.insecure_registries.clone(),
            peer_services: self.runtime.peer_services.clone(),
        })
    }

    pub fn enable_options(&self) -> EnableOptions {
        EnableOptions {
            disable_others: self.runtime.disable_others,
            cgroup_driver: self.runtime.cgroup_driver,
            rootless: self.runtime.rootless,
        }
    }

    pub fn cluster_config(&self) -> Result<ClusterConfig> {
        Ok(ClusterConfig {
            kubernetes_version: self.kubernetes_version()?,
            image_repository: self.runtime.image_repository.clone().filter(|r| !r.is_empty()),
        })
    }

    /// Build the command executor described by `[executor]`
    pub fn command_runner(&self) -> Result<Arc<dyn CommandRunner>> {
        let local = match self.executor.command_timeout_secs {
            0 => LocalRunner::new(),
            secs => LocalRunner::with_timeout(Duration::from_secs(secs)),
        };

        match self.executor.kind {
            ExecutorKind::Local => Ok(Arc::new(local)),
            ExecutorKind::Ssh => {
                let Some(target) = self.executor.ssh.clone() else {
                    bail!("executor.kind = \"ssh\" requires an [executor.ssh] section");
                };
                if target.host.is_empty() {
                    bail!("executor.ssh.host must not be empty");
                }
                Ok(Arc::new(SshRunner::new(target, local)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default_config();
        assert_eq!(config.runtime.name, "porto");
        assert_eq!(config.runtime.cgroup_driver, CgroupDriver::Systemd);
        assert_eq!(config.executor.kind, ExecutorKind::Local);
        assert!(config.runtime.disable_others);
        assert_eq!(config.kubernetes_version().unwrap(), Version::new(1, 30, 0));
    }

    #[test]
    fn test_parse_minimal_config() {
        let toml_content = r#"
            [runtime]
            kubernetes_version = "v1.29.3"
            socket = "/run/custom.sock"
            insecure_registries = ["10.0.0.1:5000"]
        "#;

        let config: Config = toml::from_str(toml_content).unwrap();
        let runtime = config.runtime_config().unwrap();
        assert_eq!(runtime.kubernetes_version, Version::new(1, 29, 3));
        assert_eq!(runtime.socket.as_deref(), Some("/run/custom.sock"));
        assert_eq!(runtime.insecure_registries, vec!["10.0.0.1:5000"]);
        assert_eq!(runtime.peer_services, vec!["docker", "containerd", "crio"]);
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_invalid_kubernetes_version() {
        let mut config = Config::default_config();
        config.runtime.kubernetes_version = "latest".to_string();
        assert!(config.runtime_config().is_err());
    }

    #[test]
    fn test_ssh_executor_requires_target() {
        let toml_content = r#"
            [executor]
            kind = "ssh"
        "#;
        let config: Config = toml::from_str(toml_content).unwrap();
        assert!(config.command_runner().is_err());

        let toml_content = r#"
            [executor]
            kind = "ssh"
            [executor.ssh]
            host = "node-1"
            user = "core"
        "#;
        let config: Config = toml::from_str(toml_content).unwrap();
        assert!(config.command_runner().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cruntime.toml");

        let mut config = Config::default_config();
        config.runtime.rootless = true;
        config.runtime.cgroup_driver = CgroupDriver::Cgroupfs;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert!(loaded.enable_options().rootless);
        assert_eq!(loaded.enable_options().cgroup_driver, CgroupDriver::Cgroupfs);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.runtime.name, "porto");
    }
}
