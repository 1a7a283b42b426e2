//! Runtime module
//!
//! This module provides abstraction over container runtimes through a
//! common RuntimeAdapter trait. Porto is the runtime implemented here; the
//! factory is the single place new runtimes are registered.

pub mod adapter;
pub mod cri;
pub mod error;
pub mod images;
pub mod kernel;
pub mod porto;
pub mod preload;
pub mod version;

use semver::Version;
use std::sync::Arc;

use crate::command::CommandRunner;
use crate::sysinit::ServiceManager;

pub use adapter::RuntimeAdapter;
pub use error::{Result, RuntimeError};
pub use porto::PortoRuntime;

/// Settings a runtime handle is constructed from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Runtime identifier, e.g. "porto"
    pub name: String,
    /// CRI socket override
    pub socket: Option<String>,
    pub kubernetes_version: Version,
    pub image_repository: Option<String>,
    pub insecure_registries: Vec<String>,
    /// Other runtimes' services stopped by `enable` on request
    pub peer_services: Vec<String>,
}

/// Construct the adapter named by `config.name`.
pub fn new_runtime(
    config: RuntimeConfig,
    runner: Arc<dyn CommandRunner>,
    init: Arc<dyn ServiceManager>,
) -> Result<Box<dyn RuntimeAdapter>> {
    match config.name.as_str() {
        "porto" => Ok(Box::new(PortoRuntime::new(config, runner, init))),
        other => Err(RuntimeError::UnknownRuntime(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::FakeRunner;
    use crate::sysinit::FakeServices;

    fn config(name: &str) -> RuntimeConfig {
        RuntimeConfig {
            name: name.to_string(),
            socket: None,
            kubernetes_version: Version::new(1, 30, 0),
            image_repository: None,
            insecure_registries: vec![],
            peer_services: vec![],
        }
    }

    #[test]
    fn test_factory_selects_porto() {
        let rt = new_runtime(
            config("porto"),
            Arc::new(FakeRunner::new()),
            Arc::new(FakeServices::new()),
        )
        .unwrap();
        assert_eq!(rt.name(), "porto");
    }

    #[test]
    fn test_factory_rejects_unknown() {
        let err = new_runtime(
            config("rkt"),
            Arc::new(FakeRunner::new()),
            Arc::new(FakeServices::new()),
        )
        .err()
        .unwrap();
        assert!(matches!(err, RuntimeError::UnknownRuntime(name) if name == "rkt"));
    }
}
