//! Cruntime Agent Library
//!
//! This crate lets node orchestration manage a container runtime through one
//! uniform contract: service lifecycle, image and container verbs, and image
//! preloading. Runtimes are external CRI services driven through host
//! commands, locally or over ssh.

pub mod cli;
pub mod command;
pub mod runtime;
pub mod sysinit;

// Re-exports for convenience
pub use cli::config::Config;
pub use command::{Cmd, CommandError, CommandRunner, LocalRunner, RunResult, SshRunner};
pub use runtime::adapter::RuntimeAdapter;
pub use runtime::porto::PortoRuntime;
pub use runtime::{new_runtime, RuntimeConfig, RuntimeError};
pub use sysinit::{ServiceManager, Systemd};
