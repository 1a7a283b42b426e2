//! Host kernel compatibility checks.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use super::adapter::Advisory;
use super::error::{Result, ResultExt, RuntimeError};
use crate::command::{Cmd, CommandRunner};

/// A kernel `major.minor` release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct KernelVersion {
    pub major: u32,
    pub minor: u32,
}

impl KernelVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Parse `uname -r` output such as `5.15.0-91-generic`.
    pub fn parse(release: &str) -> Result<Self> {
        let release = release.trim();
        let parse_err = || RuntimeError::Parse {
            line: release.to_string(),
        };

        let mut parts = release.split(|c: char| !c.is_ascii_digit());
        let major = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(parse_err)?;
        let minor = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(parse_err)?;

        Ok(Self { major, minor })
    }
}

impl fmt::Display for KernelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Overlayfs in a user namespace.
pub const ROOTLESS_REQUIRED: KernelVersion = KernelVersion::new(5, 11);

/// Overlayfs without SELinux relabel errors in a user namespace.
pub const ROOTLESS_RECOMMENDED: KernelVersion = KernelVersion::new(5, 13);

/// Fail with [`RuntimeError::Compatibility`] unless the host kernel is at
/// least `required`.
pub async fn check_kernel_compatibility(
    runner: &dyn CommandRunner,
    required: KernelVersion,
) -> Result<()> {
    let uname = runner
        .run(&Cmd::new("uname").arg("-r"))
        .await
        .context("reading kernel release")?;
    let actual = uname.stdout.trim().to_string();

    if KernelVersion::parse(&actual)? >= required {
        Ok(())
    } else {
        Err(RuntimeError::Compatibility { required, actual })
    }
}

/// Gate for rootless (user namespace) operation.
///
/// The hard minimum is fatal; missing the recommended minimum only yields
/// an [`Advisory`].
pub async fn check_rootless(runner: &dyn CommandRunner) -> Result<Option<Advisory>> {
    check_kernel_compatibility(runner, ROOTLESS_REQUIRED)
        .await
        .with_context(|| format!("kernel >= {} is required for rootless mode", ROOTLESS_REQUIRED))?;

    match check_kernel_compatibility(runner, ROOTLESS_RECOMMENDED).await {
        Ok(()) => Ok(None),
        Err(e) => {
            warn!(error = %e, "kernel >= {} is recommended for rootless mode", ROOTLESS_RECOMMENDED);
            Ok(Some(Advisory::new(
                "kernel check",
                format!(
                    "kernel >= {} is recommended for rootless mode: {}",
                    ROOTLESS_RECOMMENDED, e
                ),
            )))
        }
    }
}
