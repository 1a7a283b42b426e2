//! Remote command runner using the system `ssh` client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Cmd, CommandError, CommandRunner, LocalRunner, RunResult};

/// Where and how to reach a remote node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshTarget {
    pub host: String,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub port: Option<u16>,

    /// Private key passed with `-i`
    #[serde(default)]
    pub identity_file: Option<String>,
}

impl SshTarget {
    fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{}@{}", user, self.host),
            None => self.host.clone(),
        }
    }
}

/// Runs commands on a remote node over ssh.
///
/// The remote command line is quoted word by word so the remote login shell
/// sees the same argument vector the local [`Cmd`] describes.
#[derive(Debug, Clone)]
pub struct SshRunner {
    target: SshTarget,
    local: LocalRunner,
}

impl SshRunner {
    pub fn new(target: SshTarget, local: LocalRunner) -> Self {
        Self { target, local }
    }

    pub fn target(&self) -> &SshTarget {
        &self.target
    }

    /// The local `ssh` invocation that carries `cmd`.
    pub fn wrap(&self, cmd: &Cmd) -> Cmd {
        let mut ssh = Cmd::new("ssh").args(["-o", "BatchMode=yes"]);
        if let Some(port) = self.target.port {
            ssh = ssh.arg("-p").arg(port.to_string());
        }
        if let Some(identity) = &self.target.identity_file {
            ssh = ssh.arg("-i").arg(identity.as_str());
        }
        ssh.arg(self.target.destination()).arg("--").arg(cmd.to_string())
    }
}

#[async_trait]
impl CommandRunner for SshRunner {
    async fn run(&self, cmd: &Cmd) -> Result<RunResult, CommandError> {
        let line = cmd.to_string();
        debug!(host = %self.target.host, command = %line, "Running remote command");

        let relabel = |mut result: RunResult| {
            result.command = line.clone();
            result
        };

        match self.local.run(&self.wrap(cmd)).await {
            Ok(result) => Ok(relabel(result)),
            Err(CommandError::Failed(result)) => Err(CommandError::Failed(relabel(result))),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_builds_ssh_invocation() {
        let runner = SshRunner::new(
            SshTarget {
                host: "node-1".to_string(),
                user: Some("core".to_string()),
                port: Some(2222),
                identity_file: Some("/keys/id_ed25519".to_string()),
            },
            LocalRunner::new(),
        );

        let wrapped = runner.wrap(&Cmd::shell("echo 1 > /proc/sys/net/ipv4/ip_forward"));
        assert_eq!(wrapped.program(), "ssh");
        assert_eq!(
            wrapped.get_args(),
            &[
                "-o",
                "BatchMode=yes",
                "-p",
                "2222",
                "-i",
                "/keys/id_ed25519",
                "core@node-1",
                "--",
                "/bin/bash -c 'echo 1 > /proc/sys/net/ipv4/ip_forward'",
            ]
        );
    }

    #[test]
    fn test_destination_without_user() {
        let target = SshTarget {
            host: "10.0.0.5".to_string(),
            user: None,
            port: None,
            identity_file: None,
        };
        assert_eq!(target.destination(), "10.0.0.5");
    }
}
