//! Command Execution
//!
//! Defines the contract every host command goes through. The runtime adapter
//! never spawns processes itself; it hands a [`Cmd`] to a [`CommandRunner`]
//! which may execute it locally or on a remote node.

#[cfg(test)]
pub mod fake;
pub mod local;
pub mod ssh;

use async_trait::async_trait;
use std::fmt;
use std::process::Output;
use std::time::Duration;

#[cfg(test)]
pub use fake::FakeRunner;
pub use local::LocalRunner;
pub use ssh::{SshRunner, SshTarget};

/// A host command: program plus arguments, never interpreted by a shell
/// unless built with [`Cmd::shell`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
}

impl Cmd {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// `sudo <args...>`
    pub fn sudo<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new("sudo").args(args)
    }

    /// Run a script through `/bin/bash -c`.
    pub fn shell(script: impl Into<String>) -> Self {
        Self::new("/bin/bash").arg("-c").arg(script)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", shell_quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", shell_quote(arg))?;
        }
        Ok(())
    }
}

/// Quote a word for a POSIX shell, leaving plain words untouched.
pub fn shell_quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// Captured result of one command invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunResult {
    /// The command line as it was executed
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    /// Exit code, `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
}

impl RunResult {
    pub fn from_output(command: String, output: &Output) -> Self {
        Self {
            command,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Combined stdout and stderr.
    pub fn output(&self) -> String {
        let mut combined = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !combined.is_empty() && !combined.ends_with('\n') {
                combined.push('\n');
            }
            combined.push_str(&self.stderr);
        }
        combined
    }

    fn status(&self) -> String {
        match self.exit_code {
            Some(code) => format!("exit status {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Errors raised by a [`CommandRunner`].
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{}` failed ({}): {}", .0.command, .0.status(), .0.stderr.trim())]
    Failed(RunResult),

    #[error("`{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },
}

impl CommandError {
    /// Captured output of a command that ran but did not succeed.
    pub fn result(&self) -> Option<&RunResult> {
        match self {
            CommandError::Failed(result) => Some(result),
            _ => None,
        }
    }
}

/// Executes host commands and captures their output.
///
/// A non-zero exit is reported as [`CommandError::Failed`] carrying the
/// captured output, so callers can inspect what the command printed.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, cmd: &Cmd) -> Result<RunResult, CommandError>;
}

/// Turn a finished process into the runner contract.
pub(crate) fn finish(command: String, output: &Output) -> Result<RunResult, CommandError> {
    let result = RunResult::from_output(command, output);
    if output.status.success() {
        Ok(result)
    } else {
        Err(CommandError::Failed(result))
    }
}
