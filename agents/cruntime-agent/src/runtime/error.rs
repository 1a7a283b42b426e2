//! Runtime adapter errors.

use crate::command::CommandError;
use crate::runtime::kernel::KernelVersion;

/// Result type alias for runtime adapter operations.
pub type Result<T, E = RuntimeError> = std::result::Result<T, E>;

/// Errors surfaced by runtime adapters.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// A host command ran and failed, or could not be run at all.
    #[error(transparent)]
    Execution(#[from] CommandError),

    /// Command output did not contain the expected token.
    #[error("unknown version: {line:?}")]
    Parse { line: String },

    /// The host does not meet a hard precondition.
    #[error("kernel >= {required} is required, host runs {actual}")]
    Compatibility {
        required: KernelVersion,
        actual: String,
    },

    /// The runtime deliberately does not implement this verb.
    #[error("{operation} is not supported by the {runtime} runtime")]
    Unsupported {
        runtime: &'static str,
        operation: &'static str,
    },

    /// JSON output from the runtime could not be decoded.
    #[error("malformed runtime output: {0}")]
    Decode(#[from] serde_json::Error),

    /// No image list is known for the requested Kubernetes version.
    #[error("image catalog: {0}")]
    Catalog(String),

    #[error("unknown container runtime: {0:?}")]
    UnknownRuntime(String),

    /// Another error annotated with what the adapter was doing.
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<RuntimeError>,
    },
}

impl RuntimeError {
    pub fn unsupported(runtime: &'static str, operation: &'static str) -> Self {
        RuntimeError::Unsupported { runtime, operation }
    }

    /// Wrap with the intent of the failing operation.
    pub fn context(self, context: impl Into<String>) -> Self {
        RuntimeError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error beneath any context layers.
    pub fn root(&self) -> &RuntimeError {
        let mut current = self;
        while let RuntimeError::Context { source, .. } = current {
            current = &**source;
        }
        current
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self.root(), RuntimeError::Unsupported { .. })
    }

    pub fn is_compatibility(&self) -> bool {
        matches!(self.root(), RuntimeError::Compatibility { .. })
    }
}

/// Attach operation context to fallible results.
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T>;

    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<RuntimeError>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().context(context))
    }

    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| e.into().context(f()))
    }
}
