//! Typed errors for loading a sandboxed script.
//!
//! Invocation faults never surface here: once an instance is loaded, every
//! fault is folded into a [`CallResult`](crate::CallResult).

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading a script into a sandbox instance.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoadError {
    /// The script file could not be read.
    #[error("cannot read script '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Script compilation failed (syntax error).
    #[error("compile error: {0}")]
    Compile(String),

    /// An `import` could not be resolved inside the module directory.
    #[error("module not found: {0}")]
    ModuleNotFound(String),

    /// The script asked for something outside its granted capabilities.
    #[error("capability denied: {0}")]
    CapabilityDenied(String),

    /// Evaluating the script's top level failed.
    #[error("initialization error: {0}")]
    Initialization(String),

    /// Restoring or snapshotting instance state failed.
    #[error("state error: {0}")]
    State(String),
}

/// Convenience result alias for the sandbox crate.
pub type LoadResult<T> = Result<T, LoadError>;

impl From<serde_json::Error> for LoadError {
    fn from(err: serde_json::Error) -> Self {
        LoadError::State(err.to_string())
    }
}
