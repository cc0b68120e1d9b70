//! Output plugin errors.
//!
//! `Failure`, `UserAbort` and `Fatal` are what the error sink receives while
//! the driver runs; their `Display` is exactly the text a script reported.

use sandpipe_sandbox::{CallResult, LoadError, Severity};
use thiserror::Error;

/// Errors surfaced by an output plugin.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum OutputError {
    /// The script could not be loaded.
    #[error("initialization failed: {0}")]
    Load(#[from] LoadError),

    /// A required entry point is missing from the script.
    #[error("script '{script}' does not define {entry}()")]
    MissingEntryPoint { script: String, entry: &'static str },

    /// `run` was called before a successful `init`.
    #[error("plugin is not initialized")]
    NotInitialized,

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A recoverable failure of one invocation.
    #[error("{0}")]
    Failure(String),

    /// The script requested termination.
    #[error("FATAL: user abort")]
    UserAbort,

    /// An unrecoverable script condition.
    #[error("{0}")]
    Fatal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Convenience result alias for output plugins.
pub type OutputResult<T> = Result<T, OutputError>;

impl OutputError {
    /// Error for a non-successful call result; `None` on success.
    pub fn from_call(result: &CallResult) -> Option<Self> {
        match result.severity() {
            Severity::Success => None,
            Severity::RecoverableFailure => Some(OutputError::Failure(result.describe())),
            Severity::UserAbort => Some(OutputError::UserAbort),
            Severity::FatalError => Some(OutputError::Fatal(result.describe())),
        }
    }

    /// Whether this error ends the driver loop.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OutputError::Failure(_))
    }
}

impl From<serde_json::Error> for OutputError {
    fn from(err: serde_json::Error) -> Self {
        OutputError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for OutputError {
    fn from(err: serde_yaml::Error) -> Self {
        OutputError::Config(err.to_string())
    }
}

impl From<toml::de::Error> for OutputError {
    fn from(err: toml::de::Error) -> Self {
        OutputError::Config(err.to_string())
    }
}
