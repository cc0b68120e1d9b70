//! Severity classification of entry-point outcomes.
//!
//! A sentinel prefix in the detail string always wins over the numeric
//! status. Anything unrecognised with a non-zero status is a recoverable
//! failure, never a fatal one.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Detail text a script produces to request termination.
pub const USER_ABORT_SENTINEL: &str = "FATAL: user abort";

/// Prefix marking an unrecoverable condition.
pub const FATAL_PREFIX: &str = "FATAL:";

/// Outcome class of a single entry-point invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Success,
    RecoverableFailure,
    UserAbort,
    FatalError,
}

impl Severity {
    /// Whether this severity stops the driver loop.
    pub fn is_terminal(self) -> bool {
        matches!(self, Severity::UserAbort | Severity::FatalError)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Success => "success",
            Severity::RecoverableFailure => "recoverable_failure",
            Severity::UserAbort => "user_abort",
            Severity::FatalError => "fatal_error",
        };
        f.write_str(name)
    }
}

/// Classify a `(status, detail)` pair.
pub fn classify(status: i64, detail: Option<&str>) -> Severity {
    match detail {
        Some(d) if d.starts_with(USER_ABORT_SENTINEL) => Severity::UserAbort,
        Some(d) if d.starts_with(FATAL_PREFIX) => Severity::FatalError,
        _ if status == 0 => Severity::Success,
        _ => Severity::RecoverableFailure,
    }
}
