//! Entry-point call results and fault conversion.
//!
//! Everything the interpreter can raise during an invocation is turned into a
//! [`CallResult`] here. Nothing past this boundary sees an `EvalAltResult`.

use crate::severity::{FATAL_PREFIX, Severity, USER_ABORT_SENTINEL, classify};
use rhai::{Dynamic, EvalAltResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of one entry-point invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallResult {
    /// 0 on success, negative on recoverable failure.
    pub status: i64,
    /// Failure message, possibly carrying a `FATAL:` sentinel.
    pub detail: Option<String>,
}

impl CallResult {
    pub fn success() -> Self {
        Self {
            status: 0,
            detail: None,
        }
    }

    pub fn failure(status: i64, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: Some(detail.into()),
        }
    }

    pub fn user_abort() -> Self {
        Self::failure(-1, USER_ABORT_SENTINEL)
    }

    /// A fatal result attributed to `entry`.
    pub fn fatal(entry: &str, message: impl fmt::Display) -> Self {
        Self::failure(-1, format!("{FATAL_PREFIX} {entry}() {message}"))
    }

    pub fn severity(&self) -> Severity {
        classify(self.status, self.detail.as_deref())
    }

    pub fn is_success(&self) -> bool {
        self.severity() == Severity::Success
    }

    /// Detail text for reporting, synthesised when the script gave none.
    pub fn describe(&self) -> String {
        match &self.detail {
            Some(detail) => detail.clone(),
            None => format!("status {}", self.status),
        }
    }

    /// Interpret an entry point's return value.
    ///
    /// Accepted shapes are `()`, an integer status, and `[status]` or
    /// `[status, detail]`.
    pub(crate) fn from_return(entry: &str, value: Dynamic) -> Self {
        if value.is_unit() {
            return Self::success();
        }
        if let Ok(status) = value.as_int() {
            return Self {
                status,
                detail: None,
            };
        }
        if value.is_array() {
            let Ok(items) = value.into_array() else {
                return Self::fatal(entry, "must return a numeric status code");
            };
            let mut items = items.into_iter();
            let status = match items.next().map(|v| v.as_int()) {
                Some(Ok(status)) => status,
                _ => return Self::fatal(entry, "must return a numeric status code"),
            };
            let detail = match items.next() {
                None => None,
                Some(d) if d.is_unit() => None,
                Some(d) if d.is_string() => d.into_string().ok(),
                Some(d) => Some(d.to_string()),
            };
            return Self { status, detail };
        }
        Self::fatal(entry, "must return a numeric status code")
    }

    /// Convert an interpreter fault raised while running `entry`.
    pub(crate) fn from_fault(entry: &str, err: &EvalAltResult) -> Self {
        match root_cause(err) {
            EvalAltResult::ErrorRuntime(value, _) if value.is::<UserAbort>() => Self::user_abort(),
            EvalAltResult::ErrorRuntime(value, _) if value.is::<CapabilityDenied>() => {
                let denied = value.clone().cast::<CapabilityDenied>();
                Self::fatal(entry, denied)
            }
            EvalAltResult::ErrorRuntime(value, _) => Self::fatal(entry, value),
            EvalAltResult::ErrorTooManyOperations(_) => {
                Self::fatal(entry, "instruction limit exceeded")
            }
            EvalAltResult::ErrorTerminated(token, _) if token.is::<ExecutionTimeout>() => {
                Self::fatal(entry, "execution time limit exceeded")
            }
            other => Self::fatal(entry, other),
        }
    }
}

impl fmt::Display for CallResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "status {}: {}", self.status, detail),
            None => write!(f, "status {}", self.status),
        }
    }
}

/// Strip the function-call and module wrappers Rhai puts around a fault.
pub(crate) fn root_cause(err: &EvalAltResult) -> &EvalAltResult {
    match err {
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => root_cause(inner),
        EvalAltResult::ErrorInModule(_, inner, _) => root_cause(inner),
        other => other,
    }
}

// ============================================================================
// Fault tokens raised by host functions
// ============================================================================

/// Raised by the `abort()` host function.
#[derive(Debug, Clone, Copy)]
pub(crate) struct UserAbort;

/// Raised when a script reaches for something it was not granted.
#[derive(Debug, Clone)]
pub(crate) struct CapabilityDenied(pub String);

impl fmt::Display for CapabilityDenied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "capability denied: {}", self.0)
    }
}

/// Termination token returned by the progress callback when the wall-clock
/// budget runs out.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ExecutionTimeout;

pub(crate) fn raise<T: Clone + Send + Sync + 'static>(token: T) -> Box<EvalAltResult> {
    EvalAltResult::ErrorRuntime(Dynamic::from(token), rhai::Position::NONE).into()
}
