//! Sandpipe 沙箱运行时
//! Sandpipe sandbox runtime.
//!
//! Runs untrusted Rhai scripts inside a long-lived host process:
//!
//! - **[`instance`]** -- [`SandboxInstance`] loads one script with a confined
//!   module path and exposes the optional `process_message` / `timer_event`
//!   entry points.
//! - **[`result`]** -- [`CallResult`] is what every invocation returns; no
//!   interpreter fault escapes past it.
//! - **[`severity`]** -- [`classify`] maps a `(status, detail)` pair onto a
//!   [`Severity`].
//! - **[`config`]** -- [`ScriptSecurityConfig`] and [`LoadOptions`].
//! - **[`message`]** -- [`Message`], read by scripts through `read_message`.
//!
//! A script looks like:
//!
//! ```rhai
//! let written = 0;              // private, persistent state: `this.written`
//!
//! fn process_message() {
//!     let payload = read_message("Payload");
//!     if payload == "" { return [-1, "empty payload"]; }
//!     append_file("out.log", payload);
//!     this.written += 1;
//!     0
//! }
//!
//! fn timer_event(ns) {
//!     log("written so far: " + this.written);
//! }
//! ```

pub mod config;
pub mod convert;
pub mod error;
mod host;
pub mod instance;
pub mod message;
pub mod resolver;
pub mod result;
pub mod severity;

pub use config::{LoadOptions, ScriptSecurityConfig};
pub use error::{LoadError, LoadResult};
pub use instance::{EntryPoints, PROCESS_MESSAGE, SandboxInstance, TIMER_EVENT};
pub use message::Message;
pub use resolver::ConfinedModuleResolver;
pub use result::CallResult;
pub use severity::{FATAL_PREFIX, Severity, USER_ABORT_SENTINEL, classify};
