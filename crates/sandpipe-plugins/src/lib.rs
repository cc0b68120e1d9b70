//! Sandpipe 插件
//! Sandpipe plugins.
//!
//! The output side of the pipeline: [`SandboxOutput`] drives a
//! [`sandpipe_sandbox::SandboxInstance`] from an inbound message queue and an
//! optional ticker, classifies every result and keeps [`ProcessMetrics`].
//!
//! ```no_run
//! use sandpipe_plugins::{OutputPlugin, OutputRunner, SandboxOutput, SandboxOutputConfig, TracingErrorSink};
//! use sandpipe_sandbox::Message;
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//!
//! # async fn demo() -> sandpipe_plugins::OutputResult<()> {
//! let mut output = SandboxOutput::new();
//! output.init(
//!     SandboxOutputConfig::new("scripts/file_output.rhai")
//!         .with_output_directory("/var/spool/sandpipe")
//!         .with_ticker_interval(60),
//! )?;
//!
//! let (tx, rx) = mpsc::channel(64);
//! tx.send(Message::with_payload("hello")).await.ok();
//! drop(tx);
//!
//! output
//!     .run(OutputRunner::new(rx, Arc::new(TracingErrorSink::new("file_output"))))
//!     .await
//! # }
//! ```

pub mod config;
pub mod error;
pub mod metrics;
pub mod output;
pub mod plugin;
pub mod runner;

pub use config::SandboxOutputConfig;
pub use error::{OutputError, OutputResult};
pub use metrics::{MetricsSnapshot, ProcessMetrics};
pub use output::{OutputReport, SandboxOutput};
pub use plugin::{DriverState, OutputPlugin, Termination};
pub use runner::{ErrorSink, OutputRunner, TracingErrorSink, spawn_ticker};
