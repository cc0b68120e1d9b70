//! Host-side plumbing handed to a running output plugin.
//!
//! [`OutputRunner`] bundles the inbound message queue, the optional ticker
//! and the [`ErrorSink`]. Without an explicit ticker the driver spawns one
//! from its configured interval. The host owns the sending ends: dropping the
//! message sender is how it signals end of input.

use crate::error::OutputError;
use sandpipe_sandbox::Message;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

/// Receives every error an output reports while it runs.
pub trait ErrorSink: Send + Sync {
    fn log_error(&self, err: &OutputError);
}

/// Error sink that writes to `tracing`.
#[derive(Debug, Clone)]
pub struct TracingErrorSink {
    plugin: String,
}

impl TracingErrorSink {
    pub fn new(plugin: &str) -> Self {
        Self {
            plugin: plugin.to_string(),
        }
    }
}

impl ErrorSink for TracingErrorSink {
    fn log_error(&self, err: &OutputError) {
        if err.is_terminal() {
            tracing::error!(plugin = %self.plugin, error = %err, "output terminated");
        } else {
            tracing::warn!(plugin = %self.plugin, error = %err, "message processing failed");
        }
    }
}

/// Event sources and error sink for one `run`.
pub struct OutputRunner {
    pub(crate) in_chan: mpsc::Receiver<Message>,
    pub(crate) ticker: Option<mpsc::Receiver<SystemTime>>,
    pub(crate) sink: Arc<dyn ErrorSink>,
}

impl OutputRunner {
    pub fn new(in_chan: mpsc::Receiver<Message>, sink: Arc<dyn ErrorSink>) -> Self {
        Self {
            in_chan,
            ticker: None,
            sink,
        }
    }

    pub fn with_ticker(mut self, ticker: mpsc::Receiver<SystemTime>) -> Self {
        self.ticker = Some(ticker);
        self
    }

    pub fn sink(&self) -> &Arc<dyn ErrorSink> {
        &self.sink
    }
}

/// Spawn a task sending the wall-clock time every `period`.
///
/// The first tick arrives after one full period. The task exits once the
/// receiver is dropped. Must be called inside a tokio runtime.
pub fn spawn_ticker(period: Duration) -> mpsc::Receiver<SystemTime> {
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if tx.send(SystemTime::now()).await.is_err() {
                break;
            }
        }
    });
    rx
}
