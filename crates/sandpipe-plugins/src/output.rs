//! Sandboxed output driver.
//!
//! [`SandboxOutput`] owns one [`SandboxInstance`] and feeds it messages and
//! timer ticks from a single `tokio::select!` loop. Every result is
//! classified: recoverable failures are counted and reported, terminal ones
//! are reported and end the loop.

use crate::config::SandboxOutputConfig;
use crate::error::{OutputError, OutputResult};
use crate::metrics::{MetricsSnapshot, ProcessMetrics};
use crate::plugin::{DriverState, OutputPlugin, Termination};
use crate::runner::{ErrorSink, OutputRunner, spawn_ticker};
use async_trait::async_trait;
use rand::Rng;
use sandpipe_sandbox::{EntryPoints, Message, PROCESS_MESSAGE, SandboxInstance};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Serializable status of a [`SandboxOutput`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputReport {
    pub name: String,
    pub state: DriverState,
    pub metrics: MetricsSnapshot,
    pub avg_duration_ns: u64,
    pub peak_operations: u64,
    pub entry_points: Option<EntryPoints>,
}

/// Output plugin running a sandboxed script.
#[derive(Debug)]
pub struct SandboxOutput {
    config: SandboxOutputConfig,
    instance: Option<SandboxInstance>,
    metrics: Arc<ProcessMetrics>,
    state: DriverState,
}

/// What the loop does after one event.
enum Flow {
    Continue,
    Stop(OutputError),
}

impl Default for SandboxOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl SandboxOutput {
    pub fn new() -> Self {
        Self {
            config: SandboxOutputConfig::default(),
            instance: None,
            metrics: Arc::new(ProcessMetrics::new()),
            state: DriverState::Created,
        }
    }

    /// Shared handle to the counters; valid while `run` is in progress.
    ///
    /// `init` replaces the counters, so fetch the handle after it.
    pub fn metrics(&self) -> Arc<ProcessMetrics> {
        self.metrics.clone()
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn config(&self) -> &SandboxOutputConfig {
        &self.config
    }

    pub fn instance(&self) -> Option<&SandboxInstance> {
        self.instance.as_ref()
    }

    pub fn report(&self) -> OutputReport {
        let metrics = self.metrics.snapshot();
        OutputReport {
            name: self.config.instance_name(),
            state: self.state,
            avg_duration_ns: metrics.avg_duration_ns(),
            metrics,
            peak_operations: self.instance.as_ref().map_or(0, |i| i.peak_operations()),
            entry_points: self.instance.as_ref().map(|i| i.entry_points()),
        }
    }

    /// Write the instance state to the preserved-state file.
    fn preserve(&self) -> OutputResult<()> {
        let Some(instance) = &self.instance else {
            return Ok(());
        };
        let path = self.config.state_file();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(&instance.state_snapshot())?;
        std::fs::write(&path, json)?;
        info!(plugin = %instance.name(), path = %path.display(), "state preserved");
        Ok(())
    }

    fn restore(config: &SandboxOutputConfig, instance: &mut SandboxInstance) -> OutputResult<()> {
        let path = config.state_file();
        if !path.exists() {
            return Ok(());
        }
        let text = std::fs::read_to_string(&path)?;
        let snapshot: serde_json::Value = serde_json::from_str(&text)?;
        instance.restore_state(&snapshot)?;
        info!(plugin = %instance.name(), path = %path.display(), "state restored");
        Ok(())
    }
}

#[async_trait]
impl OutputPlugin for SandboxOutput {
    type Config = SandboxOutputConfig;

    fn config_struct(&self) -> SandboxOutputConfig {
        SandboxOutputConfig::default()
    }

    fn init(&mut self, config: SandboxOutputConfig) -> OutputResult<()> {
        config.validate()?;
        let mut instance = SandboxInstance::load(
            &config.script_filename,
            config.module_dir(),
            &config.load_options(),
        )?;
        if !instance.entry_points().has_process_message() {
            return Err(OutputError::MissingEntryPoint {
                script: config.script_filename.display().to_string(),
                entry: PROCESS_MESSAGE,
            });
        }
        if config.preserve_data {
            Self::restore(&config, &mut instance)?;
        }

        self.instance = Some(instance);
        self.config = config;
        self.metrics = Arc::new(ProcessMetrics::new());
        self.state = DriverState::Initialized;
        Ok(())
    }

    async fn run(&mut self, runner: OutputRunner) -> OutputResult<()> {
        if self.state != DriverState::Initialized {
            return Err(OutputError::NotInitialized);
        }
        let Some(instance) = self.instance.as_mut() else {
            return Err(OutputError::NotInitialized);
        };

        let OutputRunner {
            mut in_chan,
            ticker,
            sink,
        } = runner;
        let mut ticks = ticker.or_else(|| match self.config.ticker_interval {
            0 => None,
            secs => Some(spawn_ticker(Duration::from_secs(secs))),
        });
        let mut ticks_open = ticks.is_some();
        let sampler = Sampler::new(self.config.sample_denominator);
        let metrics = self.metrics.clone();

        self.state = DriverState::Running;
        info!(plugin = %instance.name(), ticker = ticks_open, "output running");

        let outcome = loop {
            let flow = tokio::select! {
                msg = in_chan.recv() => match msg {
                    Some(msg) => on_message(instance, &msg, &metrics, &sampler, sink.as_ref()),
                    None => break None,
                },
                tick = next_tick(&mut ticks), if ticks_open => match tick {
                    Some(now) => on_tick(instance, now, sink.as_ref()),
                    None => {
                        debug!(plugin = %instance.name(), "ticker closed");
                        ticks_open = false;
                        Flow::Continue
                    }
                },
            };
            if let Flow::Stop(err) = flow {
                break Some(err);
            }
        };

        if let Some(err) = outcome {
            self.state = DriverState::Terminated(Termination::Errored);
            warn!(plugin = %self.config.instance_name(), error = %err, "output stopped");
            return Err(err);
        }

        if self.config.preserve_data {
            if let Err(err) = self.preserve() {
                sink.log_error(&err);
                self.state = DriverState::Terminated(Termination::Errored);
                return Err(err);
            }
        }
        self.state = DriverState::Terminated(Termination::Clean);
        info!(plugin = %self.config.instance_name(), "message source closed");
        Ok(())
    }
}

/// Decides which successful calls are timed.
struct Sampler {
    denominator: u32,
}

impl Sampler {
    fn new(denominator: u32) -> Self {
        Self {
            denominator: denominator.max(1),
        }
    }

    fn sample(&self, attempt: u64) -> bool {
        attempt == 1 || self.denominator == 1 || rand::thread_rng().gen_ratio(1, self.denominator)
    }
}

async fn next_tick(ticks: &mut Option<mpsc::Receiver<SystemTime>>) -> Option<SystemTime> {
    match ticks {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn on_message(
    instance: &mut SandboxInstance,
    msg: &Message,
    metrics: &ProcessMetrics,
    sampler: &Sampler,
    sink: &dyn ErrorSink,
) -> Flow {
    let started = Instant::now();
    let result = instance.process_message(msg);
    let elapsed = started.elapsed();
    let attempt = metrics.record_attempt();

    match OutputError::from_call(&result) {
        None => {
            if sampler.sample(attempt) {
                metrics.record_sample(elapsed.max(Duration::from_nanos(1)));
            }
            Flow::Continue
        }
        Some(err) if !err.is_terminal() => {
            metrics.record_failure();
            sink.log_error(&err);
            Flow::Continue
        }
        Some(err) => {
            sink.log_error(&err);
            Flow::Stop(err)
        }
    }
}

fn on_tick(instance: &mut SandboxInstance, now: SystemTime, sink: &dyn ErrorSink) -> Flow {
    if !instance.entry_points().has_timer_event() {
        debug!(plugin = %instance.name(), "tick ignored, no timer_event");
        return Flow::Continue;
    }
    match OutputError::from_call(&instance.timer_event(now)) {
        None => Flow::Continue,
        Some(err) => {
            sink.log_error(&err);
            if err.is_terminal() {
                Flow::Stop(err)
            } else {
                Flow::Continue
            }
        }
    }
}
