//! Sandbox output configuration.

use crate::error::{OutputError, OutputResult};
use sandpipe_sandbox::{LoadOptions, ScriptSecurityConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

/// Configuration of one sandboxed output plugin.
///
/// Every field has a default, so partial YAML/JSON/TOML documents are valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxOutputConfig {
    /// Instance name used in logs and for the preserved-state file.
    /// Defaults to the script's file stem.
    pub name: Option<String>,
    pub script_filename: PathBuf,
    /// The only directory `import` may resolve into.
    pub module_directory: PathBuf,
    /// Seconds between `timer_event` calls; 0 disables the ticker.
    pub ticker_interval: u64,
    /// Directory granted to `write_file`/`append_file`.
    pub output_directory: Option<PathBuf>,
    /// Save the script state on clean shutdown and restore it on init.
    pub preserve_data: bool,
    pub state_directory: PathBuf,
    /// Time one in N successful calls. 1 samples every call.
    pub sample_denominator: u32,
    pub security: ScriptSecurityConfig,
    /// Script parameters, read with `read_config(name)`.
    pub config: BTreeMap<String, serde_json::Value>,
}

impl Default for SandboxOutputConfig {
    fn default() -> Self {
        Self {
            name: None,
            script_filename: PathBuf::new(),
            module_directory: PathBuf::from("modules"),
            ticker_interval: 0,
            output_directory: None,
            preserve_data: false,
            state_directory: PathBuf::from("sandbox_preservation"),
            sample_denominator: 1,
            security: ScriptSecurityConfig::default(),
            config: BTreeMap::new(),
        }
    }
}

impl SandboxOutputConfig {
    pub fn new(script_filename: impl Into<PathBuf>) -> Self {
        Self {
            script_filename: script_filename.into(),
            ..Default::default()
        }
    }

    pub fn from_yaml_str(text: &str) -> OutputResult<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_json_str(text: &str) -> OutputResult<Self> {
        serde_json::from_str(text).map_err(|e| OutputError::Config(e.to_string()))
    }

    pub fn from_toml_str(text: &str) -> OutputResult<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_module_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.module_directory = dir.into();
        self
    }

    pub fn with_ticker_interval(mut self, secs: u64) -> Self {
        self.ticker_interval = secs;
        self
    }

    /// Grant file output into `dir`.
    pub fn with_output_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_directory = Some(dir.into());
        self.security.allow_file_operations = true;
        self
    }

    pub fn with_preserve_data(mut self, state_directory: impl Into<PathBuf>) -> Self {
        self.preserve_data = true;
        self.state_directory = state_directory.into();
        self
    }

    pub fn with_sample_denominator(mut self, n: u32) -> Self {
        self.sample_denominator = n;
        self
    }

    pub fn with_security(mut self, security: ScriptSecurityConfig) -> Self {
        self.security = security;
        self
    }

    pub fn with_param<T: Into<serde_json::Value>>(mut self, key: &str, value: T) -> Self {
        self.config.insert(key.to_string(), value.into());
        self
    }

    /// Instance name: the configured one or the script's file stem.
    pub fn instance_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| {
            self.script_filename
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("sandbox_output")
                .to_string()
        })
    }

    /// Path of the preserved-state file.
    pub fn state_file(&self) -> PathBuf {
        self.state_directory
            .join(format!("{}.data.json", self.instance_name()))
    }

    pub fn validate(&self) -> OutputResult<()> {
        if self.script_filename.as_os_str().is_empty() {
            return Err(OutputError::Config("script_filename is required".into()));
        }
        if let Some(name) = &self.name {
            let mut parts = Path::new(name).components();
            if !matches!((parts.next(), parts.next()), (Some(Component::Normal(_)), None)) {
                return Err(OutputError::Config(format!(
                    "name '{name}' must be a plain file name"
                )));
            }
        }
        if self.sample_denominator == 0 {
            return Err(OutputError::Config(
                "sample_denominator must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn load_options(&self) -> LoadOptions {
        LoadOptions {
            name: Some(self.instance_name()),
            security: self.security.clone(),
            output_dir: self.output_directory.clone(),
            params: self.config.clone(),
        }
    }

    pub(crate) fn module_dir(&self) -> &Path {
        &self.module_directory
    }
}
