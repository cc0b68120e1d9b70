//! 授予脚本的宿主函数
//! Host functions granted to scripts.
//!
//! This is the whole capability surface: message access, script parameters,
//! confined file output, logging, and the abort request. Nothing else from
//! the host process is reachable from a script.

use crate::config::LoadOptions;
use crate::convert::json_to_dynamic;
use crate::message::Message;
use crate::resolver::is_confined_path;
use crate::result::{CapabilityDenied, UserAbort, raise};
use parking_lot::Mutex;
use rhai::{Dynamic, Engine, EvalAltResult, Map};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Message visible to `read_message` for the duration of one call.
pub(crate) type MessageSlot = Arc<Mutex<Option<Message>>>;

/// 在引擎上注册能力接口
/// Register the capability surface on `engine`.
pub(crate) fn register_host_functions(
    engine: &mut Engine,
    plugin: &str,
    options: &LoadOptions,
    slot: MessageSlot,
) {
    register_logging(engine, plugin);

    engine.register_fn("read_message", move |name: &str| -> Dynamic {
        slot.lock()
            .as_ref()
            .map(|msg| msg.lookup(name))
            .unwrap_or(Dynamic::UNIT)
    });

    let mut params = Map::new();
    for (k, v) in &options.params {
        params.insert(k.as_str().into(), json_to_dynamic(v));
    }
    let params = Arc::new(params);
    engine.register_fn("read_config", move |name: &str| -> Dynamic {
        params.get(name).cloned().unwrap_or(Dynamic::UNIT)
    });

    engine.register_fn("abort", || -> Result<(), Box<EvalAltResult>> {
        Err(raise(UserAbort))
    });

    engine.register_fn("now_ns", || -> i64 {
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
    });

    let output = FileOutput::new(options);
    let append = output.clone();
    engine.register_fn(
        "write_file",
        move |name: &str, data: &str| -> Result<(), Box<EvalAltResult>> {
            output.write(name, data, false)
        },
    );
    engine.register_fn(
        "append_file",
        move |name: &str, data: &str| -> Result<(), Box<EvalAltResult>> {
            append.write(name, data, true)
        },
    );
}

fn register_logging(engine: &mut Engine, plugin: &str) {
    let name = plugin.to_string();
    engine.on_print(move |msg| info!(plugin = %name, "{msg}"));

    let name = plugin.to_string();
    engine.on_debug(move |msg, _source, pos| debug!(plugin = %name, %pos, "{msg}"));

    let name = plugin.to_string();
    engine.register_fn("log", move |msg: &str| info!(plugin = %name, "{msg}"));

    let name = plugin.to_string();
    engine.register_fn("warn", move |msg: &str| warn!(plugin = %name, "{msg}"));

    let name = plugin.to_string();
    engine.register_fn("error", move |msg: &str| error!(plugin = %name, "{msg}"));
}

// ============================================================================
// 受限文件输出
// Confined file output
// ============================================================================

#[derive(Debug, Clone)]
struct FileOutput {
    dir: Option<PathBuf>,
    allowed: bool,
    max_size: usize,
}

impl FileOutput {
    fn new(options: &LoadOptions) -> Self {
        Self {
            dir: options.output_dir.clone(),
            allowed: options.security.allow_file_operations,
            max_size: options.security.max_string_size,
        }
    }

    fn target(&self, name: &str) -> Result<PathBuf, Box<EvalAltResult>> {
        if !self.allowed {
            return Err(raise(CapabilityDenied("file operations are not granted".into())));
        }
        let Some(dir) = &self.dir else {
            return Err(raise(CapabilityDenied("no output directory configured".into())));
        };
        if !is_confined_path(name) {
            return Err(raise(CapabilityDenied(format!(
                "'{name}' is outside the output directory"
            ))));
        }
        Ok(dir.join(Path::new(name)))
    }

    fn write(&self, name: &str, data: &str, append: bool) -> Result<(), Box<EvalAltResult>> {
        let path = self.target(name)?;
        if self.max_size > 0 && data.len() > self.max_size {
            return Err(format!(
                "output of {} bytes exceeds the {} byte limit",
                data.len(),
                self.max_size
            )
            .into());
        }
        let result = if append {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .and_then(|mut f| f.write_all(data.as_bytes()))
        } else {
            std::fs::write(&path, data)
        };
        result.map_err(|e| format!("cannot write '{name}': {e}").into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScriptSecurityConfig;

    fn options(dir: &Path, allowed: bool) -> LoadOptions {
        LoadOptions::new()
            .with_output_dir(dir)
            .with_security(ScriptSecurityConfig::new().with_allow_file_operations(allowed))
    }

    #[test]
    fn write_inside_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let out = FileOutput::new(&options(dir.path(), true));
        out.write("a.txt", "one", false).unwrap();
        out.write("a.txt", "two", true).unwrap();
        let contents = std::fs::read_to_string(dir.path().join("a.txt")).unwrap();
        assert_eq!(contents, "onetwo");
    }

    #[test]
    fn write_denied_without_grant() {
        let dir = tempfile::tempdir().unwrap();
        let out = FileOutput::new(&options(dir.path(), false));
        let err = out.write("a.txt", "x", false).unwrap_err();
        assert!(matches!(*err, EvalAltResult::ErrorRuntime(ref v, _) if v.is::<CapabilityDenied>()));
        assert!(!dir.path().join("a.txt").exists());
    }

    #[test]
    fn write_outside_dir_is_denied() {
        let dir = tempfile::tempdir().unwrap();
        let out = FileOutput::new(&options(dir.path(), true));
        assert!(out.write("../escape.txt", "x", false).is_err());
        assert!(out.write("/tmp/escape.txt", "x", false).is_err());
    }

    #[test]
    fn oversized_write_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = options(dir.path(), true);
        opts.security.max_string_size = 4;
        let out = FileOutput::new(&opts);
        assert!(out.write("a.txt", "too long", false).is_err());
    }
}
