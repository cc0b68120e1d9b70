//! 沙箱限制与加载选项
//! Sandbox limits and load options.
//!
//! [`ScriptSecurityConfig`] bounds what a single invocation may consume.
//! [`LoadOptions`] carries everything else a [`SandboxInstance`] needs at load
//! time besides the script and module paths.
//!
//! [`SandboxInstance`]: crate::SandboxInstance

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// 每次脚本调用的资源限制与权限
/// Resource limits and permissions applied to every script invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptSecurityConfig {
    /// 每次调用的最大执行时间（毫秒），0 表示不限制
    /// Maximum wall-clock time per invocation, in milliseconds. 0 disables it.
    pub max_execution_time_ms: u64,
    /// 最大调用栈深度
    /// Maximum function call depth.
    pub max_call_stack_depth: usize,
    /// 每次调用的最大运算次数，0 表示不限制
    /// Maximum interpreter operations per invocation. 0 disables it.
    pub max_operations: u64,
    /// 最大数组大小
    /// Maximum array length.
    pub max_array_size: usize,
    /// 最大映射大小
    /// Maximum map size.
    pub max_map_size: usize,
    /// 最大字符串长度，同时限制单次输出写入
    /// Maximum string length, which also bounds a single output write.
    pub max_string_size: usize,
    /// 最大导入模块数
    /// Maximum number of modules a script may import.
    pub max_modules: usize,
    /// 是否允许循环
    /// Whether `loop`/`while`/`for` are permitted.
    pub allow_loops: bool,
    /// 是否允许文件操作
    /// Whether `write_file`/`append_file` are granted.
    pub allow_file_operations: bool,
}

impl Default for ScriptSecurityConfig {
    fn default() -> Self {
        Self {
            max_execution_time_ms: 5000,
            max_call_stack_depth: 64,
            max_operations: 1_000_000,
            max_array_size: 10_000,
            max_map_size: 10_000,
            max_string_size: 1_000_000,
            max_modules: 16,
            allow_loops: true,
            allow_file_operations: false,
        }
    }
}

impl ScriptSecurityConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_operations(mut self, ops: u64) -> Self {
        self.max_operations = ops;
        self
    }

    pub fn with_max_execution_time_ms(mut self, ms: u64) -> Self {
        self.max_execution_time_ms = ms;
        self
    }

    pub fn with_max_string_size(mut self, size: usize) -> Self {
        self.max_string_size = size;
        self
    }

    pub fn with_allow_loops(mut self, allow: bool) -> Self {
        self.allow_loops = allow;
        self
    }

    pub fn with_allow_file_operations(mut self, allow: bool) -> Self {
        self.allow_file_operations = allow;
        self
    }
}

/// 脚本加载选项
/// Options for [`SandboxInstance::load`](crate::SandboxInstance::load).
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Name used in log records. Defaults to the script's file stem.
    pub name: Option<String>,
    pub security: ScriptSecurityConfig,
    /// Directory `write_file`/`append_file` are confined to.
    pub output_dir: Option<PathBuf>,
    /// Script parameters exposed through `read_config(name)`.
    pub params: BTreeMap<String, serde_json::Value>,
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_security(mut self, security: ScriptSecurityConfig) -> Self {
        self.security = security;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn with_param<T: Into<serde_json::Value>>(mut self, key: &str, value: T) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }
}
