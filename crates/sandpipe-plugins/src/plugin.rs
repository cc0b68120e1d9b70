//! 输出插件 trait 与驱动生命周期
//! Output plugin trait and driver lifecycle.

use crate::error::OutputResult;
use crate::runner::OutputRunner;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 运行结束的方式
/// How a finished run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// 消息源已关闭
    /// The message source closed.
    Clean,
    /// 终止性脚本结果结束了循环
    /// A terminal script result ended the loop.
    Errored,
}

/// 输出插件生命周期
/// Lifecycle of an output plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverState {
    Created,
    Initialized,
    Running,
    Terminated(Termination),
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverState::Created => write!(f, "created"),
            DriverState::Initialized => write!(f, "initialized"),
            DriverState::Running => write!(f, "running"),
            DriverState::Terminated(Termination::Clean) => write!(f, "terminated"),
            DriverState::Terminated(Termination::Errored) => write!(f, "terminated (error)"),
        }
    }
}

/// 由宿主管道驱动的输出阶段
/// An output stage driven by the host pipeline.
///
/// The host obtains a default configuration with `config_struct`, fills it
/// in, calls `init` once and then `run` once. `run` returns `Ok` when the
/// message source closes and `Err` when processing ends abnormally.
#[async_trait]
pub trait OutputPlugin: Send {
    type Config: Send;

    fn config_struct(&self) -> Self::Config;

    fn init(&mut self, config: Self::Config) -> OutputResult<()>;

    async fn run(&mut self, runner: OutputRunner) -> OutputResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_display_and_serde() {
        assert_eq!(DriverState::Running.to_string(), "running");
        assert_eq!(
            DriverState::Terminated(Termination::Errored).to_string(),
            "terminated (error)"
        );
        let json = serde_json::to_string(&DriverState::Terminated(Termination::Clean)).unwrap();
        assert_eq!(json, r#"{"terminated":"clean"}"#);
    }
}
