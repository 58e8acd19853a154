//! Core types for environment bootstrap.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::log_buffer::LogBuffer;

/// One of the two managed tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tool {
    #[serde(rename = "toolA")]
    A,
    #[serde(rename = "toolB")]
    B,
}

impl Tool {
    /// Both tools, in install order.
    pub const ALL: [Tool; 2] = [Tool::A, Tool::B];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tool::A => "toolA",
            Tool::B => "toolB",
        }
    }

    pub fn check_stage(&self) -> Stage {
        match self {
            Tool::A => Stage::CheckToolA,
            Tool::B => Stage::CheckToolB,
        }
    }

    pub fn start_install_stage(&self) -> Stage {
        match self {
            Tool::A => Stage::StartInstallToolA,
            Tool::B => Stage::StartInstallToolB,
        }
    }

    pub fn installing_stage(&self) -> Stage {
        match self {
            Tool::A => Stage::InstallingToolA,
            Tool::B => Stage::InstallingToolB,
        }
    }

    pub fn source(&self) -> LogSource {
        match self {
            Tool::A => LogSource::ToolA,
            Tool::B => LogSource::ToolB,
        }
    }
}

impl std::fmt::Display for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named point in the bootstrap state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Stage {
    #[default]
    #[serde(rename = "idle")]
    Idle,
    #[serde(rename = "start-check")]
    StartCheck,
    #[serde(rename = "check-toolA")]
    CheckToolA,
    #[serde(rename = "check-toolB")]
    CheckToolB,
    #[serde(rename = "no-need-install")]
    NoNeedInstall,
    #[serde(rename = "need-install")]
    NeedInstall,
    #[serde(rename = "start-install-toolA")]
    StartInstallToolA,
    #[serde(rename = "installing-toolA")]
    InstallingToolA,
    #[serde(rename = "start-install-toolB")]
    StartInstallToolB,
    #[serde(rename = "installing-toolB")]
    InstallingToolB,
    #[serde(rename = "env-ready")]
    EnvReady,
    #[serde(rename = "failed")]
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::StartCheck => "start-check",
            Stage::CheckToolA => "check-toolA",
            Stage::CheckToolB => "check-toolB",
            Stage::NoNeedInstall => "no-need-install",
            Stage::NeedInstall => "need-install",
            Stage::StartInstallToolA => "start-install-toolA",
            Stage::InstallingToolA => "installing-toolA",
            Stage::StartInstallToolB => "start-install-toolB",
            Stage::InstallingToolB => "installing-toolB",
            Stage::EnvReady => "env-ready",
            Stage::Failed => "failed",
        }
    }

    /// `env-ready` and `failed` end a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::EnvReady | Stage::Failed)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// Which sub-process or phase produced a log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogSource {
    #[serde(rename = "toolA")]
    ToolA,
    #[serde(rename = "toolB")]
    ToolB,
    #[serde(rename = "system")]
    System,
}

/// A single log line. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<LogSource>,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>, source: Option<LogSource>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            source,
        }
    }
}

/// Everything an observer needs to diagnose a failed run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureDetail {
    /// Human-readable cause
    pub message: String,
    /// The exact invocation that failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Last 4000 characters of captured stderr
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr_tail: Option<String>,
    /// Last 4000 characters of captured stdout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout_tail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl FailureDetail {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }
}

/// Snapshot of the bootstrap state machine.
///
/// Invariants: `done` implies exactly one of `failed` or both tools installed;
/// `installing` implies `!done`; `error` is present iff `failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapState {
    pub stage: Stage,
    #[serde(rename = "toolAInstalled")]
    pub tool_a_installed: bool,
    #[serde(rename = "toolBInstalled")]
    pub tool_b_installed: bool,
    pub installing: bool,
    pub done: bool,
    pub failed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureDetail>,
    pub logs: LogBuffer,
    pub updated_at: DateTime<Utc>,
}

impl Default for BootstrapState {
    fn default() -> Self {
        Self {
            stage: Stage::Idle,
            tool_a_installed: false,
            tool_b_installed: false,
            installing: false,
            done: false,
            failed: false,
            error: None,
            logs: LogBuffer::default(),
            updated_at: Utc::now(),
        }
    }
}

impl BootstrapState {
    /// Terminal, not failed, and both tools present.
    pub fn is_ready(&self) -> bool {
        self.done && !self.failed && self.tool_a_installed && self.tool_b_installed
    }

    pub fn is_installed(&self, tool: Tool) -> bool {
        match tool {
            Tool::A => self.tool_a_installed,
            Tool::B => self.tool_b_installed,
        }
    }

    pub(crate) fn set_installed(&mut self, tool: Tool, installed: bool) {
        match tool {
            Tool::A => self.tool_a_installed = installed,
            Tool::B => self.tool_b_installed = installed,
        }
    }

    /// Missing tools in fixed A-then-B order.
    pub fn missing_tools(&self) -> Vec<Tool> {
        Tool::ALL
            .into_iter()
            .filter(|tool| !self.is_installed(*tool))
            .collect()
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Events delivered to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum BootstrapEvent {
    StateSnapshot(Box<BootstrapState>),
    LogAppended(LogEntry),
    StageChanged { stage: Stage, at: DateTime<Utc> },
}
