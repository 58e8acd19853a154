use thiserror::Error;

use crate::bootstrap::Tool;

#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Installer ran and exited non-zero
    #[error("{tool} installer exited with code {exit_code}")]
    InstallerExit { tool: Tool, exit_code: i32 },

    /// Installer process could not be started
    #[error("Failed to start {tool} installer: {source}")]
    Spawn {
        tool: Tool,
        #[source]
        source: RunnerError,
    },

    /// Installer reported success but the tool is still missing
    #[error("Tools still missing after install: {0}")]
    Recheck(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BootstrapError>;

/// Errors raised by a [`crate::runner::StreamingProcessRunner`].
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Installer script not found: {0}")]
    ScriptNotFound(String),

    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read installer output: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while delivering an event to an observer.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Observer channel closed")]
    Closed,
}
