//! Single-tool install step: run the installer, stream its output into the
//! log, and turn a bad outcome into a [`FailureDetail`].

use super::classifier::{spawn_suggestion_key, suggestion_key};
use super::service::Inner;
use super::types::{FailureDetail, LogLevel, Tool};
use crate::error::{BootstrapError, Result};
use crate::runner::OutputHandlers;

/// Captured output kept in a failure detail, in characters
pub const OUTPUT_TAIL_CHARS: usize = 4000;

/// Last `max` characters of `text`, or `None` when there is nothing captured.
pub fn tail_chars(text: &str, max: usize) -> Option<String> {
    if text.is_empty() {
        return None;
    }
    let count = text.chars().count();
    if count <= max {
        return Some(text.to_string());
    }
    Some(text.chars().skip(count - max).collect())
}

/// Reassembles arbitrarily split output chunks into lines.
#[derive(Debug, Default)]
pub struct LineSplitter {
    partial: String,
}

impl LineSplitter {
    /// Feed a chunk, returning the non-blank lines it completes
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.partial.push_str(chunk);

        let Some(last_newline) = self.partial.rfind('\n') else {
            return Vec::new();
        };
        let rest = self.partial.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.partial, rest);

        complete.lines().filter_map(non_blank).collect()
    }

    /// Whatever is left once the stream has ended
    pub fn finish(&mut self) -> Option<String> {
        non_blank(&std::mem::take(&mut self.partial))
    }
}

fn non_blank(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}

impl Inner {
    /// Install one tool. Errors abort the rest of the run; the failure has
    /// already been recorded in the state by the time one is returned.
    pub(super) async fn install_tool(&self, tool: Tool) -> Result<()> {
        let spec = self.tool(tool);
        let source = tool.source();
        let script = spec.installer_path();
        let command = self.runner.command_line(&script);

        {
            let mut core = self.lock();
            core.set_stage(tool.start_install_stage());
            core.log(
                LogLevel::Warn,
                self.t("log.install.start", &[("tool", spec.name.as_str())]),
                source,
            );
            core.set_stage(tool.installing_stage());
        }

        let mut stdout_lines = LineSplitter::default();
        let mut stderr_lines = LineSplitter::default();

        let result = {
            let mut handlers = OutputHandlers::new(
                |chunk| {
                    let lines = stdout_lines.push(chunk);
                    if !lines.is_empty() {
                        let mut core = self.lock();
                        for line in lines {
                            core.log(LogLevel::Info, line, source);
                        }
                    }
                },
                |chunk| {
                    let lines = stderr_lines.push(chunk);
                    if !lines.is_empty() {
                        let mut core = self.lock();
                        for line in lines {
                            core.log(LogLevel::Warn, line, source);
                        }
                    }
                },
            );
            self.runner.run(&script, &mut handlers).await
        };

        {
            let mut core = self.lock();
            if let Some(line) = stdout_lines.finish() {
                core.log(LogLevel::Info, line, source);
            }
            if let Some(line) = stderr_lines.finish() {
                core.log(LogLevel::Warn, line, source);
            }
        }

        match result {
            Ok(output) if output.success() => {
                let message = self.t("log.install.finished", &[("tool", spec.name.as_str())]);
                self.lock().log(LogLevel::Info, message, source);
                Ok(())
            }
            Ok(output) => {
                let code = output.exit_code.to_string();
                let detail = FailureDetail {
                    message: self.t(
                        "error.installerExit",
                        &[("tool", spec.name.as_str()), ("code", code.as_str())],
                    ),
                    command: Some(command),
                    exit_code: Some(output.exit_code),
                    stderr_tail: tail_chars(&output.stderr, OUTPUT_TAIL_CHARS),
                    stdout_tail: tail_chars(&output.stdout, OUTPUT_TAIL_CHARS),
                    suggestion: suggestion_key(&output.stderr, &output.stdout, self.os)
                        .map(|key| self.t(key, &[])),
                };
                self.fail(&mut self.lock(), detail);

                Err(BootstrapError::InstallerExit {
                    tool,
                    exit_code: output.exit_code,
                })
            }
            Err(e) => {
                let mut core = self.lock();
                if !core.state.failed {
                    let error = e.to_string();
                    let detail = FailureDetail {
                        message: self.t(
                            "error.spawn",
                            &[("tool", spec.name.as_str()), ("error", error.as_str())],
                        ),
                        command: Some(command),
                        suggestion: Some(self.t(spawn_suggestion_key(self.os), &[])),
                        ..Default::default()
                    };
                    self.fail(&mut core, detail);
                }

                Err(BootstrapError::Spawn { tool, source: e })
            }
        }
    }
}
