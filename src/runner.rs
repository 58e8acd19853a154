//! Streaming execution of installer scripts.
//!
//! Output is forwarded to the caller as it arrives, in chunks that are not
//! necessarily line-aligned, and captured in full for post-mortem analysis.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::bootstrap::HostOs;
use crate::error::RunnerError;

/// Chunk callbacks for the two output streams.
pub struct OutputHandlers<'a> {
    pub on_stdout: Box<dyn FnMut(&str) + Send + 'a>,
    pub on_stderr: Box<dyn FnMut(&str) + Send + 'a>,
}

impl<'a> OutputHandlers<'a> {
    pub fn new(
        on_stdout: impl FnMut(&str) + Send + 'a,
        on_stderr: impl FnMut(&str) + Send + 'a,
    ) -> Self {
        Self {
            on_stdout: Box::new(on_stdout),
            on_stderr: Box::new(on_stderr),
        }
    }
}

/// Result of a completed process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, `-1` when the process was terminated by a signal
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs a script to completion while streaming its output.
#[async_trait]
pub trait StreamingProcessRunner: Send + Sync {
    /// The exact invocation used for `script`, for diagnostics
    fn command_line(&self, script: &Path) -> String;

    async fn run(
        &self,
        script: &Path,
        handlers: &mut OutputHandlers<'_>,
    ) -> Result<ProcessOutput, RunnerError>;
}

/// Runs scripts through a shell interpreter with `tokio::process`.
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    program: String,
    args: Vec<String>,
}

impl ScriptRunner {
    /// PowerShell on Windows, bash everywhere else
    pub fn for_host(os: HostOs) -> Self {
        if os.is_windows() {
            Self {
                program: "powershell".to_string(),
                args: ["-NoProfile", "-ExecutionPolicy", "Bypass", "-File"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            }
        } else {
            Self::with_interpreter("bash")
        }
    }

    pub fn with_interpreter(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }
}

impl Default for ScriptRunner {
    fn default() -> Self {
        Self::for_host(HostOs::current())
    }
}

#[async_trait]
impl StreamingProcessRunner for ScriptRunner {
    fn command_line(&self, script: &Path) -> String {
        let script = script.display().to_string();
        let script = if script.contains(' ') {
            format!("\"{}\"", script)
        } else {
            script
        };

        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .chain(std::iter::once(script))
            .collect::<Vec<_>>()
            .join(" ")
    }

    async fn run(
        &self,
        script: &Path,
        handlers: &mut OutputHandlers<'_>,
    ) -> Result<ProcessOutput, RunnerError> {
        if !script.is_file() {
            return Err(RunnerError::ScriptNotFound(script.display().to_string()));
        }

        let command = self.command_line(script);
        tracing::debug!("Running installer: {}", command);

        let mut child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RunnerError::Spawn { command, source })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (stdout, stderr) = tokio::try_join!(
            pump(stdout, &mut *handlers.on_stdout),
            pump(stderr, &mut *handlers.on_stderr),
        )?;

        let status = child.wait().await?;

        Ok(ProcessOutput {
            exit_code: status.code().unwrap_or(-1),
            stdout,
            stderr,
        })
    }
}

/// Forward a stream to `on_chunk` until EOF, returning everything read.
///
/// Multi-byte UTF-8 sequences split across reads are held back until complete.
async fn pump<R, F>(reader: Option<R>, on_chunk: &mut F) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
    F: FnMut(&str) + ?Sized,
{
    let Some(mut reader) = reader else {
        return Ok(String::new());
    };

    let mut captured = String::new();
    let mut pending: Vec<u8> = Vec::new();
    let mut buf = [0u8; 8192];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        pending.extend_from_slice(&buf[..n]);

        let complete = match std::str::from_utf8(&pending) {
            Ok(_) => pending.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => pending.len(),
        };
        if complete == 0 {
            continue;
        }

        let bytes: Vec<u8> = pending.drain(..complete).collect();
        let text = String::from_utf8_lossy(&bytes).into_owned();
        on_chunk(text.as_str());
        captured.push_str(&text);
    }

    if !pending.is_empty() {
        let text = String::from_utf8_lossy(&pending).into_owned();
        on_chunk(text.as_str());
        captured.push_str(&text);
    }

    Ok(captured)
}
