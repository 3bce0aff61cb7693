//! Execution of backend commands in an external process

use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::command::{escape, BackendCommand};
use crate::error::Result;

/// How long to keep collecting output after the process has exited or been killed
const OUTPUT_GRACE: Duration = Duration::from_secs(5);

/// Lines of output used for a failure description when nothing better is available
const DESCRIPTION_TAIL_LINES: usize = 3;

/// Outcome of running one backend command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Whether the command succeeded
    pub success: bool,
    /// Exit code, if the process exited normally
    pub exit_code: Option<i32>,
    /// Combined stdout and stderr, in arrival order
    pub output: String,
    /// Standard output alone; the return value is read from here
    pub stdout: String,
    /// Why the command failed
    pub error_description: Option<String>,
    /// Whether the process was killed for exceeding its timeout
    pub timed_out: bool,
}

impl ExecutionResult {
    /// A successful result with the given output
    pub fn succeeded(output: impl Into<String>) -> Self {
        let output = output.into();
        Self {
            success: true,
            exit_code: Some(0),
            stdout: output.clone(),
            output,
            error_description: None,
            timed_out: false,
        }
    }

    /// A failed result
    pub fn failed(output: impl Into<String>, description: impl Into<String>) -> Self {
        let output = output.into();
        Self {
            success: false,
            exit_code: None,
            stdout: output.clone(),
            output,
            error_description: Some(description.into()),
            timed_out: false,
        }
    }
}

/// Something that can run a [`BackendCommand`] against the signing service.
///
/// Ordinary command failures are reported through
/// [`ExecutionResult::success`]; `Err` is reserved for local faults such as
/// the interpreter not being startable.
#[async_trait::async_trait]
pub trait SigningBackend: Send + Sync {
    /// Name of this backend, for logging
    fn name(&self) -> &str;

    /// Run the command, killing it if it outlives `timeout`
    async fn execute(&self, command: &BackendCommand, timeout: Duration)
        -> Result<ExecutionResult>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

#[derive(Debug)]
struct Line {
    stream: Stream,
    text: String,
}

/// Runs backend commands through a script interpreter such as PowerShell
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    program: String,
    args: Vec<String>,
    preamble: Option<String>,
    fail_on_stderr: bool,
    error_marker: Option<String>,
}

impl ProcessExecutor {
    /// Run commands as the final argument of `program`
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            preamble: None,
            fail_on_stderr: false,
            error_marker: None,
        }
    }

    /// PowerShell 7 with the given module imported and errors made terminating
    pub fn powershell(module: &str) -> Self {
        Self::new("pwsh")
            .with_args(["-NoProfile", "-NonInteractive", "-Command"])
            .with_preamble(format!(
                "$ErrorActionPreference = 'Stop'\nImport-Module \"{}\"",
                escape(module)
            ))
            .fail_on_stderr(true)
    }

    /// Use a different interpreter binary (e.g. Windows PowerShell)
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Append an interpreter argument placed before the script
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Replace the interpreter arguments
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Script lines run before every command
    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = Some(preamble.into());
        self
    }

    /// Treat any stderr output as failure
    pub fn fail_on_stderr(mut self, enabled: bool) -> Self {
        self.fail_on_stderr = enabled;
        self
    }

    /// Treat output lines starting with `marker` as failure
    pub fn with_error_marker(mut self, marker: impl Into<String>) -> Self {
        self.error_marker = Some(marker.into());
        self
    }

    /// Interpreter program
    pub fn program(&self) -> &str {
        &self.program
    }

    fn script(&self, command: &BackendCommand) -> String {
        match &self.preamble {
            Some(preamble) => format!("{}\n{}", preamble, command.text()),
            None => command.text().to_string(),
        }
    }

    fn evaluate(
        &self,
        status: Option<ExitStatus>,
        lines: Vec<Line>,
        timeout: Duration,
    ) -> ExecutionResult {
        let output = lines
            .iter()
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let stdout = lines
            .iter()
            .filter(|l| l.stream == Stream::Stdout)
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let Some(status) = status else {
            return ExecutionResult {
                success: false,
                exit_code: None,
                output,
                stdout,
                error_description: Some(format!(
                    "process timed out after {} seconds and was killed",
                    timeout.as_secs()
                )),
                timed_out: true,
            };
        };

        let stderr: Vec<&str> = lines
            .iter()
            .filter(|l| l.stream == Stream::Stderr && !l.text.trim().is_empty())
            .map(|l| l.text.trim_end())
            .collect();
        let marked: Vec<&str> = match &self.error_marker {
            Some(marker) => lines
                .iter()
                .filter(|l| l.text.trim_start().starts_with(marker.as_str()))
                .map(|l| l.text.trim())
                .collect(),
            None => Vec::new(),
        };

        let failed = !status.success() || (self.fail_on_stderr && !stderr.is_empty()) || !marked.is_empty();
        if !failed {
            return ExecutionResult {
                success: true,
                exit_code: status.code(),
                output,
                stdout,
                error_description: None,
                timed_out: false,
            };
        }

        let description = if !stderr.is_empty() {
            stderr.join("\n")
        } else if !marked.is_empty() {
            marked.join("\n")
        } else {
            let tail: Vec<&str> = lines
                .iter()
                .map(|l| l.text.trim_end())
                .filter(|t| !t.trim().is_empty())
                .collect();
            let start = tail.len().saturating_sub(DESCRIPTION_TAIL_LINES);
            tail[start..].join("\n")
        };
        let description = if description.is_empty() {
            match status.code() {
                Some(code) => format!("process exited with code {}", code),
                None => "process was terminated by a signal".to_string(),
            }
        } else {
            description
        };

        ExecutionResult {
            success: false,
            exit_code: status.code(),
            output,
            stdout,
            error_description: Some(description),
            timed_out: false,
        }
    }
}

#[async_trait::async_trait]
impl SigningBackend for ProcessExecutor {
    fn name(&self) -> &str {
        &self.program
    }

    #[instrument(skip(self, command), fields(program = %self.program, timeout_secs = timeout.as_secs()))]
    async fn execute(
        &self,
        command: &BackendCommand,
        timeout: Duration,
    ) -> Result<ExecutionResult> {
        debug!(
            command = %command,
            substitutions = ?command.substitution_names(),
            "starting backend process"
        );

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(self.script(command))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        for substitution in command.substitutions() {
            cmd.env(substitution.name(), substitution.value());
        }

        let started = Instant::now();
        let mut child = cmd.spawn()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(stdout, Stream::Stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(stderr, Stream::Stderr, tx.clone()));
        }
        drop(tx);

        let status = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(status) => Some(status?),
            Err(_) => {
                warn!(
                    timeout_secs = timeout.as_secs(),
                    "backend process timed out, killing it"
                );
                kill_process_group(&child);
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "failed to kill backend process");
                }
                None
            }
        };

        let lines = collect_output(rx, readers).await;
        let result = self.evaluate(status, lines, timeout);
        debug!(
            success = result.success,
            exit_code = ?result.exit_code,
            timed_out = result.timed_out,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "backend process finished"
        );
        Ok(result)
    }
}

/// Kill everything the backend process started, not just the process itself
#[cfg(unix)]
fn kill_process_group(child: &tokio::process::Child) {
    let Some(pid) = child.id() else {
        return;
    };
    // The child leads its own group, so the group id equals its pid
    let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
    if rc != 0 {
        let e = std::io::Error::last_os_error();
        debug!(pid, error = %e, "failed to kill backend process group");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_child: &tokio::process::Child) {}

fn spawn_reader<R>(
    reader: R,
    stream: Stream,
    tx: mpsc::UnboundedSender<Line>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&buf)
                        .trim_end_matches(['\r', '\n'])
                        .to_string();
                    debug!(stream = stream.as_str(), "{}", text);
                    if tx.send(Line { stream, text }).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(stream = stream.as_str(), error = %e, "failed to read backend output");
                    break;
                }
            }
        }
    })
}

/// Gather lines until both pipes close, or give up after the grace period
/// (a grandchild may still hold a pipe open after the process was killed)
async fn collect_output(
    mut rx: mpsc::UnboundedReceiver<Line>,
    readers: Vec<JoinHandle<()>>,
) -> Vec<Line> {
    let mut lines = Vec::new();
    let drained = tokio::time::timeout(OUTPUT_GRACE, async {
        while let Some(line) = rx.recv().await {
            lines.push(line);
        }
    })
    .await;

    if drained.is_err() {
        warn!("backend output pipes still open, abandoning remaining output");
        for reader in &readers {
            reader.abort();
        }
        while let Ok(line) = rx.try_recv() {
            lines.push(line);
        }
    }
    lines
}
