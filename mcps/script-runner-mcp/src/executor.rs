//! Supervised script execution
//!
//! Each run spawns the script with its arguments as discrete argv entries
//! (never through a shell string), drains stdout and stderr concurrently while
//! the process runs, and races the exit against the script's deadline. When
//! the deadline wins the whole process group is killed and reaped. Processes
//! the script left behind in its group are killed once it exits.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::types::{ExecutionResult, ScriptDefinition, FAILURE_EXIT_CODE};

/// How long to wait for the output pipes to close once the script is gone
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// How long to wait for the pipes after killing whatever still held them
const KILL_SETTLE: Duration = Duration::from_millis(500);

const READ_CHUNK: usize = 8 * 1024;

/// Bytes read from one output stream
#[derive(Debug, Default)]
struct Captured {
    bytes: Vec<u8>,
    truncated: bool,
}

impl Captured {
    fn into_text(self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Reader task for one stream; the buffer outlives the task so an abort keeps partial output
struct Drain {
    captured: Arc<Mutex<Captured>>,
    task: Option<JoinHandle<()>>,
}

impl Drain {
    fn spawn<R>(stream: R, limit: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let captured = Arc::new(Mutex::new(Captured::default()));
        let task = tokio::spawn(drain(stream, limit, Arc::clone(&captured)));
        Self {
            captured,
            task: Some(task),
        }
    }

    /// Wait up to `limit` for EOF; true once the stream is closed
    async fn wait(&mut self, limit: Duration) -> bool {
        let Some(task) = self.task.as_mut() else {
            return true;
        };

        match tokio::time::timeout(limit, task).await {
            Ok(joined) => {
                if let Err(e) = joined {
                    warn!("Output reader task failed: {}", e);
                }
                self.task = None;
                true
            }
            Err(_elapsed) => false,
        }
    }

    /// Stop reading and take whatever arrived so far
    async fn finish(self) -> Captured {
        if let Some(task) = self.task {
            task.abort();
        }
        let mut captured = self.captured.lock().await;
        std::mem::take(&mut *captured)
    }
}

enum Outcome {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
}

/// Runs scripts with a per-stream output cap
#[derive(Debug, Clone, Copy)]
pub struct ScriptExecutor {
    max_output_bytes: usize,
}

impl ScriptExecutor {
    pub fn new(max_output_bytes: usize) -> Self {
        Self { max_output_bytes }
    }

    /// Run `definition` with `args` in `cwd`
    ///
    /// Never fails: spawn problems come back as a result with the failure
    /// exit code and an explanation on stderr.
    #[instrument(
        skip(self, definition, args),
        fields(script = %definition.name, timeout_secs = definition.timeout_seconds)
    )]
    pub async fn execute(
        &self,
        definition: &ScriptDefinition,
        args: &[String],
        cwd: &Path,
    ) -> ExecutionResult {
        let started = Instant::now();
        let script_path = cwd.join(&definition.path);

        if !script_path.is_file() {
            warn!(path = %script_path.display(), "Script file not found");
            return ExecutionResult::failed_to_start(
                &definition.name,
                format!("Script file not found: {}", script_path.display()),
                started.elapsed(),
            );
        }

        let mut cmd = match &definition.interpreter {
            Some(interpreter) => {
                let mut cmd = Command::new(interpreter);
                cmd.arg(&script_path);
                cmd
            }
            None => Command::new(&script_path),
        };
        cmd.args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group so a timeout can take down everything the script started
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(path = %script_path.display(), "Failed to start script: {}", e);
                return ExecutionResult::failed_to_start(
                    &definition.name,
                    format!("Failed to start {}: {}", script_path.display(), e),
                    started.elapsed(),
                );
            }
        };

        // The id is gone once the child is reaped; the group outlives it
        let group = child.id();
        debug!(pid = group, args = args.len(), "Script started");

        let mut stdout_drain = child
            .stdout
            .take()
            .map(|stream| Drain::spawn(stream, self.max_output_bytes));
        let mut stderr_drain = child
            .stderr
            .take()
            .map(|stream| Drain::spawn(stream, self.max_output_bytes));

        let outcome = tokio::select! {
            status = child.wait() => Outcome::Exited(status),
            _ = tokio::time::sleep(definition.timeout()) => Outcome::TimedOut,
        };

        let (exit_code, timed_out, note) = match outcome {
            Outcome::Exited(Ok(status)) => match status.code() {
                Some(code) => (code, false, None),
                None => (
                    FAILURE_EXIT_CODE,
                    false,
                    Some(format!("Script terminated by signal ({})", status)),
                ),
            },
            Outcome::Exited(Err(e)) => (
                FAILURE_EXIT_CODE,
                false,
                Some(format!("Failed to wait for script: {}", e)),
            ),
            Outcome::TimedOut => {
                warn!("Script timed out, terminating process group");
                terminate(&mut child, group).await;
                (
                    FAILURE_EXIT_CODE,
                    true,
                    Some(format!(
                        "Script execution timed out after {} seconds",
                        definition.timeout_seconds
                    )),
                )
            }
        };

        let closed = wait_for_eof(&mut stdout_drain, &mut stderr_drain, DRAIN_GRACE).await;
        if !closed {
            warn!("Output still open after script exit, killing leftover processes");
        }
        kill_group(group);
        if !closed && !wait_for_eof(&mut stdout_drain, &mut stderr_drain, KILL_SETTLE).await {
            warn!("Output streams never closed, keeping what was captured");
        }

        let stdout = finish(stdout_drain).await;
        let stderr = finish(stderr_drain).await;
        let truncated = stdout.truncated || stderr.truncated;

        let mut stderr = stderr.into_text();
        if let Some(note) = note {
            if !stderr.is_empty() && !stderr.ends_with('\n') {
                stderr.push('\n');
            }
            stderr.push_str(&note);
        }

        let duration = started.elapsed();
        info!(
            exit_code,
            timed_out,
            duration_ms = duration.as_millis() as u64,
            "Script finished"
        );

        ExecutionResult {
            script_name: definition.name.clone(),
            exit_code,
            stdout: stdout.into_text(),
            stderr,
            duration_millis: duration.as_millis() as u64,
            timed_out,
            truncated,
            success: exit_code == 0 && !timed_out,
        }
    }
}

/// Read a stream to EOF into `sink`, keeping at most `limit` bytes
///
/// Bytes past the limit are still read so the child never blocks on a full pipe.
async fn drain<R: AsyncRead + Unpin>(mut reader: R, limit: usize, sink: Arc<Mutex<Captured>>) {
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                let mut captured = sink.lock().await;
                let room = limit.saturating_sub(captured.bytes.len());
                if n > room {
                    captured.truncated = true;
                }
                captured.bytes.extend_from_slice(&chunk[..n.min(room)]);
            }
            Err(e) => {
                debug!("Output stream read failed: {}", e);
                break;
            }
        }
    }
}

/// Wait for both streams to reach EOF within `limit`
async fn wait_for_eof(
    stdout: &mut Option<Drain>,
    stderr: &mut Option<Drain>,
    limit: Duration,
) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    for stream in [stdout, stderr].into_iter().flatten() {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if !stream.wait(remaining).await {
            return false;
        }
    }
    true
}

async fn finish(drain: Option<Drain>) -> Captured {
    match drain {
        Some(drain) => drain.finish().await,
        None => Captured::default(),
    }
}

/// SIGKILL every process left in the script's group
///
/// `process_group(0)` made the script the leader, so its pid is the group id.
fn kill_group(group: Option<u32>) {
    #[cfg(unix)]
    if let Some(pid) = group {
        // ESRCH just means the group is already empty
        let _ = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
    }
    #[cfg(not(unix))]
    let _ = group;
}

/// Kill the script and everything in its process group, then reap it
async fn terminate(child: &mut Child, group: Option<u32>) {
    kill_group(group);

    if let Err(e) = child.kill().await {
        debug!("Reaping timed-out script: {}", e);
    }
}
