use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How long readers may keep draining once the process has exited or been killed.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Which pipe a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// What to run and for how long.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub timeout: Duration,
    pub cwd: Option<PathBuf>,
}

impl ProcessSpec {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
            cwd: None,
        }
    }
}

/// How a process run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Exited with status 0 before the deadline.
    Success,
    /// Exited with a non-zero status. `code` is `None` when the process was
    /// terminated by a signal.
    Failed { code: Option<i32> },
    /// The deadline fired; the process group was killed.
    TimedOut { after: Duration },
    /// Pipes could not be set up or the process could not be started.
    LaunchFailed { reason: String },
}

/// Callback receiving each output line as soon as it is read.
pub type LineSink<'a> = dyn FnMut(Stream, String) + Send + 'a;

/// Runs an external process to completion or timeout, streaming its output.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run `spec`, passing every line of stdout and stderr to `sink`.
    ///
    /// Lines of each stream arrive in emission order; the interleaving
    /// between the two streams is unspecified.
    async fn run(&self, spec: &ProcessSpec, sink: &mut LineSink<'_>) -> ProcessOutcome;
}

/// Run `spec` and collect the combined output instead of streaming it.
pub async fn run_collect(
    runner: &dyn ProcessRunner,
    spec: &ProcessSpec,
) -> (ProcessOutcome, Vec<String>) {
    let mut lines = Vec::new();
    let outcome = runner
        .run(spec, &mut |_stream: Stream, line: String| lines.push(line))
        .await;
    (outcome, lines)
}

/// `ProcessRunner` backed by `tokio::process`.
///
/// The child is placed in its own process group so a timeout kills every
/// descendant, not just the direct child.
#[derive(Debug, Default, Clone)]
pub struct CommandRunner;

impl CommandRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessRunner for CommandRunner {
    async fn run(&self, spec: &ProcessSpec, sink: &mut LineSink<'_>) -> ProcessOutcome {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(ref dir) = spec.cwd {
            command.current_dir(dir);
        }

        #[cfg(unix)]
        {
            unsafe {
                command.pre_exec(|| {
                    libc::setpgid(0, 0);
                    Ok(())
                });
            }
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                return ProcessOutcome::LaunchFailed {
                    reason: format!(
                        "Failed to start command '{}': {}",
                        spec.program.display(),
                        e
                    ),
                };
            }
        };

        // Must be read before the child is reaped; on unix it doubles as the process group id.
        let pid = child.id();

        let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
            (Some(stdout), Some(stderr)) => (stdout, stderr),
            (stdout, _) => {
                let _ = child.kill().await;
                let which = if stdout.is_none() { "stdout" } else { "stderr" };
                return ProcessOutcome::LaunchFailed {
                    reason: format!("Failed to get {} pipe", which),
                };
            }
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        let readers = vec![
            tokio::spawn(drain_lines(stdout, Stream::Stdout, tx.clone())),
            tokio::spawn(drain_lines(stderr, Stream::Stderr, tx)),
        ];

        let deadline = tokio::time::sleep(spec.timeout);
        tokio::pin!(deadline);

        // Forward lines while waiting for the process to exit or the deadline to fire.
        let exit = loop {
            tokio::select! {
                Some((stream, line)) = rx.recv() => sink(stream, line),
                status = child.wait() => break Some(status),
                () = &mut deadline => break None,
            }
        };

        let timed_out = exit.is_none();
        if timed_out {
            kill_process_group(pid);
            let _ = child.kill().await;
        }

        // The process is gone, but its pipes may still hold unread output. A
        // background descendant can keep them open indefinitely, so the drain
        // is bounded and whatever it still holds is abandoned.
        let drained = tokio::time::timeout(DRAIN_GRACE, forward_remaining(&mut rx, sink))
            .await
            .is_ok();
        if !drained {
            warn!(
                program = %spec.program.display(),
                timed_out,
                "Output pipes still open after exit, abandoning remaining output"
            );
        }
        join_readers(readers, !drained).await;
        while let Ok((stream, line)) = rx.try_recv() {
            sink(stream, line);
        }

        if timed_out {
            return ProcessOutcome::TimedOut {
                after: spec.timeout,
            };
        }

        match exit {
            Some(Ok(status)) if status.success() => ProcessOutcome::Success,
            Some(Ok(status)) => ProcessOutcome::Failed {
                code: status.code(),
            },
            Some(Err(e)) => {
                warn!(program = %spec.program.display(), error = %e, "Failed to wait for process");
                ProcessOutcome::Failed { code: None }
            }
            None => ProcessOutcome::TimedOut {
                after: spec.timeout,
            },
        }
    }
}

/// Read `reader` line by line and push each line onto `tx`.
///
/// Invalid UTF-8 is replaced rather than treated as an error, and trailing
/// `\r\n` / `\n` is stripped.
async fn drain_lines<R>(
    reader: R,
    stream: Stream,
    tx: mpsc::UnboundedSender<(Stream, String)>,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(());
        }
        let line = String::from_utf8_lossy(&buf)
            .trim_end_matches(['\n', '\r'])
            .to_string();
        if tx.send((stream, line)).is_err() {
            return Ok(());
        }
    }
}

async fn forward_remaining(
    rx: &mut mpsc::UnboundedReceiver<(Stream, String)>,
    sink: &mut LineSink<'_>,
) {
    while let Some((stream, line)) = rx.recv().await {
        sink(stream, line);
    }
}

/// Await both readers. With `abort`, ones still blocked on an inherited pipe are dropped.
async fn join_readers(readers: Vec<JoinHandle<std::io::Result<()>>>, abort: bool) {
    for reader in readers {
        if abort && !reader.is_finished() {
            reader.abort();
        }
        match reader.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Error reading process output"),
            Err(e) if e.is_cancelled() => debug!("Output reader cancelled"),
            Err(e) => warn!(error = %e, "Output reader panicked"),
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        // Negative pid targets the whole group created by setpgid(0, 0).
        unsafe {
            libc::kill(-(pid as i32), libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}
