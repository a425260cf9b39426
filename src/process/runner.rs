//! Running one external process with live output and a wall-clock budget

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// How much of stderr is kept for logging after the process exits
pub const STDERR_TAIL_BYTES: usize = 64 * 1024;

/// How long output readers may keep draining after the process itself exited
const READER_GRACE: Duration = Duration::from_secs(2);

/// Which pipe a chunk of output came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// A piece of process output, decoded lossily as UTF-8
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputChunk {
    pub stream: OutputStream,
    pub text: String,
}

/// Receiver side of live process output
pub type OutputSink = mpsc::UnboundedSender<OutputChunk>;

/// One external command to run
#[derive(Clone, Debug)]
pub struct Invocation {
    /// Resolved path of the binary
    pub program: PathBuf,
    /// Arguments, passed without a shell
    pub args: Vec<OsString>,
    /// The process is killed when this elapses
    pub timeout: Duration,
    /// Short name used in logs (e.g. "acquire")
    pub label: String,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>, label: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout,
            label: label.into(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

/// How the process ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProcessStatus {
    /// Exit code 0
    Succeeded,
    /// Non-zero exit, or killed by a signal (`None`)
    Failed(Option<i32>),
    /// The binary could not be started
    SpawnFailed(String),
    /// The timeout fired first and the process was killed
    TimedOut,
}

/// Result of running an [`Invocation`]
#[derive(Clone, Debug)]
pub struct ProcessOutcome {
    pub status: ProcessStatus,
    /// Last [`STDERR_TAIL_BYTES`] of stderr, for server-side logs only
    pub stderr_tail: String,
    pub elapsed: Duration,
}

impl ProcessOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == ProcessStatus::Succeeded
    }

    /// Exit code when the process exited on its own
    pub fn exit_code(&self) -> Option<i32> {
        match self.status {
            ProcessStatus::Succeeded => Some(0),
            ProcessStatus::Failed(code) => code,
            ProcessStatus::SpawnFailed(_) | ProcessStatus::TimedOut => None,
        }
    }
}

/// Runs phase processes
///
/// The orchestrator only depends on this trait, so tests can drive a job with
/// scripted output instead of real binaries.
#[async_trait]
pub trait PhaseRunner: Send + Sync {
    /// Run the invocation to completion, forwarding output to `sink`
    ///
    /// Never fails; every problem is expressed in the returned status.
    async fn run(&self, invocation: &Invocation, sink: OutputSink) -> ProcessOutcome;
}

/// [`PhaseRunner`] backed by real child processes
#[derive(Clone, Debug, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PhaseRunner for ProcessRunner {
    async fn run(&self, invocation: &Invocation, sink: OutputSink) -> ProcessOutcome {
        let started = Instant::now();
        let label = invocation.label.as_str();

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(
                    process = label,
                    program = %invocation.program.display(),
                    error = %e,
                    "failed to spawn process"
                );
                return ProcessOutcome {
                    status: ProcessStatus::SpawnFailed(e.to_string()),
                    stderr_tail: String::new(),
                    elapsed: started.elapsed(),
                };
            }
        };

        tracing::debug!(
            process = label,
            pid = ?child.id(),
            timeout = ?invocation.timeout,
            "process started"
        );

        let tail = Arc::new(Mutex::new(String::new()));
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(stdout, OutputStream::Stdout, sink.clone(), None));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(
                stderr,
                OutputStream::Stderr,
                sink.clone(),
                Some(tail.clone()),
            ));
        }
        drop(sink);

        let waited = tokio::select! {
            status = child.wait() => Some(status),
            _ = tokio::time::sleep(invocation.timeout) => None,
        };

        let status = match waited {
            Some(Ok(exit)) if exit.success() => ProcessStatus::Succeeded,
            Some(Ok(exit)) => ProcessStatus::Failed(exit.code()),
            Some(Err(e)) => {
                tracing::warn!(process = label, error = %e, "failed to wait for process");
                ProcessStatus::Failed(None)
            }
            None => {
                if let Err(e) = child.kill().await {
                    tracing::warn!(process = label, error = %e, "failed to kill timed out process");
                }
                tracing::warn!(process = label, timeout = ?invocation.timeout, "process timed out");
                ProcessStatus::TimedOut
            }
        };

        drain_readers(readers).await;

        let stderr_tail = std::mem::take(&mut *tail.lock().unwrap_or_else(PoisonError::into_inner));
        let elapsed = started.elapsed();
        tracing::debug!(process = label, status = ?status, elapsed = ?elapsed, "process finished");

        ProcessOutcome {
            status,
            stderr_tail,
            elapsed,
        }
    }
}

fn spawn_reader<R>(
    mut reader: R,
    stream: OutputStream,
    sink: OutputSink,
    tail: Option<Arc<Mutex<String>>>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; 8192];
        let mut pending: Vec<u8> = Vec::new();

        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    tracing::debug!(stream = ?stream, error = %e, "output read failed");
                    break;
                }
            };
            pending.extend_from_slice(&buf[..n]);

            // Hold back an incomplete multi-byte character for the next read
            let boundary = utf8_boundary(&pending);
            if boundary == 0 {
                continue;
            }
            let text = String::from_utf8_lossy(&pending[..boundary]).into_owned();
            pending.drain(..boundary);
            deliver(stream, text, &sink, tail.as_deref());
        }

        if !pending.is_empty() {
            let text = String::from_utf8_lossy(&pending).into_owned();
            deliver(stream, text, &sink, tail.as_deref());
        }
    })
}

fn deliver(stream: OutputStream, text: String, sink: &OutputSink, tail: Option<&Mutex<String>>) {
    if let Some(tail) = tail {
        let mut tail = tail.lock().unwrap_or_else(PoisonError::into_inner);
        tail.push_str(&text);
        truncate_front(&mut tail, STDERR_TAIL_BYTES);
    }
    // The consumer may already be gone; output is then only kept in the tail
    let _ = sink.send(OutputChunk { stream, text });
}

fn utf8_boundary(bytes: &[u8]) -> usize {
    match std::str::from_utf8(bytes) {
        Ok(_) => bytes.len(),
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        Err(_) => bytes.len(),
    }
}

fn truncate_front(text: &mut String, max: usize) {
    if text.len() <= max {
        return;
    }
    let mut cut = text.len() - max;
    while !text.is_char_boundary(cut) {
        cut += 1;
    }
    text.drain(..cut);
}

/// Give readers a moment to drain after exit; a grandchild holding the pipe open
/// must not keep the job alive
async fn drain_readers(readers: Vec<JoinHandle<()>>) {
    for mut reader in readers {
        if tokio::time::timeout(READER_GRACE, &mut reader).await.is_err() {
            reader.abort();
        }
    }
}
