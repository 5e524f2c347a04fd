//! Child process management
//!
//! [`ProcessHandle`] wraps one OS child process. Output is captured by one
//! reader task per stream; a dedicated wait task owns the `Child`, reaps it and
//! performs graceful termination with escalation to a forced kill.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::command::LaunchCommand;
use tandem_core::prelude::*;
use tandem_core::{ProcessEvent, StreamKind};

/// Capacity of the per-instance event channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How long readers may keep draining buffered output after the process died.
/// Grandchildren that inherited the pipes can hold them open indefinitely.
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Final state of a reaped process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
    /// Exit code, `None` when the process was killed by a signal
    pub code: Option<i32>,
    /// Whether the exit followed a terminate request
    pub requested: bool,
}

/// Handle to a running (or exited) child process.
///
/// The `Child` itself lives in a background wait task. The handle keeps a
/// terminate channel carrying the grace period, and a watch receiver that
/// flips to `Some(ExitInfo)` once the process has been reaped. Dropping the
/// handle of a live process force-kills it.
pub struct ProcessHandle {
    program: String,
    pid: Option<u32>,
    /// Consumed by the first terminate request (or on drop).
    terminate_tx: Option<oneshot::Sender<Duration>>,
    exit_rx: watch::Receiver<Option<ExitInfo>>,
}

/// Lazy sequence of events captured from one process instance.
///
/// Ends (returns `None`) after [`ProcessEvent::Exited`] has been delivered.
pub struct ProcessOutput {
    rx: mpsc::Receiver<ProcessEvent>,
}

impl ProcessOutput {
    /// Next event in source order
    pub async fn recv(&mut self) -> Option<ProcessEvent> {
        self.rx.recv().await
    }

    /// Next captured line, skipping stream errors; `None` once the process exited
    pub async fn next_line(&mut self) -> Option<(StreamKind, String)> {
        loop {
            match self.rx.recv().await? {
                ProcessEvent::Line { stream, text } => return Some((stream, text)),
                ProcessEvent::StreamError { .. } => continue,
                ProcessEvent::Exited { .. } => return None,
            }
        }
    }
}

impl ProcessHandle {
    /// Spawn `command` with piped stdout/stderr.
    ///
    /// Fails synchronously with [`Error::ExecutableNotFound`] when the program
    /// does not exist, or [`Error::ProcessSpawn`] when the OS refuses to start
    /// it. The returned [`ProcessOutput`] must be drained, otherwise the child
    /// eventually blocks on a full pipe.
    pub fn spawn(command: &LaunchCommand) -> Result<(Self, ProcessOutput)> {
        let program = command.program().to_string();
        info!("Spawning: {}", command.display());

        let mut child = command.to_command()?.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::executable_not_found(&program)
            } else {
                Error::process_spawn(&program, e.to_string())
            }
        })?;

        let pid = child.id();
        info!("{} started with PID: {:?}", program, pid);

        let (event_tx, event_rx) = mpsc::channel::<ProcessEvent>(EVENT_CHANNEL_CAPACITY);

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::process("stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::process("stderr was not captured"))?;

        let readers = [
            tokio::spawn(read_stream(stdout, StreamKind::Stdout, event_tx.clone())),
            tokio::spawn(read_stream(stderr, StreamKind::Stderr, event_tx.clone())),
        ];

        let (exit_tx, exit_rx) = watch::channel(None);
        let (terminate_tx, terminate_rx) = oneshot::channel::<Duration>();

        tokio::spawn(wait_for_exit(
            child,
            pid,
            terminate_rx,
            readers,
            event_tx,
            exit_tx,
        ));

        let handle = Self {
            program,
            pid,
            terminate_tx: Some(terminate_tx),
            exit_rx,
        };
        Ok((handle, ProcessOutput { rx: event_rx }))
    }

    /// Ask the process to exit, force-killing it after `grace`.
    ///
    /// Returns once the process has been reaped. Idempotent: terminating an
    /// exited process is a no-op, and a second call simply waits for the first.
    pub async fn terminate(&mut self, grace: Duration) -> Result<()> {
        if self.has_exited() {
            debug!("{} already exited, nothing to terminate", self.program);
            return Ok(());
        }

        if let Some(tx) = self.terminate_tx.take() {
            info!(
                "Terminating {} (PID {:?}) with {:?} grace",
                self.program, self.pid, grace
            );
            // The wait task may have just reaped the process on its own.
            let _ = tx.send(grace);
        }

        let mut exit_rx = self.exit_rx.clone();
        exit_rx
            .wait_for(|exit| exit.is_some())
            .await
            .map_err(|_| Error::ChannelClosed)?;
        Ok(())
    }

    /// Exit code once the process has exited; `None` while running
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_info().and_then(|exit| exit.code)
    }

    pub fn exit_info(&self) -> Option<ExitInfo> {
        *self.exit_rx.borrow()
    }

    /// Non-blocking check backed by the wait task's watch channel
    pub fn has_exited(&self) -> bool {
        self.exit_rx.borrow().is_some()
    }

    pub fn is_running(&self) -> bool {
        !self.has_exited()
    }

    /// Get the process ID
    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("program", &self.program)
            .field("pid", &self.pid)
            .field("exit", &self.exit_info())
            .finish()
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if !self.has_exited() && self.terminate_tx.is_some() {
            // Dropping terminate_tx makes the wait task force-kill the child.
            warn!("ProcessHandle for {} dropped while running", self.program);
        }
    }
}

/// Read one stream line by line until EOF.
///
/// Splits on `\n` (dropping a preceding `\r`), decodes lossily, and flushes a
/// trailing partial line at EOF. Read errors end the stream.
async fn read_stream<R>(stream: R, kind: StreamKind, tx: mpsc::Sender<ProcessEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::with_capacity(256);

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let text = decode_line(&buf);
                trace!("{}: {}", kind, text);
                if tx
                    .send(ProcessEvent::Line { stream: kind, text })
                    .await
                    .is_err()
                {
                    debug!("{} channel closed", kind);
                    break;
                }
            }
            Err(e) => {
                warn!("Error reading {}: {}", kind, e);
                let _ = tx
                    .send(ProcessEvent::StreamError {
                        stream: kind,
                        message: e.to_string(),
                    })
                    .await;
                break;
            }
        }
    }

    debug!("{} reader finished", kind);
}

fn decode_line(raw: &[u8]) -> String {
    let line = raw.strip_suffix(b"\n").unwrap_or(raw);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

/// Background task: owns `child`, reaps it, and emits `ProcessEvent::Exited`
/// after the readers have drained.
///
/// Three ways the process can end:
/// 1. It exits on its own: `child.wait()` resolves.
/// 2. A grace period arrives on `terminate_rx`: graceful stop, then kill.
/// 3. The handle is dropped (`terminate_rx` errors): immediate kill.
async fn wait_for_exit(
    mut child: Child,
    pid: Option<u32>,
    terminate_rx: oneshot::Receiver<Duration>,
    mut readers: [JoinHandle<()>; 2],
    event_tx: mpsc::Sender<ProcessEvent>,
    exit_tx: watch::Sender<Option<ExitInfo>>,
) {
    let (status, requested) = tokio::select! {
        result = child.wait() => (result, false),
        request = terminate_rx => {
            match request {
                Ok(grace) => (terminate_child(&mut child, pid, grace).await, true),
                Err(_) => {
                    info!("Handle dropped, force-killing PID {:?}", pid);
                    (force_kill(&mut child, pid).await, true)
                }
            }
        }
    };

    let code = match status {
        Ok(status) => {
            info!("PID {:?} exited with status: {:?}", pid, status);
            status.code()
        }
        Err(e) => {
            error!("Error waiting for PID {:?}: {}", pid, e);
            None
        }
    };

    let exit = ExitInfo { code, requested };
    // Death is confirmed here; terminate() callers may proceed.
    exit_tx.send_replace(Some(exit));

    let drained = timeout(READER_DRAIN_TIMEOUT, async {
        for reader in readers.iter_mut() {
            let _ = reader.await;
        }
    })
    .await;
    if drained.is_err() {
        warn!("Output of PID {:?} still open after exit, closing it", pid);
        for reader in &readers {
            reader.abort();
        }
    }

    debug!("Sending ProcessEvent::Exited {{ code: {:?} }}", code);
    let _ = event_tx
        .send(ProcessEvent::Exited { code, requested })
        .await;
}

/// Graceful stop with escalation: SIGTERM to the process group, wait up to
/// `grace`, then SIGKILL.
#[cfg(unix)]
async fn terminate_child(
    child: &mut Child,
    pid: Option<u32>,
    grace: Duration,
) -> std::io::Result<std::process::ExitStatus> {
    if let Some(pid) = pid {
        if let Err(e) = signal_group(pid, nix::sys::signal::Signal::SIGTERM) {
            // ESRCH: the group is already gone; fall through to reaping.
            debug!("SIGTERM to process group {} failed: {}", pid, e);
        }
    }

    match timeout(grace, child.wait()).await {
        Ok(result) => return result,
        Err(_) => {
            warn!(
                "PID {:?} did not exit within {:?}, force killing",
                pid, grace
            );
        }
    }

    force_kill(child, pid).await
}

#[cfg(not(unix))]
async fn terminate_child(
    child: &mut Child,
    pid: Option<u32>,
    _grace: Duration,
) -> std::io::Result<std::process::ExitStatus> {
    // No graceful signal available; terminate immediately
    force_kill(child, pid).await
}

async fn force_kill(
    child: &mut Child,
    pid: Option<u32>,
) -> std::io::Result<std::process::ExitStatus> {
    #[cfg(unix)]
    if let Some(pid) = pid {
        if let Err(e) = signal_group(pid, nix::sys::signal::Signal::SIGKILL) {
            debug!("SIGKILL to process group {} failed: {}", pid, e);
        }
    }
    #[cfg(not(unix))]
    let _ = pid;

    if let Err(e) = child.kill().await {
        // Already reaped by the group kill racing with us
        debug!("kill() failed: {}", e);
    }
    child.wait().await
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: nix::sys::signal::Signal) -> nix::Result<()> {
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    let pgid = i32::try_from(pid).map_err(|_| nix::errno::Errno::EINVAL)?;
    killpg(Pid::from_raw(pgid), signal)
}
