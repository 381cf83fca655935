//! Helpers for running child processes with timeouts and bounded output.

use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Extra time given to the output readers once the child has been waited on.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

type ReadResult = Result<(Vec<u8>, usize)>;

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    /// Stdout as text, with a notice appended when bytes were dropped.
    pub fn stdout_text(&self) -> String {
        lossy_with_notice(&self.stdout, self.stdout_truncated, "stdout")
    }

    pub fn stderr_text(&self) -> String {
        lossy_with_notice(&self.stderr, self.stderr_truncated, "stderr")
    }
}

fn lossy_with_notice(bytes: &[u8], truncated: usize, label: &str) -> String {
    let mut text = String::from_utf8_lossy(bytes).into_owned();
    if truncated > 0 {
        text.push_str(&format!("\n[{label} truncated {truncated} bytes]\n"));
    }
    text
}

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// stdout/stderr stored in memory (bytes beyond this are discarded while still draining the pipe).
///
/// On Unix the child leads its own process group. The group is killed when the
/// timeout fires and again after a normal exit, so background grandchildren
/// holding the pipes open cannot stall the readers. Readers that are still
/// blocked once the timeout (plus a short grace) has passed are abandoned and
/// the run is reported as timed out.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let deadline = Instant::now() + timeout;
    let stdout_rx = spawn_reader(stdout, output_limit_bytes);
    let stderr_rx = spawn_reader(stderr, output_limit_bytes);

    // The writer runs on its own thread so a child that never reads its input
    // still hits the timeout. Dropping the handle closes the pipe.
    if let Some(input) = stdin {
        let mut child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        let input = input.to_vec();
        thread::spawn(move || {
            if let Err(e) = child_stdin.write_all(&input) {
                warn!(err = %e, "child closed stdin before reading all input");
            }
        });
    }

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            kill_tree(&mut child).context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };
    if !timed_out {
        reap_group(&child);
    }

    let drain_deadline = deadline.max(Instant::now()) + DRAIN_GRACE;
    let stdout = recv_output(&stdout_rx, drain_deadline).context("join stdout")?;
    let stderr = recv_output(&stderr_rx, drain_deadline).context("join stderr")?;
    if stdout.is_none() || stderr.is_none() {
        warn!("output pipes still open after the deadline, abandoning readers");
        timed_out = true;
    }
    let (stdout, stdout_truncated) = stdout.unwrap_or_default();
    let (stderr, stderr_truncated) = stderr.unwrap_or_default();

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

/// Kill the child and, on Unix, every process in its group.
fn kill_tree(child: &mut Child) -> Result<()> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        let pid = i32::try_from(child.id()).context("child pid out of range")?;
        match killpg(Pid::from_raw(pid), Signal::SIGKILL) {
            Ok(()) => return Ok(()),
            Err(errno) => debug!(%errno, "killpg failed, falling back to kill"),
        }
    }
    match child.kill() {
        Ok(()) => Ok(()),
        // Already exited between the timeout and the kill.
        Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Kill whatever the exited child left running in its process group.
#[cfg(unix)]
fn reap_group(child: &Child) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Ok(pid) = i32::try_from(child.id()) else {
        return;
    };
    match killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        Ok(()) => debug!("killed leftover processes in the command's group"),
        Err(Errno::ESRCH) => {}
        Err(errno) => debug!(%errno, "killpg after exit failed"),
    }
}

#[cfg(not(unix))]
fn reap_group(_child: &Child) {}

fn spawn_reader<R: Read + Send + 'static>(reader: R, limit: usize) -> Receiver<ReadResult> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        // The receiver is gone only when the run already gave up on this stream.
        let _ = tx.send(read_stream_limited(reader, limit));
    });
    rx
}

/// Output from a reader, or `None` if it has not finished by `deadline`.
fn recv_output(rx: &Receiver<ReadResult>, deadline: Instant) -> Result<Option<(Vec<u8>, usize)>> {
    match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        Ok(result) => result.map(Some),
        Err(RecvTimeoutError::Timeout) => Ok(None),
        Err(RecvTimeoutError::Disconnected) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}
