use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};

/// Drop guard that kills the entire process group (not just the leader PID).
///
/// `kill_on_drop(true)` only signals the child's own PID. When the child is
/// a process-group leader (via `process_group(0)`) and has spawned
/// grandchildren, dropping the `Child` handle leaves them orphaned. This
/// guard sends a signal to the negative PID (the process group) instead.
pub(crate) struct ProcessGroupGuard {
    pid: Option<i32>,
}

impl ProcessGroupGuard {
    fn new(pid: Option<u32>) -> Self {
        Self {
            pid: pid.map(|p| p as i32),
        }
    }

    #[cfg(unix)]
    fn signal(&self, sig: libc::c_int) {
        if let Some(pid) = self.pid {
            unsafe {
                libc::kill(-pid, sig);
            }
        }
    }

    #[cfg(not(unix))]
    fn signal(&self, _sig: i32) {}
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        #[cfg(unix)]
        self.signal(libc::SIGKILL);
    }
}

/// Raw output captured from a completed (or killed) child.
pub(crate) struct ChildOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i32,
    pub timed_out: bool,
}

/// Stream tag for live output chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Build a `Command` isolated in its own process group, with stdin closed
/// and stdout/stderr piped.
pub(crate) fn base_command(program: &str) -> Command {
    let mut cmd = Command::new(program);
    cmd.stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    cmd
}

/// One pipe's read state: the handle (taken once EOF is hit), a running
/// accumulator (trimmed at `max_stream_buffer`), and bytes pending the next
/// coalesced flush.
struct PipeState<R> {
    handle: Option<R>,
    acc: Vec<u8>,
    pending: Vec<u8>,
}

impl<R> PipeState<R> {
    fn new(handle: Option<R>) -> Self {
        Self {
            handle,
            acc: Vec::new(),
            pending: Vec::new(),
        }
    }

    fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    fn absorb(&mut self, chunk: &[u8], max_stream_buffer: usize) {
        self.acc.extend_from_slice(chunk);
        self.pending.extend_from_slice(chunk);
        trim_overflow(&mut self.acc, max_stream_buffer);
    }
}

/// Spawn `cmd`, pump stdout/stderr with coalesced live-output callbacks, and
/// enforce `deadline` with escalation: SIGTERM, wait
/// `sigterm_timeout`, then SIGKILL the process group.
///
/// `on_output` is invoked at most once per `flush_interval` per stream with
/// everything accumulated since the previous flush.
pub(crate) async fn run_with_deadline(
    mut cmd: Command,
    deadline: Duration,
    sigterm_timeout: Duration,
    flush_interval: Duration,
    max_stream_buffer: usize,
    mut on_output: impl FnMut(OutputStream, &str) + Send,
) -> std::io::Result<ChildOutput> {
    let mut child = cmd.spawn()?;
    let guard = ProcessGroupGuard::new(child.id());

    let mut out = PipeState::new(child.stdout.take());
    let mut err = PipeState::new(child.stderr.take());

    let mut flush_timer = tokio::time::interval(flush_interval);
    flush_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut timed_out = false;
    let pump_deadline = tokio::time::sleep(deadline);
    tokio::pin!(pump_deadline);

    let mut out_buf = [0u8; 4096];
    let mut err_buf = [0u8; 4096];

    while out.is_open() || err.is_open() {
        tokio::select! {
            biased;

            _ = &mut pump_deadline, if !timed_out => {
                timed_out = true;
                escalate_kill(&mut child, &guard, sigterm_timeout).await;
            }

            res = read_pipe(&mut out.handle, &mut out_buf), if out.is_open() => {
                apply_read(&mut out, res, &mut out_buf, max_stream_buffer);
            }

            res = read_pipe(&mut err.handle, &mut err_buf), if err.is_open() => {
                apply_read(&mut err, res, &mut err_buf, max_stream_buffer);
            }

            _ = flush_timer.tick() => {
                flush(OutputStream::Stdout, &mut out.pending, &mut on_output);
                flush(OutputStream::Stderr, &mut err.pending, &mut on_output);
            }
        }
    }

    flush(OutputStream::Stdout, &mut out.pending, &mut on_output);
    flush(OutputStream::Stderr, &mut err.pending, &mut on_output);

    let status = child.wait().await?;
    let exit_code = if timed_out {
        1
    } else {
        status.code().unwrap_or(1)
    };

    Ok(ChildOutput {
        stdout: out.acc,
        stderr: err.acc,
        exit_code,
        timed_out,
    })
}

async fn read_pipe<R: AsyncReadExt + Unpin>(
    handle: &mut Option<R>,
    buf: &mut [u8; 4096],
) -> std::io::Result<usize> {
    match handle {
        Some(r) => r.read(buf).await,
        None => std::future::pending().await,
    }
}

fn apply_read<R>(
    state: &mut PipeState<R>,
    result: std::io::Result<usize>,
    buf: &[u8; 4096],
    max_stream_buffer: usize,
) {
    match result {
        Ok(0) | Err(_) => state.handle = None,
        Ok(n) => state.absorb(&buf[..n], max_stream_buffer),
    }
}

fn flush(stream: OutputStream, pending: &mut Vec<u8>, on_output: &mut impl FnMut(OutputStream, &str)) {
    if pending.is_empty() {
        return;
    }
    let text = String::from_utf8_lossy(pending).into_owned();
    on_output(stream, &text);
    pending.clear();
}

/// Stream accumulator overflow: discard the oldest 50% once over the cap.
fn trim_overflow(buf: &mut Vec<u8>, max: usize) {
    if buf.len() <= max {
        return;
    }
    let keep_from = buf.len() - max / 2;
    buf.drain(..keep_from);
}

/// Escalation: SIGTERM, wait `sigterm_timeout` for the child to exit, then
/// SIGKILL the process group. Always best-effort.
async fn escalate_kill(child: &mut Child, guard: &ProcessGroupGuard, sigterm_timeout: Duration) {
    #[cfg(unix)]
    guard.signal(libc::SIGTERM);
    #[cfg(not(unix))]
    let _ = guard;

    if tokio::time::timeout(sigterm_timeout, child.wait())
        .await
        .is_err()
    {
        let _ = child.start_kill();
        #[cfg(unix)]
        guard.signal(libc::SIGKILL);
    }
}
