use anyhow::Context;
use std::io::Read;
use std::process::{Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug)]
pub struct CommandRunResult {
    /// `None` if the child could not be reaped after a kill.
    pub status: Option<ExitStatus>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

/// Read a pipe to EOF on its own thread so a chatty child never blocks on a
/// full buffer.
fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// Run `command` to completion, killing it once `timeout` elapses.
/// `None` waits indefinitely.
pub fn run_command_with_timeout(
    command: &mut Command,
    timeout: Option<Duration>,
) -> anyhow::Result<CommandRunResult> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .context("Failed to start command")?;

    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    // A deadline past the clock's range is no deadline at all.
    let deadline = timeout.and_then(|limit| Instant::now().checked_add(limit));
    let mut timed_out = false;
    let status = loop {
        if let Some(status) = child.try_wait().context("Failed to wait for command")? {
            break Some(status);
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            timed_out = true;
            let _ = child.kill();
            break child.wait().ok();
        }
        thread::sleep(POLL_INTERVAL);
    };

    let collect = |handle: Option<JoinHandle<String>>| {
        handle
            .and_then(|h| h.join().ok())
            .unwrap_or_default()
    };

    Ok(CommandRunResult {
        status,
        stdout: collect(stdout),
        stderr: collect(stderr),
        timed_out,
    })
}
