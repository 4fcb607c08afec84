//! Shared child-process plumbing: deadline enforcement with a two-stage
//! termination (SIGTERM, grace period, SIGKILL).

use crate::error::SandboxError;
use std::process::Child;
use std::thread;
use std::time::{Duration, Instant};

/// Grace period between the termination signal and the kill signal.
pub const TERM_GRACE: Duration = Duration::from_secs(5);

/// Poll interval for `try_wait`.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Wait for the child, enforcing `timeout`. On expiry the child receives
/// SIGTERM, then SIGKILL after [`TERM_GRACE`]. Returns the exit code
/// (`-1` when the child died to a signal).
pub fn wait_with_deadline(child: &mut Child, timeout: Duration) -> Result<i32, SandboxError> {
    let start = Instant::now();
    loop {
        match child.try_wait().map_err(SandboxError::Wait)? {
            Some(status) => return Ok(status.code().unwrap_or(-1)),
            None => {
                if start.elapsed() > timeout {
                    return terminate(child);
                }
                thread::sleep(POLL_INTERVAL);
            }
        }
    }
}

fn terminate(child: &mut Child) -> Result<i32, SandboxError> {
    send_term(child);
    let grace_start = Instant::now();
    while grace_start.elapsed() < TERM_GRACE {
        if let Some(status) = child.try_wait().map_err(SandboxError::Wait)? {
            return Ok(status.code().unwrap_or(-1));
        }
        thread::sleep(POLL_INTERVAL);
    }
    let _ = child.kill();
    let status = child.wait().map_err(SandboxError::Wait)?;
    Ok(status.code().unwrap_or(-1))
}

#[cfg(unix)]
fn send_term(child: &Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    let _ = kill(Pid::from_raw(child.id() as i32), Signal::SIGTERM);
}

#[cfg(not(unix))]
fn send_term(child: &Child) {
    // No graceful stage available; the caller's kill() handles it.
    let _ = child;
}
