//! Optional long-lived workspace daemon.
//!
//! At most one instance per workspace, enforced by an exclusive-create
//! lockfile plus a PID file. Beyond the main thread it runs two workers: an
//! approval queue (bounded channel, deny-by-default on timeout) and an
//! integrity ticker that re-checks the session file and PID file.

use crate::ledger::{Session, SessionLedger};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

pub const DAEMON_DIR: &str = ".vectra-guard/daemon";
pub const PID_FILE: &str = "daemon.pid";
pub const LOCK_FILE: &str = "daemon.lock";

/// Approval queue depth.
pub const QUEUE_CAPACITY: usize = 100;

/// Hard deadline for one approval round-trip.
pub const SUBMIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Integrity check cadence.
pub const TICK_INTERVAL: Duration = Duration::from_secs(5);

const WORKER_POLL: Duration = Duration::from_millis(100);

/// Process-wide flag set by SIGINT/SIGTERM/SIGQUIT.
static SIGNALLED: AtomicBool = AtomicBool::new(false);

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("daemon already running for this workspace (pid {0})")]
    AlreadyRunning(u32),
    #[error("failed to acquire daemon lock: {0}")]
    Lock(#[source] std::io::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Ledger(#[from] anyhow::Error),
}

struct ApprovalRequest {
    command: String,
    reply: SyncSender<bool>,
}

/// The running daemon. Dropping it tears everything down: intake stops, the
/// session is ended through the ledger, and the lock and PID files are
/// removed.
pub struct Daemon {
    dir: PathBuf,
    ledger: SessionLedger,
    session: Option<Session>,
    tx: Option<SyncSender<ApprovalRequest>>,
    shutdown: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl Daemon {
    /// Start the daemon for a workspace. `approver` decides each queued
    /// submission; it runs on the processor thread, one request at a time.
    pub fn start(
        workspace: &Path,
        session: Session,
        approver: Box<dyn Fn(&str) -> bool + Send>,
    ) -> Result<Self, DaemonError> {
        let dir = workspace.join(DAEMON_DIR);
        std::fs::create_dir_all(&dir)?;
        acquire_lock(&dir)?;

        let pid_path = dir.join(PID_FILE);
        let mut pid_file = std::fs::File::create(&pid_path)?;
        writeln!(pid_file, "{}", std::process::id())?;

        let ledger = SessionLedger::new(workspace);
        let shutdown = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::sync_channel::<ApprovalRequest>(QUEUE_CAPACITY);

        let mut workers = Vec::new();
        workers.push(spawn_processor(rx, approver, Arc::clone(&shutdown)));
        workers.push(spawn_ticker(
            ledger.session_path(&session.id),
            pid_path,
            Arc::clone(&shutdown),
        ));

        Ok(Self {
            dir,
            ledger,
            session: Some(session),
            tx: Some(tx),
            shutdown,
            workers,
        })
    }

    /// Submit a command for approval. Denied when the queue is full, the
    /// daemon is shutting down, or no verdict arrives within the deadline.
    pub fn submit(&self, command: &str) -> bool {
        if self.shutdown.load(Ordering::SeqCst) {
            return false;
        }
        let Some(tx) = &self.tx else {
            return false;
        };
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        let request = ApprovalRequest {
            command: command.to_string(),
            reply: reply_tx,
        };
        if tx.try_send(request).is_err() {
            tracing::warn!("approval queue full or closed, denying: {}", command);
            return false;
        }
        reply_rx.recv_timeout(SUBMIT_TIMEOUT).unwrap_or(false)
    }

    /// Whether a termination signal has been observed (see
    /// [`install_signal_hooks`]).
    pub fn signalled() -> bool {
        SIGNALLED.load(Ordering::SeqCst)
    }

    /// Orderly teardown; also runs on drop.
    pub fn shutdown(mut self) -> Result<(), DaemonError> {
        self.teardown();
        Ok(())
    }

    fn teardown(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.tx.take(); // close intake
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        if let Some(mut session) = self.session.take() {
            if let Err(e) = self.ledger.end(&mut session) {
                tracing::error!("failed to end session on daemon shutdown: {:#}", e);
            }
        }
        let _ = std::fs::remove_file(self.dir.join(PID_FILE));
        let _ = std::fs::remove_file(self.dir.join(LOCK_FILE));
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        if self.session.is_some() {
            self.teardown();
        }
    }
}

fn spawn_processor(
    rx: Receiver<ApprovalRequest>,
    approver: Box<dyn Fn(&str) -> bool + Send>,
    shutdown: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        while !shutdown.load(Ordering::SeqCst) {
            match rx.recv_timeout(WORKER_POLL) {
                Ok(request) => {
                    let approved = approver(&request.command);
                    tracing::info!(
                        command = %request.command,
                        approved,
                        "approval queue decision"
                    );
                    let _ = request.reply.send(approved);
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }
    })
}

fn spawn_ticker(
    session_path: PathBuf,
    pid_path: PathBuf,
    shutdown: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let mut elapsed = Duration::ZERO;
        while !shutdown.load(Ordering::SeqCst) {
            std::thread::sleep(WORKER_POLL);
            elapsed += WORKER_POLL;
            if elapsed < TICK_INTERVAL {
                continue;
            }
            elapsed = Duration::ZERO;

            if !session_path.exists() {
                tracing::warn!(path = %session_path.display(), "session file disappeared");
            }
            match std::fs::read_to_string(&pid_path) {
                Ok(content) => {
                    let ours = std::process::id().to_string();
                    if content.trim() != ours {
                        tracing::warn!(
                            found = %content.trim(),
                            expected = %ours,
                            "pid file no longer matches this process"
                        );
                    }
                }
                Err(e) => tracing::warn!("pid file unreadable: {}", e),
            }
        }
    })
}

fn acquire_lock(dir: &Path) -> Result<(), DaemonError> {
    let lock_path = dir.join(LOCK_FILE);
    match OpenOptions::new().write(true).create_new(true).open(&lock_path) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            // A previous daemon may have died without cleanup; reclaim only
            // when its pid is provably gone.
            if let Some(pid) = live_daemon_pid(dir) {
                return Err(DaemonError::AlreadyRunning(pid));
            }
            tracing::warn!("reclaiming stale daemon lock in {}", dir.display());
            let _ = std::fs::remove_file(&lock_path);
            let _ = std::fs::remove_file(dir.join(PID_FILE));
            OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
                .map(|_| ())
                .map_err(DaemonError::Lock)
        }
        Err(e) => Err(DaemonError::Lock(e)),
    }
}

/// Pid from the workspace's daemon PID file, if that process is alive.
pub fn live_daemon_pid(dir: &Path) -> Option<u32> {
    let content = std::fs::read_to_string(dir.join(PID_FILE)).ok()?;
    let pid: u32 = content.trim().parse().ok()?;
    if pid_alive(pid) {
        Some(pid)
    } else {
        None
    }
}

#[cfg(unix)]
fn pid_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

#[cfg(not(unix))]
fn pid_alive(_pid: u32) -> bool {
    true
}

/// Install SIGINT/SIGTERM/SIGQUIT handlers that flip the process-wide
/// shutdown flag. The embedding loop should poll [`Daemon::signalled`] and
/// call [`Daemon::shutdown`] when it trips.
#[cfg(unix)]
pub fn install_signal_hooks() -> std::io::Result<()> {
    use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

    extern "C" fn on_signal(_sig: nix::libc::c_int) {
        SIGNALLED.store(true, Ordering::SeqCst);
    }

    let action = SigAction::new(
        SigHandler::Handler(on_signal),
        SaFlags::empty(),
        SigSet::empty(),
    );
    for signal in [Signal::SIGINT, Signal::SIGTERM, Signal::SIGQUIT] {
        unsafe {
            sigaction(signal, &action).map_err(std::io::Error::from)?;
        }
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn install_signal_hooks() -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn start_daemon(
        workspace: &Path,
        approver: Box<dyn Fn(&str) -> bool + Send>,
    ) -> (Daemon, String) {
        let ledger = SessionLedger::new(workspace);
        let session = ledger.start("daemon-test", workspace).unwrap();
        let id = session.id.clone();
        let daemon = Daemon::start(workspace, session, approver).unwrap();
        (daemon, id)
    }

    #[test]
    fn submit_round_trips_through_the_queue() {
        let dir = TempDir::new().unwrap();
        let (daemon, _) = start_daemon(dir.path(), Box::new(|cmd| cmd.starts_with("ls")));

        assert!(daemon.submit("ls -la"));
        assert!(!daemon.submit("rm -rf /"));

        daemon.shutdown().unwrap();
    }

    #[test]
    fn second_daemon_is_rejected_while_first_lives() {
        let dir = TempDir::new().unwrap();
        let (daemon, _) = start_daemon(dir.path(), Box::new(|_| true));

        let ledger = SessionLedger::new(dir.path());
        let session = ledger.start("second", dir.path()).unwrap();
        match Daemon::start(dir.path(), session, Box::new(|_| true)) {
            Err(DaemonError::AlreadyRunning(_)) => {}
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("second daemon must be rejected"),
        }

        daemon.shutdown().unwrap();
    }

    #[test]
    fn shutdown_cleans_lock_pid_and_ends_session() {
        let dir = TempDir::new().unwrap();
        let (daemon, session_id) = start_daemon(dir.path(), Box::new(|_| true));
        let daemon_dir = dir.path().join(DAEMON_DIR);
        assert!(daemon_dir.join(LOCK_FILE).exists());
        assert!(daemon_dir.join(PID_FILE).exists());

        daemon.shutdown().unwrap();
        assert!(!daemon_dir.join(LOCK_FILE).exists());
        assert!(!daemon_dir.join(PID_FILE).exists());

        let session = SessionLedger::new(dir.path()).load(&session_id).unwrap();
        assert!(session.end_time.is_some());
    }

    #[test]
    fn stale_lock_is_reclaimed() {
        let dir = TempDir::new().unwrap();
        let daemon_dir = dir.path().join(DAEMON_DIR);
        std::fs::create_dir_all(&daemon_dir).unwrap();
        std::fs::write(daemon_dir.join(LOCK_FILE), "").unwrap();
        // A pid that is certainly dead: a child we already reaped.
        let mut reaped = std::process::Command::new("true").spawn().unwrap();
        let dead_pid = reaped.id();
        reaped.wait().unwrap();
        std::fs::write(daemon_dir.join(PID_FILE), format!("{}", dead_pid)).unwrap();

        let (daemon, _) = start_daemon(dir.path(), Box::new(|_| true));
        daemon.shutdown().unwrap();
    }

    #[test]
    fn submissions_after_shutdown_flag_are_denied() {
        let dir = TempDir::new().unwrap();
        let (daemon, _) = start_daemon(dir.path(), Box::new(|_| true));
        daemon.shutdown.store(true, Ordering::SeqCst);
        assert!(!daemon.submit("echo hi"));
    }
}
