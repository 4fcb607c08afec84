//! Vectra Guard session layer: the append-only per-workspace ledger and the
//! optional long-lived workspace daemon.

pub mod daemon;
pub mod ledger;

pub use daemon::{Daemon, DaemonError};
pub use ledger::{
    CommandRecord, FileOperationRecord, Session, SessionLedger, SESSION_ID_ENV,
};
