//! Vectra Guard sandbox: the static risk analyzer, the host-vs-sandbox
//! decision engine, security postures, container/namespace execution, and
//! the child-process runner.

pub mod analysis;
pub mod common;
pub mod container;
pub mod decision;
pub mod envsan;
pub mod error;
pub mod posture;
pub mod runner;

#[cfg(target_os = "linux")]
pub mod process;

pub use analysis::{risk_level, CommandScanner, Finding};
pub use decision::{decide, ExecutionDecision, ExecutionMode, MANDATORY_SANDBOX_CODES};
pub use error::SandboxError;
pub use posture::{BindMount, SandboxProfile};
pub use runner::{execute, ExecutionOutcome};
