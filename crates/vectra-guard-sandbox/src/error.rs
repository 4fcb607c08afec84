//! Typed errors surfaced by the sandbox executor.

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// The selected runtime is not usable: binary missing, version probe
    /// failed, or OS isolation primitives unavailable.
    #[error("runtime '{runtime}' unavailable: {reason}")]
    RuntimeUnavailable { runtime: String, reason: String },

    #[error("failed to spawn child process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("failed while waiting for child process: {0}")]
    Wait(#[source] std::io::Error),
}
