//! Finding type and stable finding codes.

use serde::{Deserialize, Serialize};
use vectra_guard_core::Severity;

/// Stable finding code identifiers.
pub mod codes {
    pub const DANGEROUS_DELETE_ROOT: &str = "DANGEROUS_DELETE_ROOT";
    pub const DANGEROUS_DELETE_HOME: &str = "DANGEROUS_DELETE_HOME";
    pub const FORK_BOMB: &str = "FORK_BOMB";
    pub const PIPE_TO_SHELL: &str = "PIPE_TO_SHELL";
    pub const SUDO_UNRESTRICTED: &str = "SUDO_UNRESTRICTED";
    pub const FORCE_GIT_PUSH: &str = "FORCE_GIT_PUSH";
    pub const DESTRUCTIVE_SQL: &str = "DESTRUCTIVE_SQL";
    pub const PROD_ENV_TOUCH: &str = "PROD_ENV_TOUCH";
    pub const DOTENV_FILE_READ: &str = "DOTENV_FILE_READ";
    pub const SENSITIVE_ENV_ACCESS: &str = "SENSITIVE_ENV_ACCESS";
    pub const DEVICE_WRITE: &str = "DEVICE_WRITE";
    pub const POLICY_DENYLIST: &str = "POLICY_DENYLIST";
    pub const POLICY_ALLOWLIST: &str = "POLICY_ALLOWLIST";
}

/// A single detected risk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub code: String,
    pub severity: Severity,
    pub description: String,
    pub recommendation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

/// Overall risk: the maximum finding severity, `low` when there are none.
pub fn risk_level(findings: &[Finding]) -> Severity {
    findings
        .iter()
        .map(|f| f.severity)
        .max()
        .unwrap_or(Severity::Low)
}
