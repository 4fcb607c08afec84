//! Well-known environment variable names, kept in one place.

/// Active session id, propagated to child processes.
pub const SESSION_ID: &str = "VECTRAGUARD_SESSION_ID";

/// Skip approval for one invocation (honored only when
/// `guard_level.allow_user_bypass` is set and the decision is not mandatory).
pub const BYPASS: &str = "VECTRAGUARD_BYPASS";

/// Per-invocation guard level override: low|medium|high|paranoid|off.
pub const GUARD_LEVEL: &str = "VECTRA_GUARD_LEVEL";

/// Append-only audit JSONL sink path.
pub const AUDIT_LOG: &str = "VECTRAGUARD_AUDIT_LOG";

/// Log filter override (tracing env-filter syntax).
pub const LOG_LEVEL: &str = "VECTRAGUARD_LOG_LEVEL";

/// Emit logs as JSON when truthy.
pub const LOG_JSON: &str = "VECTRAGUARD_LOG_JSON";

/// Only WARN and above when truthy.
pub const QUIET: &str = "VECTRAGUARD_QUIET";
