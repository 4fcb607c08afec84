//! Observability: tracing init and the append-only audit JSONL sink.
//!
//! Audit path comes from VECTRAGUARD_AUDIT_LOG; nothing is written when it
//! is unset.

use std::env;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use serde_json::json;
use tracing_subscriber::{prelude::*, EnvFilter};
use vectra_guard_core::config as cfg;

static AUDIT_PATH: Mutex<Option<String>> = Mutex::new(None);

/// Initialize tracing. Call once at process startup.
/// When VECTRAGUARD_QUIET is truthy, only WARN and above are logged.
pub fn init_tracing(format: &str) {
    let level: String = if is_quiet() {
        "vectra_guard=warn".to_string()
    } else {
        env::var(cfg::LOG_LEVEL).unwrap_or_else(|_| "vectra_guard=info".to_string())
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let json = env::var(cfg::LOG_JSON)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes"))
        .unwrap_or(format == "json");

    let _ = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };
}

fn is_quiet() -> bool {
    env::var(cfg::QUIET)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes"))
        .unwrap_or(false)
}

fn get_audit_path() -> Option<String> {
    {
        let guard = AUDIT_PATH.lock().ok()?;
        if let Some(ref p) = *guard {
            return Some(p.clone());
        }
    }
    let path = env::var(cfg::AUDIT_LOG).ok()?;
    if path.is_empty() {
        return None;
    }
    if let Some(parent) = Path::new(&path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    {
        let mut guard = AUDIT_PATH.lock().ok()?;
        *guard = Some(path.clone());
    }
    Some(path)
}

fn append_jsonl(path: &str, record: &serde_json::Value) {
    if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(path) {
        if let Ok(line) = serde_json::to_string(record) {
            let _ = writeln!(f, "{}", line);
        }
    }
}

/// Audit: command entered the pipeline.
pub fn audit_command_invoked(command: &str, args: &[String], workspace: &str) {
    if let Some(path) = get_audit_path() {
        let record = json!({
            "ts": Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            "event": "command_invoked",
            "command": command,
            "args": args,
            "workspace": workspace,
        });
        append_jsonl(&path, &record);
    }
}

/// Audit: approval prompt shown.
pub fn audit_confirmation_requested(command: &str, findings_count: usize, severity: &str) {
    if let Some(path) = get_audit_path() {
        let record = json!({
            "ts": Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            "event": "confirmation_requested",
            "command": command,
            "findings_count": findings_count,
            "severity": severity,
        });
        append_jsonl(&path, &record);
    }
}

/// Audit: approval verdict. `source` is "user", "trust", "bypass", or
/// "non-interactive".
pub fn audit_confirmation_response(command: &str, approved: bool, source: &str) {
    if let Some(path) = get_audit_path() {
        let record = json!({
            "ts": Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            "event": "confirmation_response",
            "command": command,
            "approved": approved,
            "source": source,
        });
        append_jsonl(&path, &record);
    }
}

/// Audit: child finished.
pub fn audit_execution_completed(command: &str, exit_code: i32, duration_ms: u64, mode: &str) {
    if let Some(path) = get_audit_path() {
        let record = json!({
            "ts": Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            "event": "execution_completed",
            "command": command,
            "exit_code": exit_code,
            "duration_ms": duration_ms,
            "mode": mode,
            "success": exit_code == 0,
        });
        append_jsonl(&path, &record);
    }
}

/// Audit: refusal without execution.
pub fn audit_refused(command: &str, reason: &str, codes: &[String]) {
    tracing::warn!(command = %command, reason = %reason, "execution refused");
    if let Some(path) = get_audit_path() {
        let record = json!({
            "ts": Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            "event": "execution_refused",
            "command": command,
            "reason": reason,
            "codes": codes,
        });
        append_jsonl(&path, &record);
    }
}
