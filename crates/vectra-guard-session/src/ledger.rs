//! Append-only session ledger.
//!
//! One JSON file per session under `<workspace>/.vectra-guard/sessions/`.
//! Appends never mutate past records; the risk score only ever grows. Each
//! append rewrites the file atomically (write-temp, rename), which is fine at
//! the scale of a developer session.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use vectra_guard_core::Severity;

/// Env var carrying the active session id across a process tree.
pub const SESSION_ID_ENV: &str = vectra_guard_core::config::SESSION_ID;

pub const SESSIONS_DIR: &str = ".vectra-guard/sessions";

/// One supervised command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRecord {
    pub timestamp: DateTime<Utc>,
    pub command: String,
    pub args: Vec<String>,
    pub exit_code: i32,
    /// Nanoseconds.
    #[serde(rename = "duration")]
    pub duration_ns: u64,
    pub risk_level: Severity,
    pub approved: bool,
    /// Finding codes only.
    pub findings: Vec<String>,
}

/// One observed file operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileOperationRecord {
    pub timestamp: DateTime<Utc>,
    pub path: String,
    pub operation: String,
    pub allowed: bool,
}

/// A session record. `commands` and `file_operations` are append-only;
/// `risk_score` is monotone non-decreasing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub agent_name: String,
    pub workspace: String,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub commands: Vec<CommandRecord>,
    pub file_operations: Vec<FileOperationRecord>,
    pub risk_score: u64,
    pub violations: u64,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Risk-score increment and violation increment for a command.
fn command_deltas(risk: Severity) -> (u64, u64) {
    match risk {
        Severity::Critical => (100, 1),
        Severity::High => (50, 1),
        Severity::Medium => (10, 0),
        Severity::Low => (0, 0),
    }
}

/// Ledger for one workspace.
pub struct SessionLedger {
    root: PathBuf,
}

impl SessionLedger {
    pub fn new(workspace: &Path) -> Self {
        Self {
            root: workspace.join(SESSIONS_DIR),
        }
    }

    pub fn session_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{}.json", id))
    }

    /// Allocate a new session and write its initial record.
    pub fn start(&self, agent_name: &str, workspace: &Path) -> Result<Session> {
        let session = Session {
            id: new_session_id(),
            agent_name: agent_name.to_string(),
            workspace: workspace.display().to_string(),
            start_time: Utc::now(),
            end_time: None,
            commands: Vec::new(),
            file_operations: Vec::new(),
            risk_score: 0,
            violations: 0,
            metadata: BTreeMap::new(),
        };
        self.persist(&session)?;
        Ok(session)
    }

    /// Read and parse a session; missing or malformed files are hard errors.
    pub fn load(&self, id: &str) -> Result<Session> {
        let path = self.session_path(id);
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("read session {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("parse session {}", path.display()))
    }

    /// Mark the session ended and persist.
    pub fn end(&self, session: &mut Session) -> Result<()> {
        session.end_time = Some(Utc::now());
        self.persist(session)
    }

    /// Append a command record, bump the risk score and violation count.
    pub fn add_command(&self, session: &mut Session, record: CommandRecord) -> Result<()> {
        let (risk_delta, violation_delta) = command_deltas(record.risk_level);
        session.commands.push(record);
        session.risk_score += risk_delta;
        session.violations += violation_delta;
        self.persist(session)
    }

    /// Append a file operation; denied operations count as violations.
    pub fn add_file_operation(
        &self,
        session: &mut Session,
        record: FileOperationRecord,
    ) -> Result<()> {
        let denied = !record.allowed;
        session.file_operations.push(record);
        if denied {
            session.risk_score += 25;
            session.violations += 1;
        }
        self.persist(session)
    }

    /// All sessions in the workspace; malformed files are skipped with a
    /// warning.
    pub fn list(&self) -> Vec<Session> {
        let Ok(entries) = std::fs::read_dir(&self.root) else {
            return Vec::new();
        };
        let mut sessions = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match std::fs::read_to_string(&path)
                .map_err(anyhow::Error::from)
                .and_then(|c| serde_json::from_str::<Session>(&c).map_err(anyhow::Error::from))
            {
                Ok(session) => sessions.push(session),
                Err(e) => {
                    tracing::warn!(path = %path.display(), "skipping malformed session: {:#}", e)
                }
            }
        }
        sessions.sort_by(|a, b| a.id.cmp(&b.id));
        sessions
    }

    fn persist(&self, session: &Session) -> Result<()> {
        std::fs::create_dir_all(&self.root)
            .with_context(|| format!("create sessions dir {}", self.root.display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(&self.root, std::fs::Permissions::from_mode(0o755));
        }

        let content = serde_json::to_string_pretty(session).context("serialize session")?;
        let tmp =
            tempfile::NamedTempFile::new_in(&self.root).context("create session temp file")?;
        std::fs::write(tmp.path(), content).context("write session temp file")?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            // Sessions hold no secrets by design; world-readable is fine.
            std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(0o644))
                .context("set session file mode")?;
        }
        let path = self.session_path(&session.id);
        tmp.persist(&path)
            .with_context(|| format!("replace session {}", path.display()))?;
        Ok(())
    }
}

/// Unique within a workspace and sortable by creation time: nanosecond UTC
/// timestamp plus the process id as a disambiguator.
fn new_session_id() -> String {
    let now = Utc::now();
    format!("{}-{:07}", now.format("%Y%m%dT%H%M%S%.9f"), std::process::id())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(risk: Severity, exit_code: i32) -> CommandRecord {
        CommandRecord {
            timestamp: Utc::now(),
            command: "npm".into(),
            args: vec!["npm".into(), "test".into()],
            exit_code,
            duration_ns: 1_500_000,
            risk_level: risk,
            approved: true,
            findings: Vec::new(),
        }
    }

    #[test]
    fn start_persists_an_empty_session() {
        let dir = TempDir::new().unwrap();
        let ledger = SessionLedger::new(dir.path());
        let session = ledger.start("agent", dir.path()).unwrap();
        assert!(ledger.session_path(&session.id).exists());

        let loaded = ledger.load(&session.id).unwrap();
        assert_eq!(loaded.agent_name, "agent");
        assert!(loaded.commands.is_empty());
        assert_eq!(loaded.risk_score, 0);
    }

    #[test]
    fn risk_score_accumulates_per_table() {
        let dir = TempDir::new().unwrap();
        let ledger = SessionLedger::new(dir.path());
        let mut session = ledger.start("agent", dir.path()).unwrap();

        ledger.add_command(&mut session, record(Severity::Low, 0)).unwrap();
        assert_eq!((session.risk_score, session.violations), (0, 0));

        ledger.add_command(&mut session, record(Severity::Medium, 0)).unwrap();
        assert_eq!((session.risk_score, session.violations), (10, 0));

        ledger.add_command(&mut session, record(Severity::High, 1)).unwrap();
        assert_eq!((session.risk_score, session.violations), (60, 1));

        ledger.add_command(&mut session, record(Severity::Critical, 1)).unwrap();
        assert_eq!((session.risk_score, session.violations), (160, 2));

        // Monotone: reload and verify persistence kept everything.
        let loaded = ledger.load(&session.id).unwrap();
        assert_eq!(loaded.commands.len(), 4);
        assert_eq!(loaded.risk_score, 160);
    }

    #[test]
    fn denied_file_operation_counts_as_violation() {
        let dir = TempDir::new().unwrap();
        let ledger = SessionLedger::new(dir.path());
        let mut session = ledger.start("agent", dir.path()).unwrap();

        ledger
            .add_file_operation(
                &mut session,
                FileOperationRecord {
                    timestamp: Utc::now(),
                    path: "/etc/passwd".into(),
                    operation: "read".into(),
                    allowed: false,
                },
            )
            .unwrap();
        assert_eq!(session.risk_score, 25);
        assert_eq!(session.violations, 1);

        ledger
            .add_file_operation(
                &mut session,
                FileOperationRecord {
                    timestamp: Utc::now(),
                    path: "./notes.txt".into(),
                    operation: "write".into(),
                    allowed: true,
                },
            )
            .unwrap();
        assert_eq!(session.risk_score, 25);
        assert_eq!(session.violations, 1);
    }

    #[test]
    fn end_sets_end_time() {
        let dir = TempDir::new().unwrap();
        let ledger = SessionLedger::new(dir.path());
        let mut session = ledger.start("agent", dir.path()).unwrap();
        ledger.end(&mut session).unwrap();
        let loaded = ledger.load(&session.id).unwrap();
        assert!(loaded.end_time.is_some());
    }

    #[test]
    fn list_skips_malformed_files() {
        let dir = TempDir::new().unwrap();
        let ledger = SessionLedger::new(dir.path());
        ledger.start("a", dir.path()).unwrap();
        ledger.start("b", dir.path()).unwrap();
        std::fs::write(dir.path().join(SESSIONS_DIR).join("broken.json"), "{oops").unwrap();

        let sessions = ledger.list();
        assert_eq!(sessions.len(), 2);
    }

    #[test]
    fn ids_are_unique_and_sortable() {
        let a = new_session_id();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = new_session_id();
        assert_ne!(a, b);
        assert!(a < b);
    }

    #[test]
    fn load_missing_session_fails() {
        let dir = TempDir::new().unwrap();
        let ledger = SessionLedger::new(dir.path());
        assert!(ledger.load("nope").is_err());
    }
}
