//! `session`: ledger surface.

use anyhow::Result;
use std::path::Path;
use vectra_guard_session::SessionLedger;

/// Start a new session and print its id on stdout (callers capture it into
/// VECTRAGUARD_SESSION_ID).
pub fn cmd_start(agent: &str, workspace: &Path) -> Result<i32> {
    let ledger = SessionLedger::new(workspace);
    let session = ledger.start(agent, workspace)?;
    println!("{}", session.id);
    Ok(0)
}

pub fn cmd_end(workspace: &Path, id: &str) -> Result<i32> {
    let ledger = SessionLedger::new(workspace);
    let mut session = ledger.load(id)?;
    ledger.end(&mut session)?;
    println!("Session {} ended", id);
    Ok(0)
}

pub fn cmd_list(workspace: &Path) -> Result<i32> {
    let sessions = SessionLedger::new(workspace).list();
    if sessions.is_empty() {
        println!("No sessions in {}", workspace.display());
        return Ok(0);
    }
    println!(
        "{:<42} {:<14} {:>6} {:>10} {:>10}  STATUS",
        "ID", "AGENT", "CMDS", "RISK", "VIOLATIONS"
    );
    for session in sessions {
        let status = if session.end_time.is_some() {
            "ended"
        } else {
            "active"
        };
        println!(
            "{:<42} {:<14} {:>6} {:>10} {:>10}  {}",
            session.id,
            session.agent_name,
            session.commands.len(),
            session.risk_score,
            session.violations,
            status
        );
    }
    Ok(0)
}

pub fn cmd_show(workspace: &Path, id: &str) -> Result<i32> {
    let session = SessionLedger::new(workspace).load(id)?;
    println!("{}", serde_json::to_string_pretty(&session)?);
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn start_end_show_roundtrip() {
        let dir = TempDir::new().unwrap();
        let ledger = SessionLedger::new(dir.path());

        assert_eq!(cmd_start("agent", dir.path()).unwrap(), 0);
        let sessions = ledger.list();
        let id = &sessions[0].id;
        assert_eq!(cmd_end(dir.path(), id).unwrap(), 0);
        assert_eq!(cmd_show(dir.path(), id).unwrap(), 0);
        assert_eq!(cmd_list(dir.path()).unwrap(), 0);
    }
}
