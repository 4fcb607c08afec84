//! Write-only metrics sink: named counters persisted as a small JSON file
//! under the user config directory. The pipeline only ever increments;
//! reading and resetting belong to the `metrics` CLI surface.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

const METRICS_FILE_NAME: &str = "metrics.json";

/// Well-known counter names.
pub mod counters {
    pub const COMMANDS_ANALYZED: &str = "commands_analyzed";
    pub const COMMANDS_SANDBOXED: &str = "commands_sandboxed";
    pub const COMMANDS_HOST: &str = "commands_host";
    pub const COMMANDS_BLOCKED: &str = "commands_blocked";
    pub const APPROVALS_GRANTED: &str = "approvals_granted";
    pub const APPROVALS_DENIED: &str = "approvals_denied";
    pub const FINDINGS_TOTAL: &str = "findings_total";
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct MetricsFile {
    #[serde(default)]
    counters: BTreeMap<String, u64>,
}

/// Persistent counter sink. Increments are load-mutate-rewrite; failures are
/// logged and swallowed so metrics can never break the pipeline.
pub struct MetricsSink {
    path: PathBuf,
    enabled: bool,
}

impl MetricsSink {
    pub fn default_path() -> PathBuf {
        crate::config::user_config_dir().join(METRICS_FILE_NAME)
    }

    pub fn new(path: PathBuf, enabled: bool) -> Self {
        Self { path, enabled }
    }

    /// Increment `name` by 1.
    pub fn bump(&self, name: &str) {
        self.bump_by(name, 1);
    }

    /// Increment `name` by `delta`.
    pub fn bump_by(&self, name: &str, delta: u64) {
        if !self.enabled || delta == 0 {
            return;
        }
        if let Err(e) = self.try_bump(name, delta) {
            tracing::debug!("metrics update failed: {:#}", e);
        }
    }

    fn try_bump(&self, name: &str, delta: u64) -> Result<()> {
        let mut file = self.read_file();
        *file.counters.entry(name.to_string()).or_insert(0) += delta;
        self.write_file(&file)
    }

    /// Current counter values, sorted by name.
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.read_file().counters
    }

    /// Drop all counters.
    pub fn reset(&self) -> Result<()> {
        self.write_file(&MetricsFile::default())
    }

    fn read_file(&self) -> MetricsFile {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default()
    }

    fn write_file(&self, file: &MetricsFile) -> Result<()> {
        let parent = self
            .path
            .parent()
            .map(std::path::Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        std::fs::create_dir_all(&parent)
            .with_context(|| format!("create metrics dir {}", parent.display()))?;
        let content = serde_json::to_string_pretty(file).context("serialize metrics")?;
        let tmp = tempfile::NamedTempFile::new_in(&parent).context("create metrics temp file")?;
        std::fs::write(tmp.path(), content).context("write metrics temp file")?;
        tmp.persist(&self.path)
            .with_context(|| format!("replace metrics file {}", self.path.display()))?;
        Ok(())
    }
}
