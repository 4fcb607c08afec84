//! Persistent trust store: command fingerprint → approval record.
//!
//! One JSON file, mode 0600, rewritten atomically (write-temp, rename) on
//! every mutation. Expired entries are treated as absent on lookup and can be
//! purged with [`TrustStore::clean_expired`].

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Once;

const TRUST_FILE_NAME: &str = "trust.json";

static READ_WARNED: Once = Once::new();

/// A single trusted command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustEntry {
    pub fingerprint: String,
    /// Original command text, kept for audit display.
    pub command_display: String,
    pub added_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub use_count: u64,
    #[serde(default)]
    pub note: String,
}

impl TrustEntry {
    fn expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TrustFile {
    #[serde(default)]
    entries: BTreeMap<String, TrustEntry>,
}

/// Canonical form of a command vector: lowercased, internal whitespace
/// collapsed, joined by single spaces.
pub fn canonical(args: &[String]) -> String {
    args.join(" ")
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// SHA-256 hex fingerprint over the canonical command form.
pub fn fingerprint(args: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical(args).as_bytes());
    hex::encode(hasher.finalize())
}

/// The trust store, loaded into memory and persisted on every mutation.
pub struct TrustStore {
    path: PathBuf,
    entries: BTreeMap<String, TrustEntry>,
}

impl TrustStore {
    /// Default location: `<user-config>/vectra-guard/trust.json`.
    pub fn default_path() -> PathBuf {
        crate::config::user_config_dir().join(TRUST_FILE_NAME)
    }

    /// Open the store at `path`. A missing, unreadable, or malformed file is
    /// treated as empty; read problems warn once per process and the file is
    /// replaced on the next successful mutation.
    pub fn open(path: PathBuf) -> Self {
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<TrustFile>(&content) {
                Ok(file) => file.entries,
                Err(e) => {
                    READ_WARNED.call_once(|| {
                        tracing::warn!(
                            path = %path.display(),
                            "malformed trust store, treating as empty: {}",
                            e
                        );
                    });
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                READ_WARNED.call_once(|| {
                    tracing::warn!(
                        path = %path.display(),
                        "cannot read trust store, running without trust: {}",
                        e
                    );
                });
                BTreeMap::new()
            }
        };
        Self { path, entries }
    }

    /// Non-expired entry for the command vector, if any.
    pub fn lookup(&self, args: &[String]) -> Option<&TrustEntry> {
        self.lookup_at(args, Utc::now())
    }

    fn lookup_at(&self, args: &[String], now: DateTime<Utc>) -> Option<&TrustEntry> {
        self.entries
            .get(&fingerprint(args))
            .filter(|entry| !entry.expired_at(now))
    }

    /// Insert or replace an entry. `ttl` sets `expires_at = now + ttl`.
    pub fn add(&mut self, args: &[String], note: &str, ttl: Option<Duration>) -> Result<()> {
        self.add_at(args, note, ttl, Utc::now())
    }

    fn add_at(
        &mut self,
        args: &[String],
        note: &str,
        ttl: Option<Duration>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let fp = fingerprint(args);
        let entry = TrustEntry {
            fingerprint: fp.clone(),
            command_display: args.join(" "),
            added_at: now,
            expires_at: ttl.map(|d| now + d),
            use_count: 0,
            note: note.to_string(),
        };
        self.entries.insert(fp, entry);
        self.persist()
    }

    /// Delete the entry for the command vector. Returns whether it existed.
    pub fn remove(&mut self, args: &[String]) -> Result<bool> {
        let existed = self.entries.remove(&fingerprint(args)).is_some();
        if existed {
            self.persist()?;
        }
        Ok(existed)
    }

    /// Remove all expired entries; returns how many were dropped.
    pub fn clean_expired(&mut self) -> Result<usize> {
        self.clean_expired_at(Utc::now())
    }

    fn clean_expired_at(&mut self, now: DateTime<Utc>) -> Result<usize> {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.expired_at(now));
        let dropped = before - self.entries.len();
        if dropped > 0 {
            self.persist()?;
        }
        Ok(dropped)
    }

    /// Increment `use_count` for a fingerprint and persist.
    pub fn record_use(&mut self, fp: &str) -> Result<()> {
        if let Some(entry) = self.entries.get_mut(fp) {
            entry.use_count += 1;
            self.persist()?;
        }
        Ok(())
    }

    /// All entries, sorted by `added_at` ascending.
    pub fn list(&self) -> Vec<&TrustEntry> {
        let mut entries: Vec<&TrustEntry> = self.entries.values().collect();
        entries.sort_by_key(|e| e.added_at);
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize the whole store and replace the file atomically.
    fn persist(&self) -> Result<()> {
        let parent = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        std::fs::create_dir_all(&parent)
            .with_context(|| format!("create trust store dir {}", parent.display()))?;

        let file = TrustFile {
            entries: self.entries.clone(),
        };
        let content = serde_json::to_string_pretty(&file).context("serialize trust store")?;

        let tmp = tempfile::NamedTempFile::new_in(&parent).context("create trust temp file")?;
        std::fs::write(tmp.path(), content).context("write trust temp file")?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(0o600))
                .context("set trust store mode")?;
        }
        tmp.persist(&self.path)
            .with_context(|| format!("replace trust store {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn argv(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn canonical_collapses_whitespace_and_case() {
        assert_eq!(canonical(&argv("NPM   test")), "npm test");
        assert_eq!(
            fingerprint(&argv("npm test")),
            fingerprint(&argv("NPM    TEST"))
        );
    }

    #[test]
    fn add_lookup_remove_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("trust.json");
        let mut store = TrustStore::open(path.clone());

        store.add(&argv("npm test"), "ci", None).unwrap();
        assert!(store.lookup(&argv("npm test")).is_some());

        // Reopen from disk: the entry must survive a restart.
        let reopened = TrustStore::open(path.clone());
        assert_eq!(reopened.list().len(), 1);
        assert_eq!(reopened.list()[0].command_display, "npm test");

        let mut store = reopened;
        assert!(store.remove(&argv("npm test")).unwrap());
        assert!(TrustStore::open(path).is_empty());
    }

    #[test]
    fn expired_entries_are_absent_and_cleanable() {
        let dir = TempDir::new().unwrap();
        let mut store = TrustStore::open(dir.path().join("trust.json"));
        let now = Utc::now();

        store
            .add_at(&argv("npm test"), "", Some(Duration::hours(24)), now)
            .unwrap();
        assert!(store.lookup_at(&argv("npm test"), now).is_some());

        let later = now + Duration::hours(25);
        assert!(store.lookup_at(&argv("npm test"), later).is_none());
        assert_eq!(store.clean_expired_at(later).unwrap(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn record_use_increments_and_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("trust.json");
        let mut store = TrustStore::open(path.clone());
        store.add(&argv("cargo build"), "", None).unwrap();

        let fp = fingerprint(&argv("cargo build"));
        store.record_use(&fp).unwrap();
        store.record_use(&fp).unwrap();

        let reopened = TrustStore::open(path);
        assert_eq!(reopened.lookup(&argv("cargo build")).unwrap().use_count, 2);
    }

    #[test]
    fn malformed_file_is_treated_as_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("trust.json");
        std::fs::write(&path, "{ not json").unwrap();
        let store = TrustStore::open(path);
        assert!(store.is_empty());
    }

    #[test]
    fn list_is_sorted_by_added_at() {
        let dir = TempDir::new().unwrap();
        let mut store = TrustStore::open(dir.path().join("trust.json"));
        let base = Utc::now();
        store
            .add_at(&argv("second"), "", None, base + Duration::seconds(10))
            .unwrap();
        store.add_at(&argv("first"), "", None, base).unwrap();

        let listed = store.list();
        assert_eq!(listed[0].command_display, "first");
        assert_eq!(listed[1].command_display, "second");
    }
}
