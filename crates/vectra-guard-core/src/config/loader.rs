//! Config file discovery and env-var override helpers.
//!
//! Search order: `./vectra-guard.yaml`, then
//! `<user-config>/vectra-guard/config.yaml`. The project file wins.

use super::env_keys;
use super::schema::GuardConfig;
use crate::types::GuardLevel;
use std::env;
use std::path::{Path, PathBuf};

pub const PROJECT_CONFIG_NAME: &str = "vectra-guard.yaml";
pub const USER_CONFIG_NAME: &str = "config.yaml";
pub const CONFIG_DIR_NAME: &str = "vectra-guard";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// The per-user config directory (`<user-config>/vectra-guard`).
pub fn user_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

/// Load configuration for the given working directory.
///
/// Missing files are fine (defaults apply); a present-but-malformed file is a
/// hard error so a typo cannot silently weaken the policy. The
/// `VECTRA_GUARD_LEVEL` env var overrides `guard_level.level` for this
/// invocation only; `off` also disables approval gating.
pub fn load(project_dir: &Path) -> Result<GuardConfig, ConfigError> {
    let project = project_dir.join(PROJECT_CONFIG_NAME);
    let user = user_config_dir().join(USER_CONFIG_NAME);

    let mut cfg = if project.exists() {
        read_config(&project)?
    } else if user.exists() {
        read_config(&user)?
    } else {
        GuardConfig::default()
    };

    if let Some(level) = env_optional(env_keys::GUARD_LEVEL, &[]) {
        match level.parse::<GuardLevel>() {
            Ok(parsed) => cfg.guard_level.level = parsed,
            Err(e) => tracing::warn!("ignoring {}: {}", env_keys::GUARD_LEVEL, e),
        }
    }

    Ok(cfg)
}

fn read_config(path: &Path) -> Result<GuardConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Read an env var from the primary name or an alias chain, else a default.
pub fn env_or<F>(primary: &str, aliases: &[&str], default: F) -> String
where
    F: FnOnce() -> String,
{
    env::var(primary)
        .ok()
        .or_else(|| aliases.iter().find_map(|a| env::var(a).ok()))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(default)
}

/// Read an env var; empty values count as unset.
pub fn env_optional(primary: &str, aliases: &[&str]) -> Option<String> {
    env::var(primary)
        .ok()
        .or_else(|| aliases.iter().find_map(|a| env::var(a).ok()))
        .and_then(|s| {
            let s = s.trim().to_string();
            if s.is_empty() {
                None
            } else {
                Some(s)
            }
        })
}

/// Boolean env var: 0/false/no/off are false, anything else set is true.
pub fn env_bool(primary: &str, aliases: &[&str], default: bool) -> bool {
    let v = env::var(primary)
        .ok()
        .or_else(|| aliases.iter().find_map(|a| env::var(a).ok()));
    match v.as_deref() {
        Some(s) => !matches!(
            s.trim().to_lowercase().as_str(),
            "0" | "false" | "no" | "off"
        ),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_files_yield_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = load(dir.path()).unwrap();
        assert!(cfg.sandbox.enabled);
    }

    #[test]
    fn project_file_is_used() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(PROJECT_CONFIG_NAME),
            "sandbox:\n  image: alpine:3.20\n",
        )
        .unwrap();
        let cfg = load(dir.path()).unwrap();
        assert_eq!(cfg.sandbox.image, "alpine:3.20");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(PROJECT_CONFIG_NAME), "sandbox: [not a map").unwrap();
        assert!(load(dir.path()).is_err());
    }
}
