//! `trust`: trust store surface.

use anyhow::{bail, Result};
use chrono::Duration;
use vectra_guard_core::trust::TrustStore;
use vectra_guard_core::GuardConfig;

fn open_store(config: &GuardConfig) -> TrustStore {
    let path = config
        .sandbox
        .trust_store_path
        .as_ref()
        .map(std::path::PathBuf::from)
        .unwrap_or_else(TrustStore::default_path);
    TrustStore::open(path)
}

fn argv(command: &str) -> Vec<String> {
    command.split_whitespace().map(String::from).collect()
}

/// Parse "90s", "30m", "24h", "7d".
fn parse_duration(text: &str) -> Result<Duration> {
    let text = text.trim();
    let Some((idx, unit)) = text.char_indices().last() else {
        bail!("empty duration");
    };
    let amount: i64 = text[..idx]
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid duration: {}", text))?;
    match unit {
        's' => Ok(Duration::seconds(amount)),
        'm' => Ok(Duration::minutes(amount)),
        'h' => Ok(Duration::hours(amount)),
        'd' => Ok(Duration::days(amount)),
        _ => bail!("invalid duration unit in '{}' (use s, m, h, or d)", text),
    }
}

pub fn cmd_list(config: &GuardConfig) -> Result<i32> {
    let store = open_store(config);
    let entries = store.list();
    if entries.is_empty() {
        println!("Trust store is empty");
        return Ok(0);
    }
    println!("{:<40} {:>6} {:<25} NOTE", "COMMAND", "USES", "EXPIRES");
    for entry in entries {
        let expires = entry
            .expires_at
            .map(|t| t.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
            .unwrap_or_else(|| "never".to_string());
        println!(
            "{:<40} {:>6} {:<25} {}",
            entry.command_display, entry.use_count, expires, entry.note
        );
    }
    Ok(0)
}

pub fn cmd_add(
    config: &GuardConfig,
    command: &str,
    note: Option<&str>,
    duration: Option<&str>,
) -> Result<i32> {
    let ttl = duration.map(parse_duration).transpose()?;
    let mut store = open_store(config);
    store.add(&argv(command), note.unwrap_or_default(), ttl)?;
    println!("Trusted: {}", command);
    Ok(0)
}

pub fn cmd_remove(config: &GuardConfig, command: &str) -> Result<i32> {
    let mut store = open_store(config);
    if store.remove(&argv(command))? {
        println!("Removed: {}", command);
    } else {
        println!("Not in trust store: {}", command);
    }
    Ok(0)
}

pub fn cmd_clean(config: &GuardConfig) -> Result<i32> {
    let mut store = open_store(config);
    let dropped = store.clean_expired()?;
    println!("Removed {} expired entr{}", dropped, if dropped == 1 { "y" } else { "ies" });
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> GuardConfig {
        let mut config = GuardConfig::default();
        config.sandbox.trust_store_path =
            Some(dir.path().join("trust.json").display().to_string());
        config
    }

    #[test]
    fn duration_parsing() {
        assert_eq!(parse_duration("90s").unwrap(), Duration::seconds(90));
        assert_eq!(parse_duration("30m").unwrap(), Duration::minutes(30));
        assert_eq!(parse_duration("24h").unwrap(), Duration::hours(24));
        assert_eq!(parse_duration("7d").unwrap(), Duration::days(7));
        assert!(parse_duration("7w").is_err());
        assert!(parse_duration("abc").is_err());
    }

    #[test]
    fn add_list_remove_clean() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);

        assert_eq!(cmd_add(&config, "npm test", Some("ci"), None).unwrap(), 0);
        assert_eq!(cmd_list(&config).unwrap(), 0);
        assert_eq!(cmd_remove(&config, "npm test").unwrap(), 0);
        assert_eq!(cmd_clean(&config).unwrap(), 0);

        let store = open_store(&config);
        assert!(store.is_empty());
    }
}
