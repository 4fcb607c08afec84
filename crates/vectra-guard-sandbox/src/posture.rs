//! Security postures: how a `SecurityLevel` maps onto concrete container
//! and namespace limits, and the fully-resolved sandbox profile.

use std::path::{Path, PathBuf};
use std::time::Duration;
use vectra_guard_core::config::{GuardConfig, SandboxSettings};
use vectra_guard_core::{NetworkMode, SecurityLevel};

/// The default capability set granted by container engines; `strict` drops
/// everything here except CHOWN, DAC_OVERRIDE, SETUID, SETGID.
const ENGINE_DEFAULT_CAPS: &[&str] = &[
    "AUDIT_WRITE",
    "CHOWN",
    "DAC_OVERRIDE",
    "FOWNER",
    "FSETID",
    "KILL",
    "MKNOD",
    "NET_BIND_SERVICE",
    "NET_RAW",
    "SETFCAP",
    "SETGID",
    "SETPCAP",
    "SETUID",
    "SYS_CHROOT",
];

const STRICT_KEEP: &[&str] = &["CHOWN", "DAC_OVERRIDE", "SETGID", "SETUID"];

/// Concrete limits derived from a [`SecurityLevel`].
#[derive(Debug, Clone)]
pub struct Posture {
    pub network_mode: NetworkMode,
    pub read_only_root: bool,
    /// Sorted for deterministic argument vectors.
    pub cap_drop: Vec<String>,
    pub memory_limit: &'static str,
    pub cpu_limit: &'static str,
    pub pids_limit: u32,
    pub no_new_privileges: bool,
}

impl Posture {
    pub fn for_level(level: SecurityLevel) -> Self {
        match level {
            SecurityLevel::Permissive => Self {
                network_mode: NetworkMode::Full,
                read_only_root: false,
                cap_drop: Vec::new(),
                memory_limit: "2g",
                cpu_limit: "2.0",
                pids_limit: 1024,
                no_new_privileges: false,
            },
            SecurityLevel::Balanced => Self {
                network_mode: NetworkMode::Restricted,
                read_only_root: false,
                cap_drop: sorted(&["NET_RAW", "SYS_ADMIN"]),
                memory_limit: "1g",
                cpu_limit: "1.0",
                pids_limit: 512,
                no_new_privileges: true,
            },
            SecurityLevel::Strict => Self {
                network_mode: NetworkMode::Restricted,
                read_only_root: true,
                cap_drop: strict_cap_drop(),
                memory_limit: "512m",
                cpu_limit: "0.5",
                pids_limit: 256,
                no_new_privileges: true,
            },
            SecurityLevel::Paranoid => Self {
                network_mode: NetworkMode::None,
                read_only_root: true,
                cap_drop: vec!["ALL".to_string()],
                memory_limit: "256m",
                cpu_limit: "0.25",
                pids_limit: 64,
                no_new_privileges: true,
            },
        }
    }
}

fn strict_cap_drop() -> Vec<String> {
    let mut caps: Vec<String> = ENGINE_DEFAULT_CAPS
        .iter()
        .filter(|c| !STRICT_KEEP.contains(c))
        .map(|c| c.to_string())
        .collect();
    caps.sort();
    caps
}

fn sorted(caps: &[&str]) -> Vec<String> {
    let mut caps: Vec<String> = caps.iter().map(|c| c.to_string()).collect();
    caps.sort();
    caps
}

/// A single bind mount, resolved to absolute paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    pub host_path: PathBuf,
    pub container_path: PathBuf,
    pub read_only: bool,
}

/// The fully-resolved sandbox configuration for one execution: posture plus
/// everything the runtime-argument builder needs.
#[derive(Debug, Clone)]
pub struct SandboxProfile {
    pub image: String,
    pub work_dir: PathBuf,
    pub timeout: Duration,
    pub network_mode: NetworkMode,
    pub read_only_root: bool,
    pub cap_drop: Vec<String>,
    pub memory_limit: String,
    pub cpu_limit: String,
    pub pids_limit: u32,
    pub no_new_privileges: bool,
    pub bind_mounts: Vec<BindMount>,
    pub env_whitelist: Vec<String>,
    pub seccomp_profile: Option<PathBuf>,
}

impl SandboxProfile {
    /// Derive the profile from configuration for the given workspace.
    /// `sandbox.network_mode`, when set, overrides the posture's default.
    pub fn from_config(config: &GuardConfig, workspace: &Path) -> Self {
        Self::from_settings(&config.sandbox, workspace)
    }

    pub fn from_settings(settings: &SandboxSettings, workspace: &Path) -> Self {
        let posture = Posture::for_level(settings.security_level);
        Self {
            image: settings.image.clone(),
            work_dir: workspace.to_path_buf(),
            timeout: Duration::from_secs(settings.timeout),
            network_mode: settings.network_mode.unwrap_or(posture.network_mode),
            read_only_root: posture.read_only_root,
            cap_drop: posture.cap_drop,
            memory_limit: posture.memory_limit.to_string(),
            cpu_limit: posture.cpu_limit.to_string(),
            pids_limit: posture.pids_limit,
            no_new_privileges: posture.no_new_privileges,
            bind_mounts: settings
                .bind_mounts
                .iter()
                .map(|m| BindMount {
                    host_path: PathBuf::from(&m.host_path),
                    container_path: PathBuf::from(&m.container_path),
                    read_only: m.read_only,
                })
                .collect(),
            env_whitelist: settings.env_whitelist.clone(),
            seccomp_profile: settings.seccomp_profile.as_ref().map(PathBuf::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn posture_table_matches_levels() {
        let permissive = Posture::for_level(SecurityLevel::Permissive);
        assert_eq!(permissive.network_mode, NetworkMode::Full);
        assert!(permissive.cap_drop.is_empty());
        assert_eq!(permissive.memory_limit, "2g");
        assert!(!permissive.no_new_privileges);

        let balanced = Posture::for_level(SecurityLevel::Balanced);
        assert_eq!(balanced.network_mode, NetworkMode::Restricted);
        assert_eq!(balanced.cap_drop, vec!["NET_RAW", "SYS_ADMIN"]);
        assert_eq!(balanced.memory_limit, "1g");
        assert_eq!(balanced.pids_limit, 512);

        let strict = Posture::for_level(SecurityLevel::Strict);
        assert!(strict.read_only_root);
        assert!(!strict.cap_drop.contains(&"CHOWN".to_string()));
        assert!(!strict.cap_drop.contains(&"SETUID".to_string()));
        assert!(strict.cap_drop.contains(&"SYS_CHROOT".to_string()));
        assert_eq!(strict.memory_limit, "512m");

        let paranoid = Posture::for_level(SecurityLevel::Paranoid);
        assert_eq!(paranoid.network_mode, NetworkMode::None);
        assert_eq!(paranoid.cap_drop, vec!["ALL"]);
        assert_eq!(paranoid.memory_limit, "256m");
        assert_eq!(paranoid.pids_limit, 64);
    }

    #[test]
    fn cap_drop_is_sorted() {
        for level in [
            SecurityLevel::Balanced,
            SecurityLevel::Strict,
            SecurityLevel::Paranoid,
        ] {
            let caps = Posture::for_level(level).cap_drop;
            let mut sorted = caps.clone();
            sorted.sort();
            assert_eq!(caps, sorted);
        }
    }

    #[test]
    fn network_mode_override_wins() {
        let mut settings = SandboxSettings::default();
        settings.security_level = SecurityLevel::Paranoid;
        settings.network_mode = Some(NetworkMode::Full);
        let profile = SandboxProfile::from_settings(&settings, Path::new("/ws"));
        assert_eq!(profile.network_mode, NetworkMode::Full);
        assert!(profile.read_only_root);
    }
}
