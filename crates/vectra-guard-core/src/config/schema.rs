//! Configuration schema, grouped by domain.
//!
//! Every field carries a serde default so partial config files stay valid.

use crate::types::{
    ContainerRuntime, GuardLevel, MaskingMode, NetworkMode, SandboxMode, SecurityLevel, Severity,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GuardConfig {
    pub guard_level: GuardLevelConfig,
    pub policies: PolicyConfig,
    pub production_indicators: ProductionIndicators,
    pub sandbox: SandboxSettings,
    pub env_protection: EnvProtectionConfig,
    pub logging: LoggingConfig,
}

/// Approval gating behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardLevelConfig {
    pub level: GuardLevel,
    pub allow_user_bypass: bool,
    /// Findings at or above this severity require interactive approval.
    pub require_approval_above: Severity,
}

impl Default for GuardLevelConfig {
    fn default() -> Self {
        Self {
            level: GuardLevel::Medium,
            allow_user_bypass: false,
            require_approval_above: Severity::Medium,
        }
    }
}

/// Analyzer policy knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub monitor_git_ops: bool,
    pub block_force_git: bool,
    pub detect_prod_env: bool,
    pub only_destructive_sql: bool,
    /// Glob patterns; a match routes to the host (informational finding only).
    pub allowlist: Vec<String>,
    /// Glob patterns; a match is critical and forces the sandbox.
    pub denylist: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            monitor_git_ops: true,
            block_force_git: true,
            detect_prod_env: true,
            only_destructive_sql: true,
            allowlist: Vec::new(),
            denylist: Vec::new(),
        }
    }
}

/// What counts as "production" for `PROD_ENV_TOUCH`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductionIndicators {
    pub branches: Vec<String>,
    pub keywords: Vec<String>,
}

impl Default for ProductionIndicators {
    fn default() -> Self {
        Self {
            branches: vec!["main".into(), "master".into(), "production".into()],
            keywords: vec!["prod".into(), "production".into(), "live".into()],
        }
    }
}

/// A user-configured bind mount.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindMountSpec {
    pub host_path: String,
    pub container_path: String,
    #[serde(default)]
    pub read_only: bool,
}

/// Sandbox executor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxSettings {
    pub enabled: bool,
    pub mode: SandboxMode,
    pub security_level: SecurityLevel,
    pub runtime: ContainerRuntime,
    pub image: String,
    /// Child execution timeout in seconds.
    pub timeout: u64,
    pub enable_cache: bool,
    /// Extra cache directories mounted read-write (host paths).
    pub cache_dirs: Vec<String>,
    /// Overrides the posture's network mode when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_mode: Option<NetworkMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seccomp_profile: Option<String>,
    pub env_whitelist: Vec<String>,
    pub bind_mounts: Vec<BindMountSpec>,
    /// Overrides the default trust store location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trust_store_path: Option<String>,
    pub enable_metrics: bool,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: SandboxMode::Auto,
            security_level: SecurityLevel::Balanced,
            runtime: ContainerRuntime::Docker,
            image: "ubuntu:24.04".into(),
            timeout: 300,
            enable_cache: true,
            cache_dirs: Vec::new(),
            network_mode: None,
            seccomp_profile: None,
            env_whitelist: vec![
                "PATH".into(),
                "HOME".into(),
                "LANG".into(),
                "TERM".into(),
                "TZ".into(),
            ],
            bind_mounts: Vec::new(),
            trust_store_path: None,
            enable_metrics: true,
        }
    }
}

/// Environment variable protection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvProtectionConfig {
    pub enabled: bool,
    pub masking_mode: MaskingMode,
    /// Name patterns (glob) whose values never reach the child verbatim.
    pub protected_vars: Vec<String>,
    /// Exact names exempt from protection.
    pub allow_read_vars: Vec<String>,
    /// Replacement values used in `fake` masking mode.
    pub fake_values: BTreeMap<String, String>,
    /// Gates the analyzer's sensitive-variable matcher.
    pub block_env_access: bool,
    /// Gates the analyzer's dotenv-read matcher.
    pub block_dotenv_read: bool,
}

impl Default for EnvProtectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            masking_mode: MaskingMode::Remove,
            protected_vars: vec![
                "*TOKEN*".into(),
                "*SECRET*".into(),
                "*KEY*".into(),
                "*PASSWORD*".into(),
            ],
            allow_read_vars: Vec::new(),
            fake_values: BTreeMap::new(),
            block_env_access: true,
            block_dotenv_read: true,
        }
    }
}

/// Log output shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// "text" or "json".
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: "text".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_safe() {
        let cfg = GuardConfig::default();
        assert!(cfg.sandbox.enabled);
        assert_eq!(cfg.sandbox.mode, SandboxMode::Auto);
        assert_eq!(cfg.guard_level.require_approval_above, Severity::Medium);
        assert!(cfg.env_protection.block_dotenv_read);
        assert!(cfg.env_protection.block_env_access);
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let cfg: GuardConfig = serde_yaml::from_str("sandbox:\n  mode: always\n").unwrap();
        assert_eq!(cfg.sandbox.mode, SandboxMode::Always);
        assert!(cfg.sandbox.enabled);
        assert_eq!(cfg.sandbox.security_level, SecurityLevel::Balanced);
    }

    #[test]
    fn roundtrips_through_yaml() {
        let cfg = GuardConfig::default();
        let text = serde_yaml::to_string(&cfg).unwrap();
        let back: GuardConfig = serde_yaml::from_str(&text).unwrap();
        assert_eq!(back.sandbox.image, cfg.sandbox.image);
        assert_eq!(back.policies.only_destructive_sql, true);
    }
}
