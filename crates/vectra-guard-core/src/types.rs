//! Enumerations shared between the analyzer, the decision engine, and the
//! configuration schema.

use serde::{Deserialize, Serialize};

/// Severity of a single finding; ordering is Low < Medium < High < Critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity: {}", other)),
        }
    }
}

/// Overall guard level. `Off` disables approval gating entirely (analysis and
/// mandatory sandbox routing still apply).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GuardLevel {
    Low,
    #[default]
    Medium,
    High,
    Paranoid,
    Off,
}

impl std::str::FromStr for GuardLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(GuardLevel::Low),
            "medium" => Ok(GuardLevel::Medium),
            "high" => Ok(GuardLevel::High),
            "paranoid" => Ok(GuardLevel::Paranoid),
            "off" => Ok(GuardLevel::Off),
            other => Err(format!("unknown guard level: {}", other)),
        }
    }
}

/// When the executor routes commands into isolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SandboxMode {
    #[default]
    Auto,
    Always,
    Risky,
    Never,
}

/// Security posture preset; maps to concrete container/namespace limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    Permissive,
    #[default]
    Balanced,
    Strict,
    Paranoid,
}

/// Isolation backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContainerRuntime {
    #[default]
    Docker,
    Podman,
    /// OS-primitive isolation (namespaces), no container engine.
    Process,
}

impl ContainerRuntime {
    pub fn binary_name(&self) -> &'static str {
        match self {
            ContainerRuntime::Docker => "docker",
            ContainerRuntime::Podman => "podman",
            ContainerRuntime::Process => "process",
        }
    }
}

/// Outbound network stance inside the sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    None,
    Restricted,
    Full,
}

/// How protected environment variables are presented to the child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MaskingMode {
    /// Variable is dropped from the child environment.
    #[default]
    Remove,
    /// Variable is replaced with a configured fake value.
    Fake,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_is_ordered() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn severity_parses_case_insensitively() {
        assert_eq!("CRITICAL".parse::<Severity>().unwrap(), Severity::Critical);
        assert_eq!(" medium ".parse::<Severity>().unwrap(), Severity::Medium);
        assert!("fatal".parse::<Severity>().is_err());
    }

    #[test]
    fn guard_level_parses_off() {
        assert_eq!("off".parse::<GuardLevel>().unwrap(), GuardLevel::Off);
    }
}
