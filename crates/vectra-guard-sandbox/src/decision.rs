//! Host-vs-sandbox routing.
//!
//! Rules are evaluated in a fixed order and the first match wins. The
//! mandatory rule is pinned first and cannot be disabled by configuration:
//! a critical code routes to the sandbox even when sandboxing is off (the
//! supervisor must then refuse to execute).

use crate::analysis::{codes, Finding};
use globset::{Glob, GlobSetBuilder};
use sha2::{Digest, Sha256};
use vectra_guard_core::config::SandboxSettings;
use vectra_guard_core::{SandboxMode, Severity};

/// Finding codes that force sandbox routing regardless of mode, allowlist,
/// or trust. Order here is documentation only; membership is what matters.
pub const MANDATORY_SANDBOX_CODES: &[&str] = &[
    codes::DANGEROUS_DELETE_ROOT,
    codes::DANGEROUS_DELETE_HOME,
    codes::FORK_BOMB,
    codes::DEVICE_WRITE,
    codes::SENSITIVE_ENV_ACCESS,
    codes::DOTENV_FILE_READ,
    codes::POLICY_DENYLIST,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Host,
    Sandbox,
}

/// Where and how a command will run.
#[derive(Debug, Clone)]
pub struct ExecutionDecision {
    pub mode: ExecutionMode,
    pub reason: &'static str,
    /// Mount package-manager caches into the sandbox.
    pub should_cache: bool,
    /// Stable hash of the command vector, set whenever caching applies.
    pub cache_key: Option<String>,
    /// Forced by a critical code; may not be downgraded by any policy.
    pub mandatory: bool,
}

impl ExecutionDecision {
    fn host(reason: &'static str) -> Self {
        Self {
            mode: ExecutionMode::Host,
            reason,
            should_cache: false,
            cache_key: None,
            mandatory: false,
        }
    }

    fn sandbox(reason: &'static str, mandatory: bool, args: &[String], settings: &SandboxSettings) -> Self {
        Self {
            mode: ExecutionMode::Sandbox,
            reason,
            should_cache: cache_eligible(args, settings.enable_cache),
            cache_key: Some(cache_key(args)),
            mandatory,
        }
    }
}

/// Package managers whose invocations count as networked installs.
const INSTALL_MANAGERS: &[&str] = &[
    "npm", "yarn", "pnpm", "pip", "pip3", "cargo", "go", "gem", "apt", "apt-get", "brew",
];

const INSTALL_VERBS: &[&str] = &["install", "get", "add", "i"];

/// Package managers whose caches are worth mounting.
const CACHED_MANAGERS: &[&str] = &[
    "npm", "yarn", "pnpm", "pip", "pip3", "cargo", "go", "gem", "mvn", "gradle",
];

/// First token is a package manager and some later token is an install verb.
pub fn is_networked_install(args: &[String]) -> bool {
    let Some(first) = args.first() else {
        return false;
    };
    INSTALL_MANAGERS.contains(&first.as_str())
        && args[1..]
            .iter()
            .any(|a| INSTALL_VERBS.contains(&a.as_str()))
}

fn cache_eligible(args: &[String], enable_cache: bool) -> bool {
    enable_cache
        && args
            .first()
            .is_some_and(|first| CACHED_MANAGERS.contains(&first.as_str()))
}

/// SHA-256 over the argv joined by NUL: stable across whitespace variations
/// in any single argument boundary.
pub fn cache_key(args: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(args.join("\0").as_bytes());
    hex::encode(hasher.finalize())
}

/// Evaluate the routing rules in order; the first match fixes the result.
pub fn decide(
    args: &[String],
    risk: Severity,
    findings: &[Finding],
    settings: &SandboxSettings,
    allowlist: &[String],
) -> ExecutionDecision {
    // 1. Mandatory sandbox: fires even with sandboxing disabled.
    if findings
        .iter()
        .any(|f| MANDATORY_SANDBOX_CODES.contains(&f.code.as_str()))
    {
        return ExecutionDecision::sandbox(
            "mandatory sandbox for critical command",
            true,
            args,
            settings,
        );
    }

    // 2. Sandboxing disabled in config.
    if !settings.enabled {
        return ExecutionDecision::host("sandboxing disabled in config");
    }

    // 3. Mode never.
    if settings.mode == SandboxMode::Never {
        return ExecutionDecision::host("sandboxing disabled by mode");
    }

    // 4. Mode always.
    if settings.mode == SandboxMode::Always {
        return ExecutionDecision::sandbox("always-sandbox mode enabled", false, args, settings);
    }

    // 5. Allowlist match (subordinate to rule 1).
    if allowlist_matches(allowlist, args) {
        return ExecutionDecision::host("matches allowlist pattern");
    }

    let networked = is_networked_install(args);

    // 6. Low risk, nothing to isolate.
    if risk == Severity::Low && !networked {
        return ExecutionDecision::host("low risk, no isolation needed");
    }

    // 7. Mode risky: isolate anything medium and above.
    if settings.mode == SandboxMode::Risky && risk >= Severity::Medium {
        return ExecutionDecision::sandbox("risky command isolated", false, args, settings);
    }

    // 8. Mode auto: isolate medium+ risk or networked installs.
    if settings.mode == SandboxMode::Auto && (risk >= Severity::Medium || networked) {
        return ExecutionDecision::sandbox(
            "auto mode isolates elevated risk",
            false,
            args,
            settings,
        );
    }

    // 9. Default.
    ExecutionDecision::host("default host execution")
}

fn allowlist_matches(patterns: &[String], args: &[String]) -> bool {
    if patterns.is_empty() {
        return false;
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        if let Ok(glob) = Glob::new(pattern) {
            builder.add(glob);
        }
    }
    let Ok(set) = builder.build() else {
        return false;
    };
    let joined = args.join(" ");
    set.is_match(joined.as_str())
        || args
            .first()
            .is_some_and(|first| set.is_match(first.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::CommandScanner;
    use vectra_guard_core::config::{EnvProtectionConfig, PolicyConfig, ProductionIndicators};

    fn argv(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    fn analyze(cmd: &str) -> Vec<Finding> {
        CommandScanner::new(
            &PolicyConfig::default(),
            &ProductionIndicators::default(),
            &EnvProtectionConfig::default(),
        )
        .scan_command(&argv(cmd))
    }

    fn settings(mode: SandboxMode, enabled: bool) -> SandboxSettings {
        SandboxSettings {
            enabled,
            mode,
            ..SandboxSettings::default()
        }
    }

    #[test]
    fn mandatory_code_forces_sandbox_even_when_disabled() {
        let args = argv("rm -r /*");
        let findings = analyze("rm -r /*");
        let decision = decide(
            &args,
            Severity::Critical,
            &findings,
            &settings(SandboxMode::Auto, false),
            &["rm*".into()],
        );
        assert_eq!(decision.mode, ExecutionMode::Sandbox);
        assert!(decision.mandatory);
    }

    #[test]
    fn mandatory_beats_allowlist_and_mode_never() {
        let args = argv("cat .env");
        let findings = analyze("cat .env");
        let decision = decide(
            &args,
            Severity::High,
            &findings,
            &settings(SandboxMode::Never, true),
            &["cat *".into()],
        );
        assert_eq!(decision.mode, ExecutionMode::Sandbox);
        assert!(decision.mandatory);
    }

    #[test]
    fn disabled_sandbox_routes_host() {
        let decision = decide(
            &argv("make test"),
            Severity::Medium,
            &[],
            &settings(SandboxMode::Auto, false),
            &[],
        );
        assert_eq!(decision.mode, ExecutionMode::Host);
        assert_eq!(decision.reason, "sandboxing disabled in config");
    }

    #[test]
    fn mode_always_sandboxes_trivia() {
        let decision = decide(
            &argv("echo hi"),
            Severity::Low,
            &[],
            &settings(SandboxMode::Always, true),
            &[],
        );
        assert_eq!(decision.mode, ExecutionMode::Sandbox);
        assert_eq!(decision.reason, "always-sandbox mode enabled");
        assert!(!decision.mandatory);
    }

    #[test]
    fn allowlist_match_routes_host() {
        let decision = decide(
            &argv("echo test"),
            Severity::Low,
            &[],
            &settings(SandboxMode::Auto, true),
            &["echo".into(), "ls".into()],
        );
        assert_eq!(decision.mode, ExecutionMode::Host);
        assert_eq!(decision.reason, "matches allowlist pattern");
    }

    #[test]
    fn low_risk_runs_on_host() {
        let decision = decide(
            &argv("ls -la"),
            Severity::Low,
            &[],
            &settings(SandboxMode::Auto, true),
            &[],
        );
        assert_eq!(decision.mode, ExecutionMode::Host);
        assert_eq!(decision.reason, "low risk, no isolation needed");
    }

    #[test]
    fn networked_install_is_sandboxed_with_cache() {
        let mut s = settings(SandboxMode::Auto, true);
        s.enable_cache = true;
        let decision = decide(&argv("npm install express"), Severity::Low, &[], &s, &[]);
        assert_eq!(decision.mode, ExecutionMode::Sandbox);
        assert!(decision.should_cache);
        assert!(decision.cache_key.is_some());
    }

    #[test]
    fn networked_install_detection() {
        assert!(is_networked_install(&argv("npm install express")));
        assert!(is_networked_install(&argv("cargo add serde")));
        assert!(is_networked_install(&argv("go get example.com/pkg")));
        assert!(is_networked_install(&argv("npm i left-pad")));
        assert!(!is_networked_install(&argv("npm run build")));
        assert!(!is_networked_install(&argv("make install")));
    }

    #[test]
    fn risky_mode_isolates_medium_and_above() {
        let decision = decide(
            &argv("sudo -i"),
            Severity::Medium,
            &[],
            &settings(SandboxMode::Risky, true),
            &[],
        );
        assert_eq!(decision.mode, ExecutionMode::Sandbox);
    }

    #[test]
    fn cache_key_is_stable_and_boundary_sensitive() {
        let a = cache_key(&argv("npm install express"));
        let b = cache_key(&argv("npm install express"));
        assert_eq!(a, b);
        let c = cache_key(&["npm".into(), "install express".into()]);
        assert_ne!(a, c);
    }
}
