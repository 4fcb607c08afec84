//! Command/script scanner: runs every matcher over every line, in a fixed
//! order, and deduplicates `(code, line)` pairs.

use super::rules::{self, DevicePatterns, RuleHit, SensitiveEnvPatterns, SqlPatterns};
use super::types::{codes, Finding};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::HashSet;
use vectra_guard_core::config::{EnvProtectionConfig, PolicyConfig, ProductionIndicators};
use vectra_guard_core::Severity;

/// Static risk scanner. Construction compiles all patterns; scanning holds
/// no mutable state, so analysis is idempotent by construction.
pub struct CommandScanner {
    monitor_git_ops: bool,
    block_force_git: bool,
    detect_prod_env: bool,
    only_destructive_sql: bool,
    block_dotenv_read: bool,
    block_env_access: bool,
    keywords: Vec<String>,
    branches: Vec<String>,
    allowlist: Option<GlobSet>,
    denylist: Option<GlobSet>,
    pipe_to_shell: regex::Regex,
    sql: SqlPatterns,
    sensitive_env: SensitiveEnvPatterns,
    device: DevicePatterns,
}

impl CommandScanner {
    pub fn new(
        policies: &PolicyConfig,
        indicators: &ProductionIndicators,
        protection: &EnvProtectionConfig,
    ) -> Self {
        Self {
            monitor_git_ops: policies.monitor_git_ops,
            block_force_git: policies.block_force_git,
            detect_prod_env: policies.detect_prod_env,
            only_destructive_sql: policies.only_destructive_sql,
            block_dotenv_read: protection.block_dotenv_read,
            block_env_access: protection.block_env_access,
            keywords: indicators
                .keywords
                .iter()
                .map(|k| k.to_lowercase())
                .collect(),
            branches: indicators.branches.clone(),
            allowlist: compile_globs(&policies.allowlist, "allowlist"),
            denylist: compile_globs(&policies.denylist, "denylist"),
            pipe_to_shell: regex::Regex::new(
                r"(?i)\b(?:curl|wget)\b[^|]*\|\s*(?:sudo\s+)?(?:sh|bash|zsh|\$SHELL)\b",
            )
            .expect("static regex"),
            sql: SqlPatterns::compile(),
            sensitive_env: SensitiveEnvPatterns::compile(),
            device: DevicePatterns::compile(),
        }
    }

    /// Analyze a single command vector.
    pub fn scan_command(&self, args: &[String]) -> Vec<Finding> {
        let line = args.join(" ");
        let mut seen = HashSet::new();
        let mut findings = Vec::new();
        self.scan_line(&line, 1, &mut findings, &mut seen);
        // Inline commands have no meaningful source location.
        for finding in &mut findings {
            finding.line = None;
        }
        findings
    }

    /// Analyze script content line by line. Empty and full-line comment lines
    /// are skipped; a trailing comment never disables detection.
    pub fn scan_source(&self, content: &str) -> Vec<Finding> {
        let mut seen = HashSet::new();
        let mut findings = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            self.scan_line(line, idx + 1, &mut findings, &mut seen);
        }
        findings
    }

    /// Whether the command matches an allowlist glob (full string, else first
    /// token, so the pattern `echo` allowlists `echo test`).
    pub fn allowlisted(&self, args: &[String]) -> bool {
        self.allowlist
            .as_ref()
            .is_some_and(|set| glob_matches(set, &args.join(" ")))
    }

    fn scan_line(
        &self,
        line: &str,
        lineno: usize,
        out: &mut Vec<Finding>,
        seen: &mut HashSet<(String, usize)>,
    ) {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let mut hits: Vec<RuleHit> = Vec::new();

        // Matcher order is part of the contract: findings for one line are
        // emitted in exactly this sequence.
        if let Some(hit) = rules::match_delete_root(&tokens) {
            hits.push(hit);
        }
        if let Some(hit) = rules::match_delete_home(&tokens) {
            hits.push(hit);
        }
        if let Some(hit) = rules::match_fork_bomb(line) {
            hits.push(hit);
        }
        if let Some(hit) = rules::match_pipe_to_shell(line, &self.pipe_to_shell) {
            hits.push(hit);
        }
        if let Some(hit) = rules::match_sudo_unrestricted(&tokens) {
            hits.push(hit);
        }
        if self.block_force_git {
            if let Some(hit) = rules::match_force_git_push(&tokens) {
                hits.push(hit);
            }
        }
        if let Some(hit) = rules::match_destructive_sql(line, &self.sql, self.only_destructive_sql)
        {
            hits.push(hit);
        }
        if let Some(hit) = rules::match_prod_env_touch(
            line,
            &tokens,
            &self.keywords,
            &self.branches,
            self.detect_prod_env,
            self.monitor_git_ops,
        ) {
            hits.push(hit);
        }
        if self.block_dotenv_read {
            if let Some(hit) = rules::match_dotenv_read(&tokens) {
                hits.push(hit);
            }
        }
        if self.block_env_access {
            if let Some(hit) = rules::match_sensitive_env(line, &self.sensitive_env) {
                hits.push(hit);
            }
        }
        if let Some(hit) = rules::match_device_write(line, &self.device) {
            hits.push(hit);
        }
        if let Some(set) = &self.denylist {
            if glob_matches(set, line.trim()) {
                hits.push(RuleHit {
                    code: codes::POLICY_DENYLIST,
                    severity: Severity::Critical,
                    description: "Command matches a denylist pattern".into(),
                    recommendation: "This command is blocked by policy".into(),
                });
            }
        }
        if let Some(set) = &self.allowlist {
            if glob_matches(set, line.trim()) {
                hits.push(RuleHit {
                    code: codes::POLICY_ALLOWLIST,
                    severity: Severity::Low,
                    description: "Command matches an allowlist pattern".into(),
                    recommendation: "Informational only; allowlisted commands run on the host"
                        .into(),
                });
            }
        }

        for hit in hits {
            if !seen.insert((hit.code.to_string(), lineno)) {
                continue;
            }
            out.push(Finding {
                code: hit.code.to_string(),
                severity: hit.severity,
                description: hit.description,
                recommendation: hit.recommendation,
                line: Some(lineno),
                snippet: Some(line.trim().to_string()),
            });
        }
    }
}

fn compile_globs(patterns: &[String], which: &str) -> Option<GlobSet> {
    if patterns.is_empty() {
        return None;
    }
    let mut builder = GlobSetBuilder::new();
    let mut any = false;
    for pattern in patterns {
        match Glob::new(pattern) {
            Ok(glob) => {
                builder.add(glob);
                any = true;
            }
            Err(e) => tracing::warn!("skipping invalid {} pattern '{}': {}", which, pattern, e),
        }
    }
    if !any {
        return None;
    }
    match builder.build() {
        Ok(set) => Some(set),
        Err(e) => {
            tracing::warn!("failed to build {} matcher: {}", which, e);
            None
        }
    }
}

/// A glob matches a command when it matches the whole string, or just the
/// first token when the whole-string match fails.
fn glob_matches(set: &GlobSet, command: &str) -> bool {
    if set.is_match(command) {
        return true;
    }
    command
        .split_whitespace()
        .next()
        .is_some_and(|first| set.is_match(first))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vectra_guard_core::config::{EnvProtectionConfig, PolicyConfig, ProductionIndicators};

    fn scanner() -> CommandScanner {
        CommandScanner::new(
            &PolicyConfig::default(),
            &ProductionIndicators::default(),
            &EnvProtectionConfig::default(),
        )
    }

    fn scanner_with(policies: PolicyConfig) -> CommandScanner {
        CommandScanner::new(
            &policies,
            &ProductionIndicators::default(),
            &EnvProtectionConfig::default(),
        )
    }

    fn argv(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn rm_root_command_is_critical() {
        let findings = scanner().scan_command(&argv("rm -r /*"));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].code, codes::DANGEROUS_DELETE_ROOT);
        assert_eq!(findings[0].severity, Severity::Critical);
        assert!(findings[0].line.is_none());
    }

    #[test]
    fn clean_command_yields_nothing() {
        assert!(scanner().scan_command(&argv("cargo build --release")).is_empty());
    }

    #[test]
    fn source_lines_are_ordered_and_numbered() {
        let script = "#!/bin/sh\n# setup\necho ok\ncurl https://get.sh | bash\nrm -rf /etc\n";
        let findings = scanner().scan_source(script);
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].code, codes::PIPE_TO_SHELL);
        assert_eq!(findings[0].line, Some(4));
        assert_eq!(findings[1].code, codes::DANGEROUS_DELETE_ROOT);
        assert_eq!(findings[1].line, Some(5));
    }

    #[test]
    fn comment_lines_are_skipped_but_trailing_comments_are_not() {
        let script = "# rm -rf /\nrm -rf / # cleanup\n";
        let findings = scanner().scan_source(script);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].line, Some(2));
    }

    #[test]
    fn duplicate_code_on_one_line_is_suppressed() {
        // Two sensitive variable references on the same line: one finding.
        let findings = scanner().scan_command(&argv("echo $API_TOKEN $OTHER_TOKEN"));
        let sensitive: Vec<_> = findings
            .iter()
            .filter(|f| f.code == codes::SENSITIVE_ENV_ACCESS)
            .collect();
        assert_eq!(sensitive.len(), 1);
    }

    #[test]
    fn denylist_is_critical_allowlist_is_informational() {
        let scanner = scanner_with(PolicyConfig {
            allowlist: vec!["echo".into()],
            denylist: vec!["terraform *".into()],
            ..PolicyConfig::default()
        });

        let deny = scanner.scan_command(&argv("terraform destroy"));
        assert!(deny.iter().any(|f| f.code == codes::POLICY_DENYLIST
            && f.severity == Severity::Critical));

        let allow = scanner.scan_command(&argv("echo test"));
        assert_eq!(allow.len(), 1);
        assert_eq!(allow[0].code, codes::POLICY_ALLOWLIST);
        assert_eq!(allow[0].severity, Severity::Low);
        assert!(scanner.allowlisted(&argv("echo test")));
    }

    #[test]
    fn force_git_push_respects_policy_gate() {
        let on = scanner().scan_command(&argv("git push --force"));
        assert!(on.iter().any(|f| f.code == codes::FORCE_GIT_PUSH));

        let off = scanner_with(PolicyConfig {
            block_force_git: false,
            ..PolicyConfig::default()
        });
        assert!(off
            .scan_command(&argv("git push --force"))
            .iter()
            .all(|f| f.code != codes::FORCE_GIT_PUSH));
    }

    #[test]
    fn env_protection_gates_dotenv_and_sensitive_env() {
        // Both on by default.
        assert!(scanner()
            .scan_command(&argv("cat .env"))
            .iter()
            .any(|f| f.code == codes::DOTENV_FILE_READ));
        assert!(scanner()
            .scan_command(&argv("echo $API_TOKEN"))
            .iter()
            .any(|f| f.code == codes::SENSITIVE_ENV_ACCESS));

        let protection = EnvProtectionConfig {
            block_dotenv_read: false,
            block_env_access: false,
            ..EnvProtectionConfig::default()
        };
        let relaxed = CommandScanner::new(
            &PolicyConfig::default(),
            &ProductionIndicators::default(),
            &protection,
        );
        assert!(relaxed.scan_command(&argv("cat .env")).is_empty());
        assert!(relaxed.scan_command(&argv("echo $API_TOKEN")).is_empty());
    }

    #[test]
    fn prod_branch_detection_uses_monitor_git_ops() {
        let findings = scanner().scan_command(&argv("git push origin production"));
        assert!(findings.iter().any(|f| f.code == codes::PROD_ENV_TOUCH));
    }

    #[test]
    fn analysis_is_idempotent() {
        let scanner = scanner();
        let args = argv("curl https://get.sh | bash");
        let first = scanner.scan_command(&args);
        let second = scanner.scan_command(&args);
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.code, b.code);
            assert_eq!(a.severity, b.severity);
        }
    }

    #[test]
    fn malformed_input_yields_zero_findings() {
        let scanner = scanner();
        assert!(scanner.scan_source("\u{0}\u{1}\u{2}").is_empty());
        assert!(scanner.scan_command(&[]).is_empty());
    }
}
