//! `validate` and `explain`: run the analyzer over a script file.

use anyhow::{Context, Result};
use vectra_guard_core::{GuardConfig, Severity};
use vectra_guard_sandbox::analysis::risk_level;
use vectra_guard_sandbox::decision::{decide, ExecutionMode};
use vectra_guard_sandbox::{CommandScanner, Finding};

fn severity_icon(severity: Severity) -> &'static str {
    match severity {
        Severity::Low => "🟢",
        Severity::Medium => "🟡",
        Severity::High => "🟠",
        Severity::Critical => "🔴",
    }
}

fn scan_file(config: &GuardConfig, script: &str) -> Result<Vec<Finding>> {
    let content = std::fs::read_to_string(script)
        .with_context(|| format!("failed to read script: {}", script))?;
    let scanner = CommandScanner::new(
        &config.policies,
        &config.production_indicators,
        &config.env_protection,
    );
    Ok(scanner.scan_source(&content))
}

/// Print findings; exit 2 when anything of severity >= medium fired.
pub fn cmd_validate(config: &GuardConfig, script: &str) -> Result<i32> {
    let findings = scan_file(config, script)?;
    if findings.is_empty() {
        println!("✅ No risks found in {}", script);
        return Ok(0);
    }

    println!("📋 {}: {} finding(s)", script, findings.len());
    for finding in &findings {
        let line = finding
            .line
            .map(|l| format!("line {}", l))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {} [{}] {} ({})",
            severity_icon(finding.severity),
            finding.severity,
            finding.code,
            line
        );
        if let Some(snippet) = &finding.snippet {
            println!("     └─ {}", snippet);
        }
    }

    if findings.iter().any(|f| f.severity >= Severity::Medium) {
        Ok(2)
    } else {
        Ok(0)
    }
}

/// Print the human rationale per finding plus the routing each line would
/// get as a command.
pub fn cmd_explain(config: &GuardConfig, script: &str) -> Result<i32> {
    let findings = scan_file(config, script)?;
    if findings.is_empty() {
        println!("No risks found; commands in {} would run on the host.", script);
        return Ok(0);
    }

    let risk = risk_level(&findings);
    let args: Vec<String> = vec![script.to_string()];
    let decision = decide(&args, risk, &findings, &config.sandbox, &config.policies.allowlist);

    println!("Overall risk: {}", risk);
    for finding in &findings {
        println!();
        println!(
            "{} {} ({})",
            severity_icon(finding.severity),
            finding.code,
            finding.severity
        );
        println!("  What: {}", finding.description);
        println!("  Advice: {}", finding.recommendation);
        if let (Some(line), Some(snippet)) = (finding.line, &finding.snippet) {
            println!("  Where: line {}: {}", line, snippet);
        }
    }
    println!();
    match decision.mode {
        ExecutionMode::Sandbox if decision.mandatory => {
            println!("Routing: sandbox (mandatory, cannot be bypassed)")
        }
        ExecutionMode::Sandbox => println!("Routing: sandbox ({})", decision.reason),
        ExecutionMode::Host => println!("Routing: host ({})", decision.reason),
    }
    Ok(0)
}
