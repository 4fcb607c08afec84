//! The exec pipeline: analyze -> decide -> trust -> approve -> execute ->
//! record. This is the one place exit codes are decided.

use crate::observability;
use anyhow::Result;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use vectra_guard_core::config as cfg;
use vectra_guard_core::metrics::{counters, MetricsSink};
use vectra_guard_core::trust::TrustStore;
use vectra_guard_core::{GuardConfig, GuardLevel, Severity};
use vectra_guard_sandbox::analysis::{risk_level, Finding};
use vectra_guard_sandbox::decision::{decide, MANDATORY_SANDBOX_CODES};
use vectra_guard_sandbox::envsan::EnvSanitizer;
use vectra_guard_sandbox::{execute, CommandScanner, SandboxError, SandboxProfile};
use vectra_guard_session::{CommandRecord, SessionLedger, SESSION_ID_ENV};

/// Exit code for refusals: declined approval, non-interactive critical
/// commands, and mandatory-sandbox violations.
pub const EXIT_REFUSED: i32 = 3;

pub struct ExecRequest {
    pub args: Vec<String>,
    pub interactive: bool,
    pub session_id: Option<String>,
    pub workspace: PathBuf,
}

enum Approval {
    Once,
    Remember,
    Deny,
}

/// Run one command through the pipeline and return the process exit code.
pub fn run(config: &GuardConfig, request: ExecRequest) -> Result<i32> {
    let metrics = MetricsSink::new(MetricsSink::default_path(), config.sandbox.enable_metrics);
    let scanner = CommandScanner::new(
        &config.policies,
        &config.production_indicators,
        &config.env_protection,
    );

    let command_display = request.args.join(" ");
    observability::audit_command_invoked(
        &command_display,
        &request.args,
        &request.workspace.display().to_string(),
    );

    // 1-2. Analyze, derive the overall risk.
    let findings = scanner.scan_command(&request.args);
    let risk = risk_level(&findings);
    metrics.bump(counters::COMMANDS_ANALYZED);
    metrics.bump_by(counters::FINDINGS_TOTAL, findings.len() as u64);

    // 3. Routing decision.
    let decision = decide(
        &request.args,
        risk,
        &findings,
        &config.sandbox,
        &config.policies.allowlist,
    );
    tracing::debug!(
        mode = ?decision.mode,
        reason = decision.reason,
        mandatory = decision.mandatory,
        risk = %risk,
        "routing decision"
    );

    // 4. Mandatory-block check: a forced sandbox with sandboxing disabled is
    // a refusal, never a host run.
    if decision.mandatory && !config.sandbox.enabled {
        let codes = mandatory_codes(&findings);
        eprintln!(
            "CRITICAL: sandbox required for {} (sandboxing is disabled in config)",
            codes.join(", ")
        );
        observability::audit_refused(&command_display, "mandatory sandbox unavailable", &codes);
        metrics.bump(counters::COMMANDS_BLOCKED);
        return Ok(EXIT_REFUSED);
    }

    // 5. Trust lookup: a valid entry downgrades the approval requirement but
    // never the execution mode.
    let mut trust = TrustStore::open(trust_store_path(config));
    let trusted_fingerprint = if risk != Severity::Low && !decision.mandatory {
        trust
            .lookup(&request.args)
            .map(|entry| entry.fingerprint.clone())
    } else {
        None
    };
    if let Some(fp) = &trusted_fingerprint {
        if let Err(e) = trust.record_use(fp) {
            tracing::warn!("failed to record trust use: {:#}", e);
        }
        observability::audit_confirmation_response(&command_display, true, "trust");
    }

    // 6. Approval.
    let needs_approval = approval_threshold(config).is_some_and(|threshold| risk >= threshold)
        && trusted_fingerprint.is_none();
    let bypass = !decision.mandatory
        && config.guard_level.allow_user_bypass
        && std::env::var(cfg::BYPASS).is_ok();
    let mut approved_interactively = false;

    if needs_approval && !bypass {
        let interactive = request.interactive && io::stdin().is_terminal();
        if request.interactive && !interactive {
            tracing::warn!("stdin is not a terminal; treating run as non-interactive");
        }
        if interactive {
            observability::audit_confirmation_requested(
                &command_display,
                findings.len(),
                risk.as_str(),
            );
            match prompt_approval(&command_display, &findings, risk) {
                Approval::Deny => {
                    observability::audit_confirmation_response(&command_display, false, "user");
                    metrics.bump(counters::APPROVALS_DENIED);
                    eprintln!("Cancelled: {}", finding_codes(&findings).join(", "));
                    return Ok(EXIT_REFUSED);
                }
                Approval::Remember => {
                    trust.add(&request.args, "approved interactively", None)?;
                    observability::audit_confirmation_response(&command_display, true, "user");
                    metrics.bump(counters::APPROVALS_GRANTED);
                    approved_interactively = true;
                }
                Approval::Once => {
                    observability::audit_confirmation_response(&command_display, true, "user");
                    metrics.bump(counters::APPROVALS_GRANTED);
                    approved_interactively = true;
                }
            }
        } else if risk == Severity::Critical && !decision.mandatory {
            // Non-interactive critical commands are refused outright, unless
            // the mandatory rule already routed them into the sandbox.
            let codes = finding_codes(&findings);
            eprintln!(
                "Refusing critical command without approval: {}",
                codes.join(", ")
            );
            observability::audit_confirmation_response(
                &command_display,
                false,
                "non-interactive",
            );
            metrics.bump(counters::COMMANDS_BLOCKED);
            return Ok(EXIT_REFUSED);
        }
    } else if bypass {
        observability::audit_confirmation_response(&command_display, true, "bypass");
    }

    // 7. Execute.
    let profile = SandboxProfile::from_config(config, &request.workspace);
    let session_id = request
        .session_id
        .clone()
        .or_else(|| std::env::var(SESSION_ID_ENV).ok());
    let env_pairs = child_env(config, session_id.as_deref());

    let outcome = match execute(
        &decision,
        &profile,
        &config.sandbox,
        &request.args,
        &env_pairs,
    ) {
        Ok(outcome) => outcome,
        Err(SandboxError::RuntimeUnavailable { runtime, reason }) => {
            if decision.mandatory {
                let codes = mandatory_codes(&findings);
                eprintln!("CRITICAL: sandbox required for {} ({})", codes.join(", "), reason);
                observability::audit_refused(&command_display, &reason, &codes);
                metrics.bump(counters::COMMANDS_BLOCKED);
                return Ok(EXIT_REFUSED);
            }
            eprintln!("Runtime '{}' unavailable: {}", runtime, reason);
            return Ok(1);
        }
        Err(e) => return Err(e.into()),
    };

    match decision.mode {
        vectra_guard_sandbox::ExecutionMode::Sandbox => {
            metrics.bump(counters::COMMANDS_SANDBOXED)
        }
        vectra_guard_sandbox::ExecutionMode::Host => metrics.bump(counters::COMMANDS_HOST),
    }
    observability::audit_execution_completed(
        &command_display,
        outcome.exit_code,
        outcome.duration.as_millis() as u64,
        &outcome.runtime_used,
    );

    // 8. Record into the bound session, if any. Ledger failures never change
    // the exit code: the command already ran.
    if let Some(id) = session_id {
        let approved =
            approved_interactively || trusted_fingerprint.is_some() || !needs_approval || bypass;
        if let Err(e) = record_command(
            &request.workspace,
            &id,
            &request.args,
            &findings,
            risk,
            approved,
            &outcome,
        ) {
            tracing::error!(session = %id, "failed to record command: {:#}", e);
        }
    }

    // 9. The child's exit code is ours.
    Ok(outcome.exit_code)
}

/// Severity at which approval kicks in. `None` means gating is off.
/// The guard level shifts the configured threshold: `low` only gates high
/// and critical commands, `paranoid` gates everything.
fn approval_threshold(config: &GuardConfig) -> Option<Severity> {
    match config.guard_level.level {
        GuardLevel::Off => None,
        GuardLevel::Low => Some(config.guard_level.require_approval_above.max(Severity::High)),
        GuardLevel::Medium | GuardLevel::High => Some(config.guard_level.require_approval_above),
        GuardLevel::Paranoid => Some(Severity::Low),
    }
}

fn trust_store_path(config: &GuardConfig) -> PathBuf {
    config
        .sandbox
        .trust_store_path
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(TrustStore::default_path)
}

fn child_env(config: &GuardConfig, session_id: Option<&str>) -> Vec<(String, String)> {
    let sanitizer = EnvSanitizer::new(&config.env_protection);
    let mut pairs = sanitizer.whitelist_env(&config.sandbox.env_whitelist);
    if let Some(id) = session_id {
        pairs.push((SESSION_ID_ENV.to_string(), id.to_string()));
    }
    pairs
}

fn finding_codes(findings: &[Finding]) -> Vec<String> {
    findings.iter().map(|f| f.code.clone()).collect()
}

fn mandatory_codes(findings: &[Finding]) -> Vec<String> {
    findings
        .iter()
        .filter(|f| MANDATORY_SANDBOX_CODES.contains(&f.code.as_str()))
        .map(|f| f.code.clone())
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn record_command(
    workspace: &std::path::Path,
    session_id: &str,
    args: &[String],
    findings: &[Finding],
    risk: Severity,
    approved: bool,
    outcome: &vectra_guard_sandbox::ExecutionOutcome,
) -> Result<()> {
    let ledger = SessionLedger::new(workspace);
    let mut session = ledger.load(session_id)?;
    ledger.add_command(
        &mut session,
        CommandRecord {
            timestamp: chrono::Utc::now(),
            command: args.first().cloned().unwrap_or_default(),
            args: args.to_vec(),
            exit_code: outcome.exit_code,
            duration_ns: outcome.duration.as_nanos() as u64,
            risk_level: risk,
            approved,
            findings: finding_codes(findings),
        },
    )?;
    Ok(())
}

fn prompt_approval(command: &str, findings: &[Finding], risk: Severity) -> Approval {
    eprintln!();
    eprintln!("  Approval required ({} risk): {}", risk, command);
    for finding in findings {
        eprintln!("    [{}] {} - {}", finding.severity, finding.code, finding.description);
    }
    loop {
        eprint!("  Run this command? [y = once, r = once and remember, N = cancel]: ");
        let _ = io::stderr().flush();

        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_err() {
            eprintln!("  Input error, cancelling");
            return Approval::Deny;
        }
        match input.trim().to_lowercase().as_str() {
            "y" | "yes" => return Approval::Once,
            "r" | "remember" => return Approval::Remember,
            "n" | "no" | "" => return Approval::Deny,
            _ => eprintln!("  Enter 'y', 'r', or 'n'."),
        }
    }
}
