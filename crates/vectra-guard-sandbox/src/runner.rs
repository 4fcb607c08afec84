//! Execution: spawn the command on the host or inside the selected sandbox
//! runtime, wire inherited stdio, and enforce the timeout.

use crate::common::wait_with_deadline;
use crate::container;
use crate::decision::{ExecutionDecision, ExecutionMode};
use crate::error::SandboxError;
use crate::posture::SandboxProfile;
use std::io::IsTerminal;
use std::process::{Command, Stdio};
use std::time::Instant;
use vectra_guard_core::config::SandboxSettings;
use vectra_guard_core::ContainerRuntime;

/// What happened to the child.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub exit_code: i32,
    pub duration: std::time::Duration,
    pub runtime_used: String,
}

/// Execute `args` according to the decision. Stdio is inherited so the
/// command behaves like a direct invocation; `env` carries the sanitized
/// pairs to propagate into container sandboxes.
pub fn execute(
    decision: &ExecutionDecision,
    profile: &SandboxProfile,
    settings: &SandboxSettings,
    args: &[String],
    env: &[(String, String)],
) -> Result<ExecutionOutcome, SandboxError> {
    if args.is_empty() {
        return Err(SandboxError::Spawn(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "empty command",
        )));
    }

    let start = Instant::now();
    match decision.mode {
        ExecutionMode::Host => {
            let mut child = Command::new(&args[0])
                .args(&args[1..])
                .current_dir(&profile.work_dir)
                .stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .spawn()
                .map_err(SandboxError::Spawn)?;
            let exit_code = wait_with_deadline(&mut child, profile.timeout)?;
            Ok(ExecutionOutcome {
                exit_code,
                duration: start.elapsed(),
                runtime_used: "host".to_string(),
            })
        }
        ExecutionMode::Sandbox => match settings.runtime {
            ContainerRuntime::Docker | ContainerRuntime::Podman => {
                execute_container(decision, profile, settings, args, env, start)
            }
            ContainerRuntime::Process => execute_process(decision, profile, settings, args, env, start),
        },
    }
}

fn execute_container(
    decision: &ExecutionDecision,
    profile: &SandboxProfile,
    settings: &SandboxSettings,
    args: &[String],
    env: &[(String, String)],
    start: Instant,
) -> Result<ExecutionOutcome, SandboxError> {
    let runtime_path = container::probe_runtime(settings.runtime)?;
    let cache = if decision.should_cache {
        container::cache_mounts(&settings.cache_dirs)
    } else {
        Vec::new()
    };
    let tty = std::io::stdin().is_terminal();
    let run_args = container::build_run_args(profile, &cache, env, args, tty);

    tracing::debug!(
        runtime = settings.runtime.binary_name(),
        image = %profile.image,
        "spawning container sandbox"
    );

    let mut child = Command::new(&runtime_path)
        .args(&run_args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(SandboxError::Spawn)?;
    let exit_code = wait_with_deadline(&mut child, profile.timeout)?;
    Ok(ExecutionOutcome {
        exit_code,
        duration: start.elapsed(),
        runtime_used: settings.runtime.binary_name().to_string(),
    })
}

#[cfg(target_os = "linux")]
fn execute_process(
    decision: &ExecutionDecision,
    profile: &SandboxProfile,
    settings: &SandboxSettings,
    args: &[String],
    env: &[(String, String)],
    start: Instant,
) -> Result<ExecutionOutcome, SandboxError> {
    let cache = if decision.should_cache {
        container::cache_mounts(&settings.cache_dirs)
    } else {
        Vec::new()
    };
    let mut spawned = crate::process::spawn_isolated(profile, &cache, args, env)?;
    let exit_code = wait_with_deadline(&mut spawned.child, profile.timeout)?;
    Ok(ExecutionOutcome {
        exit_code,
        duration: start.elapsed(),
        runtime_used: "process".to_string(),
    })
}

#[cfg(not(target_os = "linux"))]
fn execute_process(
    _decision: &ExecutionDecision,
    _profile: &SandboxProfile,
    _settings: &SandboxSettings,
    _args: &[String],
    _env: &[(String, String)],
    _start: Instant,
) -> Result<ExecutionOutcome, SandboxError> {
    Err(SandboxError::RuntimeUnavailable {
        runtime: "process".to_string(),
        reason: "namespace isolation requires Linux".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::{decide, ExecutionMode};
    use std::path::Path;
    use vectra_guard_core::{SandboxMode, Severity};

    fn argv(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn host_execution_propagates_exit_code() {
        let settings = SandboxSettings {
            mode: SandboxMode::Never,
            ..SandboxSettings::default()
        };
        let decision = decide(&argv("sh -c true"), Severity::Low, &[], &settings, &[]);
        assert_eq!(decision.mode, ExecutionMode::Host);

        let profile = SandboxProfile::from_settings(&settings, Path::new("."));
        let outcome = execute(
            &decision,
            &profile,
            &settings,
            &argv("sh -c exit_code_check"),
            &[],
        );
        // `sh -c exit_code_check` fails with 127: command not found.
        let outcome = outcome.unwrap();
        assert_eq!(outcome.exit_code, 127);
        assert_eq!(outcome.runtime_used, "host");
    }

    #[test]
    fn empty_command_is_rejected() {
        let settings = SandboxSettings::default();
        let decision = decide(&[], Severity::Low, &[], &settings, &[]);
        let profile = SandboxProfile::from_settings(&settings, Path::new("."));
        assert!(execute(&decision, &profile, &settings, &[], &[]).is_err());
    }
}
