//! Container runtime support: availability probing, package-manager cache
//! mounts, and `run` argument construction.
//!
//! The argument vector is built in a fixed order so that tests (and humans
//! reading audit logs) can rely on the layout: flags, env, mounts, image,
//! then the command verbatim.

use crate::error::SandboxError;
use crate::posture::{BindMount, SandboxProfile};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use vectra_guard_core::{ContainerRuntime, NetworkMode};

/// Home directory inside the container. Cache mounts assume a root user;
/// deriving every path through this helper keeps a future non-root image
/// parameterization a one-function change.
fn container_home() -> &'static str {
    "/root"
}

/// Package-manager cache locations: (manager, host path, container path).
/// Order is the emission order for cache mounts.
fn cache_mount_table() -> Vec<(&'static str, PathBuf, PathBuf)> {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    let chome = Path::new(container_home());
    vec![
        ("npm", home.join(".npm"), chome.join(".npm")),
        ("yarn", home.join(".yarn"), chome.join(".yarn")),
        ("pnpm", home.join(".pnpm-store"), chome.join(".pnpm-store")),
        ("pip", home.join(".cache").join("pip"), chome.join(".cache").join("pip")),
        ("cargo", home.join(".cargo"), chome.join(".cargo")),
        ("go", home.join("go").join("pkg"), PathBuf::from("/go/pkg")),
        ("gem", home.join(".gem"), chome.join(".gem")),
        ("maven", home.join(".m2"), chome.join(".m2")),
        ("gradle", home.join(".gradle"), chome.join(".gradle")),
    ]
}

/// Cache mounts for every package manager whose host cache exists, in table
/// order, followed by any configured extra cache directories (mounted at the
/// same path). Non-existent host paths are skipped silently.
pub fn cache_mounts(extra_dirs: &[String]) -> Vec<BindMount> {
    let mut mounts = Vec::new();
    for (_, host, container) in cache_mount_table() {
        if host.exists() {
            mounts.push(BindMount {
                host_path: host,
                container_path: container,
                read_only: false,
            });
        }
    }
    for dir in extra_dirs {
        let host = PathBuf::from(dir);
        if host.exists() {
            mounts.push(BindMount {
                container_path: host.clone(),
                host_path: host,
                read_only: false,
            });
        }
    }
    mounts
}

/// Locate the runtime binary and probe it with `version`. Both steps failing
/// means the runtime is unavailable; there is no fallback.
pub fn probe_runtime(runtime: ContainerRuntime) -> Result<PathBuf, SandboxError> {
    let name = runtime.binary_name();
    let path = which::which(name).map_err(|e| SandboxError::RuntimeUnavailable {
        runtime: name.to_string(),
        reason: format!("not found on PATH: {}", e),
    })?;
    let status = Command::new(&path)
        .arg("version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|e| SandboxError::RuntimeUnavailable {
            runtime: name.to_string(),
            reason: format!("version probe failed to start: {}", e),
        })?;
    if !status.success() {
        return Err(SandboxError::RuntimeUnavailable {
            runtime: name.to_string(),
            reason: "version probe returned non-zero".to_string(),
        });
    }
    Ok(path)
}

fn network_arg(mode: NetworkMode) -> &'static str {
    match mode {
        NetworkMode::None => "none",
        // Runtime-default egress policies are applied externally for bridge.
        NetworkMode::Restricted => "bridge",
        NetworkMode::Full => "host",
    }
}

fn mount_arg(mount: &BindMount) -> String {
    format!(
        "{}:{}:{}",
        mount.host_path.display(),
        mount.container_path.display(),
        if mount.read_only { "ro" } else { "rw" }
    )
}

/// Build the full `run` argument vector for docker/podman.
///
/// `env` carries the already-sanitized `NAME=VALUE` pairs to propagate; the
/// final `command` tokens are appended verbatim.
pub fn build_run_args(
    profile: &SandboxProfile,
    cache: &[BindMount],
    env: &[(String, String)],
    command: &[String],
    tty: bool,
) -> Vec<String> {
    let mut args: Vec<String> = vec!["run".into(), "--rm".into(), "-i".into()];
    if tty {
        args.push("-t".into());
    }
    args.push("--network".into());
    args.push(network_arg(profile.network_mode).into());
    if profile.read_only_root {
        args.push("--read-only".into());
    }
    if profile.no_new_privileges {
        args.push("--security-opt".into());
        args.push("no-new-privileges".into());
    }
    for cap in &profile.cap_drop {
        args.push("--cap-drop".into());
        args.push(cap.clone());
    }
    args.push("--memory".into());
    args.push(profile.memory_limit.clone());
    args.push("--cpus".into());
    args.push(profile.cpu_limit.clone());
    args.push("--pids-limit".into());
    args.push(profile.pids_limit.to_string());
    if let Some(seccomp) = &profile.seccomp_profile {
        args.push("--seccomp".into());
        args.push(seccomp.display().to_string());
    }
    for (name, value) in env {
        args.push("-e".into());
        args.push(format!("{}={}", name, value));
    }
    let workspace = profile.work_dir.display().to_string();
    args.push("-v".into());
    args.push(format!("{}:{}:rw", workspace, workspace));
    args.push("-w".into());
    args.push(workspace);
    for mount in &profile.bind_mounts {
        args.push("-v".into());
        args.push(mount_arg(mount));
    }
    for mount in cache {
        args.push("-v".into());
        args.push(mount_arg(mount));
    }
    args.push(profile.image.clone());
    args.extend(command.iter().cloned());
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use vectra_guard_core::config::SandboxSettings;
    use vectra_guard_core::SecurityLevel;

    fn profile(level: SecurityLevel) -> SandboxProfile {
        let settings = SandboxSettings {
            security_level: level,
            ..SandboxSettings::default()
        };
        SandboxProfile::from_settings(&settings, Path::new("/work/space"))
    }

    fn argv(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn arg_vector_shape_is_fixed() {
        let cmd = argv("rm -r /*");
        let args = build_run_args(&profile(SecurityLevel::Balanced), &[], &[], &cmd, false);

        assert_eq!(&args[..3], &["run", "--rm", "-i"]);
        assert_eq!(args.iter().filter(|a| *a == "--rm").count(), 1);

        // Image sits immediately before the verbatim command tail.
        let image_pos = args.len() - cmd.len() - 1;
        assert_eq!(args[image_pos], SandboxSettings::default().image);
        assert_eq!(&args[image_pos + 1..], cmd.as_slice());
    }

    #[test]
    fn balanced_level_emits_bridge_and_limits() {
        let args = build_run_args(
            &profile(SecurityLevel::Balanced),
            &[],
            &[],
            &argv("rm -r /*"),
            false,
        );
        let joined = args.join(" ");
        assert!(joined.contains("--network bridge"));
        assert!(joined.contains("--memory 1g"));
        assert!(joined.contains("--cpus 1.0"));
        assert!(joined.contains("--cap-drop NET_RAW"));
        assert!(joined.contains("--cap-drop SYS_ADMIN"));
        assert!(!joined.contains("--read-only"));
    }

    #[test]
    fn paranoid_level_locks_down() {
        let args = build_run_args(
            &profile(SecurityLevel::Paranoid),
            &[],
            &[],
            &argv("echo hi"),
            false,
        );
        let joined = args.join(" ");
        assert!(joined.contains("--network none"));
        assert!(joined.contains("--read-only"));
        assert!(joined.contains("--memory 256m"));
        assert!(joined.contains("--cap-drop ALL"));
        assert!(joined.contains("--security-opt no-new-privileges"));
    }

    #[test]
    fn tty_flag_is_conditional() {
        let with = build_run_args(&profile(SecurityLevel::Balanced), &[], &[], &argv("ls"), true);
        let without =
            build_run_args(&profile(SecurityLevel::Balanced), &[], &[], &argv("ls"), false);
        assert!(with.contains(&"-t".to_string()));
        assert!(!without.contains(&"-t".to_string()));
    }

    #[test]
    fn workspace_mount_and_workdir_are_emitted() {
        let args = build_run_args(&profile(SecurityLevel::Balanced), &[], &[], &argv("ls"), false);
        let joined = args.join(" ");
        assert!(joined.contains("-v /work/space:/work/space:rw"));
        assert!(joined.contains("-w /work/space"));
    }

    #[test]
    fn env_pairs_and_cache_mounts_are_ordered() {
        let cache = vec![BindMount {
            host_path: PathBuf::from("/home/u/.npm"),
            container_path: PathBuf::from("/root/.npm"),
            read_only: false,
        }];
        let env = vec![("PATH".to_string(), "/usr/bin".to_string())];
        let args = build_run_args(
            &profile(SecurityLevel::Balanced),
            &cache,
            &env,
            &argv("npm install express"),
            false,
        );
        let joined = args.join(" ");
        assert!(joined.contains("-e PATH=/usr/bin"));
        assert!(joined.contains("-v /home/u/.npm:/root/.npm:rw"));

        // Env pairs come before the workspace mount; cache mounts after it.
        let env_pos = args.iter().position(|a| a == "-e").unwrap();
        let ws_pos = args
            .iter()
            .position(|a| a == "/work/space:/work/space:rw")
            .unwrap();
        let cache_pos = args
            .iter()
            .position(|a| a == "/home/u/.npm:/root/.npm:rw")
            .unwrap();
        assert!(env_pos < ws_pos && ws_pos < cache_pos);
    }

    #[test]
    fn nonexistent_cache_paths_are_skipped() {
        let mounts = cache_mounts(&["/definitely/not/a/real/dir".to_string()]);
        assert!(mounts
            .iter()
            .all(|m| m.host_path.exists()));
    }

    #[test]
    fn critical_delete_flows_into_a_mandatory_sandbox_vector() {
        use crate::analysis::{risk_level, CommandScanner};
        use crate::decision::{decide, ExecutionMode};
        use vectra_guard_core::config::{EnvProtectionConfig, PolicyConfig, ProductionIndicators};

        let cmd = argv("rm -r /*");
        let scanner = CommandScanner::new(
            &PolicyConfig::default(),
            &ProductionIndicators::default(),
            &EnvProtectionConfig::default(),
        );
        let findings = scanner.scan_command(&cmd);
        assert!(findings
            .iter()
            .any(|f| f.code == "DANGEROUS_DELETE_ROOT"));

        let settings = SandboxSettings::default();
        let decision = decide(&cmd, risk_level(&findings), &findings, &settings, &[]);
        assert_eq!(decision.mode, ExecutionMode::Sandbox);
        assert!(decision.mandatory);

        let args = build_run_args(
            &SandboxProfile::from_settings(&settings, Path::new("/work/space")),
            &[],
            &[],
            &cmd,
            false,
        );
        assert_eq!(&args[..3], &["run", "--rm", "-i"]);
        let joined = args.join(" ");
        assert!(joined.contains("--network bridge"));
        assert!(joined.contains("--memory 1g"));
        assert!(joined.contains("--cpus 1.0"));
        assert_eq!(&args[args.len() - cmd.len()..], cmd.as_slice());
    }

    #[test]
    fn seccomp_profile_is_emitted_when_set() {
        let mut profile = profile(SecurityLevel::Balanced);
        profile.seccomp_profile = Some(PathBuf::from("/etc/vg/seccomp.json"));
        let args = build_run_args(&profile, &[], &[], &argv("ls"), false);
        let joined = args.join(" ");
        assert!(joined.contains("--seccomp /etc/vg/seccomp.json"));
    }
}
