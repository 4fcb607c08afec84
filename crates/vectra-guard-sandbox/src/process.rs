#![cfg(target_os = "linux")]

//! OS-primitive isolation for the `process` runtime: unprivileged user
//! namespace, mount namespace with an overlay over the workspace, PID
//! namespace, and a fresh network namespace for the `none` and `restricted`
//! modes (only `full` keeps the host's). Capability bounding-set drops
//! happen before `execve`.
//!
//! When any primitive is unavailable this module refuses with a
//! runtime-unavailable error; there is no silent fallback.

use crate::error::SandboxError;
use crate::posture::{BindMount, SandboxProfile};
use nix::mount::{mount, MsFlags};
use nix::sched::{unshare, CloneFlags};
use std::io;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use tempfile::TempDir;
use vectra_guard_core::NetworkMode;

/// Capability name → number, for the names the postures can emit.
const CAPABILITIES: &[(&str, u64)] = &[
    ("CHOWN", 0),
    ("DAC_OVERRIDE", 1),
    ("FOWNER", 3),
    ("FSETID", 4),
    ("KILL", 5),
    ("SETGID", 6),
    ("SETUID", 7),
    ("SETPCAP", 8),
    ("NET_BIND_SERVICE", 10),
    ("NET_RAW", 13),
    ("SYS_CHROOT", 18),
    ("SYS_ADMIN", 21),
    ("MKNOD", 27),
    ("AUDIT_WRITE", 29),
    ("SETFCAP", 31),
];

/// Highest capability number we drop for `ALL`.
const CAP_LAST: u64 = 40;

/// A spawned isolated child. The staging directory backs the overlay's
/// upper/work layers and must outlive the child.
pub struct IsolatedChild {
    pub child: Child,
    _staging: TempDir,
}

/// Check that the kernel exposes the primitives we need.
pub fn probe() -> Result<(), SandboxError> {
    let unavailable = |reason: String| SandboxError::RuntimeUnavailable {
        runtime: "process".to_string(),
        reason,
    };
    if !std::path::Path::new("/proc/self/ns/user").exists() {
        return Err(unavailable("kernel lacks user namespaces".into()));
    }
    if !std::path::Path::new("/proc/self/ns/pid").exists() {
        return Err(unavailable("kernel lacks PID namespaces".into()));
    }
    // Debian-style kill switch for unprivileged user namespaces.
    if !nix::unistd::geteuid().is_root() {
        if let Ok(v) = std::fs::read_to_string("/proc/sys/kernel/unprivileged_userns_clone") {
            if v.trim() == "0" {
                return Err(unavailable(
                    "unprivileged user namespaces disabled (kernel.unprivileged_userns_clone=0)"
                        .into(),
                ));
            }
        }
    }
    Ok(())
}

/// Spawn `args` inside fresh namespaces with the workspace shadowed by an
/// overlay. The child environment is exactly `env`.
pub fn spawn_isolated(
    profile: &SandboxProfile,
    cache: &[BindMount],
    args: &[String],
    env: &[(String, String)],
) -> Result<IsolatedChild, SandboxError> {
    probe()?;

    let staging = TempDir::new().map_err(SandboxError::Spawn)?;
    let staging_path = staging.path().to_path_buf();
    let workspace = profile.work_dir.clone();
    let cap_drop = profile.cap_drop.clone();
    let no_new_privileges = profile.no_new_privileges;
    let unshare_net = needs_network_namespace(profile.network_mode);
    let cache_paths: Vec<PathBuf> = cache.iter().map(|m| m.host_path.clone()).collect();
    let uid = nix::unistd::getuid();
    let gid = nix::unistd::getgid();

    let mut cmd = Command::new(&args[0]);
    cmd.args(&args[1..])
        .current_dir(&workspace)
        .env_clear()
        .envs(env.iter().map(|(k, v)| (k.clone(), v.clone())))
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());

    // pre_exec runs in the forked child, before execve. Every failure aborts
    // the spawn, which the caller reports as runtime-unavailable.
    unsafe {
        cmd.pre_exec(move || {
            let mut flags = CloneFlags::CLONE_NEWNS | CloneFlags::CLONE_NEWPID;
            if !uid.is_root() {
                flags |= CloneFlags::CLONE_NEWUSER;
            }
            if unshare_net {
                flags |= CloneFlags::CLONE_NEWNET;
            }
            unshare(flags).map_err(io_err("unshare failed"))?;

            if !uid.is_root() {
                // Map ourselves to root inside the namespace so mounts work.
                std::fs::write("/proc/self/setgroups", "deny")?;
                std::fs::write("/proc/self/gid_map", format!("0 {} 1", gid.as_raw()))?;
                std::fs::write("/proc/self/uid_map", format!("0 {} 1", uid.as_raw()))?;
            }

            // Keep mount changes private to this namespace.
            mount(
                None::<&str>,
                "/",
                None::<&str>,
                MsFlags::MS_REC | MsFlags::MS_PRIVATE,
                None::<&str>,
            )
            .map_err(io_err("remount / private failed"))?;

            // Writable overlay layers on a tmpfs, so host files under the
            // workspace are readable but writes never reach the host.
            mount(
                None::<&str>,
                &staging_path,
                Some("tmpfs"),
                MsFlags::empty(),
                Some("size=512m"),
            )
            .map_err(io_err("tmpfs for overlay staging failed"))?;
            let upper = staging_path.join("upper");
            let work = staging_path.join("work");
            std::fs::create_dir_all(&upper)?;
            std::fs::create_dir_all(&work)?;
            let overlay_opts = format!(
                "lowerdir={},upperdir={},workdir={}",
                workspace.display(),
                upper.display(),
                work.display()
            );
            mount(
                Some("overlay"),
                &workspace,
                Some("overlay"),
                MsFlags::empty(),
                Some(overlay_opts.as_str()),
            )
            .map_err(io_err("overlay mount over workspace failed"))?;

            // Re-bind cache directories so they stay writable through the
            // private mount namespace.
            for path in &cache_paths {
                mount(
                    Some(path),
                    path,
                    None::<&str>,
                    MsFlags::MS_BIND | MsFlags::MS_REC,
                    None::<&str>,
                )
                .map_err(io_err("cache bind mount failed"))?;
            }

            if no_new_privileges {
                let rc = unsafe { libc::prctl(libc::PR_SET_NO_NEW_PRIVS, 1, 0, 0, 0) };
                if rc != 0 {
                    return Err(io::Error::last_os_error());
                }
            }
            drop_capabilities(&cap_drop)?;

            Ok(())
        });
    }

    let child = cmd.spawn().map_err(|e| SandboxError::RuntimeUnavailable {
        runtime: "process".to_string(),
        reason: format!("isolated spawn failed: {}", e),
    })?;

    Ok(IsolatedChild {
        child,
        _staging: staging,
    })
}

/// `none` and `restricted` both get a fresh (loopback-only) network
/// namespace; granting restricted egress would need a veth/proxy setup, and
/// sharing the host namespace instead would be a silent downgrade.
fn needs_network_namespace(mode: NetworkMode) -> bool {
    mode != NetworkMode::Full
}

fn io_err(context: &'static str) -> impl Fn(nix::errno::Errno) -> io::Error {
    move |errno| io::Error::new(io::ErrorKind::Other, format!("{}: {}", context, errno))
}

/// Drop capabilities from the bounding set. Runs in the forked child.
fn drop_capabilities(cap_drop: &[String]) -> io::Result<()> {
    if cap_drop.iter().any(|c| c == "ALL") {
        for cap in 0..=CAP_LAST {
            // EINVAL means the kernel has fewer capabilities; that's fine.
            unsafe { libc::prctl(libc::PR_CAPBSET_DROP, cap, 0, 0, 0) };
        }
        return Ok(());
    }
    for name in cap_drop {
        if let Some((_, number)) = CAPABILITIES.iter().find(|(n, _)| n == name) {
            let rc = unsafe { libc::prctl(libc::PR_CAPBSET_DROP, *number, 0, 0, 0) };
            if rc != 0 {
                let err = io::Error::last_os_error();
                if err.raw_os_error() != Some(libc::EINVAL) {
                    return Err(err);
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restricted_and_none_modes_unshare_the_network() {
        assert!(needs_network_namespace(NetworkMode::None));
        assert!(needs_network_namespace(NetworkMode::Restricted));
        assert!(!needs_network_namespace(NetworkMode::Full));
    }

    #[test]
    fn capability_table_is_consistent() {
        // Every capability a posture can emit (other than ALL) must resolve.
        for level in [
            vectra_guard_core::SecurityLevel::Balanced,
            vectra_guard_core::SecurityLevel::Strict,
        ] {
            let posture = crate::posture::Posture::for_level(level);
            for cap in &posture.cap_drop {
                assert!(
                    CAPABILITIES.iter().any(|(n, _)| n == cap),
                    "unmapped capability: {}",
                    cap
                );
            }
        }
    }
}
