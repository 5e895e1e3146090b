//! Host-side helpers for the backends: mount table lookups and privileged commands.

use log::debug;
use std::path::Path;
use std::process::Command;
use sysinfo::Disks;

use crate::error::{FsError, FsResult};
use crate::utils::MountConsts;

/// Check if filesystem type indicates network storage
#[inline]
pub fn is_network_fs(fs_type: &str) -> bool {
    let fs = fs_type.to_lowercase();
    fs.contains("nfs") || fs.contains("smb") || fs.contains("cifs")
}

/// Filesystem type mounted exactly at `mount_point`, if it is a network filesystem.
pub fn network_fs_at(mount_point: &Path) -> Option<String> {
    let disks = Disks::new_with_refreshed_list();
    let wanted = mount_point.to_string_lossy();
    let wanted = wanted.trim_end_matches('/');
    let disk = disks.iter().find(|d| {
        let mp = d.mount_point().to_string_lossy();
        let mp = mp.trim_end_matches('/');
        mp == wanted
    })?;
    let fs_type = disk.file_system().to_string_lossy().to_string();
    debug!(
        "Mount table: mount={}, fs={}",
        disk.mount_point().display(),
        fs_type
    );
    is_network_fs(&fs_type).then_some(fs_type)
}

/// True if the process is running with effective uid 0 (e.g. via sudo).
#[cfg(unix)]
pub fn running_as_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
pub fn running_as_root() -> bool {
    false
}

/// `program args...`, prefixed with `sudo` unless already root. Variables in `keep_env`
/// are preserved across sudo.
pub fn privileged_command(program: &str, args: &[String], keep_env: &[&str]) -> Command {
    if running_as_root() {
        let mut cmd = Command::new(program);
        cmd.args(args);
        cmd
    } else {
        let mut cmd = Command::new(MountConsts::SUDO_BIN);
        if !keep_env.is_empty() {
            cmd.arg(format!("--preserve-env={}", keep_env.join(",")));
        }
        cmd.arg(program).args(args);
        cmd
    }
}

/// Run `cmd`; a spawn failure or non-zero exit becomes a connection error.
pub fn run_checked(mut cmd: Command, what: &str) -> FsResult<()> {
    debug!("Running {:?}", cmd);
    let output = cmd
        .output()
        .map_err(|e| FsError::Connection(format!("{what}: cannot run command: {e}")))?;
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(FsError::Connection(format!(
        "{what} failed ({}): {}",
        output.status,
        stderr.trim()
    )))
}
