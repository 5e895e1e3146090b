//! Application configuration constants.
//! Tuning and thresholds in one place.

use std::sync::OnceLock;
use std::time::Duration;

// ---- Package / paths (from CARGO_PKG_NAME, cached) ----

/// Package-derived paths: built once from `CARGO_PKG_NAME`, then cached.
pub struct PackagePaths {
    pkg_name: &'static str,
    db_filename: String,
    config_filename: String,
    password_env: String,
}

static PACKAGE_PATHS: OnceLock<PackagePaths> = OnceLock::new();

impl PackagePaths {
    /// Build and cache paths from `CARGO_PKG_NAME`. Called once on first use.
    pub fn get() -> &'static PackagePaths {
        PACKAGE_PATHS.get_or_init(|| {
            let pkg = env!("CARGO_PKG_NAME");
            PackagePaths {
                pkg_name: pkg,
                db_filename: format!(".{pkg}"),
                config_filename: format!("{pkg}.toml"),
                password_env: format!("{}_SMB_PASSWORD", pkg.to_uppercase()),
            }
        })
    }

    pub fn pkg_name(&self) -> &str {
        self.pkg_name
    }

    /// Default document store file (`.fsload`).
    pub fn db_filename(&self) -> &str {
        &self.db_filename
    }

    /// Default config file (`fsload.toml`).
    pub fn config_filename(&self) -> &str {
        &self.config_filename
    }

    /// Env var consulted for the SMB password when the config has none.
    pub fn password_env(&self) -> &str {
        &self.password_env
    }
}

// ---- Mount commands ----

/// External commands and timings for attaching and detaching remote filesystems.
pub struct MountConsts;

impl MountConsts {
    pub const MOUNT_BIN: &'static str = "mount";
    pub const UMOUNT_BIN: &'static str = "umount";
    pub const SUDO_BIN: &'static str = "sudo";
    pub const NFS_FS_TYPE: &'static str = "nfs";
    pub const CIFS_FS_TYPE: &'static str = "cifs";
    /// Pause before unmounting so the kernel releases open handles.
    pub const UNMOUNT_SETTLE: Duration = Duration::from_secs(1);
}

// ---- SMB ----

/// Extended attribute holding the raw NT security descriptor on CIFS mounts.
pub const CIFS_NTSD_XATTR: &str = "system.cifs_ntsd";

// ---- Progress ----

pub struct ProgressConsts;

impl ProgressConsts {
    /// Documents emitted between progress bar refreshes.
    pub const PROGRESS_UPDATE_BATCH_SIZE: usize = 100;
}

// ---- Database ----

/// Batch size for DB insert/update chunks (balance transaction size vs round-trips).
pub const DB_INSERT_BATCH_SIZE: usize = 1000;
