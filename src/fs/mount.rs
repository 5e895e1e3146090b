//! Remote export attached read-only under a local mount point (NFS).

use log::{debug, info, warn};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use std::thread;
use walkdir::WalkDir;

use crate::config::MountConfig;
use crate::error::{FsError, FsResult, Probe};
use crate::security::{RawPermissions, Rights};
use crate::types::{EntryKind, Protocol};
use crate::url::{Location, Resolver};
use crate::utils::MountConsts;

use super::system::{network_fs_at, privileged_command, run_checked};
use super::{FsProxy, child_path};

pub struct MountedFs {
    config: MountConfig,
    resolver: Resolver,
}

impl MountedFs {
    pub fn new(config: MountConfig) -> Self {
        let resolver = config.resolver();
        Self { config, resolver }
    }

    /// `mount -r -t nfs [-o options] host:remote_root mount_point`
    pub fn mount_args(&self) -> Vec<String> {
        let mut args = vec![
            "-r".to_string(),
            "-t".to_string(),
            MountConsts::NFS_FS_TYPE.to_string(),
        ];
        if let Some(opts) = &self.config.mount_options
            && !opts.is_empty()
        {
            args.push("-o".to_string());
            args.push(opts.clone());
        }
        args.push(format!("{}:{}", self.config.host, self.config.remote_root));
        args.push(self.config.mount_point.clone());
        args
    }

    /// Files and directories directly under `dir`. Symlinks count as files when they
    /// resolve to one; anything else is skipped.
    fn list_children(&self, dir: &str) -> FsResult<(BTreeSet<String>, BTreeSet<String>)> {
        let mut files = BTreeSet::new();
        let mut dirs = BTreeSet::new();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| FsError::access(dir, e))?;
            let Some(name) = entry.file_name().to_str() else {
                warn!("Skipping non UTF-8 name in {}: {:?}", dir, entry.file_name());
                continue;
            };
            let path = child_path(dir, name);
            let ft = entry.file_type();
            if ft.is_file() {
                files.insert(path);
            } else if ft.is_dir() {
                dirs.insert(path);
            } else if ft.is_symlink() {
                match fs::metadata(entry.path()) {
                    Ok(m) if m.is_file() => {
                        files.insert(path);
                    }
                    Ok(_) => debug!("Skipping non-file symlink: {}", path),
                    Err(e) => debug!("Skipping dangling symlink: {} ({})", path, e),
                }
            }
        }
        Ok((files, dirs))
    }
}

impl FsProxy for MountedFs {
    fn protocol(&self) -> Protocol {
        Protocol::Nfs
    }

    fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    fn connect(&mut self) -> FsResult<()> {
        let mount_point = Path::new(&self.config.mount_point);
        if let Some(fs_type) = network_fs_at(mount_point) {
            return Err(FsError::Connection(format!(
                "{} already carries a {} mount",
                self.config.mount_point, fs_type
            )));
        }
        info!(
            "Mounting {}:{} on {}",
            self.config.host, self.config.remote_root, self.config.mount_point
        );
        let cmd = privileged_command(MountConsts::MOUNT_BIN, &self.mount_args(), &[]);
        run_checked(cmd, "mount")?;
        if network_fs_at(mount_point).is_none() {
            warn!(
                "No network filesystem visible at {} after mount",
                self.config.mount_point
            );
        }
        Ok(())
    }

    fn disconnect(&mut self) -> FsResult<()> {
        thread::sleep(MountConsts::UNMOUNT_SETTLE);
        info!("Unmounting {}", self.config.mount_point);
        let cmd = privileged_command(
            MountConsts::UMOUNT_BIN,
            std::slice::from_ref(&self.config.mount_point),
            &[],
        );
        run_checked(cmd, "umount")
    }

    fn probe(&self, location: &Location) -> Probe {
        match fs::metadata(&location.local) {
            Ok(m) if m.is_dir() => Probe::Found(EntryKind::Directory),
            Ok(m) if m.is_file() => Probe::Found(EntryKind::File),
            Ok(_) => Probe::Found(EntryKind::Other),
            Err(e) => Probe::from_io_error(&e),
        }
    }

    fn list_files(&self, location: &Location) -> FsResult<BTreeSet<String>> {
        self.list_children(&location.local).map(|(files, _)| files)
    }

    fn list_subdirectories(&self, location: &Location) -> FsResult<BTreeSet<String>> {
        self.list_children(&location.local).map(|(_, dirs)| dirs)
    }

    fn read_content(&self, location: &Location) -> FsResult<Vec<u8>> {
        let path = &location.local;
        let mut file = File::open(path).map_err(|e| FsError::from_io(path, e))?;
        let expected = file
            .metadata()
            .map_err(|e| FsError::from_io(path, e))?
            .len();
        let mut data = Vec::with_capacity(expected as usize);
        let read = file
            .read_to_end(&mut data)
            .map_err(|e| FsError::from_io(path, e))?;
        if read as u64 != expected {
            return Err(FsError::access(
                path,
                format!("Short read: read only {read} bytes ({expected} expected)"),
            ));
        }
        Ok(data)
    }

    #[cfg(unix)]
    fn read_permissions(&self, local: &str) -> FsResult<RawPermissions> {
        use std::os::unix::fs::MetadataExt;
        let m = fs::metadata(local).map_err(|e| FsError::from_io(local, e))?;
        Ok(RawPermissions::Posix {
            uid: m.uid(),
            gid: m.gid(),
            mode: m.mode(),
        })
    }

    #[cfg(not(unix))]
    fn read_permissions(&self, local: &str) -> FsResult<RawPermissions> {
        Err(FsError::access(local, "POSIX permissions unavailable on this platform"))
    }

    fn read_mtime(&self, location: &Location) -> FsResult<i64> {
        let m = fs::metadata(&location.local).map_err(|e| FsError::from_io(&location.local, e))?;
        Ok(mtime_secs(&m))
    }

    fn read_ctime(&self, location: &Location) -> FsResult<i64> {
        let m = fs::metadata(&location.local).map_err(|e| FsError::from_io(&location.local, e))?;
        Ok(ctime_secs(&m))
    }

    fn ancestor_right(&self) -> Rights {
        Rights::EXECUTE
    }
}

#[cfg(unix)]
fn mtime_secs(m: &fs::Metadata) -> i64 {
    use std::os::unix::fs::MetadataExt;
    m.mtime()
}

#[cfg(unix)]
fn ctime_secs(m: &fs::Metadata) -> i64 {
    use std::os::unix::fs::MetadataExt;
    m.ctime()
}

#[cfg(not(unix))]
fn mtime_secs(m: &fs::Metadata) -> i64 {
    m.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(not(unix))]
fn ctime_secs(m: &fs::Metadata) -> i64 {
    mtime_secs(m)
}
