//! SMB client seam.
//!
//! [`SambaFs`](super::SambaFs) speaks `smb://server/share/path` URLs to an [`SmbClient`].
//! The shipped client, [`CifsClient`], attaches the share with the kernel CIFS driver
//! and serves requests from that mount, reading NT descriptors through the
//! `system.cifs_ntsd` extended attribute.

use log::{debug, info, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;

use crate::types::EntryKind;
use crate::utils::{CIFS_NTSD_XATTR, MountConsts};

use super::samba::SmbAuth;
use super::system::{network_fs_at, privileged_command, run_checked};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmbStat {
    pub kind: EntryKind,
    pub size: u64,
    pub mtime: i64,
    pub ctime: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmbDirent {
    pub name: String,
    pub kind: EntryKind,
}

/// URL-addressed SMB operations. Errors keep their `io::ErrorKind` so callers can tell
/// "not found" from "access denied".
pub trait SmbClient {
    /// Open a session; credentials come from `auth`.
    fn init(&mut self, auth: &SmbAuth) -> io::Result<()>;

    fn shutdown(&mut self) -> io::Result<()>;

    fn stat(&self, url: &str) -> io::Result<SmbStat>;

    /// Direct children, without `.` and `..`.
    fn read_dir(&self, url: &str) -> io::Result<Vec<SmbDirent>>;

    fn read(&self, url: &str) -> io::Result<Vec<u8>>;

    /// Self-relative NT security descriptor bytes.
    fn security_descriptor(&self, url: &str) -> io::Result<Vec<u8>>;
}

/// Kernel CIFS mount of one share.
pub struct CifsClient {
    server: String,
    share: String,
    mount_point: PathBuf,
    mounted: bool,
}

impl CifsClient {
    pub fn new(server: &str, share: &str, mount_point: &str) -> Self {
        Self {
            server: server.to_string(),
            share: share.to_string(),
            mount_point: PathBuf::from(mount_point),
            mounted: false,
        }
    }

    /// Path under the mount point for `smb://server/share/rest`.
    fn local_path(&self, url: &str) -> io::Result<PathBuf> {
        let prefix = format!("smb://{}/{}", self.server, self.share);
        let rest = url
            .get(..prefix.len())
            .filter(|head| head.eq_ignore_ascii_case(&prefix))
            .map(|_| &url[prefix.len()..])
            .filter(|rest| rest.is_empty() || rest.starts_with('/'))
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{url} is not on //{}/{}", self.server, self.share),
                )
            })?;
        Ok(self.mount_point.join(rest.trim_start_matches('/')))
    }

    /// `mount` arguments; credentials travel in the environment, never here.
    pub fn mount_args(&self, auth: &SmbAuth) -> Vec<String> {
        let mut options = String::from("ro");
        if let Some(wg) = &auth.workgroup {
            options.push_str(&format!(",domain={wg}"));
        }
        vec![
            "-t".to_string(),
            MountConsts::CIFS_FS_TYPE.to_string(),
            format!("//{}/{}", self.server, self.share),
            self.mount_point.to_string_lossy().to_string(),
            "-o".to_string(),
            options,
        ]
    }
}

impl SmbClient for CifsClient {
    fn init(&mut self, auth: &SmbAuth) -> io::Result<()> {
        let creds = auth
            .credentials_for(&self.server, &self.share)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    format!("no credentials for //{}/{}", self.server, self.share),
                )
            })?;
        if network_fs_at(&self.mount_point).is_some() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} is already mounted", self.mount_point.display()),
            ));
        }
        fs::create_dir_all(&self.mount_point)?;
        info!(
            "Mounting //{}/{} on {}",
            self.server,
            self.share,
            self.mount_point.display()
        );
        // mount.cifs reads USER and PASSWD so the password stays off the command line.
        let mut cmd = privileged_command(
            MountConsts::MOUNT_BIN,
            &self.mount_args(auth),
            &["USER", "PASSWD"],
        );
        cmd.env("USER", creds.user).env("PASSWD", creds.password);
        run_checked(cmd, "mount.cifs").map_err(|e| io::Error::other(e.to_string()))?;
        self.mounted = true;
        Ok(())
    }

    fn shutdown(&mut self) -> io::Result<()> {
        if !self.mounted {
            return Ok(());
        }
        thread::sleep(MountConsts::UNMOUNT_SETTLE);
        let target = self.mount_point.to_string_lossy().to_string();
        let cmd = privileged_command(MountConsts::UMOUNT_BIN, &[target], &[]);
        run_checked(cmd, "umount").map_err(|e| io::Error::other(e.to_string()))?;
        self.mounted = false;
        Ok(())
    }

    fn stat(&self, url: &str) -> io::Result<SmbStat> {
        let m = fs::metadata(self.local_path(url)?)?;
        Ok(stat_from_metadata(&m))
    }

    fn read_dir(&self, url: &str) -> io::Result<Vec<SmbDirent>> {
        let dir = self.local_path(url)?;
        let mut out = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                warn!("Skipping non UTF-8 name in {}: {:?}", url, entry.file_name());
                continue;
            };
            let kind = match fs::metadata(entry.path()) {
                Ok(m) => stat_from_metadata(&m).kind,
                Err(e) => {
                    debug!("Skipping {}/{}: {}", url, name, e);
                    continue;
                }
            };
            out.push(SmbDirent { name, kind });
        }
        Ok(out)
    }

    fn read(&self, url: &str) -> io::Result<Vec<u8>> {
        fs::read(self.local_path(url)?)
    }

    fn security_descriptor(&self, url: &str) -> io::Result<Vec<u8>> {
        read_xattr(&self.local_path(url)?, CIFS_NTSD_XATTR)
    }
}

fn stat_from_metadata(m: &fs::Metadata) -> SmbStat {
    let kind = if m.is_dir() {
        EntryKind::Directory
    } else if m.is_file() {
        EntryKind::File
    } else {
        EntryKind::Other
    };
    #[cfg(unix)]
    let (mtime, ctime) = {
        use std::os::unix::fs::MetadataExt;
        (m.mtime(), m.ctime())
    };
    #[cfg(not(unix))]
    let (mtime, ctime) = {
        let t = m
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        (t, t)
    };
    SmbStat {
        kind,
        size: m.len(),
        mtime,
        ctime,
    }
}

#[cfg(target_os = "linux")]
fn read_xattr(path: &Path, name: &str) -> io::Result<Vec<u8>> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let c_name =
        CString::new(name).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    // First call sizes the buffer.
    let len = unsafe { libc::getxattr(c_path.as_ptr(), c_name.as_ptr(), std::ptr::null_mut(), 0) };
    if len < 0 {
        return Err(io::Error::last_os_error());
    }
    let mut buf = vec![0u8; len as usize];
    let read = unsafe {
        libc::getxattr(
            c_path.as_ptr(),
            c_name.as_ptr(),
            buf.as_mut_ptr() as *mut libc::c_void,
            buf.len(),
        )
    };
    if read < 0 {
        return Err(io::Error::last_os_error());
    }
    buf.truncate(read as usize);
    Ok(buf)
}

#[cfg(not(target_os = "linux"))]
fn read_xattr(path: &Path, _name: &str) -> io::Result<Vec<u8>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("{}: NT descriptors need a Linux CIFS mount", path.display()),
    ))
}
