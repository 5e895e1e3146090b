//! Filesystem backends behind one capability set.

pub mod mount;
pub mod samba;
pub mod smb_client;
pub mod system;

pub use mount::MountedFs;
pub use samba::{SambaFs, SmbAuth};
pub use smb_client::{CifsClient, SmbClient, SmbDirent, SmbStat};

use std::collections::BTreeSet;

use crate::config::FsConfig;
use crate::error::{FsResult, Probe};
use crate::security::{RawPermissions, Rights};
use crate::types::{EntryKind, Protocol};
use crate::url::{Cid, Location, Resolver};

/// Operations the crawl engine needs from a backend.
///
/// Paths handed in and out are backend-local (`/mnt/docs/a.txt`, `smb://host/share/a.txt`).
/// Listings return full local paths of direct children.
pub trait FsProxy {
    fn protocol(&self) -> Protocol;

    fn resolver(&self) -> &Resolver;

    /// Fatal on failure.
    fn connect(&mut self) -> FsResult<()>;

    fn disconnect(&mut self) -> FsResult<()>;

    /// Location from a CID string or a local path.
    fn create_url(&self, identifier: &str) -> FsResult<Location> {
        self.resolver().resolve(identifier)
    }

    fn create_url_from_cid(&self, cid: &Cid) -> FsResult<Location> {
        self.resolver().resolve_cid(cid)
    }

    fn probe(&self, location: &Location) -> Probe;

    fn check_if_dir_exists(&self, location: &Location) -> FsResult<bool> {
        self.probe(location)
            .is_kind(&location.local, EntryKind::Directory)
    }

    fn check_if_file_exists(&self, location: &Location) -> FsResult<bool> {
        self.probe(location).is_kind(&location.local, EntryKind::File)
    }

    fn list_files(&self, location: &Location) -> FsResult<BTreeSet<String>>;

    fn list_subdirectories(&self, location: &Location) -> FsResult<BTreeSet<String>>;

    /// Whole content; a short read is an access error.
    fn read_content(&self, location: &Location) -> FsResult<Vec<u8>>;

    /// Raw permissions of a local path (documents and ancestors alike).
    fn read_permissions(&self, local: &str) -> FsResult<RawPermissions>;

    /// Content change time, seconds since epoch.
    fn read_mtime(&self, location: &Location) -> FsResult<i64>;

    /// Metadata (permission) change time, seconds since epoch.
    fn read_ctime(&self, location: &Location) -> FsResult<i64>;

    /// `local` and its ancestors up to the configured root, nearest first.
    fn ancestors(&self, local: &str) -> FsResult<Vec<String>> {
        self.resolver().ancestors(local)
    }

    /// Right needed on every ancestor to reach a document.
    fn ancestor_right(&self) -> Rights;
}

/// Backend for the configured protocol.
pub fn open_proxy(config: &FsConfig) -> FsResult<Box<dyn FsProxy>> {
    match config {
        FsConfig::Mount(cfg) => Ok(Box::new(MountedFs::new(cfg.clone()))),
        FsConfig::Smb(cfg) => {
            let client = CifsClient::new(&cfg.host, &cfg.share, &cfg.mount_point);
            Ok(Box::new(SambaFs::new(
                config.resolver(),
                SmbAuth::from_config(cfg),
                Box::new(client),
            )))
        }
    }
}

/// `dir/name` for a listed child.
pub(crate) fn child_path(dir: &str, name: &str) -> String {
    format!("{}/{}", dir.trim_end_matches('/'), name)
}
