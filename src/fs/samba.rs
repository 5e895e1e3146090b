//! SMB share backend. Local paths are the `smb://server/share/...` URLs themselves.

use log::info;
use std::collections::BTreeSet;

use crate::config::SmbConfig;
use crate::error::{FsError, FsResult, Probe};
use crate::security::{RawPermissions, Rights};
use crate::types::{EntryKind, Protocol};
use crate::url::{Location, Resolver};

use super::smb_client::{SmbClient, SmbStat};
use super::{FsProxy, child_path};

/// Session credentials, handed out only for the configured server and share.
#[derive(Clone)]
pub struct SmbAuth {
    pub server: String,
    pub share: String,
    pub workgroup: Option<String>,
    pub user: String,
    pub password: String,
}

pub struct Credentials<'a> {
    pub workgroup: Option<&'a str>,
    pub user: &'a str,
    pub password: &'a str,
}

impl SmbAuth {
    pub fn from_config(cfg: &SmbConfig) -> Self {
        Self {
            server: cfg.host.clone(),
            share: cfg.share.clone(),
            workgroup: cfg.workgroup.clone(),
            user: cfg.user.clone(),
            password: cfg.password.clone(),
        }
    }

    /// Share names compare case-insensitively; server names exactly.
    pub fn credentials_for(&self, server: &str, share: &str) -> Option<Credentials<'_>> {
        if server != self.server || !share.eq_ignore_ascii_case(&self.share) || self.user.is_empty()
        {
            return None;
        }
        Some(Credentials {
            workgroup: self.workgroup.as_deref(),
            user: &self.user,
            password: &self.password,
        })
    }
}

impl std::fmt::Debug for SmbAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmbAuth")
            .field("server", &self.server)
            .field("share", &self.share)
            .field("workgroup", &self.workgroup)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

pub struct SambaFs {
    resolver: Resolver,
    auth: SmbAuth,
    client: Box<dyn SmbClient>,
}

impl SambaFs {
    pub fn new(resolver: Resolver, auth: SmbAuth, client: Box<dyn SmbClient>) -> Self {
        Self {
            resolver,
            auth,
            client,
        }
    }

    fn stat(&self, url: &str) -> FsResult<SmbStat> {
        self.client.stat(url).map_err(|e| FsError::from_io(url, e))
    }

    fn list_kind(&self, location: &Location, kind: EntryKind) -> FsResult<BTreeSet<String>> {
        let url = &location.local;
        let entries = self
            .client
            .read_dir(url)
            .map_err(|e| FsError::from_io(url, e))?;
        Ok(entries
            .into_iter()
            .filter(|e| e.kind == kind && e.name != "." && e.name != "..")
            .map(|e| child_path(url, &e.name))
            .collect())
    }
}

impl FsProxy for SambaFs {
    fn protocol(&self) -> Protocol {
        Protocol::Smb
    }

    fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    fn connect(&mut self) -> FsResult<()> {
        info!("Opening SMB session to //{}/{}", self.auth.server, self.auth.share);
        self.client.init(&self.auth).map_err(|e| {
            FsError::Connection(format!(
                "//{}/{}: {}",
                self.auth.server, self.auth.share, e
            ))
        })
    }

    fn disconnect(&mut self) -> FsResult<()> {
        self.client
            .shutdown()
            .map_err(|e| FsError::Connection(format!("SMB shutdown: {e}")))
    }

    fn probe(&self, location: &Location) -> Probe {
        match self.client.stat(&location.local) {
            Ok(st) => Probe::Found(st.kind),
            Err(e) => Probe::from_io_error(&e),
        }
    }

    fn list_files(&self, location: &Location) -> FsResult<BTreeSet<String>> {
        self.list_kind(location, EntryKind::File)
    }

    fn list_subdirectories(&self, location: &Location) -> FsResult<BTreeSet<String>> {
        self.list_kind(location, EntryKind::Directory)
    }

    fn read_content(&self, location: &Location) -> FsResult<Vec<u8>> {
        let url = &location.local;
        let expected = self.stat(url)?.size;
        let data = self.client.read(url).map_err(|e| FsError::from_io(url, e))?;
        if data.len() as u64 != expected {
            return Err(FsError::access(
                url.as_str(),
                format!(
                    "Short read: read only {} bytes ({} expected)",
                    data.len(),
                    expected
                ),
            ));
        }
        Ok(data)
    }

    fn read_permissions(&self, local: &str) -> FsResult<RawPermissions> {
        self.client
            .security_descriptor(local)
            .map(RawPermissions::NtDescriptor)
            .map_err(|e| FsError::from_io(local, e))
    }

    fn read_mtime(&self, location: &Location) -> FsResult<i64> {
        Ok(self.stat(&location.local)?.mtime)
    }

    fn read_ctime(&self, location: &Location) -> FsResult<i64> {
        Ok(self.stat(&location.local)?.ctime)
    }

    fn ancestor_right(&self) -> Rights {
        Rights::READ
    }
}
