//! Canonical document identifiers (CIDs) and their mapping to backend-local paths.
//!
//! Mount backend: `nfs://host/remote_root/rel` <-> `mount_point/rel`.
//! SMB backend: `smb://host/share/rel` is both the CID and the local path.

use std::fmt;
use std::str::FromStr;

use crate::error::{FsError, FsResult};
use crate::types::Protocol;

/// `scheme://host/path`. Stable across runs; primary key of the document store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cid {
    pub scheme: String,
    pub host: String,
    /// Always starts with `/` (just `/` for the host root).
    pub path: String,
}

impl Cid {
    pub fn new(protocol: Protocol, host: &str, path: &str) -> Self {
        Self {
            scheme: protocol.as_str().to_string(),
            host: host.to_string(),
            path: normalize_abs(path),
        }
    }

    /// None when the scheme is not one of ours.
    pub fn protocol(&self) -> Option<Protocol> {
        self.scheme.parse().ok()
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}{}", self.scheme, self.host, self.path)
    }
}

impl FromStr for Cid {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, rest) = s
            .split_once("://")
            .ok_or_else(|| FsError::Resolve(format!("not a document identifier: {s}")))?;
        if scheme.is_empty() {
            return Err(FsError::Resolve(format!("missing scheme: {s}")));
        }
        let (host, path) = match rest.find('/') {
            Some(i) => (&rest[..i], &rest[i..]),
            None => (rest, "/"),
        };
        if host.is_empty() {
            return Err(FsError::Resolve(format!("missing host: {s}")));
        }
        Ok(Cid {
            scheme: scheme.to_ascii_lowercase(),
            host: host.to_string(),
            path: normalize_abs(path),
        })
    }
}

/// A resolved location: both coordinate systems, computed eagerly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub local: String,
    pub cid: Cid,
}

/// Identity parameters of the active backend; pure conversions in both directions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolver {
    Mount {
        host: String,
        remote_root: String,
        mount_point: String,
    },
    Smb {
        host: String,
        share: String,
    },
}

impl Resolver {
    pub fn protocol(&self) -> Protocol {
        match self {
            Resolver::Mount { .. } => Protocol::Nfs,
            Resolver::Smb { .. } => Protocol::Smb,
        }
    }

    /// CID of the configured root (`nfs://host/remote_root`, `smb://host/share`).
    pub fn root_cid(&self) -> Cid {
        match self {
            Resolver::Mount {
                host, remote_root, ..
            } => Cid::new(Protocol::Nfs, host, remote_root),
            Resolver::Smb { host, share } => Cid::new(Protocol::Smb, host, &format!("/{share}")),
        }
    }

    /// Local path of the configured root.
    pub fn root_local(&self) -> String {
        match self {
            Resolver::Mount { mount_point, .. } => mount_point.clone(),
            Resolver::Smb { host, share } => format!("smb://{host}/{share}"),
        }
    }

    pub fn cid_to_local(&self, cid: &Cid) -> FsResult<String> {
        if cid.protocol() != Some(self.protocol()) {
            return Err(FsError::Resolve(format!(
                "{cid} does not belong to the {} backend",
                self.protocol()
            )));
        }
        match self {
            Resolver::Mount {
                host,
                remote_root,
                mount_point,
            } => {
                if cid.host != *host {
                    return Err(FsError::Resolve(format!("{cid}: host is not {host}")));
                }
                let rest = strip_path_prefix(&cid.path, remote_root, true).ok_or_else(|| {
                    FsError::Resolve(format!("{cid}: path is not under {remote_root}"))
                })?;
                Ok(format!("{mount_point}{rest}"))
            }
            Resolver::Smb { host, share } => {
                if !cid.host.eq_ignore_ascii_case(host) {
                    return Err(FsError::Resolve(format!("{cid}: host is not {host}")));
                }
                strip_path_prefix(&cid.path, &format!("/{share}"), false).ok_or_else(|| {
                    FsError::Resolve(format!("{cid}: path is not under share {share}"))
                })?;
                Ok(cid.to_string())
            }
        }
    }

    pub fn local_to_cid(&self, local: &str) -> FsResult<Cid> {
        match self {
            Resolver::Mount {
                host,
                remote_root,
                mount_point,
            } => {
                let rest = strip_path_prefix(local, mount_point, true).ok_or_else(|| {
                    FsError::Resolve(format!("{local}: not under mount point {mount_point}"))
                })?;
                Ok(Cid::new(
                    Protocol::Nfs,
                    host,
                    &format!("{remote_root}{rest}"),
                ))
            }
            Resolver::Smb { .. } => {
                let cid: Cid = local.parse()?;
                // Same validation as the other direction.
                self.cid_to_local(&cid)?;
                Ok(cid)
            }
        }
    }

    /// Resolve either a CID string (`scheme://...`) or a backend-local path.
    pub fn resolve(&self, identifier: &str) -> FsResult<Location> {
        match self {
            Resolver::Mount { .. } if identifier.contains("://") => {
                let cid: Cid = identifier.parse()?;
                let local = self.cid_to_local(&cid)?;
                Ok(Location { local, cid })
            }
            _ => {
                let cid = self.local_to_cid(identifier)?;
                Ok(Location {
                    local: identifier.to_string(),
                    cid,
                })
            }
        }
    }

    pub fn resolve_cid(&self, cid: &Cid) -> FsResult<Location> {
        Ok(Location {
            local: self.cid_to_local(cid)?,
            cid: cid.clone(),
        })
    }

    /// `local` and each of its ancestors up to and including the configured root,
    /// nearest first. Trailing slashes are dropped.
    pub fn ancestors(&self, local: &str) -> FsResult<Vec<String>> {
        let root = self.root_local();
        let root = root.trim_end_matches('/');
        let case_sensitive = matches!(self, Resolver::Mount { .. });
        let mut current = local.trim_end_matches('/').to_string();
        if strip_path_prefix(&current, root, case_sensitive).is_none() {
            return Err(FsError::Resolve(format!("{local}: not under {root}")));
        }
        let mut chain = Vec::new();
        loop {
            let at_root = current.len() <= root.len();
            chain.push(if current.is_empty() {
                "/".to_string()
            } else {
                current.clone()
            });
            if at_root {
                break;
            }
            match current.rfind('/') {
                Some(i) => current.truncate(i),
                None => break,
            }
        }
        Ok(chain)
    }
}

/// Remainder of `path` below `prefix` (`""` or `/...`), comparing whole components.
fn strip_path_prefix<'a>(path: &'a str, prefix: &str, case_sensitive: bool) -> Option<&'a str> {
    let prefix = prefix.trim_end_matches('/');
    if path.len() < prefix.len() || !path.is_char_boundary(prefix.len()) {
        return None;
    }
    let (head, rest) = path.split_at(prefix.len());
    let same = if case_sensitive {
        head == prefix
    } else {
        head.eq_ignore_ascii_case(prefix)
    };
    (same && (rest.is_empty() || rest.starts_with('/'))).then_some(rest)
}

fn normalize_abs(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}
