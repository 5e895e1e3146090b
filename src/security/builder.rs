//! Raw backend permissions to canonical [`Acl`].

use crate::error::{FsError, FsResult};

use super::mapping::{IdMapping, MappingMisses, SidMapping};
use super::ntsd::{ACCESS_ALLOWED_ACE_TYPE, SecurityDescriptor, Sid};
use super::{Acl, AclEntry, Principal, Rights};

const FILE_READ_DATA: u32 = 0x0000_0001;
const FILE_WRITE_DATA: u32 = 0x0000_0002;
const FILE_APPEND_DATA: u32 = 0x0000_0004;
const FILE_EXECUTE: u32 = 0x0000_0020;
const GENERIC_ALL: u32 = 0x1000_0000;
const GENERIC_EXECUTE: u32 = 0x2000_0000;
const GENERIC_WRITE: u32 = 0x4000_0000;
const GENERIC_READ: u32 = 0x8000_0000;

/// What a backend hands back for one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawPermissions {
    Posix { uid: u32, gid: u32, mode: u32 },
    /// Self-relative NT security descriptor bytes.
    NtDescriptor(Vec<u8>),
}

/// Translates raw permissions using the configured name tables, counting misses.
#[derive(Debug, Clone, Default)]
pub struct AclBuilder {
    users: IdMapping,
    groups: IdMapping,
    sids: SidMapping,
    misses: MappingMisses,
}

impl AclBuilder {
    pub fn for_mount(users: IdMapping, groups: IdMapping) -> Self {
        Self {
            users,
            groups,
            ..Default::default()
        }
    }

    pub fn for_smb(sids: SidMapping) -> Self {
        Self {
            sids,
            ..Default::default()
        }
    }

    pub fn misses(&self) -> &MappingMisses {
        &self.misses
    }

    /// Placeholders of an ACL reused without translation still count as misses.
    pub fn count_placeholders(&mut self, acl: &Acl) {
        self.misses.record_placeholders(acl);
    }

    pub fn translate(&mut self, path: &str, raw: &RawPermissions) -> FsResult<Acl> {
        match raw {
            RawPermissions::Posix { uid, gid, mode } => Ok(self.from_posix(*uid, *gid, *mode)),
            RawPermissions::NtDescriptor(bytes) => {
                let sd = SecurityDescriptor::parse(bytes).map_err(|e| FsError::access(path, e))?;
                Ok(self.from_descriptor(&sd))
            }
        }
    }

    /// Owner class, then group class, then everyone. Each class is an allow of its bits
    /// followed by a deny of the rest, so a less privileged owner does not fall through
    /// to group or other rights.
    fn from_posix(&mut self, uid: u32, gid: u32, mode: u32) -> Acl {
        let owner = match self.users.get(uid) {
            Some(name) => Principal::User(name.to_string()),
            None => {
                self.misses.users.record(uid);
                Principal::Unmapped(format!("uid:{uid}"))
            }
        };
        let group = match self.groups.get(gid) {
            Some(name) => Principal::Group(name.to_string()),
            None => {
                self.misses.groups.record(gid);
                Principal::Unmapped(format!("gid:{gid}"))
            }
        };

        let mut entries = Vec::with_capacity(5);
        for (principal, rights) in [
            (owner, Rights::from_mode_bits(mode >> 6)),
            (group, Rights::from_mode_bits(mode >> 3)),
        ] {
            if !rights.is_empty() {
                entries.push(AclEntry::allow(principal.clone(), rights));
            }
            if rights != Rights::ALL {
                entries.push(AclEntry::deny(principal, rights.complement()));
            }
        }
        let other = Rights::from_mode_bits(mode);
        if !other.is_empty() {
            entries.push(AclEntry::allow(Principal::Everyone, other));
        }
        Acl::new(entries)
    }

    fn from_descriptor(&mut self, sd: &SecurityDescriptor) -> Acl {
        let Some(aces) = &sd.dacl else {
            return Acl::new(vec![AclEntry::allow(Principal::Everyone, Rights::ALL)]);
        };
        let mut entries = Vec::with_capacity(aces.len());
        for ace in aces.iter().filter(|a| !a.is_inherit_only()) {
            let rights = rights_from_mask(ace.mask);
            if rights.is_empty() {
                continue;
            }
            let principal = self.sid_principal(&ace.sid);
            entries.push(if ace.ace_type == ACCESS_ALLOWED_ACE_TYPE {
                AclEntry::allow(principal, rights)
            } else {
                AclEntry::deny(principal, rights)
            });
        }
        Acl::new(entries)
    }

    fn sid_principal(&mut self, sid: &Sid) -> Principal {
        if sid.is_world() {
            return Principal::Everyone;
        }
        let text = sid.to_string();
        match self.sids.get(&text) {
            Some(p) => p,
            None => {
                self.misses.sids.record(text.clone());
                Principal::Unmapped(text)
            }
        }
    }
}

/// Fold an NT access mask into read/write/execute.
pub fn rights_from_mask(mask: u32) -> Rights {
    let mut rights = Rights::NONE;
    if mask & GENERIC_ALL != 0 {
        return Rights::ALL;
    }
    if mask & (FILE_READ_DATA | GENERIC_READ) != 0 {
        rights = rights.union(Rights::READ);
    }
    if mask & (FILE_WRITE_DATA | FILE_APPEND_DATA | GENERIC_WRITE) != 0 {
        rights = rights.union(Rights::WRITE);
    }
    if mask & (FILE_EXECUTE | GENERIC_EXECUTE) != 0 {
        rights = rights.union(Rights::EXECUTE);
    }
    rights
}
