//! Canonical access-control model shared by both backends.
//!
//! Raw permissions (POSIX owner/group/mode or an NT security descriptor) are translated
//! into an ordered [`Acl`] of allow/deny entries. For one required right, the first entry
//! mentioning a principal decides for that principal, which gives POSIX class semantics
//! and NT ACE-order semantics from the same evaluation.

pub mod builder;
pub mod cache;
pub mod mapping;
pub mod ntsd;
pub mod sar;

pub use builder::{AclBuilder, RawPermissions};
pub use cache::AclCache;
pub use mapping::{IdMapping, MappingMisses, MissCounter, PrincipalKind, SidMapping};
pub use sar::{Clause, Sar, compute_sar};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Principal {
    Everyone,
    User(String),
    Group(String),
    /// Identifier with no configured name (`uid:1001`, `gid:20`, `S-1-5-21-...`).
    Unmapped(String),
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Principal::Everyone => f.write_str("everyone"),
            Principal::User(n) => write!(f, "user:{n}"),
            Principal::Group(n) => write!(f, "group:{n}"),
            Principal::Unmapped(id) => write!(f, "unmapped:{id}"),
        }
    }
}

/// Read/write/execute bits, same layout as one POSIX mode triplet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rights(u8);

impl Rights {
    pub const NONE: Rights = Rights(0);
    pub const EXECUTE: Rights = Rights(0o1);
    pub const WRITE: Rights = Rights(0o2);
    pub const READ: Rights = Rights(0o4);
    pub const ALL: Rights = Rights(0o7);

    /// From one octal mode triplet (`mode >> 6 & 7` etc).
    pub fn from_mode_bits(bits: u32) -> Self {
        Rights((bits & 0o7) as u8)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn contains(&self, other: Rights) -> bool {
        !other.is_empty() && self.0 & other.0 == other.0
    }

    pub fn union(self, other: Rights) -> Rights {
        Rights(self.0 | other.0)
    }

    /// Rights not in `self`.
    pub fn complement(self) -> Rights {
        Rights(!self.0 & 0o7)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AceKind {
    Allow,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclEntry {
    pub principal: Principal,
    pub kind: AceKind,
    pub rights: Rights,
}

impl AclEntry {
    pub fn allow(principal: Principal, rights: Rights) -> Self {
        Self {
            principal,
            kind: AceKind::Allow,
            rights,
        }
    }

    pub fn deny(principal: Principal, rights: Rights) -> Self {
        Self {
            principal,
            kind: AceKind::Deny,
            rights,
        }
    }
}

/// Ordered entries for one path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    pub entries: Vec<AclEntry>,
}

impl Acl {
    pub fn new(entries: Vec<AclEntry>) -> Self {
        Self { entries }
    }

    /// Who is allowed / denied `right` at this level. First applicable entry per principal wins.
    pub fn clause_for(&self, right: Rights) -> Clause {
        let mut decided: HashSet<&Principal> = HashSet::new();
        let mut allowed = BTreeSet::new();
        let mut denied = BTreeSet::new();
        for entry in &self.entries {
            if !entry.rights.contains(right) || !decided.insert(&entry.principal) {
                continue;
            }
            match entry.kind {
                AceKind::Allow => allowed.insert(entry.principal.clone()),
                AceKind::Deny => denied.insert(entry.principal.clone()),
            };
        }
        Clause { allowed, denied }
    }
}
