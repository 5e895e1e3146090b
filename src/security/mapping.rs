//! Identifier-to-name tables and mapping-miss counters.

use log::warn;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::{FsError, FsResult};

use super::{Acl, Principal};

/// Occurrence count per unmapped identifier, kept for end-of-run diagnostics.
#[derive(Debug, Clone, Default)]
pub struct MissCounter<K: Ord> {
    misses: BTreeMap<K, u32>,
}

impl<K: Ord> MissCounter<K> {
    pub fn record(&mut self, id: K) {
        *self.misses.entry(id).or_insert(0) += 1;
    }

    /// Distinct identifiers missed.
    pub fn len(&self) -> usize {
        self.misses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.misses.is_empty()
    }

    pub fn count(&self, id: &K) -> u32 {
        self.misses.get(id).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &u32)> {
        self.misses.iter()
    }
}

/// Numeric UID or GID to name (mount backend).
#[derive(Debug, Clone, Default)]
pub struct IdMapping {
    names: HashMap<u32, String>,
}

impl IdMapping {
    /// Keys must be decimal ids.
    pub fn from_config(map: &BTreeMap<String, String>) -> FsResult<Self> {
        let mut names = HashMap::with_capacity(map.len());
        for (id, name) in map {
            let id: u32 = id
                .trim()
                .parse()
                .map_err(|_| FsError::Config(format!("invalid numeric id '{id}' in mapping")))?;
            names.insert(id, name.clone());
        }
        Ok(Self { names })
    }

    pub fn insert(&mut self, id: u32, name: impl Into<String>) {
        self.names.insert(id, name.into());
    }

    pub fn get(&self, id: u32) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrincipalKind {
    User,
    Group,
}

/// SID to (name, kind) (SMB backend).
#[derive(Debug, Clone, Default)]
pub struct SidMapping {
    actors: HashMap<String, (String, PrincipalKind)>,
}

impl SidMapping {
    pub fn add_mappings(&mut self, map: &BTreeMap<String, String>, kind: PrincipalKind) {
        for (sid, name) in map {
            self.add(sid, name, kind);
        }
    }

    pub fn add(&mut self, sid: &str, name: &str, kind: PrincipalKind) {
        self.actors
            .insert(sid.trim().to_ascii_uppercase(), (name.to_string(), kind));
    }

    pub fn get(&self, sid: &str) -> Option<Principal> {
        self.actors
            .get(&sid.to_ascii_uppercase())
            .map(|(name, kind)| match kind {
                PrincipalKind::User => Principal::User(name.clone()),
                PrincipalKind::Group => Principal::Group(name.clone()),
            })
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }
}

/// One counter set per identifier kind.
#[derive(Debug, Clone, Default)]
pub struct MappingMisses {
    pub users: MissCounter<u32>,
    pub groups: MissCounter<u32>,
    pub sids: MissCounter<String>,
}

impl MappingMisses {
    pub fn distinct(&self) -> usize {
        self.users.len() + self.groups.len() + self.sids.len()
    }

    /// Count the placeholders of an ACL that was not translated in this run, e.g. a
    /// still-fresh stored layer. Each identifier counts once per ACL.
    pub fn record_placeholders(&mut self, acl: &Acl) {
        let ids: BTreeSet<&str> = acl
            .entries
            .iter()
            .filter_map(|e| match &e.principal {
                Principal::Unmapped(id) => Some(id.as_str()),
                _ => None,
            })
            .collect();
        for id in ids {
            if let Some(uid) = id.strip_prefix("uid:").and_then(|n| n.parse().ok()) {
                self.users.record(uid);
            } else if let Some(gid) = id.strip_prefix("gid:").and_then(|n| n.parse().ok()) {
                self.groups.record(gid);
            } else {
                self.sids.record(id.to_string());
            }
        }
    }

    pub fn log_warnings(&self) {
        log_id_misses(&self.users, "USER", "uid");
        log_id_misses(&self.groups, "GROUP", "gid");
        if !self.sids.is_empty() {
            warn!(
                "Found {} SID{} without mapping",
                self.sids.len(),
                plural(self.sids.len(), "s")
            );
            for (sid, n) in self.sids.iter() {
                warn!(
                    "Could not find mapping for user or group with SID='{}' ({} occurrence(s))",
                    sid, n
                );
            }
        }
    }
}

fn log_id_misses(misses: &MissCounter<u32>, kind: &str, id_name: &str) {
    if misses.is_empty() {
        return;
    }
    warn!(
        "Found {} {}{} without mapping",
        misses.len(),
        kind,
        plural(misses.len(), "S")
    );
    for (id, n) in misses.iter() {
        warn!(
            "Could not find mapping for {} with {}={} ({} occurrence(s))",
            kind, id_name, id, n
        );
    }
}

fn plural(n: usize, suffix: &str) -> &str {
    if n > 1 { suffix } else { "" }
}
