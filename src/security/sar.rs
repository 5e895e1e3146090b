//! Security access requirements: the conjunction of per-level clauses a principal must
//! satisfy to reach a document through its ancestor chain.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::FsResult;
use crate::fs::FsProxy;

use super::cache::AclCache;
use super::{Principal, Rights};

/// Who is allowed and who is denied the required right at one level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clause {
    pub allowed: BTreeSet<Principal>,
    pub denied: BTreeSet<Principal>,
}

impl Clause {
    /// Not denied, and allowed by name or through `Everyone`.
    pub fn admits(&self, principal: &Principal) -> bool {
        if self.denied.contains(principal) {
            return false;
        }
        self.allowed.contains(principal) || self.allowed.contains(&Principal::Everyone)
    }
}

/// One clause per level, root-most first, document last.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sar {
    pub clauses: Vec<Clause>,
}

impl Sar {
    pub fn allows(&self, principal: &Principal) -> bool {
        self.clauses.iter().all(|c| c.admits(principal))
    }

    /// Principals named anywhere in the chain that pass every level, plus `Everyone` if
    /// every level is open to everyone.
    pub fn principals(&self) -> BTreeSet<Principal> {
        self.clauses
            .iter()
            .flat_map(|c| c.allowed.iter())
            .filter(|p| self.allows(p))
            .cloned()
            .collect()
    }
}

/// Fold ACLs from the configured root down to `local`. The document level requires read;
/// ancestor levels require the backend's traversal right. Uses and fills `cache`.
pub fn compute_sar(fs: &dyn FsProxy, cache: &mut AclCache, local: &str) -> FsResult<Sar> {
    let chain = fs.ancestors(local)?;
    let traverse = fs.ancestor_right();
    let mut clauses = Vec::with_capacity(chain.len());
    for (depth, path) in chain.iter().enumerate() {
        let acl = cache.get_or_build(fs, path)?;
        let right = if depth == 0 { Rights::READ } else { traverse };
        clauses.push(acl.clause_for(right));
    }
    clauses.reverse();
    Ok(Sar { clauses })
}
