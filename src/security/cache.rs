//! Per-run ACL cache keyed by local path.
//!
//! Every ACL is stored under both the slash-terminated and the bare form of its path, so
//! directory listings and ancestor walks hit the same entry.

use log::debug;
use std::collections::HashMap;

use crate::error::FsResult;
use crate::fs::FsProxy;

use super::builder::AclBuilder;
use super::mapping::MappingMisses;
use super::Acl;

pub struct AclCache {
    entries: HashMap<String, Acl>,
    builder: AclBuilder,
    builds: usize,
}

impl AclCache {
    pub fn new(builder: AclBuilder) -> Self {
        Self {
            entries: HashMap::new(),
            builder,
            builds: 0,
        }
    }

    pub fn get(&self, path: &str) -> Option<&Acl> {
        self.entries.get(path)
    }

    /// Seed the cache, e.g. from a still-fresh stored ACL layer. Its unmapped principals
    /// are counted as if it had been translated.
    pub fn add(&mut self, path: &str, acl: Acl) {
        if self.entries.contains_key(path) {
            return;
        }
        self.builder.count_placeholders(&acl);
        self.insert(path, acl);
    }

    fn insert(&mut self, path: &str, acl: Acl) {
        let (bare, slashed) = cache_keys(path);
        if let Some(slashed) = slashed {
            self.entries.insert(slashed, acl.clone());
        }
        self.entries.insert(bare, acl);
    }

    /// Cached ACL for `path`, or read it from the backend, translate and cache it.
    pub fn get_or_build(&mut self, fs: &dyn FsProxy, path: &str) -> FsResult<Acl> {
        if let Some(acl) = self.entries.get(path) {
            return Ok(acl.clone());
        }
        debug!("ACL cache miss: {}", path);
        let raw = fs.read_permissions(path)?;
        let acl = self.builder.translate(path, &raw)?;
        self.builds += 1;
        self.insert(path, acl.clone());
        Ok(acl)
    }

    /// Number of backend reads so far.
    pub fn builds(&self) -> usize {
        self.builds
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn misses(&self) -> &MappingMisses {
        self.builder.misses()
    }
}

/// (bare, slash-terminated). The filesystem root only has `/`.
fn cache_keys(path: &str) -> (String, Option<String>) {
    let bare = path.trim_end_matches('/');
    if bare.is_empty() {
        ("/".to_string(), None)
    } else {
        (bare.to_string(), Some(format!("{bare}/")))
    }
}
