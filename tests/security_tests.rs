//! Security tests: rights and ACL evaluation, id/SID mappings, NT descriptors,
//! permission translation, the ACL cache and SAR folding.

use std::cell::Cell;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use fsload::error::{FsError, FsResult, Probe};
use fsload::fs::FsProxy;
use fsload::security::ntsd::{Ace, INHERIT_ONLY_ACE, SecurityDescriptor, Sid, WORLD_SID};
use fsload::security::{
    Acl, AclBuilder, AclCache, AclEntry, Clause, IdMapping, MappingMisses, Principal,
    PrincipalKind, RawPermissions, Rights, Sar, SidMapping, compute_sar,
};
use fsload::{Location, Protocol, Resolver};

// NT access mask bits used below.
const FILE_READ_DATA: u32 = 0x1;
const GENERIC_ALL: u32 = 0x1000_0000;

fn alice() -> Principal {
    Principal::User("alice".into())
}

fn staff() -> Principal {
    Principal::Group("staff".into())
}

// --- rights and acl ---

#[test]
fn test_rights_bits() {
    assert!(Rights::ALL.contains(Rights::READ));
    assert!(!Rights::from_mode_bits(0o5).contains(Rights::WRITE));
    assert!(Rights::from_mode_bits(0o5).contains(Rights::EXECUTE));
    assert!(!Rights::ALL.contains(Rights::NONE));
    assert_eq!(
        Rights::from_mode_bits(0o4).complement(),
        Rights::from_mode_bits(0o3)
    );
}

#[test]
fn test_first_applicable_entry_wins() {
    let acl = Acl::new(vec![
        AclEntry::allow(alice(), Rights::WRITE),
        AclEntry::deny(alice(), Rights::READ),
        AclEntry::allow(alice(), Rights::ALL),
        AclEntry::allow(Principal::Everyone, Rights::READ),
    ]);
    let read = acl.clause_for(Rights::READ);
    assert!(read.denied.contains(&alice()));
    assert!(!read.allowed.contains(&alice()));
    assert!(read.allowed.contains(&Principal::Everyone));

    let write = acl.clause_for(Rights::WRITE);
    assert!(write.allowed.contains(&alice()));
    assert!(write.denied.is_empty());
}

// --- mapping ---

#[test]
fn test_id_mapping_rejects_non_numeric_keys() {
    let mut map = BTreeMap::new();
    map.insert("1000".to_string(), "alice".to_string());
    assert_eq!(
        IdMapping::from_config(&map).unwrap().get(1000),
        Some("alice")
    );
    map.insert("bob".to_string(), "bob".to_string());
    assert!(matches!(
        IdMapping::from_config(&map),
        Err(FsError::Config(_))
    ));
}

#[test]
fn test_sid_lookup_is_case_insensitive() {
    let mut m = SidMapping::default();
    m.add("s-1-5-21-1-2-3-1001", "alice", PrincipalKind::User);
    m.add("S-1-5-21-1-2-3-513", "domain users", PrincipalKind::Group);
    assert_eq!(m.get("S-1-5-21-1-2-3-1001"), Some(alice()));
    assert_eq!(
        m.get("S-1-5-21-1-2-3-513"),
        Some(Principal::Group("domain users".into()))
    );
    assert_eq!(m.get("S-1-5-32-544"), None);
}

#[test]
fn test_miss_counter_counts_occurrences() {
    let mut misses = MappingMisses::default();
    misses.users.record(1001);
    misses.users.record(1001);
    misses.groups.record(50);
    misses.sids.record("S-1-5-21-9".to_string());
    assert_eq!(misses.users.count(&1001), 2);
    assert_eq!(misses.distinct(), 3);
}

#[test]
fn test_placeholders_of_an_existing_acl_are_counted() {
    let acl = Acl::new(vec![
        AclEntry::allow(Principal::Unmapped("uid:1001".into()), Rights::ALL),
        AclEntry::deny(Principal::Unmapped("uid:1001".into()), Rights::WRITE),
        AclEntry::allow(Principal::Unmapped("gid:50".into()), Rights::READ),
        AclEntry::allow(Principal::Unmapped("S-1-5-21-1-2-3-1002".into()), Rights::READ),
        AclEntry::allow(alice(), Rights::READ),
        AclEntry::allow(Principal::Everyone, Rights::READ),
    ]);
    let mut misses = MappingMisses::default();
    misses.record_placeholders(&acl);
    assert_eq!(misses.users.count(&1001), 1);
    assert_eq!(misses.groups.count(&50), 1);
    assert_eq!(misses.sids.count(&"S-1-5-21-1-2-3-1002".to_string()), 1);
    assert_eq!(misses.distinct(), 3);
}

// --- ntsd ---

fn sid(s: &str) -> Sid {
    s.parse().unwrap()
}

#[test]
fn test_sid_string_forms() {
    let s = sid("S-1-5-21-1004336348-1177238915-682003330-512");
    assert_eq!(s.authority, 5);
    assert_eq!(s.sub_authorities.len(), 5);
    assert_eq!(
        s.to_string(),
        "S-1-5-21-1004336348-1177238915-682003330-512"
    );
    assert!(sid(WORLD_SID).is_world());
    assert!("X-1-5".parse::<Sid>().is_err());
}

#[test]
fn test_decode_descriptor() {
    let sd = SecurityDescriptor {
        owner: Some(sid("S-1-5-21-1-2-3-1001")),
        group: Some(sid("S-1-5-21-1-2-3-513")),
        dacl: Some(vec![
            Ace::denied(sid("S-1-5-21-1-2-3-1002"), 0x1),
            Ace::allowed(sid(WORLD_SID), 0x1200a9),
        ]),
    };
    let parsed = SecurityDescriptor::parse(&sd.to_bytes().unwrap()).unwrap();
    assert_eq!(parsed, sd);
}

#[test]
fn test_absent_dacl_is_null() {
    let sd = SecurityDescriptor {
        owner: Some(sid("S-1-5-32-544")),
        group: None,
        dacl: None,
    };
    let parsed = SecurityDescriptor::parse(&sd.to_bytes().unwrap()).unwrap();
    assert_eq!(parsed.dacl, None);
    assert_eq!(parsed.group, None);
}

#[test]
fn test_truncated_descriptor_is_rejected() {
    let sd = SecurityDescriptor {
        owner: None,
        group: None,
        dacl: Some(vec![Ace::allowed(sid(WORLD_SID), 0x1)]),
    };
    let bytes = sd.to_bytes().unwrap();
    assert!(SecurityDescriptor::parse(&bytes[..bytes.len() - 3]).is_err());
    assert!(SecurityDescriptor::parse(&[1, 0, 4]).is_err());
}

#[test]
fn test_unknown_ace_types_are_skipped() {
    let sd = SecurityDescriptor {
        owner: None,
        group: None,
        dacl: Some(vec![
            Ace {
                ace_type: 2,
                flags: 0,
                mask: 0x1,
                sid: sid(WORLD_SID),
            },
            Ace::allowed(sid("S-1-5-11"), 0x1),
        ]),
    };
    let parsed = SecurityDescriptor::parse(&sd.to_bytes().unwrap()).unwrap();
    assert_eq!(
        parsed.dacl.unwrap(),
        vec![Ace::allowed(sid("S-1-5-11"), 0x1)]
    );
}

// --- builder ---

fn named_builder() -> AclBuilder {
    let mut users = IdMapping::default();
    users.insert(1000, "alice");
    let mut groups = IdMapping::default();
    groups.insert(100, "staff");
    AclBuilder::for_mount(users, groups)
}

fn posix(uid: u32, gid: u32, mode: u32) -> RawPermissions {
    RawPermissions::Posix { uid, gid, mode }
}

#[test]
fn test_posix_mode_to_entries() {
    let mut b = named_builder();
    let acl = b.translate("/f", &posix(1000, 100, 0o100640)).unwrap();
    assert_eq!(
        acl.entries,
        vec![
            AclEntry::allow(alice(), Rights::from_mode_bits(0o6)),
            AclEntry::deny(alice(), Rights::EXECUTE),
            AclEntry::allow(staff(), Rights::READ),
            AclEntry::deny(staff(), Rights::from_mode_bits(0o3)),
        ]
    );
    assert_eq!(b.misses().distinct(), 0);
}

#[test]
fn test_owner_with_fewer_rights_than_others_is_denied() {
    let mut b = named_builder();
    let acl = b.translate("/f", &posix(1000, 100, 0o044)).unwrap();
    let read = acl.clause_for(Rights::READ);
    assert!(read.denied.contains(&alice()));
    assert!(read.allowed.contains(&Principal::Everyone));
}

#[test]
fn test_unmapped_ids_become_placeholders() {
    let mut b = named_builder();
    let acl = b.translate("/f", &posix(1001, 50, 0o777)).unwrap();
    assert_eq!(
        acl.entries[0].principal,
        Principal::Unmapped("uid:1001".into())
    );
    assert_eq!(
        acl.entries[1].principal,
        Principal::Unmapped("gid:50".into())
    );
    assert_eq!(b.misses().users.count(&1001), 1);
    assert_eq!(b.misses().groups.count(&50), 1);
}

#[test]
fn test_descriptor_translation() {
    let mut sids = SidMapping::default();
    sids.add("S-1-5-21-1-2-3-1001", "alice", PrincipalKind::User);
    let mut b = AclBuilder::for_smb(sids);

    let mut inherit_only = Ace::allowed(sid("S-1-5-21-1-2-3-1003"), FILE_READ_DATA);
    inherit_only.flags = INHERIT_ONLY_ACE;
    let sd = SecurityDescriptor {
        owner: None,
        group: None,
        dacl: Some(vec![
            Ace::denied(sid("S-1-5-21-1-2-3-1002"), GENERIC_ALL),
            Ace::allowed(sid("S-1-5-21-1-2-3-1001"), 0x1200a9),
            inherit_only,
            Ace::allowed(sid(WORLD_SID), FILE_READ_DATA),
        ]),
    };
    let acl = b
        .translate(
            "smb://h/s/f",
            &RawPermissions::NtDescriptor(sd.to_bytes().unwrap()),
        )
        .unwrap();
    assert_eq!(
        acl.entries,
        vec![
            AclEntry::deny(
                Principal::Unmapped("S-1-5-21-1-2-3-1002".into()),
                Rights::ALL
            ),
            AclEntry::allow(alice(), Rights::READ.union(Rights::EXECUTE)),
            AclEntry::allow(Principal::Everyone, Rights::READ),
        ]
    );
    assert_eq!(b.misses().sids.len(), 1);
}

#[test]
fn test_null_dacl_grants_everyone() {
    let mut b = AclBuilder::default();
    let bytes = SecurityDescriptor::default().to_bytes().unwrap();
    let acl = b
        .translate("smb://h/s", &RawPermissions::NtDescriptor(bytes))
        .unwrap();
    assert_eq!(
        acl.entries,
        vec![AclEntry::allow(Principal::Everyone, Rights::ALL)]
    );
}

#[test]
fn test_garbage_descriptor_is_an_access_error() {
    let mut b = AclBuilder::default();
    let err = b
        .translate("smb://h/s/f", &RawPermissions::NtDescriptor(vec![1, 2, 3]))
        .unwrap_err();
    assert!(matches!(err, FsError::Access { .. }));
}

// --- cache ---

#[test]
fn test_cache_both_path_forms_hit() {
    let mut cache = AclCache::new(AclBuilder::default());
    let acl = Acl::new(vec![AclEntry::allow(Principal::Everyone, Rights::READ)]);
    cache.add("/mnt/docs/sub/", acl.clone());
    assert_eq!(cache.get("/mnt/docs/sub"), Some(&acl));
    assert_eq!(cache.get("/mnt/docs/sub/"), Some(&acl));
    assert_eq!(cache.len(), 2);
}

#[test]
fn test_cache_root_has_one_key() {
    let mut cache = AclCache::new(AclBuilder::default());
    cache.add("/", Acl::default());
    assert!(cache.get("/").is_some());
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_seeded_acl_counts_its_placeholders_once() {
    let mut cache = AclCache::new(AclBuilder::default());
    let acl = Acl::new(vec![
        AclEntry::allow(Principal::Unmapped("uid:1001".into()), Rights::ALL),
        AclEntry::allow(Principal::Unmapped("gid:50".into()), Rights::READ),
    ]);
    cache.add("/mnt/docs/a.txt", acl.clone());
    // Same path again, either form: already cached, not counted again.
    cache.add("/mnt/docs/a.txt", acl.clone());
    cache.add("/mnt/docs/a.txt/", acl);
    assert_eq!(cache.builds(), 0);
    assert_eq!(cache.misses().users.count(&1001), 1);
    assert_eq!(cache.misses().groups.count(&50), 1);
    assert_eq!(cache.misses().distinct(), 2);
}

// --- sar ---

fn clause(allowed: &[Principal], denied: &[Principal]) -> Clause {
    Clause {
        allowed: allowed.iter().cloned().collect(),
        denied: denied.iter().cloned().collect(),
    }
}

#[test]
fn test_everyone_requires_every_level() {
    let sar = Sar {
        clauses: vec![
            clause(&[Principal::Everyone], &[]),
            clause(&[alice()], &[]),
        ],
    };
    assert!(sar.allows(&alice()));
    assert!(!sar.allows(&Principal::Everyone));
    assert_eq!(sar.principals(), BTreeSet::from([alice()]));
}

#[test]
fn test_deny_at_any_level_excludes() {
    let bob = Principal::User("bob".into());
    let sar = Sar {
        clauses: vec![
            clause(&[Principal::Everyone], &[bob.clone()]),
            clause(&[Principal::Everyone], &[]),
        ],
    };
    assert!(sar.allows(&alice()));
    assert!(!sar.allows(&bob));
    assert!(sar.allows(&Principal::Everyone));
    assert_eq!(sar.principals(), BTreeSet::from([Principal::Everyone]));
}

#[test]
fn test_empty_sar_allows_anyone() {
    assert!(Sar::default().allows(&Principal::Group("g".into())));
}

/// Backend serving only permissions, for SAR folding.
struct PermsFs {
    resolver: Resolver,
    perms: HashMap<String, RawPermissions>,
    reads: Cell<usize>,
}

impl PermsFs {
    fn new(perms: &[(&str, u32)]) -> Self {
        Self {
            resolver: Resolver::Mount {
                host: "10.0.0.1".into(),
                remote_root: "/export/docs".into(),
                mount_point: "/mnt/docs".into(),
            },
            perms: perms
                .iter()
                .map(|(p, mode)| (p.to_string(), posix(1000, 100, *mode)))
                .collect(),
            reads: Cell::new(0),
        }
    }
}

impl FsProxy for PermsFs {
    fn protocol(&self) -> Protocol {
        Protocol::Nfs
    }

    fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    fn connect(&mut self) -> FsResult<()> {
        Ok(())
    }

    fn disconnect(&mut self) -> FsResult<()> {
        Ok(())
    }

    fn probe(&self, _location: &Location) -> Probe {
        Probe::NotFound
    }

    fn list_files(&self, _location: &Location) -> FsResult<BTreeSet<String>> {
        Ok(BTreeSet::new())
    }

    fn list_subdirectories(&self, _location: &Location) -> FsResult<BTreeSet<String>> {
        Ok(BTreeSet::new())
    }

    fn read_content(&self, location: &Location) -> FsResult<Vec<u8>> {
        Err(FsError::access(location.local.as_str(), "no content"))
    }

    fn read_permissions(&self, local: &str) -> FsResult<RawPermissions> {
        self.reads.set(self.reads.get() + 1);
        self.perms
            .get(local)
            .cloned()
            .ok_or_else(|| FsError::access(local, "no permissions"))
    }

    fn read_mtime(&self, _location: &Location) -> FsResult<i64> {
        Ok(0)
    }

    fn read_ctime(&self, _location: &Location) -> FsResult<i64> {
        Ok(0)
    }

    fn ancestor_right(&self) -> Rights {
        Rights::EXECUTE
    }
}

#[test]
fn test_sar_private_directory_hides_readable_file() {
    let fs = PermsFs::new(&[
        ("/mnt/docs", 0o751),
        ("/mnt/docs/private", 0o750),
        ("/mnt/docs/private/a.txt", 0o644),
    ]);
    let mut cache = AclCache::new(named_builder());
    let sar = compute_sar(&fs, &mut cache, "/mnt/docs/private/a.txt").unwrap();

    assert_eq!(sar.clauses.len(), 3);
    assert!(sar.clauses[0].allowed.contains(&Principal::Everyone));
    assert!(sar.allows(&alice()));
    assert!(sar.allows(&staff()));
    assert!(!sar.allows(&Principal::Everyone));
    assert_eq!(sar.principals(), BTreeSet::from([staff(), alice()]));
}

#[test]
fn test_sar_reuses_cached_ancestors() {
    let fs = PermsFs::new(&[
        ("/mnt/docs", 0o755),
        ("/mnt/docs/a.txt", 0o644),
        ("/mnt/docs/b.txt", 0o600),
    ]);
    let mut cache = AclCache::new(named_builder());
    let a = compute_sar(&fs, &mut cache, "/mnt/docs/a.txt").unwrap();
    let b = compute_sar(&fs, &mut cache, "/mnt/docs/b.txt").unwrap();
    assert_eq!(fs.reads.get(), 3);
    assert_eq!(cache.builds(), 3);
    assert!(a.allows(&Principal::Everyone));
    assert!(!b.allows(&Principal::Everyone));
    assert!(b.allows(&alice()));
    // Slash-terminated form hits the same entry.
    assert!(cache.get("/mnt/docs/").is_some());
}

#[test]
fn test_unreadable_ancestor_fails_the_sar() {
    let fs = PermsFs::new(&[("/mnt/docs/a.txt", 0o644)]);
    let mut cache = AclCache::new(named_builder());
    let err = compute_sar(&fs, &mut cache, "/mnt/docs/a.txt").unwrap_err();
    assert!(matches!(err, FsError::Access { .. }));
}

#[test]
fn test_unmapped_owner_is_counted() {
    let fs = PermsFs::new(&[("/mnt/docs", 0o755), ("/mnt/docs/a.txt", 0o644)]);
    let mut cache = AclCache::new(AclBuilder::for_mount(
        IdMapping::default(),
        IdMapping::default(),
    ));
    let sar = compute_sar(&fs, &mut cache, "/mnt/docs/a.txt").unwrap();
    assert!(sar.allows(&Principal::Unmapped("uid:1000".into())));
    let misses = cache.misses();
    assert_eq!(misses.users.count(&1000), 2);
    assert_eq!(misses.groups.count(&100), 2);
    assert_eq!(misses.distinct(), 2);
}
