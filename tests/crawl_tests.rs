//! Crawl tests: full runs against a local directory (mount backend, already attached)
//! and an in-memory SMB client.

use std::cell::Cell;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use fsload::config::MountConfig;
use fsload::engine::check_mapping_threshold;
use fsload::fs::{FsProxy, MountedFs, SambaFs, SmbAuth, SmbClient, SmbDirent, SmbStat};
use fsload::security::ntsd::{Ace, SecurityDescriptor, Sid};
use fsload::security::{AclBuilder, AclCache, IdMapping, Principal, PrincipalKind, SidMapping};
use fsload::{
    CrawlOpts, CrawlParams, CrawlReport, Document, DocumentStore, EntryKind, PathFilter,
    Resolver, SqliteStore, Status, run_crawl,
};

// --- helpers: mount backend ---

fn mount_fs(root: &Path) -> MountedFs {
    MountedFs::new(MountConfig {
        host: "10.0.0.1".into(),
        remote_root: "/export/docs".into(),
        mount_point: root.to_string_lossy().trim_end_matches('/').to_string(),
        mount_options: None,
        users: IdMapping::default(),
        groups: IdMapping::default(),
    })
}

fn filter(excludes: &[&str]) -> PathFilter {
    let mut f = PathFilter::new(true);
    f.set_excluded_patterns(excludes).unwrap();
    f
}

fn run(
    fs: &mut dyn FsProxy,
    store: &mut SqliteStore,
    filter: &PathFilter,
    acls: AclBuilder,
    opts: CrawlOpts,
    roots: &[String],
) -> CrawlReport {
    run_crawl(
        fs,
        store,
        CrawlParams {
            filter,
            acls: AclCache::new(acls),
            opts,
            roots,
            connect: false,
            cancel: None,
        },
    )
    .unwrap()
}

fn run_mount(root: &Path, store: &mut SqliteStore, filter: &PathFilter, secured: bool) -> CrawlReport {
    let mut fs = mount_fs(root);
    let roots = vec![fs.resolver().root_cid().to_string()];
    let opts = CrawlOpts {
        secured,
        ..CrawlOpts::default()
    };
    run(&mut fs, store, filter, AclBuilder::default(), opts, &roots)
}

fn status_of(store: &mut SqliteStore, cid: &str) -> Option<Status> {
    store.get(cid).unwrap().map(|d| d.status)
}

fn docs_tree() -> tempfile::TempDir {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("a.txt"), b"alpha").unwrap();
    fs::write(tmp.path().join("b.tmp"), b"scratch").unwrap();
    fs::create_dir(tmp.path().join("sub")).unwrap();
    fs::write(tmp.path().join("sub").join("c.txt"), b"gamma").unwrap();
    tmp
}

const ROOT: &str = "nfs://10.0.0.1/export/docs";

// --- mount backend ---

#[test]
fn test_first_run_emits_files_and_directories() {
    let tmp = docs_tree();
    let mut store = SqliteStore::in_memory().unwrap();
    let report = run_mount(tmp.path(), &mut store, &filter(&["*.tmp"]), false);

    assert!(!report.interrupted);
    assert_eq!(report.statuses, vec![(ROOT.to_string(), Status::Aux)]);
    assert_eq!(report.stats.directories, 2);
    assert_eq!(report.stats.new_files, 2);
    assert_eq!(report.stats.updated_files, 0);
    assert_eq!(report.stats.deleted_files, 0);

    assert_eq!(status_of(&mut store, ROOT), Some(Status::Aux));
    assert_eq!(status_of(&mut store, &format!("{ROOT}/sub")), Some(Status::Aux));
    assert_eq!(status_of(&mut store, &format!("{ROOT}/b.tmp")), None);

    let a = store.get(&format!("{ROOT}/a.txt")).unwrap().unwrap();
    assert_eq!(a.status, Status::Ok);
    assert_eq!(a.generation, report.generation);
    assert_eq!(a.content.as_ref().map(|c| c.data.as_slice()), Some(&b"alpha"[..]));
    assert!(a.acl.is_none());
    assert!(a.sar.is_none());
}

#[test]
fn test_unchanged_files_are_not_reread() {
    let tmp = docs_tree();
    let mut store = SqliteStore::in_memory().unwrap();
    let f = filter(&["*.tmp"]);
    run_mount(tmp.path(), &mut store, &f, false);

    let second = run_mount(tmp.path(), &mut store, &f, false);
    assert_eq!(second.stats.new_files, 0);
    assert_eq!(second.stats.updated_files, 0);
    assert_eq!(second.stats.deleted_files, 0);
    // Every document is re-emitted with the new generation.
    let a = store.get(&format!("{ROOT}/a.txt")).unwrap().unwrap();
    assert_eq!(a.generation, second.generation);
}

#[test]
fn test_older_stored_content_is_refreshed() {
    let tmp = docs_tree();
    let mut store = SqliteStore::in_memory().unwrap();
    let f = filter(&["*.tmp"]);
    run_mount(tmp.path(), &mut store, &f, false);

    let cid = format!("{ROOT}/a.txt");
    let mut doc = store.get(&cid).unwrap().unwrap();
    let mtime = doc.content.as_ref().map(|c| c.timestamp).unwrap();
    doc.set_content(b"stale".to_vec(), mtime - 10);
    store.send(&doc).unwrap();
    store.flush().unwrap();

    let report = run_mount(tmp.path(), &mut store, &f, false);
    assert_eq!(report.stats.updated_files, 1);
    assert_eq!(report.stats.new_files, 0);
    let doc = store.get(&cid).unwrap().unwrap();
    assert_eq!(doc.content.map(|c| c.data), Some(b"alpha".to_vec()));
}

#[test]
fn test_identical_reread_is_not_an_update() {
    let tmp = docs_tree();
    let mut store = SqliteStore::in_memory().unwrap();
    let f = filter(&["*.tmp"]);
    run_mount(tmp.path(), &mut store, &f, false);

    // Older timestamp, same bytes: the file is re-read but nothing changed.
    let cid = format!("{ROOT}/a.txt");
    let mut doc = store.get(&cid).unwrap().unwrap();
    let mtime = doc.content.as_ref().map(|c| c.timestamp).unwrap();
    let hash = doc.content_hash.clone();
    if let Some(layer) = doc.content.as_mut() {
        layer.timestamp = mtime - 10;
    }
    store.send(&doc).unwrap();
    store.flush().unwrap();

    let report = run_mount(tmp.path(), &mut store, &f, false);
    assert_eq!(report.stats.updated_files, 0);
    assert_eq!(report.stats.new_files, 0);
    let doc = store.get(&cid).unwrap().unwrap();
    assert_eq!(doc.content.map(|c| c.timestamp), Some(mtime));
    assert_eq!(doc.content_hash, hash);
}

#[test]
fn test_removed_and_newly_excluded_documents_are_deleted() {
    let tmp = docs_tree();
    let mut store = SqliteStore::in_memory().unwrap();
    run_mount(tmp.path(), &mut store, &filter(&["*.tmp"]), false);

    fs::remove_file(tmp.path().join("a.txt")).unwrap();
    let report = run_mount(tmp.path(), &mut store, &filter(&["*.tmp", "*/sub"]), false);

    // a.txt is gone; sub was excluded (its child c.txt is no longer visited but still exists).
    assert_eq!(status_of(&mut store, &format!("{ROOT}/a.txt")), Some(Status::Deleted));
    assert_eq!(status_of(&mut store, &format!("{ROOT}/sub")), Some(Status::Deleted));
    assert_eq!(status_of(&mut store, &format!("{ROOT}/sub/c.txt")), Some(Status::Ok));
    assert_eq!(status_of(&mut store, ROOT), Some(Status::Aux));
    assert_eq!(report.stats.deleted_files, 2);
}

#[test]
fn test_secured_run_adds_acl_and_sar_layers() {
    let tmp = docs_tree();
    let mut store = SqliteStore::in_memory().unwrap();
    let report = run_mount(tmp.path(), &mut store, &filter(&["*.tmp"]), true);

    let root = store.get(ROOT).unwrap().unwrap();
    assert_eq!(root.sar.as_ref().map(|s| s.data.clauses.len()), Some(1));
    let c = store.get(&format!("{ROOT}/sub/c.txt")).unwrap().unwrap();
    assert!(c.acl.is_some());
    assert_eq!(c.sar.as_ref().map(|s| s.data.clauses.len()), Some(3));

    // No names configured: owner and group of the tree are reported once each.
    assert_eq!(report.misses.users.len(), 1);
    assert_eq!(report.misses.groups.len(), 1);
}

#[test]
fn test_unchanged_acls_still_report_unmapped_ids() {
    let tmp = docs_tree();
    let mut store = SqliteStore::in_memory().unwrap();
    let f = filter(&["*.tmp"]);
    let first = run_mount(tmp.path(), &mut store, &f, true);

    // Nothing changed: every ACL layer is reused from the store.
    let second = run_mount(tmp.path(), &mut store, &f, true);
    assert_eq!(second.stats.new_files, 0);
    assert_eq!(second.stats.updated_files, 0);
    assert_eq!(second.misses.users.len(), 1);
    assert_eq!(second.misses.groups.len(), 1);
    assert_eq!(second.misses.distinct(), first.misses.distinct());
    assert!(check_mapping_threshold(&second, Some(0)).is_err());
    assert!(check_mapping_threshold(&second, Some(2)).is_ok());
}

#[test]
fn test_foreign_root_is_skipped() {
    let tmp = docs_tree();
    let mut store = SqliteStore::in_memory().unwrap();
    let mut fs = mount_fs(tmp.path());
    let roots = vec!["smb://fs/Public".to_string()];
    let report = run(
        &mut fs,
        &mut store,
        &filter(&[]),
        AclBuilder::default(),
        CrawlOpts::default(),
        &roots,
    );
    assert_eq!(report.statuses, vec![(roots[0].clone(), Status::Ok)]);
    assert_eq!(report.stats.directories, 0);
    assert_eq!(store.count_by_status().unwrap().len(), 0);
}

#[test]
fn test_cancelled_walk_skips_reconciliation() {
    let tmp = docs_tree();
    let mut store = SqliteStore::in_memory().unwrap();
    run_mount(tmp.path(), &mut store, &filter(&["*.tmp"]), false);
    fs::remove_file(tmp.path().join("a.txt")).unwrap();

    let mut fs = mount_fs(tmp.path());
    let roots = vec![ROOT.to_string()];
    let f = filter(&["*.tmp"]);
    let report = run_crawl(
        &mut fs,
        &mut store,
        CrawlParams {
            filter: &f,
            acls: AclCache::new(AclBuilder::default()),
            opts: CrawlOpts::default(),
            roots: &roots,
            connect: false,
            cancel: Some(Arc::new(AtomicBool::new(true))),
        },
    )
    .unwrap();

    assert!(report.interrupted);
    assert_eq!(report.stats.deleted_files, 0);
    assert_eq!(status_of(&mut store, &format!("{ROOT}/a.txt")), Some(Status::Ok));
}

// --- helpers: in-memory SMB ---

struct Node {
    kind: EntryKind,
    data: Vec<u8>,
    readable: bool,
    descriptor: Vec<u8>,
}

#[derive(Clone, Default)]
struct Calls {
    init: Rc<Cell<u32>>,
    shutdown: Rc<Cell<u32>>,
}

struct MemorySmb {
    nodes: BTreeMap<String, Node>,
    /// Present on the share but hidden from listings; stat is refused.
    denied: BTreeSet<String>,
    calls: Calls,
}

impl MemorySmb {
    fn new(calls: &Calls) -> Self {
        Self {
            nodes: share(),
            denied: BTreeSet::new(),
            calls: calls.clone(),
        }
    }

    fn node(&self, url: &str) -> io::Result<&Node> {
        if self.denied.contains(url) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, url.to_string()));
        }
        self.nodes
            .get(url)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, url.to_string()))
    }
}

impl SmbClient for MemorySmb {
    fn init(&mut self, auth: &SmbAuth) -> io::Result<()> {
        if auth.credentials_for("fs", "public").is_none() {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "no credentials"));
        }
        self.calls.init.set(self.calls.init.get() + 1);
        Ok(())
    }

    fn shutdown(&mut self) -> io::Result<()> {
        self.calls.shutdown.set(self.calls.shutdown.get() + 1);
        Ok(())
    }

    fn stat(&self, url: &str) -> io::Result<SmbStat> {
        let node = self.node(url)?;
        Ok(SmbStat {
            kind: node.kind,
            size: node.data.len() as u64,
            mtime: 1_700_000_000,
            ctime: 1_700_000_000,
        })
    }

    fn read_dir(&self, url: &str) -> io::Result<Vec<SmbDirent>> {
        self.node(url)?;
        let prefix = format!("{url}/");
        Ok(self
            .nodes
            .iter()
            .filter(|(k, _)| !self.denied.contains(k.as_str()))
            .filter_map(|(k, n)| {
                let name = k.strip_prefix(&prefix)?;
                (!name.contains('/')).then(|| SmbDirent {
                    name: name.to_string(),
                    kind: n.kind,
                })
            })
            .collect())
    }

    fn read(&self, url: &str) -> io::Result<Vec<u8>> {
        let node = self.node(url)?;
        if !node.readable {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, url.to_string()));
        }
        Ok(node.data.clone())
    }

    fn security_descriptor(&self, url: &str) -> io::Result<Vec<u8>> {
        Ok(self.node(url)?.descriptor.clone())
    }
}

const ALICE_SID: &str = "S-1-5-21-1-2-3-1001";
const BOB_SID: &str = "S-1-5-21-1-2-3-1002";
const SMB_ROOT: &str = "smb://fs/Public";
const FILE_READ_DATA: u32 = 0x1;
const GENERIC_READ: u32 = 0x8000_0000;

fn sid(s: &str) -> Sid {
    s.parse().unwrap()
}

fn descriptor(dacl: Option<Vec<Ace>>) -> Vec<u8> {
    SecurityDescriptor {
        owner: Some(sid(ALICE_SID)),
        group: None,
        dacl,
    }
    .to_bytes()
    .unwrap()
}

fn share() -> BTreeMap<String, Node> {
    let everyone_reads = descriptor(Some(vec![Ace::allowed(sid("S-1-1-0"), GENERIC_READ)]));
    let mut nodes = BTreeMap::new();
    let mut add = |path: &str, kind, data: &[u8], readable, descriptor: Vec<u8>| {
        nodes.insert(
            format!("{SMB_ROOT}{path}"),
            Node {
                kind,
                data: data.to_vec(),
                readable,
                descriptor,
            },
        );
    };
    add("", EntryKind::Directory, b"", true, everyone_reads.clone());
    add(
        "/a.txt",
        EntryKind::File,
        b"public",
        true,
        descriptor(Some(vec![
            Ace::allowed(sid("S-1-1-0"), GENERIC_READ),
            Ace::denied(sid(BOB_SID), FILE_READ_DATA),
        ])),
    );
    add("/locked.bin", EntryKind::File, b"xx", false, everyone_reads);
    add(
        "/HR",
        EntryKind::Directory,
        b"",
        true,
        descriptor(Some(vec![Ace::allowed(sid(ALICE_SID), FILE_READ_DATA)])),
    );
    add("/HR/pay.xls", EntryKind::File, b"salaries", true, descriptor(None));
    nodes
}

fn smb_fs(client: MemorySmb) -> SambaFs {
    let auth = SmbAuth {
        server: "fs".into(),
        share: "Public".into(),
        workgroup: None,
        user: "alice".into(),
        password: "secret".into(),
    };
    SambaFs::new(
        Resolver::Smb {
            host: "fs".into(),
            share: "Public".into(),
        },
        auth,
        Box::new(client),
    )
}

fn smb_builder() -> AclBuilder {
    let mut sids = SidMapping::default();
    sids.add(ALICE_SID, "alice", PrincipalKind::User);
    AclBuilder::for_smb(sids)
}

fn run_smb(store: &mut SqliteStore, calls: &Calls, skip_non_readable_files: bool) -> CrawlReport {
    run_smb_with(store, MemorySmb::new(calls), skip_non_readable_files)
}

fn run_smb_with(
    store: &mut SqliteStore,
    client: MemorySmb,
    skip_non_readable_files: bool,
) -> CrawlReport {
    let mut fs = smb_fs(client);
    let roots = vec![SMB_ROOT.to_string()];
    let f = PathFilter::new(false);
    run_crawl(
        &mut fs,
        store,
        CrawlParams {
            filter: &f,
            acls: AclCache::new(smb_builder()),
            opts: CrawlOpts {
                secured: true,
                skip_non_readable_files,
                verbose: false,
            },
            roots: &roots,
            connect: true,
            cancel: None,
        },
    )
    .unwrap()
}

// --- SMB backend ---

#[test]
fn test_smb_crawl_connects_and_computes_sar() {
    let calls = Calls::default();
    let mut store = SqliteStore::in_memory().unwrap();
    let report = run_smb(&mut store, &calls, true);

    assert_eq!(calls.init.get(), 1);
    assert_eq!(calls.shutdown.get(), 1);
    assert_eq!(report.stats.directories, 2);
    assert_eq!(report.stats.new_files, 2);

    let alice = Principal::User("alice".into());
    let bob = Principal::Unmapped(BOB_SID.to_string());

    let pay = store.get(&format!("{SMB_ROOT}/HR/pay.xls")).unwrap().unwrap();
    assert_eq!(pay.status, Status::Ok);
    let sar = pay.sar.unwrap().data;
    assert_eq!(sar.clauses.len(), 3);
    assert!(sar.allows(&alice));
    assert!(!sar.allows(&Principal::Everyone));

    let a = store.get(&format!("{SMB_ROOT}/a.txt")).unwrap().unwrap();
    let sar = a.sar.unwrap().data;
    assert!(sar.allows(&Principal::Everyone));
    assert!(!sar.allows(&bob));

    assert_eq!(report.misses.sids.count(&BOB_SID.to_string()), 1);
}

#[test]
fn test_smb_unreadable_file_is_skipped() {
    let calls = Calls::default();
    let mut store = SqliteStore::in_memory().unwrap();
    run_smb(&mut store, &calls, true);
    assert_eq!(status_of(&mut store, &format!("{SMB_ROOT}/locked.bin")), None);
    assert_eq!(status_of(&mut store, SMB_ROOT), Some(Status::Aux));
}

#[test]
fn test_smb_unreadable_file_is_emitted_ko() {
    let calls = Calls::default();
    let mut store = SqliteStore::in_memory().unwrap();
    run_smb(&mut store, &calls, false);
    let locked = store.get(&format!("{SMB_ROOT}/locked.bin")).unwrap().unwrap();
    assert_eq!(locked.status, Status::Ko);
    assert!(locked.content.is_none());
}

#[test]
fn test_broken_descriptor_is_not_counted() {
    let calls = Calls::default();
    let broken = format!("{SMB_ROOT}/broken.doc");
    for skip in [true, false] {
        let mut store = SqliteStore::in_memory().unwrap();
        let mut client = MemorySmb::new(&calls);
        client.nodes.insert(
            broken.clone(),
            Node {
                kind: EntryKind::File,
                data: b"readable".to_vec(),
                readable: true,
                descriptor: vec![1, 2, 3],
            },
        );
        let report = run_smb_with(&mut store, client, skip);

        // Content was read, but the ACL step failed: not a new file.
        assert_eq!(report.stats.new_files, 2, "skip={skip}");
        let stored = status_of(&mut store, &broken);
        if skip {
            assert_eq!(stored, None);
        } else {
            assert_eq!(stored, Some(Status::Ko));
        }
    }
}

#[test]
fn test_unverifiable_documents_are_kept() {
    let calls = Calls::default();
    let mut store = SqliteStore::in_memory().unwrap();
    run_smb(&mut store, &calls, true);

    // Stored under another server: the backend cannot resolve it.
    let foreign = "smb://otherhost/Public/x.txt";
    let mut doc = Document::new(foreign);
    doc.status = Status::Ok;
    store.send(&doc).unwrap();
    store.flush().unwrap();

    // a.txt still exists but can no longer be looked at.
    let a = format!("{SMB_ROOT}/a.txt");
    let mut client = MemorySmb::new(&calls);
    client.denied.insert(a.clone());
    let report = run_smb_with(&mut store, client, true);

    assert_eq!(report.stats.deleted_files, 0);
    assert_eq!(status_of(&mut store, &a), Some(Status::Ok));
    assert_eq!(status_of(&mut store, foreign), Some(Status::Ok));

    // Once it is really gone, it is deleted.
    let mut client = MemorySmb::new(&calls);
    client.nodes.remove(&a);
    let report = run_smb_with(&mut store, client, true);
    assert_eq!(report.stats.deleted_files, 1);
    assert_eq!(status_of(&mut store, &a), Some(Status::Deleted));
    assert_eq!(status_of(&mut store, foreign), Some(Status::Ok));
}
