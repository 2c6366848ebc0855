//! Purpose: Directory-backed object manager with a bounded connection pool.
//! Exports: `LocalConfig`, `LocalManager`, `LocalConnection`, `LocalMetadataStore`.
//! Role: Concrete backend for the CLI and integration tests; maps logical paths under a root.
//! Invariants: At most `pool_size` connections are leased at once; extra opens fail with `Busy`.
//! Invariants: Every leased connection is counted back exactly once by `release`.
//! Invariants: `/.rodsio` under the root is reserved for backend state and is not addressable.
#![allow(clippy::result_large_err)]

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use sha2::{Digest, Sha256};
use tracing::debug;

use super::object::{Collection, DataObject, DataObjectRow};
use crate::core::backend::{
    Avu, Connection, Descriptor, EntityKind, MetadataStore, ObjectManager, Whence,
};
use crate::core::error::{Error, ErrorKind};
use crate::core::mode::AccessFlag;
use crate::zone_paths::{ZonePathError, default_root, resolve_local_path, split_parent};

const STATE_DIR: &str = ".rodsio";
const META_FILE: &str = "meta.json";
const DEFAULT_POOL_SIZE: usize = 4;
const HASH_BUF_SIZE: usize = 64 * 1024;

#[derive(Clone, Debug)]
pub struct LocalConfig {
    pub root: PathBuf,
    pub pool_size: usize,
}

impl LocalConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            pool_size: DEFAULT_POOL_SIZE,
        }
    }

    /// Root from `RODSIO_ROOT`, else `~/.rodsio/zone`.
    pub fn from_env() -> Self {
        Self::new(default_root())
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }
}

#[derive(Debug, Default)]
struct PoolState {
    idle: Vec<u32>,
    leased: usize,
    next_id: u32,
    releases: u64,
}

#[derive(Debug)]
struct PoolInner {
    size: usize,
    state: Mutex<PoolState>,
}

impl PoolInner {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn acquire(pool: &Arc<Self>) -> Result<LocalConnection, Error> {
        let mut state = pool.lock();
        if state.leased >= pool.size {
            return Err(Error::new(ErrorKind::Busy)
                .with_message(format!("all {} connections are in use", pool.size)));
        }
        let id = match state.idle.pop() {
            Some(id) => id,
            None => {
                state.next_id += 1;
                state.next_id
            }
        };
        state.leased += 1;
        debug!(conn = id, leased = state.leased, "connection acquired");
        Ok(LocalConnection {
            id,
            pool: Some(Arc::clone(pool)),
            files: HashMap::new(),
            next_desc: 3,
        })
    }

    fn give_back(&self, id: u32) {
        let mut state = self.lock();
        state.leased = state.leased.saturating_sub(1);
        state.releases += 1;
        state.idle.push(id);
        debug!(conn = id, leased = state.leased, "connection released");
    }
}

#[derive(Clone, Debug)]
pub struct LocalManager {
    root: PathBuf,
    pool: Arc<PoolInner>,
    metadata: LocalMetadataStore,
}

impl LocalManager {
    /// Opens (and creates if needed) the zone root directory.
    pub fn new(config: LocalConfig) -> Result<Self, Error> {
        if config.pool_size == 0 {
            return Err(Error::new(ErrorKind::Usage).with_message("pool size must be at least 1"));
        }
        let state_dir = config.root.join(STATE_DIR);
        fs::create_dir_all(&state_dir).map_err(|err| {
            Error::from_io(err)
                .with_message("failed to create zone root")
                .with_path(config.root.display().to_string())
        })?;
        Ok(Self {
            metadata: LocalMetadataStore::new(state_dir.join(META_FILE)),
            root: config.root,
            pool: Arc::new(PoolInner {
                size: config.pool_size,
                state: Mutex::new(PoolState::default()),
            }),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn pool_size(&self) -> usize {
        self.pool.size
    }

    /// Connections currently lent out.
    pub fn leased(&self) -> usize {
        self.pool.lock().leased
    }

    /// Total connections returned to the pool since creation.
    pub fn releases(&self) -> u64 {
        self.pool.lock().releases
    }

    pub fn collection(&self, path: &str) -> Result<Arc<Collection>, Error> {
        let local = if path == "/" {
            self.root.clone()
        } else {
            self.local_path(path)?
        };
        let meta = fs::metadata(&local).map_err(|err| path_error(err, path))?;
        if !meta.is_dir() {
            return Err(Error::new(ErrorKind::NotFound)
                .with_message("not a collection")
                .with_path(path));
        }
        Ok(Arc::new(Collection::new(path)))
    }

    /// Whether a data object exists at `path`; errors other than absence propagate.
    pub fn exists(&self, path: &str) -> Result<bool, Error> {
        let local = self.local_path(path)?;
        match fs::metadata(&local) {
            Ok(meta) => Ok(meta.is_file()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(path_error(err, path)),
        }
    }

    /// Attribute row for the data object at `path`, checksum included.
    pub fn lookup(&self, path: &str) -> Result<DataObjectRow, Error> {
        let local = self.local_path(path)?;
        let meta = fs::metadata(&local).map_err(|err| path_error(err, path))?;
        if !meta.is_file() {
            return Err(Error::new(ErrorKind::NotFound)
                .with_message("not a data object")
                .with_path(path));
        }
        let (_, name) = split_parent(path).map_err(|err| zone_path_error(err, path))?;
        Ok(DataObjectRow {
            id: meta.ino(),
            name,
            size: meta.len(),
            checksum: Some(sha256_checksum(&local).map_err(|err| path_error(err, path))?),
            create_time: meta.ctime(),
            modify_time: meta.mtime(),
        })
    }

    /// Resolves `path` into its parent collection and the data object itself.
    /// The caller keeps the collection alive for as long as it needs `DataObject::collection`.
    pub fn data_object(
        manager: &Arc<Self>,
        path: &str,
    ) -> Result<(Arc<Collection>, DataObject<Self>), Error> {
        let (parent, _) = split_parent(path).map_err(|err| zone_path_error(err, path))?;
        let collection = manager.collection(&parent)?;
        let row = manager.lookup(path)?;
        let object = DataObject::new(Arc::clone(manager), &collection, row);
        Ok((collection, object))
    }

    fn local_path(&self, path: &str) -> Result<PathBuf, Error> {
        if path == format!("/{STATE_DIR}") || path.starts_with(&format!("/{STATE_DIR}/")) {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("path is reserved for backend state")
                .with_path(path));
        }
        resolve_local_path(&self.root, path).map_err(|err| zone_path_error(err, path))
    }
}

impl ObjectManager for LocalManager {
    type Connection = LocalConnection;
    type Metadata = LocalMetadataStore;

    fn open(
        &self,
        path: &str,
        access: AccessFlag,
        create_if_missing: bool,
    ) -> Result<(LocalConnection, Descriptor), Error> {
        let local = self.local_path(path)?;
        let mut conn = PoolInner::acquire(&self.pool)?;
        let opened = OpenOptions::new()
            .read(access.can_read())
            .write(access.can_write())
            .create(create_if_missing && access.can_write())
            .open(&local);
        match opened {
            Ok(file) => {
                let desc = conn.register(file);
                debug!(path, conn = conn.id, desc = %desc, "object opened");
                Ok((conn, desc))
            }
            Err(err) => {
                conn.release();
                Err(path_error(err, path))
            }
        }
    }

    fn unlink(&self, path: &str) -> Result<(), Error> {
        let local = self.local_path(path)?;
        fs::remove_file(&local).map_err(|err| path_error(err, path))?;
        self.metadata.forget(EntityKind::DataObject, path)
    }

    fn metadata(&self) -> &LocalMetadataStore {
        &self.metadata
    }
}

/// A pooled connection. Its slot goes back to the pool on `release` or on drop.
#[derive(Debug)]
pub struct LocalConnection {
    id: u32,
    pool: Option<Arc<PoolInner>>,
    files: HashMap<Descriptor, File>,
    next_desc: i32,
}

impl LocalConnection {
    fn register(&mut self, file: File) -> Descriptor {
        let desc = Descriptor(self.next_desc);
        self.next_desc += 1;
        self.files.insert(desc, file);
        desc
    }

    fn file(&mut self, desc: Descriptor) -> Result<&mut File, Error> {
        self.files.get_mut(&desc).ok_or_else(|| bad_descriptor(desc))
    }

    fn give_back(&mut self) {
        if let Some(pool) = self.pool.take() {
            self.files.clear();
            pool.give_back(self.id);
        }
    }
}

impl Drop for LocalConnection {
    fn drop(&mut self) {
        self.give_back();
    }
}

impl Connection for LocalConnection {
    fn close_file(&mut self, desc: Descriptor) -> Result<(), Error> {
        match self.files.remove(&desc) {
            Some(file) => {
                drop(file);
                Ok(())
            }
            None => Err(bad_descriptor(desc)),
        }
    }

    fn read_file(&mut self, desc: Descriptor, size: Option<usize>) -> Result<Vec<u8>, Error> {
        let file = self.file(desc)?;
        let mut buf = Vec::new();
        let read = match size {
            Some(size) => file.take(size as u64).read_to_end(&mut buf),
            None => file.read_to_end(&mut buf),
        };
        read.map_err(|err| Error::from_io(err).with_message("read failed"))?;
        Ok(buf)
    }

    fn write_file(&mut self, desc: Descriptor, data: &[u8]) -> Result<usize, Error> {
        let file = self.file(desc)?;
        file.write(data)
            .map_err(|err| Error::from_io(err).with_message("write failed"))
    }

    fn seek_file(&mut self, desc: Descriptor, offset: i64, whence: Whence) -> Result<u64, Error> {
        let file = self.file(desc)?;
        let pos = match whence {
            Whence::Start => {
                let start = u64::try_from(offset).map_err(|_| {
                    Error::new(ErrorKind::Usage)
                        .with_message("negative absolute seek offset")
                })?;
                SeekFrom::Start(start)
            }
            Whence::Current => SeekFrom::Current(offset),
            Whence::End => SeekFrom::End(offset),
        };
        file.seek(pos)
            .map_err(|err| Error::from_io(err).with_message("seek failed"))
    }

    fn release(mut self) {
        self.give_back();
    }
}

/// AVUs for every entity, persisted as one JSON document under the zone's state directory.
#[derive(Clone, Debug)]
pub struct LocalMetadataStore {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

type MetaTable = BTreeMap<String, Vec<Avu>>;

impl LocalMetadataStore {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Arc::new(Mutex::new(())),
        }
    }

    fn key(kind: EntityKind, path: &str) -> String {
        format!("{}:{path}", kind.as_str())
    }

    fn load(&self) -> Result<MetaTable, Error> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(MetaTable::new()),
            Err(err) => {
                return Err(Error::from_io(err).with_message("failed to read metadata store"));
            }
        };
        serde_json::from_slice(&bytes).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("metadata store is not valid JSON")
                .with_source(err)
        })
    }

    fn save(&self, table: &MetaTable) -> Result<(), Error> {
        let encoded = serde_json::to_vec_pretty(table).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode metadata")
                .with_source(err)
        })?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, encoded)
            .and_then(|()| fs::rename(&tmp, &self.path))
            .map_err(|err| Error::from_io(err).with_message("failed to write metadata store"))
    }

    fn update<T>(&self, apply: impl FnOnce(&mut MetaTable) -> Result<T, Error>) -> Result<T, Error> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut table = self.load()?;
        let out = apply(&mut table)?;
        self.save(&table)?;
        Ok(out)
    }

    fn forget(&self, kind: EntityKind, path: &str) -> Result<(), Error> {
        self.update(|table| {
            table.remove(&Self::key(kind, path));
            Ok(())
        })
    }
}

impl MetadataStore for LocalMetadataStore {
    fn get(&self, kind: EntityKind, path: &str) -> Result<Vec<Avu>, Error> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut table = self.load()?;
        Ok(table.remove(&Self::key(kind, path)).unwrap_or_default())
    }

    fn add(&self, kind: EntityKind, path: &str, avu: &Avu) -> Result<(), Error> {
        self.update(|table| {
            let avus = table.entry(Self::key(kind, path)).or_default();
            if !avus.contains(avu) {
                avus.push(avu.clone());
            }
            Ok(())
        })
    }

    fn remove(&self, kind: EntityKind, path: &str, avu: &Avu) -> Result<(), Error> {
        self.update(|table| {
            let key = Self::key(kind, path);
            let removed = match table.get_mut(&key) {
                Some(avus) => match avus.iter().position(|existing| existing == avu) {
                    Some(idx) => {
                        avus.remove(idx);
                        true
                    }
                    None => false,
                },
                None => false,
            };
            if !removed {
                return Err(Error::new(ErrorKind::NotFound)
                    .with_message(format!("no metadata {}={}", avu.name, avu.value))
                    .with_path(path));
            }
            if table.get(&key).is_some_and(Vec::is_empty) {
                table.remove(&key);
            }
            Ok(())
        })
    }
}

fn sha256_checksum(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_BUF_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("sha2:{:x}", hasher.finalize()))
}

fn path_error(err: io::Error, path: &str) -> Error {
    Error::from_io(err).with_path(path)
}

fn zone_path_error(err: ZonePathError, path: &str) -> Error {
    Error::new(ErrorKind::Usage)
        .with_message(err.describe())
        .with_path(path)
}

fn bad_descriptor(desc: Descriptor) -> Error {
    Error::new(ErrorKind::Usage).with_message(format!("unknown descriptor {desc}"))
}

#[cfg(test)]
mod tests {
    use super::{LocalConfig, LocalManager};
    use crate::core::backend::{Connection, ObjectManager, Whence};
    use crate::core::error::ErrorKind;
    use crate::core::mode::AccessFlag;

    fn manager(pool_size: usize) -> (tempfile::TempDir, LocalManager) {
        let temp = tempfile::tempdir().expect("tempdir");
        let manager = LocalManager::new(LocalConfig::new(temp.path()).with_pool_size(pool_size))
            .expect("manager");
        (temp, manager)
    }

    #[test]
    fn pool_bounds_leases_and_counts_releases() {
        let (_temp, manager) = manager(1);
        let (conn, _) = manager
            .open("/a.txt", AccessFlag::WriteOnly, true)
            .expect("open");
        assert_eq!(manager.leased(), 1);

        let err = manager
            .open("/a.txt", AccessFlag::ReadOnly, false)
            .expect_err("busy");
        assert_eq!(err.kind(), ErrorKind::Busy);

        conn.release();
        assert_eq!(manager.leased(), 0);
        assert_eq!(manager.releases(), 1);
        let (conn, _) = manager
            .open("/a.txt", AccessFlag::ReadOnly, false)
            .expect("reopen");
        conn.release();
    }

    #[test]
    fn dropped_connection_returns_its_slot() {
        let (_temp, manager) = manager(1);
        let (conn, _) = manager
            .open("/d.txt", AccessFlag::WriteOnly, true)
            .expect("open");
        drop(conn);
        assert_eq!(manager.leased(), 0);
        assert_eq!(manager.releases(), 1);

        let (conn, _) = manager
            .open("/d.txt", AccessFlag::ReadOnly, false)
            .expect("slot is free again");
        conn.release();
        assert_eq!(manager.leased(), 0);
        assert_eq!(manager.releases(), 2);
    }

    #[test]
    fn failed_open_returns_connection() {
        let (_temp, manager) = manager(2);
        let err = manager
            .open("/missing.txt", AccessFlag::ReadOnly, false)
            .expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.path(), Some("/missing.txt"));
        assert_eq!(manager.leased(), 0);
        assert_eq!(manager.releases(), 1);
    }

    #[test]
    fn connection_reads_writes_and_seeks() {
        let (_temp, manager) = manager(2);
        let (mut conn, desc) = manager
            .open("/b.bin", AccessFlag::ReadWrite, true)
            .expect("open");
        assert_eq!(conn.write_file(desc, b"hello world").expect("write"), 11);
        assert_eq!(conn.seek_file(desc, 6, Whence::Start).expect("seek"), 6);
        assert_eq!(conn.read_file(desc, Some(3)).expect("read"), b"wor");
        assert_eq!(conn.read_file(desc, None).expect("read all"), b"ld");
        assert!(conn.read_file(desc, Some(3)).expect("eof").is_empty());
        assert_eq!(conn.seek_file(desc, -5, Whence::End).expect("seek"), 6);
        let err = conn.seek_file(desc, -1, Whence::Start).expect_err("negative");
        assert_eq!(err.kind(), ErrorKind::Usage);
        conn.close_file(desc).expect("close");
        let err = conn.close_file(desc).expect_err("closed twice");
        assert_eq!(err.kind(), ErrorKind::Usage);
        conn.release();
    }

    #[test]
    fn reserved_and_invalid_paths_are_rejected() {
        let (_temp, manager) = manager(2);
        for path in ["/.rodsio/meta.json", "relative", "/a/../b"] {
            let err = manager
                .open(path, AccessFlag::ReadOnly, false)
                .expect_err("rejected");
            assert_eq!(err.kind(), ErrorKind::Usage, "path {path}");
        }
        assert_eq!(manager.leased(), 0);
    }

    #[test]
    fn exists_distinguishes_objects_from_absence() {
        let (temp, manager) = manager(2);
        std::fs::write(temp.path().join("e.txt"), b"e").expect("write");
        std::fs::create_dir(temp.path().join("sub")).expect("mkdir");
        assert!(manager.exists("/e.txt").expect("exists"));
        assert!(!manager.exists("/missing.txt").expect("absent"));
        assert!(!manager.exists("/sub").expect("collection"));
        let err = manager.exists("relative").expect_err("invalid");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn lookup_reports_size_and_checksum() {
        let (temp, manager) = manager(2);
        std::fs::write(temp.path().join("c.txt"), b"abc").expect("write");
        let row = manager.lookup("/c.txt").expect("lookup");
        assert_eq!(row.name, "c.txt");
        assert_eq!(row.size, 3);
        assert_eq!(
            row.checksum.as_deref(),
            Some("sha2:ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
    }
}
