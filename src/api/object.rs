//! Purpose: Addressable data objects and the collections that contain them.
//! Exports: `DataObject`, `DataObjectRow`, `Collection`.
//! Role: Turns a listing/lookup row into an entity that can open file handles.
//! Invariants: `path` is computed once at construction and never changes.
//! Invariants: The parent collection is held weakly; neither keeps the other alive.
//! Invariants: The metadata accessor is built on first use and cached for the entity's lifetime.
#![allow(clippy::result_large_err)]

use std::cell::OnceCell;
use std::fmt;
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::debug;

use super::meta::MetaCollection;
use crate::core::backend::{EntityKind, ObjectManager, Whence};
use crate::core::error::Error;
use crate::core::handle::RemoteFile;
use crate::core::mode::OpenMode;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Collection {
    path: String,
}

impl Collection {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or_default()
    }

    /// Logical path of a child entry named `name`.
    pub fn child_path(&self, name: &str) -> String {
        if self.path.ends_with('/') {
            format!("{}{name}", self.path)
        } else {
            format!("{}/{name}", self.path)
        }
    }
}

/// Attribute row as returned by a listing or lookup. Times are seconds since the epoch.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DataObjectRow {
    pub id: u64,
    pub name: String,
    pub size: u64,
    #[serde(default)]
    pub checksum: Option<String>,
    pub create_time: i64,
    pub modify_time: i64,
}

pub struct DataObject<M: ObjectManager> {
    manager: Arc<M>,
    collection: Weak<Collection>,
    row: DataObjectRow,
    path: String,
    meta: OnceCell<MetaCollection<M>>,
}

impl<M: ObjectManager> DataObject<M> {
    pub fn new(manager: Arc<M>, parent: &Arc<Collection>, row: DataObjectRow) -> Self {
        let path = parent.child_path(&row.name);
        Self {
            manager,
            collection: Arc::downgrade(parent),
            row,
            path,
            meta: OnceCell::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.row.id
    }

    pub fn name(&self) -> &str {
        &self.row.name
    }

    pub fn size(&self) -> u64 {
        self.row.size
    }

    pub fn checksum(&self) -> Option<&str> {
        self.row.checksum.as_deref()
    }

    pub fn create_time(&self) -> Option<OffsetDateTime> {
        OffsetDateTime::from_unix_timestamp(self.row.create_time).ok()
    }

    pub fn modify_time(&self) -> Option<OffsetDateTime> {
        OffsetDateTime::from_unix_timestamp(self.row.modify_time).ok()
    }

    pub fn row(&self) -> &DataObjectRow {
        &self.row
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The parent collection, if something else still holds it.
    pub fn collection(&self) -> Option<Arc<Collection>> {
        self.collection.upgrade()
    }

    pub fn metadata(&self) -> &MetaCollection<M> {
        self.meta.get_or_init(|| {
            MetaCollection::new(
                Arc::clone(&self.manager),
                EntityKind::DataObject,
                self.path.clone(),
            )
        })
    }

    /// Opens a handle with a textual mode (`r`, `r+`, `w`, `w+`, `a`, `a+`).
    pub fn open(&self, mode: &str) -> Result<RemoteFile<M::Connection>, Error> {
        self.open_with(OpenMode::resolve(mode)?)
    }

    pub fn open_with(&self, mode: OpenMode) -> Result<RemoteFile<M::Connection>, Error> {
        open_object(&*self.manager, &self.path, mode)
    }

    pub fn unlink(&self) -> Result<(), Error> {
        self.manager.unlink(&self.path)?;
        debug!(path = %self.path, "unlinked");
        Ok(())
    }
}

/// Opens `path` through `manager` without a looked-up entity, e.g. to create a new object.
/// Append modes position the handle at the end before it is returned.
pub fn open_object<M: ObjectManager>(
    manager: &M,
    path: &str,
    mode: OpenMode,
) -> Result<RemoteFile<M::Connection>, Error> {
    let (conn, desc) = manager.open(path, mode.access, mode.create_if_missing)?;
    debug!(path, desc = %desc, access = %mode.access, "opened");
    let mut file = RemoteFile::new(conn, desc, mode.access).with_path(path);
    if mode.append_to_end {
        file.seek(0, Whence::End)?;
    }
    Ok(file)
}

impl<M: ObjectManager> fmt::Display for DataObject<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<DataObject {} {}>", self.row.id, self.row.name)
    }
}

impl<M: ObjectManager> fmt::Debug for DataObject<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataObject")
            .field("path", &self.path)
            .field("row", &self.row)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::{Collection, DataObject, DataObjectRow};
    use crate::core::backend::{
        Avu, Connection, Descriptor, EntityKind, MetadataStore, ObjectManager, Whence,
    };
    use crate::core::error::{Error, ErrorKind};
    use crate::core::mode::AccessFlag;
    use std::cell::RefCell;
    use std::sync::Arc;

    #[derive(Default)]
    struct Recorder {
        opens: RefCell<Vec<(String, AccessFlag, bool)>>,
        unlinks: RefCell<Vec<String>>,
        meta_reads: RefCell<Vec<(EntityKind, String)>>,
        unlink_error: Option<ErrorKind>,
    }

    struct NullConnection {
        size: u64,
    }

    impl Connection for NullConnection {
        fn close_file(&mut self, _desc: Descriptor) -> Result<(), Error> {
            Ok(())
        }

        fn read_file(&mut self, _desc: Descriptor, _size: Option<usize>) -> Result<Vec<u8>, Error> {
            Ok(Vec::new())
        }

        fn write_file(&mut self, _desc: Descriptor, data: &[u8]) -> Result<usize, Error> {
            Ok(data.len())
        }

        fn seek_file(&mut self, _desc: Descriptor, offset: i64, whence: Whence) -> Result<u64, Error> {
            match whence {
                Whence::End => Ok((self.size as i64 + offset) as u64),
                _ => Ok(offset as u64),
            }
        }

        fn release(self) {}
    }

    impl MetadataStore for Recorder {
        fn get(&self, kind: EntityKind, path: &str) -> Result<Vec<Avu>, Error> {
            self.meta_reads.borrow_mut().push((kind, path.to_string()));
            Ok(vec![Avu::new("project", "alpha")])
        }

        fn add(&self, _kind: EntityKind, _path: &str, _avu: &Avu) -> Result<(), Error> {
            Ok(())
        }

        fn remove(&self, _kind: EntityKind, _path: &str, _avu: &Avu) -> Result<(), Error> {
            Ok(())
        }
    }

    impl ObjectManager for Recorder {
        type Connection = NullConnection;
        type Metadata = Recorder;

        fn open(
            &self,
            path: &str,
            access: AccessFlag,
            create_if_missing: bool,
        ) -> Result<(NullConnection, Descriptor), Error> {
            self.opens
                .borrow_mut()
                .push((path.to_string(), access, create_if_missing));
            Ok((NullConnection { size: 42 }, Descriptor(7)))
        }

        fn unlink(&self, path: &str) -> Result<(), Error> {
            if let Some(kind) = self.unlink_error {
                return Err(Error::new(kind).with_message("unlink refused"));
            }
            self.unlinks.borrow_mut().push(path.to_string());
            Ok(())
        }

        fn metadata(&self) -> &Recorder {
            self
        }
    }

    fn row() -> DataObjectRow {
        DataObjectRow {
            id: 10014,
            name: "results.csv".to_string(),
            size: 42,
            checksum: Some("sha2:abc".to_string()),
            create_time: 1_700_000_000,
            modify_time: 1_700_000_100,
        }
    }

    #[test]
    fn path_derives_from_parent() {
        let manager = Arc::new(Recorder::default());
        let parent = Arc::new(Collection::new("/tempZone/home/rods"));
        let obj = DataObject::new(manager, &parent, row());
        assert_eq!(obj.path(), "/tempZone/home/rods/results.csv");
        assert_eq!(obj.to_string(), "<DataObject 10014 results.csv>");
        assert_eq!(obj.checksum(), Some("sha2:abc"));
        assert_eq!(
            obj.modify_time().expect("time").unix_timestamp(),
            1_700_000_100
        );
    }

    #[test]
    fn parent_is_not_kept_alive() {
        let manager = Arc::new(Recorder::default());
        let parent = Arc::new(Collection::new("/"));
        let obj = DataObject::new(manager, &parent, row());
        assert_eq!(obj.path(), "/results.csv");
        assert!(obj.collection().is_some());
        drop(parent);
        assert!(obj.collection().is_none());
        assert_eq!(obj.path(), "/results.csv");
    }

    #[test]
    fn metadata_accessor_is_created_once() {
        let manager = Arc::new(Recorder::default());
        let parent = Arc::new(Collection::new("/z"));
        let obj = DataObject::new(Arc::clone(&manager), &parent, row());

        let first: *const _ = obj.metadata();
        let second: *const _ = obj.metadata();
        assert_eq!(first, second);
        assert_eq!(obj.metadata().path(), "/z/results.csv");

        let items = obj.metadata().items().expect("items");
        assert_eq!(items, vec![Avu::new("project", "alpha")]);
        assert_eq!(
            manager.meta_reads.borrow().as_slice(),
            &[(EntityKind::DataObject, "/z/results.csv".to_string())]
        );
    }

    #[test]
    fn open_passes_resolved_flags_and_seeks_for_append() {
        let manager = Arc::new(Recorder::default());
        let parent = Arc::new(Collection::new("/z"));
        let obj = DataObject::new(Arc::clone(&manager), &parent, row());

        let file = obj.open("r").expect("open r");
        assert_eq!(file.tell(), 0);
        assert_eq!(file.fileno(), Descriptor(7));
        assert_eq!(file.path(), Some("/z/results.csv"));

        let file = obj.open("a+").expect("open a+");
        assert_eq!(file.tell(), 42);
        assert_eq!(file.access(), AccessFlag::ReadWrite);

        assert_eq!(
            manager.opens.borrow().as_slice(),
            &[
                ("/z/results.csv".to_string(), AccessFlag::ReadOnly, false),
                ("/z/results.csv".to_string(), AccessFlag::ReadWrite, true),
            ]
        );
    }

    #[test]
    fn unsupported_mode_makes_no_remote_call() {
        let manager = Arc::new(Recorder::default());
        let parent = Arc::new(Collection::new("/z"));
        let obj = DataObject::new(Arc::clone(&manager), &parent, row());

        let err = obj.open("rw").expect_err("unsupported");
        assert_eq!(err.kind(), ErrorKind::UnsupportedMode);
        assert!(manager.opens.borrow().is_empty());
    }

    #[test]
    fn unlink_forwards_path_and_errors() {
        let manager = Arc::new(Recorder::default());
        let parent = Arc::new(Collection::new("/z"));
        let obj = DataObject::new(Arc::clone(&manager), &parent, row());
        obj.unlink().expect("unlink");
        assert_eq!(manager.unlinks.borrow().as_slice(), &["/z/results.csv".to_string()]);

        let manager = Arc::new(Recorder {
            unlink_error: Some(ErrorKind::PermissionDenied),
            ..Recorder::default()
        });
        let obj = DataObject::new(manager, &parent, row());
        let err = obj.unlink().expect_err("denied");
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        assert_eq!(err.message(), Some("unlink refused"));
    }

    #[test]
    fn row_deserializes_from_listing_record() {
        let record = serde_json::json!({
            "id": 5,
            "name": "a.txt",
            "size": 3,
            "create_time": 10,
            "modify_time": 20
        });
        let row: DataObjectRow = serde_json::from_value(record).expect("row");
        assert_eq!(row.checksum, None);
        assert_eq!(row.name, "a.txt");
    }
}
