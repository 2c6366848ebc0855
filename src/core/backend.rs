//! Purpose: Collaborator contracts for the storage backend this crate sits on.
//! Exports: `Connection`, `ObjectManager`, `MetadataStore`, `Descriptor`, `Whence`,
//! `EntityKind`, `Avu`.
//! Role: Seam between file-like handles and whatever moves bytes to the server.
//! Invariants: A `Descriptor` is meaningful only together with the connection that issued it.
//! Invariants: `Connection::release` consumes the connection; a released connection is gone.
//! Invariants: Every method blocks until the backend answers; there are no timeouts here.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::error::{Error, ErrorKind};
use crate::core::mode::AccessFlag;

/// Server-issued identifier of an open remote stream.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Descriptor(pub i32);

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Whence {
    Start,
    Current,
    End,
}

impl Whence {
    pub fn as_raw(self) -> i32 {
        match self {
            Whence::Start => 0,
            Whence::Current => 1,
            Whence::End => 2,
        }
    }
}

impl TryFrom<i32> for Whence {
    type Error = Error;

    fn try_from(raw: i32) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Whence::Start),
            1 => Ok(Whence::Current),
            2 => Ok(Whence::End),
            other => Err(Error::new(ErrorKind::Usage)
                .with_message(format!("invalid seek whence {other}"))),
        }
    }
}

/// A pooled channel to the backend, lent out by an [`ObjectManager`].
pub trait Connection {
    fn close_file(&mut self, desc: Descriptor) -> Result<(), Error>;

    /// Reads up to `size` bytes, or everything remaining when `size` is `None`.
    /// An empty result means end of stream.
    fn read_file(&mut self, desc: Descriptor, size: Option<usize>) -> Result<Vec<u8>, Error>;

    /// Returns the number of bytes the server accepted, which may be short.
    fn write_file(&mut self, desc: Descriptor, data: &[u8]) -> Result<usize, Error>;

    /// Returns the new absolute offset.
    fn seek_file(&mut self, desc: Descriptor, offset: i64, whence: Whence) -> Result<u64, Error>;

    /// Hands the connection back to its pool.
    fn release(self);
}

pub trait ObjectManager {
    type Connection: Connection;
    type Metadata: MetadataStore;

    fn open(
        &self,
        path: &str,
        access: AccessFlag,
        create_if_missing: bool,
    ) -> Result<(Self::Connection, Descriptor), Error>;

    fn unlink(&self, path: &str) -> Result<(), Error>;

    fn metadata(&self) -> &Self::Metadata;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    DataObject,
    Collection,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::DataObject => "data_object",
            EntityKind::Collection => "collection",
        }
    }
}

/// Attribute-value-units triple attached to a catalog entity.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Avu {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
}

impl Avu {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            units: None,
        }
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }
}

pub trait MetadataStore {
    fn get(&self, kind: EntityKind, path: &str) -> Result<Vec<Avu>, Error>;
    fn add(&self, kind: EntityKind, path: &str, avu: &Avu) -> Result<(), Error>;
    fn remove(&self, kind: EntityKind, path: &str, avu: &Avu) -> Result<(), Error>;
}
