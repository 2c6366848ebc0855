//! Purpose: Define the public Rust API boundary for rodsio.
//! Exports: Data objects, remote file handles, read sequences, backend contracts, errors.
//! Role: Public, additive-only surface used by the CLI and embedders.
//! Invariants: This module is the only public path to handle and entity types.
//! Invariants: Backend implementations plug in through `ObjectManager` and `Connection`.

mod local;
mod meta;
mod object;

pub use crate::core::backend::{
    Avu, Connection, Descriptor, EntityKind, MetadataStore, ObjectManager, Whence,
};
pub use crate::core::chunks::{DEFAULT_CHUNK_SIZE, ReadChunks};
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::handle::RemoteFile;
pub use crate::core::lines::Lines;
pub use crate::core::mode::{AccessFlag, OpenMode};
pub use local::{LocalConfig, LocalConnection, LocalManager, LocalMetadataStore};
pub use meta::MetaCollection;
pub use object::{Collection, DataObject, DataObjectRow, open_object};
