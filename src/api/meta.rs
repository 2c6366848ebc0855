// Key-value metadata accessor bound to one catalog entity.
#![allow(clippy::result_large_err)]

use std::sync::Arc;

use crate::core::backend::{Avu, EntityKind, MetadataStore, ObjectManager};
use crate::core::error::{Error, ErrorKind};

pub struct MetaCollection<M: ObjectManager> {
    manager: Arc<M>,
    kind: EntityKind,
    path: String,
}

impl<M: ObjectManager> MetaCollection<M> {
    pub fn new(manager: Arc<M>, kind: EntityKind, path: impl Into<String>) -> Self {
        Self {
            manager,
            kind,
            path: path.into(),
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn items(&self) -> Result<Vec<Avu>, Error> {
        self.manager.metadata().get(self.kind, &self.path)
    }

    /// All AVUs whose attribute name is `name`; `NotFound` when there are none.
    pub fn get(&self, name: &str) -> Result<Vec<Avu>, Error> {
        let matches: Vec<Avu> = self
            .items()?
            .into_iter()
            .filter(|avu| avu.name == name)
            .collect();
        if matches.is_empty() {
            return Err(Error::new(ErrorKind::NotFound)
                .with_message(format!("no metadata attribute {name:?}"))
                .with_path(self.path.clone()));
        }
        Ok(matches)
    }

    pub fn add(&self, avu: &Avu) -> Result<(), Error> {
        self.manager.metadata().add(self.kind, &self.path, avu)
    }

    pub fn remove(&self, avu: &Avu) -> Result<(), Error> {
        self.manager.metadata().remove(self.kind, &self.path, avu)
    }
}
