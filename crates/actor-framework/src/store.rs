//! # Entity Stores
//!
//! A `ResourceActor` keeps its working set in a `HashMap` and writes every
//! mutation through an [`EntityStore`]. The store is the durable copy; the map
//! is rebuilt from [`EntityStore::load`] when the actor starts.
//!
//! - [`MemoryStore`] persists nothing. Used by tests and by components that are
//!   allowed to lose their state on restart.
//! - [`RedbStore`] keeps one redb table per entity type, values encoded as JSON,
//!   plus the id counter so generated ids are never reused after a restart.

use crate::entity::ActorEntity;
use crate::error::StoreError;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

/// Everything an actor needs to resume: the stored entities and the next id to hand out.
#[derive(Debug)]
pub struct Snapshot<T: ActorEntity> {
    pub entities: Vec<(T::Id, T)>,
    pub next_id: u32,
}

/// Durable backing for a `ResourceActor`.
///
/// Calls are synchronous: they run inside the actor task, which is the single
/// writer for its table.
pub trait EntityStore<T: ActorEntity>: Send + 'static {
    /// Read every stored entity and the persisted id counter.
    fn load(&self) -> Result<Snapshot<T>, StoreError>;

    /// Insert or replace one entity, recording the counter alongside it.
    fn put(&self, id: &T::Id, entity: &T, next_id: u32) -> Result<(), StoreError>;

    /// Remove one entity. Removing a missing id is not an error.
    fn remove(&self, id: &T::Id) -> Result<(), StoreError>;
}

/// Store that keeps nothing beyond the actor's own map.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryStore;

impl<T: ActorEntity> EntityStore<T> for MemoryStore {
    fn load(&self) -> Result<Snapshot<T>, StoreError> {
        Ok(Snapshot {
            entities: Vec::new(),
            next_id: 1,
        })
    }

    fn put(&self, _id: &T::Id, _entity: &T, _next_id: u32) -> Result<(), StoreError> {
        Ok(())
    }

    fn remove(&self, _id: &T::Id) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Counter table shared by every `RedbStore` in a database: key = entity table name.
const COUNTERS_TABLE: TableDefinition<&str, u32> = TableDefinition::new("id_counters");

#[derive(Serialize)]
struct StoredEntityRef<'a, I, E> {
    id: &'a I,
    entity: &'a E,
}

#[derive(Deserialize)]
struct StoredEntity<I, E> {
    id: I,
    entity: E,
}

/// redb-backed store: key = `id.to_string()`, value = JSON `{id, entity}`.
pub struct RedbStore<T> {
    db: Arc<Database>,
    table: &'static str,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for RedbStore<T> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            table: self.table,
            _entity: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for RedbStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore")
            .field("table", &self.table)
            .finish()
    }
}

impl<T> RedbStore<T> {
    /// Open or create the database file and declare the entity table.
    pub fn open(path: impl AsRef<Path>, table: &'static str) -> Result<Self, StoreError> {
        let db = Database::create(path)?;
        Self::with_database(Arc::new(db), table)
    }

    /// Open a database that lives only in memory (for testing).
    pub fn open_in_memory(table: &'static str) -> Result<Self, StoreError> {
        let db = Database::builder()
            .create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::with_database(Arc::new(db), table)
    }

    /// Share an already opened database; several entity tables can live in one file.
    pub fn with_database(db: Arc<Database>, table: &'static str) -> Result<Self, StoreError> {
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(Self::definition(table))?;
            let _ = write_txn.open_table(COUNTERS_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self {
            db,
            table,
            _entity: PhantomData,
        })
    }

    /// The underlying database handle.
    pub fn database(&self) -> Arc<Database> {
        self.db.clone()
    }

    fn definition(table: &'static str) -> TableDefinition<'static, &'static str, &'static [u8]> {
        TableDefinition::new(table)
    }
}

impl<T> EntityStore<T> for RedbStore<T>
where
    T: ActorEntity + Serialize + DeserializeOwned,
    T::Id: Serialize + DeserializeOwned,
{
    fn load(&self) -> Result<Snapshot<T>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(Self::definition(self.table))?;

        let mut entities = Vec::new();
        for row in table.iter()? {
            let (_, value) = row?;
            let stored: StoredEntity<T::Id, T> = serde_json::from_slice(value.value())?;
            entities.push((stored.id, stored.entity));
        }

        let counters = read_txn.open_table(COUNTERS_TABLE)?;
        let next_id = counters
            .get(self.table)?
            .map(|guard| guard.value())
            .unwrap_or(1);

        Ok(Snapshot { entities, next_id })
    }

    fn put(&self, id: &T::Id, entity: &T, next_id: u32) -> Result<(), StoreError> {
        let value = serde_json::to_vec(&StoredEntityRef { id, entity })?;
        let key = id.to_string();

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(Self::definition(self.table))?;
            table.insert(key.as_str(), value.as_slice())?;
            let mut counters = write_txn.open_table(COUNTERS_TABLE)?;
            counters.insert(self.table, next_id)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn remove(&self, id: &T::Id) -> Result<(), StoreError> {
        let key = id.to_string();
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(Self::definition(self.table))?;
            table.remove(key.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }
}
