//! Record persistence used by the generic CRUD commands.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use forgecmd_core::{AttributeMap, ExpectedVersion, Record, RecordId};

use crate::transaction::{TransactionError, TransactionManager};

/// A persisted record of some resource type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: RecordId,
    pub resource: String,
    /// Starts at 1 and increases by one on every update.
    pub version: u64,
    pub fields: AttributeMap,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredRecord {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

impl Record for StoredRecord {
    fn record_id(&self) -> RecordId {
        self.id
    }

    /// Field values plus `lock_version`.
    fn fields(&self) -> AttributeMap {
        let mut fields = self.fields.clone();
        fields.insert("lock_version".into(), Value::from(self.version));
        fields
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordStoreError {
    #[error("{resource} {id} not found")]
    NotFound { resource: String, id: RecordId },

    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    /// The store refused the write (constraint violation and the like).
    #[error("{field} {message}")]
    Rejected { field: String, message: String },

    #[error("storage error: {0}")]
    Storage(String),
}

impl<T> From<PoisonError<T>> for RecordStoreError {
    fn from(_: PoisonError<T>) -> Self {
        RecordStoreError::Storage("record store lock poisoned".to_string())
    }
}

/// Lookup-by-id and mutate/delete operations on records, per resource.
pub trait RecordStore: Send + Sync {
    fn find(&self, resource: &str, id: RecordId) -> Result<Option<StoredRecord>, RecordStoreError>;

    fn insert(&self, resource: &str, fields: AttributeMap) -> Result<StoredRecord, RecordStoreError>;

    /// Merge `changes` into the record's fields when `expected` holds.
    fn update(
        &self,
        resource: &str,
        id: RecordId,
        changes: AttributeMap,
        expected: ExpectedVersion,
    ) -> Result<StoredRecord, RecordStoreError>;

    fn delete(&self, resource: &str, id: RecordId) -> Result<StoredRecord, RecordStoreError>;

    fn list(&self, resource: &str) -> Result<Vec<StoredRecord>, RecordStoreError>;
}

impl<S: RecordStore + ?Sized> RecordStore for Arc<S> {
    fn find(&self, resource: &str, id: RecordId) -> Result<Option<StoredRecord>, RecordStoreError> {
        (**self).find(resource, id)
    }

    fn insert(&self, resource: &str, fields: AttributeMap) -> Result<StoredRecord, RecordStoreError> {
        (**self).insert(resource, fields)
    }

    fn update(
        &self,
        resource: &str,
        id: RecordId,
        changes: AttributeMap,
        expected: ExpectedVersion,
    ) -> Result<StoredRecord, RecordStoreError> {
        (**self).update(resource, id, changes, expected)
    }

    fn delete(&self, resource: &str, id: RecordId) -> Result<StoredRecord, RecordStoreError> {
        (**self).delete(resource, id)
    }

    fn list(&self, resource: &str) -> Result<Vec<StoredRecord>, RecordStoreError> {
        (**self).list(resource)
    }
}

type Tables = HashMap<String, BTreeMap<RecordId, StoredRecord>>;

/// In-memory record store for tests/dev.
///
/// Also its own [`TransactionManager`]: `begin` snapshots every table,
/// `rollback` restores the latest snapshot and `commit` discards it, so
/// transactions nest. There is one transaction stack per store, shared by
/// every caller.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    tables: RwLock<Tables>,
    snapshots: Mutex<Vec<Tables>>,
    unique: Vec<(String, String)>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Reject inserts and updates that would duplicate `field` within `resource`.
    pub fn with_unique(mut self, resource: impl Into<String>, field: impl Into<String>) -> Self {
        self.unique.push((resource.into(), field.into()));
        self
    }

    /// Open transactions.
    pub fn depth(&self) -> usize {
        self.snapshots.lock().map(|s| s.len()).unwrap_or_default()
    }

    fn check_unique(
        &self,
        resource: &str,
        table: &BTreeMap<RecordId, StoredRecord>,
        except: Option<RecordId>,
        fields: &AttributeMap,
    ) -> Result<(), RecordStoreError> {
        for (_, field) in self.unique.iter().filter(|(r, _)| r == resource) {
            let Some(value) = fields.get(field).filter(|v| !v.is_null()) else {
                continue;
            };
            let taken = table
                .values()
                .any(|r| Some(r.id) != except && r.fields.get(field) == Some(value));
            if taken {
                return Err(RecordStoreError::Rejected {
                    field: field.clone(),
                    message: "has already been taken".to_string(),
                });
            }
        }
        Ok(())
    }
}

fn not_found(resource: &str, id: RecordId) -> RecordStoreError {
    RecordStoreError::NotFound {
        resource: resource.to_string(),
        id,
    }
}

impl RecordStore for InMemoryRecordStore {
    fn find(&self, resource: &str, id: RecordId) -> Result<Option<StoredRecord>, RecordStoreError> {
        let tables = self.tables.read()?;
        Ok(tables.get(resource).and_then(|t| t.get(&id)).cloned())
    }

    fn insert(&self, resource: &str, fields: AttributeMap) -> Result<StoredRecord, RecordStoreError> {
        let mut tables = self.tables.write()?;
        let table = tables.entry(resource.to_string()).or_default();
        self.check_unique(resource, table, None, &fields)?;

        let now = Utc::now();
        let record = StoredRecord {
            id: RecordId::new(),
            resource: resource.to_string(),
            version: 1,
            fields,
            created_at: now,
            updated_at: now,
        };
        table.insert(record.id, record.clone());
        Ok(record)
    }

    fn update(
        &self,
        resource: &str,
        id: RecordId,
        changes: AttributeMap,
        expected: ExpectedVersion,
    ) -> Result<StoredRecord, RecordStoreError> {
        let mut tables = self.tables.write()?;
        let table = tables.get_mut(resource).ok_or_else(|| not_found(resource, id))?;

        let current = table.get(&id).ok_or_else(|| not_found(resource, id))?;
        if expected.is_stale(current.version) {
            return Err(RecordStoreError::Concurrency(format!(
                "expected {expected:?}, found {}",
                current.version
            )));
        }

        let mut merged = current.fields.clone();
        merged.extend(changes);
        self.check_unique(resource, table, Some(id), &merged)?;

        let record = table.get_mut(&id).ok_or_else(|| not_found(resource, id))?;
        record.fields = merged;
        record.version += 1;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    fn delete(&self, resource: &str, id: RecordId) -> Result<StoredRecord, RecordStoreError> {
        let mut tables = self.tables.write()?;
        tables
            .get_mut(resource)
            .and_then(|t| t.remove(&id))
            .ok_or_else(|| not_found(resource, id))
    }

    fn list(&self, resource: &str) -> Result<Vec<StoredRecord>, RecordStoreError> {
        let tables = self.tables.read()?;
        let mut records: Vec<_> = tables
            .get(resource)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }
}

fn storage(_: impl std::fmt::Debug) -> TransactionError {
    TransactionError::Storage("record store lock poisoned".to_string())
}

impl TransactionManager for InMemoryRecordStore {
    fn begin(&self) -> Result<(), TransactionError> {
        let snapshot = self.tables.read().map_err(storage)?.clone();
        self.snapshots.lock().map_err(storage)?.push(snapshot);
        Ok(())
    }

    fn commit(&self) -> Result<(), TransactionError> {
        self.snapshots
            .lock()
            .map_err(storage)?
            .pop()
            .map(|_| ())
            .ok_or(TransactionError::NotActive)
    }

    fn rollback(&self) -> Result<(), TransactionError> {
        let snapshot = self
            .snapshots
            .lock()
            .map_err(storage)?
            .pop()
            .ok_or(TransactionError::NotActive)?;
        *self.tables.write().map_err(storage)? = snapshot;
        Ok(())
    }
}
