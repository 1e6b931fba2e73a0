//! Store access facade
//!
//! The catalog never talks to a document store directly. It goes through
//! `StoreFacade`, which hands out named collections, keeps the
//! source-of-record cache of type descriptors and applies translated
//! batches. Two implementations ship with the crate: `MemoryStore` and
//! the directory-backed `FileStore`.

pub mod file;
pub mod memory;
mod type_cache;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use type_cache::TypeCache;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::batch::{BatchUnit, OperationKind};
use crate::types::{Document, TypeDescriptor};

/// Error types for store operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Document in '{0}' has no key")]
    MissingKey(String),

    #[error("Index conflict: {0}")]
    IndexConflict(String),

    #[error("Batch element {index} failed: {reason}")]
    Batch { index: usize, reason: String },

    #[error("Store is closed")]
    Closed,
}

/// Acknowledgment required before a write returns
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Durability {
    /// Fire the write without waiting for the store
    Unacknowledged,
    /// Wait until the store has accepted the write
    #[default]
    Acknowledged,
    /// Wait until the write has been flushed to stable storage
    Journaled,
}

impl Durability {
    pub fn is_acknowledged(&self) -> bool {
        !matches!(self, Durability::Unacknowledged)
    }
}

/// Outcome of a single document save
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteResult {
    pub key: String,
    /// True when no document existed under `key` before the write.
    pub inserted: bool,
    pub durability: Durability,
}

/// Outcome of a submitted batch
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchResult {
    pub batch_id: Uuid,
    pub applied: usize,
}

impl BatchResult {
    pub fn new(applied: usize) -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            applied,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexOrder {
    Ascending,
    Hashed,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexKey {
    pub path: String,
    pub order: IndexOrder,
}

/// A physical index on a collection
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    pub keys: Vec<IndexKey>,
    pub unique: bool,
}

/// Documents returned by `CollectionHandle::find`.
pub type Cursor = Box<dyn Iterator<Item = Result<Document, StoreError>> + Send>;

/// A named collection of documents keyed by `_id`
pub trait CollectionHandle: Send + Sync {
    fn name(&self) -> &str;

    /// Insert or replace the document stored under its `_id`.
    fn save(&self, document: Document, durability: Durability) -> Result<WriteResult, StoreError>;

    /// Iterate over every document in the collection.
    fn find(&self) -> Result<Cursor, StoreError>;

    fn find_one(&self, key: &str) -> Result<Option<Document>, StoreError>;

    /// Create `spec` unless an identical index exists. Returns whether it was created.
    fn ensure_index(&self, spec: &IndexSpec) -> Result<bool, StoreError>;

    fn indexes(&self) -> Result<Vec<IndexSpec>, StoreError>;
}

/// Everything the catalog needs from the document store
pub trait StoreFacade: Send + Sync {
    fn collection(&self, name: &str) -> Result<Arc<dyn CollectionHandle>, StoreError>;

    /// Record `descriptor` in the facade's type cache, replacing any entry with the same name.
    fn cache_type_descriptor(&self, descriptor: TypeDescriptor);

    fn type_descriptor(&self, type_name: &str) -> Option<TypeDescriptor>;

    fn types(&self) -> Vec<TypeDescriptor>;

    /// Apply `units` in order as one batch.
    fn perform_batch(&self, units: Vec<BatchUnit>) -> Result<BatchResult, StoreError>;

    /// Release resources. Idempotent.
    fn close(&self) -> Result<(), StoreError>;
}

/// One batch unit resolved to a collection and key
#[derive(Debug)]
pub(crate) struct PlannedWrite<'a> {
    pub collection: &'a str,
    pub key: String,
    pub kind: OperationKind,
    pub document: &'a Document,
}

/// Resolve every unit's key up front so a bad unit fails the batch before anything is applied.
pub(crate) fn plan_batch<'a>(
    units: &'a [BatchUnit],
    types: &TypeCache,
) -> Result<Vec<PlannedWrite<'a>>, StoreError> {
    units
        .iter()
        .enumerate()
        .map(|(index, unit)| {
            let key_field = types.key_field(&unit.type_name);
            let key = unit.document.key(&key_field).ok_or_else(|| StoreError::Batch {
                index,
                reason: format!("{} document has no '{}' key", unit.type_name, key_field),
            })?;
            Ok(PlannedWrite {
                collection: &unit.type_name,
                key,
                kind: unit.kind,
                document: &unit.document,
            })
        })
        .collect()
}

/// The document left under the key after applying `write`, or `None` if it is removed.
pub(crate) fn apply_write(existing: Option<Document>, write: &PlannedWrite<'_>) -> Option<Document> {
    match write.kind {
        OperationKind::Create | OperationKind::Update => Some(write.document.clone()),
        OperationKind::PartialUpdate | OperationKind::Change => {
            let mut merged = existing.unwrap_or_default();
            merged.merge(write.document);
            Some(merged)
        }
        OperationKind::Delete | OperationKind::DeleteById => None,
    }
}
