//! Translation of synchronization operations into store batches
//!
//! The host framework delivers changes as an ordered slice of operations.
//! `translate` maps each one to a `BatchUnit`, one to one and in order;
//! `submit` hands the result to the store facade as a single batch.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::{BatchResult, StoreError, StoreFacade};
use crate::types::Document;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Operation {index} on '{type_name}' carries no document payload")]
    MissingPayload { index: usize, type_name: String },

    #[error("Store rejected batch: {0}")]
    Store(#[from] StoreError),
}

/// What a synchronization operation does to its document
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Create,
    Update,
    PartialUpdate,
    Delete,
    DeleteById,
    Change,
}

impl OperationKind {
    pub fn is_removal(&self) -> bool {
        matches!(self, OperationKind::Delete | OperationKind::DeleteById)
    }
}

/// One change event as delivered by the host framework
pub trait SyncOperation {
    fn kind(&self) -> OperationKind;

    /// Type name of the entity the operation applies to.
    fn type_name(&self) -> &str;

    /// The operation's data as a document, if it can be represented as one.
    fn data_as_document(&self) -> Option<Document>;
}

/// A plain synchronization operation
#[derive(Clone, Debug, PartialEq)]
pub struct DataSyncOperation {
    pub kind: OperationKind,
    pub type_name: String,
    pub document: Option<Document>,
}

impl DataSyncOperation {
    pub fn new(kind: OperationKind, type_name: impl Into<String>, document: Document) -> Self {
        Self {
            kind,
            type_name: type_name.into(),
            document: Some(document),
        }
    }

    pub fn create(type_name: impl Into<String>, document: Document) -> Self {
        Self::new(OperationKind::Create, type_name, document)
    }

    pub fn update(type_name: impl Into<String>, document: Document) -> Self {
        Self::new(OperationKind::Update, type_name, document)
    }

    pub fn delete(type_name: impl Into<String>, document: Document) -> Self {
        Self::new(OperationKind::Delete, type_name, document)
    }
}

impl SyncOperation for DataSyncOperation {
    fn kind(&self) -> OperationKind {
        self.kind
    }

    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn data_as_document(&self) -> Option<Document> {
        self.document.clone()
    }
}

/// Store-ready form of one synchronization operation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchUnit {
    pub type_name: String,
    pub kind: OperationKind,
    pub document: Document,
}

impl BatchUnit {
    pub fn new(type_name: impl Into<String>, kind: OperationKind, document: Document) -> Self {
        Self {
            type_name: type_name.into(),
            kind,
            document,
        }
    }
}

/// Map every operation to a batch unit, preserving order and count.
pub fn translate<O: SyncOperation>(operations: &[O]) -> Result<Vec<BatchUnit>, BatchError> {
    operations
        .iter()
        .enumerate()
        .map(|(index, op)| {
            let document = op.data_as_document().ok_or_else(|| BatchError::MissingPayload {
                index,
                type_name: op.type_name().to_string(),
            })?;
            Ok(BatchUnit::new(op.type_name(), op.kind(), document))
        })
        .collect()
}

/// Translate `operations` and apply them as one batch.
pub fn submit<O: SyncOperation>(
    store: &dyn StoreFacade,
    operations: &[O],
) -> Result<BatchResult, BatchError> {
    let units = translate(operations)?;
    if units.is_empty() {
        return Ok(BatchResult::new(0));
    }

    let count = units.len();
    let result = store.perform_batch(units)?;
    log::debug!("batch {} applied {} of {} units", result.batch_id, result.applied, count);
    Ok(result)
}
