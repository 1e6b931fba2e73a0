//! In-process store facade
//!
//! Keeps every collection in memory behind `RwLock`s. Share one instance
//! through `Arc` to let several catalogs observe the same data.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use super::{
    apply_write, plan_batch, BatchResult, CollectionHandle, Cursor, Durability, IndexSpec,
    StoreError, StoreFacade, TypeCache, WriteResult,
};
use crate::batch::BatchUnit;
use crate::types::{Document, TypeDescriptor, ID_FIELD};

pub struct MemoryCollection {
    name: String,
    documents: RwLock<BTreeMap<String, Document>>,
    indexes: RwLock<Vec<IndexSpec>>,
    closed: Arc<AtomicBool>,
}

impl MemoryCollection {
    fn new(name: &str, closed: Arc<AtomicBool>) -> Self {
        Self {
            name: name.to_string(),
            documents: RwLock::new(BTreeMap::new()),
            indexes: RwLock::new(Vec::new()),
            closed,
        }
    }

    fn check_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.documents.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CollectionHandle for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn save(&self, document: Document, durability: Durability) -> Result<WriteResult, StoreError> {
        self.check_open()?;
        let key = document
            .key(ID_FIELD)
            .ok_or_else(|| StoreError::MissingKey(self.name.clone()))?;

        let previous = self
            .documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), document);

        Ok(WriteResult {
            key,
            inserted: previous.is_none(),
            durability,
        })
    }

    fn find(&self) -> Result<Cursor, StoreError> {
        self.check_open()?;
        let snapshot: Vec<Document> = self
            .documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        Ok(Box::new(snapshot.into_iter().map(Ok)))
    }

    fn find_one(&self, key: &str) -> Result<Option<Document>, StoreError> {
        self.check_open()?;
        Ok(self
            .documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn ensure_index(&self, spec: &IndexSpec) -> Result<bool, StoreError> {
        self.check_open()?;
        let mut indexes = self.indexes.write().unwrap_or_else(PoisonError::into_inner);
        match indexes.iter().find(|i| i.name == spec.name) {
            Some(existing) if existing == spec => Ok(false),
            Some(existing) => Err(StoreError::IndexConflict(format!(
                "{} on '{}' already defined as {:?}",
                spec.name, self.name, existing.keys
            ))),
            None => {
                indexes.push(spec.clone());
                Ok(true)
            }
        }
    }

    fn indexes(&self) -> Result<Vec<IndexSpec>, StoreError> {
        self.check_open()?;
        Ok(self.indexes.read().unwrap_or_else(PoisonError::into_inner).clone())
    }
}

/// Store facade holding everything in memory
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Arc<MemoryCollection>>>,
    types: TypeCache,
    closed: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Concrete handle to a collection, created on first use.
    pub fn memory_collection(&self, name: &str) -> Result<Arc<MemoryCollection>, StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        if let Some(collection) = self
            .collections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return Ok(Arc::clone(collection));
        }

        let mut collections = self.collections.write().unwrap_or_else(PoisonError::into_inner);
        let collection = collections
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryCollection::new(name, Arc::clone(&self.closed))));
        Ok(Arc::clone(collection))
    }

    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .collections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl StoreFacade for MemoryStore {
    fn collection(&self, name: &str) -> Result<Arc<dyn CollectionHandle>, StoreError> {
        let collection: Arc<dyn CollectionHandle> = self.memory_collection(name)?;
        Ok(collection)
    }

    fn cache_type_descriptor(&self, descriptor: TypeDescriptor) {
        self.types.insert(descriptor);
    }

    fn type_descriptor(&self, type_name: &str) -> Option<TypeDescriptor> {
        self.types.get(type_name)
    }

    fn types(&self) -> Vec<TypeDescriptor> {
        self.types.all()
    }

    fn perform_batch(&self, units: Vec<BatchUnit>) -> Result<BatchResult, StoreError> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        let planned = plan_batch(&units, &self.types)?;

        // Resolve every target collection before touching any document.
        let mut targets = BTreeMap::new();
        for write in &planned {
            if !targets.contains_key(write.collection) {
                targets.insert(write.collection, self.memory_collection(write.collection)?);
            }
        }

        // Lock every target for the whole batch, in name order so concurrent
        // batches cannot deadlock. Readers see all of a batch or none of it.
        let mut locked: BTreeMap<&str, RwLockWriteGuard<'_, BTreeMap<String, Document>>> = targets
            .iter()
            .map(|(name, collection)| {
                (*name, collection.documents.write().unwrap_or_else(PoisonError::into_inner))
            })
            .collect();

        for (index, write) in planned.iter().enumerate() {
            let documents = locked
                .get_mut(write.collection)
                .ok_or_else(|| StoreError::Batch {
                    index,
                    reason: format!("collection '{}' is not locked", write.collection),
                })?;
            if let Some(document) = apply_write(documents.remove(&write.key), write) {
                documents.insert(write.key.clone(), document);
            }
        }

        Ok(BatchResult::new(planned.len()))
    }

    fn close(&self) -> Result<(), StoreError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
