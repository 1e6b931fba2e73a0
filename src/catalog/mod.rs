//! Metadata catalog
//!
//! Persists grid type descriptors as metadata records, derives store
//! indexes for them and keeps an in-memory view of every known type.
//!
//! # Caching
//!
//! Two layers hold descriptors. The store facade's type cache is the
//! source-of-record cache used by the store itself (e.g. to find id
//! properties when applying batches). The catalog's map is a read view
//! for callers. Both are written only by `publish`, which runs after a
//! descriptor has been persisted or loaded and its indexes requested.

mod config;

pub use config::CatalogConfig;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;

use crate::batch::{self, BatchError, SyncOperation};
use crate::codec::{CodecError, MetadataRecord, TypeDescriptorCodec, TypeResolver};
use crate::index::{IndexBuilder, IndexDeriver, IndexError};
use crate::store::{BatchResult, Durability, StoreError, StoreFacade, WriteResult};
use crate::types::{AddIndexRequest, TypeDescriptor, TypeIntroduction};

/// Durability that waits for the store to acknowledge the write.
pub const SAFE_WRITE: Durability = Durability::Acknowledged;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Class resolution error: {0}")]
    ClassResolution(String),

    #[error("Write error: {0}")]
    Write(#[source] StoreError),

    #[error("Read error: {0}")]
    Read(#[source] StoreError),

    #[error("Store error: {0}")]
    Store(#[source] StoreError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Batch error: {0}")]
    Batch(#[from] BatchError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Catalog is closed")]
    Closed,
}

impl From<CodecError> for CatalogError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::Encode(msg) => CatalogError::Encode(msg),
            CodecError::Decode(msg) => CatalogError::Decode(msg),
            CodecError::UnsupportedVersion(_) => CatalogError::Decode(e.to_string()),
            CodecError::ClassResolution(msg) => CatalogError::ClassResolution(msg),
        }
    }
}

/// Lifecycle of a catalog
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CatalogState {
    /// `load_metadata` has not succeeded yet
    Uninitialized,
    Loaded,
}

pub struct MetadataCatalog {
    store: Arc<dyn StoreFacade>,
    deriver: Arc<dyn IndexDeriver>,
    codec: TypeDescriptorCodec,
    config: CatalogConfig,
    types: RwLock<HashMap<String, Arc<TypeDescriptor>>>,
    loaded: AtomicBool,
    closed: AtomicBool,
}

impl MetadataCatalog {
    /// Create a catalog over `store`, deriving indexes with an `IndexBuilder`.
    ///
    /// Metadata writes are always acknowledged: an unacknowledged durability
    /// in `config` is raised to `SAFE_WRITE`.
    pub fn new(store: Arc<dyn StoreFacade>, mut config: CatalogConfig) -> Self {
        if !config.durability.is_acknowledged() {
            log::warn!(
                "metadata writes to '{}' must be acknowledged; using {:?}",
                config.collection_name,
                SAFE_WRITE
            );
            config.durability = SAFE_WRITE;
        }
        let deriver: Arc<dyn IndexDeriver> = Arc::new(IndexBuilder::new(Arc::clone(&store)));
        Self {
            store,
            deriver,
            codec: TypeDescriptorCodec::default(),
            config,
            types: RwLock::new(HashMap::new()),
            loaded: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_index_deriver(mut self, deriver: Arc<dyn IndexDeriver>) -> Self {
        self.deriver = deriver;
        self
    }

    /// Set the type names that decoded descriptors may reference.
    pub fn with_resolver(mut self, resolver: TypeResolver) -> Self {
        self.codec = TypeDescriptorCodec::new(resolver);
        self
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn StoreFacade> {
        &self.store
    }

    pub fn codec(&self) -> &TypeDescriptorCodec {
        &self.codec
    }

    pub fn state(&self) -> CatalogState {
        if self.loaded.load(Ordering::Acquire) {
            CatalogState::Loaded
        } else {
            CatalogState::Uninitialized
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.state() == CatalogState::Loaded
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn check_open(&self) -> Result<(), CatalogError> {
        if self.is_closed() {
            return Err(CatalogError::Closed);
        }
        Ok(())
    }

    /// Persist a newly introduced type, request its indexes and publish it.
    ///
    /// The record is written with the configured (always acknowledged)
    /// durability and replaces any earlier record for the same type name.
    /// Nothing is published unless the write succeeded. The descriptor may
    /// reference types already in the catalog; any other unknown reference
    /// is an encode error, since the record could never be loaded again.
    pub fn introduce_type(&self, introduction: &TypeIntroduction) -> Result<WriteResult, CatalogError> {
        self.check_open()?;
        let descriptor = introduction.type_descriptor();

        let payload = self
            .codec
            .encode_among(descriptor, |name| self.get_type(name).is_some())?;
        let record = MetadataRecord::new(descriptor.type_name.as_str(), payload);

        let collection = self
            .store
            .collection(&self.config.collection_name)
            .map_err(CatalogError::Write)?;
        let result = collection
            .save(record.to_document(), self.config.durability)
            .map_err(CatalogError::Write)?;
        log::trace!("{:?}", result);

        self.derive_indexes(descriptor);
        self.publish(descriptor.clone());
        Ok(result)
    }

    /// Apply an explicit index addition. The catalog itself is not modified.
    pub fn ensure_indexes(&self, request: &AddIndexRequest) -> Result<(), CatalogError> {
        self.check_open()?;
        self.deriver.ensure_added(request)?;
        Ok(())
    }

    /// Read and decode every metadata record, then publish them all.
    ///
    /// Any record that fails to decode aborts the load before anything is
    /// published, so a failed load leaves the catalog as it was.
    pub fn load_metadata(&self) -> Result<Vec<Arc<TypeDescriptor>>, CatalogError> {
        self.check_open()?;

        let collection = self
            .store
            .collection(&self.config.collection_name)
            .map_err(CatalogError::Read)?;

        let mut records = Vec::new();
        for document in collection.find().map_err(CatalogError::Read)? {
            let document = document.map_err(CatalogError::Read)?;
            let record = MetadataRecord::from_document(&document).map_err(|e| {
                log::error!("failed to load type metadata: {}", e);
                CatalogError::from(e)
            })?;
            records.push(record);
        }

        // Stored types may reference each other, in any record order.
        let stored: HashSet<&str> = records.iter().map(|r| r.type_name.as_str()).collect();
        let mut decoded = Vec::with_capacity(records.len());
        for record in &records {
            let descriptor = self.read_record(record, &stored).map_err(|e| {
                log::error!("failed to load type metadata: {}", e);
                e
            })?;
            decoded.push(descriptor);
        }

        let mut loaded = Vec::with_capacity(decoded.len());
        for descriptor in decoded {
            self.derive_indexes(&descriptor);
            loaded.push(self.publish(descriptor));
        }

        self.loaded.store(true, Ordering::Release);
        log::info!(
            "loaded {} types from '{}'",
            loaded.len(),
            self.config.collection_name
        );
        Ok(loaded)
    }

    fn read_record(
        &self,
        record: &MetadataRecord,
        stored: &HashSet<&str>,
    ) -> Result<TypeDescriptor, CatalogError> {
        let descriptor = self
            .codec
            .decode_among(&record.payload, |name| stored.contains(name))?;
        if descriptor.type_name != record.type_name {
            return Err(CatalogError::Decode(format!(
                "record '{}' holds descriptor of '{}'",
                record.type_name, descriptor.type_name
            )));
        }
        Ok(descriptor)
    }

    /// Snapshot of every known type, sorted by name.
    pub fn get_types(&self) -> Vec<Arc<TypeDescriptor>> {
        let mut types: Vec<Arc<TypeDescriptor>> = self
            .types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        types.sort_by(|a, b| a.type_name.cmp(&b.type_name));
        types
    }

    pub fn get_type(&self, type_name: &str) -> Option<Arc<TypeDescriptor>> {
        self.types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(type_name)
            .cloned()
    }

    /// Translate `operations` and submit them to the store as one batch.
    pub fn perform_batch<O: SyncOperation>(&self, operations: &[O]) -> Result<BatchResult, CatalogError> {
        self.check_open()?;
        Ok(batch::submit(self.store.as_ref(), operations)?)
    }

    /// Release the store. Further calls are no-ops.
    pub fn close(&self) -> Result<(), CatalogError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.store.close().map_err(CatalogError::Store)
    }

    /// Best effort: a failure is logged and does not stop the caller.
    fn derive_indexes(&self, descriptor: &TypeDescriptor) {
        if let Err(e) = self.deriver.ensure_indexes(descriptor) {
            log::warn!("index derivation for '{}' failed: {}", descriptor.type_name, e);
        }
    }

    /// The single update path for both descriptor caches.
    fn publish(&self, descriptor: TypeDescriptor) -> Arc<TypeDescriptor> {
        self.store.cache_type_descriptor(descriptor.clone());
        let descriptor = Arc::new(descriptor);
        self.types
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(descriptor.type_name.clone(), Arc::clone(&descriptor));
        log::debug!("published type '{}'", descriptor.type_name);
        descriptor
    }
}
