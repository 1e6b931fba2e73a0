//! Host framework boundary
//!
//! The host's event dispatcher has no channel for reporting failures of
//! type introductions or index additions. `SyncEndpoint` adapts the
//! catalog's `Result`-returning operations to that contract: those two
//! events are logged and discarded on failure, while batches and metadata
//! loads still report errors to the caller.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::batch::SyncOperation;
use crate::catalog::{CatalogError, MetadataCatalog};
use crate::store::BatchResult;
use crate::types::{AddIndexRequest, TypeDescriptor, TypeIntroduction};

#[derive(Clone)]
pub struct SyncEndpoint {
    catalog: Arc<MetadataCatalog>,
}

impl SyncEndpoint {
    pub fn new(catalog: MetadataCatalog) -> Self {
        Self {
            catalog: Arc::new(catalog),
        }
    }

    pub fn catalog(&self) -> &Arc<MetadataCatalog> {
        &self.catalog
    }

    /// Introduce a type; failures are logged, never returned.
    pub fn on_introduce_type(&self, introduction: &TypeIntroduction) {
        if let Err(e) = self.catalog.introduce_type(introduction) {
            log::error!(
                "type '{}' was not introduced: {}",
                introduction.descriptor.type_name,
                e
            );
        }
    }

    /// Add indexes; failures are logged, never returned.
    pub fn on_add_index(&self, request: &AddIndexRequest) {
        if let Err(e) = self.catalog.ensure_indexes(request) {
            log::error!("indexes for '{}' were not added: {}", request.type_name, e);
        }
    }

    pub fn on_operation_data<O: SyncOperation>(&self, operations: &[O]) -> Result<BatchResult, CatalogError> {
        self.catalog.perform_batch(operations)
    }

    pub fn load_metadata(&self) -> Result<Vec<Arc<TypeDescriptor>>, CatalogError> {
        self.catalog.load_metadata()
    }

    pub fn types(&self) -> Vec<Arc<TypeDescriptor>> {
        self.catalog.get_types()
    }

    pub fn close(&self) -> Result<(), CatalogError> {
        self.catalog.close()
    }

    /// Run `on_introduce_type` on tokio's blocking pool.
    pub fn spawn_introduce_type(&self, introduction: TypeIntroduction) -> JoinHandle<()> {
        let catalog = Arc::clone(&self.catalog);
        tokio::task::spawn_blocking(move || {
            Self { catalog }.on_introduce_type(&introduction);
        })
    }

    /// Run a batch on tokio's blocking pool.
    pub fn spawn_operation_data<O>(&self, operations: Vec<O>) -> JoinHandle<Result<BatchResult, CatalogError>>
    where
        O: SyncOperation + Send + 'static,
    {
        let catalog = Arc::clone(&self.catalog);
        tokio::task::spawn_blocking(move || catalog.perform_batch(&operations))
    }
}
