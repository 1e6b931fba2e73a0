// Gridsync - type metadata catalog between a data grid and a document store

pub mod batch;
pub mod catalog;
pub mod codec;
pub mod endpoint;
pub mod index;
pub mod store;
pub mod types;

pub use batch::{translate, BatchError, BatchUnit, DataSyncOperation, OperationKind, SyncOperation};
pub use catalog::{CatalogConfig, CatalogError, CatalogState, MetadataCatalog};
pub use codec::{CodecError, TypeDescriptorCodec, TypeResolver};
pub use endpoint::SyncEndpoint;
pub use index::{IndexBuilder, IndexDeriver, IndexError};
pub use store::{Durability, FileStore, MemoryStore, StoreError, StoreFacade};
pub use types::{
    AddIndexRequest, Document, IndexDescriptor, IndexKind, TypeDescriptor, TypeIntroduction, Value,
};
