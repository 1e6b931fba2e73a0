//! Derivation of store indexes from type descriptors
//!
//! `IndexBuilder` maps each declared `IndexDescriptor` to one physical
//! `IndexSpec` on the collection named after the type:
//!
//! - a simple non-unique equality index becomes a hashed key
//! - everything else becomes ascending keys, compound paths kept in order
//! - an index covering only the id property is skipped, the store key
//!   already indexes it
//!
//! Index names are deterministic, so re-deriving an unchanged descriptor
//! never creates anything new.

use std::sync::Arc;

use thiserror::Error;

use crate::store::{IndexKey, IndexOrder, IndexSpec, StoreError, StoreFacade};
use crate::types::{AddIndexRequest, IndexDescriptor, IndexKind, TypeDescriptor};

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Failed to ensure index '{index}' on '{type_name}': {source}")]
    Store {
        type_name: String,
        index: String,
        #[source]
        source: StoreError,
    },
}

/// Materializes the physical indexes implied by a type descriptor.
///
/// Implementations must be idempotent: ensuring an already-satisfied
/// index set succeeds without creating anything.
pub trait IndexDeriver: Send + Sync {
    fn ensure_indexes(&self, descriptor: &TypeDescriptor) -> Result<(), IndexError>;

    /// Apply one explicit index addition outside the type introduction path.
    fn ensure_added(&self, request: &AddIndexRequest) -> Result<(), IndexError>;
}

/// Map one declared index to its store form, or `None` if the store key already covers it.
pub fn index_spec(index: &IndexDescriptor, id_property: Option<&str>) -> Option<IndexSpec> {
    if let ([only], Some(id)) = (index.paths.as_slice(), id_property) {
        if only == id {
            return None;
        }
    }

    let order = match index.kind {
        IndexKind::Equality if !index.unique && !index.is_compound() => IndexOrder::Hashed,
        _ => IndexOrder::Ascending,
    };

    Some(IndexSpec {
        name: index.name(),
        keys: index
            .paths
            .iter()
            .map(|path| IndexKey {
                path: path.clone(),
                order,
            })
            .collect(),
        unique: index.unique,
    })
}

/// Default deriver creating indexes through a `StoreFacade`
pub struct IndexBuilder {
    store: Arc<dyn StoreFacade>,
}

impl IndexBuilder {
    pub fn new(store: Arc<dyn StoreFacade>) -> Self {
        Self { store }
    }

    fn apply(
        &self,
        type_name: &str,
        id_property: Option<&str>,
        indexes: &[IndexDescriptor],
    ) -> Result<(), IndexError> {
        let specs: Vec<IndexSpec> = indexes
            .iter()
            .filter_map(|index| index_spec(index, id_property))
            .collect();
        if specs.is_empty() {
            return Ok(());
        }

        let wrap = |index: &str, source: StoreError| IndexError::Store {
            type_name: type_name.to_string(),
            index: index.to_string(),
            source,
        };

        let collection = self
            .store
            .collection(type_name)
            .map_err(|e| wrap("*", e))?;

        for spec in &specs {
            let created = collection
                .ensure_index(spec)
                .map_err(|e| wrap(&spec.name, e))?;
            if created {
                log::debug!("created index {} on {}", spec.name, type_name);
            }
        }
        Ok(())
    }
}

impl IndexDeriver for IndexBuilder {
    fn ensure_indexes(&self, descriptor: &TypeDescriptor) -> Result<(), IndexError> {
        self.apply(
            &descriptor.type_name,
            descriptor.id_property.as_deref(),
            &descriptor.indexes,
        )
    }

    fn ensure_added(&self, request: &AddIndexRequest) -> Result<(), IndexError> {
        let id_property = self
            .store
            .type_descriptor(&request.type_name)
            .and_then(|t| t.id_property);
        self.apply(&request.type_name, id_property.as_deref(), &request.indexes)
    }
}
