use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::types::{TypeDescriptor, ID_FIELD};

/// Facade-side cache of type descriptors, keyed by type name.
#[derive(Debug, Default)]
pub struct TypeCache {
    types: RwLock<HashMap<String, TypeDescriptor>>,
}

impl TypeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, descriptor: TypeDescriptor) {
        self.types
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(descriptor.type_name.clone(), descriptor);
    }

    pub fn get(&self, type_name: &str) -> Option<TypeDescriptor> {
        self.types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(type_name)
            .cloned()
    }

    pub fn all(&self) -> Vec<TypeDescriptor> {
        self.types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Document field that keys instances of `type_name`.
    pub fn key_field(&self, type_name: &str) -> String {
        self.types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(type_name)
            .and_then(|t| t.id_property.clone())
            .unwrap_or_else(|| ID_FIELD.to_string())
    }
}
