//! Grid-side type descriptors
//!
//! A `TypeDescriptor` is the schema of one entity type as declared by the
//! data grid: its name, its properties and the indexes it asks for. The
//! catalog persists these and derives store indexes from them.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("Type name is empty")]
    EmptyTypeName,

    #[error("Duplicate property '{property}' in type '{type_name}'")]
    DuplicateProperty { type_name: String, property: String },

    #[error("Type '{type_name}' references undeclared property '{property}'")]
    UndeclaredProperty { type_name: String, property: String },

    #[error("Type '{0}' declares an index without paths")]
    EmptyIndex(String),
}

/// A single declared property of a type
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    pub name: String,
    /// Name of the property's value type, resolved against a `TypeResolver` on decode.
    pub type_name: String,
}

impl PropertyDescriptor {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// How an index is used by queries
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexKind {
    /// Equality lookups only
    Equality,
    /// Equality and range lookups
    Ordered,
}

/// An index declared on one property path, or several for a compound index
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub paths: Vec<String>,
    pub kind: IndexKind,
    pub unique: bool,
}

impl IndexDescriptor {
    pub fn equality(path: impl Into<String>) -> Self {
        Self {
            paths: vec![path.into()],
            kind: IndexKind::Equality,
            unique: false,
        }
    }

    pub fn ordered(path: impl Into<String>) -> Self {
        Self {
            paths: vec![path.into()],
            kind: IndexKind::Ordered,
            unique: false,
        }
    }

    pub fn compound<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
            kind: IndexKind::Ordered,
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn is_compound(&self) -> bool {
        self.paths.len() > 1
    }

    /// Deterministic name for the store-side index, e.g. `status_1` or `a_1_b.c_1`.
    pub fn name(&self) -> String {
        let suffix = match self.kind {
            IndexKind::Equality if !self.unique && !self.is_compound() => "hashed",
            _ => "1",
        };
        self.paths
            .iter()
            .map(|p| format!("{}_{}", p, suffix))
            .collect::<Vec<_>>()
            .join("_")
    }
}

/// Root property of a (possibly nested) path: `address.city` -> `address`.
fn root_property(path: &str) -> &str {
    path.split('.').next().unwrap_or(path)
}

/// Schema of one grid-side entity type
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    /// Globally unique type name; the catalog's identity key.
    pub type_name: String,
    pub super_type_name: Option<String>,
    pub properties: Vec<PropertyDescriptor>,
    pub id_property: Option<String>,
    pub routing_property: Option<String>,
    pub indexes: Vec<IndexDescriptor>,
    pub supports_dynamic_properties: bool,
}

impl TypeDescriptor {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            super_type_name: None,
            properties: Vec::new(),
            id_property: None,
            routing_property: None,
            indexes: Vec::new(),
            supports_dynamic_properties: false,
        }
    }

    pub fn with_super_type(mut self, super_type_name: impl Into<String>) -> Self {
        self.super_type_name = Some(super_type_name.into());
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.properties.push(PropertyDescriptor::new(name, type_name));
        self
    }

    pub fn with_id_property(mut self, name: impl Into<String>) -> Self {
        self.id_property = Some(name.into());
        self
    }

    pub fn with_routing_property(mut self, name: impl Into<String>) -> Self {
        self.routing_property = Some(name.into());
        self
    }

    pub fn with_index(mut self, index: IndexDescriptor) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn with_dynamic_properties(mut self) -> Self {
        self.supports_dynamic_properties = true;
        self
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.property(name).is_some()
    }

    /// Distinct property paths covered by any declared index, in declaration order.
    pub fn indexed_properties(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.indexes
            .iter()
            .flat_map(|i| i.paths.iter())
            .map(String::as_str)
            .filter(|p| seen.insert(*p))
            .collect()
    }

    /// Check internal consistency of the descriptor.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        if self.type_name.trim().is_empty() {
            return Err(DescriptorError::EmptyTypeName);
        }

        let mut names = HashSet::new();
        for property in &self.properties {
            if !names.insert(property.name.as_str()) {
                return Err(DescriptorError::DuplicateProperty {
                    type_name: self.type_name.clone(),
                    property: property.name.clone(),
                });
            }
        }

        // Id and routing must be fixed properties, dynamic or not.
        for name in self.id_property.iter().chain(self.routing_property.iter()) {
            if !names.contains(name.as_str()) {
                return Err(self.undeclared(name));
            }
        }

        for index in &self.indexes {
            if index.paths.is_empty() {
                return Err(DescriptorError::EmptyIndex(self.type_name.clone()));
            }
            if self.supports_dynamic_properties {
                continue;
            }
            for path in &index.paths {
                if !names.contains(root_property(path)) {
                    return Err(self.undeclared(path));
                }
            }
        }

        Ok(())
    }

    fn undeclared(&self, property: &str) -> DescriptorError {
        DescriptorError::UndeclaredProperty {
            type_name: self.type_name.clone(),
            property: property.to_string(),
        }
    }
}

/// Event raised by the host framework when a new type is introduced
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeIntroduction {
    pub descriptor: TypeDescriptor,
}

impl TypeIntroduction {
    pub fn new(descriptor: TypeDescriptor) -> Self {
        Self { descriptor }
    }

    pub fn type_descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }
}

/// Event raised by the host framework when indexes are added to a known type
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddIndexRequest {
    pub type_name: String,
    pub indexes: Vec<IndexDescriptor>,
}

impl AddIndexRequest {
    pub fn new(type_name: impl Into<String>, indexes: Vec<IndexDescriptor>) -> Self {
        Self {
            type_name: type_name.into(),
            indexes,
        }
    }
}
