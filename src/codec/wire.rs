//! On-disk shapes of each descriptor encoding version
//!
//! These structs are frozen per version. A format change adds a new
//! version here; older ones stay decodable.

use serde::{Deserialize, Serialize};

use crate::types::{IndexDescriptor, IndexKind, PropertyDescriptor, TypeDescriptor};

/// Version 1: name, `[property, type]` pairs and a flat list of indexed paths.
#[derive(Debug, Serialize, Deserialize)]
pub(super) struct DescriptorV1 {
    pub name: String,
    pub properties: Vec<(String, String)>,
    pub indexes: Vec<String>,
}

impl From<DescriptorV1> for TypeDescriptor {
    fn from(v1: DescriptorV1) -> Self {
        let mut descriptor = TypeDescriptor::new(v1.name);
        descriptor.properties = v1
            .properties
            .into_iter()
            .map(|(name, type_name)| PropertyDescriptor::new(name, type_name))
            .collect();
        descriptor.indexes = v1.indexes.into_iter().map(IndexDescriptor::equality).collect();
        descriptor
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(super) enum IndexKindV2 {
    Equality,
    Ordered,
}

#[derive(Debug, Serialize, Deserialize)]
pub(super) struct PropertyV2 {
    pub name: String,
    pub type_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub(super) struct IndexV2 {
    pub paths: Vec<String>,
    pub kind: IndexKindV2,
    pub unique: bool,
}

/// Version 2: full descriptor including keys, routing, super type and index kinds.
#[derive(Debug, Serialize, Deserialize)]
pub(super) struct DescriptorV2 {
    pub type_name: String,
    pub super_type_name: Option<String>,
    pub properties: Vec<PropertyV2>,
    pub id_property: Option<String>,
    pub routing_property: Option<String>,
    pub indexes: Vec<IndexV2>,
    pub dynamic_properties: bool,
}

impl From<&TypeDescriptor> for DescriptorV2 {
    fn from(d: &TypeDescriptor) -> Self {
        Self {
            type_name: d.type_name.clone(),
            super_type_name: d.super_type_name.clone(),
            properties: d
                .properties
                .iter()
                .map(|p| PropertyV2 {
                    name: p.name.clone(),
                    type_name: p.type_name.clone(),
                })
                .collect(),
            id_property: d.id_property.clone(),
            routing_property: d.routing_property.clone(),
            indexes: d
                .indexes
                .iter()
                .map(|i| IndexV2 {
                    paths: i.paths.clone(),
                    kind: match i.kind {
                        IndexKind::Equality => IndexKindV2::Equality,
                        IndexKind::Ordered => IndexKindV2::Ordered,
                    },
                    unique: i.unique,
                })
                .collect(),
            dynamic_properties: d.supports_dynamic_properties,
        }
    }
}

impl From<DescriptorV2> for TypeDescriptor {
    fn from(v2: DescriptorV2) -> Self {
        Self {
            type_name: v2.type_name,
            super_type_name: v2.super_type_name,
            properties: v2
                .properties
                .into_iter()
                .map(|p| PropertyDescriptor::new(p.name, p.type_name))
                .collect(),
            id_property: v2.id_property,
            routing_property: v2.routing_property,
            indexes: v2
                .indexes
                .into_iter()
                .map(|i| IndexDescriptor {
                    paths: i.paths,
                    kind: match i.kind {
                        IndexKindV2::Equality => IndexKind::Equality,
                        IndexKindV2::Ordered => IndexKind::Ordered,
                    },
                    unique: i.unique,
                })
                .collect(),
            supports_dynamic_properties: v2.dynamic_properties,
        }
    }
}
