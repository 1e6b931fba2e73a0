//! Data model shared across the catalog: type descriptors and documents

pub mod descriptor;
pub mod document;

pub use descriptor::{
    AddIndexRequest, DescriptorError, IndexDescriptor, IndexKind, PropertyDescriptor,
    TypeDescriptor, TypeIntroduction,
};
pub use document::{Document, Value, ID_FIELD};
