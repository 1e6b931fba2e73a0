//! Persisted layout of one catalog entry

use super::CodecError;
use crate::types::{Document, Value, ID_FIELD};

/// Field holding the encoded descriptor.
pub const DESCRIPTOR_FIELD: &str = "value";

/// A stored type descriptor: the type name as key plus the encoded bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetadataRecord {
    pub type_name: String,
    pub payload: Vec<u8>,
}

impl MetadataRecord {
    pub fn new(type_name: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            type_name: type_name.into(),
            payload,
        }
    }

    /// Store document with exactly two fields: `_id` and `value`.
    pub fn to_document(&self) -> Document {
        Document::new()
            .with(ID_FIELD, self.type_name.as_str())
            .with(DESCRIPTOR_FIELD, self.payload.clone())
    }

    pub fn from_document(document: &Document) -> Result<Self, CodecError> {
        let type_name = document
            .get(ID_FIELD)
            .and_then(Value::as_str)
            .ok_or_else(|| CodecError::Decode("metadata record without string key".into()))?;
        let payload = document
            .get(DESCRIPTOR_FIELD)
            .and_then(Value::as_bytes)
            .ok_or_else(|| {
                CodecError::Decode(format!("metadata record '{}' has no binary payload", type_name))
            })?;

        Ok(Self::new(type_name, payload.to_vec()))
    }
}
