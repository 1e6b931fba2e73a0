//! Versioned binary encoding of type descriptors
//!
//! Every payload starts with a 4-byte header: the magic `GD` followed by
//! the format version as a big-endian `u16`. The body is CBOR whose shape
//! depends on the version (see `wire`). `encode` always writes the current
//! version; `decode` accepts every version listed in `SUPPORTED_VERSIONS`.

pub mod record;
pub mod resolver;
mod wire;

pub use record::{MetadataRecord, DESCRIPTOR_FIELD};
pub use resolver::{TypeResolver, BUILTIN_TYPES};

use thiserror::Error;

use crate::types::TypeDescriptor;
use wire::{DescriptorV1, DescriptorV2};

/// Leading magic bytes of every encoded descriptor.
pub const MAGIC: [u8; 2] = *b"GD";

/// Version written by `encode`.
pub const CURRENT_VERSION: u16 = 2;

/// Versions `decode` understands, oldest first.
pub const SUPPORTED_VERSIONS: &[u16] = &[1, 2];

const HEADER_LEN: usize = 4;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Unsupported encoding version: {0}")]
    UnsupportedVersion(u16),

    #[error("Class resolution error: {0}")]
    ClassResolution(String),
}

/// Encodes and decodes type descriptors.
#[derive(Clone, Debug, Default)]
pub struct TypeDescriptorCodec {
    resolver: TypeResolver,
}

impl TypeDescriptorCodec {
    pub fn new(resolver: TypeResolver) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &TypeResolver {
        &self.resolver
    }

    /// Encode `descriptor` at `CURRENT_VERSION`.
    pub fn encode(&self, descriptor: &TypeDescriptor) -> Result<Vec<u8>, CodecError> {
        self.encode_among(descriptor, |_| false)
    }

    /// Encode `descriptor`, accepting references to types `catalog` knows.
    ///
    /// A descriptor that the same codec could not resolve when decoding is
    /// rejected here as an encode error.
    pub fn encode_among<F>(&self, descriptor: &TypeDescriptor, catalog: F) -> Result<Vec<u8>, CodecError>
    where
        F: Fn(&str) -> bool,
    {
        descriptor
            .validate()
            .map_err(|e| CodecError::Encode(e.to_string()))?;
        self.resolver
            .resolve_among(descriptor, catalog)
            .map_err(|e| CodecError::Encode(e.to_string()))?;

        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(&MAGIC);
        buf.extend_from_slice(&CURRENT_VERSION.to_be_bytes());
        ciborium::into_writer(&DescriptorV2::from(descriptor), &mut buf)
            .map_err(|e| CodecError::Encode(e.to_string()))?;
        Ok(buf)
    }

    /// Decode bytes produced by any supported version of `encode`.
    pub fn decode(&self, bytes: &[u8]) -> Result<TypeDescriptor, CodecError> {
        self.decode_among(bytes, |_| false)
    }

    /// Decode, resolving referenced types against the resolver and `catalog`.
    pub fn decode_among<F>(&self, bytes: &[u8], catalog: F) -> Result<TypeDescriptor, CodecError>
    where
        F: Fn(&str) -> bool,
    {
        let version = encoded_version(bytes)?;
        let body = &bytes[HEADER_LEN..];

        let descriptor: TypeDescriptor = match version {
            1 => read_body::<DescriptorV1>(body)?.into(),
            2 => read_body::<DescriptorV2>(body)?.into(),
            other => return Err(CodecError::UnsupportedVersion(other)),
        };

        descriptor
            .validate()
            .map_err(|e| CodecError::Decode(e.to_string()))?;
        self.resolver.resolve_among(&descriptor, catalog)?;

        Ok(descriptor)
    }
}

/// Read the format version from an encoded descriptor's header.
pub fn encoded_version(bytes: &[u8]) -> Result<u16, CodecError> {
    if bytes.len() < HEADER_LEN {
        return Err(CodecError::Decode(format!(
            "truncated header: {} bytes",
            bytes.len()
        )));
    }
    if bytes[..2] != MAGIC {
        return Err(CodecError::Decode(format!(
            "bad magic {}",
            hex::encode(&bytes[..2])
        )));
    }
    Ok(u16::from_be_bytes([bytes[2], bytes[3]]))
}

fn read_body<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, CodecError> {
    let mut reader = body;
    let value = ciborium::from_reader(&mut reader).map_err(|e| CodecError::Decode(e.to_string()))?;
    if !reader.is_empty() {
        return Err(CodecError::Decode(format!(
            "{} trailing bytes after descriptor body",
            reader.len()
        )));
    }
    Ok(value)
}
