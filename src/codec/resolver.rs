//! Resolution of type names referenced by decoded descriptors

use std::collections::HashSet;

use super::CodecError;
use crate::types::TypeDescriptor;

/// Value types every process understands.
pub const BUILTIN_TYPES: &[&str] = &[
    "string", "bool", "int32", "int64", "float32", "float64", "decimal", "bytes", "datetime",
    "uuid", "document", "list", "map", "object",
];

/// The set of type names that can be resolved in this process.
///
/// A decoded descriptor may only reference property types and a super type
/// that are known here; anything else is a class resolution failure.
#[derive(Clone, Debug)]
pub struct TypeResolver {
    known: HashSet<String>,
}

impl TypeResolver {
    /// A resolver that knows only the built-in value types.
    pub fn builtin() -> Self {
        Self {
            known: BUILTIN_TYPES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Register an application type name.
    pub fn register(&mut self, type_name: impl Into<String>) {
        self.known.insert(type_name.into());
    }

    pub fn with_type(mut self, type_name: impl Into<String>) -> Self {
        self.register(type_name);
        self
    }

    pub fn is_known(&self, type_name: &str) -> bool {
        self.known.contains(type_name)
    }

    /// Verify every type referenced by `descriptor` is known.
    pub fn resolve(&self, descriptor: &TypeDescriptor) -> Result<(), CodecError> {
        self.resolve_among(descriptor, |_| false)
    }

    /// Like `resolve`, but also accept every name `catalog` reports as known.
    ///
    /// Catalog types may reference one another, and a property may refer to
    /// its own type.
    pub fn resolve_among<F>(&self, descriptor: &TypeDescriptor, catalog: F) -> Result<(), CodecError>
    where
        F: Fn(&str) -> bool,
    {
        if let Some(super_type) = &descriptor.super_type_name {
            if !self.is_known(super_type) && !catalog(super_type) {
                return Err(CodecError::ClassResolution(format!(
                    "super type '{}' of '{}'",
                    super_type, descriptor.type_name
                )));
            }
        }

        for property in &descriptor.properties {
            let known = self.is_known(&property.type_name)
                || property.type_name == descriptor.type_name
                || catalog(&property.type_name);
            if !known {
                return Err(CodecError::ClassResolution(format!(
                    "type '{}' of property '{}.{}'",
                    property.type_name, descriptor.type_name, property.name
                )));
            }
        }

        Ok(())
    }
}

impl Default for TypeResolver {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_types_resolve() {
        let t = TypeDescriptor::new("Order")
            .with_property("id", "int64")
            .with_property("placed", "datetime");
        assert!(TypeResolver::default().resolve(&t).is_ok());
    }

    #[test]
    fn test_unknown_property_type() {
        let t = TypeDescriptor::new("Order").with_property("customer", "Customer");

        let err = TypeResolver::default().resolve(&t).unwrap_err();
        assert!(matches!(err, CodecError::ClassResolution(_)));
        assert!(err.to_string().contains("Customer"));

        let resolver = TypeResolver::default().with_type("Customer");
        assert!(resolver.resolve(&t).is_ok());
    }

    #[test]
    fn test_unknown_super_type() {
        let t = TypeDescriptor::new("SpecialOrder").with_super_type("Order");
        assert!(matches!(
            TypeResolver::default().resolve(&t),
            Err(CodecError::ClassResolution(_))
        ));
    }

    #[test]
    fn test_catalog_types_resolve() {
        let special = TypeDescriptor::new("SpecialOrder")
            .with_super_type("Order")
            .with_property("parent", "SpecialOrder")
            .with_property("customer", "Customer");
        let resolver = TypeResolver::default();

        assert!(resolver
            .resolve_among(&special, |name| name == "Order" || name == "Customer")
            .is_ok());
        assert!(matches!(
            resolver.resolve_among(&special, |name| name == "Order"),
            Err(CodecError::ClassResolution(_))
        ));
    }
}
