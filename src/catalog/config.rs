use serde::{Deserialize, Serialize};

use super::{CatalogError, SAFE_WRITE};
use crate::store::Durability;

/// Configuration for a metadata catalog
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Collection holding one metadata record per type
    pub collection_name: String,

    /// Acknowledgment level for metadata writes; never `Unacknowledged`
    pub durability: Durability,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            collection_name: "metadata".to_string(),
            durability: SAFE_WRITE,
        }
    }
}

impl CatalogConfig {
    /// Parse from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| CatalogError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.collection_name.trim().is_empty() {
            return Err(CatalogError::Config("collection_name is empty".into()));
        }
        if !self.durability.is_acknowledged() {
            return Err(CatalogError::Config(
                "metadata writes must be acknowledged".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CatalogConfig::default();
        assert_eq!(config.collection_name, "metadata");
        assert_eq!(config.durability, Durability::Acknowledged);
    }

    #[test]
    fn test_from_json_partial() {
        let config = CatalogConfig::from_json(r#"{ "durability": "journaled" }"#).unwrap();
        assert_eq!(config.collection_name, "metadata");
        assert_eq!(config.durability, Durability::Journaled);
    }

    #[test]
    fn test_from_json_rejects_empty_collection() {
        assert!(matches!(
            CatalogConfig::from_json(r#"{ "collection_name": "" }"#),
            Err(CatalogError::Config(_))
        ));
        assert!(matches!(
            CatalogConfig::from_json("not json"),
            Err(CatalogError::Config(_))
        ));
    }

    #[test]
    fn test_unacknowledged_durability_rejected() {
        assert!(matches!(
            CatalogConfig::from_json(r#"{ "durability": "unacknowledged" }"#),
            Err(CatalogError::Config(_))
        ));
    }
}
