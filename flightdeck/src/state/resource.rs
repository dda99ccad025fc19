//! Resource identity records published by resource steps.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identity of a created cloud resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    /// Provider-assigned resource identifier.
    pub resource_id: String,
    /// Resource type, e.g. `"VNET"`.
    pub resource_type: String,
    /// Resource name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,
    /// Region the resource lives in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Resource tags.
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl ResourceRecord {
    /// Creates a new record.
    #[must_use]
    pub fn new(resource_id: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            resource_type: resource_type.into(),
            resource_name: None,
            region: None,
            tags: HashMap::new(),
        }
    }

    /// Sets the resource name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.resource_name = Some(name.into());
        self
    }

    /// Sets the region.
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Adds a tag.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// Working-state keys under which a resource step publishes its identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceKeys {
    /// Key holding the bare resource id.
    pub id_key: String,
    /// Key holding the full `ResourceRecord`.
    pub record_key: String,
}

impl ResourceKeys {
    /// Creates keys from explicit names.
    #[must_use]
    pub fn new(id_key: impl Into<String>, record_key: impl Into<String>) -> Self {
        Self {
            id_key: id_key.into(),
            record_key: record_key.into(),
        }
    }

    /// Conventional keys for a resource type: `VNET` gives `VNET_ID` and `VNET`.
    #[must_use]
    pub fn for_resource(resource_type: &str) -> Self {
        Self::new(format!("{resource_type}_ID"), resource_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_keys_convention() {
        let keys = ResourceKeys::for_resource("VNET");
        assert_eq!(keys.id_key, "VNET_ID");
        assert_eq!(keys.record_key, "VNET");
    }

    #[test]
    fn test_resource_record_serialization() {
        let record = ResourceRecord::new("/subs/1/vnets/a", "VNET")
            .with_name("lzabc")
            .with_region("eastus")
            .with_tag("owner", "lz");

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["resource_id"], "/subs/1/vnets/a");
        assert_eq!(json["tags"]["owner"], "lz");

        let back: ResourceRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_resource_record_optional_fields_default() {
        let record: ResourceRecord =
            serde_json::from_str(r#"{"resource_id":"id","resource_type":"T"}"#).unwrap();
        assert!(record.resource_name.is_none());
        assert!(record.tags.is_empty());
    }
}
