//! Generic create/undo step for a single cloud resource.
//!
//! A concrete resource step is a `ResourceCreateStep` configured with a
//! `ResourceSpec` (which keys it reads and writes, which names it needs) and a
//! `ResourceProvider` that talks to the cloud. The template owns the common
//! algorithm: prerequisite lookup, name resolution, error classification,
//! conflict reconciliation and publishing the resulting record.

mod create_step;

pub use create_step::ResourceCreateStep;

use crate::errors::StateError;
use crate::naming::NameRequirement;
use crate::provider::ProviderError;
use crate::reconcile::ExistingResource;
use crate::state::{InputParameters, ResourceKeys, ResourceRecord};
use crate::step::StepOutcome;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::HashMap;

/// Cloud operations for one resource type.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Creates the resource.
    async fn create(&self, request: &CreateRequest) -> Result<ResourceRecord, ProviderError>;

    /// Looks up the resource the request would create, if it exists.
    async fn fetch_existing(
        &self,
        request: &CreateRequest,
    ) -> Result<Option<ExistingResource>, ProviderError>;

    /// Deletes a resource by id.
    async fn delete(&self, resource_id: &str) -> Result<(), ProviderError>;

    /// Whether an error should be retried.
    fn is_transient(&self, error: &ProviderError) -> bool {
        error.is_transient()
    }

    /// Provider-specific handling of a create error, consulted before the
    /// generic classification.
    fn handle_error(&self, _error: &ProviderError, _request: &CreateRequest) -> Option<StepOutcome> {
        None
    }

    /// Provider-specific handling of a delete error, consulted before the
    /// generic classification.
    fn handle_delete_error(&self, _error: &ProviderError, _resource_id: &str) -> Option<StepOutcome> {
        None
    }
}

/// Static description of the resource a step manages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSpec {
    /// Resource type, used in logs and messages.
    pub resource_type: String,
    /// Where the step publishes its record and id.
    pub keys: ResourceKeys,
    /// Working-state keys that must be present before creating.
    pub prerequisites: Vec<String>,
    /// Input keys that must be present before creating.
    pub required_inputs: Vec<String>,
    /// Names to generate.
    pub name_requirements: Vec<NameRequirement>,
}

impl ResourceSpec {
    /// Creates a spec with conventional keys and a single name requirement
    /// keyed by the resource type.
    #[must_use]
    pub fn new(resource_type: impl Into<String>, max_name_length: usize) -> Self {
        let resource_type = resource_type.into();
        Self {
            keys: ResourceKeys::for_resource(&resource_type),
            name_requirements: vec![NameRequirement::new(&resource_type, max_name_length)],
            resource_type,
            prerequisites: Vec::new(),
            required_inputs: Vec::new(),
        }
    }

    /// Overrides the publication keys.
    #[must_use]
    pub fn with_keys(mut self, keys: ResourceKeys) -> Self {
        self.keys = keys;
        self
    }

    /// Adds a required working-state key.
    #[must_use]
    pub fn with_prerequisite(mut self, key: impl Into<String>) -> Self {
        self.prerequisites.push(key.into());
        self
    }

    /// Adds a required input key.
    #[must_use]
    pub fn with_required_input(mut self, key: impl Into<String>) -> Self {
        self.required_inputs.push(key.into());
        self
    }

    /// Adds another generated name, e.g. for an auxiliary resource.
    #[must_use]
    pub fn with_name_requirement(mut self, requirement: NameRequirement) -> Self {
        self.name_requirements.push(requirement);
        self
    }
}

/// Everything a provider needs to create one resource.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateRequest {
    /// Resource type.
    pub resource_type: String,
    /// Generated names by logical name.
    pub names: HashMap<String, String>,
    /// Values of the declared prerequisites.
    pub prerequisites: HashMap<String, serde_json::Value>,
    /// Flight inputs.
    pub inputs: InputParameters,
}

impl CreateRequest {
    /// Creates an empty request for a resource type.
    #[must_use]
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            names: HashMap::new(),
            prerequisites: HashMap::new(),
            inputs: InputParameters::new(),
        }
    }

    /// The generated name for a logical name.
    #[must_use]
    pub fn name(&self, logical_name: &str) -> Option<&str> {
        self.names.get(logical_name).map(String::as_str)
    }

    /// The generated name for the resource itself.
    #[must_use]
    pub fn primary_name(&self) -> Option<&str> {
        self.name(&self.resource_type)
    }

    /// Decodes a prerequisite value.
    ///
    /// # Errors
    ///
    /// Returns `StateError` if the prerequisite is missing or has the wrong type.
    pub fn prerequisite<T: DeserializeOwned>(&self, key: &str) -> Result<T, StateError> {
        let value = self
            .prerequisites
            .get(key)
            .cloned()
            .ok_or_else(|| StateError::missing(key, "working"))?;
        serde_json::from_value(value).map_err(|e| StateError::TypeMismatch {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::MAX_VNET_NAME_LENGTH;

    #[test]
    fn test_resource_spec_defaults() {
        let spec = ResourceSpec::new("VNET", MAX_VNET_NAME_LENGTH)
            .with_prerequisite("RESOURCE_GROUP_ID")
            .with_required_input("region");

        assert_eq!(spec.keys, ResourceKeys::for_resource("VNET"));
        assert_eq!(
            spec.name_requirements,
            vec![NameRequirement::new("VNET", MAX_VNET_NAME_LENGTH)]
        );
        assert_eq!(spec.prerequisites, vec!["RESOURCE_GROUP_ID".to_string()]);
    }

    #[test]
    fn test_create_request_accessors() {
        let mut request = CreateRequest::new("VNET");
        request.names.insert("VNET".into(), "lzabc".into());
        request
            .prerequisites
            .insert("RG_ID".into(), serde_json::json!("rg-1"));

        assert_eq!(request.primary_name(), Some("lzabc"));
        assert_eq!(request.prerequisite::<String>("RG_ID").unwrap(), "rg-1");
        assert!(request.prerequisite::<String>("OTHER").is_err());
    }
}
