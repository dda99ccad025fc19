//! Resource naming for landing-zone flights.
//!
//! Each resource step declares the names it needs as `NameRequirement`s and
//! registers them once with the flight's `ResourceNameProvider`. A name is a
//! hash of the flight seed and the logical name, so rebuilding the same flight
//! (for example after a restart) yields the same names.

mod generator;

pub use generator::*;

use crate::errors::NamingError;
use parking_lot::Mutex;
use std::collections::HashMap;

/// A name a step needs, identified by a logical key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NameRequirement {
    /// Logical name, usually the resource type.
    pub logical_name: String,
    /// Maximum length the provider accepts.
    pub max_length: usize,
}

impl NameRequirement {
    /// Creates a new requirement.
    #[must_use]
    pub fn new(logical_name: impl Into<String>, max_length: usize) -> Self {
        Self {
            logical_name: logical_name.into(),
            max_length,
        }
    }
}

#[derive(Debug)]
struct ProviderInner {
    generator: ResourceNameGenerator,
    names: HashMap<String, String>,
}

/// Hands out generated names to registered steps.
#[derive(Debug)]
pub struct ResourceNameProvider {
    inner: Mutex<ProviderInner>,
}

impl ResourceNameProvider {
    /// Creates a provider seeded with the landing zone id.
    #[must_use]
    pub fn new(seed: impl Into<String>) -> Self {
        Self {
            inner: Mutex::new(ProviderInner {
                generator: ResourceNameGenerator::new(seed),
                names: HashMap::new(),
            }),
        }
    }

    /// Registers a step's requirements, generating a name for each.
    ///
    /// # Errors
    ///
    /// Returns `NamingError::AlreadyRegistered` if any logical name was
    /// registered before. Nothing is registered in that case.
    pub fn register(&self, requirements: &[NameRequirement]) -> Result<(), NamingError> {
        let mut inner = self.inner.lock();
        if let Some(dup) = requirements
            .iter()
            .find(|r| inner.names.contains_key(&r.logical_name))
        {
            return Err(NamingError::AlreadyRegistered(dup.logical_name.clone()));
        }

        for requirement in requirements {
            let name = inner
                .generator
                .name_for(&requirement.logical_name, requirement.max_length);
            inner.names.insert(requirement.logical_name.clone(), name);
        }
        Ok(())
    }

    /// Returns the name generated for a logical name.
    ///
    /// # Errors
    ///
    /// Returns `NamingError::NotRegistered` if nobody registered it.
    pub fn get_name(&self, logical_name: &str) -> Result<String, NamingError> {
        self.inner
            .lock()
            .names
            .get(logical_name)
            .cloned()
            .ok_or_else(|| NamingError::NotRegistered(logical_name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_name_has_requested_length() {
        let provider = ResourceNameProvider::new("lz-1");
        provider
            .register(&[NameRequirement::new("SOME_RESOURCE", 26)])
            .unwrap();

        assert_eq!(provider.get_name("SOME_RESOURCE").unwrap().len(), 26);
    }

    #[test]
    fn test_unregistered_name_fails() {
        let provider = ResourceNameProvider::new("lz-1");
        assert_eq!(
            provider.get_name("NOT_REGISTERED").unwrap_err(),
            NamingError::NotRegistered("NOT_REGISTERED".to_string())
        );
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let provider = ResourceNameProvider::new("lz-1");
        provider.register(&[NameRequirement::new("AKS", 25)]).unwrap();
        let err = provider
            .register(&[NameRequirement::new("AKS", 25)])
            .unwrap_err();
        assert_eq!(err, NamingError::AlreadyRegistered("AKS".to_string()));
    }

    #[test]
    fn test_rebuilt_provider_yields_same_names() {
        let requirements = [
            NameRequirement::new("VNET", MAX_VNET_NAME_LENGTH),
            NameRequirement::new("AKS", MAX_AKS_CLUSTER_NAME_LENGTH),
        ];
        let first = ResourceNameProvider::new("lz-1");
        let second = ResourceNameProvider::new("lz-1");
        first.register(&requirements).unwrap();
        second.register(&requirements).unwrap();

        assert_eq!(first.get_name("AKS").unwrap(), second.get_name("AKS").unwrap());
        assert_ne!(first.get_name("AKS").unwrap(), first.get_name("VNET").unwrap());
    }

    #[test]
    fn test_names_do_not_depend_on_registration_order() {
        let first = ResourceNameProvider::new("lz-1");
        first.register(&[NameRequirement::new("VNET", 20)]).unwrap();
        first.register(&[NameRequirement::new("AKS", 20)]).unwrap();

        let second = ResourceNameProvider::new("lz-1");
        second.register(&[NameRequirement::new("AKS", 20)]).unwrap();
        second.register(&[NameRequirement::new("VNET", 20)]).unwrap();

        assert_eq!(first.get_name("VNET").unwrap(), second.get_name("VNET").unwrap());
        assert_eq!(first.get_name("AKS").unwrap(), second.get_name("AKS").unwrap());
    }
}
