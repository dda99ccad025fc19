//! In-memory cloud provider.

use crate::provider::{codes, ProviderError};
use crate::reconcile::{ExistingResource, ProvisioningState};
use crate::state::ResourceRecord;
use crate::template::{CreateRequest, ResourceProvider};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone)]
struct Stored {
    record: ResourceRecord,
    /// Fetches left before the resource reports `Succeeded`.
    pending_fetches: u32,
}

#[derive(Debug, Default)]
struct CloudState {
    resources: HashMap<String, Stored>,
    create_failures: HashMap<String, VecDeque<ProviderError>>,
    delete_failures: HashMap<String, VecDeque<ProviderError>>,
    lost_responses: HashMap<String, u32>,
    provisioning_delay: HashMap<String, u32>,
    create_calls: HashMap<String, usize>,
    delete_calls: HashMap<String, usize>,
}

/// A `ResourceProvider` backed by a map, keyed by resource id.
///
/// Resource ids have the form `/providers/<type>/<name>`. Creating a name
/// that already exists returns a 409 `Conflict`, deleting an unknown id a
/// 404 `ResourceNotFound`.
#[derive(Debug, Default)]
pub struct FakeCloud {
    state: Mutex<CloudState>,
}

impl FakeCloud {
    /// Creates an empty cloud.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the id a resource gets.
    #[must_use]
    pub fn resource_id(resource_type: &str, name: &str) -> String {
        format!("/providers/{resource_type}/{name}")
    }

    /// Fails the next `times` creates of `resource_type` with `error`.
    pub fn fail_creates(&self, resource_type: &str, times: usize, error: &ProviderError) {
        self.state
            .lock()
            .create_failures
            .entry(resource_type.to_string())
            .or_default()
            .extend(std::iter::repeat(error.clone()).take(times));
    }

    /// Fails the next `times` deletes of `resource_type` with `error`.
    pub fn fail_deletes(&self, resource_type: &str, times: usize, error: &ProviderError) {
        self.state
            .lock()
            .delete_failures
            .entry(resource_type.to_string())
            .or_default()
            .extend(std::iter::repeat(error.clone()).take(times));
    }

    /// The next `times` creates of `resource_type` succeed remotely but
    /// report a 503 to the caller.
    pub fn lose_create_responses(&self, resource_type: &str, times: u32) {
        self.state
            .lock()
            .lost_responses
            .insert(resource_type.to_string(), times);
    }

    /// New resources of `resource_type` report `InProgress` for `fetches`
    /// lookups before reporting `Succeeded`.
    pub fn provision_slowly(&self, resource_type: &str, fetches: u32) {
        self.state
            .lock()
            .provisioning_delay
            .insert(resource_type.to_string(), fetches);
    }

    /// Adds a resource directly, as if created out of band.
    pub fn insert(&self, record: ResourceRecord) {
        self.state.lock().resources.insert(
            record.resource_id.clone(),
            Stored {
                record,
                pending_fetches: 0,
            },
        );
    }

    /// Number of create calls for `resource_type`, failed ones included.
    #[must_use]
    pub fn create_calls(&self, resource_type: &str) -> usize {
        self.state
            .lock()
            .create_calls
            .get(resource_type)
            .copied()
            .unwrap_or(0)
    }

    /// Number of delete calls for `resource_type`, failed ones included.
    #[must_use]
    pub fn delete_calls(&self, resource_type: &str) -> usize {
        self.state
            .lock()
            .delete_calls
            .get(resource_type)
            .copied()
            .unwrap_or(0)
    }

    /// Ids of all live resources of `resource_type`.
    #[must_use]
    pub fn resources_of(&self, resource_type: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .state
            .lock()
            .resources
            .values()
            .filter(|s| s.record.resource_type == resource_type)
            .map(|s| s.record.resource_id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Number of live resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().resources.len()
    }

    /// Returns true if no resources exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().resources.is_empty()
    }

    fn id_for(request: &CreateRequest) -> String {
        let name = request
            .primary_name()
            .unwrap_or(request.resource_type.as_str());
        Self::resource_id(&request.resource_type, name)
    }

    fn type_of(resource_id: &str) -> &str {
        resource_id
            .strip_prefix("/providers/")
            .and_then(|rest| rest.split('/').next())
            .unwrap_or("")
    }
}

fn service_unavailable() -> ProviderError {
    ProviderError::new("ServiceUnavailable", "The service is temporarily unavailable.")
        .with_status(503)
}

#[async_trait]
impl ResourceProvider for FakeCloud {
    async fn create(&self, request: &CreateRequest) -> Result<ResourceRecord, ProviderError> {
        let mut state = self.state.lock();
        let resource_type = request.resource_type.clone();
        *state.create_calls.entry(resource_type.clone()).or_default() += 1;

        if let Some(error) = state
            .create_failures
            .get_mut(&resource_type)
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }

        let id = Self::id_for(request);
        if state.resources.contains_key(&id) {
            return Err(ProviderError::new(
                codes::CONFLICT,
                format!("Resource {id} already exists."),
            )
            .with_status(409));
        }

        let mut record = ResourceRecord::new(&id, &resource_type);
        if let Some(name) = request.primary_name() {
            record = record.with_name(name);
        }
        if let Ok(Some(region)) = request.inputs.get_optional::<String>("region") {
            record = record.with_region(region);
        }
        let pending_fetches = state
            .provisioning_delay
            .get(&resource_type)
            .copied()
            .unwrap_or(0);
        state.resources.insert(
            id,
            Stored {
                record: record.clone(),
                pending_fetches,
            },
        );

        if let Some(lost) = state.lost_responses.get_mut(&resource_type) {
            if *lost > 0 {
                *lost -= 1;
                return Err(service_unavailable());
            }
        }
        Ok(record)
    }

    async fn fetch_existing(
        &self,
        request: &CreateRequest,
    ) -> Result<Option<ExistingResource>, ProviderError> {
        let mut state = self.state.lock();
        let Some(stored) = state.resources.get_mut(&Self::id_for(request)) else {
            return Ok(None);
        };

        let provisioning = if stored.pending_fetches == 0 {
            ProvisioningState::Succeeded
        } else {
            stored.pending_fetches -= 1;
            ProvisioningState::InProgress
        };
        Ok(Some(ExistingResource::new(stored.record.clone(), provisioning)))
    }

    async fn delete(&self, resource_id: &str) -> Result<(), ProviderError> {
        let mut state = self.state.lock();
        let resource_type = Self::type_of(resource_id).to_string();
        *state.delete_calls.entry(resource_type.clone()).or_default() += 1;

        if let Some(error) = state
            .delete_failures
            .get_mut(&resource_type)
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }

        match state.resources.remove(resource_id) {
            Some(_) => Ok(()),
            None => Err(ProviderError::new(
                codes::RESOURCE_NOT_FOUND,
                format!("Resource {resource_id} was not found."),
            )
            .with_status(404)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str) -> CreateRequest {
        let mut request = CreateRequest::new("VNET");
        request.names.insert("VNET".into(), name.into());
        request
    }

    #[tokio::test]
    async fn test_create_then_conflict() {
        let cloud = FakeCloud::new();
        let record = cloud.create(&request("lzvnet")).await.unwrap();
        assert_eq!(record.resource_id, "/providers/VNET/lzvnet");

        let err = cloud.create(&request("lzvnet")).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(cloud.create_calls("VNET"), 2);
        assert_eq!(cloud.len(), 1);
    }

    #[tokio::test]
    async fn test_slow_provisioning() {
        let cloud = FakeCloud::new();
        cloud.provision_slowly("VNET", 1);
        cloud.create(&request("lzvnet")).await.unwrap();

        let first = cloud.fetch_existing(&request("lzvnet")).await.unwrap().unwrap();
        let second = cloud.fetch_existing(&request("lzvnet")).await.unwrap().unwrap();
        assert_eq!(first.state, ProvisioningState::InProgress);
        assert_eq!(second.state, ProvisioningState::Succeeded);
    }

    #[tokio::test]
    async fn test_delete_unknown_is_not_found() {
        let cloud = FakeCloud::new();
        let err = cloud.delete("/providers/VNET/missing").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(cloud.delete_calls("VNET"), 1);
    }

    #[tokio::test]
    async fn test_lost_response_still_creates() {
        let cloud = FakeCloud::new();
        cloud.lose_create_responses("VNET", 1);
        let err = cloud.create(&request("lzvnet")).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(cloud.resources_of("VNET"), vec!["/providers/VNET/lzvnet".to_string()]);
    }
}
