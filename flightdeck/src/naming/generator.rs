//! Deterministic resource name generation.

use sha2::{Digest, Sha256};

/// Default maximum name length.
pub const MAX_NAME_LENGTH: usize = 66;
/// Storage account names.
pub const MAX_STORAGE_ACCOUNT_NAME_LENGTH: usize = 24;
/// Batch account names.
pub const MAX_BATCH_ACCOUNT_NAME_LENGTH: usize = 24;
/// Relay namespace names.
pub const MAX_RELAY_NS_NAME_LENGTH: usize = 50;
/// PostgreSQL server names.
pub const MAX_POSTGRESQL_SERVER_NAME_LENGTH: usize = 63;
/// Private DNS zone names.
pub const MAX_PRIVATE_DNS_ZONE_NAME_LENGTH: usize = 24;
/// User-assigned managed identity names.
pub const UAMI_NAME_LENGTH: usize = 20;
/// Log analytics workspace names.
pub const MAX_LOG_ANALYTICS_WORKSPACE_NAME_LENGTH: usize = 63;
/// Kubernetes cluster names. Kept well below the provider limit because the
/// node resource group name embeds it.
pub const MAX_AKS_CLUSTER_NAME_LENGTH: usize = 25;
/// Kubernetes agent pool names.
pub const MAX_AKS_AGENT_POOL_NAME_LENGTH: usize = 11;
/// Kubernetes DNS prefixes.
pub const MAX_AKS_DNS_PREFIX_NAME_LENGTH: usize = 54;
/// Virtual network names.
pub const MAX_VNET_NAME_LENGTH: usize = 64;

const PREFIX: &str = "lz";
const MIN_NAME_LENGTH: usize = 5;

/// Generates predictable names from a seed and a logical name.
///
/// The same (seed, logical name) pair always yields the same name, whatever
/// order names are asked for in.
#[derive(Debug, Clone)]
pub struct ResourceNameGenerator {
    seed: String,
}

impl ResourceNameGenerator {
    /// Creates a generator for a seed (usually the landing zone id).
    #[must_use]
    pub fn new(seed: impl Into<String>) -> Self {
        Self { seed: seed.into() }
    }

    /// Returns the name for `logical_name`, `length` characters long.
    ///
    /// Lengths below 5 are raised to 5, and the result never exceeds the
    /// prefix plus the full hash.
    #[must_use]
    pub fn name_for(&self, logical_name: &str, length: usize) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.seed.as_bytes());
        hasher.update([0]);
        hasher.update(logical_name.as_bytes());
        let hash = hex::encode(hasher.finalize());

        let end = length.max(MIN_NAME_LENGTH).min(hash.len() + PREFIX.len());
        format!("{PREFIX}{}", &hash[..end - PREFIX.len()])
    }

    /// Returns the name for `logical_name` at the default maximum length.
    #[must_use]
    pub fn default_name_for(&self, logical_name: &str) -> String {
        self.name_for(logical_name, MAX_NAME_LENGTH)
    }
}
