//! Configuration hashing for change detection.
//!
//! A resource's hash covers only the fields the caller controls, so server
//! computed values and map ordering never change it.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::resource::ResourceRecord;

use super::spec::DockhandConfig;

/// Hasher for computing configuration hashes.
#[derive(Debug, Default)]
pub struct ConfigHasher;

impl ConfigHasher {
    /// Creates a new configuration hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes a hash of every declared resource and the provider endpoint.
    #[must_use]
    pub fn hash_config(&self, config: &DockhandConfig) -> String {
        let mut hasher = Sha256::new();

        hasher.update(config.provider.endpoint.as_bytes());
        for desired in config.desired_resources() {
            hasher.update(desired.address.as_bytes());
            hasher.update(self.hash_resource(desired.record()).as_bytes());
        }

        hex::encode(hasher.finalize())
    }

    /// Computes the hash of one desired record.
    #[must_use]
    pub fn hash_resource(&self, record: &ResourceRecord) -> String {
        let mut hasher = Sha256::new();
        hasher.update(record.kind().as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(canonical(record).as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Returns true if `record` still hashes to `hash`.
    #[must_use]
    pub fn matches(&self, record: &ResourceRecord, hash: &str) -> bool {
        !hash.is_empty() && self.hash_resource(record) == hash
    }

    /// Returns a short version of a hash for display.
    #[must_use]
    pub fn short_hash(hash: &str) -> &str {
        hash.get(..12).unwrap_or(hash)
    }
}

/// Serializes the configurable fields of a record with sorted keys.
fn canonical(record: &ResourceRecord) -> String {
    let Ok(Value::Object(fields)) = record.to_value() else {
        return String::new();
    };

    let configurable: Map<String, Value> = record
        .kind()
        .policy()
        .top_level()
        .filter(|(_, policy)| policy.is_configurable())
        .filter_map(|(name, _)| {
            fields
                .get(name)
                .filter(|v| !v.is_null())
                .map(|v| (name.to_string(), v.clone()))
        })
        .collect();

    Value::Object(configurable).to_string()
}
