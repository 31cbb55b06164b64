//! Diff engine comparing desired configuration with the state file.
//!
//! Resources whose configuration hash is unchanged skip the field-level
//! comparison entirely.

use std::collections::HashSet;
use tracing::debug;

use crate::config::{ConfigHasher, DesiredResource, DockhandConfig};
use crate::error::Result;
use crate::resource::{FieldChange, ResourceKind};
use crate::state::{StateFile, StoredRecord};

/// Engine for computing diffs between desired and recorded state.
#[derive(Debug, Default)]
pub struct DiffEngine {
    /// Configuration hasher.
    hasher: ConfigHasher,
}

/// Difference for a single resource.
#[derive(Debug, Clone)]
pub struct ResourceDiff {
    /// Resource address.
    pub address: String,
    /// Resource kind.
    pub kind: ResourceKind,
    /// Type of difference.
    pub diff_type: DiffType,
    /// Changed configurable fields.
    pub changes: Vec<FieldChange>,
    /// Hash stored with the record, if any.
    pub old_hash: Option<String>,
    /// Hash of the desired configuration, if any.
    pub new_hash: Option<String>,
}

/// Type of difference detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffType {
    /// Declared but not in state.
    Create,
    /// In state with different configurable fields.
    Update,
    /// In state but no longer declared.
    Delete,
    /// In state and unchanged.
    NoChange,
}

/// Complete diff result.
#[derive(Debug, Default)]
pub struct DiffResult {
    /// All resource diffs, desired resources first in apply order.
    pub diffs: Vec<ResourceDiff>,
    /// Number of resources to create.
    pub creates: usize,
    /// Number of resources to update.
    pub updates: usize,
    /// Number of resources to delete.
    pub deletes: usize,
    /// Number of unchanged resources.
    pub unchanged: usize,
}

impl DiffEngine {
    /// Creates a new diff engine.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            hasher: ConfigHasher::new(),
        }
    }

    /// Computes the diff between the configuration and the state file.
    ///
    /// # Errors
    ///
    /// Returns an error if a record cannot be serialized.
    pub fn compute_diff(&self, config: &DockhandConfig, state: &StateFile) -> Result<DiffResult> {
        let mut diffs = Vec::new();
        let desired = config.desired_resources();

        for resource in &desired {
            diffs.push(self.compute_resource_diff(resource, state.get(&resource.address))?);
        }

        let declared: HashSet<&str> = desired.iter().map(|r| r.address.as_str()).collect();
        for stored in &state.records {
            if !declared.contains(stored.address.as_str()) {
                debug!("{} is no longer declared", stored.address);
                diffs.push(ResourceDiff {
                    address: stored.address.clone(),
                    kind: stored.kind(),
                    diff_type: DiffType::Delete,
                    changes: Vec::new(),
                    old_hash: Some(stored.config_hash.clone()),
                    new_hash: None,
                });
            }
        }

        let count = |t: DiffType| diffs.iter().filter(|d| d.diff_type == t).count();
        Ok(DiffResult {
            creates: count(DiffType::Create),
            updates: count(DiffType::Update),
            deletes: count(DiffType::Delete),
            unchanged: count(DiffType::NoChange),
            diffs,
        })
    }

    fn compute_resource_diff(
        &self,
        desired: &DesiredResource,
        stored: Option<&StoredRecord>,
    ) -> Result<ResourceDiff> {
        let new_hash = self.hasher.hash_resource(desired.record());
        let kind = desired.kind();
        let policy = kind.policy();
        let desired_value = desired.record().to_value()?;

        let Some(stored) = stored else {
            debug!("{} needs to be created", desired.address);
            let changes = policy.changed_fields(&desired_value, &serde_json::Value::Null);
            return Ok(ResourceDiff {
                address: desired.address.clone(),
                kind,
                diff_type: DiffType::Create,
                changes,
                old_hash: None,
                new_hash: Some(new_hash),
            });
        };

        let old_hash = Some(stored.config_hash.clone());
        if stored.config_hash == new_hash {
            debug!("{} configuration is unchanged", desired.address);
            return Ok(ResourceDiff {
                address: desired.address.clone(),
                kind,
                diff_type: DiffType::NoChange,
                changes: Vec::new(),
                old_hash,
                new_hash: Some(new_hash),
            });
        }

        let stored_value = stored.record.to_value()?;
        let changes = policy.changed_fields(&desired_value, &stored_value);
        let diff_type = if changes.is_empty() {
            DiffType::NoChange
        } else {
            DiffType::Update
        };
        debug!(
            "{} has {} changed field(s)",
            desired.address,
            changes.len()
        );

        Ok(ResourceDiff {
            address: desired.address.clone(),
            kind,
            diff_type,
            changes,
            old_hash,
            new_hash: Some(new_hash),
        })
    }
}

impl std::fmt::Display for DiffType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::NoChange => "no change",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{Container, Labels, ResourceRecord, Volume};

    fn config() -> DockhandConfig {
        let mut config = DockhandConfig::default();
        config.containers.insert(
            String::from("web"),
            Container {
                environment_id: String::from("1"),
                name: String::from("web"),
                image: String::from("nginx:1.25"),
                ..Default::default()
            },
        );
        config
    }

    fn applied(config: &DockhandConfig) -> StateFile {
        let hasher = ConfigHasher::new();
        let mut state = StateFile::new();
        for desired in config.desired_resources() {
            let hash = hasher.hash_resource(desired.record());
            let mut record = desired.record.clone();
            if let ResourceRecord::Container(c) = &mut record {
                c.id = String::from("c1");
                c.state = Some(String::from("running"));
            }
            state
                .upsert(StoredRecord::new(desired.address, hash, record))
                .expect("upsert");
        }
        state
    }

    #[test]
    fn test_new_resource_is_created() {
        let diff = DiffEngine::new()
            .compute_diff(&config(), &StateFile::new())
            .expect("diff");

        assert_eq!(diff.creates, 1);
        assert_eq!(diff.diffs[0].diff_type, DiffType::Create);
        assert!(diff.diffs[0].changes.iter().any(|c| c.field == "image"));
    }

    #[test]
    fn test_applied_resource_is_unchanged() {
        let config = config();
        let diff = DiffEngine::new()
            .compute_diff(&config, &applied(&config))
            .expect("diff");

        assert_eq!(diff.unchanged, 1);
        assert_eq!(diff.creates + diff.updates + diff.deletes, 0);
    }

    #[test]
    fn test_changed_field_is_update() {
        let original = config();
        let state = applied(&original);

        let mut changed = original;
        if let Some(web) = changed.containers.get_mut("web") {
            web.labels = Some(Labels::from([(String::from("tier"), String::from("front"))]));
        }

        let diff = DiffEngine::new().compute_diff(&changed, &state).expect("diff");

        assert_eq!(diff.updates, 1);
        assert_eq!(diff.diffs[0].changes.len(), 1);
        assert_eq!(diff.diffs[0].changes[0].field, "labels");
    }

    #[test]
    fn test_undeclared_record_is_deleted() {
        let config = config();
        let mut state = applied(&config);
        state
            .upsert(StoredRecord::new(
                "volume.old",
                "h",
                ResourceRecord::Volume(Volume {
                    id: String::from("v1"),
                    environment_id: String::from("1"),
                    name: String::from("old"),
                    ..Default::default()
                }),
            ))
            .expect("upsert");

        let diff = DiffEngine::new().compute_diff(&config, &state).expect("diff");

        assert_eq!(diff.deletes, 1);
        let delete = diff
            .diffs
            .iter()
            .find(|d| d.diff_type == DiffType::Delete)
            .expect("delete");
        assert_eq!(delete.address, "volume.old");
        assert_eq!(delete.kind, ResourceKind::Volume);
    }
}
