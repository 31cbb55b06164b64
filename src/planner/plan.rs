//! Deployment plan types and construction.
//!
//! A plan lists one action per address. Updates are classified with the
//! same replace-vs-update policy the engine applies, so `plan` shows what
//! `apply` will do.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::resource::{FieldChange, ResourceKind, UpdateStrategy};
use crate::state::StateFile;

use super::diff::{DiffResult, DiffType, ResourceDiff};

/// A complete deployment plan.
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentPlan {
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
    /// Configuration hash this plan is based on.
    pub config_hash: String,
    /// Planned actions in execution order.
    pub actions: Vec<PlannedAction>,
}

/// A single planned action.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedAction {
    /// Action type.
    pub action_type: ActionType,
    /// Resource address.
    pub address: String,
    /// Resource kind.
    pub kind: ResourceKind,
    /// Reason for this action.
    pub reason: String,
    /// Field changes, with sensitive values masked.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<FieldChange>,
    /// Configuration hash to record on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_hash: Option<String>,
}

/// Types of actions in a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Create a new object.
    Create,
    /// Update an object in place.
    Update,
    /// Delete and recreate an object.
    Replace,
    /// Re-read an object that cannot be updated.
    Refresh,
    /// Record new values without a remote call.
    Restate,
    /// Delete an object.
    Delete,
    /// Nothing to do.
    NoChange,
}

impl DeploymentPlan {
    /// Creates a plan from a diff result.
    ///
    /// Deletes run first, dependents before their dependencies; everything
    /// else follows in apply order.
    #[must_use]
    pub fn from_diff(diff: &DiffResult, config_hash: &str) -> Self {
        let mut deletes: Vec<&ResourceDiff> = diff
            .diffs
            .iter()
            .filter(|d| d.diff_type == DiffType::Delete)
            .collect();
        deletes.sort_by(|a, b| b.kind.cmp(&a.kind));

        let mut actions: Vec<PlannedAction> = deletes
            .into_iter()
            .map(|d| PlannedAction::delete(d.address.clone(), d.kind, "No longer declared in configuration"))
            .collect();

        actions.extend(
            diff.diffs
                .iter()
                .filter(|d| d.diff_type != DiffType::Delete)
                .map(PlannedAction::from_diff),
        );

        Self {
            created_at: Utc::now(),
            config_hash: config_hash.to_string(),
            actions,
        }
    }

    /// Creates a plan deleting every record in the state.
    #[must_use]
    pub fn destroy(state: &StateFile) -> Self {
        let mut records: Vec<_> = state.records.iter().collect();
        records.sort_by(|a, b| b.kind().cmp(&a.kind()));

        Self {
            created_at: Utc::now(),
            config_hash: String::new(),
            actions: records
                .into_iter()
                .map(|r| PlannedAction::delete(r.address.clone(), r.kind(), "Destroy requested"))
                .collect(),
        }
    }

    /// Returns true if no action changes anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.change_count() == 0
    }

    /// Returns the number of actions.
    #[must_use]
    pub const fn action_count(&self) -> usize {
        self.actions.len()
    }

    /// Returns the number of actions that change something.
    #[must_use]
    pub fn change_count(&self) -> usize {
        self.actions
            .iter()
            .filter(|a| a.action_type != ActionType::NoChange)
            .count()
    }

    /// Returns the number of actions of a type.
    #[must_use]
    pub fn count(&self, action_type: ActionType) -> usize {
        self.actions
            .iter()
            .filter(|a| a.action_type == action_type)
            .count()
    }
}

impl PlannedAction {
    fn delete(address: String, kind: ResourceKind, reason: &str) -> Self {
        Self {
            action_type: ActionType::Delete,
            address,
            kind,
            reason: reason.to_string(),
            changes: Vec::new(),
            new_hash: None,
        }
    }

    fn from_diff(diff: &ResourceDiff) -> Self {
        let policy = diff.kind.policy();
        let changes: Vec<FieldChange> = diff
            .changes
            .iter()
            .map(|change| policy.redact_change(change))
            .collect();
        let fields = || {
            diff.changes
                .iter()
                .map(|c| c.field.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };

        let (action_type, reason) = match diff.diff_type {
            DiffType::Create => (ActionType::Create, String::from("Declared in configuration")),
            DiffType::NoChange => (ActionType::NoChange, String::new()),
            DiffType::Delete => (ActionType::Delete, String::from("No longer declared in configuration")),
            DiffType::Update if policy.requires_replace(&diff.changes) => (
                ActionType::Replace,
                format!("Immutable field changed: {}", fields()),
            ),
            DiffType::Update => match policy.update {
                UpdateStrategy::InPlace => (ActionType::Update, format!("Changed: {}", fields())),
                UpdateStrategy::RefreshOnly => (
                    ActionType::Refresh,
                    format!("Changed but not updatable in place: {}", fields()),
                ),
                UpdateStrategy::Restate => (ActionType::Restate, format!("Changed: {}", fields())),
            },
        };

        Self {
            action_type,
            address: diff.address.clone(),
            kind: diff.kind,
            reason,
            changes,
            new_hash: diff.new_hash.clone(),
        }
    }

    /// Returns a human-readable description of the action.
    #[must_use]
    pub fn description(&self) -> String {
        match self.action_type {
            ActionType::Create => format!("Create {}", self.address),
            ActionType::Update => format!("Update {} in place", self.address),
            ActionType::Replace => format!("Replace {}", self.address),
            ActionType::Refresh => format!("Refresh {}", self.address),
            ActionType::Restate => format!("Restate {}", self.address),
            ActionType::Delete => format!("Delete {}", self.address),
            ActionType::NoChange => format!("No change for {}", self.address),
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Replace => "replace",
            Self::Refresh => "refresh",
            Self::Restate => "restate",
            Self::Delete => "delete",
            Self::NoChange => "no-op",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for PlannedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.action_type, self.address)?;
        if !self.reason.is_empty() {
            write!(f, " ({})", self.reason)?;
        }
        Ok(())
    }
}

impl std::fmt::Display for DeploymentPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "No changes required");
        }

        writeln!(f, "Plan ({} changes):", self.change_count())?;
        for action in self
            .actions
            .iter()
            .filter(|a| a.action_type != ActionType::NoChange)
        {
            writeln!(f, "  {action}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn diff(address: &str, kind: ResourceKind, diff_type: DiffType, fields: &[(&str, serde_json::Value)]) -> ResourceDiff {
        ResourceDiff {
            address: address.to_string(),
            kind,
            diff_type,
            changes: fields
                .iter()
                .map(|(field, value)| FieldChange {
                    field: (*field).to_string(),
                    old_value: None,
                    new_value: Some(value.clone()),
                })
                .collect(),
            old_hash: None,
            new_hash: Some(String::from("h")),
        }
    }

    fn plan(diffs: Vec<ResourceDiff>) -> DeploymentPlan {
        DeploymentPlan::from_diff(
            &DiffResult {
                diffs,
                ..Default::default()
            },
            "config",
        )
    }

    #[test]
    fn test_update_classification_follows_policy() {
        let plan = plan(vec![
            diff("container.web", ResourceKind::Container, DiffType::Update, &[("env", json!(["A=2"]))]),
            diff("volume.data", ResourceKind::Volume, DiffType::Update, &[("environment_id", json!("2"))]),
            diff("network.front", ResourceKind::Network, DiffType::Update, &[("labels", json!({}))]),
            diff("image_pull.nginx", ResourceKind::ImagePull, DiffType::Update, &[("registry", json!("r"))]),
            diff("image.alpine", ResourceKind::Image, DiffType::Update, &[("reference", json!("alpine:3.20"))]),
        ]);

        let types: Vec<ActionType> = plan.actions.iter().map(|a| a.action_type).collect();
        assert_eq!(
            types,
            vec![
                ActionType::Update,
                ActionType::Replace,
                ActionType::Refresh,
                ActionType::Restate,
                ActionType::Refresh
            ]
        );
    }

    #[test]
    fn test_deletes_run_first_in_reverse_order() {
        let plan = plan(vec![
            diff("container.web", ResourceKind::Container, DiffType::Create, &[]),
            diff("network.old", ResourceKind::Network, DiffType::Delete, &[]),
            diff("container.old", ResourceKind::Container, DiffType::Delete, &[]),
        ]);

        let addresses: Vec<&str> = plan.actions.iter().map(|a| a.address.as_str()).collect();
        assert_eq!(addresses, vec!["container.old", "network.old", "container.web"]);
        assert_eq!(plan.count(ActionType::Delete), 2);
    }

    #[test]
    fn test_plan_masks_secrets() {
        let plan = plan(vec![diff(
            "image_pull.private",
            ResourceKind::ImagePull,
            DiffType::Update,
            &[("auth_password", json!("s3cret"))],
        )]);

        let change = &plan.actions[0].changes[0];
        assert_eq!(change.new_value, Some(json!(crate::resource::REDACTED)));
        assert!(!plan.to_string().contains("s3cret"));
    }

    #[test]
    fn test_no_change_plan_is_empty() {
        let plan = plan(vec![diff("container.web", ResourceKind::Container, DiffType::NoChange, &[])]);

        assert!(plan.is_empty());
        assert_eq!(plan.action_count(), 1);
        assert_eq!(plan.to_string(), "No changes required");
    }
}
