//! Plan executor.
//!
//! Runs plan actions one at a time through the [`Reconciler`], writing the
//! state file after every action so an interrupted apply loses nothing that
//! already happened remotely.

use tracing::{debug, error, info, warn};

use crate::config::DockhandConfig;
use crate::error::{ConfigError, Result};
use crate::gateway::Gateway;
use crate::reconciler::{Phase, ReconcileAction, Reconciler};
use crate::resource::{Action, FieldChange, ResourceRecord};
use crate::state::{HistoryEntry, StateFile, StateOperation, StateStore, StoredRecord};

use super::plan::{ActionType, DeploymentPlan, PlannedAction};

/// Executor for deployment plans.
pub struct PlanExecutor<'a, G> {
    /// Engine performing each lifecycle call.
    reconciler: &'a Reconciler<G>,
    /// Store written after each action.
    store: &'a dyn StateStore,
    /// Whether to continue after a failed action.
    continue_on_error: bool,
}

/// Result of executing a single action.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ActionResult {
    /// Resource address.
    pub address: String,
    /// Planned action type.
    pub action_type: ActionType,
    /// What the engine did, if it ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ReconcileAction>,
    /// Whether the action succeeded.
    pub success: bool,
    /// Whether the action was skipped after an earlier failure.
    pub skipped: bool,
    /// Drift reported by the engine, with sensitive values masked.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub drift: Vec<FieldChange>,
    /// Error message (if failed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of executing a whole plan.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ExecutionResult {
    /// Individual action results.
    pub results: Vec<ActionResult>,
    /// Number of successful actions.
    pub successful: usize,
    /// Number of failed actions.
    pub failed: usize,
    /// Number of skipped actions.
    pub skipped: usize,
    /// Whether every executed action succeeded.
    pub success: bool,
}

impl<'a, G: Gateway> PlanExecutor<'a, G> {
    /// Creates a new plan executor.
    #[must_use]
    pub const fn new(reconciler: &'a Reconciler<G>, store: &'a dyn StateStore) -> Self {
        Self {
            reconciler,
            store,
            continue_on_error: false,
        }
    }

    /// Sets whether to continue after a failed action.
    #[must_use]
    pub const fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Executes a plan against the state.
    ///
    /// # Errors
    ///
    /// Returns an error only if the state cannot be saved; action failures
    /// are reported in the result.
    pub async fn execute(
        &self,
        plan: &DeploymentPlan,
        config: &DockhandConfig,
        state: &mut StateFile,
    ) -> Result<ExecutionResult> {
        info!("Executing plan with {} change(s)", plan.change_count());

        let mut results = Vec::with_capacity(plan.actions.len());
        let mut halted = false;

        for action in &plan.actions {
            if halted {
                results.push(ActionResult::skipped(action));
                continue;
            }

            let result = self.execute_action(action, config, state).await;
            self.store.save(state).await?;

            if !result.success && !self.continue_on_error {
                halted = true;
            }
            results.push(result);
        }

        let execution = ExecutionResult::from_results(results);
        let operation = if plan.config_hash.is_empty() {
            StateOperation::Destroy
        } else {
            StateOperation::Apply
        };
        self.record_history(state, operation, &execution).await?;

        Ok(execution)
    }

    /// Reads every record in the state back from the server.
    ///
    /// Records whose object vanished are dropped.
    ///
    /// # Errors
    ///
    /// Returns an error only if the state cannot be saved.
    pub async fn refresh(&self, state: &mut StateFile) -> Result<ExecutionResult> {
        let records = state.records.clone();
        info!("Refreshing {} record(s)", records.len());

        let mut results = Vec::with_capacity(records.len());
        for stored in records {
            let mut result = ActionResult::new(&stored.address, ActionType::Refresh);
            match self
                .reconciler
                .reconcile_record(Phase::Read, None, Some(&stored.record))
                .await
            {
                Ok(outcome) => {
                    result.outcome = Some(outcome.action);
                    result.drift = redacted_drift(&stored.record, &outcome.drift);
                    match outcome.record {
                        Some(record) => keep(
                            state,
                            &mut result,
                            StoredRecord::new(&stored.address, &stored.config_hash, record),
                        ),
                        None => {
                            state.remove(&stored.address);
                        }
                    }
                }
                Err(e) => result.fail(&e.to_string()),
            }
            self.store.save(state).await?;
            results.push(result);
        }

        let execution = ExecutionResult::from_results(results);
        self.record_history(state, StateOperation::Refresh, &execution)
            .await?;
        Ok(execution)
    }

    /// Runs a lifecycle action on a managed object, then re-reads it.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is not in the state or the action
    /// fails.
    pub async fn run_action(
        &self,
        address: &str,
        action: Action,
        state: &mut StateFile,
    ) -> Result<Option<ResourceRecord>> {
        let stored = state
            .get(address)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownAddress {
                address: address.to_string(),
            })?;

        let outcome = self.reconciler.act_record(&stored.record, action).await;
        let entry = match &outcome {
            Ok(()) => HistoryEntry::new(StateOperation::Action, vec![address.to_string()]),
            Err(e) => HistoryEntry::failed(
                StateOperation::Action,
                vec![address.to_string()],
                &e.to_string(),
            ),
        };
        state.add_history(entry);
        outcome?;

        let refreshed = self
            .reconciler
            .reconcile_record(Phase::Read, None, Some(&stored.record))
            .await?;
        match &refreshed.record {
            Some(record) => state.upsert(StoredRecord::new(
                address,
                &stored.config_hash,
                record.clone(),
            ))?,
            None => {
                state.remove(address);
            }
        }
        self.store.save(state).await?;

        Ok(refreshed.record)
    }

    async fn execute_action(
        &self,
        action: &PlannedAction,
        config: &DockhandConfig,
        state: &mut StateFile,
    ) -> ActionResult {
        let mut result = ActionResult::new(&action.address, action.action_type);
        let stored = state.get(&action.address).cloned();
        let desired = config.resource(&action.address);
        let new_hash = action.new_hash.clone().unwrap_or_default();

        if action.action_type != ActionType::NoChange {
            info!("{}", action.description());
        }

        match (action.action_type, desired, stored) {
            (ActionType::NoChange, _, Some(stored)) => {
                if !new_hash.is_empty() && stored.config_hash != new_hash {
                    debug!("Recording new configuration hash for {}", action.address);
                    let record = StoredRecord::new(&action.address, &new_hash, stored.record);
                    keep(state, &mut result, record);
                }
            }
            (ActionType::NoChange, _, None) => {}

            (ActionType::Delete, _, None) => {
                debug!("{} is not in state, nothing to delete", action.address);
            }
            (ActionType::Delete, _, Some(stored)) => {
                match self
                    .reconciler
                    .reconcile_record(Phase::Delete, None, Some(&stored.record))
                    .await
                {
                    Ok(outcome) => {
                        result.outcome = Some(outcome.action);
                        state.remove(&action.address);
                    }
                    Err(e) => result.fail(&e.to_string()),
                }
            }

            (_, None, _) => result.fail(&format!(
                "{} is not declared in the configuration",
                action.address
            )),

            (_, Some(desired), None) => {
                match self
                    .reconciler
                    .reconcile_record(Phase::Create, Some(desired.record()), None)
                    .await
                {
                    Ok(outcome) => {
                        result.outcome = Some(outcome.action);
                        if let Some(record) = outcome.record {
                            let record = StoredRecord::new(&action.address, &new_hash, record);
                            keep(state, &mut result, record);
                        }
                    }
                    Err(e) => result.fail(&e.to_string()),
                }
            }

            (_, Some(desired), Some(stored)) => {
                match self
                    .reconciler
                    .reconcile_record(Phase::Update, Some(desired.record()), Some(&stored.record))
                    .await
                {
                    Ok(outcome) => {
                        result.outcome = Some(outcome.action);
                        result.drift = redacted_drift(&stored.record, &outcome.drift);
                        // A refresh did not apply the configuration; keep the
                        // old hash so the difference stays visible.
                        let hash = if outcome.action == ReconcileAction::Refreshed {
                            stored.config_hash.clone()
                        } else {
                            new_hash
                        };
                        match outcome.record {
                            Some(record) => {
                                let record = StoredRecord::new(&action.address, hash, record);
                                keep(state, &mut result, record);
                            }
                            None => {
                                state.remove(&action.address);
                            }
                        }
                    }
                    Err(e) if e.requires_resync() => {
                        error!("{}: {e}", action.address);
                        state.remove(&action.address);
                        self.resync(&action.address, desired.record(), state).await;
                        result.fail(&e.to_string());
                    }
                    Err(e) => result.fail(&e.to_string()),
                }
            }
        }

        if let Some(message) = &result.error {
            error!("{} failed: {message}", action.address);
        }
        result
    }

    /// Re-discovers an object after a partial replace.
    async fn resync(&self, address: &str, desired: &ResourceRecord, state: &mut StateFile) {
        match self.reconciler.resync_record(desired).await {
            Ok(outcome) => match outcome.record {
                Some(record) => {
                    info!("Recovered {address} as {}", record.id());
                    // An empty hash forces a field comparison on the next plan.
                    if let Err(e) = state.upsert(StoredRecord::new(address, "", record)) {
                        warn!("Could not record recovered {address}: {e}");
                    }
                }
                None => warn!("{address} does not exist remotely; it will be created on the next apply"),
            },
            Err(e) => warn!("Could not resynchronize {address}: {e}"),
        }
    }

    async fn record_history(
        &self,
        state: &mut StateFile,
        operation: StateOperation,
        execution: &ExecutionResult,
    ) -> Result<()> {
        let resources: Vec<String> = execution
            .results
            .iter()
            .filter(|r| r.action_type != ActionType::NoChange && !r.skipped)
            .map(|r| r.address.clone())
            .collect();
        if resources.is_empty() {
            return Ok(());
        }

        let entry = if execution.success {
            HistoryEntry::new(operation, resources)
        } else {
            HistoryEntry::failed(
                operation,
                resources,
                &format!("{} action(s) failed", execution.failed),
            )
        };
        state.add_history(entry);
        self.store.save(state).await
    }
}

impl<G> std::fmt::Debug for PlanExecutor<'_, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanExecutor")
            .field("store", &self.store.backend_type())
            .field("continue_on_error", &self.continue_on_error)
            .finish_non_exhaustive()
    }
}

fn keep(state: &mut StateFile, result: &mut ActionResult, record: StoredRecord) {
    if let Err(e) = state.upsert(record) {
        result.fail(&e.to_string());
    }
}

fn redacted_drift(record: &ResourceRecord, drift: &[FieldChange]) -> Vec<FieldChange> {
    let policy = record.kind().policy();
    drift.iter().map(|c| policy.redact_change(c)).collect()
}

impl ActionResult {
    fn new(address: &str, action_type: ActionType) -> Self {
        Self {
            address: address.to_string(),
            action_type,
            outcome: None,
            success: true,
            skipped: false,
            drift: Vec::new(),
            error: None,
        }
    }

    fn skipped(action: &PlannedAction) -> Self {
        Self {
            success: false,
            skipped: true,
            error: Some(String::from("Skipped after an earlier failure")),
            ..Self::new(&action.address, action.action_type)
        }
    }

    fn fail(&mut self, message: &str) {
        self.success = false;
        self.error = Some(message.to_string());
    }
}

impl ExecutionResult {
    fn from_results(results: Vec<ActionResult>) -> Self {
        let successful = results.iter().filter(|r| r.success).count();
        let skipped = results.iter().filter(|r| r.skipped).count();
        let failed = results.len() - successful - skipped;
        Self {
            results,
            successful,
            failed,
            skipped,
            success: failed == 0,
        }
    }

    /// Returns true if every action ran and succeeded.
    #[must_use]
    pub const fn all_successful(&self) -> bool {
        self.success && self.skipped == 0
    }
}

impl std::fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} succeeded, {} failed, {} skipped",
            self.successful, self.failed, self.skipped
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigHasher;
    use crate::error::GatewayError;
    use crate::gateway::MockGateway;
    use crate::planner::DiffEngine;
    use crate::resource::{Container, ResourceKind, Volume};
    use crate::state::LocalStateStore;
    use serde_json::json;
    use tempfile::TempDir;

    fn config() -> DockhandConfig {
        let mut config = DockhandConfig::default();
        config.provider.endpoint = String::from("http://dockhand.test");
        config.volumes.insert(
            String::from("data"),
            Volume {
                environment_id: String::from("1"),
                name: String::from("data"),
                ..Default::default()
            },
        );
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

    fn plan(config: &DockhandConfig, state: &StateFile) -> DeploymentPlan {
        let diff = DiffEngine::new().compute_diff(config, state).expect("diff");
        DeploymentPlan::from_diff(&diff, &ConfigHasher::new().hash_config(config))
    }

    #[tokio::test]
    async fn test_apply_creates_in_order_and_saves_state() {
        let mut gateway = MockGateway::new();
        let mut seq = mockall::Sequence::new();
        gateway
            .expect_create()
            .withf(|kind, _, _| *kind == ResourceKind::Volume)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(json!({"id": "v1", "name": "data", "mountpoint": "/data"})));
        gateway
            .expect_create()
            .withf(|kind, _, _| *kind == ResourceKind::Container)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(json!({"id": "c1", "name": "web", "image": "nginx:1.25"})));

        let temp = TempDir::new().expect("temp dir");
        let store = LocalStateStore::in_dir(temp.path());
        let reconciler = Reconciler::new(gateway);
        let config = config();
        let mut state = StateFile::new();

        let result = PlanExecutor::new(&reconciler, &store)
            .execute(&plan(&config, &state), &config, &mut state)
            .await
            .expect("execute");

        assert!(result.all_successful());
        assert_eq!(state.addresses(), vec!["volume.data", "container.web"]);
        assert_eq!(state.history.len(), 1);

        let saved = store.load().await.expect("load").expect("state");
        assert_eq!(saved.records.len(), 2);

        let second = plan(&config, &state);
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_failure_halts_remaining_actions() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_create()
            .times(1)
            .returning(|_, _, _| Err(GatewayError::from_status(500, "boom")));

        let temp = TempDir::new().expect("temp dir");
        let store = LocalStateStore::in_dir(temp.path());
        let reconciler = Reconciler::new(gateway);
        let config = config();
        let mut state = StateFile::new();

        let result = PlanExecutor::new(&reconciler, &store)
            .execute(&plan(&config, &state), &config, &mut state)
            .await
            .expect("execute");

        assert!(!result.success);
        assert_eq!(result.failed, 1);
        assert_eq!(result.skipped, 1);
        assert!(state.records.is_empty());
        assert_eq!(
            result.results[0].error.as_deref(),
            Some("create volume failed: 500 boom")
        );
    }

    #[tokio::test]
    async fn test_partial_replace_resyncs_state() {
        let mut gateway = MockGateway::new();
        gateway.expect_delete().times(1).returning(|_, _, _| Ok(()));
        gateway
            .expect_create()
            .times(1)
            .returning(|_, _, _| Err(GatewayError::transport("connection reset")));
        gateway
            .expect_list()
            .times(1)
            .returning(|_, _| Ok(vec![json!({"id": "v2", "name": "data"})]));

        let temp = TempDir::new().expect("temp dir");
        let store = LocalStateStore::in_dir(temp.path());
        let reconciler = Reconciler::new(gateway);

        let mut config = DockhandConfig::default();
        config.volumes.insert(
            String::from("data"),
            Volume {
                environment_id: String::from("2"),
                name: String::from("data"),
                ..Default::default()
            },
        );
        let mut state = StateFile::new();
        state
            .upsert(StoredRecord::new(
                "volume.data",
                "old",
                ResourceRecord::Volume(Volume {
                    id: String::from("v1"),
                    environment_id: String::from("1"),
                    name: String::from("data"),
                    ..Default::default()
                }),
            ))
            .expect("upsert");

        let plan = plan(&config, &state);
        assert_eq!(plan.actions[0].action_type, ActionType::Replace);

        let result = PlanExecutor::new(&reconciler, &store)
            .execute(&plan, &config, &mut state)
            .await
            .expect("execute");

        assert!(!result.success);
        let stored = state.get("volume.data").expect("resynced");
        assert_eq!(stored.record.id(), "v2");
        assert_eq!(stored.record.environment_id(), "2");
        assert!(stored.config_hash.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_drops_vanished_records() {
        let mut gateway = MockGateway::new();
        gateway.expect_get().times(1).returning(|_, _, _| {
            Err(GatewayError::NotFound {
                body: String::from("gone"),
            })
        });

        let temp = TempDir::new().expect("temp dir");
        let store = LocalStateStore::in_dir(temp.path());
        let reconciler = Reconciler::new(gateway);
        let mut state = StateFile::new();
        state
            .upsert(StoredRecord::new(
                "volume.data",
                "h",
                ResourceRecord::Volume(Volume {
                    id: String::from("v1"),
                    environment_id: String::from("1"),
                    name: String::from("data"),
                    ..Default::default()
                }),
            ))
            .expect("upsert");

        let result = PlanExecutor::new(&reconciler, &store)
            .refresh(&mut state)
            .await
            .expect("refresh");

        assert!(result.success);
        assert_eq!(result.results[0].outcome, Some(ReconcileAction::Vanished));
        assert!(state.records.is_empty());
    }

    #[tokio::test]
    async fn test_run_action_on_unknown_address() {
        let gateway = MockGateway::new();
        let temp = TempDir::new().expect("temp dir");
        let store = LocalStateStore::in_dir(temp.path());
        let reconciler = Reconciler::new(gateway);
        let mut state = StateFile::new();

        let err = PlanExecutor::new(&reconciler, &store)
            .run_action("container.web", Action::Start, &mut state)
            .await
            .expect_err("should fail");

        assert!(err.to_string().contains("container.web"));
    }
}
