//! Reconciliation engine.
//!
//! One generic state machine drives Create, Read, Update and Delete for a
//! single record per call. Kind-specific behaviour comes entirely from the
//! static [`KindPolicy`]. The engine keeps no state between calls and never
//! retries; each phase performs at most one Gateway call, two for a
//! replace.

mod merge;

use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::error::{GatewayError, Operation, ReconcileError};
use crate::gateway::{Gateway, ImagePullRequest};
use crate::resource::{
    Action, ComposeStack, Container, CreateStrategy, Environment, FieldChange, FieldPolicy, Image,
    ImagePull, KindPolicy, Network, ReadStrategy, Resource, ResourceKind, ResourceRecord,
    UpdateStrategy, Volume, from_object, is_non_empty, redacted, remove_path, to_object,
};

pub use merge::drift_merge;

/// Status written to image pull records after a successful pull.
pub const PULL_SUCCESS: &str = "success";

/// Lifecycle phase requested by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Bring a desired record into existence.
    Create,
    /// Refresh a persisted record from the server.
    Read,
    /// Converge a persisted record towards a desired one.
    Update,
    /// Remove a persisted record's object.
    Delete,
}

/// What the engine did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileAction {
    /// A new object was created.
    Created,
    /// The record was refreshed by a read.
    Read,
    /// The object was updated in place.
    Updated,
    /// The object was deleted and recreated.
    Replaced,
    /// No mutation endpoint; the record was re-read and drift reported.
    Refreshed,
    /// Desired values were adopted into state without a remote call.
    Restated,
    /// The object was deleted (or was already gone).
    Deleted,
    /// The object no longer exists; the record should be dropped.
    Vanished,
    /// Desired and persisted already agree.
    Unchanged,
}

/// Outcome of one lifecycle call.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation<R> {
    /// New persisted record; `None` means the record must be removed.
    pub record: Option<R>,
    /// Action taken.
    pub action: ReconcileAction,
    /// Field differences observed or applied.
    pub drift: Vec<FieldChange>,
}

impl<R> Reconciliation<R> {
    fn new(record: Option<R>, action: ReconcileAction, drift: Vec<FieldChange>) -> Self {
        Self {
            record,
            action,
            drift,
        }
    }

    /// Maps the record type.
    pub fn map<T>(self, f: impl FnOnce(R) -> T) -> Reconciliation<T> {
        Reconciliation {
            record: self.record.map(f),
            action: self.action,
            drift: self.drift,
        }
    }

    /// Returns true if the call changed anything remotely.
    #[must_use]
    pub const fn mutated(&self) -> bool {
        matches!(
            self.action,
            ReconcileAction::Created
                | ReconcileAction::Updated
                | ReconcileAction::Replaced
                | ReconcileAction::Deleted
        )
    }
}

/// Reconciliation engine over a Gateway.
#[derive(Debug)]
pub struct Reconciler<G> {
    /// Gateway used for all remote calls.
    gateway: G,
}

type Outcome<R> = Result<Reconciliation<R>, ReconcileError>;

impl<G: Gateway> Reconciler<G> {
    /// Creates a new reconciler.
    #[must_use]
    pub const fn new(gateway: G) -> Self {
        Self { gateway }
    }

    /// Returns the underlying Gateway.
    #[must_use]
    pub const fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Runs one lifecycle phase.
    ///
    /// `desired` is required for Create and Update, `persisted` for Read,
    /// Update and Delete.
    ///
    /// # Errors
    ///
    /// Returns an error if a required record is missing, a record violates
    /// the data model, or the Gateway call fails.
    pub async fn reconcile<R: Resource>(
        &self,
        phase: Phase,
        desired: Option<&R>,
        persisted: Option<&R>,
    ) -> Outcome<R> {
        match phase {
            Phase::Create => self.create(required(phase, desired, "desired")?).await,
            Phase::Read => self.read(required(phase, persisted, "persisted")?).await,
            Phase::Update => {
                let desired = required(phase, desired, "desired")?;
                let persisted = required(phase, persisted, "persisted")?;
                self.update(desired, persisted).await
            }
            Phase::Delete => self.delete(required(phase, persisted, "persisted")?).await,
        }
    }

    /// Creates the object described by `desired`.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is incomplete or the Gateway rejects
    /// the call.
    pub async fn create<R: Resource>(&self, desired: &R) -> Outcome<R> {
        let policy = R::policy();
        let desired_value = to_object(R::KIND, desired)?;
        check_required(policy, &desired_value)?;
        let env = desired.environment_id();

        info!("Creating {} '{}'", R::KIND, desired.name());

        let (observed, id) = match policy.create {
            CreateStrategy::Post => {
                let payload = policy.create_payload(&desired_value);
                debug!("Create payload: {}", redacted(R::KIND, &payload));
                let observed = self
                    .gateway
                    .create(R::KIND, env, &payload)
                    .await
                    .map_err(|e| ReconcileError::from_gateway(Operation::Create, R::KIND, e))?;
                let id = response_id(R::KIND, &observed)?;
                (observed, id)
            }
            CreateStrategy::Adopt => {
                let reference = string_field(&desired_value, "reference");
                let observed = self
                    .gateway
                    .get(R::KIND, env, reference)
                    .await
                    .map_err(|e| ReconcileError::from_gateway(Operation::Create, R::KIND, e))?;
                let id = response_id(R::KIND, &observed)?;
                (observed, id)
            }
            CreateStrategy::Pull => {
                let pull: ImagePull = from_object(R::KIND, desired_value.clone())?;
                let request = ImagePullRequest::from(&pull);
                debug!("Pulling image '{}' into environment '{env}'", request.image);
                self.gateway
                    .pull_image(env, &request)
                    .await
                    .map_err(|e| ReconcileError::from_gateway(Operation::Create, R::KIND, e))?;
                (pulled(&pull.image), pull.image)
            }
        };

        let base = strip_computed(policy, &desired_value);
        let mut merged = drift_merge(policy, &observed, &base);
        merged["id"] = Value::String(id);
        let record: R = from_object(R::KIND, merged)?;

        info!("Created {} '{}' ({})", R::KIND, record.name(), record.id());
        Ok(Reconciliation::new(
            Some(record),
            ReconcileAction::Created,
            Vec::new(),
        ))
    }

    /// Refreshes `persisted` from the server.
    ///
    /// A missing object is reported as [`ReconcileAction::Vanished`].
    ///
    /// # Errors
    ///
    /// Returns an error if the record has no id or the Gateway call fails
    /// for another reason than a 404.
    pub async fn read<R: Resource>(&self, persisted: &R) -> Outcome<R> {
        let policy = R::policy();
        require_id(persisted)?;
        let persisted_value = to_object(R::KIND, persisted)?;

        debug!("Reading {} '{}' ({})", R::KIND, persisted.name(), persisted.id());

        let Some(observed) = self.observe(policy, persisted, &persisted_value).await? else {
            info!("{} '{}' no longer exists", R::KIND, persisted.name());
            return Ok(Reconciliation::new(None, ReconcileAction::Vanished, Vec::new()));
        };

        let merged = drift_merge(policy, &observed, &persisted_value);
        let drift = policy.changed_fields(&merged, &persisted_value);
        if !drift.is_empty() {
            info!(
                "{} '{}' drifted in {} field(s)",
                R::KIND,
                persisted.name(),
                drift.len()
            );
        }

        let record: R = from_object(R::KIND, merged)?;
        Ok(Reconciliation::new(Some(record), ReconcileAction::Read, drift))
    }

    /// Converges `persisted` towards `desired`.
    ///
    /// # Errors
    ///
    /// Returns an error if a Gateway call fails. A replace whose delete
    /// succeeded but whose create failed yields
    /// [`ReconcileError::PartialReplaceFailure`].
    pub async fn update<R: Resource>(&self, desired: &R, persisted: &R) -> Outcome<R> {
        let policy = R::policy();
        require_id(persisted)?;
        let desired_value = to_object(R::KIND, desired)?;
        let persisted_value = to_object(R::KIND, persisted)?;

        let changes = policy.changed_fields(&desired_value, &persisted_value);
        if changes.is_empty() {
            debug!("{} '{}' is up to date", R::KIND, persisted.name());
            return Ok(Reconciliation::new(
                Some(persisted.clone()),
                ReconcileAction::Unchanged,
                Vec::new(),
            ));
        }

        let fields: Vec<&str> = changes.iter().map(|c| c.field.as_str()).collect();
        debug!("{} '{}' changed fields: {fields:?}", R::KIND, persisted.name());

        if policy.requires_replace(&changes) {
            return self.replace(desired, persisted, changes).await;
        }

        match policy.update {
            UpdateStrategy::InPlace => {
                let payload = policy.update_payload(&changes);
                debug!("Update payload: {}", redacted(R::KIND, &payload));
                let observed = self
                    .gateway
                    .update(R::KIND, persisted.environment_id(), persisted.id(), &payload)
                    .await
                    .map_err(|e| ReconcileError::from_gateway(Operation::Update, R::KIND, e))?;

                let base = overlay(policy, &persisted_value, &desired_value);
                let merged = drift_merge(policy, &observed, &base);
                let record: R = from_object(R::KIND, merged)?;

                info!("Updated {} '{}' ({})", R::KIND, record.name(), record.id());
                Ok(Reconciliation::new(
                    Some(record),
                    ReconcileAction::Updated,
                    changes,
                ))
            }
            UpdateStrategy::RefreshOnly => {
                let Some(observed) = self.observe(policy, persisted, &persisted_value).await?
                else {
                    info!("{} '{}' no longer exists", R::KIND, persisted.name());
                    return Ok(Reconciliation::new(None, ReconcileAction::Vanished, Vec::new()));
                };

                let merged = drift_merge(policy, &observed, &persisted_value);
                let drift = policy.changed_fields(&desired_value, &merged);
                if !drift.is_empty() {
                    info!(
                        "{} '{}' cannot be updated in place; {} field(s) differ from configuration",
                        R::KIND,
                        persisted.name(),
                        drift.len()
                    );
                }

                let record: R = from_object(R::KIND, merged)?;
                Ok(Reconciliation::new(
                    Some(record),
                    ReconcileAction::Refreshed,
                    drift,
                ))
            }
            UpdateStrategy::Restate => {
                let merged = overlay(policy, &persisted_value, &desired_value);
                let record: R = from_object(R::KIND, merged)?;

                info!("Restated {} '{}'", R::KIND, record.name());
                Ok(Reconciliation::new(
                    Some(record),
                    ReconcileAction::Restated,
                    changes,
                ))
            }
        }
    }

    /// Deletes the object behind `persisted`. A 404 counts as success.
    ///
    /// # Errors
    ///
    /// Returns an error if the record has no id or the Gateway call fails.
    pub async fn delete<R: Resource>(&self, persisted: &R) -> Outcome<R> {
        require_id(persisted)?;
        info!("Deleting {} '{}' ({})", R::KIND, persisted.name(), persisted.id());
        self.remove(persisted).await?;
        Ok(Reconciliation::new(None, ReconcileAction::Deleted, Vec::new()))
    }

    /// Runs a lifecycle action on the object behind `record`.
    ///
    /// # Errors
    ///
    /// Returns an error if the kind does not support the action, the record
    /// has no id, or the Gateway call fails.
    pub async fn act<R: Resource>(&self, record: &R, action: Action) -> Result<(), ReconcileError> {
        if !R::policy().supports(action) {
            return Err(ReconcileError::UnsupportedAction {
                kind: R::KIND,
                action: action.to_string(),
            });
        }
        require_id(record)?;

        info!("Running '{action}' on {} '{}'", R::KIND, record.name());
        self.gateway
            .action(R::KIND, record.environment_id(), record.id(), action)
            .await
            .map_err(|e| ReconcileError::from_gateway(Operation::Action, R::KIND, e))
    }

    /// Re-discovers the object `desired` describes after an ambiguous
    /// failure, without knowing its id.
    ///
    /// Returns [`ReconcileAction::Vanished`] if nothing matches.
    ///
    /// # Errors
    ///
    /// Returns an error if the Gateway call fails.
    pub async fn resync<R: Resource>(&self, desired: &R) -> Outcome<R> {
        let policy = R::policy();
        let desired_value = to_object(R::KIND, desired)?;
        let base = strip_computed(policy, &desired_value);
        let env = desired.environment_id();

        info!("Resynchronizing {} '{}'", R::KIND, desired.name());

        let found = match policy.create {
            CreateStrategy::Post => self
                .gateway
                .list(R::KIND, env)
                .await
                .map_err(|e| ReconcileError::from_gateway(Operation::Read, R::KIND, e))?
                .into_iter()
                .find(|object| string_field(object, "name") == desired.name())
                .map(|object| response_id(R::KIND, &object).map(|id| (object, id)))
                .transpose()?,
            CreateStrategy::Adopt => {
                let reference = string_field(&desired_value, "reference");
                match self.gateway.get(R::KIND, env, reference).await {
                    Ok(object) => Some((object.clone(), response_id(R::KIND, &object)?)),
                    Err(GatewayError::NotFound { .. }) => None,
                    Err(e) => return Err(ReconcileError::from_gateway(Operation::Read, R::KIND, e)),
                }
            }
            CreateStrategy::Pull => {
                let image = string_field(&desired_value, "image");
                self.find_image(env, image)
                    .await?
                    .map(|_| (pulled(image), image.to_string()))
            }
        };

        let Some((observed, id)) = found else {
            info!("{} '{}' does not exist remotely", R::KIND, desired.name());
            return Ok(Reconciliation::new(None, ReconcileAction::Vanished, Vec::new()));
        };

        let mut merged = drift_merge(policy, &observed, &base);
        merged["id"] = Value::String(id);
        let record: R = from_object(R::KIND, merged)?;
        Ok(Reconciliation::new(Some(record), ReconcileAction::Read, Vec::new()))
    }

    /// Runs one lifecycle phase on untyped records.
    ///
    /// # Errors
    ///
    /// Returns an error if the records are of different kinds or the phase
    /// fails.
    pub async fn reconcile_record(
        &self,
        phase: Phase,
        desired: Option<&ResourceRecord>,
        persisted: Option<&ResourceRecord>,
    ) -> Outcome<ResourceRecord> {
        match record_kind(desired, persisted)? {
            ResourceKind::Container => self.typed::<Container>(phase, desired, persisted).await,
            ResourceKind::ComposeStack => {
                self.typed::<ComposeStack>(phase, desired, persisted).await
            }
            ResourceKind::Environment => {
                self.typed::<Environment>(phase, desired, persisted).await
            }
            ResourceKind::Network => self.typed::<Network>(phase, desired, persisted).await,
            ResourceKind::Volume => self.typed::<Volume>(phase, desired, persisted).await,
            ResourceKind::Image => self.typed::<Image>(phase, desired, persisted).await,
            ResourceKind::ImagePull => self.typed::<ImagePull>(phase, desired, persisted).await,
        }
    }

    /// Runs [`Reconciler::resync`] on an untyped record.
    ///
    /// # Errors
    ///
    /// Returns an error if the Gateway call fails.
    pub async fn resync_record(&self, desired: &ResourceRecord) -> Outcome<ResourceRecord> {
        match desired {
            ResourceRecord::Container(r) => Ok(self.resync(r).await?.map(Resource::into_record)),
            ResourceRecord::ComposeStack(r) => Ok(self.resync(r).await?.map(Resource::into_record)),
            ResourceRecord::Environment(r) => Ok(self.resync(r).await?.map(Resource::into_record)),
            ResourceRecord::Network(r) => Ok(self.resync(r).await?.map(Resource::into_record)),
            ResourceRecord::Volume(r) => Ok(self.resync(r).await?.map(Resource::into_record)),
            ResourceRecord::Image(r) => Ok(self.resync(r).await?.map(Resource::into_record)),
            ResourceRecord::ImagePull(r) => Ok(self.resync(r).await?.map(Resource::into_record)),
        }
    }

    /// Runs [`Reconciler::act`] on an untyped record.
    ///
    /// # Errors
    ///
    /// Returns an error if the action is unsupported or the call fails.
    pub async fn act_record(
        &self,
        record: &ResourceRecord,
        action: Action,
    ) -> Result<(), ReconcileError> {
        match record {
            ResourceRecord::Container(r) => self.act(r, action).await,
            ResourceRecord::ComposeStack(r) => self.act(r, action).await,
            ResourceRecord::Environment(r) => self.act(r, action).await,
            ResourceRecord::Network(r) => self.act(r, action).await,
            ResourceRecord::Volume(r) => self.act(r, action).await,
            ResourceRecord::Image(r) => self.act(r, action).await,
            ResourceRecord::ImagePull(r) => self.act(r, action).await,
        }
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    async fn typed<R: Resource>(
        &self,
        phase: Phase,
        desired: Option<&ResourceRecord>,
        persisted: Option<&ResourceRecord>,
    ) -> Outcome<ResourceRecord> {
        let desired = downcast::<R>(desired)?;
        let persisted = downcast::<R>(persisted)?;
        Ok(self
            .reconcile(phase, desired, persisted)
            .await?
            .map(Resource::into_record))
    }

    async fn replace<R: Resource>(
        &self,
        desired: &R,
        persisted: &R,
        changes: Vec<FieldChange>,
    ) -> Outcome<R> {
        info!(
            "Replacing {} '{}' ({}): immutable field changed",
            R::KIND,
            persisted.name(),
            persisted.id()
        );

        self.remove(persisted).await?;

        match self.create(desired).await {
            Ok(created) => Ok(Reconciliation::new(
                created.record,
                ReconcileAction::Replaced,
                changes,
            )),
            Err(source) => {
                warn!(
                    "{} '{}' was deleted but could not be recreated: {source}",
                    R::KIND,
                    persisted.name()
                );
                Err(ReconcileError::PartialReplaceFailure {
                    kind: R::KIND,
                    deleted_id: persisted.id().to_string(),
                    source: Box::new(source),
                })
            }
        }
    }

    async fn remove<R: Resource>(&self, persisted: &R) -> Result<(), ReconcileError> {
        match self
            .gateway
            .delete(R::KIND, persisted.environment_id(), persisted.id())
            .await
        {
            Ok(()) => Ok(()),
            Err(GatewayError::NotFound { .. }) => {
                debug!("{} '{}' was already gone", R::KIND, persisted.id());
                Ok(())
            }
            Err(e) => Err(ReconcileError::from_gateway(Operation::Delete, R::KIND, e)),
        }
    }

    /// Fetches the server's view of a persisted record; `None` if missing.
    async fn observe<R: Resource>(
        &self,
        policy: &KindPolicy,
        persisted: &R,
        persisted_value: &Value,
    ) -> Result<Option<Value>, ReconcileError> {
        let env = persisted.environment_id();
        match policy.read {
            ReadStrategy::Get => match self.gateway.get(R::KIND, env, persisted.id()).await {
                Ok(observed) => Ok(Some(observed)),
                Err(GatewayError::NotFound { .. }) => Ok(None),
                Err(e) => Err(ReconcileError::from_gateway(Operation::Read, R::KIND, e)),
            },
            ReadStrategy::ListLookup => {
                let image = string_field(persisted_value, "image");
                Ok(self.find_image(env, image).await?.map(|_| {
                    let mut observed = json!({ "id": persisted.id() });
                    for field in ["status", "pulled_at"] {
                        if let Some(value) = persisted_value.get(field) {
                            observed[field] = value.clone();
                        }
                    }
                    observed
                }))
            }
        }
    }

    /// Looks up an image by reference among an environment's repo tags.
    async fn find_image(
        &self,
        environment_id: &str,
        reference: &str,
    ) -> Result<Option<Value>, ReconcileError> {
        let images = self
            .gateway
            .list(ResourceKind::ImagePull, environment_id)
            .await
            .map_err(|e| ReconcileError::from_gateway(Operation::Read, ResourceKind::ImagePull, e))?;

        Ok(images.into_iter().find(|image| {
            image
                .get("repo_tags")
                .and_then(Value::as_array)
                .is_some_and(|tags| {
                    tags.iter()
                        .filter_map(Value::as_str)
                        .any(|tag| reference_matches(tag, reference))
                })
        }))
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn record_kind(
    desired: Option<&ResourceRecord>,
    persisted: Option<&ResourceRecord>,
) -> Result<ResourceKind, ReconcileError> {
    match (desired, persisted) {
        (Some(d), Some(p)) if d.kind() != p.kind() => Err(ReconcileError::invalid(
            d.kind(),
            format!("cannot reconcile against a {} record", p.kind()),
        )),
        (Some(record), _) | (None, Some(record)) => Ok(record.kind()),
        (None, None) => Err(ReconcileError::InvalidRecord {
            kind: ResourceKind::Container,
            message: String::from("no record supplied"),
        }),
    }
}

fn required<'a, R: Resource>(
    phase: Phase,
    record: Option<&'a R>,
    role: &str,
) -> Result<&'a R, ReconcileError> {
    record.ok_or_else(|| {
        ReconcileError::invalid(R::KIND, format!("{phase:?} requires a {role} record"))
    })
}

fn downcast<R: Resource>(
    record: Option<&ResourceRecord>,
) -> Result<Option<&R>, ReconcileError> {
    record
        .map(|record| {
            R::from_record(record)
                .ok_or_else(|| ReconcileError::invalid(R::KIND, "record kinds do not match"))
        })
        .transpose()
}

fn require_id<R: Resource>(record: &R) -> Result<(), ReconcileError> {
    if record.id().is_empty() {
        return Err(ReconcileError::invalid(R::KIND, "record has no id"));
    }
    if R::KIND.is_environment_scoped() && record.environment_id().is_empty() {
        return Err(ReconcileError::invalid(R::KIND, "record has no environment_id"));
    }
    Ok(())
}

fn check_required(policy: &KindPolicy, desired: &Value) -> Result<(), ReconcileError> {
    for (name, field) in policy.top_level() {
        if field.contains(FieldPolicy::REQUIRED)
            && !desired
                .get(name)
                .is_some_and(is_non_empty)
        {
            return Err(ReconcileError::invalid(
                policy.kind,
                format!("missing required field '{name}'"),
            ));
        }
    }
    Ok(())
}

fn response_id(kind: ResourceKind, observed: &Value) -> Result<String, ReconcileError> {
    match observed.get("id").and_then(Value::as_str) {
        Some(id) if !id.is_empty() => Ok(id.to_string()),
        _ => Err(ReconcileError::invalid(kind, "response carried no id")),
    }
}

fn string_field<'a>(value: &'a Value, name: &str) -> &'a str {
    value.get(name).and_then(Value::as_str).unwrap_or_default()
}

/// Synthesizes the observed object of a successful pull.
fn pulled(image: &str) -> Value {
    json!({
        "id": image,
        "status": PULL_SUCCESS,
        "pulled_at": chrono::Utc::now().to_rfc3339(),
    })
}

/// Removes computed fields, including the caller's `id`.
fn strip_computed(policy: &KindPolicy, value: &Value) -> Value {
    let mut stripped = value.clone();
    for (path, field) in policy.fields {
        if field.contains(FieldPolicy::COMPUTED) {
            remove_path(&mut stripped, path);
        }
    }
    stripped
}

/// Overlays the configurable fields `desired` specifies onto `persisted`.
fn overlay(policy: &KindPolicy, persisted: &Value, desired: &Value) -> Value {
    let mut base = persisted.clone();
    for (name, field) in policy.top_level() {
        if !field.is_configurable() || field.contains(FieldPolicy::ADDRESS) {
            continue;
        }
        if let Some(value) = desired.get(name).filter(|v| !v.is_null()) {
            base[name] = value.clone();
        }
    }
    base
}

/// Returns true if a repo tag names the same image as a reference.
///
/// An untagged reference matches its `:latest` tag.
fn reference_matches(tag: &str, reference: &str) -> bool {
    if tag == reference {
        return true;
    }
    let last_segment = reference.rsplit('/').next().unwrap_or(reference);
    !last_segment.contains(':')
        && !reference.contains('@')
        && tag.strip_suffix(":latest") == Some(reference)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MockGateway;
    use crate::resource::Labels;

    fn container() -> Container {
        Container {
            id: String::from("c1"),
            environment_id: String::from("e1"),
            name: String::from("web"),
            image: String::from("nginx:1.25"),
            env: Some(vec![String::from("A=1")]),
            state: Some(String::from("running")),
            ..Default::default()
        }
    }

    fn pull(image: &str) -> ImagePull {
        ImagePull {
            id: image.to_string(),
            environment_id: String::from("e1"),
            image: image.to_string(),
            auth_username: Some(String::from("bot")),
            auth_password: Some(String::from("s3cret")),
            status: Some(String::from(PULL_SUCCESS)),
            pulled_at: Some(String::from("2026-01-01T00:00:00+00:00")),
            ..Default::default()
        }
    }

    fn volume(environment_id: &str) -> Volume {
        Volume {
            id: String::from("v1"),
            environment_id: environment_id.to_string(),
            name: String::from("data"),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_env_only_change_sends_minimal_update() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_update()
            .withf(|kind, env, id, body| {
                *kind == ResourceKind::Container
                    && env == "e1"
                    && id == "c1"
                    && *body == json!({"env": ["A=2"]})
            })
            .times(1)
            .returning(|_, _, _, _| {
                Ok(json!({
                    "id": "c1", "name": "web", "image": "nginx:1.25",
                    "env": ["A=2"], "state": "running", "status": "Up 1 second"
                }))
            });

        let persisted = container();
        let desired = Container {
            id: String::new(),
            env: Some(vec![String::from("A=2")]),
            state: None,
            ..container()
        };

        let outcome = Reconciler::new(gateway)
            .reconcile(Phase::Update, Some(&desired), Some(&persisted))
            .await
            .expect("update");

        assert_eq!(outcome.action, ReconcileAction::Updated);
        assert_eq!(outcome.drift.len(), 1);
        let record = outcome.record.expect("record");
        assert_eq!(record.id, "c1");
        assert_eq!(record.environment_id, "e1");
        assert_eq!(record.env, Some(vec![String::from("A=2")]));
        assert_eq!(record.status.as_deref(), Some("Up 1 second"));
    }

    #[tokio::test]
    async fn test_image_pull_change_replaces() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_delete()
            .withf(|kind, env, id| {
                *kind == ResourceKind::ImagePull && env == "e1" && id == "nginx:1.25"
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        gateway
            .expect_pull_image()
            .withf(|env, request| {
                env == "e1"
                    && request.image == "nginx:1.26"
                    && request.auth.as_ref().is_some_and(|a| a.password == "s3cret")
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let persisted = pull("nginx:1.25");
        let desired = ImagePull {
            id: String::new(),
            status: None,
            pulled_at: None,
            ..pull("nginx:1.26")
        };

        let outcome = Reconciler::new(gateway)
            .update(&desired, &persisted)
            .await
            .expect("replace");

        assert_eq!(outcome.action, ReconcileAction::Replaced);
        let record = outcome.record.expect("record");
        assert_eq!(record.id, "nginx:1.26");
        assert_eq!(record.status.as_deref(), Some(PULL_SUCCESS));
        assert_eq!(record.auth_password.as_deref(), Some("s3cret"));
        assert!(record.pulled_at.is_some());
    }

    #[tokio::test]
    async fn test_registry_change_restates_without_calls() {
        let gateway = MockGateway::new();
        let persisted = pull("nginx:1.25");
        let desired = ImagePull {
            id: String::new(),
            registry: Some(String::from("registry.example")),
            ..pull("nginx:1.25")
        };

        let outcome = Reconciler::new(gateway)
            .update(&desired, &persisted)
            .await
            .expect("restate");

        assert_eq!(outcome.action, ReconcileAction::Restated);
        let record = outcome.record.expect("record");
        assert_eq!(record.registry.as_deref(), Some("registry.example"));
        assert_eq!(record.id, "nginx:1.25");
        assert_eq!(record.pulled_at, persisted.pulled_at);
    }

    #[tokio::test]
    async fn test_delete_of_missing_object_succeeds() {
        let mut gateway = MockGateway::new();
        gateway.expect_delete().times(1).returning(|_, _, _| {
            Err(GatewayError::NotFound {
                body: String::from("no such container"),
            })
        });

        let outcome = Reconciler::new(gateway)
            .reconcile(Phase::Delete, None, Some(&container()))
            .await
            .expect("delete");

        assert_eq!(outcome.action, ReconcileAction::Deleted);
        assert!(outcome.record.is_none());
    }

    #[tokio::test]
    async fn test_delete_failure_is_reported() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_delete()
            .returning(|_, _, _| Err(GatewayError::from_status(409, "container is running")));

        let err = Reconciler::new(gateway)
            .delete(&container())
            .await
            .expect_err("should fail");

        assert_eq!(err.status(), Some(409));
        assert_eq!(
            err.to_string(),
            "delete container failed: 409 container is running"
        );
    }

    #[tokio::test]
    async fn test_read_of_missing_object_vanishes() {
        let mut gateway = MockGateway::new();
        gateway.expect_get().returning(|_, _, _| {
            Err(GatewayError::NotFound {
                body: String::new(),
            })
        });

        let outcome = Reconciler::new(gateway)
            .read(&container())
            .await
            .expect("read");

        assert_eq!(outcome.action, ReconcileAction::Vanished);
        assert!(outcome.record.is_none());
    }

    #[tokio::test]
    async fn test_read_reports_drift() {
        let mut gateway = MockGateway::new();
        gateway.expect_get().returning(|_, _, _| {
            Ok(json!({
                "id": "c1", "name": "web", "image": "nginx:1.25",
                "env": ["A=9"], "state": "exited"
            }))
        });

        let outcome = Reconciler::new(gateway)
            .read(&container())
            .await
            .expect("read");

        assert_eq!(outcome.action, ReconcileAction::Read);
        assert_eq!(outcome.drift.len(), 1);
        assert_eq!(outcome.drift[0].field, "env");
        let record = outcome.record.expect("record");
        assert_eq!(record.state.as_deref(), Some("exited"));
        assert_eq!(record.environment_id, "e1");
    }

    #[tokio::test]
    async fn test_failed_recreate_is_partial_replace() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_delete()
            .withf(|_, env, id| env == "e1" && id == "v1")
            .times(1)
            .returning(|_, _, _| Ok(()));
        gateway
            .expect_create()
            .withf(|kind, env, body| {
                *kind == ResourceKind::Volume && env == "e2" && *body == json!({"name": "data"})
            })
            .times(1)
            .returning(|_, _, _| Err(GatewayError::from_status(500, "disk full")));

        let desired = Volume {
            id: String::new(),
            ..volume("e2")
        };

        let err = Reconciler::new(gateway)
            .update(&desired, &volume("e1"))
            .await
            .expect_err("should fail");

        assert!(err.requires_resync());
        match err {
            ReconcileError::PartialReplaceFailure {
                kind, deleted_id, ..
            } => {
                assert_eq!(kind, ResourceKind::Volume);
                assert_eq!(deleted_id, "v1");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_refresh_only_kind_reports_drift_without_mutation() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_get()
            .withf(|kind, _, id| *kind == ResourceKind::Network && id == "n1")
            .times(1)
            .returning(|_, _, _| {
                Ok(json!({"id": "n1", "name": "backend", "driver": "bridge", "scope": "local"}))
            });

        let persisted = Network {
            id: String::from("n1"),
            environment_id: String::from("e1"),
            name: String::from("backend"),
            driver: Some(String::from("bridge")),
            ..Default::default()
        };
        let desired = Network {
            id: String::new(),
            labels: Some(Labels::from([(String::from("team"), String::from("infra"))])),
            ..persisted.clone()
        };

        let outcome = Reconciler::new(gateway)
            .update(&desired, &persisted)
            .await
            .expect("refresh");

        assert_eq!(outcome.action, ReconcileAction::Refreshed);
        assert_eq!(outcome.drift.len(), 1);
        assert_eq!(outcome.drift[0].field, "labels");
        let record = outcome.record.expect("record");
        assert!(record.labels.is_none());
        assert_eq!(record.scope.as_deref(), Some("local"));
    }

    #[tokio::test]
    async fn test_no_changes_makes_no_calls() {
        let gateway = MockGateway::new();
        let persisted = container();
        let desired = Container {
            id: String::new(),
            env: None,
            state: None,
            ..container()
        };

        let outcome = Reconciler::new(gateway)
            .update(&desired, &persisted)
            .await
            .expect("update");

        assert_eq!(outcome.action, ReconcileAction::Unchanged);
        assert_eq!(outcome.record, Some(persisted));
        assert!(!outcome.mutated());
    }

    #[tokio::test]
    async fn test_create_retains_secret_the_server_does_not_echo() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_create()
            .withf(|kind, env, body| {
                *kind == ResourceKind::ComposeStack
                    && env == "e1"
                    && body["git_repo"]["auth"]["token"] == json!("t0k3n")
            })
            .returning(|_, _, _| {
                Ok(json!({
                    "id": "s1", "name": "app", "compose": "services: {}",
                    "git_repo": {"url": "https://git.example/app.git", "auth": {"type": "https"}},
                    "status": "running", "webhook_token": "hook-1"
                }))
            });

        let desired = ComposeStack {
            environment_id: String::from("e1"),
            name: String::from("app"),
            compose: String::from("services: {}"),
            git_repo: Some(crate::resource::GitRepository {
                url: String::from("https://git.example/app.git"),
                auth: Some(crate::resource::GitAuth {
                    auth_type: String::from("https"),
                    token: Some(String::from("t0k3n")),
                    key: None,
                }),
                ..Default::default()
            }),
            ..Default::default()
        };

        let outcome = Reconciler::new(gateway)
            .create(&desired)
            .await
            .expect("create");

        assert_eq!(outcome.action, ReconcileAction::Created);
        let record = outcome.record.expect("record");
        assert_eq!(record.id, "s1");
        assert_eq!(record.webhook_token.as_deref(), Some("hook-1"));
        let auth = record
            .git_repo
            .and_then(|repo| repo.auth)
            .expect("auth");
        assert_eq!(auth.token.as_deref(), Some("t0k3n"));
    }

    #[tokio::test]
    async fn test_create_without_required_field_makes_no_calls() {
        let gateway = MockGateway::new();
        let desired = Container {
            environment_id: String::from("e1"),
            name: String::from("web"),
            ..Default::default()
        };

        let err = Reconciler::new(gateway)
            .create(&desired)
            .await
            .expect_err("should fail");

        assert!(matches!(err, ReconcileError::InvalidRecord { .. }));
        assert!(err.to_string().contains("image"));
    }

    #[tokio::test]
    async fn test_image_adopted_by_reference() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_get()
            .withf(|kind, env, id| *kind == ResourceKind::Image && env == "e1" && id == "alpine:3")
            .returning(|_, _, _| {
                Ok(json!({"id": "sha256:abc", "repo_tags": ["alpine:3"], "os": "linux"}))
            });

        let desired = Image {
            environment_id: String::from("e1"),
            reference: String::from("alpine:3"),
            ..Default::default()
        };

        let record = Reconciler::new(gateway)
            .create(&desired)
            .await
            .expect("adopt")
            .record
            .expect("record");

        assert_eq!(record.id, "sha256:abc");
        assert_eq!(record.reference, "alpine:3");
        assert_eq!(record.os.as_deref(), Some("linux"));
    }

    #[tokio::test]
    async fn test_image_pull_read_matches_latest_tag() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_list()
            .withf(|kind, env| *kind == ResourceKind::ImagePull && env == "e1")
            .returning(|_, _| Ok(vec![json!({"id": "sha256:1", "repo_tags": ["nginx:latest"]})]));

        let outcome = Reconciler::new(gateway)
            .read(&pull("nginx"))
            .await
            .expect("read");

        assert_eq!(outcome.action, ReconcileAction::Read);
        let record = outcome.record.expect("record");
        assert_eq!(record.id, "nginx");
        assert_eq!(record.auth_password.as_deref(), Some("s3cret"));
        assert!(outcome.drift.is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_action_makes_no_calls() {
        let gateway = MockGateway::new();

        let err = Reconciler::new(gateway)
            .act(&volume("e1"), Action::Start)
            .await
            .expect_err("should fail");

        assert_eq!(err.to_string(), "volume does not support the 'start' action");
    }

    #[tokio::test]
    async fn test_container_action_is_forwarded() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_action()
            .withf(|kind, env, id, action| {
                *kind == ResourceKind::Container && env == "e1" && id == "c1" && *action == Action::Restart
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        Reconciler::new(gateway)
            .act_record(&ResourceRecord::Container(container()), Action::Restart)
            .await
            .expect("action");
    }

    #[tokio::test]
    async fn test_resync_finds_object_by_name() {
        let mut gateway = MockGateway::new();
        gateway.expect_list().returning(|_, _| {
            Ok(vec![
                json!({"id": "v0", "name": "other"}),
                json!({"id": "v9", "name": "data", "mountpoint": "/mnt/data"}),
            ])
        });

        let desired = ResourceRecord::Volume(Volume {
            id: String::new(),
            ..volume("e2")
        });

        let outcome = Reconciler::new(gateway)
            .resync_record(&desired)
            .await
            .expect("resync");

        let record = outcome.record.expect("record");
        assert_eq!(record.id(), "v9");
        assert_eq!(record.environment_id(), "e2");
    }

    #[tokio::test]
    async fn test_resync_without_match_vanishes() {
        let mut gateway = MockGateway::new();
        gateway.expect_list().returning(|_, _| Ok(Vec::new()));

        let outcome = Reconciler::new(gateway)
            .resync(&volume("e2"))
            .await
            .expect("resync");

        assert_eq!(outcome.action, ReconcileAction::Vanished);
    }

    #[tokio::test]
    async fn test_mismatched_record_kinds_rejected() {
        let gateway = MockGateway::new();
        let desired = ResourceRecord::Volume(volume("e1"));
        let persisted = ResourceRecord::Container(container());

        let err = Reconciler::new(gateway)
            .reconcile_record(Phase::Update, Some(&desired), Some(&persisted))
            .await
            .expect_err("should fail");

        assert!(matches!(err, ReconcileError::InvalidRecord { .. }));
    }

    #[test]
    fn test_reference_matching() {
        assert!(reference_matches("nginx:1.25", "nginx:1.25"));
        assert!(reference_matches("nginx:latest", "nginx"));
        assert!(reference_matches("localhost:5000/app:latest", "localhost:5000/app"));
        assert!(!reference_matches("nginx:1.25", "nginx"));
        assert!(!reference_matches("nginx:latest", "nginx:1.25"));
    }
}
