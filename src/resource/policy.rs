//! Field policy table.
//!
//! Each kind declares, per wire field, whether it is required, optional,
//! computed by the server, sensitive, immutable, or only part of the URL.
//! Nested fields are addressed with dotted paths (`git_repo.auth.token`).

use serde::Serialize;
use serde_json::{Map, Value};

use super::{Action, ResourceKind};

/// Placeholder written over sensitive values in logs and plans.
pub const REDACTED: &str = "(sensitive)";

/// Set of tags describing how a field is reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldPolicy(u8);

impl FieldPolicy {
    /// Must be supplied by the caller.
    pub const REQUIRED: Self = Self(1);
    /// May be supplied by the caller.
    pub const OPTIONAL: Self = Self(1 << 1);
    /// Assigned by the server; never sent upstream.
    pub const COMPUTED: Self = Self(1 << 2);
    /// Never logged; retained from caller input when the server omits it.
    pub const SENSITIVE: Self = Self(1 << 3);
    /// A change forces replacement.
    pub const IMMUTABLE: Self = Self(1 << 4);
    /// Only appears in the request path, never in bodies.
    pub const ADDRESS: Self = Self(1 << 5);

    /// Returns the union of both tag sets.
    #[must_use]
    pub const fn and(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns true if every tag of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns true if the caller controls the field's value.
    #[must_use]
    pub const fn is_configurable(self) -> bool {
        (self.contains(Self::REQUIRED) || self.contains(Self::OPTIONAL))
            && !self.contains(Self::COMPUTED)
    }

    /// Returns true if the field is stripped from request bodies.
    #[must_use]
    pub const fn is_stripped(self) -> bool {
        self.contains(Self::COMPUTED) || self.contains(Self::ADDRESS)
    }
}

/// How a kind brings a new object into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateStrategy {
    /// `POST` the payload to the collection.
    Post,
    /// Look up an existing object by its `reference` field.
    Adopt,
    /// Ask the server to pull an image.
    Pull,
}

/// How a kind is read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStrategy {
    /// `GET` the object by id.
    Get,
    /// List the collection and find the reference among `repo_tags`.
    ListLookup,
}

/// How a kind handles non-replacing changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStrategy {
    /// `PUT` the changed mutable fields.
    InPlace,
    /// No mutation endpoint: re-read and report drift.
    RefreshOnly,
    /// Adopt desired values into state without a remote call.
    Restate,
}

/// Static reconciliation policy of one kind.
#[derive(Debug)]
pub struct KindPolicy {
    /// The kind described.
    pub kind: ResourceKind,
    /// Field table.
    pub fields: &'static [(&'static str, FieldPolicy)],
    /// Create strategy.
    pub create: CreateStrategy,
    /// Read strategy.
    pub read: ReadStrategy,
    /// Update strategy.
    pub update: UpdateStrategy,
    /// Supported lifecycle actions.
    pub actions: &'static [Action],
}

/// A single field difference.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange {
    /// Field name.
    pub field: String,
    /// Previous value.
    pub old_value: Option<Value>,
    /// New value.
    pub new_value: Option<Value>,
}

// ============================================================================
// Tables
// ============================================================================

const R: FieldPolicy = FieldPolicy::REQUIRED;
const O: FieldPolicy = FieldPolicy::OPTIONAL;
const C: FieldPolicy = FieldPolicy::COMPUTED;
const S: FieldPolicy = FieldPolicy::SENSITIVE;
const I: FieldPolicy = FieldPolicy::IMMUTABLE;
const A: FieldPolicy = FieldPolicy::ADDRESS;

const ID: (&str, FieldPolicy) = ("id", C.and(A));
const ENVIRONMENT_ID: (&str, FieldPolicy) = ("environment_id", R.and(I).and(A));

const CONTAINER_FIELDS: &[(&str, FieldPolicy)] = &[
    ID,
    ENVIRONMENT_ID,
    ("name", R),
    ("image", R),
    ("ports", O),
    ("mounts", O),
    ("env", O),
    ("labels", O),
    ("command", O),
    ("args", O),
    ("memory", O),
    ("cpus", O),
    ("restart_policy", O),
    ("state", C),
    ("status", C),
];

const COMPOSE_STACK_FIELDS: &[(&str, FieldPolicy)] = &[
    ID,
    ENVIRONMENT_ID,
    ("name", R),
    ("compose", R),
    ("desired_status", O),
    ("labels", O),
    ("auto_sync", O),
    ("git_repo", O),
    ("git_repo.auth.token", O.and(S)),
    ("git_repo.auth.key", O.and(S)),
    ("status", C),
    ("services", C),
    ("webhook_token", C.and(S)),
    ("created_at", C),
    ("updated_at", C),
];

const ENVIRONMENT_FIELDS: &[(&str, FieldPolicy)] = &[
    ID,
    ("name", R),
    ("type", R),
    ("host", O),
    ("port", O),
    ("labels", O),
    ("auth", O),
    ("auth.password", O.and(S)),
    ("auth.key", O.and(S)),
    ("active", C),
    ("docker_info", C),
    ("created_at", C),
    ("updated_at", C),
];

const NETWORK_FIELDS: &[(&str, FieldPolicy)] = &[
    ID,
    ENVIRONMENT_ID,
    ("name", R),
    ("type", O),
    ("driver", O),
    ("scope", O),
    ("labels", O),
    ("ipam", O),
    ("containers", C),
];

const VOLUME_FIELDS: &[(&str, FieldPolicy)] = &[
    ID,
    ENVIRONMENT_ID,
    ("name", R),
    ("driver", O),
    ("labels", O),
    ("options", O),
    ("mountpoint", C),
    ("size", C),
    ("containers", C),
];

const IMAGE_FIELDS: &[(&str, FieldPolicy)] = &[
    ID,
    ENVIRONMENT_ID,
    ("reference", R),
    ("repo_tags", C),
    ("repo_digests", C),
    ("size", C),
    ("created", C),
    ("labels", C),
    ("architecture", C),
    ("os", C),
];

const IMAGE_PULL_FIELDS: &[(&str, FieldPolicy)] = &[
    ID,
    ENVIRONMENT_ID,
    ("image", R.and(I)),
    ("registry", O),
    ("auth_username", O),
    ("auth_password", O.and(S)),
    ("status", C),
    ("pulled_at", C),
];

static CONTAINER: KindPolicy = KindPolicy {
    kind: ResourceKind::Container,
    fields: CONTAINER_FIELDS,
    create: CreateStrategy::Post,
    read: ReadStrategy::Get,
    update: UpdateStrategy::InPlace,
    actions: &[
        Action::Start,
        Action::Stop,
        Action::Restart,
        Action::Pause,
        Action::Unpause,
    ],
};

static COMPOSE_STACK: KindPolicy = KindPolicy {
    kind: ResourceKind::ComposeStack,
    fields: COMPOSE_STACK_FIELDS,
    create: CreateStrategy::Post,
    read: ReadStrategy::Get,
    update: UpdateStrategy::InPlace,
    actions: &[Action::Start, Action::Stop],
};

static ENVIRONMENT: KindPolicy = KindPolicy {
    kind: ResourceKind::Environment,
    fields: ENVIRONMENT_FIELDS,
    create: CreateStrategy::Post,
    read: ReadStrategy::Get,
    update: UpdateStrategy::InPlace,
    actions: &[],
};

static NETWORK: KindPolicy = KindPolicy {
    kind: ResourceKind::Network,
    fields: NETWORK_FIELDS,
    create: CreateStrategy::Post,
    read: ReadStrategy::Get,
    update: UpdateStrategy::RefreshOnly,
    actions: &[],
};

static VOLUME: KindPolicy = KindPolicy {
    kind: ResourceKind::Volume,
    fields: VOLUME_FIELDS,
    create: CreateStrategy::Post,
    read: ReadStrategy::Get,
    update: UpdateStrategy::RefreshOnly,
    actions: &[],
};

static IMAGE: KindPolicy = KindPolicy {
    kind: ResourceKind::Image,
    fields: IMAGE_FIELDS,
    create: CreateStrategy::Adopt,
    read: ReadStrategy::Get,
    update: UpdateStrategy::RefreshOnly,
    actions: &[],
};

static IMAGE_PULL: KindPolicy = KindPolicy {
    kind: ResourceKind::ImagePull,
    fields: IMAGE_PULL_FIELDS,
    create: CreateStrategy::Pull,
    read: ReadStrategy::ListLookup,
    update: UpdateStrategy::Restate,
    actions: &[],
};

// ============================================================================
// Policy queries
// ============================================================================

impl KindPolicy {
    /// Returns the static policy of a kind.
    #[must_use]
    pub fn for_kind(kind: ResourceKind) -> &'static Self {
        match kind {
            ResourceKind::Container => &CONTAINER,
            ResourceKind::ComposeStack => &COMPOSE_STACK,
            ResourceKind::Environment => &ENVIRONMENT,
            ResourceKind::Network => &NETWORK,
            ResourceKind::Volume => &VOLUME,
            ResourceKind::Image => &IMAGE,
            ResourceKind::ImagePull => &IMAGE_PULL,
        }
    }

    /// Looks up the policy of a field.
    #[must_use]
    pub fn field(&self, path: &str) -> Option<FieldPolicy> {
        self.fields
            .iter()
            .find(|(name, _)| *name == path)
            .map(|(_, policy)| *policy)
    }

    /// Iterates over top-level fields.
    pub fn top_level(&self) -> impl Iterator<Item = (&'static str, FieldPolicy)> + '_ {
        self.fields
            .iter()
            .copied()
            .filter(|(name, _)| !name.contains('.'))
    }

    /// Iterates over nested (dotted) fields.
    pub fn nested(&self) -> impl Iterator<Item = (&'static str, FieldPolicy)> + '_ {
        self.fields
            .iter()
            .copied()
            .filter(|(name, _)| name.contains('.'))
    }

    /// Returns true if the kind supports the action.
    #[must_use]
    pub fn supports(&self, action: Action) -> bool {
        self.actions.contains(&action)
    }

    /// Builds a create body: computed and address fields are removed.
    #[must_use]
    pub fn create_payload(&self, desired: &Value) -> Value {
        let mut body = Map::new();
        if let Value::Object(fields) = desired {
            for (name, policy) in self.top_level() {
                if policy.is_stripped() {
                    continue;
                }
                if let Some(value) = fields.get(name).filter(|v| !v.is_null()) {
                    body.insert(name.to_string(), value.clone());
                }
            }
        }
        let mut body = Value::Object(body);
        self.strip_nested_computed(&mut body);
        body
    }

    /// Computes the configurable fields that `desired` sets to a value
    /// different from `persisted`.
    ///
    /// Fields absent from `desired` are not changes.
    #[must_use]
    pub fn changed_fields(&self, desired: &Value, persisted: &Value) -> Vec<FieldChange> {
        self.top_level()
            .filter(|(_, policy)| policy.is_configurable())
            .filter_map(|(name, _)| {
                let wanted = desired.get(name).filter(|v| !v.is_null())?;
                let current = persisted.get(name).filter(|v| !v.is_null());
                let differs = if self.is_structured(name) {
                    !covers(current, wanted)
                } else {
                    current != Some(wanted)
                };
                differs.then(|| FieldChange {
                    field: name.to_string(),
                    old_value: current.cloned(),
                    new_value: Some(wanted.clone()),
                })
            })
            .collect()
    }

    /// Returns true if any change touches an immutable field.
    #[must_use]
    pub fn requires_replace(&self, changes: &[FieldChange]) -> bool {
        changes.iter().any(|change| {
            self.field(&change.field)
                .is_some_and(|policy| policy.contains(FieldPolicy::IMMUTABLE))
        })
    }

    /// Builds an update body holding only the changed mutable fields.
    #[must_use]
    pub fn update_payload(&self, changes: &[FieldChange]) -> Value {
        let mut body = Map::new();
        for change in changes {
            let mutable = self.field(&change.field).is_some_and(|policy| {
                !policy.contains(FieldPolicy::IMMUTABLE) && !policy.is_stripped()
            });
            if let (true, Some(value)) = (mutable, &change.new_value) {
                body.insert(change.field.clone(), value.clone());
            }
        }
        let mut body = Value::Object(body);
        self.strip_nested_computed(&mut body);
        body
    }

    /// Returns a copy of a change with sensitive values masked.
    #[must_use]
    pub fn redact_change(&self, change: &FieldChange) -> FieldChange {
        let mask = |value: &Option<Value>| {
            value.as_ref().map(|v| {
                let mut wrapper = Value::Object(Map::new());
                set_path(&mut wrapper, &change.field, v.clone());
                redacted(self.kind, &wrapper)
                    .get(&change.field)
                    .cloned()
                    .unwrap_or(Value::Null)
            })
        };
        FieldChange {
            field: change.field.clone(),
            old_value: mask(&change.old_value),
            new_value: mask(&change.new_value),
        }
    }

    /// Returns true if the table addresses paths inside the field, making it
    /// a structured object rather than a free-form map.
    fn is_structured(&self, name: &str) -> bool {
        self.nested()
            .any(|(path, _)| path.split('.').next() == Some(name))
    }

    fn strip_nested_computed(&self, body: &mut Value) {
        for (path, policy) in self.nested() {
            if policy.contains(FieldPolicy::COMPUTED) {
                remove_path(body, path);
            }
        }
    }
}

/// Returns true if `current` holds every key `wanted` sets, recursively.
/// Keys only `current` carries are ignored.
fn covers(current: Option<&Value>, wanted: &Value) -> bool {
    match (current, wanted) {
        (Some(Value::Object(have)), Value::Object(want)) => want
            .iter()
            .filter(|(_, value)| !value.is_null())
            .all(|(key, value)| covers(have.get(key), value)),
        (Some(have), want) => have == want,
        (None, _) => false,
    }
}

/// Returns a copy of a wire object with every sensitive value masked.
#[must_use]
pub fn redacted(kind: ResourceKind, value: &Value) -> Value {
    let mut masked = value.clone();
    for (path, policy) in KindPolicy::for_kind(kind).fields {
        if policy.contains(FieldPolicy::SENSITIVE)
            && get_path(&masked, path).is_some_and(|v| !v.is_null())
        {
            set_path(&mut masked, path, Value::String(String::from(REDACTED)));
        }
    }
    masked
}

// ============================================================================
// Dotted path helpers
// ============================================================================

/// Reads the value at a dotted path.
#[must_use]
pub fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, key| current.get(key))
}

/// Writes a value at a dotted path, creating intermediate objects.
///
/// Does nothing if an intermediate value exists and is not an object.
pub fn set_path(value: &mut Value, path: &str, new_value: Value) {
    let mut segments = path.split('.').peekable();
    let mut current = value;
    while let Some(key) = segments.next() {
        let Value::Object(map) = current else {
            return;
        };
        if segments.peek().is_none() {
            map.insert(key.to_string(), new_value);
            return;
        }
        let next = map
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if next.is_null() {
            *next = Value::Object(Map::new());
        }
        current = next;
    }
}

/// Removes the value at a dotted path, if present.
pub fn remove_path(value: &mut Value, path: &str) {
    let (parent, key) = match path.rsplit_once('.') {
        Some((parent, key)) => (parent, key),
        None => ("", path),
    };
    let target = if parent.is_empty() {
        Some(value)
    } else {
        parent
            .split('.')
            .try_fold(value, |current, segment| current.get_mut(segment))
    };
    if let Some(Value::Object(map)) = target {
        map.remove(key);
    }
}

/// Returns true if a value carries content (not null, not an empty
/// string, array or object).
#[must_use]
pub fn is_non_empty(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tag_set_operations() {
        let policy = FieldPolicy::OPTIONAL.and(FieldPolicy::SENSITIVE);
        assert!(policy.contains(FieldPolicy::SENSITIVE));
        assert!(!policy.contains(FieldPolicy::COMPUTED));
        assert!(policy.is_configurable());
        assert!(!FieldPolicy::COMPUTED.and(FieldPolicy::SENSITIVE).is_configurable());
    }

    #[test]
    fn test_create_payload_strips_computed_and_address() {
        let policy = KindPolicy::for_kind(ResourceKind::Container);
        let desired = json!({
            "id": "caller-id",
            "environment_id": "e1",
            "name": "web",
            "image": "nginx:1.25",
            "state": "running",
            "status": "Up 2 hours",
            "labels": {"tier": "front"}
        });

        let body = policy.create_payload(&desired);

        assert_eq!(
            body,
            json!({"name": "web", "image": "nginx:1.25", "labels": {"tier": "front"}})
        );
    }

    #[test]
    fn test_create_payload_keeps_nested_secrets() {
        let policy = KindPolicy::for_kind(ResourceKind::ComposeStack);
        let desired = json!({
            "environment_id": "e1",
            "name": "app",
            "compose": "services: {}",
            "git_repo": {"url": "https://git.example/app.git", "auth": {"type": "https", "token": "t0k3n"}},
            "webhook_token": "caller-supplied"
        });

        let body = policy.create_payload(&desired);

        assert_eq!(body["git_repo"]["auth"]["token"], json!("t0k3n"));
        assert!(body.get("webhook_token").is_none());
    }

    #[test]
    fn test_absent_optional_is_not_a_change() {
        let policy = KindPolicy::for_kind(ResourceKind::Container);
        let persisted = json!({
            "id": "c1", "environment_id": "e1", "name": "web", "image": "nginx",
            "labels": {"tier": "front"}, "state": "running"
        });
        let desired = json!({"environment_id": "e1", "name": "web", "image": "nginx"});

        assert!(policy.changed_fields(&desired, &persisted).is_empty());
    }

    #[test]
    fn test_update_payload_only_changed_mutable_fields() {
        let policy = KindPolicy::for_kind(ResourceKind::Container);
        let persisted = json!({
            "id": "c1", "environment_id": "e1", "name": "web", "image": "nginx",
            "env": ["A=1"]
        });
        let desired = json!({
            "environment_id": "e1", "name": "web", "image": "nginx", "env": ["A=2"]
        });

        let changes = policy.changed_fields(&desired, &persisted);
        assert!(!policy.requires_replace(&changes));
        assert_eq!(policy.update_payload(&changes), json!({"env": ["A=2"]}));
    }

    #[test]
    fn test_structured_object_compared_on_specified_keys() {
        let policy = KindPolicy::for_kind(ResourceKind::ComposeStack);
        let persisted = json!({
            "id": "s1", "environment_id": "e1", "name": "app", "compose": "x",
            "git_repo": {"url": "u", "branch": "main", "auth": {"type": "https", "token": "t"}}
        });

        let same = json!({"git_repo": {"url": "u", "auth": {"type": "https", "token": "t"}}});
        assert!(policy.changed_fields(&same, &persisted).is_empty());

        let moved = json!({"git_repo": {"url": "u", "branch": "dev"}});
        let changes = policy.changed_fields(&moved, &persisted);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].field, "git_repo");
    }

    #[test]
    fn test_empty_map_clears_labels() {
        let policy = KindPolicy::for_kind(ResourceKind::Container);
        let persisted = json!({"id": "c1", "labels": {"team": "ops"}});
        let desired = json!({"labels": {}});

        assert_eq!(policy.changed_fields(&desired, &persisted).len(), 1);
    }

    #[test]
    fn test_environment_change_requires_replace() {
        let policy = KindPolicy::for_kind(ResourceKind::Volume);
        let persisted = json!({"id": "v1", "environment_id": "e1", "name": "data"});
        let desired = json!({"environment_id": "e2", "name": "data"});

        let changes = policy.changed_fields(&desired, &persisted);
        assert!(policy.requires_replace(&changes));
    }

    #[test]
    fn test_image_reference_change_is_not_a_replace() {
        let policy = KindPolicy::for_kind(ResourceKind::Image);
        let persisted = json!({"id": "sha256:old", "environment_id": "e1", "reference": "alpine:3.19"});
        let desired = json!({"environment_id": "e1", "reference": "alpine:3.20"});

        let changes = policy.changed_fields(&desired, &persisted);
        assert_eq!(changes.len(), 1);
        assert!(!policy.requires_replace(&changes));
        assert_eq!(policy.update, UpdateStrategy::RefreshOnly);
    }

    #[test]
    fn test_redacted_masks_nested_and_flat_secrets() {
        let value = json!({
            "name": "prod",
            "type": "ssh",
            "auth": {"type": "ssh", "username": "root", "key": "-----BEGIN KEY-----"}
        });

        let masked = redacted(ResourceKind::Environment, &value);

        assert_eq!(masked["auth"]["key"], json!(REDACTED));
        assert_eq!(masked["auth"]["username"], json!("root"));
        assert!(masked["auth"].get("password").is_none());
    }

    #[test]
    fn test_redact_change_masks_nested_secret() {
        let policy = KindPolicy::for_kind(ResourceKind::ComposeStack);
        let change = FieldChange {
            field: String::from("git_repo"),
            old_value: None,
            new_value: Some(json!({"url": "u", "auth": {"type": "https", "token": "t"}})),
        };

        let masked = policy.redact_change(&change);
        let new_value = masked.new_value.expect("value");
        assert_eq!(new_value["auth"]["token"], json!(REDACTED));
        assert_eq!(new_value["url"], json!("u"));
    }

    #[test]
    fn test_path_helpers() {
        let mut value = json!({"git_repo": {"url": "u"}});

        set_path(&mut value, "git_repo.auth.token", json!("t"));
        assert_eq!(get_path(&value, "git_repo.auth.token"), Some(&json!("t")));

        remove_path(&mut value, "git_repo.auth.token");
        assert!(get_path(&value, "git_repo.auth.token").is_none());
        assert!(get_path(&value, "git_repo.auth").is_some());
    }
}
