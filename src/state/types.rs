//! State file types.
//!
//! The state file holds one record per managed object, keyed by its local
//! address and uniquely identified remotely by `(kind, environment_id, id)`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StateError;
use crate::resource::{ResourceKind, ResourceRecord};

/// Current version of the state format.
pub const STATE_VERSION: &str = "1";

/// Maximum number of history entries kept.
const MAX_HISTORY: usize = 100;

/// The persisted state of every managed object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFile {
    /// State format version.
    pub version: String,
    /// Identifier shared by every serial of this state.
    pub lineage: Uuid,
    /// Incremented on every write.
    pub serial: u64,
    /// When the state was last changed.
    pub last_updated: DateTime<Utc>,
    /// Managed records.
    #[serde(default)]
    pub records: Vec<StoredRecord>,
    /// Recent operations.
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

/// A managed record and the configuration it was applied from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Local resource address (`kind.name`).
    pub address: String,
    /// Hash of the desired configuration last applied.
    pub config_hash: String,
    /// Last known record.
    pub record: ResourceRecord,
    /// When the record was last written.
    pub updated_at: DateTime<Utc>,
}

/// A single entry in the operation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// When the operation ran.
    pub timestamp: DateTime<Utc>,
    /// Type of operation.
    pub operation: StateOperation,
    /// Addresses affected.
    pub resources: Vec<String>,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Error message on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Operations recorded in history.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StateOperation {
    /// Plan applied.
    Apply,
    /// Records refreshed from the server.
    Refresh,
    /// Everything destroyed.
    Destroy,
    /// Lifecycle action run.
    Action,
    /// Record forgotten without touching the server.
    Forget,
}

impl StateFile {
    /// Creates an empty state with a fresh lineage.
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            lineage: Uuid::new_v4(),
            serial: 0,
            last_updated: Utc::now(),
            records: Vec::new(),
            history: Vec::new(),
        }
    }

    /// Checks the version and identity uniqueness of a loaded state.
    ///
    /// # Errors
    ///
    /// Returns an error on a version mismatch or a duplicate record.
    pub fn validate(&self) -> Result<(), StateError> {
        if self.version != STATE_VERSION {
            return Err(StateError::VersionMismatch {
                expected: STATE_VERSION.to_string(),
                found: self.version.clone(),
            });
        }
        for (index, stored) in self.records.iter().enumerate() {
            if self.records[..index]
                .iter()
                .any(|other| other.address == stored.address || same_object(other, stored))
            {
                return Err(duplicate(&stored.record));
            }
        }
        Ok(())
    }

    /// Gets a record by address.
    #[must_use]
    pub fn get(&self, address: &str) -> Option<&StoredRecord> {
        self.records.iter().find(|r| r.address == address)
    }

    /// Finds a record by remote identity.
    #[must_use]
    pub fn find(&self, kind: ResourceKind, environment_id: &str, id: &str) -> Option<&StoredRecord> {
        self.records.iter().find(|r| {
            r.record.kind() == kind
                && r.record.environment_id() == environment_id
                && r.record.id() == id
        })
    }

    /// Adds or replaces the record at an address.
    ///
    /// # Errors
    ///
    /// Returns an error if another address already holds the same remote
    /// object.
    pub fn upsert(&mut self, stored: StoredRecord) -> Result<(), StateError> {
        if self
            .records
            .iter()
            .any(|other| other.address != stored.address && same_object(other, &stored))
        {
            return Err(duplicate(&stored.record));
        }

        match self.records.iter_mut().find(|r| r.address == stored.address) {
            Some(existing) => *existing = stored,
            None => self.records.push(stored),
        }
        self.touch();
        Ok(())
    }

    /// Removes the record at an address.
    pub fn remove(&mut self, address: &str) -> Option<StoredRecord> {
        let index = self.records.iter().position(|r| r.address == address)?;
        let removed = self.records.remove(index);
        self.touch();
        Some(removed)
    }

    /// Returns every address, in stored order.
    #[must_use]
    pub fn addresses(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.address.as_str()).collect()
    }

    /// Adds a history entry, dropping the oldest beyond the limit.
    pub fn add_history(&mut self, entry: HistoryEntry) {
        if self.history.len() >= MAX_HISTORY {
            self.history.remove(0);
        }
        self.history.push(entry);
    }

    fn touch(&mut self) {
        self.serial += 1;
        self.last_updated = Utc::now();
    }
}

impl Default for StateFile {
    fn default() -> Self {
        Self::new()
    }
}

impl StoredRecord {
    /// Creates a stored record stamped with the current time.
    #[must_use]
    pub fn new(address: impl Into<String>, config_hash: impl Into<String>, record: ResourceRecord) -> Self {
        Self {
            address: address.into(),
            config_hash: config_hash.into(),
            record,
            updated_at: Utc::now(),
        }
    }

    /// Returns the record's kind.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        self.record.kind()
    }
}

impl HistoryEntry {
    /// Creates a successful history entry.
    #[must_use]
    pub fn new(operation: StateOperation, resources: Vec<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            resources,
            success: true,
            error: None,
        }
    }

    /// Creates a failed history entry.
    #[must_use]
    pub fn failed(operation: StateOperation, resources: Vec<String>, error: &str) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            ..Self::new(operation, resources)
        }
    }
}

impl std::fmt::Display for StateOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self {
            Self::Apply => "apply",
            Self::Refresh => "refresh",
            Self::Destroy => "destroy",
            Self::Action => "action",
            Self::Forget => "forget",
        };
        write!(f, "{op}")
    }
}

/// Records without an id yet never collide.
fn same_object(a: &StoredRecord, b: &StoredRecord) -> bool {
    !a.record.id().is_empty()
        && a.record.kind() == b.record.kind()
        && a.record.environment_id() == b.record.environment_id()
        && a.record.id() == b.record.id()
}

fn duplicate(record: &ResourceRecord) -> StateError {
    StateError::DuplicateRecord {
        kind: record.kind(),
        environment_id: record.environment_id().to_string(),
        id: record.id().to_string(),
    }
}
