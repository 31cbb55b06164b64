//! Persistent state of managed objects.
//!
//! The engine only produces and consumes record values; the CLI keeps them
//! in a local JSON state file between runs.

mod local;
mod store;
mod types;

pub use local::LocalStateStore;
pub use store::StateStore;
pub use types::{
    HistoryEntry, STATE_VERSION, StateFile, StateOperation, StoredRecord,
};
