//! Drift merge: folds an observed object into a persisted record.
//!
//! The server is authoritative for computed fields and for configurable
//! fields it reports. Caller-only data (address fields, secrets the server
//! never echoes, optional fields the server omits) survives from the
//! persisted record.

use serde_json::{Map, Value};

use crate::resource::{FieldPolicy, KindPolicy, get_path, is_non_empty, remove_path, set_path};

/// Merges `observed` into `persisted` according to the kind's field table.
///
/// Only fields named in the table survive; anything else either side
/// carries is dropped.
#[must_use]
pub fn drift_merge(policy: &KindPolicy, observed: &Value, persisted: &Value) -> Value {
    let mut merged = Map::new();

    for (name, field) in policy.top_level() {
        let seen = observed.get(name);
        let kept = persisted.get(name).filter(|v| !v.is_null());

        let value = if field.contains(FieldPolicy::ADDRESS) {
            kept
        } else if field.contains(FieldPolicy::COMPUTED) {
            if field.contains(FieldPolicy::SENSITIVE) {
                seen.filter(|v| is_non_empty(v)).or(kept)
            } else {
                seen.filter(|v| !v.is_null())
            }
        } else if field.contains(FieldPolicy::SENSITIVE) {
            kept
        } else {
            // Omission is not erasure: an explicit null or empty value from
            // the server wins, a missing key keeps what we had.
            seen.or(kept)
        };

        if let Some(value) = value {
            merged.insert(name.to_string(), value.clone());
        }
    }

    let mut merged = Value::Object(merged);

    for (path, field) in policy.nested() {
        if !field.contains(FieldPolicy::SENSITIVE) || field.contains(FieldPolicy::COMPUTED) {
            continue;
        }
        // Secrets go back only into an object the server still reports.
        let parent = path.rsplit_once('.').map_or(path, |(parent, _)| parent);
        if !get_path(&merged, parent).is_some_and(Value::is_object) {
            continue;
        }
        match get_path(persisted, path).filter(|v| !v.is_null()) {
            Some(secret) => set_path(&mut merged, path, secret.clone()),
            None => remove_path(&mut merged, path),
        }
    }

    merged
}
