//! State store contract
//!
//! The store records, per logical name, what was last applied and what the
//! provider reported back. It is the only shared mutable resource of a run.
//! Every mutation carries the revision the writer last observed; a store
//! that has moved on since rejects the write with
//! [`Error::ConcurrentModification`] instead of silently overwriting it.

use crate::diff::inputs_hash;
use crate::error::{Error, Result};
use crate::types::{Attributes, Inputs};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, PoisonError};

/// Current layout version of [`StateRecord`]
pub const RECORD_FORMAT: u32 = 2;

fn record_format() -> u32 {
    RECORD_FORMAT
}

/// Monotonic store version, bumped by every mutation
pub type Revision = u64;

/// Last known live state of one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    /// Layout version this record was written with
    #[serde(default = "record_format")]
    pub format: u32,
    /// Resource kind, needed to pick a provider for deletion
    pub resource_type: String,
    /// Provider assigned identity
    pub live_identity: String,
    /// Hash of the inputs last applied
    pub inputs_hash: String,
    /// The inputs last applied
    #[serde(default)]
    pub inputs: Inputs,
    /// Attributes reported by the provider
    #[serde(default)]
    pub attributes: Attributes,
    /// Dependencies at the time of the last apply, used to order deletions
    #[serde(default)]
    pub dependencies: BTreeSet<String>,
    /// When this record was written
    pub updated_at: DateTime<Utc>,
    /// Earlier incarnations that were replaced but not yet deleted
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retired: Vec<Retired>,
}

/// A superseded live resource still owed a delete
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Retired {
    pub resource_type: String,
    pub live_identity: String,
    /// Inputs it was last applied with, handed back to the provider on delete
    #[serde(default)]
    pub inputs: Inputs,
}

impl From<&StateRecord> for Retired {
    fn from(record: &StateRecord) -> Self {
        Self {
            resource_type: record.resource_type.clone(),
            live_identity: record.live_identity.clone(),
            inputs: record.inputs.clone(),
        }
    }
}

impl StateRecord {
    pub fn new(
        resource_type: impl Into<String>,
        live_identity: impl Into<String>,
        inputs: Inputs,
        attributes: Attributes,
        dependencies: BTreeSet<String>,
    ) -> Self {
        Self {
            format: RECORD_FORMAT,
            resource_type: resource_type.into(),
            live_identity: live_identity.into(),
            inputs_hash: inputs_hash(&inputs),
            inputs,
            attributes,
            dependencies,
            updated_at: Utc::now(),
            retired: Vec::new(),
        }
    }

    /// Same record, owing deletes for `retired`
    pub fn with_retired(mut self, retired: Vec<Retired>) -> Self {
        self.retired = retired;
        self
    }

    /// Outputs visible to other resources: inputs, overlaid with attributes and the identity
    pub fn outputs(&self) -> Value {
        outputs_of(&self.live_identity, &self.inputs, &self.attributes)
    }
}

/// Build the output object of a live resource
pub fn outputs_of(identity: &str, inputs: &Inputs, attributes: &Attributes) -> Value {
    let mut map = serde_json::Map::new();
    for (key, value) in inputs.iter().chain(attributes.iter()) {
        map.insert(key.clone(), value.clone());
    }
    map.insert("id".to_string(), Value::String(identity.to_string()));
    Value::Object(map)
}

/// Everything in a store at one revision
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateSnapshot {
    pub revision: Revision,
    pub records: BTreeMap<String, StateRecord>,
}

impl StateSnapshot {
    pub fn get(&self, name: &str) -> Option<&StateRecord> {
        self.records.get(name)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Durable mapping from logical name to [`StateRecord`]
///
/// Implementations must make `commit` and `remove` atomic with respect to
/// the revision check: compare, write, and bump the revision as one step.
pub trait StateStore: Send + Sync {
    /// Read every record together with the current revision
    fn load(&self) -> Result<StateSnapshot>;

    /// Insert or replace a record; returns the new revision
    fn commit(&self, name: &str, record: &StateRecord, expected: Revision) -> Result<Revision>;

    /// Drop a record; returns the new revision
    fn remove(&self, name: &str, expected: Revision) -> Result<Revision>;
}

/// In-process store, for tests and embedding
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<StateSnapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from existing records
    pub fn with_snapshot(snapshot: StateSnapshot) -> Self {
        Self {
            inner: Mutex::new(snapshot),
        }
    }

    /// Copy of the current records
    pub fn records(&self) -> BTreeMap<String, StateRecord> {
        self.lock().records.clone()
    }

    pub fn revision(&self) -> Revision {
        self.lock().revision
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StateSnapshot> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> Result<StateSnapshot> {
        Ok(self.lock().clone())
    }

    fn commit(&self, name: &str, record: &StateRecord, expected: Revision) -> Result<Revision> {
        let mut state = self.lock();
        check_revision(state.revision, expected)?;
        state.records.insert(name.to_string(), record.clone());
        state.revision += 1;
        Ok(state.revision)
    }

    fn remove(&self, name: &str, expected: Revision) -> Result<Revision> {
        let mut state = self.lock();
        check_revision(state.revision, expected)?;
        state.records.remove(name);
        state.revision += 1;
        Ok(state.revision)
    }
}

fn check_revision(found: Revision, expected: Revision) -> Result<()> {
    if found == expected {
        Ok(())
    } else {
        Err(Error::ConcurrentModification { expected, found })
    }
}

/// A run's view of the store
///
/// Tracks the revision the run last observed and serialises the run's own
/// writes, so concurrent node tasks never trip over each other while writes
/// from anyone else are still detected.
pub struct StateSession<'a> {
    store: &'a dyn StateStore,
    revision: Mutex<Revision>,
}

impl<'a> StateSession<'a> {
    pub fn new(store: &'a dyn StateStore, revision: Revision) -> Self {
        Self {
            store,
            revision: Mutex::new(revision),
        }
    }

    /// Record a successfully applied resource
    pub fn commit(&self, name: &str, record: &StateRecord) -> Result<()> {
        let mut revision = self.revision.lock().unwrap_or_else(PoisonError::into_inner);
        *revision = self.store.commit(name, record, *revision)?;
        log::debug!("Committed state for {name} at revision {}", *revision);
        Ok(())
    }

    /// Forget a deleted resource
    pub fn remove(&self, name: &str) -> Result<()> {
        let mut revision = self.revision.lock().unwrap_or_else(PoisonError::into_inner);
        *revision = self.store.remove(name, *revision)?;
        log::debug!("Removed state for {name} at revision {}", *revision);
        Ok(())
    }

    /// Last revision observed by this run
    pub fn revision(&self) -> Revision {
        *self.revision.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(identity: &str) -> StateRecord {
        StateRecord::new(
            "test",
            identity,
            Inputs::from([("size".to_string(), json!(1))]),
            Attributes::from([("arn".to_string(), json!("arn:test"))]),
            BTreeSet::new(),
        )
    }

    #[test]
    fn test_memory_store_commit_and_remove() {
        let store = MemoryStore::new();
        let rev = store.commit("a", &record("a-1"), 0).unwrap();
        assert_eq!(rev, 1);
        assert_eq!(store.load().unwrap().get("a").unwrap().live_identity, "a-1");

        let rev = store.remove("a", rev).unwrap();
        assert_eq!(rev, 2);
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_memory_store_rejects_stale_revision() {
        let store = MemoryStore::new();
        store.commit("a", &record("a-1"), 0).unwrap();

        let err = store.commit("b", &record("b-1"), 0).unwrap_err();
        assert!(matches!(
            err,
            Error::ConcurrentModification {
                expected: 0,
                found: 1
            }
        ));
        assert!(!store.records().contains_key("b"));
    }

    #[test]
    fn test_session_tracks_its_own_writes() {
        let store = MemoryStore::new();
        let session = StateSession::new(&store, 0);
        session.commit("a", &record("a-1")).unwrap();
        session.commit("b", &record("b-1")).unwrap();
        session.remove("a").unwrap();
        assert_eq!(session.revision(), 3);
        assert_eq!(store.records().len(), 1);
    }

    #[test]
    fn test_session_detects_external_writer() {
        let store = MemoryStore::new();
        let session = StateSession::new(&store, 0);
        session.commit("a", &record("a-1")).unwrap();

        // Someone else writes between our commits.
        store.commit("intruder", &record("x-1"), 1).unwrap();

        let err = session.commit("b", &record("b-1")).unwrap_err();
        assert!(matches!(err, Error::ConcurrentModification { .. }));
    }

    #[test]
    fn test_record_outputs_overlay() {
        let record = StateRecord::new(
            "test",
            "res-1",
            Inputs::from([
                ("name".to_string(), json!("app")),
                ("arn".to_string(), json!("input-arn")),
            ]),
            Attributes::from([("arn".to_string(), json!("arn:live"))]),
            BTreeSet::new(),
        );
        let outputs = record.outputs();
        assert_eq!(outputs["id"], json!("res-1"));
        assert_eq!(outputs["name"], json!("app"));
        assert_eq!(outputs["arn"], json!("arn:live"));
    }

    #[test]
    fn test_retired_incarnations_are_persisted() {
        let old = record("a-1");
        let current = record("a-2").with_retired(vec![Retired::from(&old)]);

        let json = serde_json::to_value(&current).unwrap();
        assert_eq!(json["retired"][0]["live_identity"], json!("a-1"));
        let decoded: StateRecord = serde_json::from_value(json).unwrap();
        assert_eq!(decoded.retired, current.retired);

        // Nothing owed, nothing written.
        let json = serde_json::to_value(record("b-1")).unwrap();
        assert!(json.get("retired").is_none());
        let decoded: StateRecord = serde_json::from_value(json).unwrap();
        assert!(decoded.retired.is_empty());
    }

    #[test]
    fn test_record_layout_is_versioned() {
        let record = record("a-1");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["format"], json!(RECORD_FORMAT));

        // Records written before the format field existed still load.
        let mut legacy = json.clone();
        legacy.as_object_mut().unwrap().remove("format");
        legacy.as_object_mut().unwrap().remove("dependencies");
        let decoded: StateRecord = serde_json::from_value(legacy).unwrap();
        assert_eq!(decoded.format, RECORD_FORMAT);
        assert!(decoded.dependencies.is_empty());
    }
}
