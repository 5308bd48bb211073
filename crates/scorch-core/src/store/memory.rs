//! In-process last-write-wins replica.
//!
//! `MemoryGraphStore` behaves like a single local replica of the graph store:
//! every path holds a value stamped with a logical clock, local writes always
//! win, and [`MemoryGraphStore::merge_remote`] applies a write from another
//! replica only if its clock is newer. It also carries fault-injection knobs so
//! the orchestrator's failure paths can be exercised without a network.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::{ChildEvent, ChildStream, GraphStore};
use crate::error::{StoreError, StoreResult};
use crate::types::{CollectionRoot, StorePath, StoreValue};

#[derive(Debug, Clone)]
struct Slot {
    clock: u64,
    value: StoreValue,
}

#[derive(Default)]
struct Faults {
    unavailable: HashSet<StorePath>,
    rejected_prefixes: Vec<String>,
    clear_failure: Option<String>,
}

#[derive(Default)]
struct Inner {
    clock: u64,
    slots: BTreeMap<StorePath, Slot>,
    subscribers: Vec<(StorePath, mpsc::UnboundedSender<ChildEvent>)>,
    /// Every write issued through the `GraphStore` interface, in order
    issued: Vec<(StorePath, StoreValue)>,
    /// Local operation journal, wiped by `clear_internal_state`
    journal: Vec<StorePath>,
    faults: Faults,
}

impl Inner {
    fn apply(&mut self, path: &StorePath, value: StoreValue, clock: u64) {
        self.clock = self.clock.max(clock);
        self.slots.insert(
            path.clone(),
            Slot {
                clock,
                value: value.clone(),
            },
        );
        self.journal.push(path.clone());
        self.notify(path, value);
    }

    fn notify(&mut self, path: &StorePath, value: StoreValue) {
        self.subscribers.retain(|(parent, tx)| match path.key_under(parent) {
            Some(key) => tx
                .send(ChildEvent {
                    key: key.to_string(),
                    value: value.clone(),
                })
                .is_ok(),
            None => !tx.is_closed(),
        });
    }
}

/// Shared, cloneable in-memory graph store
#[derive(Clone, Default)]
pub struct MemoryGraphStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a JSON node as local data (not counted as an issued write).
    pub fn seed(&self, path: &StorePath, value: Value) {
        let mut inner = self.inner.lock();
        let clock = inner.clock + 1;
        inner.apply(path, StoreValue::node(value), clock);
    }

    /// Seed a user under all of its denormalized locations.
    pub fn seed_user(&self, id: &str) {
        let record = serde_json::json!({ "id": id, "username": id });
        self.seed(&CollectionRoot::Users.child(id), record.clone());
        self.seed(&StorePath::personal(id), record.clone());
        self.seed(&CollectionRoot::Profiles.child(id), record);
    }

    /// Seed a conversation and its message sub-path.
    pub fn seed_conversation(&self, id: &str, participants: &[&str]) {
        self.seed(
            &CollectionRoot::Conversations.child(id),
            serde_json::json!({ "id": id, "participants": participants }),
        );
        self.seed(
            &CollectionRoot::Messages.child(id),
            serde_json::json!({ "conversation": id }),
        );
    }

    /// Apply a write arriving from another replica under last-write-wins.
    ///
    /// Returns `true` if the write won the merge.
    pub fn merge_remote(&self, path: &StorePath, value: StoreValue, clock: u64) -> bool {
        let mut inner = self.inner.lock();
        let current = inner.slots.get(path).map(|slot| slot.clock).unwrap_or(0);
        if clock <= current {
            trace!(%path, clock, current, "Remote write lost merge");
            return false;
        }
        inner.apply(path, value, clock);
        true
    }

    /// Current value at a path
    pub fn get(&self, path: &StorePath) -> Option<StoreValue> {
        self.inner.lock().slots.get(path).map(|slot| slot.value.clone())
    }

    /// Logical clock of the value at a path (0 if never written)
    pub fn clock_of(&self, path: &StorePath) -> u64 {
        self.inner
            .lock()
            .slots
            .get(path)
            .map(|slot| slot.clock)
            .unwrap_or(0)
    }

    /// Keys of direct children of `parent` whose value is not a tombstone
    pub fn live_children(&self, parent: &StorePath) -> Vec<String> {
        let inner = self.inner.lock();
        inner
            .slots
            .iter()
            .filter(|(_, slot)| !slot.value.is_tombstone())
            .filter_map(|(path, _)| path.key_under(parent).map(str::to_string))
            .collect()
    }

    /// Writes issued through the `GraphStore` interface, in order
    pub fn issued_writes(&self) -> Vec<(StorePath, StoreValue)> {
        self.inner.lock().issued.clone()
    }

    pub fn write_count(&self) -> usize {
        self.inner.lock().issued.len()
    }

    pub fn journal_len(&self) -> usize {
        self.inner.lock().journal.len()
    }

    /// Make subscriptions to `path` fail with `StoreError::Unavailable`.
    pub fn set_unavailable(&self, path: &StorePath) {
        self.inner.lock().faults.unavailable.insert(path.clone());
    }

    /// Reject every write whose path starts with `prefix`.
    pub fn reject_writes_under(&self, prefix: impl Into<String>) {
        self.inner.lock().faults.rejected_prefixes.push(prefix.into());
    }

    /// Make the internal clear hook fail with `reason`.
    pub fn fail_internal_clear(&self, reason: impl Into<String>) {
        self.inner.lock().faults.clear_failure = Some(reason.into());
    }
}

impl GraphStore for MemoryGraphStore {
    fn subscribe_children(&self, path: &StorePath) -> StoreResult<ChildStream> {
        let mut inner = self.inner.lock();
        if inner.faults.unavailable.contains(path) {
            return Err(StoreError::Unavailable(format!("cannot reach {}", path)));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        for (child, slot) in inner.slots.iter() {
            if let Some(key) = child.key_under(path) {
                let _ = tx.send(ChildEvent {
                    key: key.to_string(),
                    value: slot.value.clone(),
                });
            }
        }
        debug!(%path, "Child subscription opened");
        inner.subscribers.push((path.clone(), tx));
        Ok(rx)
    }

    fn write(&self, path: &StorePath, value: StoreValue) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        if let Some(prefix) = inner
            .faults
            .rejected_prefixes
            .iter()
            .find(|prefix| path.as_str().starts_with(prefix.as_str()))
        {
            return Err(StoreError::WriteRejected {
                path: path.clone(),
                reason: format!("writes under '{}' are rejected", prefix),
            });
        }
        let clock = inner.clock + 1;
        inner.issued.push((path.clone(), value.clone()));
        inner.apply(path, value, clock);
        Ok(())
    }

    fn clear_internal_state(&self) -> StoreResult<Vec<String>> {
        let mut inner = self.inner.lock();
        if let Some(reason) = inner.faults.clear_failure.clone() {
            return Err(StoreError::ClearFailed(reason));
        }
        let cleared = inner.journal.len();
        inner.journal.clear();
        debug!(cleared, "Cleared local journal");
        Ok(vec!["journal".to_string()])
    }
}
