//! Fan-out write sets: every physical location of one logical entity.
//!
//! A user, for instance, lives under `users/<id>`, under its personal identity
//! root `~<id>`, and under `profiles/<id>`. Deleting only one of them leaves
//! the entity recoverable, so phases never build paths themselves: they ask
//! the [`FanOutLayout`] for the complete write set of a collection type.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{trace, warn};

use crate::error::{StoreError, StoreResult};
use crate::store::GraphStore;
use crate::types::{CollectionRoot, StorePath, StoreValue};

/// One denormalized location, relative to an entity id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathSlot {
    /// `<collection>/<id>`
    Collection(CollectionRoot),
    /// `~<id>`
    Personal,
}

impl PathSlot {
    pub fn resolve(&self, id: &str) -> StorePath {
        match self {
            PathSlot::Collection(root) => root.child(id),
            PathSlot::Personal => StorePath::personal(id),
        }
    }
}

/// Static mapping from collection type to the slots of its write set
#[derive(Debug, Clone)]
pub struct FanOutLayout {
    slots: HashMap<CollectionRoot, Vec<PathSlot>>,
}

impl Default for FanOutLayout {
    fn default() -> Self {
        use CollectionRoot::*;

        let mut slots = HashMap::new();
        slots.insert(
            Users,
            vec![
                PathSlot::Collection(Users),
                PathSlot::Personal,
                PathSlot::Collection(Profiles),
            ],
        );
        slots.insert(
            Conversations,
            vec![
                PathSlot::Collection(Conversations),
                PathSlot::Collection(Messages),
            ],
        );
        slots.insert(Messages, vec![PathSlot::Collection(Messages)]);
        slots.insert(Friendships, vec![PathSlot::Collection(Friendships)]);
        slots.insert(Profiles, vec![PathSlot::Collection(Profiles)]);
        Self { slots }
    }
}

impl FanOutLayout {
    /// Replace the slots for one collection.
    pub fn with_slots(mut self, root: CollectionRoot, slots: Vec<PathSlot>) -> Self {
        self.slots.insert(root, slots);
        self
    }

    /// Concrete paths for `id`; falls back to `<root>/<id>` for unmapped roots.
    pub fn write_set(&self, id: &str, root: CollectionRoot) -> Vec<StorePath> {
        let mut paths: Vec<StorePath> = match self.slots.get(&root) {
            Some(slots) => slots.iter().map(|slot| slot.resolve(id)).collect(),
            None => vec![root.child(id)],
        };
        let mut seen = std::collections::HashSet::new();
        paths.retain(|path| seen.insert(path.clone()));
        paths
    }
}

/// What happened when one entity's write set was tombstoned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TombstoneOutcome {
    pub entity_id: String,
    pub issued: Vec<StorePath>,
    pub failures: Vec<(StorePath, StoreError)>,
}

impl TombstoneOutcome {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn issued_path(&self, path: &StorePath) -> bool {
        self.issued.contains(path)
    }
}

/// Issues tombstones for entire write sets
#[derive(Clone)]
pub struct FanOutWriter {
    store: Arc<dyn GraphStore>,
    layout: Arc<FanOutLayout>,
}

impl FanOutWriter {
    pub fn new(store: Arc<dyn GraphStore>, layout: FanOutLayout) -> Self {
        Self {
            store,
            layout: Arc::new(layout),
        }
    }

    pub fn write_set(&self, id: &str, root: CollectionRoot) -> Vec<StorePath> {
        self.layout.write_set(id, root)
    }

    /// Issue one tombstone per path of the write set.
    ///
    /// Returns once every write has been issued. A rejected path is logged and
    /// recorded in the outcome; the remaining paths are still written.
    pub fn tombstone(&self, id: &str, root: CollectionRoot) -> TombstoneOutcome {
        let mut outcome = TombstoneOutcome {
            entity_id: id.to_string(),
            issued: Vec::new(),
            failures: Vec::new(),
        };

        for path in self.write_set(id, root) {
            match self.tombstone_path(&path) {
                Ok(()) => outcome.issued.push(path),
                Err(err) => {
                    warn!(%path, entity = %id, error = %err, "PerEntityWriteFailure");
                    outcome.failures.push((path, err));
                }
            }
        }
        outcome
    }

    /// Tombstone a single path.
    pub fn tombstone_path(&self, path: &StorePath) -> StoreResult<()> {
        trace!(%path, "Issuing tombstone");
        self.store.write(path, StoreValue::Tombstone)
    }
}
