//! Graph store client contract
//!
//! The purge core never talks to a concrete database. It consumes the two
//! primitives every replicated graph store offers:
//!
//! - `subscribe_children`: streams every currently-known child of a path, and
//!   keeps streaming children as they replicate in. There is no
//!   end-of-enumeration event; callers infer completion (see
//!   [`ScanCollector`](crate::purge::ScanCollector)).
//! - `write`: fire-and-forget. Success only means the write was *issued*; the
//!   store never acknowledges that it reached other replicas.
//!
//! Deletion is a write of [`StoreValue::Tombstone`]. Under last-write-wins
//! merging a tombstone dominates replica writes with an earlier logical clock,
//! but a later-merging write the orchestrator never observed can resurrect the
//! path. That is a property of the store, not something this crate hides.

mod memory;

pub use memory::MemoryGraphStore;

use tokio::sync::mpsc;

use crate::error::StoreResult;
use crate::types::{StorePath, StoreValue};

/// One child observed under a subscribed path
#[derive(Debug, Clone, PartialEq)]
pub struct ChildEvent {
    pub key: String,
    pub value: StoreValue,
}

/// Stream of child observations; closes only if the store drops the subscription
pub type ChildStream = mpsc::UnboundedReceiver<ChildEvent>;

/// Client interface of a replicated, eventually-consistent graph store
pub trait GraphStore: Send + Sync {
    /// Subscribe to the children of `path`.
    ///
    /// The stream first yields every child the local replica knows about, then
    /// each child that replicates in afterwards. Connectivity problems surface
    /// as [`StoreError::Unavailable`](crate::error::StoreError::Unavailable).
    fn subscribe_children(&self, path: &StorePath) -> StoreResult<ChildStream>;

    /// Issue a write. Returns once issued; errors are synchronous rejections only.
    fn write(&self, path: &StorePath, value: StoreValue) -> StoreResult<()>;

    /// Best-effort clear of low-level caches or on-disk journals.
    ///
    /// Returns the names of whatever was cleared. Stores that expose no such
    /// hook keep the default, which clears nothing.
    fn clear_internal_state(&self) -> StoreResult<Vec<String>> {
        Ok(Vec::new())
    }
}
