//! Append-only, in-memory record of actions taken by purge runs.
//!
//! The ledger is an audit trail, separate from diagnostic `tracing` output.
//! It lives for the lifetime of the process, is never persisted, and is bounded
//! by a ring buffer: once `capacity` entries exist the oldest are evicted.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::scan::SettleTrigger;
use crate::types::{CollectionRoot, Phase, StorePath};

/// What happened to a target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerAction {
    PhaseStarted,
    /// Enumeration for the phase settled
    ScanSettled { trigger: SettleTrigger, observed: usize },
    /// Tombstones were issued for the entity; `paths` lists each location written
    Destroyed {
        collection: CollectionRoot,
        paths: Vec<StorePath>,
    },
    /// One path of a write set could not be tombstoned
    WriteFailed { path: StorePath, reason: String },
    /// A collection root itself was tombstoned (`quick_reset`)
    RootTombstoned,
    StoreCleared { hooks: Vec<String> },
    StoreClearFailed { reason: String },
    FakeCreated { collection: CollectionRoot },
    PhaseFailed { reason: String },
    Cancelled,
}

/// One ledger record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub timestamp: DateTime<Utc>,
    pub phase: Phase,
    pub target_id: String,
    pub action: LedgerAction,
    /// Human-readable summary, e.g. `User destroyed: A`
    pub message: String,
}

impl LedgerEntry {
    pub fn new(phase: Phase, target_id: impl Into<String>, action: LedgerAction) -> Self {
        let target_id = target_id.into();
        let message = describe(phase, &target_id, &action);
        Self {
            timestamp: Utc::now(),
            phase,
            target_id,
            action,
            message,
        }
    }
}

impl fmt::Display for LedgerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}",
            self.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            self.message
        )
    }
}

fn describe(phase: Phase, target: &str, action: &LedgerAction) -> String {
    match action {
        LedgerAction::PhaseStarted => format!("Phase started: {}", phase),
        LedgerAction::ScanSettled { trigger, observed } => {
            format!("Scan settled ({}): {} observed in {}", trigger, observed, target)
        }
        LedgerAction::Destroyed { collection, .. } => {
            format!("{} destroyed: {}", collection.entity_noun(), target)
        }
        LedgerAction::WriteFailed { path, reason } => {
            format!("Write failed for {} at {}: {}", target, path, reason)
        }
        LedgerAction::RootTombstoned => format!("Root tombstoned: {}", target),
        LedgerAction::StoreCleared { hooks } if hooks.is_empty() => {
            "Internal store clear: no hooks exposed".to_string()
        }
        LedgerAction::StoreCleared { hooks } => {
            format!("Internal store cleared: {}", hooks.join(", "))
        }
        LedgerAction::StoreClearFailed { reason } => {
            format!("Internal store clear failed: {}", reason)
        }
        LedgerAction::FakeCreated { collection } => format!(
            "Fake {} created: {}",
            collection.entity_noun().to_lowercase(),
            target
        ),
        LedgerAction::PhaseFailed { reason } => format!("Phase {} failed: {}", phase, reason),
        LedgerAction::Cancelled => format!("Run cancelled before {}", phase),
    }
}

struct LedgerInner {
    entries: VecDeque<LedgerEntry>,
    capacity: usize,
    evicted: u64,
}

/// Shared handle to the process-wide ledger
#[derive(Clone)]
pub struct DestructionLedger {
    inner: Arc<RwLock<LedgerInner>>,
}

impl DestructionLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(LedgerInner {
                entries: VecDeque::new(),
                capacity: capacity.max(1),
                evicted: 0,
            })),
        }
    }

    /// Append an entry, evicting the oldest if the ring is full.
    pub fn record(&self, entry: LedgerEntry) {
        let mut inner = self.inner.write();
        if inner.entries.len() == inner.capacity {
            inner.entries.pop_front();
            inner.evicted += 1;
        }
        inner.entries.push_back(entry);
    }

    /// Immutable copy of the current entries, oldest first.
    pub fn snapshot(&self) -> Vec<LedgerEntry> {
        self.inner.read().entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total entries dropped by the ring buffer since creation
    pub fn evicted(&self) -> u64 {
        self.inner.read().evicted
    }

    /// Empty the ledger. Independent of run state.
    pub fn clear(&self) {
        self.inner.write().entries.clear();
    }
}

impl Default for DestructionLedger {
    fn default() -> Self {
        Self::new(crate::config::PurgeConfig::default().ledger_capacity)
    }
}
