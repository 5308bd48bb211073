//! Debounced enumeration of a collection's children.
//!
//! The store never says "that was the last child". A scan therefore settles
//! on whichever fires first:
//!
//! - the **idle window**: no previously-unseen identifier arrived for
//!   `idle_window` (the timer resets on every new identifier), or
//! - the **deadline**: `deadline` elapsed since the scan began, or
//! - the subscription stream closed.
//!
//! Only the idle window and a closed stream count as confident completion. A
//! deadline cutoff means replication may still be delivering children.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::config::ScanSettings;
use crate::error::PurgeResult;
use crate::store::{ChildEvent, ChildStream, GraphStore};
use crate::types::{CollectionRoot, StorePath};

/// Which condition ended a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettleTrigger {
    Idle,
    Deadline,
    StreamClosed,
}

impl SettleTrigger {
    pub fn is_confident(&self) -> bool {
        !matches!(self, SettleTrigger::Deadline)
    }
}

impl fmt::Display for SettleTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettleTrigger::Idle => write!(f, "idle"),
            SettleTrigger::Deadline => write!(f, "deadline"),
            SettleTrigger::StreamClosed => write!(f, "stream closed"),
        }
    }
}

/// Result of one settled scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOutcome {
    pub path: StorePath,
    /// Live identifiers in arrival order, without duplicates
    pub ids: Vec<String>,
    pub trigger: SettleTrigger,
    /// Identifiers only ever observed as tombstones
    pub already_absent: usize,
    pub elapsed: Duration,
}

/// Enumerates the currently-observable children of a collection root
#[derive(Clone)]
pub struct ScanCollector {
    store: Arc<dyn GraphStore>,
    settings: ScanSettings,
}

impl ScanCollector {
    pub fn new(store: Arc<dyn GraphStore>, settings: ScanSettings) -> Self {
        Self { store, settings }
    }

    /// Run one fresh pass over `root`. Nothing is cached between calls.
    pub async fn enumerate(&self, root: CollectionRoot) -> PurgeResult<ScanOutcome> {
        self.enumerate_path(&root.path()).await
    }

    pub async fn enumerate_path(&self, path: &StorePath) -> PurgeResult<ScanOutcome> {
        let stream = self.store.subscribe_children(path)?;
        Ok(settle(path.clone(), stream, self.settings).await)
    }
}

/// Drain `stream` until it settles under `settings`.
pub async fn settle(path: StorePath, mut stream: ChildStream, settings: ScanSettings) -> ScanOutcome {
    let started = Instant::now();
    let deadline = tokio::time::sleep(settings.deadline());
    let idle = tokio::time::sleep(settings.idle_window());
    tokio::pin!(deadline);
    tokio::pin!(idle);

    let mut seen = HashSet::new();
    let mut absent = HashSet::new();
    let mut ids = Vec::new();

    let trigger = loop {
        tokio::select! {
            biased;
            // An idle window that expired on the same tick still counts as settled
            _ = &mut deadline => break if idle.deadline() <= deadline.deadline() {
                SettleTrigger::Idle
            } else {
                SettleTrigger::Deadline
            },
            event = stream.recv() => match event {
                Some(ChildEvent { key, value }) => {
                    if value.is_tombstone() {
                        if !seen.contains(&key) {
                            absent.insert(key);
                        }
                        continue;
                    }
                    if seen.insert(key.clone()) {
                        trace!(%path, %key, "Observed child");
                        absent.remove(&key);
                        ids.push(key);
                        idle.as_mut().reset(Instant::now() + settings.idle_window());
                    }
                }
                None => break SettleTrigger::StreamClosed,
            },
            _ = &mut idle => break SettleTrigger::Idle,
        }
    };

    let elapsed = started.elapsed();
    if trigger.is_confident() {
        debug!(%path, observed = ids.len(), %trigger, ?elapsed, "Scan settled");
    } else {
        warn!(%path, observed = ids.len(), ?elapsed, "Scan cut off by deadline; results may be incomplete");
    }

    ScanOutcome {
        path,
        ids,
        trigger,
        already_absent: absent.len(),
        elapsed,
    }
}
