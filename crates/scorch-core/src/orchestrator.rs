//! The four entry points a host process exposes.
//!
//! - [`Orchestrator::emergency_destruction`]: guarded full run of all phases
//! - [`Orchestrator::quick_reset`]: unguarded tombstone of the collection roots
//! - [`Orchestrator::get_status`]: non-blocking snapshot
//! - [`Orchestrator::clear_log`]: empty the ledger
//!
//! Every response serializes to JSON with camelCase keys so a host (for
//! example an administrative HTTP endpoint) can return it verbatim.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};
use ulid::Ulid;

use crate::config::PurgeConfig;
use crate::error::{PurgeError, PurgeResult};
use crate::purge::{
    DestructionLedger, FanOutLayout, LedgerAction, LedgerEntry, PhaseReport, PhaseRunner,
    RunGuard,
};
use crate::store::GraphStore;
use crate::types::{Phase, RunState, StorePath};

/// Whether every scan of a run settled on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    /// All scans settled on the idle window (or a closed stream)
    Confident,
    /// At least one scan hit its deadline; writes may still be replicating
    DeadlineForced,
}

/// Result of a run that got past the guard
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DestructionReport {
    pub success: bool,
    pub run_id: String,
    pub duration_ms: u64,
    /// ISO 8601, taken when the run ended
    pub timestamp: String,
    pub completion: Completion,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub phases: Vec<PhaseReport>,
    /// Ledger entries written by this run only
    pub log: Vec<LedgerEntry>,
}

/// JSON body for a request that was refused before doing anything
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub timestamp: String,
}

impl From<&PurgeError> for ErrorResponse {
    fn from(err: &PurgeError) -> Self {
        Self {
            success: false,
            error: err.to_string(),
            timestamp: now_iso8601(),
        }
    }
}

/// One root `quick_reset` could not tombstone
#[derive(Debug, Clone, Serialize)]
pub struct RootFailure {
    pub path: StorePath,
    pub error: String,
}

/// Result of `quick_reset`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickResetReport {
    pub success: bool,
    pub timestamp: String,
    pub tombstoned: Vec<StorePath>,
    pub failures: Vec<RootFailure>,
    /// Always false: children are not enumerated
    pub recursive: bool,
    pub warning: &'static str,
}

const QUICK_RESET_WARNING: &str = "Only collection roots were tombstoned. Children are not \
    enumerated, and a still-replicating child write may resurrect data under a tombstoned \
    root. This is weaker than emergency destruction.";

/// `get_status` response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub running: bool,
    pub state: RunState,
    pub log: Vec<LedgerEntry>,
    /// Entries dropped by the ledger ring buffer
    pub evicted: u64,
    pub timestamp: String,
}

/// Facade over guard, ledger and phase runner
pub struct Orchestrator {
    config: PurgeConfig,
    guard: RunGuard,
    ledger: DestructionLedger,
    runner: PhaseRunner,
    cancel: Mutex<Option<CancellationToken>>,
}

impl Orchestrator {
    /// Build an orchestrator with the default fan-out layout.
    pub fn new(store: Arc<dyn GraphStore>, config: PurgeConfig) -> PurgeResult<Self> {
        Self::with_layout(store, config, FanOutLayout::default())
    }

    pub fn with_layout(
        store: Arc<dyn GraphStore>,
        config: PurgeConfig,
        layout: FanOutLayout,
    ) -> PurgeResult<Self> {
        config.validate()?;
        Ok(Self {
            ledger: DestructionLedger::new(config.ledger_capacity),
            runner: PhaseRunner::new(store, config.clone(), layout),
            guard: RunGuard::new(),
            cancel: Mutex::new(None),
            config,
        })
    }

    /// Run all six phases under the run guard.
    ///
    /// Returns `Err(PurgeError::AlreadyRunning)` immediately, with no writes
    /// and no ledger entries, if another run holds the guard. Otherwise always
    /// returns a report; `success` is false if a phase failed or the run was
    /// cancelled, and `log` then holds the partial ledger.
    pub async fn emergency_destruction(&self) -> PurgeResult<DestructionReport> {
        let permit = self.guard.try_begin()?;
        let run_id = Ulid::new();
        let token = CancellationToken::new();
        let cancel_slot = CancelSlot::publish(&self.cancel, token.clone());

        let started = Instant::now();
        let span = info_span!("purge_run", %run_id);
        info!(parent: &span, "Emergency destruction started");

        let outcome = self
            .runner
            .run_all(&self.ledger, &token)
            .instrument(span.clone())
            .await;

        drop(cancel_slot);
        let success = outcome.failure.is_none();
        let state = permit.finish(success);
        let duration_ms = started.elapsed().as_millis() as u64;

        let completion = if outcome.phases.iter().all(PhaseReport::is_confident) {
            Completion::Confident
        } else {
            Completion::DeadlineForced
        };

        match &outcome.failure {
            None => info!(parent: &span, duration_ms, ?completion, %state, "Emergency destruction complete"),
            Some(err) => warn!(parent: &span, duration_ms, error = %err, %state, "Emergency destruction failed"),
        }

        Ok(DestructionReport {
            success,
            run_id: run_id.to_string(),
            duration_ms,
            timestamp: now_iso8601(),
            completion,
            error: outcome.failure.map(|e| e.to_string()),
            phases: outcome.phases,
            log: outcome.log,
        })
    }

    /// Tombstone each configured collection root once, without recursion.
    ///
    /// Does not take the run guard and gives no mutual exclusion with a
    /// concurrent `emergency_destruction`.
    pub fn quick_reset(&self) -> QuickResetReport {
        let writer = self.runner.writer();
        let mut tombstoned = Vec::new();
        let mut failures = Vec::new();

        for root in &self.config.quick_reset_roots {
            let path = root.path();
            match writer.tombstone_path(&path) {
                Ok(()) => {
                    self.ledger.record(LedgerEntry::new(
                        Phase::QuickReset,
                        root.name(),
                        LedgerAction::RootTombstoned,
                    ));
                    tombstoned.push(path);
                }
                Err(err) => {
                    warn!(%path, error = %err, "Quick reset write failed");
                    self.ledger.record(LedgerEntry::new(
                        Phase::QuickReset,
                        root.name(),
                        LedgerAction::WriteFailed {
                            path: path.clone(),
                            reason: err.to_string(),
                        },
                    ));
                    failures.push(RootFailure {
                        path,
                        error: err.to_string(),
                    });
                }
            }
        }

        info!(roots = tombstoned.len(), failed = failures.len(), "Quick reset issued");
        QuickResetReport {
            success: failures.is_empty(),
            timestamp: now_iso8601(),
            tombstoned,
            failures,
            recursive: false,
            warning: QUICK_RESET_WARNING,
        }
    }

    /// Snapshot of run state and ledger; never waits on a run.
    pub fn get_status(&self) -> StatusSnapshot {
        let state = self.guard.state();
        StatusSnapshot {
            running: state.is_running(),
            state,
            log: self.ledger.snapshot(),
            evicted: self.ledger.evicted(),
            timestamp: now_iso8601(),
        }
    }

    pub fn clear_log(&self) {
        self.ledger.clear();
    }

    /// Request cancellation of the in-flight run, honored between phases.
    ///
    /// Returns false if no run is in progress.
    pub fn cancel(&self) -> bool {
        match self.cancel.lock().as_ref() {
            Some(token) => {
                info!("Cancellation requested");
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn run_state(&self) -> RunState {
        self.guard.state()
    }

    pub fn ledger(&self) -> &DestructionLedger {
        &self.ledger
    }

    pub fn config(&self) -> &PurgeConfig {
        &self.config
    }
}

/// Holds the in-flight run's token in the orchestrator's slot.
///
/// Dropping it empties the slot, including when the host drops the
/// `emergency_destruction` future mid-run.
struct CancelSlot<'a> {
    slot: &'a Mutex<Option<CancellationToken>>,
}

impl<'a> CancelSlot<'a> {
    fn publish(slot: &'a Mutex<Option<CancellationToken>>, token: CancellationToken) -> Self {
        *slot.lock() = Some(token);
        Self { slot }
    }
}

impl Drop for CancelSlot<'_> {
    fn drop(&mut self) {
        self.slot.lock().take();
    }
}

fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
