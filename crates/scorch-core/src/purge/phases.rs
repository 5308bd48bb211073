//! Ordered execution of the six destruction phases.
//!
//! ```text
//! Users ─▶ Conversations ─▶ Messages ─▶ Friendships ─▶ InternalStoreClear ─▶ AntiRecoveryOverwrite
//! ```
//!
//! Phases run strictly one after another on the calling task. Inside a
//! tombstoning phase, write sets are handed to a bounded pool of blocking
//! workers (`write_concurrency`), and results are collected in enumeration
//! order so the ledger stays deterministic.
//!
//! A phase is complete once its scan has settled and every observed id has had
//! its tombstones issued. An error escaping a phase aborts the rest of the run;
//! nothing already issued is rolled back.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::fanout::{FanOutLayout, FanOutWriter, TombstoneOutcome};
use super::ledger::{DestructionLedger, LedgerAction, LedgerEntry};
use super::overwrite::AntiRecoveryOverwriter;
use super::scan::{ScanCollector, SettleTrigger};
use crate::config::PurgeConfig;
use crate::error::{PurgeError, PurgeResult};
use crate::store::GraphStore;
use crate::types::{CollectionRoot, Phase};

/// Summary of one finished phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseReport {
    pub phase: Phase,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// How the phase's scan settled (tombstoning phases only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger: Option<SettleTrigger>,
    /// Identifiers observed by the scan
    pub enumerated: usize,
    /// Identifiers skipped because an earlier phase already covered them
    pub skipped: usize,
    /// Identifiers that had at least one tombstone issued
    pub tombstoned: usize,
    pub paths_issued: usize,
    pub paths_failed: usize,
    pub records_created: usize,
}

impl PhaseReport {
    fn begin(phase: Phase) -> Self {
        let now = Utc::now();
        Self {
            phase,
            started_at: now,
            completed_at: now,
            trigger: None,
            enumerated: 0,
            skipped: 0,
            tombstoned: 0,
            paths_issued: 0,
            paths_failed: 0,
            records_created: 0,
        }
    }

    fn complete(mut self) -> Self {
        self.completed_at = Utc::now();
        self
    }

    /// True unless the scan was cut off by its deadline
    pub fn is_confident(&self) -> bool {
        self.trigger.map(|t| t.is_confident()).unwrap_or(true)
    }
}

/// Outcome of a whole run: the phases that finished, and what stopped it
#[derive(Debug)]
pub struct RunOutcome {
    pub phases: Vec<PhaseReport>,
    pub failure: Option<PurgeError>,
    /// Ledger entries written by this run, in order
    pub log: Vec<LedgerEntry>,
}

/// Appends to the shared ledger and keeps this run's own copy
struct Recorder {
    ledger: DestructionLedger,
    entries: Vec<LedgerEntry>,
}

impl Recorder {
    fn record(&mut self, phase: Phase, target: impl Into<String>, action: LedgerAction) {
        let entry = LedgerEntry::new(phase, target, action);
        self.ledger.record(entry.clone());
        self.entries.push(entry);
    }
}

/// Runs the ordered phases against one store
pub struct PhaseRunner {
    store: Arc<dyn GraphStore>,
    scanner: ScanCollector,
    writer: FanOutWriter,
    overwriter: AntiRecoveryOverwriter,
    config: PurgeConfig,
}

impl PhaseRunner {
    pub fn new(store: Arc<dyn GraphStore>, config: PurgeConfig, layout: FanOutLayout) -> Self {
        Self {
            scanner: ScanCollector::new(store.clone(), config.scan),
            writer: FanOutWriter::new(store.clone(), layout),
            overwriter: AntiRecoveryOverwriter::new(store.clone()),
            store,
            config,
        }
    }

    pub fn writer(&self) -> &FanOutWriter {
        &self.writer
    }

    /// Run every phase in order, checking `cancel` between phases.
    pub async fn run_all(&self, ledger: &DestructionLedger, cancel: &CancellationToken) -> RunOutcome {
        let mut recorder = Recorder {
            ledger: ledger.clone(),
            entries: Vec::new(),
        };
        let mut reports: Vec<PhaseReport> = Vec::new();
        let mut covered_messages: HashSet<String> = HashSet::new();

        for phase in Phase::ORDERED {
            if cancel.is_cancelled() {
                info!(%phase, "Run cancelled between phases");
                recorder.record(phase, phase.to_string(), LedgerAction::Cancelled);
                return RunOutcome {
                    phases: reports,
                    failure: Some(PurgeError::Cancelled(phase)),
                    log: recorder.entries,
                };
            }

            info!(%phase, "Phase starting");
            recorder.record(phase, phase.to_string(), LedgerAction::PhaseStarted);

            let result = match phase.collection() {
                Some(root) => {
                    self.tombstone_collection(phase, root, &mut covered_messages, &mut recorder)
                        .await
                }
                None if phase == Phase::InternalStoreClear => Ok(self.clear_store(&mut recorder)),
                None => Ok(self.overwrite(&reports, &mut recorder)),
            };

            match result {
                Ok(report) => {
                    info!(
                        %phase,
                        enumerated = report.enumerated,
                        tombstoned = report.tombstoned,
                        failed = report.paths_failed,
                        created = report.records_created,
                        confident = report.is_confident(),
                        "Phase complete"
                    );
                    reports.push(report);
                }
                Err(err) => {
                    error!(%phase, error = %err, "Phase failed; aborting remaining phases");
                    let failure = err.in_phase(phase);
                    recorder.record(
                        phase,
                        phase.to_string(),
                        LedgerAction::PhaseFailed {
                            reason: failure.root_cause().to_string(),
                        },
                    );
                    return RunOutcome {
                        phases: reports,
                        failure: Some(failure),
                        log: recorder.entries,
                    };
                }
            }
        }

        RunOutcome {
            phases: reports,
            failure: None,
            log: recorder.entries,
        }
    }

    async fn tombstone_collection(
        &self,
        phase: Phase,
        root: CollectionRoot,
        covered_messages: &mut HashSet<String>,
        recorder: &mut Recorder,
    ) -> PurgeResult<PhaseReport> {
        let mut report = PhaseReport::begin(phase);

        let scan = self.scanner.enumerate(root).await?;
        report.trigger = Some(scan.trigger);
        report.enumerated = scan.ids.len();
        recorder.record(
            phase,
            root.name(),
            LedgerAction::ScanSettled {
                trigger: scan.trigger,
                observed: scan.ids.len(),
            },
        );

        // Messages already tombstoned as part of a conversation's write set
        let targets: Vec<String> = if phase == Phase::Messages {
            scan.ids
                .into_iter()
                .filter(|id| !covered_messages.contains(id))
                .collect()
        } else {
            scan.ids
        };
        report.skipped = report.enumerated - targets.len();

        let outcomes: Vec<_> = stream::iter(targets)
            .map(|id| {
                let writer = self.writer.clone();
                tokio::task::spawn_blocking(move || writer.tombstone(&id, root))
            })
            .buffered(self.config.write_concurrency)
            .collect()
            .await;

        // Every finished outcome is recorded before the first worker failure
        // is returned; later write sets were already issued.
        let mut worker_failure = None;
        for joined in outcomes {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(err) => {
                    error!(%phase, error = %err, "Tombstone worker failed");
                    worker_failure.get_or_insert(PurgeError::Worker(err.to_string()));
                    continue;
                }
            };
            self.record_outcome(phase, root, &outcome, &mut report, recorder);

            if phase == Phase::Conversations
                && outcome.issued_path(&CollectionRoot::Messages.child(&outcome.entity_id))
            {
                covered_messages.insert(outcome.entity_id);
            }
        }
        if let Some(err) = worker_failure {
            return Err(err.in_phase(phase));
        }

        if !report.is_confident() {
            warn!(%phase, "Phase completed on a deadline-forced scan; writes may still be replicating");
        }
        Ok(report.complete())
    }

    fn record_outcome(
        &self,
        phase: Phase,
        root: CollectionRoot,
        outcome: &TombstoneOutcome,
        report: &mut PhaseReport,
        recorder: &mut Recorder,
    ) {
        for (path, err) in &outcome.failures {
            recorder.record(
                phase,
                outcome.entity_id.clone(),
                LedgerAction::WriteFailed {
                    path: path.clone(),
                    reason: err.to_string(),
                },
            );
        }
        report.paths_failed += outcome.failures.len();
        report.paths_issued += outcome.issued.len();

        if !outcome.issued.is_empty() {
            report.tombstoned += 1;
            recorder.record(
                phase,
                outcome.entity_id.clone(),
                LedgerAction::Destroyed {
                    collection: root,
                    paths: outcome.issued.clone(),
                },
            );
        }
    }

    /// Best-effort low-level clear; never fails the run.
    fn clear_store(&self, recorder: &mut Recorder) -> PhaseReport {
        let phase = Phase::InternalStoreClear;
        let report = PhaseReport::begin(phase);
        match self.store.clear_internal_state() {
            Ok(hooks) => {
                debug!(?hooks, "Internal store state cleared");
                recorder.record(phase, "store", LedgerAction::StoreCleared { hooks });
            }
            Err(err) => {
                warn!(error = %err, "Internal store clear failed; continuing");
                recorder.record(
                    phase,
                    "store",
                    LedgerAction::StoreClearFailed {
                        reason: err.to_string(),
                    },
                );
            }
        }
        report.complete()
    }

    fn overwrite(&self, earlier: &[PhaseReport], recorder: &mut Recorder) -> PhaseReport {
        let phase = Phase::AntiRecoveryOverwrite;
        let mut report = PhaseReport::begin(phase);

        let tombstoned_at: HashMap<CollectionRoot, DateTime<Utc>> = earlier
            .iter()
            .filter_map(|r| r.phase.collection().map(|c| (c, r.completed_at)))
            .collect();

        for root in [CollectionRoot::Users, CollectionRoot::Conversations] {
            let count = self.config.overwrite.for_collection(root);
            let result = self
                .overwriter
                .overwrite(root, count, tombstoned_at.get(&root).copied());

            for (path, err) in &result.failures {
                recorder.record(
                    phase,
                    path.to_string(),
                    LedgerAction::WriteFailed {
                        path: path.clone(),
                        reason: err.to_string(),
                    },
                );
            }
            report.paths_failed += result.failures.len();

            for record in result.created {
                report.paths_issued += record.paths.len();
                report.records_created += 1;
                recorder.record(
                    phase,
                    record.id,
                    LedgerAction::FakeCreated { collection: root },
                );
            }
        }
        report.complete()
    }
}
