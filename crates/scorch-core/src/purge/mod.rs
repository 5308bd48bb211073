//! Building blocks of a destruction run.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  PhaseRunner                                                      │
//! │  ├── ScanCollector     settle-on-idle enumeration of a root       │
//! │  ├── FanOutWriter      tombstones every path of a write set       │
//! │  └── AntiRecoveryOverwriter  fake records after tombstoning       │
//! │                                                                   │
//! │  RunGuard              Idle/Running/Completed/Failed, one writer   │
//! │  DestructionLedger     append-only audit trail, snapshot reads    │
//! └───────────────────────────────────────────────────────────────────┘
//! ```

pub mod fanout;
pub mod guard;
pub mod ledger;
pub mod overwrite;
pub mod phases;
pub mod scan;

pub use fanout::{FanOutLayout, FanOutWriter, PathSlot, TombstoneOutcome};
pub use guard::{RunGuard, RunPermit};
pub use ledger::{DestructionLedger, LedgerAction, LedgerEntry};
pub use overwrite::{AntiRecoveryOverwriter, FakeRecord, OverwriteReport};
pub use phases::{PhaseReport, PhaseRunner, RunOutcome};
pub use scan::{ScanCollector, ScanOutcome, SettleTrigger};
