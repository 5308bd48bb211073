//! Scorch Core Library
//!
//! Destructive purge orchestration for a replicated, eventually-consistent
//! graph store backing a peer-to-peer chat application.
//!
//! ## Overview
//!
//! A purge irreversibly erases every user, conversation, message, friendship
//! and profile, then writes clearly-tagged synthetic records into the same
//! identifier space. The store it runs against:
//!
//! - never signals that an enumeration is complete, so scans settle on an idle
//!   window bounded by a deadline, and report which one fired;
//! - merges writes last-write-wins, so deletion is a dominating tombstone
//!   write rather than removal;
//! - spreads one logical entity over several paths with no transaction across
//!   them, so each entity is tombstoned through its full fan-out write set.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use scorch_core::{MemoryGraphStore, Orchestrator, PurgeConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MemoryGraphStore::new();
//!     store.seed_user("alice");
//!
//!     let orchestrator = Orchestrator::new(Arc::new(store), PurgeConfig::default())?;
//!     let report = orchestrator.emergency_destruction().await?;
//!     println!("{}", serde_json::to_string_pretty(&report)?);
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod purge;
pub mod store;
pub mod types;

// Re-exports
pub use config::{OverwriteCounts, PurgeConfig, ScanSettings};
pub use error::{PurgeError, PurgeResult, StoreError, StoreResult};
pub use orchestrator::{
    Completion, DestructionReport, ErrorResponse, Orchestrator, QuickResetReport, StatusSnapshot,
};
pub use purge::{DestructionLedger, LedgerAction, LedgerEntry, PhaseReport, SettleTrigger};
pub use store::{ChildEvent, ChildStream, GraphStore, MemoryGraphStore};
pub use types::*;
