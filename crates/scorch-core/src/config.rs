//! Configuration for purge runs
//!
//! Every field has a default, so an empty JSON object (`{}`) is a valid
//! configuration file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PurgeError, PurgeResult};
use crate::types::CollectionRoot;

/// Settle parameters for a single collection scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Quiet period after the last new identifier before a scan is settled
    pub idle_window_ms: u64,
    /// Hard cutoff measured from the start of the scan
    pub deadline_ms: u64,
}

impl ScanSettings {
    pub fn idle_window(&self) -> Duration {
        Duration::from_millis(self.idle_window_ms)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            idle_window_ms: 2_000,
            deadline_ms: 15_000,
        }
    }
}

/// How many synthetic records to write after tombstoning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverwriteCounts {
    pub users: usize,
    pub conversations: usize,
}

impl OverwriteCounts {
    /// Configured count for a collection (zero for collections not overwritten)
    pub fn for_collection(&self, root: CollectionRoot) -> usize {
        match root {
            CollectionRoot::Users => self.users,
            CollectionRoot::Conversations => self.conversations,
            _ => 0,
        }
    }
}

impl Default for OverwriteCounts {
    fn default() -> Self {
        Self {
            users: 5,
            conversations: 3,
        }
    }
}

/// Top-level purge configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PurgeConfig {
    pub scan: ScanSettings,
    /// Upper bound on in-flight tombstone writes within one phase
    pub write_concurrency: usize,
    pub overwrite: OverwriteCounts,
    /// Ledger ring-buffer size; the oldest entries are evicted past this
    pub ledger_capacity: usize,
    /// Roots tombstoned by `quick_reset`
    pub quick_reset_roots: Vec<CollectionRoot>,
}

impl Default for PurgeConfig {
    fn default() -> Self {
        Self {
            scan: ScanSettings::default(),
            write_concurrency: 16,
            overwrite: OverwriteCounts::default(),
            ledger_capacity: 10_000,
            quick_reset_roots: CollectionRoot::ALL.to_vec(),
        }
    }
}

impl PurgeConfig {
    /// Load and validate a JSON configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> PurgeResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&raw)
    }

    /// Parse and validate a JSON configuration string.
    pub fn from_json(raw: &str) -> PurgeResult<Self> {
        let config: PurgeConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PurgeResult<()> {
        if self.write_concurrency == 0 {
            return Err(PurgeError::Config(
                "write_concurrency must be at least 1".to_string(),
            ));
        }
        if self.scan.idle_window_ms == 0 {
            return Err(PurgeError::Config(
                "scan.idle_window_ms must be greater than zero".to_string(),
            ));
        }
        if self.scan.deadline_ms < self.scan.idle_window_ms {
            return Err(PurgeError::Config(format!(
                "scan.deadline_ms ({}) is shorter than scan.idle_window_ms ({})",
                self.scan.deadline_ms, self.scan.idle_window_ms
            )));
        }
        if self.ledger_capacity == 0 {
            return Err(PurgeError::Config(
                "ledger_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
