//! Single-writer run guard.
//!
//! ```text
//!   Idle ──try_begin──▶ Running ──finish(true)──▶ Completed ─┐
//!    ▲                     │                                 │
//!    │                     └──finish(false) / drop──▶ Failed ┤
//!    └───────────── next try_begin starts fresh ◀────────────┘
//! ```
//!
//! `try_begin` is the only decision point and runs under one lock, so two
//! callers can never both observe `Idle` and start. The returned
//! [`RunPermit`] releases the guard on every exit path: an explicit
//! [`RunPermit::finish`], or `Drop` (early return, `?`, panic unwind), which
//! marks the run `Failed`.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{PurgeError, PurgeResult};
use crate::types::RunState;

#[derive(Clone, Default)]
pub struct RunGuard {
    state: Arc<Mutex<RunState>>,
}

impl RunGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transition to `Running`, or fail with `AlreadyRunning` without side effects.
    pub fn try_begin(&self) -> PurgeResult<RunPermit> {
        let mut state = self.state.lock();
        if state.is_running() {
            debug!("Run guard rejected concurrent start");
            return Err(PurgeError::AlreadyRunning);
        }
        debug!(previous = %*state, "Run guard acquired");
        *state = RunState::Running;
        Ok(RunPermit {
            state: self.state.clone(),
            finished: false,
        })
    }

    /// Current state (a copy)
    pub fn state(&self) -> RunState {
        *self.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }
}

/// Proof that the holder owns the current run
#[must_use = "dropping a RunPermit immediately marks the run Failed"]
pub struct RunPermit {
    state: Arc<Mutex<RunState>>,
    finished: bool,
}

impl RunPermit {
    /// End the run as `Completed` (`success`) or `Failed`.
    pub fn finish(mut self, success: bool) -> RunState {
        let terminal = if success {
            RunState::Completed
        } else {
            RunState::Failed
        };
        *self.state.lock() = terminal;
        self.finished = true;
        terminal
    }
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        if !self.finished {
            warn!("Run ended without finishing; marking Failed");
            *self.state.lock() = RunState::Failed;
        }
    }
}
