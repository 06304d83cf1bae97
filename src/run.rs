//! Run-scoped controls: cancellation, deadlines and advisory progress.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{LipsyncError, Result};

/// Cancellation flag plus an optional deadline, checked at every frame boundary.
///
/// Clones share the same flag, so a handle can be moved to another thread
/// (e.g. a Ctrl-C handler) and used to abandon the run.
#[derive(Clone, Debug, Default)]
pub struct RunControl {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Instant::now().checked_add(timeout),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Time left before the deadline, if one is set.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(LipsyncError::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(LipsyncError::TimedOut);
            }
        }
        Ok(())
    }
}

/// Advisory progress sink. Implementations must not block; results never depend on it.
pub trait Progress: Sync {
    fn update(&self, stage: Stage, done: usize, total: usize);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Extract,
    Sequence,
    Render,
    Export,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Extract => "extract",
            Stage::Sequence => "sequence",
            Stage::Render => "render",
            Stage::Export => "export",
        };
        f.write_str(name)
    }
}

/// Progress sink that drops every update.
pub struct NoProgress;

impl Progress for NoProgress {
    fn update(&self, _stage: Stage, _done: usize, _total: usize) {}
}

impl<F> Progress for F
where
    F: Fn(Stage, usize, usize) + Sync,
{
    fn update(&self, stage: Stage, done: usize, total: usize) {
        self(stage, done, total)
    }
}
