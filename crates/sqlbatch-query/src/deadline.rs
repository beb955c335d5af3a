//! Wall-clock budget shared by every call in a batch

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use sqlbatch_core::{QueryCancelHandle, Result, SqlBatchError};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Budget used when none is configured
pub const DEFAULT_BUDGET: Duration = Duration::from_secs(300);

/// A fixed budget that starts counting when created and is never renewed
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started_at: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn new(budget: Duration) -> Self {
        Self {
            started_at: Instant::now(),
            budget,
        }
    }

    /// A deadline whose clock started earlier, e.g. when the process began
    pub fn starting_at(started_at: std::time::Instant, budget: Duration) -> Self {
        Self {
            started_at: Instant::from_std(started_at),
            budget,
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.elapsed())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Fail with `Cancelled` once the budget is spent
    pub fn check(&self) -> Result<()> {
        if self.is_expired() {
            return Err(SqlBatchError::Cancelled(format!(
                "deadline of {:?} exceeded",
                self.budget
            )));
        }
        Ok(())
    }

    /// Start a watchdog that fires `handle` when the budget runs out.
    ///
    /// Must be called from within a tokio runtime. The handle can only
    /// interrupt a blocking driver call if the runtime has another worker
    /// thread to run the watchdog on.
    pub fn arm(&self, handle: Option<Arc<dyn QueryCancelHandle>>) -> DeadlineWatch {
        let fired = Arc::new(AtomicBool::new(false));
        let Some(handle) = handle else {
            tracing::debug!("connection has no cancel handle, deadline is only checked between calls");
            return DeadlineWatch { task: None, fired };
        };

        let remaining = self.remaining();
        let budget = self.budget;
        let task_fired = Arc::clone(&fired);
        let task = tokio::spawn(async move {
            tokio::time::sleep(remaining).await;
            tracing::warn!(?budget, "deadline exceeded, cancelling running statement");
            task_fired.store(true, Ordering::Release);
            handle.cancel();
        });

        DeadlineWatch {
            task: Some(task),
            fired,
        }
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::new(DEFAULT_BUDGET)
    }
}

/// Running watchdog for a [`Deadline`]; dropping it stops the watchdog
pub struct DeadlineWatch {
    task: Option<JoinHandle<()>>,
    fired: Arc<AtomicBool>,
}

impl DeadlineWatch {
    /// Whether the watchdog has cancelled the connection
    pub fn fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}

impl Drop for DeadlineWatch {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
