//! Batch executor implementation
//!
//! One transaction spans the whole sequence. The first failing call rolls
//! it back and ends the batch; nothing after it runs.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use sqlbatch_core::{
    Call, CallKind, CallSequence, Connection, Result, ResultSink, SqlBatchError, Transaction,
    TransactionBehavior,
};
use strum::Display;

use crate::deadline::Deadline;

/// Configuration options for batch execution
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Budget shared by every call and the commit. Its clock runs from when
    /// the `Deadline` was created, not from when the batch starts.
    pub deadline: Deadline,
    /// How the batch transaction is opened
    pub behavior: TransactionBehavior,
}

impl BatchOptions {
    /// Create new batch options with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the batch deadline
    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = deadline;
        self
    }

    /// Set how the transaction is opened
    pub fn with_behavior(mut self, behavior: TransactionBehavior) -> Self {
        self.behavior = behavior;
        self
    }
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            deadline: Deadline::default(),
            behavior: TransactionBehavior::default(),
        }
    }
}

/// Where a batch is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
pub enum BatchState {
    NotStarted,
    TransactionOpen,
    Committed,
    RolledBack,
}

impl BatchState {
    /// Committed and RolledBack are final
    pub fn is_terminal(self) -> bool {
        matches!(self, BatchState::Committed | BatchState::RolledBack)
    }
}

/// Result of one successful call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallOutcome {
    /// Position of the call in the sequence (0-based)
    pub index: usize,
    pub kind: CallKind,
    pub statement: String,
    /// Rows affected for exec calls, rows rendered for query calls
    pub rows: u64,
    pub elapsed: Duration,
}

/// Summary of a committed batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    /// One entry per call, in declaration order
    pub outcomes: Vec<CallOutcome>,
    pub state: BatchState,
    pub elapsed: Duration,
}

impl BatchReport {
    /// Get the total number of rows affected across exec calls
    pub fn total_affected_rows(&self) -> u64 {
        self.outcomes
            .iter()
            .filter(|o| o.kind == CallKind::Exec)
            .map(|o| o.rows)
            .sum()
    }

    pub fn call_count(&self) -> usize {
        self.outcomes.len()
    }
}

/// Receives call progress while a batch runs.
///
/// Query results arrive through [`ResultSink::consume`]; an error returned
/// from any method fails the current call.
pub trait BatchReporter: ResultSink {
    /// Called before a call is sent to the database
    fn call_started(&mut self, index: usize, call: &Call) -> Result<()>;

    /// Called after an exec call succeeds
    fn rows_affected(&mut self, index: usize, call: &Call, rows: u64) -> Result<()>;
}

/// Runs one call sequence as a single unit of work.
///
/// An executor is consumed by [`BatchExecutor::execute`] and cannot be reused.
#[derive(Debug)]
pub struct BatchExecutor {
    options: BatchOptions,
    state: BatchState,
}

impl BatchExecutor {
    /// Create a new batch executor with the given options
    pub fn new(options: BatchOptions) -> Self {
        Self {
            options,
            state: BatchState::NotStarted,
        }
    }

    /// Create a batch executor with default options
    pub fn with_defaults() -> Self {
        Self::new(BatchOptions::default())
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    /// Execute every call of `sequence` inside one transaction on `conn`.
    ///
    /// The transaction is committed only if every call succeeds. On the
    /// first failure it is rolled back and that failure is returned. The
    /// deadline is checked before every call and once more before the commit.
    #[tracing::instrument(skip_all, fields(batch_id = %uuid::Uuid::new_v4(), calls = sequence.len()))]
    pub async fn execute<R: BatchReporter>(
        mut self,
        conn: &Arc<dyn Connection>,
        sequence: CallSequence,
        reporter: &mut R,
    ) -> Result<BatchReport> {
        let batch_start = Instant::now();
        let deadline = self.options.deadline;
        let watch = deadline.arm(conn.cancel_handle());
        // driver calls block the worker; the watchdog must register its timer first
        tokio::task::yield_now().await;

        let tx = conn.begin_transaction(self.options.behavior).await?;
        self.transition(BatchState::TransactionOpen);

        let mut outcomes = Vec::with_capacity(sequence.len());
        for (index, call) in sequence.into_iter().enumerate() {
            match run_call(tx.as_ref(), index, &call, &deadline, reporter).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    let error = classify_failure(e, &deadline);
                    tracing::warn!(index, error = %error, "call failed, rolling back batch");
                    self.roll_back(tx).await;
                    return Err(error);
                }
            }
        }

        if let Err(error) = deadline.check() {
            tracing::warn!(error = %error, "deadline spent before commit, rolling back batch");
            self.roll_back(tx).await;
            return Err(error);
        }

        // still armed: the commit counts against the budget
        let committed = tx.commit().await;
        drop(watch);
        if let Err(e) = committed {
            self.transition(BatchState::RolledBack);
            return Err(match e {
                commit @ SqlBatchError::Commit(_) => commit,
                other => SqlBatchError::Commit(other.to_string()),
            });
        }
        self.transition(BatchState::Committed);

        let elapsed = batch_start.elapsed();
        tracing::info!(calls = outcomes.len(), ?elapsed, "batch committed");
        Ok(BatchReport {
            outcomes,
            state: self.state,
            elapsed,
        })
    }

    /// Roll back after a failure. A rollback error is logged; the caller
    /// returns the failure that caused it.
    async fn roll_back(&mut self, tx: Box<dyn Transaction>) {
        if let Err(rollback_error) = tx.rollback().await {
            tracing::error!(error = %rollback_error, "rollback after failed batch also failed");
        }
        self.transition(BatchState::RolledBack);
    }

    fn transition(&mut self, next: BatchState) {
        tracing::debug!(from = %self.state, to = %next, "batch state transition");
        self.state = next;
    }
}

impl Default for BatchExecutor {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Execute a single call within the batch transaction
async fn run_call<R: BatchReporter>(
    tx: &dyn Transaction,
    index: usize,
    call: &Call,
    deadline: &Deadline,
    reporter: &mut R,
) -> Result<CallOutcome> {
    deadline.check()?;
    let start = Instant::now();
    tracing::debug!(index, kind = %call.kind(), args = call.arguments().len(), "running call");

    reporter.call_started(index, call)?;
    let rows = match call.kind() {
        CallKind::Exec => {
            let affected = tx.execute(call.statement(), call.arguments()).await?;
            reporter.rows_affected(index, call, affected)?;
            affected
        }
        CallKind::Query => {
            tx.query(call.statement(), call.arguments(), reporter)
                .await?
        }
    };

    Ok(CallOutcome {
        index,
        kind: call.kind(),
        statement: call.statement().to_string(),
        rows,
        elapsed: start.elapsed(),
    })
}

/// A statement failing once the budget is spent was almost certainly
/// interrupted by the deadline watchdog. An interruption surfacing while
/// rows were rendered is still a statement failure.
pub(super) fn classify_failure(error: SqlBatchError, deadline: &Deadline) -> SqlBatchError {
    match error {
        SqlBatchError::Render(cause) if matches!(*cause, SqlBatchError::Cancelled(_)) => *cause,
        SqlBatchError::Statement(message) if deadline.is_expired() => SqlBatchError::Cancelled(
            format!("deadline of {:?} exceeded: {}", deadline.budget(), message),
        ),
        other => other,
    }
}
