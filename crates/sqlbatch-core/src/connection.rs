//! Connection trait and transaction handling

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum::{Display, EnumString, VariantNames};

use crate::{BoundArgument, Result, Value};

/// Rows of a result set, produced one at a time while the cursor is open.
pub type RowStream<'a> = dyn Iterator<Item = Result<Vec<Value>>> + 'a;

/// Handle for cancelling a running statement from any thread.
///
/// Calling it when nothing is running is a no-op, and it may be called
/// more than once.
pub trait QueryCancelHandle: Send + Sync {
    /// Interrupt the statement currently running on the associated connection.
    fn cancel(&self);
}

/// Receives the result set of a query while its cursor is still open.
///
/// The driver keeps the cursor alive only for the duration of `consume`, so
/// an implementation must finish with the rows before returning.
pub trait ResultSink: Send {
    /// Consume a result set, returning the number of rows taken from `rows`.
    fn consume(&mut self, columns: &[String], rows: &mut RowStream<'_>) -> Result<u64>;
}

/// How a transaction acquires its locks
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, VariantNames, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionBehavior {
    /// Locks are taken by the first read or write
    #[default]
    Deferred,
    /// The write lock is taken immediately
    Immediate,
    /// Readers and writers are excluded for the whole transaction
    Exclusive,
}

impl TransactionBehavior {
    /// SQL that opens a transaction with this behavior
    pub fn begin_statement(self) -> &'static str {
        match self {
            TransactionBehavior::Deferred => "BEGIN DEFERRED",
            TransactionBehavior::Immediate => "BEGIN IMMEDIATE",
            TransactionBehavior::Exclusive => "BEGIN EXCLUSIVE",
        }
    }
}

/// A database connection
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the driver name (e.g., "sqlite")
    fn driver_name(&self) -> &str;

    /// Begin a transaction
    async fn begin_transaction(&self, behavior: TransactionBehavior) -> Result<Box<dyn Transaction>>;

    /// Close the connection
    async fn close(&self) -> Result<()>;

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;

    /// Get a handle that can be used to cancel running statements.
    ///
    /// Returns `None` if the driver does not support cancellation.
    fn cancel_handle(&self) -> Option<Arc<dyn QueryCancelHandle>> {
        None
    }
}

/// A database transaction
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Commit the transaction
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> Result<()>;

    /// Run a statement that modifies data, returning the affected-row count
    async fn execute(&self, sql: &str, args: &[BoundArgument]) -> Result<u64>;

    /// Run a statement that returns rows, handing them to `sink` while the cursor is open
    async fn query(
        &self,
        sql: &str,
        args: &[BoundArgument],
        sink: &mut dyn ResultSink,
    ) -> Result<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_behavior_tags() {
        assert_eq!(TransactionBehavior::default(), TransactionBehavior::Deferred);
        assert_eq!(
            "immediate".parse::<TransactionBehavior>().ok(),
            Some(TransactionBehavior::Immediate)
        );
        assert_eq!(TransactionBehavior::Exclusive.to_string(), "exclusive");
        assert_eq!(
            TransactionBehavior::Deferred.begin_statement(),
            "BEGIN DEFERRED"
        );
    }
}
