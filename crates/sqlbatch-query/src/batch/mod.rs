//! Batch execution module
//!
//! This module runs a frozen call sequence inside one transaction,
//! streaming each call's outcome to a reporter and committing only when
//! every call succeeded.

mod executor;

pub use executor::{
    BatchExecutor, BatchOptions, BatchReport, BatchReporter, BatchState, CallOutcome,
};
