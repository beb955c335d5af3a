//! sqlbatch query - batch execution and result output
//!
//! This crate runs a call sequence as one transaction, enforces the batch
//! deadline, and renders results to the console.

pub mod batch;
mod deadline;
mod render;
mod report;

pub use batch::{BatchExecutor, BatchOptions, BatchReport, BatchReporter, BatchState, CallOutcome};
pub use deadline::{DEFAULT_BUDGET, Deadline, DeadlineWatch};
pub use render::{OutputFormat, format_cell, render_rows};
pub use report::ConsoleReporter;
