//! Statement calls and the builder that collects them from the command line

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{BoundArgument, Result, SqlBatchError};

/// Catalog query issued by `--list`
pub const LIST_TABLES_STATEMENT: &str = "SELECT name FROM sqlite_master WHERE type='table'";

/// Whether a call modifies data or returns rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    /// Reports an affected-row count
    Exec,
    /// Renders a result set
    Query,
}

/// One declared statement plus the arguments bound to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    kind: CallKind,
    statement: String,
    arguments: Vec<BoundArgument>,
}

impl Call {
    pub fn kind(&self) -> CallKind {
        self.kind
    }

    pub fn statement(&self) -> &str {
        &self.statement
    }

    pub fn arguments(&self) -> &[BoundArgument] {
        &self.arguments
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.statement)?;
        if !self.arguments.is_empty() {
            let args: Vec<String> = self.arguments.iter().map(ToString::to_string).collect();
            write!(f, " [{}]", args.join(", "))?;
        }
        Ok(())
    }
}

/// Ordered calls, frozen once the command line has been read.
///
/// The sequence is consumed by value when it is executed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallSequence {
    calls: Vec<Call>,
}

impl CallSequence {
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Call> {
        self.calls.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Call> {
        self.calls.get(index)
    }
}

impl IntoIterator for CallSequence {
    type Item = Call;
    type IntoIter = std::vec::IntoIter<Call>;

    fn into_iter(self) -> Self::IntoIter {
        self.calls.into_iter()
    }
}

impl<'a> IntoIterator for &'a CallSequence {
    type Item = &'a Call;
    type IntoIter = std::slice::Iter<'a, Call>;

    fn into_iter(self) -> Self::IntoIter {
        self.calls.iter()
    }
}

/// Collects calls in declaration order.
///
/// Arguments always go to the call the builder currently points at, which is
/// the most recently declared one. Earlier calls can no longer be reached.
#[derive(Debug, Default)]
pub struct CallSequenceBuilder {
    calls: Vec<Call>,
    current: Option<usize>,
}

impl CallSequenceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a new call. Blank statements are dropped without error.
    ///
    /// Returns whether a call was added.
    pub fn declare(&mut self, kind: CallKind, statement: &str) -> bool {
        let statement = statement.trim();
        if statement.is_empty() {
            tracing::debug!(%kind, "ignoring blank statement");
            return false;
        }

        self.calls.push(Call {
            kind,
            statement: statement.to_string(),
            arguments: Vec::new(),
        });
        self.current = Some(self.calls.len() - 1);
        true
    }

    pub fn query(&mut self, statement: &str) -> bool {
        self.declare(CallKind::Query, statement)
    }

    pub fn exec(&mut self, statement: &str) -> bool {
        self.declare(CallKind::Exec, statement)
    }

    /// Declare the table listing query
    pub fn list(&mut self) {
        self.declare(CallKind::Query, LIST_TABLES_STATEMENT);
    }

    /// Append an argument to the current call
    pub fn attach(&mut self, argument: BoundArgument) -> Result<()> {
        let index = self.current.ok_or(SqlBatchError::DanglingArgument)?;
        self.calls[index].arguments.push(argument);
        Ok(())
    }

    /// Parse an argument spec and append it to the current call.
    ///
    /// The current call is checked first, so an argument given before any
    /// statement is reported as dangling even if the spec itself is malformed.
    pub fn argument(&mut self, raw: &str) -> Result<()> {
        if self.current.is_none() {
            return Err(SqlBatchError::DanglingArgument);
        }
        self.attach(BoundArgument::parse(raw)?)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn build(self) -> CallSequence {
        CallSequence { calls: self.calls }
    }
}
