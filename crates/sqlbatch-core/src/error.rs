//! Error types for sqlbatch

use std::num::{ParseFloatError, ParseIntError};

use thiserror::Error;

use crate::ArgumentType;

/// Core error type for sqlbatch operations
#[derive(Error, Debug)]
pub enum SqlBatchError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unknown argument type {0:?}, supported types: null, integer, real, text, blob")]
    UnknownArgumentType(String),

    #[error("parsing SQL argument {literal:?} as {ty}")]
    ArgumentValue {
        literal: String,
        ty: ArgumentType,
        #[source]
        source: LiteralError,
    },

    #[error(
        "-arg is set before -query or -exec, can't set argument. Use like following: -query 'select ?' -arg 10:integer"
    )]
    DanglingArgument,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("commit failed: {0}")]
    Commit(String),

    #[error("statement failed: {0}")]
    Statement(String),

    #[error("statement cancelled: {0}")]
    Cancelled(String),

    #[error("rendering result: {0}")]
    Render(#[source] Box<SqlBatchError>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure to interpret the literal part of an argument spec.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LiteralError {
    #[error(transparent)]
    Integer(#[from] ParseIntError),

    #[error(transparent)]
    Real(#[from] ParseFloatError),

    #[error("misplaced digit separator '_'")]
    Separator,

    #[error("malformed hexadecimal float, expected digits and a 'p' exponent")]
    HexFloat,

    #[error("value out of range")]
    OutOfRange,
}

/// Broad failure categories, used for exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    ArgumentSyntax,
    ArgumentValue,
    DanglingArgument,
    Connection,
    Transaction,
    Statement,
    Render,
    Io,
}

impl SqlBatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SqlBatchError::Configuration(_) => ErrorKind::Configuration,
            SqlBatchError::UnknownArgumentType(_) => ErrorKind::ArgumentSyntax,
            SqlBatchError::ArgumentValue { .. } => ErrorKind::ArgumentValue,
            SqlBatchError::DanglingArgument => ErrorKind::DanglingArgument,
            SqlBatchError::Connection(_) => ErrorKind::Connection,
            SqlBatchError::Transaction(_) | SqlBatchError::Commit(_) => ErrorKind::Transaction,
            SqlBatchError::Statement(_) | SqlBatchError::Cancelled(_) => ErrorKind::Statement,
            SqlBatchError::Render(_) => ErrorKind::Render,
            SqlBatchError::Io(_) => ErrorKind::Io,
        }
    }

    /// Wrap a row-read or output failure raised while a result set was being rendered.
    pub fn render(cause: SqlBatchError) -> Self {
        match cause {
            already @ SqlBatchError::Render(_) => already,
            other => SqlBatchError::Render(Box::new(other)),
        }
    }
}

/// Result type alias for sqlbatch operations
pub type Result<T> = std::result::Result<T, SqlBatchError>;
