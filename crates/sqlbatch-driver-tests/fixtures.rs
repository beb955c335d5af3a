//! Test fixtures backed by throwaway SQLite files.
//!
//! A [`TestDatabase`] owns a temporary directory holding one database file.
//! Helpers open a fresh connection for every check, so assertions always
//! observe what was actually committed to disk.
//!
//! # Usage
//!
//! ```rust,ignore
//! use sqlbatch_driver_tests::fixtures::{TestDatabase, calls};
//! use sqlbatch_core::CallKind;
//!
//! let db = TestDatabase::with_users().await?;
//! let sequence = calls(&[(CallKind::Exec, "DELETE FROM users WHERE id = ?", &["1:integer"])])?;
//! let (result, output) = db.run(sequence, OutputFormat::Tsv).await;
//! ```

use anyhow::{Context, Result};
use sqlbatch_core::{
    CallKind, CallSequence, CallSequenceBuilder, Connection, ConnectionConfig, DatabaseDriver,
    ResultSink, RowStream, TransactionBehavior, Value,
};
use sqlbatch_driver_sqlite::SqliteDriver;
use sqlbatch_query::{BatchExecutor, BatchOptions, BatchReport, ConsoleReporter, OutputFormat};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Schema and rows loaded by [`TestDatabase::with_users`]
pub const USERS_FIXTURE: &[&str] = &[
    "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
    "INSERT INTO users (id, name) VALUES (1, 'alice'), (2, 'bob'), (100500, 'carol'), (4, '%spam% dave'), (5, 'eve %spam%')",
];

/// A SQLite database file deleted when the fixture is dropped
pub struct TestDatabase {
    _dir: TempDir,
    path: PathBuf,
}

impl TestDatabase {
    /// An empty database; the file is created on first connect
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("failed to create temp dir")?;
        let path = dir.path().join("batch.db");
        Ok(Self { _dir: dir, path })
    }

    /// A database holding the `users` table from [`USERS_FIXTURE`]
    pub async fn with_users() -> Result<Self> {
        let db = Self::new()?;
        db.execute_all(USERS_FIXTURE).await?;
        Ok(db)
    }

    /// Location of the database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Connection settings with a short busy timeout so lock tests fail fast
    pub fn config(&self) -> ConnectionConfig {
        ConnectionConfig::new(self.path.to_string_lossy()).with_busy_timeout(Duration::from_millis(50))
    }

    /// Open a new connection to the database
    pub async fn connect(&self) -> Result<Arc<dyn Connection>> {
        self.connect_with(self.config()).await
    }

    /// Open a new connection with custom settings
    pub async fn connect_with(&self, config: ConnectionConfig) -> Result<Arc<dyn Connection>> {
        SqliteDriver::new()
            .connect(&config)
            .await
            .context("failed to open test database")
    }

    /// Run statements in one committed transaction
    pub async fn execute_all(&self, statements: &[&str]) -> Result<()> {
        let conn = self.connect().await?;
        let tx = conn.begin_transaction(TransactionBehavior::Immediate).await?;
        for statement in statements {
            tx.execute(statement, &[])
                .await
                .with_context(|| format!("fixture statement failed: {statement}"))?;
        }
        tx.commit().await?;
        conn.close().await?;
        Ok(())
    }

    /// Read all rows of `sql` over a fresh connection
    pub async fn query_rows(&self, sql: &str) -> Result<Vec<Vec<Value>>> {
        let conn = self.connect().await?;
        let tx = conn.begin_transaction(TransactionBehavior::Deferred).await?;
        let mut sink = CollectSink::default();
        tx.query(sql, &[], &mut sink).await?;
        tx.rollback().await?;
        conn.close().await?;
        Ok(sink.rows)
    }

    /// First column of the first row of `sql`, as an integer
    pub async fn scalar(&self, sql: &str) -> Result<i64> {
        let rows = self.query_rows(sql).await?;
        rows.first()
            .and_then(|row| row.first())
            .and_then(Value::as_i64)
            .with_context(|| format!("no integer result for {sql}"))
    }

    /// Execute `sequence` as a batch, returning the outcome and everything
    /// the console reporter printed
    pub async fn run(
        &self,
        sequence: CallSequence,
        format: OutputFormat,
    ) -> (sqlbatch_core::Result<BatchReport>, String) {
        self.run_with(sequence, BatchOptions::default(), format).await
    }

    /// Like [`TestDatabase::run`] with explicit batch options
    pub async fn run_with(
        &self,
        sequence: CallSequence,
        options: BatchOptions,
        format: OutputFormat,
    ) -> (sqlbatch_core::Result<BatchReport>, String) {
        let conn = match SqliteDriver::new().connect(&self.config()).await {
            Ok(conn) => conn,
            Err(e) => return (Err(e), String::new()),
        };
        let mut reporter = ConsoleReporter::new(Vec::new(), format);
        let result = BatchExecutor::new(options)
            .execute(&conn, sequence, &mut reporter)
            .await;
        let output = String::from_utf8_lossy(&reporter.into_inner()).into_owned();
        (result, output)
    }
}

/// Keeps every row of a result set in memory
#[derive(Debug, Default)]
pub struct CollectSink {
    /// Column names of the last result set
    pub columns: Vec<String>,
    /// Rows of the last result set
    pub rows: Vec<Vec<Value>>,
}

impl ResultSink for CollectSink {
    fn consume(&mut self, columns: &[String], rows: &mut RowStream<'_>) -> sqlbatch_core::Result<u64> {
        self.columns = columns.to_vec();
        self.rows.clear();
        for row in rows {
            self.rows.push(row?);
        }
        Ok(self.rows.len() as u64)
    }
}

/// Build a call sequence from `(kind, statement, argument specs)` triples
pub fn calls(spec: &[(CallKind, &str, &[&str])]) -> Result<CallSequence> {
    let mut builder = CallSequenceBuilder::new();
    for (kind, statement, arguments) in spec {
        builder.declare(*kind, statement);
        for raw in *arguments {
            builder.argument(raw)?;
        }
    }
    Ok(builder.build())
}
