//! SQLite connection implementation

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{Connection as RusqliteConnection, ErrorCode, InterruptHandle, OpenFlags};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use sqlbatch_core::{
    BoundArgument, Connection, ConnectionConfig, QueryCancelHandle, Result, ResultSink, RowStream,
    SqlBatchError, Transaction, TransactionBehavior, Value,
};

/// Cancel handle for SQLite statements.
///
/// This wraps the rusqlite `InterruptHandle` and can be called from any thread
/// to interrupt a running statement. The interrupted statement fails with SQLITE_INTERRUPT.
pub struct SqliteCancelHandle {
    interrupt_handle: Arc<InterruptHandle>,
}

impl QueryCancelHandle for SqliteCancelHandle {
    fn cancel(&self) {
        tracing::debug!("interrupting SQLite statement");
        self.interrupt_handle.interrupt();
    }
}

/// SQLite connection wrapper
pub struct SqliteConnection {
    conn: Arc<Mutex<RusqliteConnection>>,
    interrupt_handle: Arc<InterruptHandle>,
    closed: AtomicBool,
}

impl SqliteConnection {
    /// Open a SQLite database
    pub fn open(config: &ConnectionConfig) -> Result<Self> {
        config.validate()?;
        let path = config.path.as_str();
        tracing::info!(path = %path, read_only = config.read_only, "opening SQLite database");
        let expanded_path = Self::expand_path(path)?;

        let flags = if config.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX
        };

        let conn = if path == ":memory:" {
            RusqliteConnection::open_in_memory().map_err(|e| {
                SqlBatchError::Connection(format!("Failed to open in-memory database: {}", e))
            })?
        } else {
            // Validate that parent directory exists for non-URI paths
            if !expanded_path.starts_with("file:") {
                let file_path = std::path::Path::new(&expanded_path);
                if let Some(parent) = file_path.parent()
                    && !parent.exists()
                {
                    return Err(SqlBatchError::Connection(format!(
                        "Parent directory does not exist: {}",
                        parent.display()
                    )));
                }
            }

            RusqliteConnection::open_with_flags(&expanded_path, flags).map_err(|e| {
                SqlBatchError::Connection(format!(
                    "Failed to open SQLite database at '{}': {}",
                    expanded_path, e
                ))
            })?
        };

        if let Some(timeout) = config.busy_timeout {
            conn.busy_timeout(timeout)
                .map_err(|e| SqlBatchError::Connection(format!("Failed to set busy timeout: {}", e)))?;
        }

        // Get interrupt handle before wrapping connection in Mutex
        let interrupt_handle = Arc::new(conn.get_interrupt_handle());

        tracing::info!(path = %expanded_path, "SQLite database connection established");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            interrupt_handle,
            closed: AtomicBool::new(false),
        })
    }

    /// Expand path to handle ~ (home directory) and relative paths
    fn expand_path(path: &str) -> Result<String> {
        if path == ":memory:" || path.starts_with("file:") {
            return Ok(path.to_string());
        }

        let expanded = if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = std::env::var_os("HOME") {
                let home_path = std::path::PathBuf::from(home);
                home_path.join(rest).to_string_lossy().to_string()
            } else {
                return Err(SqlBatchError::Configuration(
                    "Unable to determine HOME directory".into(),
                ));
            }
        } else if path.starts_with('~') {
            return Err(SqlBatchError::Configuration(
                "User-specific home directories (~user) are not supported".into(),
            ));
        } else {
            path.to_string()
        };

        let path_buf = std::path::PathBuf::from(&expanded);
        let result = if path_buf.is_relative() {
            std::env::current_dir()
                .map_err(SqlBatchError::Io)?
                .join(path_buf)
                .to_string_lossy()
                .to_string()
        } else {
            expanded
        };

        Ok(result)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SqlBatchError::Connection("connection is closed".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    fn driver_name(&self) -> &str {
        "sqlite"
    }

    #[tracing::instrument(skip(self))]
    async fn begin_transaction(&self, behavior: TransactionBehavior) -> Result<Box<dyn Transaction>> {
        self.ensure_open()?;
        tracing::debug!("beginning SQLite transaction");
        {
            let conn = self.conn.lock();
            conn.execute_batch(behavior.begin_statement()).map_err(|e| {
                SqlBatchError::Transaction(format!("Failed to begin transaction: {}", e))
            })?;
        }
        tracing::debug!("SQLite transaction started");
        Ok(Box::new(SqliteTransaction {
            conn: Arc::clone(&self.conn),
            committed: false,
            rolled_back: false,
        }))
    }

    async fn close(&self) -> Result<()> {
        tracing::info!("closing SQLite connection");
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn cancel_handle(&self) -> Option<Arc<dyn QueryCancelHandle>> {
        Some(Arc::new(SqliteCancelHandle {
            interrupt_handle: self.interrupt_handle.clone(),
        }))
    }
}

/// A transaction on a [`SqliteConnection`].
///
/// Dropping it before `commit` or `rollback` rolls back.
pub struct SqliteTransaction {
    conn: Arc<Mutex<RusqliteConnection>>,
    committed: bool,
    rolled_back: bool,
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        if !self.committed && !self.rolled_back {
            tracing::warn!("SQLite transaction dropped without commit or rollback, issuing automatic rollback");
            let conn = self.conn.lock();
            if conn.is_autocommit() {
                return;
            }
            if let Err(e) = conn.execute_batch("ROLLBACK") {
                tracing::error!(error = %e, "automatic rollback on drop failed");
            }
        }
    }
}

#[async_trait]
impl Transaction for SqliteTransaction {
    async fn commit(mut self: Box<Self>) -> Result<()> {
        tracing::debug!("committing SQLite transaction");

        if self.rolled_back {
            return Err(SqlBatchError::Transaction("Transaction already rolled back".into()));
        }
        if self.committed {
            return Err(SqlBatchError::Transaction("Transaction already committed".into()));
        }

        let outcome = {
            let conn = self.conn.lock();
            conn.execute_batch("COMMIT")
        };
        outcome.map_err(|e| SqlBatchError::Commit(e.to_string()))?;

        self.committed = true;
        tracing::debug!("SQLite transaction committed successfully");
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        tracing::debug!("rolling back SQLite transaction");

        if self.committed {
            return Err(SqlBatchError::Transaction("Transaction already committed".into()));
        }
        if self.rolled_back {
            return Ok(());
        }

        let outcome = {
            let conn = self.conn.lock();
            if conn.is_autocommit() {
                // SQLite already rolled back on its own, e.g. after SQLITE_FULL
                Ok(())
            } else {
                conn.execute_batch("ROLLBACK")
            }
        };
        // the flag is set either way so that Drop does not try a second time
        self.rolled_back = true;
        outcome.map_err(|e| {
            SqlBatchError::Transaction(format!("Failed to rollback transaction: {}", e))
        })?;

        tracing::debug!("SQLite transaction rolled back successfully");
        Ok(())
    }

    #[tracing::instrument(skip(self, sql, args), fields(sql_preview = %sql.chars().take(100).collect::<String>(), args = args.len()))]
    async fn execute(&self, sql: &str, args: &[BoundArgument]) -> Result<u64> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| statement_error("Failed to prepare statement", e))?;
        bind_arguments(&mut stmt, args)?;

        let affected_rows = if stmt.column_count() > 0 {
            // e.g. INSERT ... RETURNING or a PRAGMA; step through so it fully runs
            let mut rows = stmt.raw_query();
            while rows
                .next()
                .map_err(|e| statement_error("Failed to execute statement", e))?
                .is_some()
            {}
            conn.changes() as u64
        } else {
            stmt.raw_execute()
                .map_err(|e| statement_error("Failed to execute statement", e))? as u64
        };

        tracing::debug!(affected_rows, "statement executed");
        Ok(affected_rows)
    }

    #[tracing::instrument(skip(self, sql, args, sink), fields(sql_preview = %sql.chars().take(100).collect::<String>(), args = args.len()))]
    async fn query(
        &self,
        sql: &str,
        args: &[BoundArgument],
        sink: &mut dyn ResultSink,
    ) -> Result<u64> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| statement_error("Failed to prepare query", e))?;
        bind_arguments(&mut stmt, args)?;

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.raw_query();

        if columns.is_empty() {
            // nothing to show, but the statement still has to run
            while rows
                .next()
                .map_err(|e| statement_error("Failed to execute query", e))?
                .is_some()
            {}
            return sink.consume(&columns, &mut std::iter::empty::<Result<Vec<Value>>>());
        }

        let column_count = columns.len();
        let mut stream = std::iter::from_fn(|| match rows.next() {
            Ok(Some(row)) => Some(read_row(row, column_count)),
            Ok(None) => None,
            Err(e) => Some(Err(statement_error("Failed to fetch row", e))),
        });
        let stream: &mut RowStream<'_> = &mut stream;

        let row_count = sink.consume(&columns, stream)?;
        tracing::debug!(row_count, column_count, "query consumed");
        Ok(row_count)
    }
}

fn statement_error(context: &str, error: rusqlite::Error) -> SqlBatchError {
    if error.sqlite_error_code() == Some(ErrorCode::OperationInterrupted) {
        SqlBatchError::Cancelled(format!("{}: {}", context, error))
    } else {
        SqlBatchError::Statement(format!("{}: {}", context, error))
    }
}

/// Bind each argument to its parameter slot.
///
/// Named arguments match `name` as written, then `:name`, `@name` and `$name`.
/// Unnamed arguments take the slot matching their position in the call.
fn bind_arguments(stmt: &mut rusqlite::Statement<'_>, args: &[BoundArgument]) -> Result<()> {
    for (position, arg) in args.iter().enumerate() {
        let index = match arg.name() {
            Some(name) => named_parameter_index(stmt, name)?,
            None => position + 1,
        };

        stmt.raw_bind_parameter(index, value_to_rusqlite(arg.value()))
            .map_err(|e| {
                SqlBatchError::Statement(format!("Failed to bind argument {}: {}", arg, e))
            })?;
    }
    Ok(())
}

fn named_parameter_index(stmt: &rusqlite::Statement<'_>, name: &str) -> Result<usize> {
    let candidates = [
        name.to_string(),
        format!(":{}", name),
        format!("@{}", name),
        format!("${}", name),
    ];

    for candidate in &candidates {
        let found = stmt
            .parameter_index(candidate)
            .map_err(|e| SqlBatchError::Statement(format!("Invalid parameter name {:?}: {}", name, e)))?;
        if let Some(index) = found {
            return Ok(index);
        }
    }

    Err(SqlBatchError::Statement(format!(
        "statement has no parameter named {:?}",
        name
    )))
}

fn value_to_rusqlite(value: &Value) -> rusqlite::types::Value {
    match value {
        Value::Null => rusqlite::types::Value::Null,
        Value::Integer(i) => rusqlite::types::Value::Integer(*i),
        Value::Real(f) => rusqlite::types::Value::Real(*f),
        Value::Text(s) => rusqlite::types::Value::Text(s.clone()),
        Value::Blob(b) => rusqlite::types::Value::Blob(b.clone()),
    }
}

fn read_row(row: &rusqlite::Row<'_>, column_count: usize) -> Result<Vec<Value>> {
    (0..column_count).map(|idx| rusqlite_to_value(row, idx)).collect()
}

/// Convert rusqlite row value to our Value type
fn rusqlite_to_value(row: &rusqlite::Row<'_>, idx: usize) -> Result<Value> {
    use rusqlite::types::ValueRef;

    let value_ref = row
        .get_ref(idx)
        .map_err(|e| SqlBatchError::Statement(format!("Failed to read column {}: {}", idx, e)))?;

    let value = match value_ref {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Real(f),
        ValueRef::Text(s) => Value::Text(String::from_utf8_lossy(s).to_string()),
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    };

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    /// Collects result sets in memory
    #[derive(Default)]
    struct Collect {
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
        calls: usize,
    }

    impl ResultSink for Collect {
        fn consume(&mut self, columns: &[String], rows: &mut RowStream<'_>) -> Result<u64> {
            self.calls += 1;
            self.columns = columns.to_vec();
            for row in rows {
                self.rows.push(row?);
            }
            Ok(self.rows.len() as u64)
        }
    }

    fn open_temp() -> (TempDir, SqliteConnection) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("driver.db");
        let conn = SqliteConnection::open(&ConnectionConfig::new(path.to_string_lossy())).unwrap();
        (dir, conn)
    }

    #[tokio::test]
    async fn test_named_parameter_prefixes() {
        let (_dir, conn) = open_temp();
        let tx = conn.begin_transaction(TransactionBehavior::Deferred).await.unwrap();

        for sql in ["SELECT :v", "SELECT @v", "SELECT $v"] {
            let mut sink = Collect::default();
            tx.query(sql, &[BoundArgument::named("v", Value::Integer(7))], &mut sink)
                .await
                .unwrap();
            assert_eq!(sink.rows, vec![vec![Value::Integer(7)]], "{sql}");
        }

        // a name written with its prefix matches as-is
        let mut sink = Collect::default();
        tx.query("SELECT @v", &[BoundArgument::named("@v", Value::Integer(8))], &mut sink)
            .await
            .unwrap();
        assert_eq!(sink.rows, vec![vec![Value::Integer(8)]]);

        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_positional_and_named_mix() {
        let (_dir, conn) = open_temp();
        let tx = conn.begin_transaction(TransactionBehavior::Deferred).await.unwrap();

        let mut sink = Collect::default();
        let args = [
            BoundArgument::positional(Value::Text("a".into())),
            BoundArgument::named("n", Value::Real(1.5)),
        ];
        tx.query("SELECT ?1, :n", &args, &mut sink).await.unwrap();

        assert_eq!(sink.columns, vec!["?1".to_string(), ":n".to_string()]);
        assert_eq!(
            sink.rows,
            vec![vec![Value::Text("a".into()), Value::Real(1.5)]]
        );
        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_storage_classes_round_trip() {
        let (_dir, conn) = open_temp();
        let tx = conn.begin_transaction(TransactionBehavior::Deferred).await.unwrap();

        let mut sink = Collect::default();
        let args = [
            BoundArgument::positional(Value::Null),
            BoundArgument::positional(Value::Integer(-3)),
            BoundArgument::positional(Value::Real(0.5)),
            BoundArgument::positional(Value::Text("t".into())),
            BoundArgument::positional(Value::Blob(vec![0, 1, 2])),
        ];
        tx.query(
            "SELECT typeof(?1), typeof(?2), typeof(?3), typeof(?4), typeof(?5), ?5",
            &args,
            &mut sink,
        )
        .await
        .unwrap();

        assert_eq!(
            sink.rows,
            vec![vec![
                Value::Text("null".into()),
                Value::Text("integer".into()),
                Value::Text("real".into()),
                Value::Text("text".into()),
                Value::Text("blob".into()),
                Value::Blob(vec![0, 1, 2]),
            ]]
        );
        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_named_parameter() {
        let (_dir, conn) = open_temp();
        let tx = conn.begin_transaction(TransactionBehavior::Deferred).await.unwrap();

        let err = tx
            .execute("SELECT :present", &[BoundArgument::named("missing", Value::Null)])
            .await
            .unwrap_err();
        assert!(matches!(err, SqlBatchError::Statement(ref m) if m.contains("missing")));
        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_too_many_positional_arguments() {
        let (_dir, conn) = open_temp();
        let tx = conn.begin_transaction(TransactionBehavior::Deferred).await.unwrap();

        let args = [
            BoundArgument::positional(Value::Integer(1)),
            BoundArgument::positional(Value::Integer(2)),
        ];
        let err = tx.execute("SELECT ?", &args).await.unwrap_err();
        assert!(matches!(err, SqlBatchError::Statement(_)));
        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_query_without_columns_still_runs() {
        let (_dir, conn) = open_temp();
        let tx = conn.begin_transaction(TransactionBehavior::Deferred).await.unwrap();

        let mut sink = Collect::default();
        let rows = tx.query("CREATE TABLE t (x)", &[], &mut sink).await.unwrap();
        assert_eq!(rows, 0);
        assert_eq!(sink.calls, 1);
        assert!(sink.columns.is_empty());

        let affected = tx.execute("INSERT INTO t VALUES (1), (2)", &[]).await.unwrap();
        assert_eq!(affected, 2);
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_execute_returning_counts_changes() {
        let (_dir, conn) = open_temp();
        let tx = conn.begin_transaction(TransactionBehavior::Deferred).await.unwrap();
        tx.execute("CREATE TABLE t (x)", &[]).await.unwrap();

        let affected = tx
            .execute("INSERT INTO t VALUES (1), (2), (3) RETURNING x", &[])
            .await
            .unwrap();
        assert_eq!(affected, 3);

        let mut sink = Collect::default();
        tx.query("SELECT count(*) FROM t", &[], &mut sink).await.unwrap();
        assert_eq!(sink.rows, vec![vec![Value::Integer(3)]]);
        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let (_dir, conn) = open_temp();
        {
            let tx = conn.begin_transaction(TransactionBehavior::Immediate).await.unwrap();
            tx.execute("CREATE TABLE t (x)", &[]).await.unwrap();
        }

        let tx = conn.begin_transaction(TransactionBehavior::Deferred).await.unwrap();
        let mut sink = Collect::default();
        tx.query(
            "SELECT count(*) FROM sqlite_master WHERE name = 't'",
            &[],
            &mut sink,
        )
        .await
        .unwrap();
        assert_eq!(sink.rows, vec![vec![Value::Integer(0)]]);
        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_connection_rejects_transactions() {
        let (_dir, conn) = open_temp();
        conn.close().await.unwrap();
        assert!(conn.is_closed());
        assert!(matches!(
            conn.begin_transaction(TransactionBehavior::Deferred).await,
            Err(SqlBatchError::Connection(_))
        ));
    }

    #[test]
    fn test_missing_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope").join("x.db");
        let err = SqliteConnection::open(&ConnectionConfig::new(path.to_string_lossy()))
            .err()
            .unwrap();
        assert!(matches!(err, SqlBatchError::Connection(_)));
    }

    #[test]
    fn test_read_only_requires_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.db");
        let config = ConnectionConfig::new(path.to_string_lossy()).with_read_only(true);
        assert!(matches!(
            SqliteConnection::open(&config),
            Err(SqlBatchError::Connection(_))
        ));
    }
}
