//! SQLite driver implementation

use async_trait::async_trait;
use rusqlite::Connection as RusqliteConnection;
use std::sync::Arc;
use sqlbatch_core::{Connection, ConnectionConfig, DatabaseDriver, Result};

use crate::SqliteConnection;

/// SQLite database driver
pub struct SqliteDriver;

impl SqliteDriver {
    /// Create a new SQLite driver instance
    pub fn new() -> Self {
        tracing::debug!("SQLite driver initialized");
        Self
    }
}

impl Default for SqliteDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseDriver for SqliteDriver {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    /// The engine version followed by `PRAGMA compile_options`
    fn compiled_features(&self) -> Vec<String> {
        let mut features = vec![format!("SQLite {}", rusqlite::version())];
        match RusqliteConnection::open_in_memory().and_then(|conn| compile_options(&conn)) {
            Ok(options) => features.extend(options),
            Err(e) => tracing::warn!(error = %e, "could not read SQLite compile options"),
        }
        features
    }

    #[tracing::instrument(skip(self, config), fields(path = %config.path, read_only = config.read_only))]
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Connection>> {
        config.validate()?;

        let conn = SqliteConnection::open(config).map_err(|e| {
            tracing::debug!(error = %e, "failed to connect to SQLite database");
            e
        })?;

        tracing::info!(path = %config.path, "SQLite connection created");
        Ok(Arc::new(conn))
    }
}

fn compile_options(conn: &RusqliteConnection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("PRAGMA compile_options")?;
    let options = stmt.query_map([], |row| row.get::<_, String>(0))?;
    options.collect()
}
