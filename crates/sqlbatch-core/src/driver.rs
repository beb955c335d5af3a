//! Database driver trait definition

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::{Connection, Result, SqlBatchError};

/// Where and how to open a database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub path: String,
    pub read_only: bool,
    pub busy_timeout: Option<Duration>,
}

impl ConnectionConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            read_only: false,
            busy_timeout: None,
        }
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = Some(timeout);
        self
    }

    /// Reject configurations that cannot name a database
    pub fn validate(&self) -> Result<()> {
        if self.path.trim().is_empty() {
            return Err(SqlBatchError::Configuration(
                "no database file specified, use --db <PATH>".into(),
            ));
        }
        Ok(())
    }
}

/// A database driver
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    fn name(&self) -> &'static str;

    /// Features compiled into the database engine, for help output
    fn compiled_features(&self) -> Vec<String> {
        Vec::new()
    }

    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Connection>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_path_is_configuration_error() {
        for path in ["", "   ", "\t\n"] {
            let err = ConnectionConfig::new(path).validate().unwrap_err();
            assert!(matches!(err, SqlBatchError::Configuration(_)));
        }
        assert!(ConnectionConfig::new("app.db").validate().is_ok());
    }

    #[test]
    fn test_builder_methods() {
        let config = ConnectionConfig::new("app.db")
            .with_read_only(true)
            .with_busy_timeout(Duration::from_millis(250));
        assert!(config.read_only);
        assert_eq!(config.busy_timeout, Some(Duration::from_millis(250)));
    }
}
