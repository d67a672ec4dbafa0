//! revtrail error types
//!
//! Every failure on the capture path propagates to the caller so the
//! enclosing transaction rolls back. Nothing here is retried.

use thiserror::Error;

/// Error category for structured logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Mutation attempted on a history (mirror) record
    Immutability,
    /// A history row could not be written
    Snapshot,
    /// SQLite, pool or blocking-task failures
    Storage,
    /// Invalid schema, unknown field or duplicate registration
    Schema,
    /// `revtrail.toml` or env misconfigured
    Config,
}

impl ErrorCategory {
    /// Machine-readable code for logging
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Immutability => "IMMUTABILITY_VIOLATION",
            Self::Snapshot => "SNAPSHOT_FAILURE",
            Self::Storage => "STORAGE_ERROR",
            Self::Schema => "SCHEMA_ERROR",
            Self::Config => "CONFIG_ERROR",
        }
    }
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("{entity} records are immutable: {operation} rejected")]
    ImmutabilityViolation {
        entity: String,
        operation: &'static str,
    },

    #[error("failed to capture snapshot into {entity}: {message}")]
    SnapshotFailure {
        entity: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("config error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl HistoryError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ImmutabilityViolation { .. } => ErrorCategory::Immutability,
            Self::SnapshotFailure { .. } => ErrorCategory::Snapshot,
            Self::Sqlite(_) | Self::Pool(_) | Self::Transaction(_) => ErrorCategory::Storage,
            Self::Schema(_) | Self::Decode(_) => ErrorCategory::Schema,
            Self::Config { .. } => ErrorCategory::Config,
        }
    }

    pub fn immutable(entity: impl Into<String>, operation: &'static str) -> Self {
        Self::ImmutabilityViolation {
            entity: entity.into(),
            operation,
        }
    }

    /// Wrap a failed history insert.
    ///
    /// An error that is already a `SnapshotFailure` is returned unchanged so
    /// nested savepoints don't stack wrappers.
    pub fn snapshot(entity: impl Into<String>, err: HistoryError) -> Self {
        match err {
            Self::SnapshotFailure { .. } => err,
            other => Self::SnapshotFailure {
                entity: entity.into(),
                message: other.to_string(),
                source: Some(Box::new(other)),
            },
        }
    }

    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn is_immutability_violation(&self) -> bool {
        matches!(self, Self::ImmutabilityViolation { .. })
    }

    pub fn is_snapshot_failure(&self) -> bool {
        matches!(self, Self::SnapshotFailure { .. })
    }
}

/// Result type for revtrail operations
pub type Result<T> = std::result::Result<T, HistoryError>;
