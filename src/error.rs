use serde::Serialize;
use thiserror::Error;

/// Longest SQL prefix carried in error messages and events.
const SQL_IDENTITY_LIMIT: usize = 120;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Store is already connected")]
    AlreadyConnected,

    #[error("Store is not connected")]
    NotConnected,

    #[error("Migration {version} ({name}) failed: {source}")]
    Migration {
        version: i64,
        name: String,
        #[source]
        source: Box<StoreError>,
    },

    #[error("Migration plan rejected: {0}")]
    MigrationPlan(String),

    #[error("Query failed [{}]: {source}", sql_identity(.sql))]
    Query {
        sql: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error(
        "Parameter binding failed [{}]: statement expects {expected} parameters, got {actual}",
        sql_identity(.sql)
    )]
    Binding {
        sql: String,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid statement: {0}")]
    InvalidStatement(String),

    #[error("Transaction rolled back: {source}")]
    Transaction {
        #[source]
        source: Box<StoreError>,
    },

    #[error("Nested transactions are not supported on the same store")]
    NestedTransaction,

    #[error("Backup error: {0}")]
    Backup(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Coarse classification of a [`StoreError`], stable enough for hosts to match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    AlreadyConnected,
    NotConnected,
    Migration,
    Query,
    Transaction,
    Backup,
    Connection,
    Io,
}

impl StoreError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Configuration(_) => ErrorKind::Configuration,
            StoreError::AlreadyConnected => ErrorKind::AlreadyConnected,
            StoreError::NotConnected => ErrorKind::NotConnected,
            StoreError::Migration { .. } | StoreError::MigrationPlan(_) => ErrorKind::Migration,
            StoreError::Query { .. }
            | StoreError::Binding { .. }
            | StoreError::InvalidStatement(_)
            | StoreError::Sqlite(_) => ErrorKind::Query,
            StoreError::Transaction { .. } | StoreError::NestedTransaction => {
                ErrorKind::Transaction
            }
            StoreError::Backup(_) => ErrorKind::Backup,
            StoreError::Connection(_) => ErrorKind::Connection,
            StoreError::Io(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn query(sql: &str, source: rusqlite::Error) -> Self {
        StoreError::Query {
            sql: sql.to_owned(),
            source,
        }
    }

    pub(crate) fn backup(context: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        StoreError::Backup(format!("{context}: {err}"))
    }
}

/// Shortened, single-line form of a statement used to identify it in diagnostics.
#[must_use]
pub fn sql_identity(sql: &str) -> String {
    let collapsed = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= SQL_IDENTITY_LIMIT {
        collapsed
    } else {
        let mut short: String = collapsed.chars().take(SQL_IDENTITY_LIMIT).collect();
        short.push('…');
        short
    }
}
