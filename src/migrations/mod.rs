//! Forward-only schema migrations.
//!
//! Callers hand the manager a [`MigrationSource`]; on `connect` every candidate whose
//! version is missing from the bookkeeping table is applied in ascending version order,
//! each inside its own transaction together with its bookkeeping row.

mod engine;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::StoreError;

pub(crate) use engine::{applied_records, plan, run};

/// One schema step supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    version: i64,
    name: String,
    identifier: String,
    up: String,
    down: Option<String>,
}

impl Migration {
    /// A migration whose identifier defaults to `<version>_<name>`.
    #[must_use]
    pub fn new(version: i64, name: impl Into<String>, up: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            identifier: format!("{version:04}_{name}"),
            version,
            name,
            up: up.into(),
            down: None,
        }
    }

    /// Logical source identifier, typically the file the migration was loaded from.
    #[must_use]
    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = identifier.into();
        self
    }

    /// Reverse SQL. Kept for callers; never executed automatically.
    #[must_use]
    pub fn with_reverse(mut self, down: impl Into<String>) -> Self {
        self.down = Some(down.into());
        self
    }

    #[must_use]
    pub fn version(&self) -> i64 {
        self.version
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    #[must_use]
    pub fn up_sql(&self) -> &str {
        &self.up
    }

    #[must_use]
    pub fn down_sql(&self) -> Option<&str> {
        self.down.as_deref()
    }
}

/// A row of the bookkeeping table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    pub identifier: String,
    pub applied_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    Pending,
    Applying,
    Applied,
    Failed,
}

/// Outcome of one migration run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    /// Migrations applied by this run, in the order they ran.
    pub applied: Vec<MigrationRecord>,
    /// Candidates that were already recorded before the run started.
    pub already_applied: usize,
}

impl MigrationReport {
    #[must_use]
    pub fn applied_versions(&self) -> Vec<i64> {
        self.applied.iter().map(|r| r.version).collect()
    }
}

/// Supplies candidate migrations. Discovery (files, embedded strings) is up to the implementor.
pub trait MigrationSource: Send + Sync {
    /// # Errors
    /// Implementations return an error when their migrations cannot be loaded.
    fn migrations(&self) -> Result<Vec<Migration>, StoreError>;
}

impl MigrationSource for Vec<Migration> {
    fn migrations(&self) -> Result<Vec<Migration>, StoreError> {
        Ok(self.clone())
    }
}

/// Shared, immutable list; several managers can apply the same set.
impl MigrationSource for Arc<[Migration]> {
    fn migrations(&self) -> Result<Vec<Migration>, StoreError> {
        Ok(self.to_vec())
    }
}
