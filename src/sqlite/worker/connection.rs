use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use rusqlite::types::Value;

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::results::{CustomDbRow, ResultSet};
use crate::types::ExecuteResult;

use super::manager::SqliteWorker;

/// Open store handle backed by a dedicated worker thread.
///
/// The worker owns the `rusqlite::Connection` and its statement cache; this handle
/// only ships commands to it. Dropping the handle closes the store.
pub(crate) struct SqliteConnection {
    worker: SqliteWorker,
    journal_mode: String,
}

impl SqliteConnection {
    /// Spawn the worker and open the store described by `config`.
    pub(crate) async fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let (worker, journal_mode) = SqliteWorker::spawn(config).await?;
        Ok(Self {
            worker,
            journal_mode,
        })
    }

    pub(crate) fn journal_mode(&self) -> &str {
        &self.journal_mode
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.worker.is_alive()
    }

    /// Cleared when the worker thread exits and the handle is gone.
    pub(crate) fn alive_flag(&self) -> Arc<AtomicBool> {
        self.worker.alive_flag()
    }

    pub(crate) async fn query(
        &self,
        sql: String,
        params: Vec<Value>,
    ) -> Result<ResultSet, StoreError> {
        self.worker.query(sql, params).await
    }

    pub(crate) async fn query_one(
        &self,
        sql: String,
        params: Vec<Value>,
    ) -> Result<Option<CustomDbRow>, StoreError> {
        self.worker.query_one(sql, params).await
    }

    pub(crate) async fn execute(
        &self,
        sql: String,
        params: Vec<Value>,
    ) -> Result<ExecuteResult, StoreError> {
        self.worker.execute(sql, params).await
    }

    /// Runs the script atomically unless a transaction is already open.
    pub(crate) async fn execute_batch(&self, sql: String) -> Result<(), StoreError> {
        self.worker.execute_batch(sql).await
    }

    pub(crate) async fn begin(&self) -> Result<(), StoreError> {
        self.worker.begin().await
    }

    pub(crate) async fn commit(&self) -> Result<(), StoreError> {
        self.worker.commit().await
    }

    pub(crate) async fn rollback(&self) -> Result<(), StoreError> {
        self.worker.rollback().await
    }

    pub(crate) fn rollback_detached(&self) {
        self.worker.rollback_detached();
    }

    /// Write a consistent snapshot of the main database to `destination`.
    pub(crate) async fn backup_to(&self, destination: PathBuf) -> Result<(), StoreError> {
        self.worker.backup(destination).await
    }

    pub(crate) async fn cached_statement_count(&self) -> Result<usize, StoreError> {
        self.worker.cache_size().await
    }

    /// Run `func` on the worker thread with direct access to the connection.
    pub(crate) async fn with_connection<F, R>(&self, func: F) -> Result<R, StoreError>
    where
        F: FnOnce(&rusqlite::Connection) -> Result<R, StoreError> + Send + 'static,
        R: Send + 'static,
    {
        self.worker.with_connection(func).await
    }

    /// Finalize cached statements and close the handle, returning how many statements were released.
    pub(crate) async fn close(self) -> Result<usize, StoreError> {
        self.worker.shutdown().await
    }
}

impl fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("journal_mode", &self.journal_mode)
            .field("alive", &self.is_alive())
            .finish()
    }
}
