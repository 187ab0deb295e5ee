use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::thread;

use rusqlite::types::Value;
use tokio::sync::oneshot;

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::results::{CustomDbRow, ResultSet};
use crate::sqlite::open::{open_connection, prepare_store_path};
use crate::types::ExecuteResult;

use super::channel::{BoxedCallback, Command};
use super::dispatcher::run_sqlite_worker;

pub(super) struct SqliteWorker {
    sender: Sender<Command>,
    alive: Arc<AtomicBool>,
}

impl SqliteWorker {
    /// Start the worker thread and open the store on it.
    ///
    /// Parent directories are created on the worker thread as well. Resolves once the handle is open and configured, with the journal mode `SQLite` reports.
    pub(super) async fn spawn(config: &StoreConfig) -> Result<(Self, String), StoreError> {
        let (sender, receiver) = mpsc::channel::<Command>();
        let (ready_tx, ready_rx) = oneshot::channel::<Result<String, StoreError>>();
        let alive = Arc::new(AtomicBool::new(true));
        let thread_alive = Arc::clone(&alive);
        let thread_config = config.clone();

        thread::Builder::new()
            .name(format!("sqlite-worker-{}", config.path.display()))
            .spawn(move || {
                match prepare_store_path(&thread_config)
                    .and_then(|()| open_connection(&thread_config))
                {
                    Ok((conn, journal_mode)) => {
                        if ready_tx.send(Ok(journal_mode)).is_ok() {
                            run_sqlite_worker(conn, &receiver);
                        }
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                    }
                }
                thread_alive.store(false, Ordering::Release);
            })
            .map_err(|err| {
                StoreError::Connection(format!("failed to spawn SQLite worker thread: {err}"))
            })?;

        let journal_mode = ready_rx
            .await
            .map_err(|_| connection_error("SQLite worker exited before opening the store"))??;
        Ok((Self { sender, alive }, journal_mode))
    }

    pub(super) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub(super) fn alive_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.alive)
    }

    pub(super) fn send_command(&self, command: Command) -> Result<(), StoreError> {
        self.sender
            .send(command)
            .map_err(|_| connection_error("SQLite worker closed"))
    }

    pub(super) async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, StoreError>>) -> Command,
        drop_message: &'static str,
    ) -> Result<T, StoreError> {
        let (tx, rx) = oneshot::channel();
        self.send_command(build(tx))?;
        rx.await.map_err(|_| connection_error(drop_message))?
    }

    pub(super) async fn query(
        &self,
        sql: String,
        params: Vec<Value>,
    ) -> Result<ResultSet, StoreError> {
        self.request(
            |respond_to| Command::Query {
                sql,
                params,
                respond_to,
            },
            "SQLite worker dropped while running query",
        )
        .await
    }

    pub(super) async fn query_one(
        &self,
        sql: String,
        params: Vec<Value>,
    ) -> Result<Option<CustomDbRow>, StoreError> {
        self.request(
            |respond_to| Command::QueryOne {
                sql,
                params,
                respond_to,
            },
            "SQLite worker dropped while running query",
        )
        .await
    }

    pub(super) async fn execute(
        &self,
        sql: String,
        params: Vec<Value>,
    ) -> Result<ExecuteResult, StoreError> {
        self.request(
            |respond_to| Command::Execute {
                sql,
                params,
                respond_to,
            },
            "SQLite worker dropped while executing statement",
        )
        .await
    }

    pub(super) async fn execute_batch(&self, sql: String) -> Result<(), StoreError> {
        self.request(
            |respond_to| Command::ExecuteBatch { sql, respond_to },
            "SQLite worker dropped while executing batch",
        )
        .await
    }

    pub(super) async fn begin(&self) -> Result<(), StoreError> {
        self.request(
            |respond_to| Command::Begin { respond_to },
            "SQLite worker dropped while opening transaction",
        )
        .await
    }

    pub(super) async fn commit(&self) -> Result<(), StoreError> {
        self.request(
            |respond_to| Command::Commit { respond_to },
            "SQLite worker dropped while committing",
        )
        .await
    }

    pub(super) async fn rollback(&self) -> Result<(), StoreError> {
        self.request(
            |respond_to| Command::Rollback { respond_to },
            "SQLite worker dropped while rolling back",
        )
        .await
    }

    /// Queue a rollback without waiting for it; commands are processed in order.
    pub(super) fn rollback_detached(&self) {
        let (respond_to, _) = oneshot::channel();
        let _ = self.sender.send(Command::Rollback { respond_to });
    }

    pub(super) async fn backup(&self, destination: PathBuf) -> Result<(), StoreError> {
        self.request(
            |respond_to| Command::Backup {
                destination,
                respond_to,
            },
            "SQLite worker dropped while writing backup",
        )
        .await
    }

    pub(super) async fn cache_size(&self) -> Result<usize, StoreError> {
        let (tx, rx) = oneshot::channel();
        self.send_command(Command::CacheSize { respond_to: tx })?;
        rx.await
            .map_err(|_| connection_error("SQLite worker dropped while reporting cache size"))
    }

    pub(super) async fn with_connection<F, R>(&self, func: F) -> Result<R, StoreError>
    where
        F: FnOnce(&rusqlite::Connection) -> Result<R, StoreError> + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let callback: BoxedCallback = Box::new(move |conn| {
            func(conn).map(|value| Box::new(value) as Box<dyn std::any::Any + Send>)
        });
        self.send_command(Command::WithConnection {
            callback,
            respond_to: tx,
        })?;
        match rx.await {
            Ok(Ok(payload)) => payload
                .downcast::<R>()
                .map(|boxed| *boxed)
                .map_err(|_| connection_error("SQLite worker response downcast failure")),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(connection_error(
                "SQLite worker dropped while handling custom callback",
            )),
        }
    }

    pub(super) async fn shutdown(&self) -> Result<usize, StoreError> {
        self.request(
            |respond_to| Command::Shutdown { respond_to },
            "SQLite worker dropped while closing",
        )
        .await
    }
}

impl Drop for SqliteWorker {
    fn drop(&mut self) {
        let (respond_to, _) = oneshot::channel();
        let _ = self.sender.send(Command::Shutdown { respond_to });
    }
}

fn connection_error(message: &str) -> StoreError {
    StoreError::Connection(message.into())
}
