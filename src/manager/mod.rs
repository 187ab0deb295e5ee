//! The store manager: one `SQLite` handle, its lifecycle, and everything that runs on it.

mod facade;
mod state;
mod stats;
mod transaction;

pub use state::ConnectionState;
pub use stats::{ColumnDescriptor, StoreStats, TableDescriptor};
pub use transaction::StoreTx;

use transaction::{TaskKey, TxOwner};

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard, broadcast, watch};

use crate::backup::{self, BackupName, BackupRecord, BackupTimer};
use crate::config::{BackupSettings, StoreConfig};
use crate::error::StoreError;
use crate::events::{EventBus, EventPayload, StoreEvent};
use crate::migrations::{self, MigrationRecord, MigrationReport, MigrationSource};
use crate::sqlite::SqliteConnection;

static NEXT_MANAGER_ID: AtomicU64 = AtomicU64::new(1);

type Slot = Option<SqliteConnection>;

struct Shared {
    id: u64,
    config: StdMutex<StoreConfig>,
    migrations: Option<Arc<dyn MigrationSource>>,
    slot: Arc<Mutex<Slot>>,
    alive: StdMutex<Option<Arc<AtomicBool>>>,
    state: watch::Sender<ConnectionState>,
    events: EventBus,
    timer: StdMutex<Option<BackupTimer>>,
    tx_owner: TxOwner,
}

impl Drop for Shared {
    fn drop(&mut self) {
        let timer = self
            .timer
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(timer) = timer {
            timer.cancel();
        }
    }
}

/// Owns a single `SQLite` store: opening, migrating, querying, backing up and closing it.
///
/// Clones share the same handle. All access to the handle is serialized; concurrent
/// callers queue on an internal lock rather than interleaving. Dropping the last clone
/// closes the store.
#[derive(Clone)]
pub struct StoreManager {
    shared: Arc<Shared>,
}

impl StoreManager {
    /// Create a disconnected manager without migrations.
    ///
    /// # Errors
    /// Returns `StoreError::Configuration` when `config` fails validation.
    pub fn new(config: StoreConfig) -> Result<Self, StoreError> {
        Self::build(config, None)
    }

    /// Create a disconnected manager that applies `source` on every `connect`.
    ///
    /// # Errors
    /// Returns `StoreError::Configuration` when `config` fails validation.
    pub fn with_migrations(
        config: StoreConfig,
        source: impl MigrationSource + 'static,
    ) -> Result<Self, StoreError> {
        Self::build(config, Some(Arc::new(source)))
    }

    fn build(
        config: StoreConfig,
        migrations: Option<Arc<dyn MigrationSource>>,
    ) -> Result<Self, StoreError> {
        config.validate()?;
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let events = EventBus::new(config.event_capacity);
        Ok(Self {
            shared: Arc::new(Shared {
                id: NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed),
                config: StdMutex::new(config),
                migrations,
                slot: Arc::new(Mutex::new(None)),
                alive: StdMutex::new(None),
                state,
                events,
                timer: StdMutex::new(None),
                tx_owner: TxOwner::default(),
            }),
        })
    }

    /// Open the store, apply pragmas and pending migrations, then start the backup timer.
    ///
    /// Nothing stays open when any step fails.
    ///
    /// # Errors
    /// `AlreadyConnected` when a handle is open; configuration, `SQLite` and migration
    /// errors from the open sequence otherwise.
    pub async fn connect(&self) -> Result<(), StoreError> {
        self.ensure_outside_transaction("connect")?;
        let mut slot = self.shared.slot.lock().await;
        if slot.is_some() {
            return Err(self.fail("connect", StoreError::AlreadyConnected));
        }

        let config = self.config();
        self.shared.state.send_replace(ConnectionState::Connecting);
        match self.open(&config).await {
            Ok(conn) => {
                *lock(&self.shared.alive) = Some(conn.alive_flag());
                *slot = Some(conn);
                self.shared.state.send_replace(ConnectionState::Connected);
            }
            Err(err) => {
                self.shared.state.send_replace(ConnectionState::Disconnected);
                return Err(self.fail("connect", err));
            }
        }

        // timers only start while the slot is held, so `disconnect` always sees them
        if config.backup.enabled {
            self.start_timer(config.backup.interval());
        }
        Ok(())
    }

    async fn open(&self, config: &StoreConfig) -> Result<SqliteConnection, StoreError> {
        config.validate()?;
        let conn = SqliteConnection::open(config).await?;
        self.shared.events.emit(EventPayload::Open {
            path: config.path.clone(),
            journal_mode: conn.journal_mode().to_string(),
        });

        if config.open.read_only {
            tracing::debug!(path = %config.path.display(), "read-only store, migrations skipped");
            return Ok(conn);
        }
        if let Err(err) = self.migrate(&conn, config).await {
            self.close_connection(conn, &config.path).await;
            return Err(err);
        }
        Ok(conn)
    }

    async fn migrate(
        &self,
        conn: &SqliteConnection,
        config: &StoreConfig,
    ) -> Result<MigrationReport, StoreError> {
        let candidates = match &self.shared.migrations {
            Some(source) => source.migrations()?,
            None => Vec::new(),
        };
        let table = config.migrations.table.clone();
        let events = self.shared.events.clone();
        let report = conn
            .with_connection(move |c| migrations::run(c, &table, candidates, &events))
            .await?;
        tracing::info!(
            applied = report.applied.len(),
            already_applied = report.already_applied,
            "migrations complete"
        );
        Ok(report)
    }

    /// Stop the backup timer, release cached statements and close the handle.
    ///
    /// Safe to call when already disconnected. Failures are reported as error events.
    pub async fn disconnect(&self) {
        if self.ensure_outside_transaction("disconnect").is_err() {
            return;
        }
        self.stop_timer().await;

        let mut slot = self.shared.slot.lock().await;
        // a timer started after the first stop is still waiting for its first tick
        if let Some(timer) = lock(&self.shared.timer).take() {
            timer.cancel();
        }
        let Some(conn) = slot.take() else {
            return;
        };
        *lock(&self.shared.alive) = None;
        let path = self.config().path;
        self.close_connection(conn, &path).await;
        self.shared.state.send_replace(ConnectionState::Disconnected);
    }

    async fn close_connection(&self, conn: SqliteConnection, path: &Path) {
        match conn.close().await {
            Ok(statements_released) => self.shared.events.emit(EventPayload::Close {
                path: path.to_path_buf(),
                statements_released,
            }),
            Err(err) => self.shared.events.error("disconnect", &err),
        }
    }

    /// True while a handle is open and its worker thread is still running.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        *self.shared.state.borrow() == ConnectionState::Connected
            && lock(&self.shared.alive)
                .as_ref()
                .is_some_and(|alive| alive.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Follow state transitions as they happen.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Receive this manager's events. Lagging receivers skip the oldest events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.shared.events.subscribe()
    }

    /// Snapshot of the current configuration.
    #[must_use]
    pub fn config(&self) -> StoreConfig {
        lock(&self.shared.config).clone()
    }

    /// Replace the configuration; takes effect on the next `connect`.
    ///
    /// The event channel keeps the capacity it was created with.
    ///
    /// # Errors
    /// `AlreadyConnected` while a handle is open, or a validation error.
    pub async fn set_config(&self, config: StoreConfig) -> Result<(), StoreError> {
        config.validate()?;
        self.ensure_outside_transaction("set_config")?;
        let slot = self.shared.slot.lock().await;
        if slot.is_some() {
            return Err(self.fail("set_config", StoreError::AlreadyConnected));
        }
        *lock(&self.shared.config) = config;
        Ok(())
    }

    /// Replace backup settings, restarting or stopping the timer when connected.
    ///
    /// # Errors
    /// `StoreError::Configuration` when the new settings are invalid, `NestedTransaction`
    /// when this task holds a transaction of the manager.
    pub async fn update_backup_settings(&self, settings: BackupSettings) -> Result<(), StoreError> {
        let mut candidate = self.config();
        candidate.backup = settings;
        candidate.validate()?;
        self.ensure_outside_transaction("update_backup_settings")?;
        let enabled = candidate.backup.enabled;
        let period = candidate.backup.interval();
        *lock(&self.shared.config) = candidate;

        self.stop_timer().await;
        let slot = self.shared.slot.lock().await;
        if enabled && slot.is_some() {
            self.start_timer(period);
        }
        Ok(())
    }

    /// Write a snapshot into the backup directory, then prune old snapshots.
    ///
    /// # Errors
    /// `NotConnected` without a handle; `StoreError::Backup` when the snapshot cannot be written.
    pub async fn create_backup(&self, name: BackupName) -> Result<BackupRecord, StoreError> {
        let conn = self.connection("backup").await?;
        let config = self.config();
        backup::create_backup(
            &conn,
            &config.backup_dir(),
            &name,
            config.backup.max_backups,
            &self.shared.events,
        )
        .await
        .map_err(|err| self.fail("backup", err))
    }

    /// Records from the bookkeeping table, in version order.
    ///
    /// # Errors
    /// `NotConnected` without a handle, or the `SQLite` error reading the table.
    pub async fn applied_migrations(&self) -> Result<Vec<MigrationRecord>, StoreError> {
        let conn = self.connection("applied_migrations").await?;
        let table = self.config().migrations.table;
        conn.with_connection(move |c| migrations::applied_records(c, &table))
            .await
            .map_err(|err| self.fail("applied_migrations", err))
    }

    /// Apply any pending migrations on the open handle. Read-only stores report nothing applied.
    ///
    /// # Errors
    /// `NotConnected` without a handle, or the first migration failure.
    pub async fn run_migrations(&self) -> Result<MigrationReport, StoreError> {
        let conn = self.connection("migrate").await?;
        let config = self.config();
        if config.open.read_only {
            return Ok(MigrationReport::default());
        }
        self.migrate(&conn, &config)
            .await
            .map_err(|err| self.fail("migrate", err))
    }

    fn start_timer(&self, period: Duration) {
        let weak = Arc::downgrade(&self.shared);
        let timer = BackupTimer::start(period, move || {
            let weak = weak.clone();
            async move {
                let Some(shared) = weak.upgrade() else {
                    return false;
                };
                let manager = StoreManager { shared };
                // failures are already on the event channel
                let _ = manager.create_backup(BackupName::DateTime).await;
                true
            }
        });
        let previous = lock(&self.shared.timer).replace(timer);
        if let Some(previous) = previous {
            previous.cancel();
        }
    }

    async fn stop_timer(&self) {
        let timer = lock(&self.shared.timer).take();
        if let Some(timer) = timer {
            timer.stop().await;
        }
    }

    /// Lock the handle for one operation.
    async fn connection(
        &self,
        operation: &str,
    ) -> Result<MappedMutexGuard<'_, SqliteConnection>, StoreError> {
        self.ensure_outside_transaction(operation)?;
        let slot = self.shared.slot.lock().await;
        MutexGuard::try_map(slot, Option::as_mut)
            .map_err(|_| self.fail(operation, StoreError::NotConnected))
    }

    /// The handle is held by an open transaction of this manager in the current task.
    fn ensure_outside_transaction(&self, operation: &str) -> Result<(), StoreError> {
        let holds_tx = *lock(&self.shared.tx_owner) == Some(TaskKey::current());
        if holds_tx || transaction::in_transaction(self.shared.id) {
            Err(self.fail(operation, StoreError::NestedTransaction))
        } else {
            Ok(())
        }
    }

    fn fail(&self, operation: &str, err: StoreError) -> StoreError {
        self.shared.events.error(operation, &err);
        err
    }
}

impl fmt::Debug for StoreManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreManager")
            .field("id", &self.shared.id)
            .field("path", &self.config().path)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &StdMutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
