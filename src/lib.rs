//! Embedded single-file `SQLite` store manager.
//!
//! A [`StoreManager`] owns one store handle on a dedicated worker thread. It opens the
//! file with tuned pragmas, applies forward-only [`migrations`], serves cached statements
//! and transactions, writes rotating [`backup`]s, and reports what it does on an event
//! channel. The [`builder`] module assembles SQL text with positional parameters.
//!
//! ```rust,no_run
//! use sqlite_steward::prelude::*;
//!
//! # async fn demo() -> Result<(), StoreError> {
//! let config = StoreConfig::builder("data/app.db").max_backups(5).build()?;
//! let migrations = vec![Migration::new(
//!     1,
//!     "create_users",
//!     "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
//! )];
//! let store = StoreManager::with_migrations(config, migrations)?;
//! store.connect().await?;
//!
//! let insert = builder::insert().into("users").value([("name", "alice")]).build()?;
//! store.execute_statement(&insert).await?;
//! let row = store
//!     .query_one("SELECT name FROM users WHERE id = ?", &[RowValues::Int(1)])
//!     .await?;
//! assert!(row.is_some());
//!
//! store.disconnect().await;
//! # Ok(())
//! # }
//! ```

pub mod backup;
pub mod builder;
pub mod config;
pub mod error;
pub mod events;
pub mod manager;
pub mod migrations;
pub mod prelude;
pub mod results;
pub mod sqlite;
pub mod types;

pub use backup::{BackupName, BackupRecord};
pub use config::{
    BackupSettings, MigrationSettings, OpenOptions, PragmaSettings, StoreConfig,
    StoreConfigBuilder, SynchronousMode,
};
pub use error::{ErrorKind, StoreError};
pub use events::{EventBus, EventKind, EventPayload, StoreEvent};
pub use manager::{
    ColumnDescriptor, ConnectionState, StoreManager, StoreStats, StoreTx, TableDescriptor,
};
pub use migrations::{Migration, MigrationRecord, MigrationReport, MigrationSource, MigrationStatus};
pub use results::{CustomDbRow, ResultSet};
pub use types::{ExecuteResult, RowValues};
