//! Convenient imports for common functionality.
//!
//! ```rust
//! use sqlite_steward::prelude::*;
//! ```

pub use crate::backup::{BackupName, BackupRecord};
pub use crate::builder::{self, BuiltStatement, Comparison, Order, escape_identifier};
pub use crate::config::{BackupSettings, StoreConfig, SynchronousMode};
pub use crate::error::{ErrorKind, StoreError};
pub use crate::events::{EventKind, EventPayload, StoreEvent};
pub use crate::manager::{ConnectionState, StoreManager, StoreTx};
pub use crate::migrations::{Migration, MigrationReport, MigrationSource};
pub use crate::results::{CustomDbRow, ResultSet};
pub use crate::types::{ExecuteResult, RowValues};
