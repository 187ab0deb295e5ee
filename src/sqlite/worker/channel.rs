use std::any::Any;
use std::path::PathBuf;

use rusqlite::types::Value;
use tokio::sync::oneshot;

use crate::error::StoreError;
use crate::results::{CustomDbRow, ResultSet};
use crate::types::ExecuteResult;

pub(super) type BoxedResponse = Result<Box<dyn Any + Send>, StoreError>;
pub(super) type BoxedCallback = Box<dyn FnOnce(&rusqlite::Connection) -> BoxedResponse + Send>;

pub(super) enum Command {
    Query {
        sql: String,
        params: Vec<Value>,
        respond_to: oneshot::Sender<Result<ResultSet, StoreError>>,
    },
    QueryOne {
        sql: String,
        params: Vec<Value>,
        respond_to: oneshot::Sender<Result<Option<CustomDbRow>, StoreError>>,
    },
    Execute {
        sql: String,
        params: Vec<Value>,
        respond_to: oneshot::Sender<Result<ExecuteResult, StoreError>>,
    },
    ExecuteBatch {
        sql: String,
        respond_to: oneshot::Sender<Result<(), StoreError>>,
    },
    Begin {
        respond_to: oneshot::Sender<Result<(), StoreError>>,
    },
    Commit {
        respond_to: oneshot::Sender<Result<(), StoreError>>,
    },
    Rollback {
        respond_to: oneshot::Sender<Result<(), StoreError>>,
    },
    Backup {
        destination: PathBuf,
        respond_to: oneshot::Sender<Result<(), StoreError>>,
    },
    CacheSize {
        respond_to: oneshot::Sender<usize>,
    },
    WithConnection {
        callback: BoxedCallback,
        respond_to: oneshot::Sender<BoxedResponse>,
    },
    /// Finalize cached statements and close the handle; replies with the number released.
    Shutdown {
        respond_to: oneshot::Sender<Result<usize, StoreError>>,
    },
}
