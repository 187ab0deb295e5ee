// SQLite layer: a dedicated worker thread owns each open handle.
//
// - open: file preparation, open flags and pragmas
// - params: conversion of `RowValues` into rusqlite values
// - query: row extraction into result sets
// - cache: exact-text statement cache living on the worker
// - worker: command channel between async callers and the worker thread

pub(crate) mod cache;
pub(crate) mod open;
pub mod params;
pub mod query;
pub(crate) mod worker;

pub use params::{convert_params, row_value_to_sqlite_value};
pub use query::{build_result_set, sqlite_extract_value_sync};
pub(crate) use worker::SqliteConnection;
