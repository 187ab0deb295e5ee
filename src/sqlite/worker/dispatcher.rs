use std::sync::mpsc::Receiver;

use rusqlite::types::Value;
use rusqlite::{Connection, DatabaseName, params_from_iter};

use crate::error::StoreError;
use crate::results::{CustomDbRow, ResultSet};
use crate::sqlite::cache::{StatementCache, check_binding};
use crate::sqlite::query::{build_result_set, first_row};
use crate::types::ExecuteResult;

use super::channel::Command;

/// Serve commands until shutdown or until every sender is gone, then close the handle.
pub(super) fn run_sqlite_worker(conn: Connection, receiver: &Receiver<Command>) {
    let mut cache = StatementCache::new(&conn);
    let mut shutdown_reply = None;

    while let Ok(command) = receiver.recv() {
        match command {
            Command::Shutdown { respond_to } => {
                shutdown_reply = Some(respond_to);
                break;
            }
            Command::Query {
                sql,
                params,
                respond_to,
            } => {
                let _ = respond_to.send(query(&mut cache, &sql, &params));
            }
            Command::QueryOne {
                sql,
                params,
                respond_to,
            } => {
                let _ = respond_to.send(query_one(&mut cache, &sql, &params));
            }
            Command::Execute {
                sql,
                params,
                respond_to,
            } => {
                let _ = respond_to.send(execute(&mut cache, &sql, &params));
            }
            Command::ExecuteBatch { sql, respond_to } => {
                let _ = respond_to.send(execute_batch(&conn, &sql));
            }
            Command::Begin { respond_to } => {
                let _ = respond_to.send(begin(&conn));
            }
            Command::Commit { respond_to } => {
                let _ = respond_to.send(commit(&conn));
            }
            Command::Rollback { respond_to } => {
                let _ = respond_to.send(rollback(&conn));
            }
            Command::Backup {
                destination,
                respond_to,
            } => {
                let outcome = conn
                    .backup(DatabaseName::Main, &destination, None)
                    .map_err(|e| {
                        StoreError::backup(format!("snapshot to {}", destination.display()), e)
                    });
                let _ = respond_to.send(outcome);
            }
            Command::CacheSize { respond_to } => {
                let _ = respond_to.send(cache.len());
            }
            Command::WithConnection {
                callback,
                respond_to,
            } => {
                let _ = respond_to.send(callback(&conn));
            }
        }
    }

    let released = cache.clear();
    drop(cache);
    let outcome = match conn.close() {
        Ok(()) => Ok(released),
        Err((_conn, err)) => Err(StoreError::Sqlite(err)),
    };
    match shutdown_reply {
        Some(reply) => {
            let _ = reply.send(outcome);
        }
        None => {
            if let Err(err) = outcome {
                tracing::warn!(error = %err, "SQLite handle closed with error after all senders dropped");
            }
        }
    }
}

fn query(
    cache: &mut StatementCache<'_>,
    sql: &str,
    params: &[Value],
) -> Result<ResultSet, StoreError> {
    let stmt = cache.prepare(sql)?;
    check_binding(stmt, sql, params.len())?;
    build_result_set(stmt, params).map_err(|e| StoreError::query(sql, e))
}

fn query_one(
    cache: &mut StatementCache<'_>,
    sql: &str,
    params: &[Value],
) -> Result<Option<CustomDbRow>, StoreError> {
    let stmt = cache.prepare(sql)?;
    check_binding(stmt, sql, params.len())?;
    first_row(stmt, params).map_err(|e| StoreError::query(sql, e))
}

fn execute(
    cache: &mut StatementCache<'_>,
    sql: &str,
    params: &[Value],
) -> Result<ExecuteResult, StoreError> {
    let conn = cache.connection();
    let stmt = cache.prepare(sql)?;
    check_binding(stmt, sql, params.len())?;
    let rows_affected = stmt
        .execute(params_from_iter(params.iter()))
        .map_err(|e| StoreError::query(sql, e))?;
    Ok(ExecuteResult {
        rows_affected,
        last_insert_id: conn.last_insert_rowid(),
    })
}

/// Scripts run atomically: wrapped in a transaction unless one is already open.
fn execute_batch(conn: &Connection, sql: &str) -> Result<(), StoreError> {
    if conn.is_autocommit() {
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| StoreError::query(sql, e))?;
        tx.execute_batch(sql).map_err(|e| StoreError::query(sql, e))?;
        tx.commit().map_err(|e| StoreError::query(sql, e))
    } else {
        conn.execute_batch(sql).map_err(|e| StoreError::query(sql, e))
    }
}

fn begin(conn: &Connection) -> Result<(), StoreError> {
    if !conn.is_autocommit() {
        return Err(StoreError::NestedTransaction);
    }
    conn.execute_batch("BEGIN")
        .map_err(|e| StoreError::query("BEGIN", e))
}

fn commit(conn: &Connection) -> Result<(), StoreError> {
    if conn.is_autocommit() {
        return Err(StoreError::Connection(
            "COMMIT requested with no open transaction".into(),
        ));
    }
    conn.execute_batch("COMMIT")
        .map_err(|e| StoreError::query("COMMIT", e))
}

/// `SQLite` may already have rolled back on its own (e.g. after SQLITE_FULL); that counts as done.
fn rollback(conn: &Connection) -> Result<(), StoreError> {
    if conn.is_autocommit() {
        return Ok(());
    }
    conn.execute_batch("ROLLBACK")
        .map_err(|e| StoreError::query("ROLLBACK", e))
}
