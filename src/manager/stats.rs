use std::path::PathBuf;

use rusqlite::Connection;
use serde::Serialize;

use crate::builder::escape_identifier;
use crate::error::StoreError;

use super::StoreManager;

/// Read-only snapshot of the store's size and schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub path: PathBuf,
    /// Zero for in-memory stores.
    pub file_size_bytes: u64,
    pub page_size: i64,
    pub page_count: i64,
    pub cached_statements: usize,
    pub tables: Vec<TableDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableDescriptor {
    pub name: String,
    pub row_count: i64,
    pub columns: Vec<ColumnDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Declared type; empty when the column has none.
    pub data_type: String,
    pub nullable: bool,
    pub default_value: Option<String>,
    pub primary_key: bool,
}

struct SchemaSnapshot {
    page_size: i64,
    page_count: i64,
    tables: Vec<TableDescriptor>,
}

fn snapshot(conn: &Connection) -> Result<SchemaSnapshot, StoreError> {
    let page_size: i64 = conn.query_row("PRAGMA page_size", [], |row| row.get(0))?;
    let page_count: i64 = conn.query_row("PRAGMA page_count", [], |row| row.get(0))?;

    let names = {
        let sql = "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name";
        let mut stmt = conn.prepare(sql).map_err(|e| StoreError::query(sql, e))?;
        stmt.query_map([], |row| row.get::<_, String>(0))
            .and_then(Iterator::collect::<rusqlite::Result<Vec<_>>>)
            .map_err(|e| StoreError::query(sql, e))?
    };

    let mut tables = Vec::with_capacity(names.len());
    for name in names {
        let quoted = escape_identifier(&name);
        let count_sql = format!("SELECT COUNT(*) FROM {quoted}");
        let row_count: i64 = conn
            .query_row(&count_sql, [], |row| row.get(0))
            .map_err(|e| StoreError::query(&count_sql, e))?;

        let info_sql = format!("PRAGMA table_info({quoted})");
        let mut stmt = conn
            .prepare(&info_sql)
            .map_err(|e| StoreError::query(&info_sql, e))?;
        let columns = stmt
            .query_map([], |row| {
                Ok(ColumnDescriptor {
                    name: row.get("name")?,
                    data_type: row.get("type")?,
                    nullable: row.get::<_, i64>("notnull")? == 0,
                    default_value: row.get("dflt_value")?,
                    primary_key: row.get::<_, i64>("pk")? > 0,
                })
            })
            .and_then(Iterator::collect::<rusqlite::Result<Vec<_>>>)
            .map_err(|e| StoreError::query(&info_sql, e))?;

        tables.push(TableDescriptor {
            name,
            row_count,
            columns,
        });
    }

    Ok(SchemaSnapshot {
        page_size,
        page_count,
        tables,
    })
}

impl StoreManager {
    /// Sizes and schema of the open store. Never writes.
    ///
    /// # Errors
    /// `NotConnected` without a handle, or the `SQLite` error raised while reading the schema.
    pub async fn stats(&self) -> Result<StoreStats, StoreError> {
        let conn = self.connection("stats").await?;
        let schema = conn
            .with_connection(snapshot)
            .await
            .map_err(|err| self.fail("stats", err))?;
        let cached_statements = conn.cached_statement_count().await?;
        drop(conn);

        let config = self.config();
        let file_size_bytes = if config.is_memory() {
            0
        } else {
            tokio::fs::metadata(&config.path)
                .await
                .map(|m| m.len())
                .unwrap_or(0)
        };

        Ok(StoreStats {
            path: config.path,
            file_size_bytes,
            page_size: schema.page_size,
            page_count: schema.page_count,
            cached_statements,
            tables: schema.tables,
        })
    }
}
