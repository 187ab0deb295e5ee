use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, params};

use crate::builder::escape_identifier;
use crate::error::StoreError;
use crate::events::{EventBus, EventPayload};

use super::{Migration, MigrationRecord, MigrationReport, MigrationStatus};

fn ensure_table(conn: &Connection, table: &str) -> Result<(), StoreError> {
    let sql = format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    version INTEGER PRIMARY KEY,\n    name TEXT NOT NULL,\n    identifier TEXT NOT NULL,\n    applied_at TEXT NOT NULL\n)",
        escape_identifier(table)
    );
    conn.execute_batch(&sql)
        .map_err(|e| StoreError::query(&sql, e))
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool, StoreError> {
    let sql = "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1";
    let count: i64 = conn
        .query_row(sql, [table], |row| row.get(0))
        .map_err(|e| StoreError::query(sql, e))?;
    Ok(count > 0)
}

/// Applied rows in version order; empty when the table does not exist yet.
pub(crate) fn applied_records(
    conn: &Connection,
    table: &str,
) -> Result<Vec<MigrationRecord>, StoreError> {
    if !table_exists(conn, table)? {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT version, name, identifier, applied_at FROM {} ORDER BY version",
        escape_identifier(table)
    );
    let mut stmt = conn.prepare(&sql).map_err(|e| StoreError::query(&sql, e))?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })
        .map_err(|e| StoreError::query(&sql, e))?;

    let mut records = Vec::new();
    for row in rows {
        let (version, name, identifier, applied_at) = row.map_err(|e| StoreError::query(&sql, e))?;
        let applied_at = DateTime::parse_from_rfc3339(&applied_at)
            .map_err(|e| {
                StoreError::MigrationPlan(format!(
                    "applied_at of version {version} is not RFC 3339 ({applied_at}): {e}"
                ))
            })?
            .with_timezone(&Utc);
        records.push(MigrationRecord {
            version,
            name,
            identifier,
            applied_at,
        });
    }
    Ok(records)
}

/// Pending candidates in ascending version order.
///
/// Duplicate candidate versions reject the whole plan.
pub(crate) fn plan(
    candidates: Vec<Migration>,
    applied: &BTreeSet<i64>,
) -> Result<Vec<Migration>, StoreError> {
    let mut seen = HashSet::with_capacity(candidates.len());
    for migration in &candidates {
        if !seen.insert(migration.version) {
            return Err(StoreError::MigrationPlan(format!(
                "version {} is defined more than once",
                migration.version
            )));
        }
    }
    let mut pending: Vec<Migration> = candidates
        .into_iter()
        .filter(|m| !applied.contains(&m.version))
        .collect();
    pending.sort_by_key(Migration::version);
    Ok(pending)
}

/// Bring the schema up to date, stopping at the first failing migration.
pub(crate) fn run(
    conn: &Connection,
    table: &str,
    candidates: Vec<Migration>,
    events: &EventBus,
) -> Result<MigrationReport, StoreError> {
    ensure_table(conn, table)?;
    let applied: BTreeSet<i64> = applied_records(conn, table)?
        .into_iter()
        .map(|r| r.version)
        .collect();
    let total = candidates.len();
    let pending = plan(candidates, &applied)?;
    let mut report = MigrationReport {
        applied: Vec::with_capacity(pending.len()),
        already_applied: total - pending.len(),
    };

    for migration in &pending {
        tracing::debug!(version = migration.version, name = %migration.name, status = ?MigrationStatus::Pending);
        match apply_one(conn, table, migration) {
            Ok(record) => {
                events.emit(EventPayload::Migration {
                    version: record.version,
                    name: record.name.clone(),
                    identifier: record.identifier.clone(),
                });
                report.applied.push(record);
            }
            Err(source) => {
                tracing::debug!(version = migration.version, name = %migration.name, status = ?MigrationStatus::Failed);
                return Err(StoreError::Migration {
                    version: migration.version,
                    name: migration.name.clone(),
                    source: Box::new(source),
                });
            }
        }
    }
    Ok(report)
}

fn apply_one(
    conn: &Connection,
    table: &str,
    migration: &Migration,
) -> Result<MigrationRecord, StoreError> {
    tracing::debug!(version = migration.version, name = %migration.name, status = ?MigrationStatus::Applying);
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(&migration.up)
        .map_err(|e| StoreError::query(&migration.up, e))?;

    let applied_at = Utc::now();
    let insert = format!(
        "INSERT INTO {} (version, name, identifier, applied_at) VALUES (?1, ?2, ?3, ?4)",
        escape_identifier(table)
    );
    tx.execute(
        &insert,
        params![
            migration.version,
            migration.name,
            migration.identifier,
            applied_at.to_rfc3339_opts(SecondsFormat::Millis, true)
        ],
    )
    .map_err(|e| StoreError::query(&insert, e))?;
    tx.commit()?;
    tracing::debug!(version = migration.version, name = %migration.name, status = ?MigrationStatus::Applied);

    Ok(MigrationRecord {
        version: migration.version,
        name: migration.name.clone(),
        identifier: migration.identifier.clone(),
        applied_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    fn versions(conn: &Connection) -> Vec<i64> {
        applied_records(conn, "_migrations")
            .unwrap()
            .into_iter()
            .map(|r| r.version)
            .collect()
    }

    #[test]
    fn plan_sorts_and_skips_applied() {
        let candidates = vec![
            Migration::new(3, "c", "SELECT 1"),
            Migration::new(1, "a", "SELECT 1"),
            Migration::new(2, "b", "SELECT 1"),
        ];
        let applied = BTreeSet::from([2]);
        let pending = plan(candidates, &applied).unwrap();
        let order: Vec<i64> = pending.iter().map(Migration::version).collect();
        assert_eq!(order, vec![1, 3]);
    }

    #[test]
    fn plan_rejects_duplicate_versions() {
        let candidates = vec![
            Migration::new(1, "a", "SELECT 1"),
            Migration::new(1, "again", "SELECT 2"),
        ];
        let err = plan(candidates, &BTreeSet::new()).unwrap_err();
        assert!(matches!(err, StoreError::MigrationPlan(ref msg) if msg.contains("version 1")));
    }

    #[test]
    fn failed_migration_is_not_recorded_and_halts_the_run() {
        let conn = store();
        let events = EventBus::new(8);
        let candidates = vec![
            Migration::new(1, "users", "CREATE TABLE users (id INTEGER PRIMARY KEY)"),
            Migration::new(2, "broken", "CREATE TABLE posts (id INTEGER PRIMARY KEY); INSERT INTO nowhere VALUES (1)"),
            Migration::new(3, "later", "CREATE TABLE later (id INTEGER)"),
        ];
        let err = run(&conn, "_migrations", candidates, &events).unwrap_err();
        assert!(matches!(err, StoreError::Migration { version: 2, ref name, .. } if name == "broken"));
        assert_eq!(versions(&conn), vec![1]);

        let posts: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE name IN ('posts', 'later')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(posts, 0);
    }

    #[test]
    fn rerun_applies_nothing() {
        let conn = store();
        let events = EventBus::new(8);
        let candidates = vec![Migration::new(1, "users", "CREATE TABLE users (id INTEGER)")];
        let first = run(&conn, "_migrations", candidates.clone(), &events).unwrap();
        assert_eq!(first.applied_versions(), vec![1]);
        let second = run(&conn, "_migrations", candidates, &events).unwrap();
        assert!(second.applied.is_empty());
        assert_eq!(second.already_applied, 1);
    }
}
