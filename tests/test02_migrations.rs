use std::path::Path;
use std::sync::Arc;

use sqlite_steward::prelude::*;
use sqlite_steward::{EventPayload, MigrationRecord};

fn config(path: &Path) -> Result<StoreConfig, StoreError> {
    StoreConfig::builder(path).build()
}

fn shuffled_migrations() -> Vec<Migration> {
    vec![
        Migration::new(3, "log_three", "INSERT INTO log (entry) VALUES ('three')"),
        Migration::new(1, "create_log", "CREATE TABLE log (seq INTEGER PRIMARY KEY, entry TEXT)")
            .with_identifier("migrations/0001_create_log.sql")
            .with_reverse("DROP TABLE log"),
        Migration::new(2, "log_two", "INSERT INTO log (entry) VALUES ('two')"),
    ]
}

async fn applied_versions(path: &Path) -> Result<Vec<i64>, StoreError> {
    let inspector = StoreManager::new(config(path)?)?;
    inspector.connect().await?;
    let versions = inspector
        .applied_migrations()
        .await?
        .iter()
        .map(|r| r.version)
        .collect();
    inspector.disconnect().await;
    Ok(versions)
}

#[tokio::test]
async fn applies_in_ascending_version_order() -> Result<(), StoreError> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("ordered.db");
    let store = StoreManager::with_migrations(config(&path)?, shuffled_migrations())?;
    let mut rx = store.subscribe();
    store.connect().await?;

    let entries = store.query("SELECT entry FROM log ORDER BY seq", &[]).await?;
    let entries: Vec<_> = entries
        .results
        .iter()
        .filter_map(|row| row.get("entry").and_then(RowValues::as_text).map(str::to_owned))
        .collect();
    assert_eq!(entries, vec!["two", "three"]);

    let records: Vec<MigrationRecord> = store.applied_migrations().await?;
    let versions: Vec<i64> = records.iter().map(|r| r.version).collect();
    assert_eq!(versions, vec![1, 2, 3]);
    assert_eq!(records[0].identifier, "migrations/0001_create_log.sql");
    assert_eq!(records[1].identifier, "0002_log_two");

    let mut migrated = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let EventPayload::Migration { version, .. } = event.payload {
            migrated.push(version);
        }
    }
    assert_eq!(migrated, vec![1, 2, 3]);
    store.disconnect().await;
    Ok(())
}

#[tokio::test]
async fn reconnecting_applies_nothing_new() -> Result<(), StoreError> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("idempotent.db");
    let store = StoreManager::with_migrations(config(&path)?, shuffled_migrations())?;
    store.connect().await?;
    store.disconnect().await;

    let mut rx = store.subscribe();
    store.connect().await?;
    let report = store.run_migrations().await?;
    assert!(report.applied.is_empty());
    assert_eq!(report.already_applied, 3);

    while let Ok(event) = rx.try_recv() {
        assert_ne!(event.kind, EventKind::Migration);
    }
    let rows = store.query("SELECT entry FROM log", &[]).await?;
    assert_eq!(rows.len(), 2, "forward SQL must not run twice");
    store.disconnect().await;
    Ok(())
}

#[tokio::test]
async fn failed_migration_is_not_recorded_and_stops_the_run() -> Result<(), StoreError> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("broken.db");
    let migrations = vec![
        Migration::new(1, "create_items", "CREATE TABLE items (id INTEGER PRIMARY KEY)"),
        Migration::new(
            2,
            "half_done",
            "CREATE TABLE tags (id INTEGER); INSERT INTO missing_table VALUES (1);",
        ),
        Migration::new(3, "never_reached", "CREATE TABLE later (id INTEGER)"),
    ];
    let store = StoreManager::with_migrations(config(&path)?, migrations)?;

    let err = store.connect().await.unwrap_err();
    match &err {
        StoreError::Migration { version, name, .. } => {
            assert_eq!(*version, 2);
            assert_eq!(name, "half_done");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(err.kind(), ErrorKind::Migration);
    assert!(err.to_string().contains("half_done"));
    assert!(!store.is_connected());
    assert_eq!(store.state(), ConnectionState::Disconnected);

    assert_eq!(applied_versions(&path).await?, vec![1]);

    let inspector = StoreManager::new(config(&path)?)?;
    inspector.connect().await?;
    let leftovers = inspector
        .query(
            "SELECT name FROM sqlite_master WHERE name IN ('tags', 'later')",
            &[],
        )
        .await?;
    assert!(leftovers.is_empty());
    inspector.disconnect().await;
    Ok(())
}

#[tokio::test]
async fn duplicate_versions_fail_before_anything_runs() -> Result<(), StoreError> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("dupes.db");
    let migrations = vec![
        Migration::new(1, "first", "CREATE TABLE a (id INTEGER)"),
        Migration::new(2, "second", "CREATE TABLE b (id INTEGER)"),
        Migration::new(2, "second_again", "CREATE TABLE c (id INTEGER)"),
    ];
    let store = StoreManager::with_migrations(config(&path)?, migrations)?;
    let err = store.connect().await.unwrap_err();
    assert!(matches!(err, StoreError::MigrationPlan(_)));
    assert!(!store.is_connected());
    assert!(applied_versions(&path).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn custom_bookkeeping_table_and_reverse_sql_untouched() -> Result<(), StoreError> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("custom.db");
    let config = StoreConfig::builder(&path)
        .migration_table("schema_history")
        .build()?;
    let store = StoreManager::with_migrations(
        config,
        vec![Migration::new(7, "users", "CREATE TABLE users (id INTEGER)").with_reverse("DROP TABLE users")],
    )?;
    store.connect().await?;

    let history = store
        .query_one("SELECT version, name FROM schema_history", &[])
        .await?
        .ok_or_else(|| StoreError::Configuration("missing history row".into()))?;
    assert_eq!(history.get("version"), Some(&RowValues::Int(7)));
    assert!(store.query("SELECT * FROM users", &[]).await?.is_empty());
    store.disconnect().await;
    Ok(())
}

#[tokio::test]
async fn one_shared_migration_list_serves_several_stores() -> Result<(), StoreError> {
    let dir = tempfile::tempdir()?;
    let shared: Arc<[Migration]> = shuffled_migrations().into();

    for name in ["east.db", "west.db"] {
        let path = dir.path().join(name);
        let store = StoreManager::with_migrations(config(&path)?, Arc::clone(&shared))?;
        store.connect().await?;
        let rows = store.query("SELECT entry FROM log ORDER BY seq", &[]).await?;
        assert_eq!(rows.len(), 2);
        store.disconnect().await;
        assert_eq!(applied_versions(&path).await?, vec![1, 2, 3]);
    }
    Ok(())
}
