use std::fs::{self, File};
use std::path::Path;
use std::time::{Duration, SystemTime};

use sqlite_steward::prelude::*;
use sqlite_steward::EventPayload;

async fn seeded_store(path: &Path, backups: &Path, max_backups: usize) -> Result<StoreManager, StoreError> {
    let config = StoreConfig::builder(path)
        .backup_dir(backups)
        .max_backups(max_backups)
        .build()?;
    let store = StoreManager::with_migrations(
        config,
        vec![Migration::new(
            1,
            "notes",
            "CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT NOT NULL)",
        )],
    )?;
    store.connect().await?;
    store
        .execute("INSERT INTO notes (body) VALUES (?)", &["remember the milk".into()])
        .await?;
    Ok(store)
}

fn listing(dir: &Path) -> Result<Vec<String>, StoreError> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        names.push(entry?.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}

fn aged_backup(dir: &Path, name: &str, age: Duration) -> Result<(), StoreError> {
    let file = File::create(dir.join(name))?;
    file.set_modified(SystemTime::now() - age)?;
    Ok(())
}

#[tokio::test]
async fn snapshot_is_a_consistent_readable_store() -> Result<(), StoreError> {
    let dir = tempfile::tempdir()?;
    let backups = dir.path().join("snapshots");
    let store = seeded_store(&dir.path().join("live.db"), &backups, 10).await?;
    let mut rx = store.subscribe();

    let record = store.create_backup(BackupName::Custom("before-upgrade".into())).await?;
    assert_eq!(record.filename, "before-upgrade.db");
    assert_eq!(record.path, backups.join("before-upgrade.db"));
    assert!(record.size_bytes > 0);
    assert_eq!(listing(&backups)?, vec!["before-upgrade.db"]);

    let event = rx.recv().await.map_err(|e| StoreError::Backup(e.to_string()))?;
    match event.payload {
        EventPayload::Backup { filename, size_bytes, .. } => {
            assert_eq!(filename, "before-upgrade.db");
            assert_eq!(size_bytes, record.size_bytes);
        }
        other => panic!("unexpected payload {other:?}"),
    }

    let copy = StoreManager::new(StoreConfig::builder(&record.path).must_exist(true).build()?)?;
    copy.connect().await?;
    let body = copy
        .query_one("SELECT body FROM notes WHERE id = ?", &[RowValues::Int(1)])
        .await?
        .and_then(|row| row.get("body").cloned());
    assert_eq!(body, Some(RowValues::Text("remember the milk".into())));
    copy.disconnect().await;
    store.disconnect().await;
    Ok(())
}

#[tokio::test]
async fn increment_naming_never_reuses_a_name() -> Result<(), StoreError> {
    let dir = tempfile::tempdir()?;
    let backups = dir.path().join("backups");
    fs::create_dir_all(&backups)?;
    for n in 1..=9 {
        File::create(backups.join(format!("backup_{n:03}.db")))?;
    }
    let store = seeded_store(&dir.path().join("live.db"), &backups, 0).await?;

    let record = store.create_backup(BackupName::Increment).await?;
    assert_eq!(record.filename, "backup_010.db");
    let next = store.create_backup(BackupName::Increment).await?;
    assert_eq!(next.filename, "backup_011.db");
    assert_eq!(listing(&backups)?.len(), 11);
    store.disconnect().await;
    Ok(())
}

#[tokio::test]
async fn retention_keeps_the_most_recent() -> Result<(), StoreError> {
    let dir = tempfile::tempdir()?;
    let backups = dir.path().join("backups");
    fs::create_dir_all(&backups)?;
    aged_backup(&backups, "backup_2024-01-01_00-00-00.db", Duration::from_secs(50_000))?;
    aged_backup(&backups, "backup_2024-01-02_00-00-00.db", Duration::from_secs(40_000))?;
    aged_backup(&backups, "backup_2024-01-03_00-00-00.db", Duration::from_secs(30_000))?;
    aged_backup(&backups, "backup_2024-01-04_00-00-00.db", Duration::from_secs(20_000))?;
    aged_backup(&backups, "backup_2024-01-05_00-00-00.db", Duration::from_secs(10_000))?;
    fs::write(backups.join("README.txt"), "not a backup")?;

    let store = seeded_store(&dir.path().join("live.db"), &backups, 3).await?;
    let mut rx = store.subscribe();
    let record = store.create_backup(BackupName::Increment).await?;

    let mut left = listing(&backups)?;
    left.retain(|name| name != "README.txt");
    let mut expected = vec![
        "backup_2024-01-04_00-00-00.db".to_string(),
        "backup_2024-01-05_00-00-00.db".to_string(),
        record.filename.clone(),
    ];
    expected.sort();
    assert_eq!(left, expected);
    assert!(backups.join("README.txt").exists());

    let pruned = std::iter::from_fn(|| rx.try_recv().ok()).find_map(|e| match e.payload {
        EventPayload::Backup { pruned, .. } => Some(pruned),
        _ => None,
    });
    assert_eq!(pruned, Some(3));
    store.disconnect().await;
    Ok(())
}

#[tokio::test]
async fn collisions_get_numeric_suffixes() -> Result<(), StoreError> {
    let dir = tempfile::tempdir()?;
    let backups = dir.path().join("backups");
    let store = seeded_store(&dir.path().join("live.db"), &backups, 0).await?;

    let first = store.create_backup(BackupName::Custom("nightly.db".into())).await?;
    let second = store.create_backup(BackupName::Custom("nightly".into())).await?;
    let third = store.create_backup(BackupName::Custom("nightly".into())).await?;
    assert_eq!(first.filename, "nightly.db");
    assert_eq!(second.filename, "nightly_1.db");
    assert_eq!(third.filename, "nightly_2.db");

    let err = store
        .create_backup(BackupName::Custom("../outside".into()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Backup);
    assert!(!dir.path().join("outside.db").exists());
    assert!(listing(&backups)?.iter().all(|name| !name.ends_with(".tmp")));
    store.disconnect().await;
    Ok(())
}

#[tokio::test]
async fn default_backup_dir_sits_next_to_the_store() -> Result<(), StoreError> {
    let dir = tempfile::tempdir()?;
    let config = StoreConfig::builder(dir.path().join("app.db")).build()?;
    let store = StoreManager::new(config)?;
    store.connect().await?;
    let record = store.create_backup(BackupName::default()).await?;
    assert_eq!(record.path.parent(), Some(dir.path().join("backups").as_path()));
    assert!(record.filename.starts_with("backup_"));
    store.disconnect().await;
    Ok(())
}

#[tokio::test]
async fn timer_backs_up_until_disconnect() -> Result<(), StoreError> {
    let dir = tempfile::tempdir()?;
    let backups = dir.path().join("backups");
    let config = StoreConfig::builder(dir.path().join("timed.db"))
        .backup_dir(&backups)
        .backup_schedule(Duration::from_secs(1), 0)
        .build()?;
    let store = StoreManager::new(config)?;
    store.connect().await?;

    tokio::time::sleep(Duration::from_millis(2_500)).await;
    store.disconnect().await;
    let taken = listing(&backups)?.len();
    assert!(taken >= 1, "timer produced {taken} backups");

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(listing(&backups)?.len(), taken, "no backups after disconnect");
    Ok(())
}

#[tokio::test]
async fn backup_settings_can_change_while_connected() -> Result<(), StoreError> {
    let dir = tempfile::tempdir()?;
    let backups = dir.path().join("backups");
    let store = seeded_store(&dir.path().join("live.db"), &backups, 0).await?;

    let mut settings = store.config().backup;
    settings.enabled = true;
    settings.interval_secs = 1;
    store.update_backup_settings(settings.clone()).await?;
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    settings.enabled = false;
    store.update_backup_settings(settings).await?;
    let taken = listing(&backups)?.len();
    assert!(taken >= 1);

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(listing(&backups)?.len(), taken);

    let mut invalid = store.config().backup;
    invalid.enabled = true;
    invalid.interval_secs = 0;
    assert!(matches!(
        store.update_backup_settings(invalid).await,
        Err(StoreError::Configuration(_))
    ));
    store.disconnect().await;
    Ok(())
}

#[tokio::test]
async fn disconnect_racing_connect_leaves_no_timer_behind() -> Result<(), StoreError> {
    let dir = tempfile::tempdir()?;
    let backups = dir.path().join("backups");
    let config = StoreConfig::builder(dir.path().join("raced.db"))
        .backup_dir(&backups)
        .backup_schedule(Duration::from_secs(1), 0)
        .build()?;
    let store = StoreManager::new(config)?;
    let mut rx = store.subscribe();

    // connect takes the slot first; disconnect queues behind it
    let (connected, ()) = tokio::join!(store.connect(), store.disconnect());
    connected?;
    assert!(!store.is_connected());

    tokio::time::sleep(Duration::from_millis(2_500)).await;
    while let Ok(event) = rx.try_recv() {
        assert!(
            !matches!(event.payload, EventPayload::Error { .. } | EventPayload::Backup { .. }),
            "timer outlived the disconnect: {event:?}"
        );
    }
    assert!(!backups.exists() || listing(&backups)?.is_empty());

    // a settings change while disconnected starts nothing either
    let mut settings = store.config().backup;
    settings.interval_secs = 1;
    store.update_backup_settings(settings).await?;
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert!(!backups.exists() || listing(&backups)?.is_empty());
    Ok(())
}
