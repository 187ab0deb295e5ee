use sqlite_steward::builder::{self, Comparison, Order};
use sqlite_steward::prelude::*;

#[test]
fn documented_statement_shapes() -> Result<(), StoreError> {
    let select = builder::select(["a", "b"]).from("t").where_equal("id", 5).build()?;
    assert_eq!(select.sql(), "SELECT a, b FROM t WHERE id = ?");
    assert_eq!(select.params(), &[RowValues::Int(5)]);

    let insert = builder::insert().into("t").value([("a", 1), ("b", 2)]).build()?;
    assert_eq!(insert.sql(), "INSERT INTO t (a, b) VALUES (?, ?)");
    assert_eq!(insert.params(), &[RowValues::Int(1), RowValues::Int(2)]);
    Ok(())
}

#[test]
fn incomplete_statements_are_rejected() {
    assert!(matches!(
        builder::select_all().build(),
        Err(StoreError::InvalidStatement(_))
    ));
    assert!(matches!(
        builder::insert().into("t").build(),
        Err(StoreError::InvalidStatement(_))
    ));
    assert!(matches!(
        builder::update("t").where_equal("id", 1).build(),
        Err(StoreError::InvalidStatement(_))
    ));
    assert!(matches!(
        builder::insert()
            .into("t")
            .values_row([("a", 1)])
            .values_row([("b", 2)])
            .build(),
        Err(StoreError::InvalidStatement(_))
    ));
}

#[tokio::test]
async fn built_statements_run_against_a_live_store() -> Result<(), StoreError> {
    let store = StoreManager::with_migrations(
        StoreConfig::default(),
        vec![Migration::new(
            1,
            "tasks",
            "CREATE TABLE tasks (id INTEGER PRIMARY KEY, title TEXT NOT NULL UNIQUE, priority INTEGER, done INTEGER NOT NULL DEFAULT 0, owner TEXT)",
        )],
    )?;
    store.connect().await?;

    let seed = builder::insert()
        .into("tasks")
        .values_row([("title", RowValues::from("write docs")), ("priority", 2.into()), ("owner", "ana".into())])
        .values_row([("title", RowValues::from("fix bug")), ("priority", 1.into()), ("owner", RowValues::Null)])
        .values_row([("title", RowValues::from("ship")), ("priority", 3.into()), ("owner", "ana".into())])
        .build()?;
    assert_eq!(store.execute_statement(&seed).await?.rows_affected, 3);

    let duplicate = builder::insert()
        .into("tasks")
        .value([("title", "ship")])
        .or_ignore()
        .build()?;
    assert_eq!(store.execute_statement(&duplicate).await?.rows_affected, 0);

    let by_priority = builder::select(["title"])
        .from("tasks")
        .where_op("priority", Comparison::Gte, 2)
        .order_by("priority", Order::Desc)
        .build()?;
    let titles: Vec<RowValues> = store
        .query_statement(&by_priority)
        .await?
        .results
        .into_iter()
        .filter_map(|row| row.get("title").cloned())
        .collect();
    assert_eq!(titles, vec![RowValues::from("ship"), RowValues::from("write docs")]);

    let page = builder::select_all()
        .from("tasks")
        .order_by("id", Order::Asc)
        .limit(1)
        .offset(1)
        .build()?;
    let second = store.query_statement(&page).await?.into_first();
    assert_eq!(
        second.and_then(|row| row.get("title").cloned()),
        Some(RowValues::from("fix bug"))
    );

    let unowned = builder::select(["COUNT(*) AS n"])
        .from("tasks")
        .where_null("owner")
        .build()?;
    let n = store.query_statement(&unowned).await?.into_first();
    assert_eq!(n.and_then(|row| row.get("n").cloned()), Some(RowValues::Int(1)));

    let finish = builder::update("tasks")
        .set("done", true)
        .where_in("title", ["ship", "fix bug"])
        .build()?;
    assert_eq!(store.execute_statement(&finish).await?.rows_affected, 2);

    let none_matched = builder::update("tasks")
        .set("done", true)
        .where_in("title", Vec::<String>::new())
        .build()?;
    assert_eq!(store.execute_statement(&none_matched).await?.rows_affected, 0);

    let per_owner = builder::select(["owner", "COUNT(*) AS n"])
        .from("tasks")
        .where_not_null("owner")
        .group_by(["owner"])
        .having("COUNT(*) > 1")
        .build()?;
    assert_eq!(store.query_statement(&per_owner).await?.len(), 1);

    let cleanup = builder::delete()
        .from("tasks")
        .where_equal("done", true)
        .or_where_equal("title", "write docs")
        .build()?;
    assert_eq!(store.execute_statement(&cleanup).await?.rows_affected, 3);

    let quoted = format!(
        "SELECT COUNT(*) AS n FROM {}",
        builder::escape_identifier("tasks")
    );
    let remaining = store.query_one(&quoted, &[]).await?;
    assert_eq!(remaining.and_then(|r| r.get("n").cloned()), Some(RowValues::Int(0)));
    store.disconnect().await;
    Ok(())
}
