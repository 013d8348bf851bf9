//! Integration tests for connection-scoped transactions on SQLite.

use dbentity::db::Database;
use dbentity::models::{ConnectionConfig, SessionOptions, Value};

async fn setup_db() -> Database {
    let mut db = Database::connect(ConnectionConfig::sqlite_memory())
        .await
        .ok()
        .unwrap();
    db.execute("CREATE TABLE tx_test (id INTEGER PRIMARY KEY, name TEXT)", &[])
        .await
        .unwrap();
    db
}

async fn names(db: &mut Database) -> Vec<Value> {
    let mut set = db
        .query("SELECT name FROM tx_test ORDER BY id", &[])
        .await
        .unwrap();
    set.result_array()
        .iter()
        .filter_map(|row| row.first().cloned())
        .collect()
}

async fn insert(db: &mut Database, id: i64, name: &str) {
    db.execute_write(
        "INSERT INTO tx_test (id, name) VALUES (?, ?)",
        &[Value::Int(id), Value::from(name)],
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn test_transaction_rollback() {
    let mut db = setup_db().await;

    db.trans_begin().await.unwrap();
    insert(&mut db, 1, "Alice").await;
    db.trans_rollback(None).await.unwrap();

    assert!(!db.in_transaction());
    assert!(names(&mut db).await.is_empty());
}

#[tokio::test]
async fn test_transaction_commit() {
    let mut db = setup_db().await;

    db.trans_begin().await.unwrap();
    insert(&mut db, 1, "Alice").await;
    db.trans_commit().await.unwrap();

    assert_eq!(names(&mut db).await, vec![Value::from("Alice")]);
}

#[tokio::test]
async fn test_nested_rollback_keeps_outer_work() {
    let mut db = setup_db().await;

    db.trans_begin().await.unwrap();
    insert(&mut db, 1, "outer").await;

    db.trans_begin().await.unwrap();
    assert_eq!(db.trans_depth(), 2);
    insert(&mut db, 2, "inner").await;
    db.trans_rollback(None).await.unwrap();

    assert_eq!(db.trans_depth(), 1);
    db.trans_commit().await.unwrap();

    assert_eq!(names(&mut db).await, vec![Value::from("outer")]);
}

#[tokio::test]
async fn test_named_savepoint() {
    let mut db = setup_db().await;

    db.trans_begin().await.unwrap();
    insert(&mut db, 1, "first").await;
    db.trans_savepoint("before_second").await.unwrap();
    insert(&mut db, 2, "second").await;
    db.trans_rollback(Some("before_second")).await.unwrap();

    assert!(db.in_transaction());
    insert(&mut db, 3, "third").await;
    db.trans_commit().await.unwrap();

    assert_eq!(
        names(&mut db).await,
        vec![Value::from("first"), Value::from("third")]
    );
}

#[tokio::test]
async fn test_failed_statement_makes_complete_roll_back() {
    let mut db = setup_db().await;

    db.trans_begin().await.unwrap();
    insert(&mut db, 1, "Alice").await;
    assert!(db.trans_status());

    let failed = db.execute("INSERT INTO missing_table VALUES (1)", &[]).await;
    assert!(failed.is_err());
    assert!(!db.trans_status());
    assert!(db.error().is_some());

    let committed = db.trans_complete().await.unwrap();
    assert!(!committed);
    assert!(names(&mut db).await.is_empty());
}

#[tokio::test]
async fn test_savepoint_outside_transaction_fails() {
    let mut db = setup_db().await;
    assert!(db.trans_savepoint("nowhere").await.is_err());
    assert!(db.trans_commit().await.is_err());
}

#[tokio::test]
async fn test_unique_transaction_ignores_inner_commits() {
    let options = SessionOptions {
        unique_transaction: true,
        ..SessionOptions::default()
    };
    let mut db = Database::connect(ConnectionConfig::sqlite_memory().with_options(options))
        .await
        .ok()
        .unwrap();
    db.execute("CREATE TABLE tx_test (id INTEGER PRIMARY KEY, name TEXT)", &[])
        .await
        .unwrap();

    db.trans_begin().await.unwrap();
    insert(&mut db, 1, "Alice").await;
    db.trans_commit().await.unwrap();
    assert!(db.in_transaction());

    db.close().await.unwrap();
}
