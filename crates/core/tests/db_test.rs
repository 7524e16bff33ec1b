mod common;

use parley_core::db;

#[tokio::test]
async fn init_pool_creates_nodes_table() {
    let pool = common::setup_file_db().await;

    let tables: Vec<(String,)> =
        sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'nodes'")
            .fetch_all(&pool)
            .await
            .unwrap();
    assert_eq!(tables.len(), 1);
}

#[tokio::test]
async fn apply_schema_is_repeatable() {
    let pool = common::setup_test_db().await;

    db::apply_schema(&pool).await.unwrap();
    db::apply_schema(&pool).await.unwrap();

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM nodes")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}
