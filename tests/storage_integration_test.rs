use sqlx::PgPool;
use std::sync::Arc;

use strategy_workbench::script::ScriptSchema;
use strategy_workbench::storage::models::{ScriptVersionInsert, StrategyInsert};
use strategy_workbench::storage::repository::{
    PgScriptVersionRepository, ScriptVersionRepository, VersionError,
};
use strategy_workbench::storage::run_migrations;

// 未設定 TEST_DATABASE_URL 時略過需要 PostgreSQL 的測試
async fn test_pool() -> Option<PgPool> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    let pool = PgPool::connect(&url).await.expect("Failed to connect to test database");
    run_migrations(&pool).await.expect("Failed to run migrations");
    Some(pool)
}

fn insert(strategy_id: i32, code: &str) -> ScriptVersionInsert {
    ScriptVersionInsert::new(
        strategy_id,
        code,
        "return { run = function() end }",
        ScriptSchema::default(),
        Some("integration".to_string()),
    )
}

#[tokio::test]
async fn test_pg_version_lifecycle() {
    let Some(pool) = test_pool().await else {
        eprintln!("TEST_DATABASE_URL 未設定，略過");
        return;
    };
    let repo = PgScriptVersionRepository::new(Arc::new(pool));

    let strategy = repo
        .create_strategy(&StrategyInsert {
            name: format!("it-{}", uuid::Uuid::new_v4()),
            description: None,
        })
        .await
        .unwrap();

    let a = repo.save_version(&insert(strategy.strategy_id, "a")).await.unwrap();
    let b = repo.save_version(&insert(strategy.strategy_id, "b")).await.unwrap();
    assert_eq!(
        repo.save_version(&insert(strategy.strategy_id, "a")).await.unwrap_err(),
        VersionError::VersionConflict("a".to_string())
    );

    repo.update_master_flags(strategy.strategy_id, a.version_id).await.unwrap();
    repo.update_master_flags(strategy.strategy_id, b.version_id).await.unwrap();

    let masters: Vec<i32> = repo
        .find_versions_by_strategy(strategy.strategy_id)
        .await
        .unwrap()
        .into_iter()
        .filter(|v| v.is_master)
        .map(|v| v.version_id)
        .collect();
    assert_eq!(masters, vec![b.version_id]);

    let strategy = repo.get_strategy(strategy.strategy_id).await.unwrap().unwrap();
    assert_eq!(strategy.master_version_id, Some(b.version_id));
}

#[tokio::test]
async fn test_pg_save_into_missing_strategy() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let repo = PgScriptVersionRepository::new(Arc::new(pool));

    assert_eq!(
        repo.save_version(&insert(i32::MAX, "x")).await.unwrap_err(),
        VersionError::StrategyNotFound(i32::MAX)
    );
}
