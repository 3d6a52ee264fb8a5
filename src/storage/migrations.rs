use anyhow::Result;
use sqlx::{migrate::Migrator, PgPool};
use tracing::info;

// 靜態嵌入遷移目錄（此目錄應放在專案根目錄）
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// 執行數據庫遷移
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    info!("開始執行數據庫遷移...");
    MIGRATOR.run(pool).await?;
    info!("SQLx 遷移完成");
    Ok(())
}

/// 遷移狀態
#[derive(Debug, Clone)]
pub struct MigrationStatus {
    pub version: i64,
    pub description: String,
    pub applied: bool,
}

/// 列出嵌入的遷移及其是否已套用
pub async fn migration_status(pool: &PgPool) -> Result<Vec<MigrationStatus>> {
    let applied: Vec<i64> = sqlx::query_scalar(
        "SELECT version FROM _sqlx_migrations WHERE success ORDER BY version",
    )
    .fetch_all(pool)
    .await
    .unwrap_or_default();

    Ok(MIGRATOR
        .iter()
        .map(|m| MigrationStatus {
            version: m.version,
            description: m.description.to_string(),
            applied: applied.contains(&m.version),
        })
        .collect())
}
