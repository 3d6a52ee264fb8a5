use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;
use sqlx::PgPool;
use std::sync::Arc;

use crate::storage::models::script_version::*;
use crate::storage::models::strategy::{Strategy, StrategyInsert};
use crate::storage::repository::DbExecutor;

/// 版本相關錯誤
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionError {
    /// 版本代碼已被同一策略的其他版本使用
    #[error("版本代碼已存在: {0}")]
    VersionConflict(String),

    /// 策略不存在
    #[error("策略不存在: ID {0}")]
    StrategyNotFound(i32),

    /// 版本不存在
    #[error("版本不存在: ID {0}")]
    VersionNotFound(i32),

    /// 資料庫錯誤
    #[error("資料庫錯誤: {0}")]
    DatabaseError(String),
}

/// 腳本版本儲存庫特性
///
/// 每個操作要麼整體成功、要麼整體失敗，不會留下部分寫入。
#[async_trait]
pub trait ScriptVersionRepository: Send + Sync {
    /// 創建新策略
    async fn create_strategy(&self, strategy: &StrategyInsert) -> Result<Strategy, VersionError>;

    /// 根據ID獲取策略
    async fn get_strategy(&self, strategy_id: i32) -> Result<Option<Strategy>, VersionError>;

    /// 獲取指定策略的所有版本，最新的在前
    async fn find_versions_by_strategy(&self, strategy_id: i32) -> Result<Vec<ScriptVersion>, VersionError>;

    /// 獲取指定版本
    async fn get_version(&self, version_id: i32) -> Result<Option<ScriptVersion>, VersionError>;

    /// 寫入新版本，版本代碼在策略內必須唯一
    async fn save_version(&self, version: &ScriptVersionInsert) -> Result<ScriptVersion, VersionError>;

    /// 覆寫版本的可變欄位
    async fn update_version(&self, version_id: i32, update: &ScriptVersionUpdate) -> Result<ScriptVersion, VersionError>;

    /// 將指定版本設為主版本：清除其他版本的標記、設定目標版本、更新策略指標，三者為一個整體
    async fn update_master_flags(&self, strategy_id: i32, master_version_id: i32) -> Result<(), VersionError>;
}

const STRATEGY_COLUMNS: &str = "strategy_id, name, description, master_version_id, created_at, updated_at";

const VERSION_COLUMNS: &str = "version_id, strategy_id, version_code, is_master, source_code, \
     parameter_schema, factor_schema, remark, created_at, updated_at";

/// PostgreSQL 實現的腳本版本儲存庫
pub struct PgScriptVersionRepository {
    /// 資料庫連接池
    pool: Arc<PgPool>,
}

impl PgScriptVersionRepository {
    /// 創建新的 PostgreSQL 腳本版本儲存庫
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

impl DbExecutor for PgScriptVersionRepository {
    fn get_pool(&self) -> &PgPool {
        &self.pool
    }
}

// 將唯一約束與外鍵違反轉換為領域錯誤
fn map_write_error(err: sqlx::Error, strategy_id: i32, version_code: &str) -> VersionError {
    if let Some(db_err) = err.as_database_error() {
        match db_err.code().as_deref() {
            Some("23505") => return VersionError::VersionConflict(version_code.to_string()),
            Some("23503") => return VersionError::StrategyNotFound(strategy_id),
            _ => {}
        }
    }
    VersionError::DatabaseError(err.to_string())
}

fn db_error(err: sqlx::Error) -> VersionError {
    VersionError::DatabaseError(err.to_string())
}

#[async_trait]
impl ScriptVersionRepository for PgScriptVersionRepository {
    async fn create_strategy(&self, strategy: &StrategyInsert) -> Result<Strategy, VersionError> {
        let now = Utc::now();
        let sql = format!(
            "INSERT INTO strategy (name, description, created_at, updated_at) \
             VALUES ($1, $2, $3, $3) RETURNING {}",
            STRATEGY_COLUMNS
        );

        sqlx::query_as::<_, Strategy>(&sql)
            .bind(&strategy.name)
            .bind(&strategy.description)
            .bind(now)
            .fetch_one(self.get_pool())
            .await
            .map_err(db_error)
    }

    async fn get_strategy(&self, strategy_id: i32) -> Result<Option<Strategy>, VersionError> {
        let sql = format!("SELECT {} FROM strategy WHERE strategy_id = $1", STRATEGY_COLUMNS);

        sqlx::query_as::<_, Strategy>(&sql)
            .bind(strategy_id)
            .fetch_optional(self.get_pool())
            .await
            .map_err(db_error)
    }

    async fn find_versions_by_strategy(&self, strategy_id: i32) -> Result<Vec<ScriptVersion>, VersionError> {
        let sql = format!(
            "SELECT {} FROM script_version WHERE strategy_id = $1 \
             ORDER BY created_at DESC, version_id DESC",
            VERSION_COLUMNS
        );

        sqlx::query_as::<_, ScriptVersion>(&sql)
            .bind(strategy_id)
            .fetch_all(self.get_pool())
            .await
            .map_err(db_error)
    }

    async fn get_version(&self, version_id: i32) -> Result<Option<ScriptVersion>, VersionError> {
        let sql = format!("SELECT {} FROM script_version WHERE version_id = $1", VERSION_COLUMNS);

        sqlx::query_as::<_, ScriptVersion>(&sql)
            .bind(version_id)
            .fetch_optional(self.get_pool())
            .await
            .map_err(db_error)
    }

    async fn save_version(&self, version: &ScriptVersionInsert) -> Result<ScriptVersion, VersionError> {
        let now = Utc::now();
        let sql = format!(
            "INSERT INTO script_version ( \
                strategy_id, version_code, is_master, source_code, \
                parameter_schema, factor_schema, remark, created_at, updated_at \
             ) VALUES ($1, $2, false, $3, $4, $5, $6, $7, $7) \
             RETURNING {}",
            VERSION_COLUMNS
        );

        sqlx::query_as::<_, ScriptVersion>(&sql)
            .bind(version.strategy_id)
            .bind(&version.version_code)
            .bind(&version.source_code)
            .bind(Json(&version.parameter_schema))
            .bind(Json(&version.factor_schema))
            .bind(&version.remark)
            .bind(now)
            .fetch_one(self.get_pool())
            .await
            .map_err(|e| map_write_error(e, version.strategy_id, &version.version_code))
    }

    async fn update_version(&self, version_id: i32, update: &ScriptVersionUpdate) -> Result<ScriptVersion, VersionError> {
        let existing = self
            .get_version(version_id)
            .await?
            .ok_or(VersionError::VersionNotFound(version_id))?;

        let sql = format!(
            "UPDATE script_version SET \
                version_code = $1, source_code = $2, parameter_schema = $3, \
                factor_schema = $4, remark = $5, updated_at = $6 \
             WHERE version_id = $7 \
             RETURNING {}",
            VERSION_COLUMNS
        );

        sqlx::query_as::<_, ScriptVersion>(&sql)
            .bind(&update.version_code)
            .bind(&update.source_code)
            .bind(Json(&update.parameter_schema))
            .bind(Json(&update.factor_schema))
            .bind(&update.remark)
            .bind(Utc::now())
            .bind(version_id)
            .fetch_optional(self.get_pool())
            .await
            .map_err(|e| map_write_error(e, existing.strategy_id, &update.version_code))?
            .ok_or(VersionError::VersionNotFound(version_id))
    }

    async fn update_master_flags(&self, strategy_id: i32, master_version_id: i32) -> Result<(), VersionError> {
        let mut tx = self.get_pool().begin().await.map_err(db_error)?;

        // 鎖定策略列，同一策略的主版本切換在此序列化
        let locked = sqlx::query_scalar::<_, i32>(
            "SELECT strategy_id FROM strategy WHERE strategy_id = $1 FOR UPDATE",
        )
        .bind(strategy_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error)?;
        if locked.is_none() {
            return Err(VersionError::StrategyNotFound(strategy_id));
        }

        let owner = sqlx::query_scalar::<_, i32>(
            "SELECT strategy_id FROM script_version WHERE version_id = $1",
        )
        .bind(master_version_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error)?;
        if owner != Some(strategy_id) {
            return Err(VersionError::VersionNotFound(master_version_id));
        }

        let now = Utc::now();

        sqlx::query(
            "UPDATE script_version SET is_master = false, updated_at = $2 \
             WHERE strategy_id = $1 AND version_id <> $3 AND is_master",
        )
        .bind(strategy_id)
        .bind(now)
        .bind(master_version_id)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        sqlx::query("UPDATE script_version SET is_master = true, updated_at = $2 WHERE version_id = $1")
            .bind(master_version_id)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        sqlx::query("UPDATE strategy SET master_version_id = $2, updated_at = $3 WHERE strategy_id = $1")
            .bind(strategy_id)
            .bind(master_version_id)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;
        Ok(())
    }
}
