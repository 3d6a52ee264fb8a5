use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 策略模型：一組腳本版本的擁有者
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Strategy {
    pub strategy_id: i32,
    pub name: String,
    pub description: Option<String>,
    /// 目前的主版本
    pub master_version_id: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 策略插入模型
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyInsert {
    pub name: String,
    pub description: Option<String>,
}
