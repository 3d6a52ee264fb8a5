use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

use crate::script::field::{FieldDescriptor, ScriptSchema};

/// 腳本版本模型
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ScriptVersion {
    pub version_id: i32,
    pub strategy_id: i32,
    pub version_code: String,
    pub is_master: bool,
    pub source_code: String,
    pub parameter_schema: Json<Vec<FieldDescriptor>>,
    pub factor_schema: Json<Vec<FieldDescriptor>>,
    pub remark: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScriptVersion {
    /// 取出已保存的參數與因子宣告
    pub fn schema(&self) -> ScriptSchema {
        ScriptSchema::new(self.parameter_schema.0.clone(), self.factor_schema.0.clone())
    }

    /// 版本摘要
    pub fn summary(&self) -> VersionSummary {
        VersionSummary {
            version_id: self.version_id,
            version_code: self.version_code.clone(),
            is_master: self.is_master,
            remark: self.remark.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// 不含原始碼與結構的版本摘要，用於列表與差異結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionSummary {
    pub version_id: i32,
    pub version_code: String,
    pub is_master: bool,
    pub remark: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 腳本版本插入模型，新版本一律以非主版本寫入
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptVersionInsert {
    pub strategy_id: i32,
    pub version_code: String,
    pub source_code: String,
    pub parameter_schema: Vec<FieldDescriptor>,
    pub factor_schema: Vec<FieldDescriptor>,
    pub remark: Option<String>,
}

impl ScriptVersionInsert {
    pub fn new(
        strategy_id: i32,
        version_code: impl Into<String>,
        source_code: impl Into<String>,
        schema: ScriptSchema,
        remark: Option<String>,
    ) -> Self {
        Self {
            strategy_id,
            version_code: version_code.into(),
            source_code: source_code.into(),
            parameter_schema: schema.parameters,
            factor_schema: schema.factors,
            remark,
        }
    }
}

/// 腳本版本更新模型，覆寫所有可變欄位
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptVersionUpdate {
    pub version_code: String,
    pub source_code: String,
    pub parameter_schema: Vec<FieldDescriptor>,
    pub factor_schema: Vec<FieldDescriptor>,
    pub remark: Option<String>,
}

impl ScriptVersionUpdate {
    /// 以既有版本內容為基礎建立更新
    pub fn from_version(version: &ScriptVersion) -> Self {
        Self {
            version_code: version.version_code.clone(),
            source_code: version.source_code.clone(),
            parameter_schema: version.parameter_schema.0.clone(),
            factor_schema: version.factor_schema.0.clone(),
            remark: version.remark.clone(),
        }
    }
}
