// service.rs - 腳本提交、更新、主版本與差異比較的協調層

pub mod error;

pub use error::{ServiceError, ServiceResult};

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::diff::{diff_field_array, diff_lines, DiffSegment, FieldDiff};
use crate::lifecycle::VersionLifecycleManager;
use crate::script::field::ScriptSchema;
use crate::script::sandbox::SandboxExecutor;
use crate::storage::models::{
    ScriptVersion, ScriptVersionInsert, ScriptVersionUpdate, Strategy, StrategyInsert, VersionSummary,
};
use crate::storage::repository::{ScriptVersionRepository, VersionError};

/// 提交新腳本版本的請求
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitScript {
    pub strategy_id: i32,
    pub source_code: String,
    /// 留空時自動產生
    #[serde(default)]
    pub version_code: Option<String>,
    #[serde(default)]
    pub remark: Option<String>,
    #[serde(default)]
    pub is_master: bool,
}

/// 更新既有版本的請求，未提供的欄位保持不變
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateScript {
    #[serde(default)]
    pub source_code: Option<String>,
    #[serde(default)]
    pub version_code: Option<String>,
    #[serde(default)]
    pub remark: Option<String>,
}

/// 兩個版本的比較結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionDiff {
    pub base: VersionSummary,
    pub compare: VersionSummary,
    pub code: Vec<DiffSegment>,
    pub parameters: FieldDiff,
    pub factors: FieldDiff,
}

/// 腳本服務
pub struct ScriptService {
    executor: SandboxExecutor,
    lifecycle: VersionLifecycleManager,
}

impl ScriptService {
    pub fn new(repository: Arc<dyn ScriptVersionRepository>, executor: SandboxExecutor) -> Self {
        Self {
            executor,
            lifecycle: VersionLifecycleManager::new(repository),
        }
    }

    fn repository(&self) -> &Arc<dyn ScriptVersionRepository> {
        self.lifecycle.repository()
    }

    pub fn executor(&self) -> &SandboxExecutor {
        &self.executor
    }

    /// 建立策略
    pub async fn create_strategy(&self, name: &str, description: Option<String>) -> ServiceResult<Strategy> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::InvalidRequest("策略名稱不能為空".to_string()));
        }

        let strategy = self
            .repository()
            .create_strategy(&StrategyInsert {
                name: name.to_string(),
                description,
            })
            .await?;
        info!(strategy_id = strategy.strategy_id, name, "策略已建立");
        Ok(strategy)
    }

    /// 提交腳本：執行沙箱、保存版本，必要時設為主版本
    pub async fn submit_script(&self, request: SubmitScript) -> ServiceResult<ScriptVersion> {
        let strategy_id = request.strategy_id;
        self.require_strategy(strategy_id).await?;
        let requested_code = normalize_code(request.version_code.as_deref())?;

        let schema = self.executor.execute_async(request.source_code.clone()).await?;

        let guard = self.lifecycle.lock_strategy(strategy_id).await;
        let version_code = match requested_code {
            Some(code) => {
                self.lifecycle
                    .ensure_code_available(strategy_id, &code, None)
                    .await?;
                code
            }
            None => self.lifecycle.next_version_code(strategy_id, today()).await?,
        };

        let saved = self
            .repository()
            .save_version(&ScriptVersionInsert::new(
                strategy_id,
                version_code,
                request.source_code,
                schema,
                request.remark,
            ))
            .await?;
        info!(
            strategy_id,
            version_id = saved.version_id,
            version_code = %saved.version_code,
            "腳本版本已保存"
        );

        if !request.is_master {
            return Ok(saved);
        }

        self.lifecycle.set_master_guarded(&guard, saved.version_id).await?;
        self.require_version(saved.version_id).await
    }

    /// 更新版本；原始碼有變動時重新執行沙箱
    pub async fn update_script(&self, version_id: i32, request: UpdateScript) -> ServiceResult<ScriptVersion> {
        let strategy_id = self.require_version(version_id).await?.strategy_id;
        let requested_code = normalize_code(request.version_code.as_deref())?;

        let rerun = match &request.source_code {
            Some(source) => Some(self.executor.execute_async(source.clone()).await?),
            None => None,
        };

        let _guard = self.lifecycle.lock_strategy(strategy_id).await;
        let existing = self.require_version(version_id).await?;
        let mut update = ScriptVersionUpdate::from_version(&existing);

        if let Some(code) = requested_code {
            if code != existing.version_code {
                self.lifecycle
                    .ensure_code_available(strategy_id, &code, Some(version_id))
                    .await?;
            }
            update.version_code = code;
        }
        if let (Some(source), Some(schema)) = (request.source_code, rerun) {
            update.source_code = source;
            update.parameter_schema = schema.parameters;
            update.factor_schema = schema.factors;
        }
        if request.remark.is_some() {
            update.remark = request.remark;
        }

        let updated = self.repository().update_version(version_id, &update).await?;
        info!(strategy_id, version_id, "腳本版本已更新");
        Ok(updated)
    }

    /// 將版本設為主版本
    pub async fn set_master(&self, strategy_id: i32, version_id: i32) -> ServiceResult<()> {
        self.lifecycle.set_master(strategy_id, version_id).await?;
        Ok(())
    }

    /// 列出策略的所有版本，最新的在前
    pub async fn list_versions(&self, strategy_id: i32) -> ServiceResult<Vec<ScriptVersion>> {
        self.require_strategy(strategy_id).await?;
        Ok(self.repository().find_versions_by_strategy(strategy_id).await?)
    }

    /// 取出版本保存的參數與因子，供介面重新渲染
    pub async fn get_schema(&self, version_id: i32) -> ServiceResult<ScriptSchema> {
        Ok(self.require_version(version_id).await?.schema())
    }

    /// 比較同一策略的兩個版本
    pub async fn diff_versions(
        &self,
        strategy_id: i32,
        base_version_id: i32,
        compare_version_id: i32,
    ) -> ServiceResult<VersionDiff> {
        let base = self.require_owned_version(strategy_id, base_version_id).await?;
        let compare = self.require_owned_version(strategy_id, compare_version_id).await?;
        debug!(strategy_id, base_version_id, compare_version_id, "比較版本");

        Ok(diff_script_versions(&base, &compare))
    }

    /// 預覽策略下一個自動版本代碼
    pub async fn next_version_code(&self, strategy_id: i32, date: NaiveDate) -> ServiceResult<String> {
        Ok(self.lifecycle.next_version_code(strategy_id, date).await?)
    }

    async fn require_strategy(&self, strategy_id: i32) -> Result<Strategy, VersionError> {
        self.repository()
            .get_strategy(strategy_id)
            .await?
            .ok_or(VersionError::StrategyNotFound(strategy_id))
    }

    async fn require_version(&self, version_id: i32) -> ServiceResult<ScriptVersion> {
        Ok(self
            .repository()
            .get_version(version_id)
            .await?
            .ok_or(VersionError::VersionNotFound(version_id))?)
    }

    async fn require_owned_version(&self, strategy_id: i32, version_id: i32) -> ServiceResult<ScriptVersion> {
        let version = self.require_version(version_id).await?;
        if version.strategy_id != strategy_id {
            return Err(VersionError::VersionNotFound(version_id).into());
        }
        Ok(version)
    }
}

/// 計算兩個已保存版本的程式碼與欄位差異
pub fn diff_script_versions(base: &ScriptVersion, compare: &ScriptVersion) -> VersionDiff {
    VersionDiff {
        base: base.summary(),
        compare: compare.summary(),
        code: diff_lines(&base.source_code, &compare.source_code),
        parameters: diff_field_array(&base.parameter_schema, &compare.parameter_schema),
        factors: diff_field_array(&base.factor_schema, &compare.factor_schema),
    }
}

fn normalize_code(code: Option<&str>) -> ServiceResult<Option<String>> {
    match code.map(str::trim) {
        None => Ok(None),
        Some("") => Err(ServiceError::InvalidRequest("版本代碼不能為空白".to_string())),
        Some(code) => Ok(Some(code.to_string())),
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(None, Ok(None))]
    #[case(Some("  v1 "), Ok(Some("v1".to_string())))]
    #[case(Some("   "), Err(()))]
    fn test_normalize_code(#[case] input: Option<&str>, #[case] expected: Result<Option<String>, ()>) {
        assert_eq!(normalize_code(input).map_err(|_| ()), expected);
    }
}
