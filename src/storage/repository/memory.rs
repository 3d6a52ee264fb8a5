use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use sqlx::types::Json;
use std::collections::BTreeMap;

use crate::storage::models::script_version::*;
use crate::storage::models::strategy::{Strategy, StrategyInsert};
use crate::storage::repository::script_version::{ScriptVersionRepository, VersionError};

#[derive(Debug, Default)]
struct MemoryState {
    strategies: BTreeMap<i32, Strategy>,
    versions: BTreeMap<i32, ScriptVersion>,
    last_strategy_id: i32,
    last_version_id: i32,
}

impl MemoryState {
    fn code_taken(&self, strategy_id: i32, code: &str, exclude: Option<i32>) -> bool {
        self.versions.values().any(|v| {
            v.strategy_id == strategy_id && v.version_code == code && Some(v.version_id) != exclude
        })
    }
}

/// 記憶體內的腳本版本儲存庫
///
/// 所有寫入都在同一把寫鎖內完成，讀取端只會看到完整的狀態。
#[derive(Debug, Default)]
pub struct InMemoryScriptVersionRepository {
    state: RwLock<MemoryState>,
}

impl InMemoryScriptVersionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScriptVersionRepository for InMemoryScriptVersionRepository {
    async fn create_strategy(&self, strategy: &StrategyInsert) -> Result<Strategy, VersionError> {
        let mut state = self.state.write();
        state.last_strategy_id += 1;
        let now = Utc::now();
        let created = Strategy {
            strategy_id: state.last_strategy_id,
            name: strategy.name.clone(),
            description: strategy.description.clone(),
            master_version_id: None,
            created_at: now,
            updated_at: now,
        };
        state.strategies.insert(created.strategy_id, created.clone());
        Ok(created)
    }

    async fn get_strategy(&self, strategy_id: i32) -> Result<Option<Strategy>, VersionError> {
        Ok(self.state.read().strategies.get(&strategy_id).cloned())
    }

    async fn find_versions_by_strategy(&self, strategy_id: i32) -> Result<Vec<ScriptVersion>, VersionError> {
        let state = self.state.read();
        let mut versions: Vec<ScriptVersion> = state
            .versions
            .values()
            .filter(|v| v.strategy_id == strategy_id)
            .cloned()
            .collect();
        versions.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(b.version_id.cmp(&a.version_id))
        });
        Ok(versions)
    }

    async fn get_version(&self, version_id: i32) -> Result<Option<ScriptVersion>, VersionError> {
        Ok(self.state.read().versions.get(&version_id).cloned())
    }

    async fn save_version(&self, version: &ScriptVersionInsert) -> Result<ScriptVersion, VersionError> {
        let mut state = self.state.write();
        if !state.strategies.contains_key(&version.strategy_id) {
            return Err(VersionError::StrategyNotFound(version.strategy_id));
        }
        if state.code_taken(version.strategy_id, &version.version_code, None) {
            return Err(VersionError::VersionConflict(version.version_code.clone()));
        }

        state.last_version_id += 1;
        let now = Utc::now();
        let saved = ScriptVersion {
            version_id: state.last_version_id,
            strategy_id: version.strategy_id,
            version_code: version.version_code.clone(),
            is_master: false,
            source_code: version.source_code.clone(),
            parameter_schema: Json(version.parameter_schema.clone()),
            factor_schema: Json(version.factor_schema.clone()),
            remark: version.remark.clone(),
            created_at: now,
            updated_at: now,
        };
        state.versions.insert(saved.version_id, saved.clone());
        Ok(saved)
    }

    async fn update_version(&self, version_id: i32, update: &ScriptVersionUpdate) -> Result<ScriptVersion, VersionError> {
        let mut state = self.state.write();
        let strategy_id = state
            .versions
            .get(&version_id)
            .map(|v| v.strategy_id)
            .ok_or(VersionError::VersionNotFound(version_id))?;
        if state.code_taken(strategy_id, &update.version_code, Some(version_id)) {
            return Err(VersionError::VersionConflict(update.version_code.clone()));
        }

        let version = state
            .versions
            .get_mut(&version_id)
            .ok_or(VersionError::VersionNotFound(version_id))?;
        version.version_code = update.version_code.clone();
        version.source_code = update.source_code.clone();
        version.parameter_schema = Json(update.parameter_schema.clone());
        version.factor_schema = Json(update.factor_schema.clone());
        version.remark = update.remark.clone();
        version.updated_at = Utc::now();
        Ok(version.clone())
    }

    async fn update_master_flags(&self, strategy_id: i32, master_version_id: i32) -> Result<(), VersionError> {
        let mut state = self.state.write();
        if !state.strategies.contains_key(&strategy_id) {
            return Err(VersionError::StrategyNotFound(strategy_id));
        }
        match state.versions.get(&master_version_id) {
            Some(v) if v.strategy_id == strategy_id => {}
            _ => return Err(VersionError::VersionNotFound(master_version_id)),
        }

        let now = Utc::now();
        for version in state.versions.values_mut().filter(|v| v.strategy_id == strategy_id) {
            let should_be_master = version.version_id == master_version_id;
            if version.is_master != should_be_master {
                version.is_master = should_be_master;
                version.updated_at = now;
            }
        }
        if let Some(strategy) = state.strategies.get_mut(&strategy_id) {
            strategy.master_version_id = Some(master_version_id);
            strategy.updated_at = now;
        }
        Ok(())
    }
}
