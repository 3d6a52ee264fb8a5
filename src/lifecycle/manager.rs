use chrono::NaiveDate;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::lifecycle::version_code::generate_version_code;
use crate::monitor::metrics::SandboxMetrics;
use crate::storage::repository::{ScriptVersionRepository, VersionError};

/// 持有某個策略的寫入鎖
///
/// 只有持有者能透過 [`VersionLifecycleManager::set_master_guarded`] 切換主版本。
pub struct StrategyGuard {
    strategy_id: i32,
    guard: Option<OwnedMutexGuard<()>>,
    locks: LockTable,
}

impl StrategyGuard {
    pub fn strategy_id(&self) -> i32 {
        self.strategy_id
    }
}

impl Drop for StrategyGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // 只剩鎖表本身持有時移除，等待中的呼叫者仍持有複本
        self.locks
            .remove_if(&self.strategy_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

type LockTable = Arc<DashMap<i32, Arc<Mutex<()>>>>;

/// 版本生命週期管理器
///
/// 同一策略的寫入在此序列化，不同策略之間互不阻塞。
pub struct VersionLifecycleManager {
    repository: Arc<dyn ScriptVersionRepository>,
    locks: LockTable,
}

impl VersionLifecycleManager {
    pub fn new(repository: Arc<dyn ScriptVersionRepository>) -> Self {
        Self {
            repository,
            locks: Arc::new(DashMap::new()),
        }
    }

    pub fn repository(&self) -> &Arc<dyn ScriptVersionRepository> {
        &self.repository
    }

    /// 取得策略的寫入鎖
    pub async fn lock_strategy(&self, strategy_id: i32) -> StrategyGuard {
        let lock = self
            .locks
            .entry(strategy_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        StrategyGuard {
            strategy_id,
            guard: Some(lock.lock_owned().await),
            locks: Arc::clone(&self.locks),
        }
    }

    /// 鎖表中目前的策略數量，未被持有或等待的鎖會在釋放時移除
    pub fn tracked_strategies(&self) -> usize {
        self.locks.len()
    }

    /// 將版本設為策略的唯一主版本
    pub async fn set_master(&self, strategy_id: i32, version_id: i32) -> Result<(), VersionError> {
        let guard = self.lock_strategy(strategy_id).await;
        self.set_master_guarded(&guard, version_id).await
    }

    /// 在已持有策略鎖的情況下切換主版本
    pub async fn set_master_guarded(&self, guard: &StrategyGuard, version_id: i32) -> Result<(), VersionError> {
        let strategy_id = guard.strategy_id();
        let result = self
            .repository
            .update_master_flags(strategy_id, version_id)
            .await;
        SandboxMetrics::record_version_operation("set_master", result.is_ok());
        result?;

        info!(strategy_id, version_id, "主版本已切換");
        Ok(())
    }

    /// 確認版本代碼在策略內未被使用，`exclude` 為正在更新的版本
    pub async fn ensure_code_available(
        &self,
        strategy_id: i32,
        code: &str,
        exclude: Option<i32>,
    ) -> Result<(), VersionError> {
        let versions = self.repository.find_versions_by_strategy(strategy_id).await?;
        let taken = versions
            .iter()
            .any(|v| v.version_code == code && Some(v.version_id) != exclude);
        if taken {
            debug!(strategy_id, code, "版本代碼已被使用");
            return Err(VersionError::VersionConflict(code.to_string()));
        }
        Ok(())
    }

    /// 依策略既有的版本代碼產生下一個可用代碼
    pub async fn next_version_code(&self, strategy_id: i32, date: NaiveDate) -> Result<String, VersionError> {
        if self.repository.get_strategy(strategy_id).await?.is_none() {
            return Err(VersionError::StrategyNotFound(strategy_id));
        }
        let versions = self.repository.find_versions_by_strategy(strategy_id).await?;
        Ok(generate_version_code(
            versions.iter().map(|v| v.version_code.as_str()),
            date,
        ))
    }
}
