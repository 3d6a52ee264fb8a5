use serde::{Deserialize, Serialize};
use std::time::Duration;
use crate::config::validation::{ValidationError, ValidationUtils, Validator};

/// 應用程序配置結構
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    pub database: DatabaseConfig,
    pub log: LogConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Validator for ApplicationConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        // 驗證各個部分的配置
        self.database.validate()?;
        self.log.validate()?;
        self.sandbox.validate()?;
        self.metrics.validate()?;

        Ok(())
    }
}

/// 數據庫配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub max_lifetime_secs: u64,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

impl Validator for DatabaseConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        // 驗證數據庫配置
        ValidationUtils::not_empty(&self.host, "database.host")?;
        ValidationUtils::not_empty(&self.username, "database.username")?;
        ValidationUtils::not_empty(&self.database, "database.database")?;
        ValidationUtils::in_range(self.port, 1, 65535, "database.port")?;
        ValidationUtils::in_range(self.max_connections, self.min_connections, 1000, "database.max_connections")?;

        Ok(())
    }
}

impl DatabaseConfig {
    /// 獲取最大生命週期持續時間
    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }

    /// 獲取獲取連接超時持續時間
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    /// 獲取閒置超時持續時間
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// 日誌配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: String,
    pub format: String,
    /// 日誌目錄，留空則只輸出到控制台
    #[serde(default)]
    pub directory: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            directory: None,
        }
    }
}

impl Validator for LogConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        // 驗證日誌級別
        ValidationUtils::one_of(&self.level, &["trace", "debug", "info", "warn", "error"], "log.level")?;

        // 驗證日誌格式
        ValidationUtils::one_of(&self.format, &["pretty", "json"], "log.format")?;

        if let Some(dir) = &self.directory {
            ValidationUtils::not_empty(dir, "log.directory")?;
        }

        Ok(())
    }
}

/// 腳本沙箱配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// 單次執行的時間預算（毫秒）
    pub timeout_ms: u64,
    /// 宿主端在時間預算之外額外等待的寬限時間（毫秒）
    pub grace_ms: u64,
    /// 單次執行的 Lua 記憶體上限（MB）
    pub memory_limit_mb: u64,
    /// 每隔多少條 VM 指令檢查一次期限
    pub hook_instruction_interval: u32,
    /// 同時執行的沙箱數量上限，0 表示使用 CPU 核心數
    pub max_concurrent_executions: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 3000,
            grace_ms: 500,
            memory_limit_mb: 64,
            hook_instruction_interval: 1000,
            max_concurrent_executions: 0,
        }
    }
}

impl SandboxConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }

    /// 指令鉤子的觸發間隔，0 會關閉鉤子，因此至少為 1
    pub fn hook_interval(&self) -> u32 {
        self.hook_instruction_interval.max(1)
    }

    pub fn memory_limit_bytes(&self) -> usize {
        (self.memory_limit_mb as usize).saturating_mul(1024 * 1024)
    }

    /// 實際的並行上限
    pub fn concurrency(&self) -> usize {
        if self.max_concurrent_executions == 0 {
            num_cpus::get().max(1)
        } else {
            self.max_concurrent_executions
        }
    }
}

impl Validator for SandboxConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        ValidationUtils::in_range(self.timeout_ms, 10, 60_000, "sandbox.timeout_ms")?;
        ValidationUtils::in_range(self.grace_ms, 0, 10_000, "sandbox.grace_ms")?;
        ValidationUtils::in_range(self.memory_limit_mb, 1, 1024, "sandbox.memory_limit_mb")?;
        ValidationUtils::in_range(self.hook_instruction_interval, 1, 1_000_000, "sandbox.hook_instruction_interval")?;
        ValidationUtils::in_range(self.max_concurrent_executions, 0, 256, "sandbox.max_concurrent_executions")?;

        Ok(())
    }
}

/// 指標輸出配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen_address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_address: "0.0.0.0:9464".to_string(),
        }
    }
}

impl Validator for MetricsConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        ValidationUtils::check_dependency(
            self.enabled,
            !self.listen_address.trim().is_empty(),
            "metrics.enabled",
            "metrics.listen_address",
        )?;
        if self.enabled {
            ValidationUtils::socket_addr(&self.listen_address, "metrics.listen_address")?;
        }

        Ok(())
    }
}
