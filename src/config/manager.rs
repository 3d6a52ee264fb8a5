use crate::config::loader::{ConfigLoader, Environment};
use crate::config::types::ApplicationConfig;
use crate::config::validation::Validator;
use config::ConfigError;
use once_cell::sync::OnceCell;
use std::path::Path;
use tracing::{debug, warn};

// 全局配置實例
static CONFIG: OnceCell<ApplicationConfig> = OnceCell::new();

/// 獲取應用程序配置實例
///
/// 若尚未呼叫 [`init_config`]，會以當前環境載入；載入失敗時直接中止。
pub fn get_config() -> &'static ApplicationConfig {
    CONFIG.get_or_init(|| ApplicationConfig::load_from_env().expect("無法加載應用程序配置"))
}

/// 初始化配置（在應用程序啟動時調用）
pub fn init_config() -> Result<&'static ApplicationConfig, ConfigError> {
    if let Some(existing) = CONFIG.get() {
        warn!("配置已經被初始化，跳過重複初始化");
        return Ok(existing);
    }

    let app_config = ApplicationConfig::load_from_env()?;
    debug!("配置初始化成功，環境：{:?}", Environment::from_env());
    Ok(CONFIG.get_or_init(|| app_config))
}

/// ApplicationConfig 加載方法實現
impl ApplicationConfig {
    /// 從環境變數指定的環境加載配置
    pub fn load_from_env() -> Result<Self, ConfigError> {
        let env = Environment::from_env();
        debug!("從環境加載配置: {:?}", env);
        Self::load(env)
    }

    /// 從指定環境加載配置
    pub fn load(env: Environment) -> Result<Self, ConfigError> {
        Self::load_from_dir(env, &ConfigLoader::config_dir())
    }

    /// 從指定目錄加載並驗證配置
    pub fn load_from_dir(env: Environment, config_dir: &Path) -> Result<Self, ConfigError> {
        let app_config: ApplicationConfig = ConfigLoader::load_from_dir(env, config_dir)?.try_deserialize()?;

        // 沙箱的限制值超出範圍時拒絕啟動，其他部分只記錄警告
        if let Err(err) = app_config.sandbox.validate() {
            return Err(ConfigError::Message(err.to_string()));
        }
        match app_config.validate() {
            Ok(()) => debug!("配置驗證通過"),
            Err(err) => warn!("配置驗證失敗: {}", err),
        }

        Ok(app_config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    fn repo_config_dir() -> std::path::PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("config")
    }

    #[test]
    #[serial]
    fn test_bundled_configs_load() {
        let dev = ApplicationConfig::load_from_dir(Environment::Development, &repo_config_dir()).unwrap();
        assert!(dev.validate().is_ok());
        assert_eq!(dev.log.level, "debug");

        let prod = ApplicationConfig::load_from_dir(Environment::Production, &repo_config_dir()).unwrap();
        assert!(prod.validate().is_ok());
        assert_eq!(prod.log.format, "json");
    }

    #[test]
    #[serial]
    fn test_invalid_sandbox_limits_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let source = fs::read_to_string(repo_config_dir().join("development.toml")).unwrap();
        let broken = format!("{}\n", source.replace("memory_limit_mb = 64", "memory_limit_mb = 0"));
        fs::write(dir.path().join("development.toml"), broken).unwrap();

        assert!(ApplicationConfig::load_from_dir(Environment::Development, dir.path()).is_err());
    }
}
