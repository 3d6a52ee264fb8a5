use config::{Config, ConfigError, Environment as ConfigEnvironment, File};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

/// 選擇環境的變數名稱
pub const ENV_VAR: &str = "WORKBENCH_ENV";

/// 配置目錄的變數名稱
pub const CONFIG_DIR_VAR: &str = "CONFIG_DIR";

/// 環境變數覆寫的前綴，例如 `WORKBENCH__SANDBOX__TIMEOUT_MS`
pub const ENV_PREFIX: &str = "WORKBENCH";

/// 環境類型枚舉
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    /// 從環境變數取得當前環境設定
    pub fn from_env() -> Self {
        match env::var(ENV_VAR)
            .unwrap_or_else(|_| "development".into())
            .to_lowercase()
            .as_str()
        {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }

    /// 轉換為配置文件名
    pub fn as_filename(&self) -> &'static str {
        match self {
            Environment::Development => "development.toml",
            Environment::Production => "production.toml",
        }
    }
}

/// 配置加載器，負責根據環境加載適當的配置
pub struct ConfigLoader;

impl ConfigLoader {
    /// 當前使用的配置目錄
    pub fn config_dir() -> PathBuf {
        PathBuf::from(env::var(CONFIG_DIR_VAR).unwrap_or_else(|_| "config".into()))
    }

    /// 載入指定環境的配置
    pub fn load(env: Environment) -> Result<Config, ConfigError> {
        Self::load_from_dir(env, &Self::config_dir())
    }

    /// 從指定目錄載入環境配置，環境變數的優先級高於文件
    pub fn load_from_dir(env: Environment, config_dir: &Path) -> Result<Config, ConfigError> {
        Config::builder()
            .add_source(File::from(config_dir.join(env.as_filename())))
            .add_source(
                ConfigEnvironment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
    }

    /// 載入當前環境的配置
    pub fn load_current() -> Result<Config, ConfigError> {
        Self::load(Environment::from_env())
    }
}

/// 配置獲取輔助特性
pub trait ConfigExt {
    /// 從配置中獲取並反序列化指定部分
    fn get_section<'a, T: Deserialize<'a>>(&'a self, section: &str) -> Result<T, ConfigError>;
}

impl ConfigExt for Config {
    fn get_section<'a, T: Deserialize<'a>>(&'a self, section: &str) -> Result<T, ConfigError> {
        self.get(section)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::SandboxConfig;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    const MINIMAL: &str = r#"
[database]
host = "localhost"
port = 5432
username = "workbench"
password = "secret"
database = "workbench"
max_connections = 10
min_connections = 1
max_lifetime_secs = 1800
acquire_timeout_secs = 30
idle_timeout_secs = 600

[log]
level = "info"
format = "pretty"

[sandbox]
timeout_ms = 1500
"#;

    fn write_config(env: Environment) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(env.as_filename()), MINIMAL).unwrap();
        dir
    }

    #[test]
    #[serial]
    fn test_environment_from_env() {
        env::remove_var(ENV_VAR);
        assert_eq!(Environment::from_env(), Environment::Development);

        env::set_var(ENV_VAR, "PRODUCTION");
        assert_eq!(Environment::from_env(), Environment::Production);

        env::set_var(ENV_VAR, "staging");
        assert_eq!(Environment::from_env(), Environment::Development);

        env::remove_var(ENV_VAR);
    }

    #[test]
    fn test_environment_as_filename() {
        assert_eq!(Environment::Development.as_filename(), "development.toml");
        assert_eq!(Environment::Production.as_filename(), "production.toml");
    }

    #[test]
    #[serial]
    fn test_sections_from_file() {
        let dir = write_config(Environment::Development);
        let config = ConfigLoader::load_from_dir(Environment::Development, dir.path()).unwrap();

        let sandbox: SandboxConfig = config.get_section("sandbox").unwrap();
        assert_eq!(sandbox.timeout_ms, 1500);
        // 未填寫的欄位使用預設值
        assert_eq!(sandbox.memory_limit_mb, SandboxConfig::default().memory_limit_mb);
    }

    #[test]
    #[serial]
    fn test_env_override_wins_over_file() {
        let dir = write_config(Environment::Development);
        env::set_var("WORKBENCH__SANDBOX__TIMEOUT_MS", "250");

        let config = ConfigLoader::load_from_dir(Environment::Development, dir.path()).unwrap();
        env::remove_var("WORKBENCH__SANDBOX__TIMEOUT_MS");

        let sandbox: SandboxConfig = config.get_section("sandbox").unwrap();
        assert_eq!(sandbox.timeout_ms, 250);
    }

    #[test]
    #[serial]
    fn test_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ConfigLoader::load_from_dir(Environment::Production, dir.path()).is_err());
    }
}
