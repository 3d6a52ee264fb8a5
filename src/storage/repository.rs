use sqlx::PgPool;

// 重新導出子模塊
pub mod memory;
pub mod script_version;

// 重新導出常用類型
pub use memory::InMemoryScriptVersionRepository;
pub use script_version::{PgScriptVersionRepository, ScriptVersionRepository, VersionError};

/// 通用的數據庫操作特性
pub trait DbExecutor {
    fn get_pool(&self) -> &PgPool;
}
