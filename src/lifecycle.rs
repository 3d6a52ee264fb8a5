// lifecycle.rs - 版本生命週期
//
// 版本代碼的產生與唯一性檢查，以及每個策略唯一主版本的維護。

pub mod manager;
pub mod version_code;

pub use manager::{StrategyGuard, VersionLifecycleManager};
pub use version_code::{generate_version_code, parse_version_code};
