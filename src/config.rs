/// 配置管理模組
///
/// 負責加載、驗證和管理工作台配置，支持開發與生產兩種環境。
// 宣告子模組
pub mod loader;
pub mod manager;
pub mod types;
pub mod validation;

// 重新導出常用組件
pub use loader::{ConfigExt, ConfigLoader, Environment};
pub use manager::{get_config, init_config};
pub use types::*;
pub use validation::{validate_config, ValidationError, ValidationUtils, Validator};
