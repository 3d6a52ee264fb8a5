pub mod script_version;
pub mod strategy;

// 重新匯出常用模型類型
pub use script_version::*;
pub use strategy::*;
