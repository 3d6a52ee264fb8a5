// 模組定義
pub mod config;
pub mod diff;
pub mod lifecycle;
pub mod monitor;
pub mod script;
pub mod service;
pub mod storage;

pub use script::{SandboxError, SandboxExecutor, ScriptSchema};
pub use service::{ScriptService, ServiceError, SubmitScript, UpdateScript, VersionDiff};
