// script.rs - 策略腳本沙箱模組
//
// 在隔離的 Lua 環境中執行不受信任的策略腳本，收集其宣告的參數與因子，
// 並檢查入口契約與鍵唯一性。

pub mod compiler;
pub mod declare;
pub mod error;
pub mod field;
pub mod guard;
pub mod normalizer;
pub mod sandbox;
pub mod schema;

pub use compiler::{CompileError, CompiledScript, LuaCompiler, ScriptCompiler};
pub use declare::{CapabilityTable, SDK_MODULE};
pub use error::{SandboxError, SandboxResult};
pub use field::{EnumOption, FieldCategory, FieldDescriptor, ScriptSchema};
pub use normalizer::normalize;
pub use sandbox::SandboxExecutor;
pub use schema::validate;
