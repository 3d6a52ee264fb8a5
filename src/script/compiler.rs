use mlua::{Lua, LuaOptions, StdLib};
use std::fmt;

use crate::script::error::SandboxError;

/// 沙箱載入腳本時使用的區塊名稱
pub const CHUNK_NAME: &str = "=strategy";

/// 可直接執行的腳本形式
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledScript {
    pub chunk_name: String,
    pub code: String,
}

/// 編譯錯誤
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub message: String,
    pub line: Option<usize>,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "第 {} 行: {}", line, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for CompileError {}

impl From<CompileError> for SandboxError {
    fn from(err: CompileError) -> Self {
        SandboxError::Compile(err.to_string())
    }
}

/// 原始碼到可執行形式的轉換器
///
/// 沙箱把它當成黑盒使用；失敗時帶回底層訊息，後續步驟不會執行。
#[cfg_attr(test, mockall::automock)]
pub trait ScriptCompiler: Send + Sync {
    fn compile(&self, source: &str) -> Result<CompiledScript, CompileError>;
}

/// Lua 語法檢查編譯器
///
/// 去除 BOM 與 `#!` 首行後，在沒有任何標準庫的 Lua 狀態中解析區塊。
#[derive(Debug, Clone, Default)]
pub struct LuaCompiler;

impl LuaCompiler {
    pub fn new() -> Self {
        Self
    }

    fn preprocess(source: &str) -> String {
        let source = source.strip_prefix('\u{feff}').unwrap_or(source);
        if source.starts_with("#!") {
            // 保留換行，讓錯誤行號與原始碼一致
            match source.find('\n') {
                Some(idx) => source[idx..].to_string(),
                None => String::new(),
            }
        } else {
            source.to_string()
        }
    }
}

impl ScriptCompiler for LuaCompiler {
    fn compile(&self, source: &str) -> Result<CompiledScript, CompileError> {
        let code = Self::preprocess(source);

        let lua = Lua::new_with(StdLib::NONE, LuaOptions::default()).map_err(|e| CompileError {
            message: format!("無法建立語法檢查環境: {}", e),
            line: None,
        })?;

        lua.load(code.as_str())
            .set_name(CHUNK_NAME)
            .into_function()
            .map_err(|e| match e {
                mlua::Error::SyntaxError { message, .. } => split_location(&message),
                other => CompileError {
                    message: other.to_string(),
                    line: None,
                },
            })?;

        Ok(CompiledScript {
            chunk_name: CHUNK_NAME.to_string(),
            code,
        })
    }
}

// Lua 語法錯誤格式為 "strategy:3: unexpected symbol near 'x'"
fn split_location(message: &str) -> CompileError {
    let name = CHUNK_NAME.trim_start_matches('=');
    let parsed = message
        .strip_prefix(name)
        .and_then(|rest| rest.strip_prefix(':'))
        .and_then(|rest| rest.split_once(':'))
        .and_then(|(line, msg)| line.parse::<usize>().ok().map(|l| (l, msg.trim())));

    match parsed {
        Some((line, msg)) => CompileError {
            message: msg.to_string(),
            line: Some(line),
        },
        None => CompileError {
            message: message.to_string(),
            line: None,
        },
    }
}
