use thiserror::Error;

/// 腳本沙箱錯誤
///
/// 所有在沙箱內產生的失敗（編譯、模組、執行、逾時、契約、重複鍵）
/// 都會收斂成此類型，對呼叫方而言一律視為永久性的拒絕。
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SandboxError {
    /// 腳本無法轉換為可執行形式
    #[error("腳本編譯失敗: {0}")]
    Compile(String),

    /// 引入了白名單以外的模組
    #[error("不允許引入模組: {0}")]
    DisallowedModule(String),

    /// 執行期間拋出的錯誤
    #[error("腳本執行錯誤: {0}")]
    Runtime(String),

    /// 超出執行時間預算
    #[error("腳本執行逾時 ({0} ms)")]
    Timeout(u64),

    /// 匯出值不符合入口契約
    #[error("腳本匯出不符合契約: {0}")]
    ContractViolation(String),

    /// 同一分類內出現重複的鍵
    #[error("{category} 中存在重複的鍵: {key}")]
    DuplicateKey { category: String, key: String },
}

impl SandboxError {
    /// 沙箱錯誤一律是永久性的，重送相同原始碼只會得到相同結果
    pub fn is_permanent(&self) -> bool {
        true
    }

    /// 用於指標與日誌的錯誤種類標籤
    pub fn kind(&self) -> &'static str {
        match self {
            SandboxError::Compile(_) => "compile",
            SandboxError::DisallowedModule(_) => "disallowed_module",
            SandboxError::Runtime(_) => "runtime",
            SandboxError::Timeout(_) => "timeout",
            SandboxError::ContractViolation(_) => "contract_violation",
            SandboxError::DuplicateKey { .. } => "duplicate_key",
        }
    }
}

/// 沙箱結果類型別名
pub type SandboxResult<T> = Result<T, SandboxError>;
