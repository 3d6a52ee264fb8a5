use thiserror::Error;

use crate::script::error::SandboxError;
use crate::storage::repository::VersionError;

/// 腳本服務錯誤類型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// 腳本被沙箱拒絕，屬於永久性的客戶端錯誤
    #[error("腳本被拒絕: {0}")]
    Rejected(#[from] SandboxError),

    /// 版本生命週期錯誤
    #[error(transparent)]
    Version(#[from] VersionError),

    /// 請求內容無效
    #[error("無效的請求: {0}")]
    InvalidRequest(String),
}

impl ServiceError {
    /// 由呼叫方造成、重送也不會成功的錯誤
    pub fn is_client_error(&self) -> bool {
        !matches!(self, ServiceError::Version(VersionError::DatabaseError(_)))
    }
}

/// 服務結果類型別名
pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_database_errors_are_server_side() {
        assert!(ServiceError::from(SandboxError::Timeout(3000)).is_client_error());
        assert!(ServiceError::from(VersionError::VersionConflict("v1".into())).is_client_error());
        assert!(!ServiceError::from(VersionError::DatabaseError("closed".into())).is_client_error());
    }

    #[test]
    fn test_rejection_message_keeps_sandbox_reason() {
        let err = ServiceError::from(SandboxError::DisallowedModule("fs".into()));
        assert!(err.to_string().contains("fs"));
    }
}
