// monitor.rs - 日誌與指標

pub mod logger;
pub mod metrics;

pub use logger::{init_logging, parse_level};
pub use metrics::{install_prometheus_exporter, SandboxMetrics, METRIC_NAMESPACE};

/// 監控系統錯誤類型
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// 日誌初始化錯誤
    #[error("日誌錯誤: {0}")]
    LoggerError(String),

    /// 指標輸出錯誤
    #[error("指標錯誤: {0}")]
    MetricsError(String),
}

/// 監控結果類型
pub type MonitorResult<T> = Result<T, MonitorError>;
