use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::time::Duration;

use crate::config::{MetricsConfig, ValidationUtils};
use crate::monitor::{MonitorError, MonitorResult};

/// 監控指標命名空間
pub const METRIC_NAMESPACE: &str = "strategy_workbench";

/// 沙箱與版本管理的指標記錄器
pub struct SandboxMetrics;

impl SandboxMetrics {
    /// 記錄一次沙箱執行
    ///
    /// # Arguments
    /// * `outcome` - `"ok"` 或錯誤種類 (如 `"timeout"`, `"duplicate_key"`)
    /// * `elapsed` - 執行耗時
    pub fn record_execution(outcome: &'static str, elapsed: Duration) {
        counter!(
            format!("{}.sandbox.executions", METRIC_NAMESPACE),
            "outcome" => outcome
        )
        .increment(1);

        histogram!(
            format!("{}.sandbox.latency_ms", METRIC_NAMESPACE),
            "outcome" => outcome
        )
        .record(elapsed.as_secs_f64() * 1000.0);
    }

    /// 記錄目前執行中的沙箱數量
    pub fn record_in_flight(count: usize) {
        gauge!(format!("{}.sandbox.in_flight", METRIC_NAMESPACE)).set(count as f64);
    }

    /// 記錄版本操作
    pub fn record_version_operation(operation: &'static str, success: bool) {
        counter!(
            format!("{}.version.operations", METRIC_NAMESPACE),
            "operation" => operation,
            "result" => if success { "ok" } else { "error" }
        )
        .increment(1);
    }
}

/// 啟動 Prometheus 指標輸出，未啟用時不做任何事
///
/// 必須在 tokio runtime 內呼叫。
pub fn install_prometheus_exporter(config: &MetricsConfig) -> MonitorResult<bool> {
    if !config.enabled {
        return Ok(false);
    }

    let addr = ValidationUtils::socket_addr(&config.listen_address, "metrics.listen_address")
        .map_err(|e| MonitorError::MetricsError(e.to_string()))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MonitorError::MetricsError(e.to_string()))?;

    Ok(true)
}
