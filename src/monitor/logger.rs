// monitor/logger.rs - tracing 訂閱器初始化

use std::path::Path;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::LogConfig;
use crate::monitor::{MonitorError, MonitorResult};

/// 日誌檔名前綴，實際檔名由每日輪替附加日期
pub const LOG_FILE_PREFIX: &str = "workbench.log";

/// 將配置中的日誌級別轉為 tracing 級別，無法辨識時回到 INFO
pub fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// 初始化全局日誌
///
/// `RUST_LOG` 存在時優先於配置的級別。設定了日誌目錄時改寫入每日輪替的檔案，
/// 回傳的 guard 必須存活到程序結束，否則緩衝中的日誌會遺失。
pub fn init_logging(config: &LogConfig) -> MonitorResult<Option<WorkerGuard>> {
    let level = parse_level(&config.level);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let (writer, guard, ansi) = match &config.directory {
        Some(dir) => {
            std::fs::create_dir_all(Path::new(dir))
                .map_err(|e| MonitorError::LoggerError(format!("無法創建日誌目錄 {}: {}", dir, e)))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(non_blocking), Some(guard), false)
        }
        None => (BoxMakeWriter::new(std::io::stdout), None, true),
    };

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(true)
        .with_thread_names(true);

    let result = if config.format.eq_ignore_ascii_case("json") {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| MonitorError::LoggerError(e.to_string()))?;

    Ok(guard)
}
