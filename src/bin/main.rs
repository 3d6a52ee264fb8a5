use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use strategy_workbench::config::{self, LogConfig, MetricsConfig, SandboxConfig};
use strategy_workbench::diff::{diff_field_array, diff_lines, DiffSegment, FieldDiff};
use strategy_workbench::monitor::{init_logging, install_prometheus_exporter};
use strategy_workbench::script::{SandboxExecutor, ScriptSchema};

#[derive(Parser)]
#[command(name = "workbench", about = "策略腳本工作台")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 在沙箱中執行腳本並輸出宣告的參數與因子
    Check {
        /// 腳本檔案
        file: PathBuf,
    },

    /// 執行兩個腳本並輸出程式碼與欄位差異
    Diff {
        /// 基準版本
        base: PathBuf,
        /// 比較版本
        compare: PathBuf,
    },
}

#[derive(Serialize)]
struct ScriptFileDiff {
    code: Vec<DiffSegment>,
    parameters: FieldDiff,
    factors: FieldDiff,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = config::init_config();
    let (log, sandbox, metrics) = match &loaded {
        Ok(app_config) => (
            app_config.log.clone(),
            app_config.sandbox.clone(),
            app_config.metrics.clone(),
        ),
        Err(_) => (LogConfig::default(), SandboxConfig::default(), MetricsConfig::default()),
    };
    let _log_guard = init_logging(&log)?;
    if let Err(err) = &loaded {
        // 配置檔不存在時以預設值運行
        warn!("無法加載配置，使用預設值: {}", err);
    }
    if install_prometheus_exporter(&metrics)? {
        info!("Prometheus 指標輸出於 {}", metrics.listen_address);
    }

    let executor = SandboxExecutor::new(sandbox);

    match cli.command {
        Commands::Check { file } => {
            let schema = run_file(&executor, &file).await?;
            println!("{}", serde_json::to_string_pretty(&schema)?);
        }
        Commands::Diff { base, compare } => {
            let base_source = read_source(&base)?;
            let compare_source = read_source(&compare)?;
            let base_schema = run_source(&executor, &base, base_source.clone()).await?;
            let compare_schema = run_source(&executor, &compare, compare_source.clone()).await?;

            let diff = ScriptFileDiff {
                code: diff_lines(&base_source, &compare_source),
                parameters: diff_field_array(&base_schema.parameters, &compare_schema.parameters),
                factors: diff_field_array(&base_schema.factors, &compare_schema.factors),
            };
            println!("{}", serde_json::to_string_pretty(&diff)?);
        }
    }

    Ok(())
}

fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("無法讀取腳本 {}", path.display()))
}

async fn run_file(executor: &SandboxExecutor, path: &Path) -> Result<ScriptSchema> {
    let source = read_source(path)?;
    run_source(executor, path, source).await
}

async fn run_source(executor: &SandboxExecutor, path: &Path, source: String) -> Result<ScriptSchema> {
    executor
        .execute_async(source)
        .await
        .map_err(|e| anyhow!("{}: {}", path.display(), e))
}
