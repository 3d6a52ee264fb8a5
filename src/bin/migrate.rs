use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use strategy_workbench::config;
use strategy_workbench::storage;
use tracing::info;
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "migrate", about = "strategy-workbench 數據庫遷移工具")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 運行所有未應用的遷移
    Run,

    /// 檢查遷移狀態
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日誌系統
    tracing_subscriber::fmt()
        .with_env_filter("strategy_workbench=info,migrate=info")
        .with_span_events(FmtSpan::CLOSE)
        .init();

    let cli = Cli::parse();

    let app_config = config::init_config().context("無法加載配置")?;
    let pool = storage::init_pool(&app_config.database)
        .await
        .context("無法初始化資料庫連接池")?;

    match cli.command {
        Commands::Run => {
            storage::run_migrations(&pool)
                .await
                .context("資料庫遷移執行失敗")?;
            info!("資料庫遷移完成！");
        }
        Commands::Status => {
            let statuses = storage::migration_status(&pool)
                .await
                .context("無法讀取遷移狀態")?;
            for status in statuses {
                let mark = if status.applied { "已套用" } else { "未套用" };
                println!("{:>16}  {}  {}", status.version, mark, status.description);
            }
        }
    }

    Ok(())
}
