#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use strategy_workbench::config::SandboxConfig;
use strategy_workbench::script::SandboxExecutor;
use strategy_workbench::storage::models::Strategy;
use strategy_workbench::storage::repository::InMemoryScriptVersionRepository;
use strategy_workbench::ScriptService;

/// 測試用的沙箱配置，逾時縮短以加快測試
pub fn sandbox_config() -> SandboxConfig {
    SandboxConfig {
        timeout_ms: 300,
        grace_ms: 300,
        ..SandboxConfig::default()
    }
}

pub fn executor() -> SandboxExecutor {
    SandboxExecutor::new(sandbox_config())
}

/// 等待所有沙箱執行緒結束，超過期限仍有存活者則失敗
pub fn wait_for_idle_workers(executor: &SandboxExecutor, within: Duration) {
    let started = Instant::now();
    while executor.active_workers() > 0 {
        assert!(
            started.elapsed() < within,
            "{} 個沙箱執行緒在 {:?} 後仍存活",
            executor.active_workers(),
            within
        );
        std::thread::sleep(Duration::from_millis(20));
    }
}

/// 建立以記憶體儲存庫為後端的服務與一個策略
pub async fn service_with_strategy() -> (ScriptService, Strategy) {
    let service = ScriptService::new(Arc::new(InMemoryScriptVersionRepository::new()), executor());
    let strategy = service
        .create_strategy("mean-reversion", Some("測試策略".to_string()))
        .await
        .expect("create strategy");
    (service, strategy)
}

/// 宣告兩個參數與一個因子的腳本
pub const WINDOW_SCRIPT: &str = r#"
local sdk = require("strategy_sdk")

sdk.parameter.number("window", { label = "Window", default = 20 })
sdk.parameter.enum("side", { options = { "long", "short" } })
sdk.factor.custom("alpha", { desc = "signal" })

return sdk.define_strategy({ run = function(ctx) end })
"#;

/// 與 WINDOW_SCRIPT 相比：window 改標籤、side 移除、新增 threshold
pub const WINDOW_SCRIPT_V2: &str = r#"
local sdk = require("strategy_sdk")

sdk.parameter.number("window", { label = "Lookback", default = 20 })
sdk.parameter.number("threshold", { default = 0.5 })
sdk.factor.custom("alpha", { desc = "signal" })

return sdk.define_strategy({ run = function(ctx) end })
"#;
