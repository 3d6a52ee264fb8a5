//! 腳本沙箱執行器
//!
//! 每次呼叫都在獨立的作業系統執行緒中建立全新的 Lua 狀態，
//! 只暴露宣告 API 與少量安全的核心函數。期限由 VM 指令鉤子強制執行，
//! 可能停留在 C 端的標準庫函數另有防護（見 [`guard`](crate::script::guard)），
//! 宿主端再以通道等待的硬期限作為最後保障。執行結果以純資料訊息
//! （[`ScriptSchema`]）傳回，Lua 狀態在鉤子仍有效時於執行緒內釋放。

use mlua::{HookTriggers, Lua, LuaOptions, StdLib, Table, Value, VmState};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SandboxConfig;
use crate::monitor::metrics::SandboxMetrics;
use crate::script::compiler::{CompiledScript, LuaCompiler, ScriptCompiler};
use crate::script::declare::{create_sdk, CapabilityTable, SharedCollector, SDK_MODULE};
use crate::script::error::{SandboxError, SandboxResult};
use crate::script::guard::{guarded_setmetatable, install_library_guards};
use crate::script::field::ScriptSchema;
use crate::script::schema::validate_schema;

/// 環境中保留的核心函數
const SAFE_GLOBALS: &[&str] = &[
    "assert",
    "error",
    "ipairs",
    "next",
    "pairs",
    "rawequal",
    "rawget",
    "rawlen",
    "rawset",
    "select",
    "getmetatable",
    "tonumber",
    "tostring",
    "type",
    "_VERSION",
];

/// 環境中保留的標準庫
const SAFE_LIBRARIES: &[&str] = &["math", "string", "table", "utf8"];

/// 沙箱執行器
///
/// 可複製、可跨執行緒共享；每次 [`execute`](Self::execute) 之間沒有任何共享的可變狀態。
#[derive(Clone)]
pub struct SandboxExecutor {
    compiler: Arc<dyn ScriptCompiler>,
    config: SandboxConfig,
    permits: Arc<Semaphore>,
    workers: Arc<AtomicUsize>,
}

// 存活中的沙箱執行緒；釋放時才歸還並行許可
struct WorkerSlot {
    workers: Arc<AtomicUsize>,
    _permit: Option<OwnedSemaphorePermit>,
}

impl WorkerSlot {
    fn occupy(workers: &Arc<AtomicUsize>, permit: Option<OwnedSemaphorePermit>) -> Self {
        workers.fetch_add(1, Ordering::SeqCst);
        Self {
            workers: Arc::clone(workers),
            _permit: permit,
        }
    }
}

impl Drop for WorkerSlot {
    fn drop(&mut self) {
        self.workers.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SandboxExecutor {
    /// 使用預設的 Lua 編譯器建立執行器
    pub fn new(config: SandboxConfig) -> Self {
        Self::with_compiler(config, Arc::new(LuaCompiler::new()))
    }

    /// 使用自訂編譯器建立執行器
    pub fn with_compiler(config: SandboxConfig, compiler: Arc<dyn ScriptCompiler>) -> Self {
        let permits = Arc::new(Semaphore::new(config.concurrency()));
        Self {
            compiler,
            config,
            permits,
            workers: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// 目前仍在執行的沙箱執行緒數量（包含宿主已放棄等待者）
    pub fn active_workers(&self) -> usize {
        self.workers.load(Ordering::SeqCst)
    }

    /// 編譯、隔離執行並驗證腳本，回傳宣告的參數與因子
    pub fn execute(&self, source: &str) -> SandboxResult<ScriptSchema> {
        self.execute_with_permit(source, None)
    }

    /// 在阻塞執行緒池中執行，並受並行上限約束
    ///
    /// 許可隨沙箱執行緒一起持有，直到執行緒真正結束才歸還。
    pub async fn execute_async(&self, source: String) -> SandboxResult<ScriptSchema> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| SandboxError::Runtime("沙箱執行器已關閉".to_string()))?;
        SandboxMetrics::record_in_flight(
            self.config
                .concurrency()
                .saturating_sub(self.permits.available_permits()),
        );

        let executor = self.clone();
        tokio::task::spawn_blocking(move || executor.execute_with_permit(&source, Some(permit)))
            .await
            .map_err(|e| SandboxError::Runtime(format!("沙箱任務異常結束: {}", e)))?
    }

    fn execute_with_permit(
        &self,
        source: &str,
        permit: Option<OwnedSemaphorePermit>,
    ) -> SandboxResult<ScriptSchema> {
        let execution_id = Uuid::new_v4();
        let started = Instant::now();
        debug!(%execution_id, source_len = source.len(), "開始執行策略腳本");

        let result = self.execute_inner(source, permit);
        let elapsed = started.elapsed();

        match &result {
            Ok(schema) => {
                SandboxMetrics::record_execution("ok", elapsed);
                info!(
                    %execution_id,
                    parameters = schema.parameters.len(),
                    factors = schema.factors.len(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "策略腳本執行完成"
                );
            }
            Err(err) => {
                SandboxMetrics::record_execution(err.kind(), elapsed);
                warn!(
                    %execution_id,
                    kind = err.kind(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "策略腳本被拒絕: {}",
                    err
                );
            }
        }

        result
    }

    fn execute_inner(
        &self,
        source: &str,
        permit: Option<OwnedSemaphorePermit>,
    ) -> SandboxResult<ScriptSchema> {
        let compiled = self.compiler.compile(source)?;
        let schema = self.run_isolated(compiled, permit)?;
        validate_schema(&schema)?;
        Ok(schema)
    }

    fn run_isolated(
        &self,
        compiled: CompiledScript,
        permit: Option<OwnedSemaphorePermit>,
    ) -> SandboxResult<ScriptSchema> {
        let (tx, rx) = mpsc::sync_channel(1);
        let limits = self.config.clone();
        let slot = WorkerSlot::occupy(&self.workers, permit);

        thread::Builder::new()
            .name("script-sandbox".to_string())
            .spawn(move || {
                let _slot = slot;
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| run_script(&compiled, &limits)))
                    .unwrap_or_else(|payload| Err(SandboxError::Runtime(panic_message(payload))));
                // 宿主可能已因逾時放棄等待
                let _ = tx.send(outcome);
            })
            .map_err(|e| SandboxError::Runtime(format!("無法啟動沙箱執行緒: {}", e)))?;

        match rx.recv_timeout(self.config.timeout() + self.config.grace()) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => {
                warn!(timeout_ms = self.config.timeout_ms, "沙箱執行緒未在期限內回應，放棄等待");
                Err(SandboxError::Timeout(self.config.timeout_ms))
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(SandboxError::Runtime("沙箱執行緒異常結束".to_string()))
            }
        }
    }
}

// 在目前執行緒建立全新的 Lua 狀態並執行腳本
fn run_script(compiled: &CompiledScript, limits: &SandboxConfig) -> SandboxResult<ScriptSchema> {
    let deadline = Instant::now() + limits.timeout();
    let lua = Lua::new_with(
        StdLib::MATH | StdLib::STRING | StdLib::TABLE | StdLib::UTF8,
        LuaOptions::default(),
    )
    .map_err(|e| SandboxError::Runtime(format!("無法建立沙箱: {}", e)))?;
    lua.set_memory_limit(limits.memory_limit_bytes())
        .map_err(|e| SandboxError::Runtime(format!("無法設定記憶體上限: {}", e)))?;

    let timed_out = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&timed_out);
    lua.set_hook(
        HookTriggers::new().every_nth_instruction(limits.hook_interval()),
        move |_lua, _debug| {
            if Instant::now() >= deadline {
                flag.store(true, Ordering::SeqCst);
                Err(mlua::Error::RuntimeError("execution deadline exceeded".to_string()))
            } else {
                Ok(VmState::Continue)
            }
        },
    );

    let collector = SharedCollector::default();
    let outcome = evaluate(&lua, compiled, &collector, &timed_out, limits);

    // 鉤子保持安裝直到狀態關閉
    drop(lua);
    if timed_out.load(Ordering::SeqCst) {
        return Err(SandboxError::Timeout(limits.timeout_ms));
    }
    outcome
}

fn evaluate(
    lua: &Lua,
    compiled: &CompiledScript,
    collector: &SharedCollector,
    timed_out: &AtomicBool,
    limits: &SandboxConfig,
) -> SandboxResult<ScriptSchema> {
    let classify = |err: mlua::Error| classify_error(err, timed_out.load(Ordering::SeqCst), limits);

    let env = build_environment(lua, collector).map_err(&classify)?;
    let returned: Value = lua
        .load(compiled.code.as_str())
        .set_name(compiled.chunk_name.as_str())
        .set_environment(env)
        .call(())
        .map_err(&classify)?;

    let export = match returned {
        Value::Nil => collector.borrow().registered.clone().unwrap_or(Value::Nil),
        value => value,
    };
    check_contract(&export).map_err(|e| match e {
        ContractCheck::Violation(reason) => SandboxError::ContractViolation(reason),
        ContractCheck::Lua(err) => classify(err),
    })?;

    let collector = collector.borrow();
    Ok(ScriptSchema::new(
        collector.parameters.clone(),
        collector.factors.clone(),
    ))
}

// 白名單環境：安全核心函數、標準庫參照、宣告 API 與受控的 require
fn build_environment(lua: &Lua, collector: &SharedCollector) -> mlua::Result<Table> {
    install_library_guards(lua)?;
    let env = lua.create_table()?;
    let globals = lua.globals();

    for name in SAFE_GLOBALS.iter().chain(SAFE_LIBRARIES) {
        let value: Value = globals.get(*name)?;
        if !value.is_nil() {
            env.set(*name, value)?;
        }
    }

    env.set("setmetatable", guarded_setmetatable(lua)?)?;

    let sdk = create_sdk(lua, collector)?;
    for name in ["parameter", "factor", "define_strategy", "logger"] {
        env.set(name, sdk.get::<Value>(name)?)?;
    }
    env.set("print", lua.create_function(|_, _: mlua::MultiValue| Ok(()))?)?;

    let capabilities = CapabilityTable::new().with(SDK_MODULE, sdk);
    env.set("require", capabilities.into_require(lua)?)?;

    Ok(env)
}

enum ContractCheck {
    Violation(String),
    Lua(mlua::Error),
}

fn check_contract(export: &Value) -> Result<(), ContractCheck> {
    let table = match export {
        Value::Table(table) => table,
        Value::Nil => {
            return Err(ContractCheck::Violation(
                "腳本沒有匯出值，請回傳或以 define_strategy 註冊策略".to_string(),
            ))
        }
        other => {
            return Err(ContractCheck::Violation(format!(
                "匯出值必須是表，實際為 {}",
                other.type_name()
            )))
        }
    };

    match table.get::<Value>("run").map_err(ContractCheck::Lua)? {
        Value::Function(_) => Ok(()),
        Value::Nil => Err(ContractCheck::Violation("匯出值缺少 run 函數".to_string())),
        other => Err(ContractCheck::Violation(format!(
            "run 必須是函數，實際為 {}",
            other.type_name()
        ))),
    }
}

fn classify_error(err: mlua::Error, timed_out: bool, limits: &SandboxConfig) -> SandboxError {
    if timed_out {
        return SandboxError::Timeout(limits.timeout_ms);
    }
    if let Some(inner) = find_sandbox_error(&err) {
        return inner.clone();
    }
    match err {
        mlua::Error::MemoryError(msg) => SandboxError::Runtime(format!("記憶體超出上限: {}", msg)),
        other => SandboxError::Runtime(lua_error_message(&other)),
    }
}

// 由宣告 API 拋出的錯誤會被包在回呼錯誤之中
fn find_sandbox_error(err: &mlua::Error) -> Option<&SandboxError> {
    match err {
        mlua::Error::ExternalError(inner) => inner.downcast_ref::<SandboxError>(),
        mlua::Error::CallbackError { cause, .. } => find_sandbox_error(cause),
        mlua::Error::WithContext { cause, .. } => find_sandbox_error(cause),
        _ => None,
    }
}

fn lua_error_message(err: &mlua::Error) -> String {
    match err {
        mlua::Error::RuntimeError(msg) => msg.clone(),
        mlua::Error::CallbackError { cause, .. } => lua_error_message(cause),
        mlua::Error::WithContext { cause, .. } => lua_error_message(cause),
        other => other.to_string(),
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("沙箱執行緒 panic: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("沙箱執行緒 panic: {}", s)
    } else {
        "沙箱執行緒 panic".to_string()
    }
}
