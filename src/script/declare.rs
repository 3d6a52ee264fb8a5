//! 宣告 API
//!
//! 提供給腳本的唯一能力：`parameter.*` 與 `factor.*` 建構器、
//! 註冊入口 `define_strategy` 以及空操作的 `logger`。
//! 所有宣告寫入單次執行專屬的收集器，執行結束後由宿主讀出。

use mlua::{DeserializeOptions, Function, Lua, LuaSerdeExt, MultiValue, Result as LuaResult, Table, Value};
use serde_json::{Map, Value as JsonValue};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::script::error::SandboxError;
use crate::script::field::{FieldCategory, FieldDescriptor};
use crate::script::normalizer::normalize;

/// 白名單中唯一可引入的模組名稱
pub const SDK_MODULE: &str = "strategy_sdk";

/// 參數建構器支援的類型
pub const PARAMETER_TYPES: &[&str] = &["string", "number", "boolean", "enum"];

/// 因子建構器支援的類型
pub const FACTOR_TYPES: &[&str] = &["string", "number", "boolean", "enum", "custom"];

/// `define_strategy` 陣列項目未指定類型時的預設值
const PARAMETER_ENTRY_TYPE: &str = "string";
const FACTOR_ENTRY_TYPE: &str = "custom";

/// 單次執行的宣告收集器
#[derive(Debug, Default)]
pub struct Collector {
    pub parameters: Vec<FieldDescriptor>,
    pub factors: Vec<FieldDescriptor>,
    /// 最後一次 `define_strategy` 註冊的值，非表的值留給匯出檢查拒絕
    pub registered: Option<Value>,
}

impl Collector {
    fn push(&mut self, category: FieldCategory, field: FieldDescriptor) {
        match category {
            FieldCategory::Parameter => self.parameters.push(field),
            FieldCategory::Factor => self.factors.push(field),
        }
    }

    fn replace(&mut self, category: FieldCategory, fields: Vec<FieldDescriptor>) {
        match category {
            FieldCategory::Parameter => self.parameters = fields,
            FieldCategory::Factor => self.factors = fields,
        }
    }
}

pub type SharedCollector = Rc<RefCell<Collector>>;

/// 能力表：允許引入的名稱到其唯一對應物件
///
/// 查表失敗一律拒絕，不做任何後備解析。
#[derive(Debug, Clone, Default)]
pub struct CapabilityTable {
    entries: HashMap<String, Table>,
}

impl CapabilityTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, module: Table) -> Self {
        self.entries.insert(name.to_string(), module);
        self
    }

    pub fn resolve(&self, name: &str) -> Result<Table, SandboxError> {
        self.entries
            .get(name)
            .cloned()
            .ok_or_else(|| SandboxError::DisallowedModule(name.to_string()))
    }

    /// 建立腳本可見的 `require` 函數
    pub fn into_require(self, lua: &Lua) -> LuaResult<Function> {
        lua.create_function(move |_, name: String| {
            self.resolve(&name).map_err(mlua::Error::external)
        })
    }
}

/// 建立宣告 API 模組表
pub fn create_sdk(lua: &Lua, collector: &SharedCollector) -> LuaResult<Table> {
    let sdk = lua.create_table()?;
    sdk.set(
        "parameter",
        builder_namespace(lua, collector, FieldCategory::Parameter, PARAMETER_TYPES)?,
    )?;
    sdk.set(
        "factor",
        builder_namespace(lua, collector, FieldCategory::Factor, FACTOR_TYPES)?,
    )?;
    sdk.set("define_strategy", define_strategy_fn(lua, collector)?)?;
    sdk.set("logger", noop_logger(lua)?)?;
    Ok(sdk)
}

fn builder_namespace(
    lua: &Lua,
    collector: &SharedCollector,
    category: FieldCategory,
    types: &[&'static str],
) -> LuaResult<Table> {
    let namespace = lua.create_table()?;
    for field_type in types {
        namespace.set(*field_type, builder_fn(lua, collector, category, field_type)?)?;
    }
    Ok(namespace)
}

// builder(key, options) -> 正規化後的欄位描述
fn builder_fn(
    lua: &Lua,
    collector: &SharedCollector,
    category: FieldCategory,
    field_type: &'static str,
) -> LuaResult<Function> {
    let collector = Rc::clone(collector);
    lua.create_function(move |lua, (key, options): (Value, Value)| {
        let mut raw = match options {
            Value::Table(_) => as_object(lua_to_json(lua, options)?),
            _ => Map::new(),
        };
        if !key.is_nil() {
            raw.insert("key".to_string(), lua_to_json(lua, key)?);
        }

        let field = normalize(&JsonValue::Object(raw), category, field_type)
            .map_err(mlua::Error::external)?;
        let declared = lua.to_value(&field)?;
        collector.borrow_mut().push(category, field);
        Ok(declared)
    })
}

// define_strategy(config) -> config
fn define_strategy_fn(lua: &Lua, collector: &SharedCollector) -> LuaResult<Function> {
    let collector = Rc::clone(collector);
    lua.create_function(move |lua, config: Value| {
        let table = match config {
            Value::Table(ref table) => table.clone(),
            other => {
                collector.borrow_mut().registered = Some(other.clone());
                return Ok(other);
            }
        };

        let parameters = normalize_entries(lua, &table, "parameters", FieldCategory::Parameter, PARAMETER_ENTRY_TYPE)?;
        let factors = normalize_entries(lua, &table, "factors", FieldCategory::Factor, FACTOR_ENTRY_TYPE)?;

        let mut collector = collector.borrow_mut();
        if let Some(parameters) = parameters {
            collector.replace(FieldCategory::Parameter, parameters);
        }
        if let Some(factors) = factors {
            collector.replace(FieldCategory::Factor, factors);
        }
        collector.registered = Some(config.clone());
        Ok(config)
    })
}

fn normalize_entries(
    lua: &Lua,
    config: &Table,
    name: &str,
    category: FieldCategory,
    default_type: &str,
) -> LuaResult<Option<Vec<FieldDescriptor>>> {
    let Some(entries) = config.get::<Option<Table>>(name)? else {
        return Ok(None);
    };

    let mut fields = Vec::new();
    for entry in entries.sequence_values::<Value>() {
        let raw = lua_to_json(lua, entry?)?;
        let field = normalize(&raw, category, default_type).map_err(mlua::Error::external)?;
        fields.push(field);
    }
    Ok(Some(fields))
}

fn noop_logger(lua: &Lua) -> LuaResult<Table> {
    let logger = lua.create_table()?;
    for level in ["debug", "info", "warn", "error", "log"] {
        logger.set(level, lua.create_function(|_, _: MultiValue| Ok(()))?)?;
    }
    Ok(logger)
}

/// Lua 值轉換為 JSON，函數等不支援的值會被略過
pub fn lua_to_json(lua: &Lua, value: Value) -> LuaResult<JsonValue> {
    lua.from_value_with(value, DeserializeOptions::new().deny_unsupported_types(false))
}

// 空的 Lua 表可能被解讀為陣列
fn as_object(value: JsonValue) -> Map<String, JsonValue> {
    match value {
        JsonValue::Object(map) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn setup() -> (Lua, SharedCollector, Table) {
        let lua = Lua::new();
        let collector = SharedCollector::default();
        let sdk = create_sdk(&lua, &collector).unwrap();
        (lua, collector, sdk)
    }

    #[test]
    fn test_builder_appends_normalized_field() {
        let (lua, collector, sdk) = setup();
        lua.globals().set("sdk", sdk).unwrap();

        let declared: Table = lua
            .load(r#"return sdk.parameter.number("window", { label = "Window", default = 20 })"#)
            .eval()
            .unwrap();

        assert_eq!(declared.get::<String>("component").unwrap(), "number");
        let collector = collector.borrow();
        assert_eq!(collector.parameters.len(), 1);
        assert_eq!(collector.parameters[0].key, "window");
        assert_eq!(collector.parameters[0].default_value, Some(json!(20)));
        assert!(collector.factors.is_empty());
    }

    #[test]
    fn test_define_strategy_replaces_collectors() {
        let (lua, collector, sdk) = setup();
        lua.globals().set("sdk", sdk).unwrap();

        lua.load(
            r#"
            sdk.parameter.string("dropped")
            sdk.factor.custom("kept")
            sdk.define_strategy({
                parameters = { { key = "p1" }, sdk.parameter.boolean("p2") },
                run = function() end,
            })
            "#,
        )
        .exec()
        .unwrap();

        let collector = collector.borrow();
        let keys: Vec<_> = collector.parameters.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["p1", "p2"]);
        assert_eq!(collector.parameters[0].field_type, "string");
        assert_eq!(collector.parameters[1].component, "switch");
        assert_eq!(collector.factors.len(), 1);
        assert!(collector.registered.is_some());
    }

    #[test]
    fn test_define_strategy_records_non_table_values() {
        let (lua, collector, sdk) = setup();
        lua.globals().set("sdk", sdk).unwrap();

        let returned: i64 = lua
            .load(r#"sdk.parameter.number("kept")
return sdk.define_strategy(42)"#)
            .eval()
            .unwrap();

        assert_eq!(returned, 42);
        let collector = collector.borrow();
        assert_matches!(collector.registered, Some(Value::Integer(42)));
        assert_eq!(collector.parameters.len(), 1);
    }

    #[test]
    fn test_capability_table_rejects_unknown_names() {
        let lua = Lua::new();
        let table = CapabilityTable::new().with(SDK_MODULE, lua.create_table().unwrap());

        assert!(table.resolve(SDK_MODULE).is_ok());
        assert_eq!(
            table.resolve("fs").unwrap_err(),
            SandboxError::DisallowedModule("fs".to_string())
        );
    }
}
