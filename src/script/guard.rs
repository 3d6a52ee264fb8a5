//! 沙箱函數防護
//!
//! 指令鉤子只在 Lua 位元組碼之間觸發：C 函數內部不會檢查期限，
//! `__gc` 終結器執行時 Lua 也會停用鉤子。這裡包裝可能長時間停留在
//! C 端的標準庫函數，並拒絕註冊終結器，讓每次執行都能在期限內結束。

use mlua::{Function, Lua, MultiValue, Table, Value};

/// 單次 C 端操作允許的估算步數
pub const MAX_NATIVE_STEPS: f64 = 1.0e7;

/// 會進行回溯比對的字串函數
const PATTERN_FUNCTIONS: &[&str] = &["find", "match", "gmatch", "gsub"];

/// 為 Lua 狀態中的 `string` 與 `table` 標準庫安裝防護
///
/// 直接替換標準庫表中的函數，字串方法呼叫（`s:match(...)`）也會經過防護。
pub fn install_library_guards(lua: &Lua) -> mlua::Result<()> {
    let globals = lua.globals();
    if let Some(string) = globals.get::<Option<Table>>("string")? {
        guard_patterns(lua, &string)?;
        guard_rep(lua, &string)?;
    }
    if let Some(table) = globals.get::<Option<Table>>("table")? {
        guard_move(lua, &table)?;
    }
    Ok(())
}

/// 不接受帶有 `__gc` 的中繼表的 `setmetatable`
///
/// 物件只在設定中繼表當下帶有 `__gc` 時才會被標記為需要終結，
/// 之後再補上的 `__gc` 不會生效。
pub fn guarded_setmetatable(lua: &Lua) -> mlua::Result<Function> {
    let original: Function = lua.globals().get("setmetatable")?;
    lua.create_function(move |_, (target, metatable): (Value, Value)| {
        if let Value::Table(metatable) = &metatable {
            if !metatable.raw_get::<Value>("__gc")?.is_nil() {
                return Err(mlua::Error::RuntimeError(
                    "沙箱內不允許設定 __gc 終結器".to_string(),
                ));
            }
        }
        original.call::<Value>((target, metatable))
    })
}

fn guard_patterns(lua: &Lua, string: &Table) -> mlua::Result<()> {
    for name in PATTERN_FUNCTIONS {
        let original: Function = string.get(*name)?;
        // string.find 的第四個參數為 true 時不使用模式
        let plain_index = (*name == "find").then_some(3);
        let guarded = lua.create_function(move |_, args: MultiValue| {
            let plain = plain_index
                .and_then(|index| args.get(index))
                .is_some_and(is_truthy);
            if !plain {
                if let (Some(subject), Some(pattern)) =
                    (args.get(0).and_then(text_of), args.get(1).and_then(text_of))
                {
                    check_pattern_cost(subject.len(), &pattern)?;
                }
            }
            original.call::<MultiValue>(args)
        })?;
        string.set(*name, guarded)?;
    }
    Ok(())
}

// 空字串重複極大次數時不配置記憶體，記憶體上限攔不住
fn guard_rep(lua: &Lua, string: &Table) -> mlua::Result<()> {
    let original: Function = string.get("rep")?;
    let guarded = lua.create_function(move |lua, args: MultiValue| {
        let unit = args.get(0).and_then(text_of).map(|s| s.len());
        let separator = args.get(2).and_then(text_of).map_or(0, |s| s.len());
        let count = args.get(1).and_then(integer_of);
        if let (Some(0), Some(_)) = (unit.map(|len| len + separator), count) {
            return Ok(MultiValue::from_iter([Value::String(lua.create_string("")?)]));
        }
        original.call::<MultiValue>(args)
    })?;
    string.set("rep", guarded)
}

// table.move 對空表搬移巨大區間時同樣不配置記憶體
fn guard_move(lua: &Lua, table: &Table) -> mlua::Result<()> {
    let original: Function = table.get("move")?;
    let guarded = lua.create_function(move |_, args: MultiValue| {
        let from = args.get(1).and_then(integer_of);
        let to = args.get(2).and_then(integer_of);
        if let (Some(from), Some(to)) = (from, to) {
            if to >= from {
                let span = (to as i128 - from as i128 + 1) as f64;
                if span > MAX_NATIVE_STEPS {
                    return Err(mlua::Error::RuntimeError(format!(
                        "table.move 區間過大: {} 個元素",
                        span
                    )));
                }
            }
        }
        original.call::<MultiValue>(args)
    })?;
    table.set("move", guarded)
}

/// 估算模式比對在最壞情況下的回溯步數
///
/// 每個重複量詞（`*` `+` `-`）、`%b` 與反向參照都可能讓比對在主體上多一層迴圈，
/// 再乘上每個起始位置；`?` 讓候選數加倍。估算只會高估。
pub fn pattern_cost(subject_len: usize, pattern: &[u8]) -> f64 {
    let (repeats, optionals) = count_quantifiers(pattern);
    let base = subject_len as f64 + 1.0;
    base.powi(repeats.saturating_add(1) as i32) * 2f64.powi(optionals as i32)
}

pub fn check_pattern_cost(subject_len: usize, pattern: &[u8]) -> mlua::Result<()> {
    let cost = pattern_cost(subject_len, pattern);
    if cost > MAX_NATIVE_STEPS {
        return Err(mlua::Error::RuntimeError(format!(
            "模式過於複雜: 主體 {} 位元組、估算 {:.0} 步超過上限",
            subject_len, cost
        )));
    }
    Ok(())
}

fn count_quantifiers(pattern: &[u8]) -> (u32, u32) {
    let mut repeats = 0u32;
    let mut optionals = 0u32;
    let mut i = 0;

    while i < pattern.len() {
        match pattern[i] {
            b'%' => match pattern.get(i + 1) {
                Some(b'b') => {
                    repeats += 1;
                    i += 4;
                }
                Some(c) => {
                    if c.is_ascii_digit() {
                        repeats += 1;
                    }
                    i += 2;
                }
                None => i += 1,
            },
            b'[' => i = skip_set(pattern, i),
            b'*' | b'+' | b'-' if i > 0 => {
                repeats += 1;
                i += 1;
            }
            b'?' if i > 0 => {
                optionals += 1;
                i += 1;
            }
            _ => i += 1,
        }
    }

    (repeats, optionals)
}

// 回傳字元集 `[...]` 之後的位置
fn skip_set(pattern: &[u8], start: usize) -> usize {
    let mut i = start + 1;
    if pattern.get(i) == Some(&b'^') {
        i += 1;
    }
    // 緊接的 `]` 是字元集成員
    if pattern.get(i) == Some(&b']') {
        i += 1;
    }
    while i < pattern.len() {
        match pattern[i] {
            b'%' => i += 2,
            b']' => return i + 1,
            _ => i += 1,
        }
    }
    i
}

// Lua 會把數字自動轉成字串，這裡以相同方式取得位元組
fn text_of(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::String(s) => Some(s.as_bytes().to_vec()),
        Value::Integer(n) => Some(n.to_string().into_bytes()),
        Value::Number(n) => Some(n.to_string().into_bytes()),
        _ => None,
    }
}

fn integer_of(value: &Value) -> Option<i64> {
    match value {
        Value::Integer(n) => Some(*n),
        Value::Number(n) if n.is_finite() => Some(*n as i64),
        _ => None,
    }
}

fn is_truthy(value: &Value) -> bool {
    !matches!(value, Value::Nil | Value::Boolean(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("abc", (0, 0))]
    #[case("^(%a+)_(%d+)$", (2, 0))]
    #[case("a-a-a-b", (3, 0))]
    #[case("%*%+%-", (0, 0))]
    #[case("[%w_*]+", (1, 0))]
    #[case("[]*]", (0, 0))]
    #[case("%b()", (1, 0))]
    #[case("(a)%1", (1, 0))]
    #[case("x?y?", (0, 2))]
    #[case("*a", (0, 0))]
    fn test_count_quantifiers(#[case] pattern: &str, #[case] expected: (u32, u32)) {
        assert_eq!(count_quantifiers(pattern.as_bytes()), expected);
    }

    #[test]
    fn test_backtracking_pattern_is_rejected() {
        let pattern = b"a-a-a-a-a-a-a-a-a-a-b";
        assert!(pattern_cost(30, pattern) > MAX_NATIVE_STEPS);
        assert!(check_pattern_cost(30, pattern).is_err());
    }

    #[test]
    fn test_ordinary_patterns_pass() {
        assert!(check_pattern_cost(64, b"^(%a+)_(%d+)$").is_ok());
        assert!(check_pattern_cost(2_000, b"%s+").is_ok());
        assert!(check_pattern_cost(0, b"").is_ok());
    }

    fn guarded_lua() -> Lua {
        let lua = Lua::new();
        install_library_guards(&lua).unwrap();
        lua.globals()
            .set("setmetatable", guarded_setmetatable(&lua).unwrap())
            .unwrap();
        lua
    }

    #[test]
    fn test_guarded_functions_keep_their_results() {
        let lua = guarded_lua();
        let (prefix, digits): (String, String) = lua
            .load(r#"return ("window_20"):match("^(%a+)_(%d+)$")"#)
            .eval()
            .unwrap();
        assert_eq!(prefix, "window");
        assert_eq!(digits, "20");

        let (replaced, count): (String, i64) = lua
            .load(r#"return string.gsub("a.b.c", "%.", "/")"#)
            .eval()
            .unwrap();
        assert_eq!(replaced, "a/b/c");
        assert_eq!(count, 2);

        let position: i64 = lua
            .load(r#"return string.find(string.rep("a", 30), "a-a-a-a-a-a-a-a-a-a-b", 1, true) or 0"#)
            .eval()
            .unwrap();
        assert_eq!(position, 0);
    }

    #[test]
    fn test_guarded_pattern_raises_before_matching() {
        let lua = guarded_lua();
        let err = lua
            .load(r#"return ("a"):rep(30):find("a-a-a-a-a-a-a-a-a-a-b")"#)
            .exec()
            .unwrap_err();
        assert!(err.to_string().contains("模式過於複雜"));
    }

    #[test]
    fn test_empty_rep_and_wide_move_are_bounded() {
        let lua = guarded_lua();
        let empty: String = lua.load(r#"return string.rep("", 1e15)"#).eval().unwrap();
        assert!(empty.is_empty());

        let err = lua
            .load("return table.move({}, 1, math.maxinteger, 2)")
            .exec()
            .unwrap_err();
        assert!(err.to_string().contains("table.move"));

        let moved: i64 = lua
            .load("local t = table.move({1, 2, 3}, 1, 3, 2) return t[4]")
            .eval()
            .unwrap();
        assert_eq!(moved, 3);
    }

    #[test]
    fn test_finalizer_metatable_is_rejected() {
        let lua = guarded_lua();
        let err = lua
            .load("setmetatable({}, { __gc = function() end })")
            .exec()
            .unwrap_err();
        assert!(err.to_string().contains("__gc"));

        lua.load("local t = setmetatable({}, { __index = { x = 1 } }) assert(t.x == 1)")
            .exec()
            .unwrap();
    }
}
