//! 欄位正規化
//!
//! 將腳本傳入的鬆散宣告轉換為標準的 [`FieldDescriptor`]。純函數，無 I/O。

use serde_json::{Map, Value};

use crate::script::error::{SandboxError, SandboxResult};
use crate::script::field::{
    component_for_type, EnumOption, FieldCategory, FieldDescriptor, FALLBACK_COMPONENT,
};

/// 正規化一筆原始宣告
///
/// `default_type` 是由呼叫的宣告建構器所隱含的類型。
pub fn normalize(
    raw: &Value,
    category: FieldCategory,
    default_type: &str,
) -> SandboxResult<FieldDescriptor> {
    let empty = Map::new();
    let raw = raw.as_object().unwrap_or(&empty);

    let key = first_present(raw, &["key", "id"])
        .and_then(scalar_to_string)
        .map(|k| k.trim().to_string())
        .unwrap_or_default();
    if key.is_empty() {
        return Err(SandboxError::Runtime("definition missing key".to_string()));
    }

    let label = raw
        .get("label")
        .and_then(display_text)
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| key.clone());

    let description = first_present(raw, &["desc", "description"])
        .and_then(Value::as_str)
        .map(str::to_string);

    let field_type = non_empty_str(raw.get("type"))
        .unwrap_or(default_type)
        .to_string();

    let component = match non_empty_str(raw.get("component")) {
        Some(component) => component.to_string(),
        None => component_for_type(&field_type)
            .or_else(|| component_for_type(default_type))
            .unwrap_or(FALLBACK_COMPONENT)
            .to_string(),
    };

    let enum_options = first_present(raw, &["enumOptions", "options", "choices"])
        .and_then(Value::as_array)
        .map(|entries| normalize_enum_options(entries))
        .filter(|options| !options.is_empty());

    let required = raw
        .get("required")
        .and_then(Value::as_bool)
        .unwrap_or_else(|| category.default_required());

    Ok(FieldDescriptor {
        key,
        label,
        description,
        field_type,
        component,
        default_value: first_present(raw, &["defaultValue", "default"]).cloned(),
        required,
        enum_options,
        validator: first_present(raw, &["validator"]).cloned(),
        ui_props: first_present(raw, &["uiProps"]).cloned(),
    })
}

/// 正規化列舉選項，接受純量或帶有 `value`/`key`/`label` 的物件
pub fn normalize_enum_options(entries: &[Value]) -> Vec<EnumOption> {
    entries
        .iter()
        .filter_map(|entry| match entry {
            Value::Null => None,
            Value::Object(obj) => {
                let value = first_present(obj, &["value", "key"]);
                let label = obj
                    .get("label")
                    .and_then(display_text)
                    .or_else(|| value.and_then(display_text))?;
                let value = value
                    .cloned()
                    .unwrap_or_else(|| Value::String(label.clone()));
                Some(EnumOption { label, value })
            }
            other => Some(EnumOption {
                label: display_text(other)?,
                value: other.clone(),
            }),
        })
        .collect()
}

// 依序取第一個存在且非 null 的欄位
fn first_present<'a>(obj: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .filter_map(|name| obj.get(*name))
        .find(|v| !v.is_null())
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

// 鍵只接受純量
fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

// 標籤文字：字串原樣輸出，其他值（包含陣列與物件）使用 JSON 文字
fn display_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn test_minimal_parameter_gets_defaults() {
        let field = normalize(&json!({"key": " window "}), FieldCategory::Parameter, "number").unwrap();

        assert_eq!(field.key, "window");
        assert_eq!(field.label, "window");
        assert_eq!(field.field_type, "number");
        assert_eq!(field.component, "number");
        assert!(field.required);
        assert!(field.description.is_none());
        assert!(field.enum_options.is_none());
    }

    #[test]
    fn test_factor_defaults_to_not_required() {
        let field = normalize(&json!({"id": "alpha"}), FieldCategory::Factor, "custom").unwrap();

        assert_eq!(field.key, "alpha");
        assert!(!field.required);
        assert_eq!(field.component, "input");
    }

    #[rstest]
    #[case(json!({}))]
    #[case(json!({"key": "   "}))]
    #[case(json!("not an object"))]
    fn test_missing_key_is_runtime_error(#[case] raw: Value) {
        let err = normalize(&raw, FieldCategory::Parameter, "string").unwrap_err();
        assert_matches!(err, SandboxError::Runtime(msg) if msg == "definition missing key");
    }

    #[test]
    fn test_explicit_values_override_defaults() {
        let raw = json!({
            "key": "mode",
            "label": "  Mode ",
            "desc": "trading mode",
            "type": "enum",
            "component": "radio",
            "required": false,
            "defaultValue": "fast",
            "validator": {"min": 1},
            "uiProps": {"width": 2}
        });
        let field = normalize(&raw, FieldCategory::Parameter, "string").unwrap();

        assert_eq!(field.label, "Mode");
        assert_eq!(field.description.as_deref(), Some("trading mode"));
        assert_eq!(field.field_type, "enum");
        assert_eq!(field.component, "radio");
        assert!(!field.required);
        assert_eq!(field.default_value, Some(json!("fast")));
        assert_eq!(field.validator, Some(json!({"min": 1})));
        assert_eq!(field.ui_props, Some(json!({"width": 2})));
    }

    #[test]
    fn test_unknown_type_falls_back_to_builder_component() {
        let raw = json!({"key": "k", "type": "percent"});
        let field = normalize(&raw, FieldCategory::Parameter, "number").unwrap();

        assert_eq!(field.field_type, "percent");
        assert_eq!(field.component, "number");
    }

    #[test]
    fn test_enum_options_from_heterogeneous_shapes() {
        let raw = json!({
            "key": "side",
            "choices": [
                "long",
                3,
                {"value": "short", "label": "Short"},
                {"key": "flat"},
                {"label": "Both"},
                {}
            ]
        });
        let field = normalize(&raw, FieldCategory::Parameter, "enum").unwrap();
        let options = field.enum_options.unwrap();

        assert_eq!(
            options,
            vec![
                EnumOption { label: "long".into(), value: json!("long") },
                EnumOption { label: "3".into(), value: json!(3) },
                EnumOption { label: "Short".into(), value: json!("short") },
                EnumOption { label: "flat".into(), value: json!("flat") },
                EnumOption { label: "Both".into(), value: json!("Both") },
            ]
        );
    }

    #[rstest]
    #[case(json!(7), "7")]
    #[case(json!(true), "true")]
    #[case(json!(["a", 1]), r#"["a",1]"#)]
    #[case(json!({"en": "Window"}), r#"{"en":"Window"}"#)]
    #[case(json!(" "), "k")]
    #[case(json!(null), "k")]
    fn test_non_string_labels_are_rendered(#[case] label: Value, #[case] expected: &str) {
        let field = normalize(&json!({"key": "k", "label": label}), FieldCategory::Parameter, "string").unwrap();
        assert_eq!(field.label, expected);
    }

    #[test]
    fn test_enum_options_with_composite_values_keep_a_label() {
        let raw = json!({
            "key": "range",
            "options": [
                {"value": {"min": 1}},
                {"value": [1, 2], "label": 12},
                [3, 4]
            ]
        });
        let options = normalize(&raw, FieldCategory::Parameter, "enum").unwrap().enum_options.unwrap();

        assert_eq!(
            options,
            vec![
                EnumOption { label: r#"{"min":1}"#.into(), value: json!({"min": 1}) },
                EnumOption { label: "12".into(), value: json!([1, 2]) },
                EnumOption { label: "[3,4]".into(), value: json!([3, 4]) },
            ]
        );
    }

    #[test]
    fn test_empty_enum_options_are_absent() {
        let field = normalize(&json!({"key": "k", "options": []}), FieldCategory::Parameter, "enum").unwrap();
        assert!(field.enum_options.is_none());
    }

    #[test]
    fn test_enum_options_precedence() {
        let raw = json!({"key": "k", "enumOptions": ["a"], "options": ["b"]});
        let field = normalize(&raw, FieldCategory::Parameter, "enum").unwrap();
        assert_eq!(field.enum_options.unwrap()[0].label, "a");
    }
}
