use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// 宣告分類：參數或因子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldCategory {
    Parameter,
    Factor,
}

impl FieldCategory {
    /// 分類在錯誤訊息與結構中使用的複數名稱
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldCategory::Parameter => "parameters",
            FieldCategory::Factor => "factors",
        }
    }

    /// 未明確宣告 required 時的預設值
    pub fn default_required(&self) -> bool {
        matches!(self, FieldCategory::Parameter)
    }
}

impl fmt::Display for FieldCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 列舉選項
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumOption {
    pub label: String,
    pub value: Value,
}

/// 欄位描述：一個已宣告的參數或因子的標準形狀
///
/// 比較採用衍生的 `PartialEq`，其中不透明的負載以 `serde_json::Value`
/// 比較，物件的鍵順序不影響結果。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    pub key: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub field_type: String,
    pub component: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_options: Option<Vec<EnumOption>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validator: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_props: Option<Value>,
}

/// 通用輸入元件，查表失敗時使用
pub const FALLBACK_COMPONENT: &str = "input";

/// 類型到 UI 元件的對照表
pub fn component_for_type(field_type: &str) -> Option<&'static str> {
    match field_type {
        "string" => Some("input"),
        "number" => Some("number"),
        "boolean" => Some("switch"),
        "enum" => Some("select"),
        _ => None,
    }
}

/// 一次腳本執行所收集到的完整宣告
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptSchema {
    pub parameters: Vec<FieldDescriptor>,
    pub factors: Vec<FieldDescriptor>,
}

impl ScriptSchema {
    pub fn new(parameters: Vec<FieldDescriptor>, factors: Vec<FieldDescriptor>) -> Self {
        Self { parameters, factors }
    }

    /// 取得指定分類的欄位
    pub fn fields(&self, category: FieldCategory) -> &[FieldDescriptor] {
        match category {
            FieldCategory::Parameter => &self.parameters,
            FieldCategory::Factor => &self.factors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_descriptor_serializes_with_camel_case_names() {
        let descriptor = FieldDescriptor {
            key: "window".to_string(),
            label: "Window".to_string(),
            description: None,
            field_type: "number".to_string(),
            component: "number".to_string(),
            default_value: Some(json!(20)),
            required: true,
            enum_options: None,
            validator: None,
            ui_props: Some(json!({"step": 1})),
        };

        let value = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(value["type"], json!("number"));
        assert_eq!(value["defaultValue"], json!(20));
        assert_eq!(value["uiProps"], json!({"step": 1}));
        assert!(value.get("description").is_none());
        assert!(value.get("enumOptions").is_none());
    }

    #[test]
    fn test_component_table() {
        assert_eq!(component_for_type("string"), Some("input"));
        assert_eq!(component_for_type("number"), Some("number"));
        assert_eq!(component_for_type("boolean"), Some("switch"));
        assert_eq!(component_for_type("enum"), Some("select"));
        assert_eq!(component_for_type("custom"), None);
    }

    #[test]
    fn test_category_defaults() {
        assert!(FieldCategory::Parameter.default_required());
        assert!(!FieldCategory::Factor.default_required());
        assert_eq!(FieldCategory::Factor.to_string(), "factors");
    }
}
