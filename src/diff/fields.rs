use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::script::field::FieldDescriptor;

/// 同一個鍵在兩個版本中的內容不同
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangedField {
    pub before: FieldDescriptor,
    pub after: FieldDescriptor,
}

/// 以 `key` 為索引的欄位差異
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldDiff {
    pub added: Vec<FieldDescriptor>,
    pub removed: Vec<FieldDescriptor>,
    pub changed: Vec<ChangedField>,
    pub unchanged: Vec<FieldDescriptor>,
}

impl FieldDiff {
    /// 是否有任何新增、刪除或修改
    pub fn has_changes(&self) -> bool {
        !(self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty())
    }
}

/// 比較兩組欄位描述
///
/// `after` 中的每個鍵歸入 added、changed 或 unchanged；`before` 中獨有的鍵歸入 removed。
/// 輸出順序分別跟隨 `after` 與 `before` 的宣告順序。
pub fn diff_field_array(before: &[FieldDescriptor], after: &[FieldDescriptor]) -> FieldDiff {
    let before_map: HashMap<&str, &FieldDescriptor> =
        before.iter().map(|f| (f.key.as_str(), f)).collect();
    let after_map: HashMap<&str, &FieldDescriptor> =
        after.iter().map(|f| (f.key.as_str(), f)).collect();

    let mut diff = FieldDiff::default();

    for (idx, field) in after.iter().enumerate() {
        // 重複的鍵只以最後一次出現為準
        if is_repeated(after, idx) {
            continue;
        }
        match before_map.get(field.key.as_str()) {
            None => diff.added.push(field.clone()),
            Some(previous) if *previous == field => diff.unchanged.push(field.clone()),
            Some(previous) => diff.changed.push(ChangedField {
                before: (*previous).clone(),
                after: field.clone(),
            }),
        }
    }

    for (idx, field) in before.iter().enumerate() {
        if is_repeated(before, idx) {
            continue;
        }
        if !after_map.contains_key(field.key.as_str()) {
            diff.removed.push(field.clone());
        }
    }

    diff
}

// 同一個鍵在後面還會再出現
fn is_repeated(fields: &[FieldDescriptor], idx: usize) -> bool {
    fields[idx + 1..].iter().any(|f| f.key == fields[idx].key)
}
