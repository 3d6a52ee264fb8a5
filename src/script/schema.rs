use std::collections::HashSet;

use crate::script::error::{SandboxError, SandboxResult};
use crate::script::field::{FieldCategory, FieldDescriptor, ScriptSchema};

/// 檢查參數與因子各自的鍵唯一性
///
/// 兩個分類的鍵空間互相獨立，同一個鍵可以同時出現在參數與因子中。
pub fn validate(parameters: &[FieldDescriptor], factors: &[FieldDescriptor]) -> SandboxResult<()> {
    ensure_unique_keys(parameters, FieldCategory::Parameter)?;
    ensure_unique_keys(factors, FieldCategory::Factor)?;
    Ok(())
}

/// 驗證整份結構
pub fn validate_schema(schema: &ScriptSchema) -> SandboxResult<()> {
    validate(&schema.parameters, &schema.factors)
}

fn ensure_unique_keys(fields: &[FieldDescriptor], category: FieldCategory) -> SandboxResult<()> {
    let mut seen = HashSet::with_capacity(fields.len());
    for field in fields {
        if !seen.insert(field.key.as_str()) {
            return Err(SandboxError::DuplicateKey {
                category: category.as_str().to_string(),
                key: field.key.clone(),
            });
        }
    }
    Ok(())
}
