// diff.rs - 版本差異模組
//
// 提供程式碼的行差異與欄位描述的結構差異，兩者都是純函數。

pub mod fields;
pub mod lines;

pub use fields::{diff_field_array, ChangedField, FieldDiff};
pub use lines::{diff_lines, DiffSegment, SegmentKind};
