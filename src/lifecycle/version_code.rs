use chrono::NaiveDate;
use std::collections::HashSet;

/// 版本代碼的日期格式
const DATE_FORMAT: &str = "%Y%m%d";

/// 產生 `v{YYYYMMDD}.{n}` 形式的版本代碼，`n` 取第一個未被使用的正整數
///
/// 對固定的日期，每次把結果加回既有集合後再次呼叫，後綴會嚴格遞增。
pub fn generate_version_code<I, S>(existing: I, reference_date: NaiveDate) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let base = format!("v{}", reference_date.format(DATE_FORMAT));
    let taken: HashSet<String> = existing
        .into_iter()
        .map(|code| code.as_ref().to_string())
        .collect();

    (1u32..)
        .map(|n| format!("{}.{}", base, n))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| base.clone())
}

/// 解析自動產生的版本代碼，回傳日期與序號；手動命名的代碼回傳 `None`
pub fn parse_version_code(code: &str) -> Option<(NaiveDate, u32)> {
    let rest = code.strip_prefix('v')?;
    let (date, seq) = rest.split_once('.')?;
    if date.len() != 8 {
        return None;
    }
    let date = NaiveDate::parse_from_str(date, DATE_FORMAT).ok()?;
    let seq = seq.parse::<u32>().ok().filter(|n| *n >= 1)?;
    Some((date, seq))
}
