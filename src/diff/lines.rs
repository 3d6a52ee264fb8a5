use serde::{Deserialize, Serialize};

/// 差異片段類型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    Equal,
    Added,
    Removed,
}

/// 行差異片段，`value` 為以換行連接的一或多行
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSegment {
    #[serde(rename = "type")]
    pub kind: SegmentKind,
    pub value: String,
}

impl DiffSegment {
    pub fn new(kind: SegmentKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

/// 以最長公共子序列計算兩段文字的行差異
///
/// 相鄰同類型的片段會以換行合併。將 `equal` 與 `removed` 片段依序以換行連接可還原 `a`，
/// 將 `equal` 與 `added` 片段依序以換行連接可還原 `b`。
pub fn diff_lines(a: &str, b: &str) -> Vec<DiffSegment> {
    if a == b {
        return if a.is_empty() {
            Vec::new()
        } else {
            vec![DiffSegment::new(SegmentKind::Equal, a)]
        };
    }

    let a_lines: Vec<&str> = a.split('\n').collect();
    let b_lines: Vec<&str> = b.split('\n').collect();
    let (m, n) = (a_lines.len(), b_lines.len());

    // lcs[i][j] = a_lines[i..] 與 b_lines[j..] 的最長公共子序列長度
    let mut lcs = vec![vec![0usize; n + 1]; m + 1];
    for i in (0..m).rev() {
        for j in (0..n).rev() {
            lcs[i][j] = if a_lines[i] == b_lines[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut builder = SegmentBuilder::default();
    let (mut i, mut j) = (0, 0);
    while i < m && j < n {
        if a_lines[i] == b_lines[j] {
            builder.push(SegmentKind::Equal, a_lines[i]);
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            builder.push(SegmentKind::Removed, a_lines[i]);
            i += 1;
        } else {
            builder.push(SegmentKind::Added, b_lines[j]);
            j += 1;
        }
    }
    for line in &a_lines[i..] {
        builder.push(SegmentKind::Removed, line);
    }
    for line in &b_lines[j..] {
        builder.push(SegmentKind::Added, line);
    }

    builder.finish()
}

#[derive(Default)]
struct SegmentBuilder {
    segments: Vec<DiffSegment>,
}

impl SegmentBuilder {
    fn push(&mut self, kind: SegmentKind, line: &str) {
        match self.segments.last_mut() {
            Some(last) if last.kind == kind => {
                last.value.push('\n');
                last.value.push_str(line);
            }
            _ => self.segments.push(DiffSegment::new(kind, line)),
        }
    }

    fn finish(self) -> Vec<DiffSegment> {
        self.segments
    }
}
