//! # 识别文本整理

/// 将识别片段整理成一段文本
///
/// 按行拼接后折叠连续空白为单个空格，并把中文弯引号统一为直引号。
#[must_use]
pub fn preprocess_text(fragments: &[String]) -> String {
    fragments
        .join("\n")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' => '"',
            '\u{2018}' | '\u{2019}' => '\'',
            other => other,
        })
        .collect()
}
