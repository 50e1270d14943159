//! # 载荷校验
//!
//! 在任何网络调用之前规范化并检查 base64 图片载荷。纯函数，无副作用。

use crate::error::{RecognitionError, RecognitionResult};

/// 默认编码后载荷上限：4096 KiB
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 4096 * 1024;

/// 载荷校验器
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadValidator {
    max_bytes: usize,
}

impl Default for PayloadValidator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAYLOAD_BYTES)
    }
}

impl PayloadValidator {
    /// 以编码后字节上限创建校验器
    #[must_use]
    pub const fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    /// 上限（字节）
    #[must_use]
    pub const fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// 校验并返回规范化后的 base64 字符串
    ///
    /// 1. 去掉 `data:<mime>;base64,` 前缀
    /// 2. 按编码后长度检查上限
    /// 3. 检查字符集；含空白时清理后再检查一次
    pub fn validate(&self, input: &str) -> RecognitionResult<String> {
        let data = strip_data_uri(input)?;

        if data.len() > self.max_bytes {
            return Err(RecognitionError::PayloadTooLarge {
                size: data.len(),
                limit: self.max_bytes,
            });
        }

        if data.is_empty() {
            return Err(RecognitionError::InvalidEncoding("图片数据为空".to_string()));
        }

        if is_base64_alphabet(data) {
            return Ok(data.to_string());
        }

        let cleaned: String = data.chars().filter(|c| !c.is_whitespace()).collect();
        if cleaned.is_empty() || !is_base64_alphabet(&cleaned) {
            return Err(RecognitionError::InvalidEncoding(
                "包含非 base64 字符".to_string(),
            ));
        }
        Ok(cleaned)
    }
}

/// 解码后大小的估计值（字节），用于日志
#[must_use]
pub fn decoded_size_estimate(encoded: &str) -> usize {
    base64::decoded_len_estimate(encoded.len())
}

fn strip_data_uri(input: &str) -> RecognitionResult<&str> {
    let trimmed = input.trim_start();
    if !trimmed.starts_with("data:") {
        return Ok(input);
    }
    trimmed
        .split_once(',')
        .map(|(_, data)| data)
        .ok_or_else(|| RecognitionError::InvalidEncoding("data URI 缺少数据部分".to_string()))
}

fn is_base64_alphabet(data: &str) -> bool {
    data.bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'='))
}
