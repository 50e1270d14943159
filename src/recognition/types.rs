//! # 识别类型定义

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::RecognitionError;

/// 识别类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum RecognitionType {
    /// 通用文字识别（标准版）
    #[default]
    General,
    /// 通用文字识别（高精度版）
    Accurate,
    /// 手写文字识别
    Handwriting,
    /// 试卷分析与识别
    ExamPaper,
    /// 公式识别
    Formula,
    /// 表格文字识别
    Table,
    /// 数字识别
    Number,
}

impl RecognitionType {
    /// 所有识别类型
    pub const ALL: [Self; 7] = [
        Self::General,
        Self::Accurate,
        Self::Handwriting,
        Self::ExamPaper,
        Self::Formula,
        Self::Table,
        Self::Number,
    ];

    /// 逻辑名称
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Accurate => "accurate",
            Self::Handwriting => "handwriting",
            Self::ExamPaper => "exam_paper",
            Self::Formula => "formula",
            Self::Table => "table",
            Self::Number => "number",
        }
    }

    /// 服务商接口路径（相对于识别基础地址）
    #[must_use]
    pub const fn endpoint_path(self) -> &'static str {
        match self {
            Self::General => "general_basic",
            Self::Accurate => "accurate_basic",
            Self::Handwriting => "handwriting",
            Self::ExamPaper => "education/exam",
            Self::Formula => "formula",
            Self::Table => "table",
            Self::Number => "numbers",
        }
    }
}

impl fmt::Display for RecognitionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecognitionType {
    type Err = RecognitionError;

    /// 接受逻辑名称和服务商接口名，大小写不敏感
    fn from_str(selector: &str) -> Result<Self, Self::Err> {
        match selector.trim().to_ascii_lowercase().as_str() {
            "general" | "general_basic" => Ok(Self::General),
            "accurate" | "accurate_basic" => Ok(Self::Accurate),
            "handwriting" => Ok(Self::Handwriting),
            "exam_paper" | "exam" | "education/exam" => Ok(Self::ExamPaper),
            "formula" => Ok(Self::Formula),
            "table" => Ok(Self::Table),
            "number" | "numbers" => Ok(Self::Number),
            _ => Err(RecognitionError::UnsupportedRecognitionType(
                selector.to_string(),
            )),
        }
    }
}

impl TryFrom<String> for RecognitionType {
    type Error = RecognitionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// 单次识别请求
///
/// 重试时以同一载荷和类型、新的令牌构造新请求。
#[derive(Clone, PartialEq, Eq)]
pub struct RecognitionRequest {
    /// 规范化后的 base64 载荷
    pub payload: Arc<str>,
    /// 识别类型
    pub recognition_type: RecognitionType,
    /// 本次尝试使用的令牌
    pub token: String,
}

impl RecognitionRequest {
    /// 创建请求
    #[must_use]
    pub fn new(payload: Arc<str>, recognition_type: RecognitionType, token: impl Into<String>) -> Self {
        Self {
            payload,
            recognition_type,
            token: token.into(),
        }
    }
}

impl fmt::Debug for RecognitionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecognitionRequest")
            .field("payload_len", &self.payload.len())
            .field("recognition_type", &self.recognition_type)
            .field("token", &crate::logging::mask_secret(&self.token, 10))
            .finish()
    }
}

/// 识别成功结果
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Recognition {
    /// 识别出的文字片段，保持服务商返回顺序
    pub fragments: Vec<String>,
    /// 片段数量
    pub count: usize,
}

impl Recognition {
    /// 以片段列表创建结果，数量取列表长度
    #[must_use]
    pub fn new(fragments: Vec<String>) -> Self {
        let count = fragments.len();
        Self { fragments, count }
    }
}

/// 服务商返回的结构化失败
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderFailure {
    /// 服务商错误码
    pub code: i64,
    /// 服务商错误信息
    pub message: String,
}

impl From<ProviderFailure> for RecognitionError {
    fn from(failure: ProviderFailure) -> Self {
        Self::ProviderDomainError {
            code: failure.code,
            message: failure.message,
        }
    }
}

/// 单次分发的结果：成功或服务商业务失败
///
/// 传输层失败不在此表示，而是以 [`RecognitionError`] 返回。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// 识别成功
    Success(Recognition),
    /// 服务商返回错误码
    Failure(ProviderFailure),
}
