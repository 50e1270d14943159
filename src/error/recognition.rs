//! # 识别流水线错误
//!
//! 封闭的错误集合，跨出流水线边界的失败都属于其中一种。

use axum::http::StatusCode;
use thiserror::Error;

/// 流水线错误类型
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecognitionError {
    /// 编码后载荷超过上限
    #[error("图片大小超过限制: {size} 字节 (上限 {limit} 字节)")]
    PayloadTooLarge { size: usize, limit: usize },

    /// 去除空白后仍不是合法 base64
    #[error("Base64数据格式无效: {0}")]
    InvalidEncoding(String),

    /// 未知的识别类型
    #[error("不支持的识别类型: {0}")]
    UnsupportedRecognitionType(String),

    /// 令牌交换失败（传输或协议层）
    #[error("获取访问令牌失败: {0}")]
    CredentialExchangeFailed(String),

    /// 识别请求超时
    #[error("识别请求超时 ({timeout_seconds}s)")]
    UpstreamTimeout { timeout_seconds: u64 },

    /// 识别请求传输失败（非超时）
    #[error("识别服务不可用: {0}")]
    UpstreamUnavailable(String),

    /// 服务商响应无法解析
    #[error("识别服务响应无效: {0}")]
    InvalidProviderResponse(String),

    /// 服务商返回的业务错误
    #[error("识别服务返回错误 {code}: {message}")]
    ProviderDomainError { code: i64, message: String },

    /// 重试发出前调用方已取消
    #[error("识别请求已取消")]
    Cancelled,
}

impl RecognitionError {
    /// 机器可读错误代码，用于 HTTP 错误响应
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::PayloadTooLarge { .. } => "IMAGE_TOO_LARGE",
            Self::InvalidEncoding(_) => "INVALID_BASE64",
            Self::UnsupportedRecognitionType(_) => "UNSUPPORTED_OCR_TYPE",
            Self::CredentialExchangeFailed(_) => "TOKEN_ERROR",
            Self::UpstreamTimeout { .. } => "UPSTREAM_TIMEOUT",
            Self::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            Self::InvalidProviderResponse(_) => "INVALID_UPSTREAM_RESPONSE",
            Self::ProviderDomainError { .. } => "OCR_ERROR",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// 对外返回的 HTTP 状态码
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::PayloadTooLarge { .. }
            | Self::InvalidEncoding(_)
            | Self::UnsupportedRecognitionType(_) => StatusCode::BAD_REQUEST,
            Self::CredentialExchangeFailed(_)
            | Self::UpstreamUnavailable(_)
            | Self::InvalidProviderResponse(_)
            | Self::ProviderDomainError { .. } => StatusCode::BAD_GATEWAY,
            Self::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// 服务商错误码（仅业务错误）
    #[must_use]
    pub const fn provider_code(&self) -> Option<i64> {
        match self {
            Self::ProviderDomainError { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// 是否在发起网络请求前即被拒绝
    #[must_use]
    pub const fn is_local(&self) -> bool {
        matches!(
            self,
            Self::PayloadTooLarge { .. }
                | Self::InvalidEncoding(_)
                | Self::UnsupportedRecognitionType(_)
        )
    }

    /// 错误分类
    #[must_use]
    pub const fn category(&self) -> super::ErrorCategory {
        if self.is_local() {
            super::ErrorCategory::Client
        } else {
            super::ErrorCategory::Server
        }
    }
}
