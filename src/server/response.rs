//! # API 响应结构
//!
//! 识别接口的成功体直接返回识别结果；失败统一为
//! `{success:false, error:{code,message}, error_code?, timestamp}`。

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, RecognitionError};

/// # 标准错误信息
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

/// # 标准错误响应
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorInfo,
    /// 服务商错误码，仅服务商业务失败时存在
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i64>,
    pub timestamp: DateTime<Utc>,
}

/// # API响应枚举
#[derive(Debug)]
pub enum ApiResponse<T: Serialize> {
    /// 200，原样序列化数据
    Success(T),
    /// 指定状态码与错误码
    Error(StatusCode, String, String),
    /// 应用错误，状态码与错误码由错误类型决定
    AppError(GatewayError),
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        match self {
            Self::Success(data) => (StatusCode::OK, Json(data)).into_response(),
            Self::Error(status, code, message) => {
                error_response(status, code, message, None).into_response()
            }
            Self::AppError(error) => {
                let (status, code) = error.to_http_response_parts();
                let provider_code = match &error {
                    GatewayError::Recognition(err) => err.provider_code(),
                    _ => None,
                };
                error_response(status, code.to_string(), error.to_string(), provider_code)
                    .into_response()
            }
        }
    }
}

impl<T: Serialize> From<RecognitionError> for ApiResponse<T> {
    fn from(error: RecognitionError) -> Self {
        Self::AppError(error.into())
    }
}

fn error_response(
    status: StatusCode,
    code: String,
    message: String,
    error_code: Option<i64>,
) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            success: false,
            error: ErrorInfo { code, message },
            error_code,
            timestamp: Utc::now(),
        }),
    )
}

/// # 便捷函数：成功响应
pub fn success<T: Serialize>(data: T) -> Response {
    ApiResponse::Success(data).into_response()
}

/// # 便捷函数：HTTP错误响应
pub fn error(status: StatusCode, code: &str, message: &str) -> Response {
    ApiResponse::<()>::Error(status, code.to_string(), message.to_string()).into_response()
}

/// # 便捷函数：识别错误响应
pub fn recognition_error(err: RecognitionError) -> Response {
    ApiResponse::<()>::from(err).into_response()
}
