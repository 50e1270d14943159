//! # 请求处理器

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{OriginalUri, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::AppState;
use super::response;
use crate::error::{ErrorCategory, RecognitionError};
use crate::logging::{LogComponent, LogStage};
use crate::recognition::{RecognitionType, WordsItem, preprocess_text};
use crate::{lerror, linfo, lwarn};

/// 所有可用的接口路径
pub const AVAILABLE_ENDPOINTS: [&str; 4] = ["/", "/api/test", "/api/token", "/api/ocr"];

/// `POST /api/ocr` 请求体
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OcrRequest {
    /// base64 图片，可带 data URI 前缀
    #[serde(default)]
    pub image: Option<String>,
    /// 识别类型，缺省为通用识别
    #[serde(default)]
    pub ocr_type: Option<String>,
}

/// `POST /api/ocr` 成功响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrResponse {
    pub words_result: Vec<WordsItem>,
    pub words_result_num: usize,
    /// 整理后的全文
    pub text: String,
}

/// `POST /api/token` 成功响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// 剩余有效秒数
    pub expires_in: i64,
}

/// 服务信息
pub async fn root_handler() -> Response {
    response::success(serde_json::json!({
        "status": "running",
        "message": "服务器正在运行",
        "endpoints": {
            "test": "/api/test",
            "token": "/api/token",
            "ocr": "/api/ocr"
        }
    }))
}

/// 连通性测试
pub async fn test_handler(State(state): State<AppState>) -> Response {
    let client_id_prefix: String = state.config.provider.client_id.chars().take(8).collect();
    response::success(serde_json::json!({
        "status": "ok",
        "message": "服务器正在运行",
        "time": Utc::now().to_rfc3339(),
        "config": {
            "port": state.config.server.port,
            "client_id_prefix": client_id_prefix
        }
    }))
}

/// 强制刷新并返回访问令牌
pub async fn token_handler(State(state): State<AppState>) -> Response {
    linfo!(
        "token",
        LogStage::TokenCache,
        LogComponent::Handler,
        "token_request",
        "收到访问令牌请求，强制刷新"
    );

    match state.pipeline.token_cache().get_token(true).await {
        Ok(token) => response::success(TokenResponse {
            access_token: token.value().to_string(),
            expires_in: token.remaining_seconds(Utc::now()),
        }),
        Err(e) => {
            lwarn!(
                "token",
                LogStage::TokenCache,
                LogComponent::Handler,
                "token_request_failed",
                &format!("访问令牌请求失败: {e}")
            );
            (
                e.status_code(),
                Json(serde_json::json!({
                    "error": e.code(),
                    "message": e.to_string()
                })),
            )
                .into_response()
        }
    }
}

/// 识别代理
pub async fn ocr_handler(
    State(state): State<AppState>,
    body: Result<Json<OcrRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return response::error(
                StatusCode::BAD_REQUEST,
                "INVALID_REQUEST",
                &rejection.body_text(),
            );
        }
    };

    let Some(image) = request.image.filter(|image| !image.is_empty()) else {
        return response::error(StatusCode::BAD_REQUEST, "MISSING_IMAGE", "缺少图片数据");
    };

    let recognition_type = match request.ocr_type.as_deref() {
        None => RecognitionType::default(),
        Some(selector) => match selector.parse::<RecognitionType>() {
            Ok(kind) => kind,
            Err(e) => return response::recognition_error(e),
        },
    };

    linfo!(
        "ocr",
        LogStage::Dispatch,
        LogComponent::Handler,
        "ocr_request",
        &format!(
            "收到识别请求: 类型 {recognition_type}, 载荷 {} KB",
            image.len() / 1024
        )
    );

    let cancel = state.shutdown.child_token();
    match state
        .pipeline
        .recognize_with_retry(&image, recognition_type, &cancel)
        .await
    {
        Ok(recognition) => {
            let text = preprocess_text(&recognition.fragments);
            response::success(OcrResponse {
                words_result_num: recognition.count,
                words_result: recognition
                    .fragments
                    .into_iter()
                    .map(|words| WordsItem { words })
                    .collect(),
                text,
            })
        }
        Err(e) => {
            log_failure(&e);
            response::recognition_error(e)
        }
    }
}

fn log_failure(error: &RecognitionError) {
    let message = match error.provider_code() {
        Some(code) => format!("识别请求失败 [{}] 服务商错误码 {code}: {error}", error.code()),
        None => format!("识别请求失败 [{}]: {error}", error.code()),
    };
    match error.category() {
        ErrorCategory::Client => lwarn!(
            "ocr",
            LogStage::Response,
            LogComponent::Handler,
            "ocr_request_rejected",
            &message
        ),
        ErrorCategory::Server => lerror!(
            "ocr",
            LogStage::Response,
            LogComponent::Handler,
            "ocr_request_failed",
            &message
        ),
    }
}

/// 未知路径
pub async fn not_found_handler(OriginalUri(uri): OriginalUri) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "error": "Not Found",
            "message": format!("路径 {} 不存在", uri.path()),
            "available_endpoints": AVAILABLE_ENDPOINTS
        })),
    )
        .into_response()
}
