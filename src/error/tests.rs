//! # 错误处理测试

use crate::error::{Context, ErrorCategory, GatewayError, RecognitionError};
use axum::http::StatusCode;
use std::error::Error;

#[test]
fn test_config_error_creation() {
    let err = GatewayError::config("测试配置错误");
    assert!(matches!(err, GatewayError::Config { .. }));
    assert_eq!(err.to_string(), "配置错误: 测试配置错误");
}

#[test]
fn test_config_error_with_source() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "文件不存在");
    let err = GatewayError::config_with_source("配置文件加载失败", io_err);

    assert!(err.to_string().contains("配置错误: 配置文件加载失败"));
    assert!(err.source().is_some());
}

#[test]
fn test_context_trait_wraps_source() {
    let result: Result<(), std::io::Error> = Err(std::io::Error::new(
        std::io::ErrorKind::PermissionDenied,
        "权限不足",
    ));

    let err = result.context("读取配置文件失败").unwrap_err();
    assert!(matches!(err, GatewayError::Config { .. }));
    assert_eq!(err.to_string(), "配置错误: 读取配置文件失败");
    assert!(err.source().unwrap().to_string().contains("权限不足"));
}

#[test]
fn test_auto_conversion_from_toml_error() {
    let toml_err = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
    let err: GatewayError = toml_err.into();

    assert!(matches!(err, GatewayError::Config { .. }));
    assert!(err.to_string().contains("TOML解析失败"));
}

#[test]
fn test_recognition_error_is_transparent() {
    let err: GatewayError = RecognitionError::ProviderDomainError {
        code: 282_000,
        message: "internal error".to_string(),
    }
    .into();

    assert_eq!(err.to_string(), "识别服务返回错误 282000: internal error");
    assert_eq!(
        err.to_http_response_parts(),
        (StatusCode::BAD_GATEWAY, "OCR_ERROR")
    );
}

#[test]
fn test_local_errors_map_to_bad_request() {
    let cases = [
        RecognitionError::PayloadTooLarge {
            size: 10,
            limit: 5,
        },
        RecognitionError::InvalidEncoding("bad".to_string()),
        RecognitionError::UnsupportedRecognitionType("poem".to_string()),
    ];

    for err in cases {
        assert!(err.is_local());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.category(), ErrorCategory::Client);
        assert_eq!(err.provider_code(), None);
    }
}

#[test]
fn test_remote_error_codes() {
    assert_eq!(
        RecognitionError::UpstreamTimeout { timeout_seconds: 30 }.status_code(),
        StatusCode::GATEWAY_TIMEOUT
    );
    assert_eq!(
        RecognitionError::CredentialExchangeFailed("invalid_client".to_string()).code(),
        "TOKEN_ERROR"
    );
    let domain = RecognitionError::ProviderDomainError {
        code: 110,
        message: "Access token invalid or no longer valid".to_string(),
    };
    assert_eq!(domain.provider_code(), Some(110));
    assert_eq!(domain.category(), ErrorCategory::Server);
}
