//! # 识别请求分发
//!
//! 将识别类型映射到服务商接口，发送表单请求并对响应分类：
//! 带 `error_code` 的响应是业务失败，传输层问题是错误。

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::types::{DispatchOutcome, ProviderFailure, Recognition, RecognitionRequest};
use crate::config::ProviderConfig;
use crate::error::{GatewayError, RecognitionError, RecognitionResult};
use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, lwarn};

/// 识别分发器
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecognitionDispatcher: Send + Sync {
    /// 发送一次识别请求
    async fn dispatch(&self, request: RecognitionRequest) -> RecognitionResult<DispatchOutcome>;
}

/// 识别结果中的单行文字
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordsItem {
    pub words: String,
}

/// 识别接口的原始响应
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderResponse {
    #[serde(default)]
    pub words_result: Option<Vec<WordsItem>>,
    #[serde(default)]
    pub words_result_num: Option<usize>,
    #[serde(default)]
    pub error_code: Option<i64>,
    #[serde(default)]
    pub error_msg: Option<String>,
}

impl ProviderResponse {
    /// 按 `error_code` 分类响应；错误码 0 视为成功
    #[must_use]
    pub fn into_outcome(self) -> DispatchOutcome {
        match self.error_code {
            Some(code) if code != 0 => DispatchOutcome::Failure(ProviderFailure {
                code,
                message: self.error_msg.unwrap_or_default(),
            }),
            _ => {
                let fragments: Vec<String> = self
                    .words_result
                    .unwrap_or_default()
                    .into_iter()
                    .map(|item| item.words)
                    .collect();
                let count = self.words_result_num.unwrap_or(fragments.len());
                DispatchOutcome::Success(Recognition { fragments, count })
            }
        }
    }
}

/// 基于 HTTP 的分发器
#[derive(Debug, Clone)]
pub struct HttpDispatcher {
    http_client: reqwest::Client,
    base_url: String,
    language_type: String,
    timeout: Duration,
}

impl HttpDispatcher {
    /// 根据服务商配置创建分发器
    pub fn from_config(config: &ProviderConfig) -> crate::error::Result<Self> {
        let timeout = config.recognition_timeout();
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ocr-gateway/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GatewayError::config_with_source("创建识别HTTP客户端失败", e))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            language_type: config.language_type.clone(),
            timeout,
        })
    }

    /// 请求地址（不含令牌）
    #[must_use]
    pub fn endpoint_url(&self, request: &RecognitionRequest) -> String {
        format!(
            "{}/{}",
            self.base_url,
            request.recognition_type.endpoint_path()
        )
    }

    fn transport_error(&self, err: &reqwest::Error) -> RecognitionError {
        if err.is_timeout() {
            RecognitionError::UpstreamTimeout {
                timeout_seconds: self.timeout.as_secs(),
            }
        } else {
            RecognitionError::UpstreamUnavailable(err.to_string())
        }
    }
}

#[async_trait]
impl RecognitionDispatcher for HttpDispatcher {
    async fn dispatch(&self, request: RecognitionRequest) -> RecognitionResult<DispatchOutcome> {
        let url = self.endpoint_url(&request);
        ldebug!(
            "dispatch",
            LogStage::Dispatch,
            LogComponent::Dispatcher,
            "dispatch_start",
            &format!(
                "发送识别请求: {url} (类型 {}, 载荷 {} KB)",
                request.recognition_type,
                request.payload.len() / 1024
            )
        );

        let form = [
            ("image", &*request.payload),
            ("language_type", self.language_type.as_str()),
        ];

        let response = self
            .http_client
            .post(&url)
            .query(&[("access_token", request.token.as_str())])
            .header(ACCEPT, "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let parsed: ProviderResponse = serde_json::from_str(&body).map_err(|e| {
            lwarn!(
                "dispatch",
                LogStage::Dispatch,
                LogComponent::Dispatcher,
                "dispatch_bad_body",
                &format!("识别响应无法解析: HTTP {status}, {e}")
            );
            RecognitionError::InvalidProviderResponse(format!("HTTP {status}: {e}"))
        })?;

        let outcome = parsed.into_outcome();
        match &outcome {
            DispatchOutcome::Success(recognition) => ldebug!(
                "dispatch",
                LogStage::Dispatch,
                LogComponent::Dispatcher,
                "dispatch_ok",
                &format!("识别成功，共 {} 条结果", recognition.count)
            ),
            DispatchOutcome::Failure(failure) => lwarn!(
                "dispatch",
                LogStage::Dispatch,
                LogComponent::Dispatcher,
                "dispatch_provider_error",
                &format!("识别服务返回错误 {}: {}", failure.code, failure.message)
            ),
        }
        Ok(outcome)
    }
}
