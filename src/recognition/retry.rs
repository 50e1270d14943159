//! # 识别流水线与重试协调
//!
//! 校验 → 取令牌 → 分发；首次尝试遇到认证失败码时强制刷新令牌并重试一次，
//! 重试的结果即最终结果。

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::dispatcher::{HttpDispatcher, RecognitionDispatcher};
use super::payload::{PayloadValidator, decoded_size_estimate};
use super::types::{DispatchOutcome, Recognition, RecognitionRequest, RecognitionType};
use crate::config::ProviderConfig;
use crate::credential::{ClientCredentialsAcquirer, TokenCache};
use crate::error::{RecognitionError, RecognitionResult};
use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, linfo, lwarn};

/// 首次尝试之后的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// 强制刷新令牌后重试一次
    RefreshAndRetry,
    /// 直接返回结果
    Surface,
}

/// 识别流水线
///
/// 库调用方和 HTTP 代理共用同一个实例，令牌缓存通过 `Arc` 共享。
pub struct RecognitionPipeline {
    validator: PayloadValidator,
    token_cache: Arc<TokenCache>,
    dispatcher: Arc<dyn RecognitionDispatcher>,
    auth_failure_codes: Vec<i64>,
}

impl std::fmt::Debug for RecognitionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecognitionPipeline")
            .field("validator", &self.validator)
            .field("token_cache", &self.token_cache)
            .field("auth_failure_codes", &self.auth_failure_codes)
            .finish_non_exhaustive()
    }
}

impl RecognitionPipeline {
    /// 组装流水线
    #[must_use]
    pub fn new(
        validator: PayloadValidator,
        token_cache: Arc<TokenCache>,
        dispatcher: Arc<dyn RecognitionDispatcher>,
        auth_failure_codes: Vec<i64>,
    ) -> Self {
        Self {
            validator,
            token_cache,
            dispatcher,
            auth_failure_codes,
        }
    }

    /// 根据服务商配置创建完整流水线（HTTP 获取器 + HTTP 分发器）
    pub fn from_config(config: &ProviderConfig) -> crate::error::Result<Self> {
        let acquirer = ClientCredentialsAcquirer::from_config(config)?;
        let dispatcher = HttpDispatcher::from_config(config)?;
        let token_cache = TokenCache::new(Arc::new(acquirer), config.refresh_buffer());

        Ok(Self::new(
            PayloadValidator::new(config.max_payload_bytes()),
            Arc::new(token_cache),
            Arc::new(dispatcher),
            config.auth_failure_codes.clone(),
        ))
    }

    /// 共享的令牌缓存
    #[must_use]
    pub const fn token_cache(&self) -> &Arc<TokenCache> {
        &self.token_cache
    }

    /// 认证失败码集合
    #[must_use]
    pub fn auth_failure_codes(&self) -> &[i64] {
        &self.auth_failure_codes
    }

    /// 识别一张图片（不可取消）
    pub async fn recognize(
        &self,
        payload: &str,
        recognition_type: RecognitionType,
    ) -> RecognitionResult<Recognition> {
        self.recognize_with_retry(payload, recognition_type, &CancellationToken::new())
            .await
    }

    /// 识别一张图片，认证失败时最多重试一次
    ///
    /// `cancel` 在进入重试阶段前后检查；已取消时不再发起强制刷新或重试请求。
    pub async fn recognize_with_retry(
        &self,
        payload: &str,
        recognition_type: RecognitionType,
        cancel: &CancellationToken,
    ) -> RecognitionResult<Recognition> {
        let request_id = Uuid::new_v4().to_string();

        let payload: Arc<str> = match self.validator.validate(payload) {
            Ok(normalized) => Arc::from(normalized),
            Err(e) => {
                lwarn!(
                    request_id,
                    LogStage::Validation,
                    LogComponent::Validator,
                    "payload_rejected",
                    &format!("图片载荷校验失败: {e}")
                );
                return Err(e);
            }
        };
        ldebug!(
            request_id,
            LogStage::Validation,
            LogComponent::Validator,
            "payload_accepted",
            &format!(
                "图片载荷校验通过: 编码 {} 字节, 解码约 {} 字节, 类型 {recognition_type}",
                payload.len(),
                decoded_size_estimate(&payload)
            )
        );

        let token = self.token_cache.get_token(false).await?;
        let first = self
            .dispatcher
            .dispatch(RecognitionRequest::new(
                Arc::clone(&payload),
                recognition_type,
                token.value(),
            ))
            .await?;

        match self.decide(&first) {
            RetryDecision::Surface => return Self::finish(&request_id, first),
            RetryDecision::RefreshAndRetry => {}
        }

        if cancel.is_cancelled() {
            return Err(Self::cancelled(&request_id));
        }

        linfo!(
            request_id,
            LogStage::Retry,
            LogComponent::RetryCoordinator,
            "auth_failure_retry",
            "令牌被服务商拒绝，强制刷新后重试"
        );

        let token = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Self::cancelled(&request_id)),
            refreshed = self.token_cache.get_token(true) => refreshed?,
        };

        if cancel.is_cancelled() {
            return Err(Self::cancelled(&request_id));
        }

        let retried = self
            .dispatcher
            .dispatch(RecognitionRequest::new(payload, recognition_type, token.value()))
            .await?;

        Self::finish(&request_id, retried)
    }

    /// 根据首次尝试的结果决定是否重试
    #[must_use]
    pub fn decide(&self, outcome: &DispatchOutcome) -> RetryDecision {
        match outcome {
            DispatchOutcome::Success(_) => RetryDecision::Surface,
            DispatchOutcome::Failure(failure) if self.auth_failure_codes.contains(&failure.code) => {
                RetryDecision::RefreshAndRetry
            }
            DispatchOutcome::Failure(_) => RetryDecision::Surface,
        }
    }

    fn finish(request_id: &str, outcome: DispatchOutcome) -> RecognitionResult<Recognition> {
        match outcome {
            DispatchOutcome::Success(recognition) => {
                ldebug!(
                    request_id,
                    LogStage::Response,
                    LogComponent::RetryCoordinator,
                    "recognition_done",
                    &format!("识别完成，共 {} 条结果", recognition.count)
                );
                Ok(recognition)
            }
            DispatchOutcome::Failure(failure) => Err(failure.into()),
        }
    }

    fn cancelled(request_id: &str) -> RecognitionError {
        lwarn!(
            request_id,
            LogStage::Retry,
            LogComponent::RetryCoordinator,
            "retry_cancelled",
            "调用已取消，放弃重试"
        );
        RecognitionError::Cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::{AccessToken, MockTokenAcquirer};
    use crate::recognition::dispatcher::MockRecognitionDispatcher;
    use crate::recognition::types::ProviderFailure;
    use chrono::Utc;
    use mockall::Sequence;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    const PAYLOAD: &str = "QUJD";

    fn token(value: &str) -> AccessToken {
        AccessToken::from_expires_in(value, 2_592_000, Utc::now()).unwrap()
    }

    fn failure(code: i64) -> DispatchOutcome {
        DispatchOutcome::Failure(ProviderFailure {
            code,
            message: format!("provider error {code}"),
        })
    }

    fn success(words: &[&str]) -> DispatchOutcome {
        DispatchOutcome::Success(Recognition::new(
            words.iter().map(ToString::to_string).collect(),
        ))
    }

    fn pipeline(acquirer: MockTokenAcquirer, dispatcher: MockRecognitionDispatcher) -> RecognitionPipeline {
        RecognitionPipeline::new(
            PayloadValidator::default(),
            Arc::new(TokenCache::with_default_buffer(Arc::new(acquirer))),
            Arc::new(dispatcher),
            vec![110, 6],
        )
    }

    /// 依次返回 24.first、24.second 的获取器
    fn two_token_acquirer() -> MockTokenAcquirer {
        let mut seq = Sequence::new();
        let mut acquirer = MockTokenAcquirer::new();
        acquirer
            .expect_acquire()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(token("24.first")));
        acquirer
            .expect_acquire()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(token("24.second")));
        acquirer
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let mut acquirer = MockTokenAcquirer::new();
        acquirer
            .expect_acquire()
            .times(1)
            .returning(|| Ok(token("24.first")));
        let mut dispatcher = MockRecognitionDispatcher::new();
        dispatcher
            .expect_dispatch()
            .withf(|req| {
                req.token == "24.first"
                    && &*req.payload == PAYLOAD
                    && req.recognition_type == RecognitionType::General
            })
            .times(1)
            .returning(|_| Ok(success(&["Hello"])));

        let result = pipeline(acquirer, dispatcher)
            .recognize(PAYLOAD, RecognitionType::General)
            .await
            .unwrap();

        assert_eq!(result, Recognition::new(vec!["Hello".to_string()]));
    }

    #[rstest]
    #[case(110)]
    #[case(6)]
    #[tokio::test]
    async fn test_auth_failure_refreshes_and_retries(#[case] code: i64) {
        let mut seq = Sequence::new();
        let mut dispatcher = MockRecognitionDispatcher::new();
        dispatcher
            .expect_dispatch()
            .withf(|req| req.token == "24.first")
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_| Ok(failure(code)));
        dispatcher
            .expect_dispatch()
            .withf(|req| req.token == "24.second" && &*req.payload == PAYLOAD)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(success(&["Retry OK"])));

        let pipeline = pipeline(two_token_acquirer(), dispatcher);
        let result = pipeline
            .recognize(PAYLOAD, RecognitionType::Accurate)
            .await
            .unwrap();

        assert_eq!(result.fragments, vec!["Retry OK".to_string()]);
        assert_eq!(
            pipeline.token_cache().peek().await.unwrap().value(),
            "24.second"
        );
    }

    #[tokio::test]
    async fn test_retry_happens_at_most_once() {
        let mut dispatcher = MockRecognitionDispatcher::new();
        dispatcher
            .expect_dispatch()
            .times(2)
            .returning(|_| Ok(failure(110)));

        let err = pipeline(two_token_acquirer(), dispatcher)
            .recognize(PAYLOAD, RecognitionType::General)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            RecognitionError::ProviderDomainError {
                code: 110,
                message: "provider error 110".to_string(),
            }
        );
    }

    #[rstest]
    #[case(282_000)]
    #[case(17)]
    #[case(216_201)]
    #[tokio::test]
    async fn test_non_auth_failure_is_not_retried(#[case] code: i64) {
        let mut acquirer = MockTokenAcquirer::new();
        acquirer
            .expect_acquire()
            .times(1)
            .returning(|| Ok(token("24.first")));
        let mut dispatcher = MockRecognitionDispatcher::new();
        dispatcher
            .expect_dispatch()
            .times(1)
            .returning(move |_| Ok(failure(code)));

        let err = pipeline(acquirer, dispatcher)
            .recognize(PAYLOAD, RecognitionType::Table)
            .await
            .unwrap_err();

        assert_eq!(err.provider_code(), Some(code));
    }

    #[tokio::test]
    async fn test_timeout_is_not_retried() {
        let mut acquirer = MockTokenAcquirer::new();
        acquirer
            .expect_acquire()
            .times(1)
            .returning(|| Ok(token("24.first")));
        let mut dispatcher = MockRecognitionDispatcher::new();
        dispatcher
            .expect_dispatch()
            .times(1)
            .returning(|_| Err(RecognitionError::UpstreamTimeout { timeout_seconds: 30 }));

        let err = pipeline(acquirer, dispatcher)
            .recognize(PAYLOAD, RecognitionType::General)
            .await
            .unwrap_err();

        assert_eq!(err, RecognitionError::UpstreamTimeout { timeout_seconds: 30 });
    }

    #[tokio::test]
    async fn test_credential_failure_skips_dispatch() {
        let mut acquirer = MockTokenAcquirer::new();
        acquirer.expect_acquire().times(1).returning(|| {
            Err(RecognitionError::CredentialExchangeFailed(
                "invalid_client".to_string(),
            ))
        });
        let mut dispatcher = MockRecognitionDispatcher::new();
        dispatcher.expect_dispatch().times(0);

        let err = pipeline(acquirer, dispatcher)
            .recognize(PAYLOAD, RecognitionType::General)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            RecognitionError::CredentialExchangeFailed("invalid_client".to_string())
        );
    }

    #[tokio::test]
    async fn test_forced_refresh_failure_surfaces() {
        let mut seq = Sequence::new();
        let mut acquirer = MockTokenAcquirer::new();
        acquirer
            .expect_acquire()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(token("24.first")));
        acquirer
            .expect_acquire()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| {
                Err(RecognitionError::CredentialExchangeFailed(
                    "HTTP 500".to_string(),
                ))
            });
        let mut dispatcher = MockRecognitionDispatcher::new();
        dispatcher
            .expect_dispatch()
            .times(1)
            .returning(|_| Ok(failure(110)));

        let err = pipeline(acquirer, dispatcher)
            .recognize(PAYLOAD, RecognitionType::General)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            RecognitionError::CredentialExchangeFailed("HTTP 500".to_string())
        );
    }

    #[tokio::test]
    async fn test_invalid_payload_makes_no_calls() {
        let mut acquirer = MockTokenAcquirer::new();
        acquirer.expect_acquire().times(0);
        let mut dispatcher = MockRecognitionDispatcher::new();
        dispatcher.expect_dispatch().times(0);

        let err = pipeline(acquirer, dispatcher)
            .recognize("not base64!", RecognitionType::General)
            .await
            .unwrap_err();

        assert!(matches!(err, RecognitionError::InvalidEncoding(_)));
    }

    #[tokio::test]
    async fn test_cancelled_before_retry() {
        let mut acquirer = MockTokenAcquirer::new();
        acquirer
            .expect_acquire()
            .times(1)
            .returning(|| Ok(token("24.first")));
        let mut dispatcher = MockRecognitionDispatcher::new();
        dispatcher
            .expect_dispatch()
            .times(1)
            .returning(|_| Ok(failure(110)));

        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = pipeline(acquirer, dispatcher)
            .recognize_with_retry(PAYLOAD, RecognitionType::General, &cancel)
            .await
            .unwrap_err();

        assert_eq!(err, RecognitionError::Cancelled);
    }

    /// 首次立即返回令牌，之后的刷新挂起直到被放弃
    struct StallingAcquirer {
        calls: std::sync::atomic::AtomicUsize,
        refresh_started: Arc<tokio::sync::Notify>,
    }

    #[async_trait::async_trait]
    impl crate::credential::TokenAcquirer for StallingAcquirer {
        async fn acquire(&self) -> RecognitionResult<AccessToken> {
            if self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                return Ok(token("24.first"));
            }
            self.refresh_started.notify_one();
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            Ok(token("24.late"))
        }
    }

    #[tokio::test]
    async fn test_cancelled_during_forced_refresh() {
        let refresh_started = Arc::new(tokio::sync::Notify::new());
        let acquirer = StallingAcquirer {
            calls: std::sync::atomic::AtomicUsize::new(0),
            refresh_started: Arc::clone(&refresh_started),
        };
        let mut dispatcher = MockRecognitionDispatcher::new();
        dispatcher
            .expect_dispatch()
            .withf(|req| req.token == "24.first")
            .times(1)
            .returning(|_| Ok(failure(110)));

        let pipeline = RecognitionPipeline::new(
            PayloadValidator::default(),
            Arc::new(TokenCache::with_default_buffer(Arc::new(acquirer))),
            Arc::new(dispatcher),
            vec![110, 6],
        );
        let cancel = CancellationToken::new();

        let (result, ()) = tokio::time::timeout(std::time::Duration::from_secs(5), async {
            tokio::join!(
                pipeline.recognize_with_retry(PAYLOAD, RecognitionType::General, &cancel),
                async {
                    refresh_started.notified().await;
                    cancel.cancel();
                }
            )
        })
        .await
        .unwrap();

        assert_eq!(result.unwrap_err(), RecognitionError::Cancelled);
        assert_eq!(
            pipeline.token_cache().peek().await.map(|t| t.value().to_string()),
            Some("24.first".to_string())
        );
    }

    #[tokio::test]
    async fn test_auth_codes_come_from_configuration() {
        let mut acquirer = MockTokenAcquirer::new();
        acquirer
            .expect_acquire()
            .times(1)
            .returning(|| Ok(token("24.first")));
        let mut dispatcher = MockRecognitionDispatcher::new();
        dispatcher
            .expect_dispatch()
            .times(1)
            .returning(|_| Ok(failure(110)));

        let pipeline = RecognitionPipeline::new(
            PayloadValidator::default(),
            Arc::new(TokenCache::with_default_buffer(Arc::new(acquirer))),
            Arc::new(dispatcher),
            vec![999],
        );

        let err = pipeline
            .recognize(PAYLOAD, RecognitionType::General)
            .await
            .unwrap_err();
        assert_eq!(err.provider_code(), Some(110));
    }

    #[test]
    fn test_decide_is_exhaustive_over_outcomes() {
        let acquirer = MockTokenAcquirer::new();
        let dispatcher = MockRecognitionDispatcher::new();
        let pipeline = pipeline(acquirer, dispatcher);

        assert_eq!(pipeline.decide(&success(&[])), RetryDecision::Surface);
        assert_eq!(pipeline.decide(&failure(110)), RetryDecision::RefreshAndRetry);
        assert_eq!(pipeline.decide(&failure(6)), RetryDecision::RefreshAndRetry);
        assert_eq!(pipeline.decide(&failure(282_000)), RetryDecision::Surface);
    }
}
